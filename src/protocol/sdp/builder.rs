use std::fmt::Write;

use crate::types::SenderConfig;

/// Generate an AES67 SDP description for a sender
///
/// CRLF line endings throughout, as transport files are published to
/// external control systems. The `ptime` attribute carries the actual
/// configured packet time in milliseconds rather than an unconditional `1`.
#[must_use]
pub fn generate(config: &SenderConfig, session_id: u64, origin_address: &str) -> String {
    let mut sdp = String::with_capacity(256);

    // Writing into a String cannot fail.
    let _ = write!(
        sdp,
        "v=0\r\n\
         o=- {session_id} {session_id} IN IP4 {origin_address}\r\n\
         s={}\r\n\
         c=IN IP4 {}/32\r\n\
         t=0 0\r\n\
         m=audio {} RTP/AVP {}\r\n",
        config.label, config.multicast_ip, config.port, config.payload_type,
    );

    let encoding = config.format().encoding_name().unwrap_or("L24");
    let _ = write!(
        sdp,
        "a=rtpmap:{} {encoding}/{}/{}\r\n\
         a=ptime:{}\r\n\
         a=ts-refclk:ptp=IEEE1588-2008\r\n\
         a=mediaclk:direct=0\r\n",
        config.payload_type,
        config.sample_rate,
        config.channels,
        format_ptime_ms(config.packet_time_us),
    );

    sdp
}

/// Format a packet time in microseconds as an SDP ptime value in
/// milliseconds, without trailing zeros
fn format_ptime_ms(packet_time_us: u32) -> String {
    if packet_time_us % 1000 == 0 {
        (packet_time_us / 1000).to_string()
    } else {
        format!("{}", f64::from(packet_time_us) / 1000.0)
    }
}
