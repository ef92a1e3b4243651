use crate::types::AudioFormat;

use super::SdpInfo;

/// Parse an AES67 SDP description
///
/// Accepts both `\r\n` and `\n` line endings. Parse problems never fail the
/// call; they leave `is_valid` false on the returned [`SdpInfo`].
#[must_use]
pub fn parse(sdp: &str) -> SdpInfo {
    let mut info = SdpInfo::default();

    for line in sdp.lines() {
        let line = line.trim_end_matches('\r');
        if line.len() < 2 || line.as_bytes()[1] != b'=' {
            continue;
        }

        let value = &line[2..];
        match line.as_bytes()[0] {
            b's' => info.session_name = value.to_string(),
            b'o' => parse_origin(value, &mut info),
            b'c' => parse_connection(value, &mut info),
            b'm' => parse_media(value, &mut info),
            b'a' => parse_attribute(value, &mut info),
            _ => {} // v=, t= and unknown lines carry nothing we need
        }
    }

    info.is_valid = !info.source_ip.is_empty()
        && info.port > 0
        && info.format.sample_rate > 0
        && info.format.channels > 0;

    info
}

/// `o=<user> <id> <ver> IN IP4 <addr>`
fn parse_origin(value: &str, info: &mut SdpInfo) {
    let parts: Vec<&str> = value.split_whitespace().collect();
    if parts.len() >= 6 && parts[3] == "IN" && parts[4] == "IP4" {
        info.session_id = parts[1].to_string();
        info.origin_address = parts[5].to_string();
    }
}

/// `c=IN IP4 <ip>[/ttl]`
fn parse_connection(value: &str, info: &mut SdpInfo) {
    let parts: Vec<&str> = value.split_whitespace().collect();
    if parts.len() >= 3 && parts[0] == "IN" && parts[1] == "IP4" {
        if let Some(ip) = parts[2].split('/').next() {
            info.source_ip = ip.to_string();
        }
    }
}

/// `m=audio <port> RTP/AVP <pt>`
fn parse_media(value: &str, info: &mut SdpInfo) {
    let parts: Vec<&str> = value.split_whitespace().collect();
    if parts.len() >= 4 && parts[0] == "audio" && parts[2] == "RTP/AVP" {
        info.port = parts[1].parse().unwrap_or(0);
        info.payload_type = parts[3].parse().unwrap_or(0);
    }
}

fn parse_attribute(value: &str, info: &mut SdpInfo) {
    if let Some(rtpmap) = value.strip_prefix("rtpmap:") {
        parse_rtpmap(rtpmap, info);
    } else if let Some(ptime) = value.strip_prefix("ptime:") {
        if let Ok(ms) = ptime.trim().parse::<f64>() {
            if ms > 0.0 {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                {
                    info.packet_time_us = (ms * 1000.0).round() as u32;
                }
            }
        }
    } else if let Some(refclk) = value.strip_prefix("ts-refclk:") {
        parse_refclk(refclk, info);
    }
}

/// `a=rtpmap:<pt> L{16,24,32}/<rate>[/<channels>]`
fn parse_rtpmap(value: &str, info: &mut SdpInfo) {
    let mut parts = value.split_whitespace();
    let _pt = parts.next();
    let Some(mapping) = parts.next() else { return };

    let mut fields = mapping.split('/');
    let Some(encoding) = fields.next() else { return };
    info.encoding = encoding.to_string();
    if let Some(depth) = AudioFormat::bit_depth_for_encoding(encoding) {
        info.format.bit_depth = depth;
    }
    if let Some(rate) = fields.next() {
        info.format.sample_rate = rate.parse().unwrap_or(0);
    }
    // The channel count is optional in rtpmap and defaults to one.
    info.format.channels = fields
        .next()
        .and_then(|c| c.parse().ok())
        .unwrap_or(1);
}

/// `a=ts-refclk:ptp=IEEE1588-2008[:<gmid>[:<domain>]]`
fn parse_refclk(value: &str, info: &mut SdpInfo) {
    let Some(ptp) = value.strip_prefix("ptp=") else {
        return;
    };
    if !ptp.starts_with("IEEE1588") {
        return;
    }
    let mut fields = ptp.splitn(2, ':');
    let _version = fields.next();
    if let Some(id) = fields.next() {
        // Keep only the grandmaster identity, not a trailing domain.
        let id = id.split(':').next().unwrap_or(id);
        if !id.is_empty() {
            info.ptp_clock_id = Some(id.to_string());
        }
    }
}
