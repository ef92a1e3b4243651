use proptest::prelude::*;

use super::header::{RtpHeader, RtpParseError};

#[test]
fn test_encode_layout() {
    let header = RtpHeader::new_audio(97, 0x1234, 0xDEAD_BEEF, 0xCAFE_BABE);
    let buf = header.encode();

    assert_eq!(buf[0], 0x80); // V=2, P=0, X=0, CC=0
    assert_eq!(buf[1], 97); // M=0, PT=97
    assert_eq!(&buf[2..4], &[0x12, 0x34]);
    assert_eq!(&buf[4..8], &[0xDE, 0xAD, 0xBE, 0xEF]);
    assert_eq!(&buf[8..12], &[0xCA, 0xFE, 0xBA, 0xBE]);
}

#[test]
fn test_decode_rejects_short_buffer() {
    let err = RtpHeader::decode(&[0x80, 97, 0, 1]).unwrap_err();
    assert!(matches!(err, RtpParseError::TooShort(4)));
}

#[test]
fn test_decode_rejects_wrong_version() {
    let mut buf = RtpHeader::new_audio(97, 1, 2, 3).encode();
    buf[0] = 0x40; // V=1
    assert!(matches!(
        RtpHeader::decode(&buf),
        Err(RtpParseError::InvalidVersion(1))
    ));
}

#[test]
fn test_decode_flags() {
    let mut buf = RtpHeader::new_audio(97, 1, 2, 3).encode();
    buf[0] |= 0x13; // X=1, CC=3
    buf[1] |= 0x80; // M=1

    let header = RtpHeader::decode(&buf).unwrap();
    assert!(header.extension);
    assert!(header.marker);
    assert_eq!(header.csrc_count, 3);
    assert_eq!(header.payload_type, 97);
}

proptest! {
    #[test]
    fn prop_header_round_trip(
        payload_type in 0u8..=127,
        sequence: u16,
        timestamp: u32,
        ssrc: u32,
        marker: bool,
        csrc_count in 0u8..=15,
    ) {
        let header = RtpHeader {
            version: 2,
            padding: false,
            extension: false,
            csrc_count,
            marker,
            payload_type,
            sequence,
            timestamp,
            ssrc,
        };
        let decoded = RtpHeader::decode(&header.encode()).unwrap();
        prop_assert_eq!(decoded, header);
    }
}
