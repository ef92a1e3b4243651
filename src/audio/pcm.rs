//! Interleaved PCM byte-order conversion
//!
//! AES67 payloads are big-endian signed linear PCM. Capture backends on
//! little-endian hosts deliver the opposite, so the sender converts per
//! sample width before packetization. The transform is its own inverse.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Swap the byte order of every sample in an interleaved PCM buffer
///
/// `data` must hold whole samples; a trailing partial sample is left
/// untouched.
pub fn swap_byte_order(bit_depth: u8, data: &mut [u8]) {
    match bit_depth {
        16 => {
            for chunk in data.chunks_exact_mut(2) {
                let v = LittleEndian::read_i16(chunk);
                BigEndian::write_i16(chunk, v);
            }
        }
        24 => {
            for chunk in data.chunks_exact_mut(3) {
                chunk.swap(0, 2);
            }
        }
        32 => {
            for chunk in data.chunks_exact_mut(4) {
                let v = LittleEndian::read_i32(chunk);
                BigEndian::write_i32(chunk, v);
            }
        }
        _ => {}
    }
}

/// Convert host little-endian samples to network order in place
pub fn to_network_order(bit_depth: u8, data: &mut [u8]) {
    swap_byte_order(bit_depth, data);
}

/// Convert network-order samples to host little-endian in place
pub fn from_network_order(bit_depth: u8, data: &mut [u8]) {
    swap_byte_order(bit_depth, data);
}

/// Append an `i16` sample in network order
pub fn put_i16_be(buf: &mut Vec<u8>, sample: i16) {
    buf.extend_from_slice(&sample.to_be_bytes());
}

/// Append a 24-bit sample (stored in the low bits of an `i32`) in network
/// order
pub fn put_i24_be(buf: &mut Vec<u8>, sample: i32) {
    let bytes = sample.to_be_bytes();
    buf.extend_from_slice(&bytes[1..4]);
}
