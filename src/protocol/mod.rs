//! Wire protocols: RTP packet path and SDP session descriptions

pub mod rtp;
pub mod sdp;
