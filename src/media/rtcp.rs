//! RTCP common header (RFC 3550 section 6.4).
//!
//! SRTCP only needs the first 8 bytes of a compound packet: the common header
//! and the sender SSRC that follows it.

use super::HeaderError;

/// V/P/RC(1) + PT(1) + length(2) + SSRC(4).
pub const RTCP_HEADER_SIZE: usize = 8;

/// RTCP Sender Report packet type.
pub const PT_SR: u8 = 200;

const VERSION: u8 = 2;

/// First header of a (compound) RTCP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub padding: bool,
    /// Reception report / source count.
    pub count: u8,
    pub packet_type: u8,
    /// Length in 32-bit words minus one.
    pub length: u16,
    pub ssrc: u32,
}

impl Header {
    pub fn parse(data: &[u8]) -> Result<Self, HeaderError> {
        if data.len() < RTCP_HEADER_SIZE {
            return Err(HeaderError::TooShort(data.len()));
        }
        let version = (data[0] >> 6) & 0x03;
        if version != VERSION {
            return Err(HeaderError::Version(version));
        }
        Ok(Self {
            padding: (data[0] >> 5) & 0x01 != 0,
            count: data[0] & 0x1F,
            packet_type: data[1],
            length: u16::from_be_bytes([data[2], data[3]]),
            ssrc: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
        })
    }
}

/// Check if a UDP packet is RTCP (demux from RTP on the same port).
///
/// RTCP packets have payload type 200-204 in byte[1]. In RTP that byte is
/// M|PT with PT in 0-127, so dynamic types 72-76 with the marker bit set
/// collide; callers that care should demux by port instead.
pub fn is_rtcp_packet(data: &[u8]) -> bool {
    if data.len() < RTCP_HEADER_SIZE {
        return false;
    }
    (200..=204).contains(&data[1])
}

/// Build a minimal Sender Report: header plus 20 bytes of zeroed sender info.
pub fn empty_sender_report(ssrc: u32) -> Vec<u8> {
    let mut pkt = vec![0u8; 28];
    pkt[0] = 0x80; // V=2, P=0, RC=0
    pkt[1] = PT_SR;
    // Length in 32-bit words minus 1: (28/4)-1 = 6
    pkt[2..4].copy_from_slice(&6u16.to_be_bytes());
    pkt[4..8].copy_from_slice(&ssrc.to_be_bytes());
    pkt
}
