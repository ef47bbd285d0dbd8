//! Media packet handling: RTP/RTCP header codecs and SRTP/SRTCP protection.

pub mod rtcp;
pub mod rtp;
pub mod srtp;

use thiserror::Error;

/// Failure to parse or serialize an RTP/RTCP header.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("header too short: {0} bytes")]
    TooShort(usize),
    #[error("unsupported version: {0}")]
    Version(u8),
    #[error("CSRC list truncated")]
    TruncatedCsrc,
    #[error("header extension truncated")]
    TruncatedExtension,
    #[error("too many CSRCs: {0}")]
    TooManyCsrcs(usize),
    #[error("header extension too long: {0} words")]
    ExtensionTooLong(usize),
    #[error("buffer too small for header: need {need}, have {have}")]
    BufferTooSmall { need: usize, have: usize },
}
