use thiserror::Error;

use crate::media::HeaderError;

/// Errors returned by SRTP/SRTCP protection.
///
/// Every error is local to the packet being processed: the caller drops the
/// packet and carries on. `ExceededMaxPackets` is the exception, since it
/// stays true for the SSRC until the key is replaced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("packet is too short to be an RTP packet: {0} bytes")]
    TooShortRtp(usize),
    #[error("packet is too short to be an RTCP packet: {0} bytes")]
    TooShortRtcp(usize),
    #[error("{proto} ssrc={ssrc} index={index}: duplicated")]
    Duplicated {
        proto: &'static str,
        ssrc: u32,
        index: u64,
    },
    #[error("MKI not found")]
    MkiNotFound,
    #[error("MKI is not enabled")]
    MkiNotEnabled,
    #[error("invalid MKI length")]
    InvalidMkiLength,
    #[error("MKI already in use")]
    MkiAlreadyInUse,
    /// RFC 3711 section 9.2: after 2^48 SRTP or 2^31 SRTCP packets the key
    /// must be replaced or the session terminated.
    #[error("exceeded the maximum number of packets")]
    ExceededMaxPackets,
    #[error("failed to verify auth tag")]
    AuthTagMismatch,
    #[error("invalid SRTP master key length: {0} bytes")]
    InvalidMasterKeyLength(usize),
    #[error("invalid SRTP master salt length: {0} bytes")]
    InvalidMasterSaltLength(usize),
    #[error("invalid session key length")]
    InvalidKeyLength,
    #[error(transparent)]
    Header(#[from] HeaderError),
}

pub type Result<T> = std::result::Result<T, Error>;
