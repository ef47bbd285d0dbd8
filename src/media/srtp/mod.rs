//! SRTP/SRTCP packet protection (RFC 3711).
//!
//! [`Context`] is the entry point: it reconstructs the 48-bit packet index of
//! each RTP packet from its 16-bit sequence number, rejects replays, picks the
//! key by MKI and hands the packet to a [`Cipher`]. Per-SSRC state is created
//! on first use and only committed once a packet has been accepted.

mod buffer;
pub mod cipher;
mod context;
mod error;
pub mod keys;
mod protect_rtcp;
mod protect_rtp;
pub mod registry;
pub mod replay;
pub mod rollover;

pub use buffer::grow_buffer;
pub use cipher::{AesCmHmacSha1, Cipher, MAX_SRTCP_INDEX};
pub use context::{Context, ContextOptions};
pub use error::{Error, Result};
pub use keys::{parse_crypto_line, CryptoAttribute, KeyingMaterial, Profile};
pub use replay::{ReplayDetector, ReplayMark, ReplayProtection, DEFAULT_WINDOW_SIZE};
pub use rollover::{Epoch, RolloverCounter, RolloverEstimate};
