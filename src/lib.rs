//! SRTP/SRTCP packet protection with per-SSRC rollover tracking and replay
//! protection, plus the configuration and packet pipe used by the
//! `srtp-session` binary.

pub mod config;
pub mod media;
pub mod pipe;
