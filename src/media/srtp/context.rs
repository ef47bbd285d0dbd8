//! SRTP/SRTCP session context.
//!
//! A [`Context`] owns the ciphers for one direction of a session and the
//! per-SSRC state needed to protect or unprotect packets: rollover counters,
//! outbound SRTCP indices and replay windows. The packet operations live in
//! `protect_rtp.rs` and `protect_rtcp.rs`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::cipher::{AesCmHmacSha1, Cipher, MAX_SRTCP_INDEX};
use super::error::{Error, Result};
use super::keys::{KeyingMaterial, Profile};
use super::registry::{lock, SsrcRegistry};
use super::replay::{ReplayDetector, ReplayProtection};
use super::rollover::{RolloverCounter, MAX_INDEX};

/// Knobs for [`Context::new`].
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    srtp_replay: ReplayProtection,
    srtcp_replay: ReplayProtection,
    mki: Option<Vec<u8>>,
}

impl ContextOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn srtp_replay_protection(mut self, protection: ReplayProtection) -> Self {
        self.srtp_replay = protection;
        self
    }

    pub fn srtcp_replay_protection(mut self, protection: ReplayProtection) -> Self {
        self.srtcp_replay = protection;
        self
    }

    /// Enable MKI mode with `mki` identifying the initial master key.
    /// An empty MKI leaves MKI mode off.
    pub fn mki(mut self, mki: Vec<u8>) -> Self {
        self.mki = Some(mki);
        self
    }
}

/// Rollover and replay state of one inbound or outbound RTP stream.
pub(super) struct SrtpStream {
    pub(super) rollover: RolloverCounter,
    pub(super) replay: Box<dyn ReplayDetector>,
}

/// SRTCP index and replay state of one RTCP stream.
pub(super) struct SrtcpStream {
    pub(super) index: u32,
    pub(super) replay: Box<dyn ReplayDetector>,
}

/// Ciphers by MKI plus the one used for outgoing packets.
pub(super) struct KeyRing {
    send: Arc<dyn Cipher>,
    send_mki: Vec<u8>,
    by_mki: HashMap<Vec<u8>, Arc<dyn Cipher>>,
}

impl KeyRing {
    pub(super) fn send(&self) -> &dyn Cipher {
        self.send.as_ref()
    }

    pub(super) fn send_mki_len(&self) -> usize {
        self.send_mki.len()
    }

    /// Cipher that should unprotect `packet`. Without MKIs this is always
    /// the send cipher; with MKIs the wire MKI must name a known key.
    pub(super) fn for_packet(&self, packet: &[u8], rtp: bool) -> Result<&dyn Cipher> {
        if self.by_mki.is_empty() {
            return Ok(self.send.as_ref());
        }
        let mki = self.send.extract_mki(packet, rtp);
        match self.by_mki.get(mki) {
            Some(cipher) => Ok(cipher.as_ref()),
            None => Err(Error::MkiNotFound),
        }
    }
}

/// Protection context for one direction of an SRTP session.
///
/// All methods take `&self`. Calls for the same SSRC serialize on that
/// stream's lock; calls for different SSRCs run in parallel.
pub struct Context {
    profile: Profile,
    keys: RwLock<KeyRing>,
    srtp_replay: ReplayProtection,
    srtcp_replay: ReplayProtection,
    srtp_streams: SsrcRegistry<SrtpStream>,
    srtcp_streams: SsrcRegistry<SrtcpStream>,
}

impl Context {
    pub fn new(
        profile: Profile,
        material: &KeyingMaterial,
        options: ContextOptions,
    ) -> Result<Self> {
        let send_mki = options.mki.unwrap_or_default();
        let send: Arc<dyn Cipher> =
            Arc::new(AesCmHmacSha1::new(profile, material, send_mki.clone())?);

        let mut by_mki = HashMap::new();
        if !send_mki.is_empty() {
            by_mki.insert(send_mki.clone(), Arc::clone(&send));
        }

        tracing::debug!(
            "SRTP context created: profile={}, mki_len={}",
            profile,
            send_mki.len()
        );

        Ok(Self {
            profile,
            keys: RwLock::new(KeyRing {
                send,
                send_mki,
                by_mki,
            }),
            srtp_replay: options.srtp_replay,
            srtcp_replay: options.srtcp_replay,
            srtp_streams: SsrcRegistry::new(),
            srtcp_streams: SsrcRegistry::new(),
        })
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// Current rollover counter of an SRTP stream, `None` if the SSRC is unknown.
    pub fn roc(&self, ssrc: u32) -> Option<u32> {
        let stream = self.srtp_streams.get(ssrc)?;
        let roc = lock(&stream).rollover.roc();
        Some(roc)
    }

    /// Force the rollover counter of an SRTP stream. The next packet's
    /// sequence number is taken as-is under this ROC.
    pub fn set_roc(&self, ssrc: u32, roc: u32) {
        let stream = self.srtp_stream(ssrc);
        lock(&stream).rollover.set_roc(roc);
    }

    /// Last SRTCP index used by `encrypt_rtcp` for `ssrc`. Decrypt never
    /// moves it.
    pub fn srtcp_index(&self, ssrc: u32) -> Option<u32> {
        let stream = self.srtcp_streams.get(ssrc)?;
        let index = lock(&stream).index;
        Some(index)
    }

    /// Set the SRTCP index of a stream (reduced modulo 2^31).
    pub fn set_srtcp_index(&self, ssrc: u32, index: u32) {
        let stream = self.srtcp_stream(ssrc);
        lock(&stream).index = index & MAX_SRTCP_INDEX;
    }

    /// Register an additional master key under `mki` for incoming packets.
    pub fn add_cipher_for_mki(
        &self,
        mki: &[u8],
        master_key: &[u8],
        master_salt: &[u8],
    ) -> Result<()> {
        let mut keys = self.keys_mut();
        if keys.by_mki.is_empty() {
            return Err(Error::MkiNotEnabled);
        }
        if mki.is_empty() || mki.len() != keys.send_mki.len() {
            return Err(Error::InvalidMkiLength);
        }
        if keys.by_mki.contains_key(mki) {
            return Err(Error::MkiAlreadyInUse);
        }

        let material = KeyingMaterial::new(master_key, master_salt)?;
        let cipher = AesCmHmacSha1::new(self.profile, &material, mki.to_vec())?;
        keys.by_mki.insert(mki.to_vec(), Arc::new(cipher));
        tracing::debug!("Added SRTP key for MKI {:02x?}", mki);
        Ok(())
    }

    /// Switch outgoing packets to the key registered under `mki`.
    pub fn set_send_mki(&self, mki: &[u8]) -> Result<()> {
        let mut keys = self.keys_mut();
        let cipher = keys.by_mki.get(mki).cloned().ok_or(Error::MkiNotFound)?;
        keys.send = cipher;
        keys.send_mki = mki.to_vec();
        tracing::debug!("Sending with MKI {:02x?}", mki);
        Ok(())
    }

    /// Forget the key registered under `mki`. The send key cannot be removed.
    pub fn remove_mki(&self, mki: &[u8]) -> Result<()> {
        let mut keys = self.keys_mut();
        if !keys.by_mki.contains_key(mki) {
            return Err(Error::MkiNotFound);
        }
        if keys.send_mki == mki {
            return Err(Error::MkiAlreadyInUse);
        }
        keys.by_mki.remove(mki);
        tracing::debug!("Removed SRTP key for MKI {:02x?}", mki);
        Ok(())
    }

    pub(super) fn keys(&self) -> RwLockReadGuard<'_, KeyRing> {
        self.keys.read().unwrap_or_else(|e| e.into_inner())
    }

    fn keys_mut(&self) -> RwLockWriteGuard<'_, KeyRing> {
        self.keys.write().unwrap_or_else(|e| e.into_inner())
    }

    pub(super) fn srtp_stream(&self, ssrc: u32) -> Arc<Mutex<SrtpStream>> {
        self.srtp_streams.get_or_create(ssrc, || SrtpStream {
            rollover: RolloverCounter::new(),
            replay: self.srtp_replay.detector(MAX_INDEX),
        })
    }

    pub(super) fn srtcp_stream(&self, ssrc: u32) -> Arc<Mutex<SrtcpStream>> {
        self.srtcp_streams.get_or_create(ssrc, || SrtcpStream {
            index: 0,
            replay: self.srtcp_replay.detector(u64::from(MAX_SRTCP_INDEX)),
        })
    }
}
