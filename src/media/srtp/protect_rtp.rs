use super::buffer::grow_buffer;
use super::context::Context;
use super::error::{Error, Result};
use super::registry::lock;
use crate::media::rtp;

impl Context {
    /// Unprotect an SRTP packet, returning `header || payload` in `dst`.
    pub fn decrypt_rtp(&self, dst: Vec<u8>, encrypted: &[u8]) -> Result<Vec<u8>> {
        let mut header = rtp::Header::default();
        self.decrypt_rtp_with_header(dst, encrypted, &mut header)
    }

    /// Like [`decrypt_rtp`](Self::decrypt_rtp), also handing back the parsed header.
    ///
    /// Nothing about the stream changes unless the packet authenticates:
    /// the replay window and rollover counter are only updated afterwards.
    pub fn decrypt_rtp_with_header(
        &self,
        dst: Vec<u8>,
        encrypted: &[u8],
        header: &mut rtp::Header,
    ) -> Result<Vec<u8>> {
        let header_len = header.unmarshal(encrypted)?;

        let keys = self.keys();
        let auth_tag_len = keys.send().rtp_auth_tag_len();
        let mki_len = keys.send_mki_len();
        if encrypted.len() < header_len + keys.send().aead_auth_tag_len() + mki_len + auth_tag_len
        {
            return Err(Error::TooShortRtp(encrypted.len()));
        }

        let stream = self.srtp_stream(header.ssrc);
        let mut state = lock(&stream);

        // Sender budget is not enforced here; an overflowed guess simply
        // fails authentication or the replay check.
        let estimate = state.rollover.estimate(header.sequence_number);
        let index = estimate.index();
        let mark = state.replay.check(index).ok_or(Error::Duplicated {
            proto: "srtp",
            ssrc: header.ssrc,
            index,
        })?;

        let cipher = keys.for_packet(encrypted, true)?;
        let dst = grow_buffer(dst, encrypted.len() - auth_tag_len - mki_len);
        let dst = cipher.decrypt_rtp(dst, encrypted, header, header_len, estimate.roc())?;

        state.replay.accept(mark);
        state.rollover.apply(estimate);
        Ok(dst)
    }

    /// Protect an RTP packet, returning `header || encrypted payload || MKI || tag`.
    pub fn encrypt_rtp(&self, dst: Vec<u8>, plaintext: &[u8]) -> Result<Vec<u8>> {
        let (header, header_len) = rtp::Header::parse(plaintext)?;
        self.encrypt_rtp_with_header(dst, &header, &plaintext[header_len..])
    }

    /// Protect a payload under an already parsed header.
    pub fn encrypt_rtp_with_header(
        &self,
        dst: Vec<u8>,
        header: &rtp::Header,
        payload: &[u8],
    ) -> Result<Vec<u8>> {
        let keys = self.keys();
        let stream = self.srtp_stream(header.ssrc);
        let mut state = lock(&stream);

        let estimate = state.rollover.estimate(header.sequence_number);
        if estimate.overflow() {
            tracing::warn!(
                "SRTP packet budget exhausted for SSRC {:#010x}, rekey required",
                header.ssrc
            );
            return Err(Error::ExceededMaxPackets);
        }

        // Unlike decrypt, the counter moves before the transform runs: a
        // failed encrypt still consumes its index.
        let roc = estimate.roc();
        state.rollover.apply(estimate);

        keys.send().encrypt_rtp(dst, header, payload, roc)
    }
}
