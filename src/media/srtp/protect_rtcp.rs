use super::cipher::{MAX_SRTCP_INDEX, SRTCP_INDEX_SIZE};
use super::context::Context;
use super::error::{Error, Result};
use super::registry::lock;
use crate::media::rtcp::{self, RTCP_HEADER_SIZE};

impl Context {
    /// Unprotect an SRTCP packet, returning the plain compound RTCP packet.
    pub fn decrypt_rtcp(&self, dst: Vec<u8>, encrypted: &[u8]) -> Result<Vec<u8>> {
        let keys = self.keys();
        let send = keys.send();
        let min_len = RTCP_HEADER_SIZE
            + send.aead_auth_tag_len()
            + SRTCP_INDEX_SIZE
            + keys.send_mki_len()
            + send.rtcp_auth_tag_len();
        if encrypted.len() < min_len {
            return Err(Error::TooShortRtcp(encrypted.len()));
        }

        let header = rtcp::Header::parse(encrypted)?;
        let index = send
            .rtcp_index(encrypted)
            .ok_or(Error::TooShortRtcp(encrypted.len()))?;

        let stream = self.srtcp_stream(header.ssrc);
        let mut state = lock(&stream);
        let mark = state
            .replay
            .check(u64::from(index))
            .ok_or(Error::Duplicated {
                proto: "srtcp",
                ssrc: header.ssrc,
                index: u64::from(index),
            })?;

        let cipher = keys.for_packet(encrypted, false)?;
        let dst = cipher.decrypt_rtcp(dst, encrypted, index, header.ssrc)?;

        state.replay.accept(mark);
        Ok(dst)
    }

    /// Protect a compound RTCP packet with the next SRTCP index of its sender SSRC.
    pub fn encrypt_rtcp(&self, dst: Vec<u8>, decrypted: &[u8]) -> Result<Vec<u8>> {
        let header = rtcp::Header::parse(decrypted)?;

        let keys = self.keys();
        let stream = self.srtcp_stream(header.ssrc);
        let mut state = lock(&stream);

        if state.index >= MAX_SRTCP_INDEX {
            tracing::warn!(
                "SRTCP index exhausted for SSRC {:#010x}, rekey required",
                header.ssrc
            );
            return Err(Error::ExceededMaxPackets);
        }
        state.index += 1;

        keys.send()
            .encrypt_rtcp(dst, decrypted, state.index, header.ssrc)
    }
}

#[cfg(test)]
mod tests {
    use super::super::context::tests::{context, material};
    use super::super::context::ContextOptions;
    use super::super::replay::ReplayProtection;
    use super::*;

    const SSRC: u32 = 0xCAFEBABE;

    #[test]
    fn test_rtcp_roundtrip() {
        let tx = context(ContextOptions::new());
        let rx = context(ContextOptions::new());
        let report = rtcp::empty_sender_report(SSRC);

        for expected_index in 1..=3u32 {
            let srtcp = tx.encrypt_rtcp(Vec::new(), &report).unwrap();
            assert_eq!(srtcp.len(), report.len() + SRTCP_INDEX_SIZE + 10);
            assert_eq!(tx.srtcp_index(SSRC), Some(expected_index));
            assert_eq!(rx.decrypt_rtcp(Vec::new(), &srtcp).unwrap(), report);
        }
        // Only the sending side moves the index.
        assert_eq!(rx.srtcp_index(SSRC), Some(0));
    }

    #[test]
    fn test_rtcp_replay_rejected() {
        let tx = context(ContextOptions::new());
        let rx = context(ContextOptions::new());
        let srtcp = tx
            .encrypt_rtcp(Vec::new(), &rtcp::empty_sender_report(SSRC))
            .unwrap();

        rx.decrypt_rtcp(Vec::new(), &srtcp).unwrap();
        assert_eq!(
            rx.decrypt_rtcp(Vec::new(), &srtcp),
            Err(Error::Duplicated {
                proto: "srtcp",
                ssrc: SSRC,
                index: 1,
            })
        );
    }

    #[test]
    fn test_rtcp_replay_disabled() {
        let options = ContextOptions::new().srtcp_replay_protection(ReplayProtection::Window(0));
        let tx = context(options.clone());
        let rx = context(options);
        let srtcp = tx
            .encrypt_rtcp(Vec::new(), &rtcp::empty_sender_report(SSRC))
            .unwrap();
        rx.decrypt_rtcp(Vec::new(), &srtcp).unwrap();
        assert!(rx.decrypt_rtcp(Vec::new(), &srtcp).is_ok());
    }

    #[test]
    fn test_rtcp_tampered_not_recorded() {
        let tx = context(ContextOptions::new());
        let rx = context(ContextOptions::new());
        let good = tx
            .encrypt_rtcp(Vec::new(), &rtcp::empty_sender_report(SSRC))
            .unwrap();
        let mut bad = good.clone();
        bad[10] ^= 0xFF;

        assert_eq!(rx.decrypt_rtcp(Vec::new(), &bad), Err(Error::AuthTagMismatch));
        assert!(rx.decrypt_rtcp(Vec::new(), &good).is_ok());
    }

    #[test]
    fn test_rtcp_too_short() {
        let rx = context(ContextOptions::new());
        // header(8) + index(4) + tag(10) - 1
        assert_eq!(
            rx.decrypt_rtcp(Vec::new(), &[0x80; 21]),
            Err(Error::TooShortRtcp(21))
        );
        assert!(matches!(
            rx.encrypt_rtcp(Vec::new(), &[0x80, 200, 0]),
            Err(Error::Header(_))
        ));
    }

    #[test]
    fn test_rtcp_index_exhausted() {
        let tx = context(ContextOptions::new());
        let report = rtcp::empty_sender_report(SSRC);
        tx.set_srtcp_index(SSRC, MAX_SRTCP_INDEX - 1);

        tx.encrypt_rtcp(Vec::new(), &report).unwrap();
        assert_eq!(tx.srtcp_index(SSRC), Some(MAX_SRTCP_INDEX));
        assert_eq!(
            tx.encrypt_rtcp(Vec::new(), &report),
            Err(Error::ExceededMaxPackets)
        );
        assert_eq!(tx.srtcp_index(SSRC), Some(MAX_SRTCP_INDEX));
    }

    #[test]
    fn test_rtcp_multi_mki() {
        let tx = context(ContextOptions::new().mki(vec![0xA1]));
        let rx = context(ContextOptions::new().mki(vec![0xA1]));
        let second = material(9);
        for ctx in [&tx, &rx] {
            ctx.add_cipher_for_mki(&[0xB2], &second.master_key, &second.master_salt)
                .unwrap();
        }
        tx.set_send_mki(&[0xB2]).unwrap();

        let report = rtcp::empty_sender_report(SSRC);
        let srtcp = tx.encrypt_rtcp(Vec::new(), &report).unwrap();
        assert_eq!(srtcp[srtcp.len() - 11], 0xB2);
        assert_eq!(rx.decrypt_rtcp(Vec::new(), &srtcp).unwrap(), report);

        rx.remove_mki(&[0xB2]).unwrap();
        let srtcp = tx.encrypt_rtcp(Vec::new(), &report).unwrap();
        assert_eq!(rx.decrypt_rtcp(Vec::new(), &srtcp), Err(Error::MkiNotFound));
    }
}
