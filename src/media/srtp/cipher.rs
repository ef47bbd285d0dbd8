//! Packet transforms: AES-128-CM encryption with HMAC-SHA1 authentication (RFC 3711).
//!
//! The [`Cipher`] trait is what the SRTP context drives; it knows nothing
//! about rollover counters or replay windows and simply protects one packet
//! with the index it is given.
//!
//! Packet layouts:
//! ```text
//! SRTP:  | RTP header | encrypted payload | MKI | auth tag |
//! SRTCP: | RTCP header (8) | encrypted payload |E| SRTCP index | MKI | auth tag |
//! ```
//! The auth tag covers everything before the MKI; for SRTP the ROC is
//! appended to the authenticated bytes.

use std::fmt;

use aes::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use sha1::Sha1;

use super::buffer::grow_buffer;
use super::error::{Error, Result};
use super::keys::{KeyingMaterial, Profile, SessionKeys};
use crate::media::rtcp::RTCP_HEADER_SIZE;
use crate::media::rtp;

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;
type HmacSha1 = Hmac<Sha1>;

/// Size of the E flag + 31-bit SRTCP index trailer.
pub const SRTCP_INDEX_SIZE: usize = 4;

/// Encrypted flag in the SRTCP index word.
const SRTCP_E_FLAG: u32 = 0x8000_0000;

/// Largest SRTCP index (2^31 - 1).
pub const MAX_SRTCP_INDEX: u32 = 0x7FFF_FFFF;

/// One SRTP/SRTCP transform bound to a single master key.
pub trait Cipher: Send + Sync {
    /// Bytes of auth tag appended to SRTP packets.
    fn rtp_auth_tag_len(&self) -> usize;

    /// Bytes of auth tag appended to SRTCP packets.
    fn rtcp_auth_tag_len(&self) -> usize;

    /// Bytes of authentication carried inside the ciphertext (AEAD profiles).
    fn aead_auth_tag_len(&self) -> usize;

    /// Master key identifier written on every outgoing packet (may be empty).
    fn mki(&self) -> &[u8];

    /// Returns `header || encrypted payload || MKI || auth tag`.
    fn encrypt_rtp(
        &self,
        dst: Vec<u8>,
        header: &rtp::Header,
        payload: &[u8],
        roc: u32,
    ) -> Result<Vec<u8>>;

    /// Verifies and decrypts, returning `header || payload`.
    fn decrypt_rtp(
        &self,
        dst: Vec<u8>,
        ciphertext: &[u8],
        header: &rtp::Header,
        header_len: usize,
        roc: u32,
    ) -> Result<Vec<u8>>;

    fn encrypt_rtcp(
        &self,
        dst: Vec<u8>,
        decrypted: &[u8],
        srtcp_index: u32,
        ssrc: u32,
    ) -> Result<Vec<u8>>;

    fn decrypt_rtcp(
        &self,
        dst: Vec<u8>,
        encrypted: &[u8],
        srtcp_index: u32,
        ssrc: u32,
    ) -> Result<Vec<u8>>;

    /// SRTCP index carried in the clear, `None` if the packet is too short.
    fn rtcp_index(&self, encrypted: &[u8]) -> Option<u32> {
        let end = encrypted
            .len()
            .checked_sub(self.rtcp_auth_tag_len() + self.mki().len())?;
        let start = end.checked_sub(SRTCP_INDEX_SIZE)?;
        let word = u32::from_be_bytes(encrypted[start..end].try_into().ok()?);
        Some(word & MAX_SRTCP_INDEX)
    }

    /// The MKI field of a protected packet, sized by this cipher's MKI.
    fn extract_mki<'a>(&self, packet: &'a [u8], rtp: bool) -> &'a [u8] {
        let tag_len = if rtp {
            self.rtp_auth_tag_len()
        } else {
            self.rtcp_auth_tag_len()
        };
        let end = packet.len().saturating_sub(tag_len);
        let start = end.saturating_sub(self.mki().len());
        &packet[start..end]
    }
}

/// `AES_CM_128_HMAC_SHA1_80` / `AES_CM_128_HMAC_SHA1_32`.
pub struct AesCmHmacSha1 {
    profile: Profile,
    srtp: SessionKeys,
    srtcp: SessionKeys,
    srtp_mac: HmacSha1,
    srtcp_mac: HmacSha1,
    mki: Vec<u8>,
}

impl fmt::Debug for AesCmHmacSha1 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesCmHmacSha1")
            .field("profile", &self.profile)
            .field("mki_len", &self.mki.len())
            .finish_non_exhaustive()
    }
}

impl AesCmHmacSha1 {
    /// Derive SRTP and SRTCP session keys from `material`.
    pub fn new(profile: Profile, material: &KeyingMaterial, mki: Vec<u8>) -> Result<Self> {
        let srtp = SessionKeys::srtp(material);
        let srtcp = SessionKeys::srtcp(material);
        let srtp_mac =
            HmacSha1::new_from_slice(&srtp.auth_key).map_err(|_| Error::InvalidKeyLength)?;
        let srtcp_mac =
            HmacSha1::new_from_slice(&srtcp.auth_key).map_err(|_| Error::InvalidKeyLength)?;
        Ok(Self {
            profile,
            srtp,
            srtcp,
            srtp_mac,
            srtcp_mac,
            mki,
        })
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    fn rtp_mac(&self, authenticated: &[u8], roc: u32) -> HmacSha1 {
        let mut mac = self.srtp_mac.clone();
        mac.update(authenticated);
        mac.update(&roc.to_be_bytes());
        mac
    }

    fn rtcp_mac(&self, authenticated: &[u8]) -> HmacSha1 {
        let mut mac = self.srtcp_mac.clone();
        mac.update(authenticated);
        mac
    }
}

impl Cipher for AesCmHmacSha1 {
    fn rtp_auth_tag_len(&self) -> usize {
        self.profile.rtp_auth_tag_len()
    }

    fn rtcp_auth_tag_len(&self) -> usize {
        self.profile.rtcp_auth_tag_len()
    }

    fn aead_auth_tag_len(&self) -> usize {
        self.profile.aead_auth_tag_len()
    }

    fn mki(&self) -> &[u8] {
        &self.mki
    }

    fn encrypt_rtp(
        &self,
        dst: Vec<u8>,
        header: &rtp::Header,
        payload: &[u8],
        roc: u32,
    ) -> Result<Vec<u8>> {
        let header_len = header.marshal_size();
        let body_len = header_len + payload.len();
        let mki_len = self.mki.len();
        let tag_len = self.rtp_auth_tag_len();

        let mut dst = grow_buffer(dst, body_len + mki_len + tag_len);
        header.marshal_to(&mut dst[..header_len])?;
        dst[header_len..body_len].copy_from_slice(payload);

        let iv = rtp_iv(&self.srtp.salt, header.ssrc, roc, header.sequence_number);
        let mut cipher = Aes128Ctr::new((&self.srtp.cipher_key).into(), &iv.into());
        cipher.apply_keystream(&mut dst[header_len..body_len]);

        dst[body_len..body_len + mki_len].copy_from_slice(&self.mki);
        let tag = self.rtp_mac(&dst[..body_len], roc).finalize().into_bytes();
        dst[body_len + mki_len..].copy_from_slice(&tag[..tag_len]);

        Ok(dst)
    }

    fn decrypt_rtp(
        &self,
        dst: Vec<u8>,
        ciphertext: &[u8],
        header: &rtp::Header,
        header_len: usize,
        roc: u32,
    ) -> Result<Vec<u8>> {
        let tag_len = self.rtp_auth_tag_len();
        let mki_len = self.mki.len();
        if ciphertext.len() < header_len + mki_len + tag_len {
            return Err(Error::TooShortRtp(ciphertext.len()));
        }

        let tag_start = ciphertext.len() - tag_len;
        let body_len = tag_start - mki_len;
        self.rtp_mac(&ciphertext[..body_len], roc)
            .verify_truncated_left(&ciphertext[tag_start..])
            .map_err(|_| Error::AuthTagMismatch)?;

        let mut dst = grow_buffer(dst, body_len);
        dst.copy_from_slice(&ciphertext[..body_len]);

        let iv = rtp_iv(&self.srtp.salt, header.ssrc, roc, header.sequence_number);
        let mut cipher = Aes128Ctr::new((&self.srtp.cipher_key).into(), &iv.into());
        cipher.apply_keystream(&mut dst[header_len..]);

        Ok(dst)
    }

    fn encrypt_rtcp(
        &self,
        dst: Vec<u8>,
        decrypted: &[u8],
        srtcp_index: u32,
        ssrc: u32,
    ) -> Result<Vec<u8>> {
        let n = decrypted.len();
        if n < RTCP_HEADER_SIZE {
            return Err(Error::TooShortRtcp(n));
        }
        let mki_len = self.mki.len();
        let tag_len = self.rtcp_auth_tag_len();
        let auth_end = n + SRTCP_INDEX_SIZE;

        let mut dst = grow_buffer(dst, auth_end + mki_len + tag_len);
        dst[..n].copy_from_slice(decrypted);

        // Header stays in the clear.
        let iv = rtcp_iv(&self.srtcp.salt, ssrc, srtcp_index);
        let mut cipher = Aes128Ctr::new((&self.srtcp.cipher_key).into(), &iv.into());
        cipher.apply_keystream(&mut dst[RTCP_HEADER_SIZE..n]);

        let e_index = SRTCP_E_FLAG | (srtcp_index & MAX_SRTCP_INDEX);
        dst[n..auth_end].copy_from_slice(&e_index.to_be_bytes());
        dst[auth_end..auth_end + mki_len].copy_from_slice(&self.mki);

        let tag = self.rtcp_mac(&dst[..auth_end]).finalize().into_bytes();
        dst[auth_end + mki_len..].copy_from_slice(&tag[..tag_len]);

        Ok(dst)
    }

    fn decrypt_rtcp(
        &self,
        dst: Vec<u8>,
        encrypted: &[u8],
        srtcp_index: u32,
        ssrc: u32,
    ) -> Result<Vec<u8>> {
        let tag_len = self.rtcp_auth_tag_len();
        let mki_len = self.mki.len();
        if encrypted.len() < RTCP_HEADER_SIZE + SRTCP_INDEX_SIZE + mki_len + tag_len {
            return Err(Error::TooShortRtcp(encrypted.len()));
        }

        let tag_start = encrypted.len() - tag_len;
        let auth_end = tag_start - mki_len;
        let index_start = auth_end - SRTCP_INDEX_SIZE;

        self.rtcp_mac(&encrypted[..auth_end])
            .verify_truncated_left(&encrypted[tag_start..])
            .map_err(|_| Error::AuthTagMismatch)?;

        let e_index = u32::from_be_bytes([
            encrypted[index_start],
            encrypted[index_start + 1],
            encrypted[index_start + 2],
            encrypted[index_start + 3],
        ]);

        let mut dst = grow_buffer(dst, index_start);
        dst.copy_from_slice(&encrypted[..index_start]);

        if e_index & SRTCP_E_FLAG != 0 {
            let iv = rtcp_iv(&self.srtcp.salt, ssrc, srtcp_index);
            let mut cipher = Aes128Ctr::new((&self.srtcp.cipher_key).into(), &iv.into());
            cipher.apply_keystream(&mut dst[RTCP_HEADER_SIZE..]);
        }

        Ok(dst)
    }
}

/// Build the AES-128-CM IV for SRTP (RFC 3711, 4.1.1).
///
/// IV = (session_salt * 2^16) XOR (SSRC * 2^64) XOR (packet_index * 2^16),
/// with packet index = ROC << 16 | SEQ.
fn rtp_iv(salt: &[u8; 14], ssrc: u32, roc: u32, seq: u16) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[4..8].copy_from_slice(&ssrc.to_be_bytes());
    iv[8..12].copy_from_slice(&roc.to_be_bytes());
    iv[12..14].copy_from_slice(&seq.to_be_bytes());
    for (b, s) in iv.iter_mut().zip(salt) {
        *b ^= s;
    }
    // iv[14..16] = 0 (block counter starts at 0)
    iv
}

/// Build the AES-128-CM IV for SRTCP: the 31-bit index sits right-aligned in
/// the 48-bit packet index field (bytes 8-13).
fn rtcp_iv(salt: &[u8; 14], ssrc: u32, srtcp_index: u32) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[4..8].copy_from_slice(&ssrc.to_be_bytes());
    iv[10..14].copy_from_slice(&srtcp_index.to_be_bytes());
    for (b, s) in iv.iter_mut().zip(salt) {
        *b ^= s;
    }
    iv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::rtcp;

    fn make_test_material() -> KeyingMaterial {
        let mut key = [0u8; 16];
        let mut salt = [0u8; 14];
        for (i, b) in key.iter_mut().enumerate() {
            *b = i as u8;
        }
        for (i, b) in salt.iter_mut().enumerate() {
            *b = (16 + i) as u8;
        }
        KeyingMaterial::new(&key, &salt).unwrap()
    }

    fn make_cipher(profile: Profile, mki: &[u8]) -> AesCmHmacSha1 {
        AesCmHmacSha1::new(profile, &make_test_material(), mki.to_vec()).unwrap()
    }

    fn protect(cipher: &AesCmHmacSha1, packet: &[u8], roc: u32) -> Vec<u8> {
        let (header, len) = rtp::Header::parse(packet).unwrap();
        cipher
            .encrypt_rtp(Vec::new(), &header, &packet[len..], roc)
            .unwrap()
    }

    fn unprotect(cipher: &AesCmHmacSha1, packet: &[u8], roc: u32) -> Result<Vec<u8>> {
        let (header, len) = rtp::Header::parse(packet).unwrap();
        cipher.decrypt_rtp(Vec::new(), packet, &header, len, roc)
    }

    #[test]
    fn test_rfc3711_aes_cm_keystream() {
        // RFC 3711 appendix B.2: SSRC, ROC and SEQ all zero.
        let key: [u8; 16] = [
            0x2B, 0x7E, 0x15, 0x16, 0x28, 0xAE, 0xD2, 0xA6, 0xAB, 0xF7, 0x15, 0x88, 0x09, 0xCF,
            0x4F, 0x3C,
        ];
        let salt: [u8; 14] = [
            0xF0, 0xF1, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6, 0xF7, 0xF8, 0xF9, 0xFA, 0xFB, 0xFC, 0xFD,
        ];
        let iv = rtp_iv(&salt, 0, 0, 0);
        assert_eq!(&iv[..14], &salt);
        assert_eq!(&iv[14..], &[0, 0]);

        let mut keystream = [0u8; 16];
        let mut cipher = Aes128Ctr::new((&key).into(), &iv.into());
        cipher.apply_keystream(&mut keystream);
        assert_eq!(
            keystream,
            [
                0xE0, 0x3E, 0xAD, 0x09, 0x35, 0xC9, 0x5E, 0x80, 0xE1, 0x66, 0xB1, 0x6D, 0xD9, 0x2B,
                0x4E, 0xB4
            ]
        );
    }

    #[test]
    fn test_iv_places_index_fields() {
        let iv = rtp_iv(&[0; 14], 0x11223344, 0xAABBCCDD, 0xEEFF);
        assert_eq!(
            iv,
            [0, 0, 0, 0, 0x11, 0x22, 0x33, 0x44, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0, 0]
        );
        let iv = rtcp_iv(&[0; 14], 0x11223344, 0x7FFF_FFFF);
        assert_eq!(
            iv,
            [0, 0, 0, 0, 0x11, 0x22, 0x33, 0x44, 0, 0, 0x7F, 0xFF, 0xFF, 0xFF, 0, 0]
        );
    }

    #[test]
    fn test_protect_unprotect_roundtrip() {
        let cipher = make_cipher(Profile::Aes128CmHmacSha1_80, &[]);
        let payload = vec![0xFF; 160];
        let packet = rtp::encode(0, 1, 160, 0xDEADBEEF, &payload);

        let srtp = protect(&cipher, &packet, 0);
        assert_eq!(srtp.len(), packet.len() + 10);
        assert_eq!(&srtp[..rtp::RTP_HEADER_SIZE], &packet[..rtp::RTP_HEADER_SIZE]);
        assert_ne!(&srtp[rtp::RTP_HEADER_SIZE..srtp.len() - 10], payload.as_slice());

        assert_eq!(unprotect(&cipher, &srtp, 0).unwrap(), packet);
    }

    #[test]
    fn test_roc_is_authenticated() {
        let cipher = make_cipher(Profile::Aes128CmHmacSha1_80, &[]);
        let packet = rtp::encode(0, 1, 160, 0xDEADBEEF, &[0x55; 40]);
        let srtp = protect(&cipher, &packet, 3);
        assert_eq!(unprotect(&cipher, &srtp, 2), Err(Error::AuthTagMismatch));
        assert_eq!(unprotect(&cipher, &srtp, 3).unwrap(), packet);
    }

    #[test]
    fn test_auth_tag_mismatch() {
        let cipher = make_cipher(Profile::Aes128CmHmacSha1_80, &[]);
        let packet = rtp::encode(0, 1, 160, 0xDEADBEEF, &[0xFF; 160]);
        let mut srtp = protect(&cipher, &packet, 0);
        let len = srtp.len();
        srtp[len - 1] ^= 0xFF;
        assert_eq!(unprotect(&cipher, &srtp, 0), Err(Error::AuthTagMismatch));
    }

    #[test]
    fn test_sha1_32_profile_tag_lengths() {
        let cipher = make_cipher(Profile::Aes128CmHmacSha1_32, &[]);
        assert_eq!(cipher.rtp_auth_tag_len(), 4);
        assert_eq!(cipher.rtcp_auth_tag_len(), 10);

        let packet = rtp::encode(96, 9, 0, 1, &[1, 2, 3]);
        let srtp = protect(&cipher, &packet, 0);
        assert_eq!(srtp.len(), packet.len() + 4);
        assert_eq!(unprotect(&cipher, &srtp, 0).unwrap(), packet);
    }

    #[test]
    fn test_mki_written_before_tag() {
        let mki = [0xCA, 0xFE];
        let cipher = make_cipher(Profile::Aes128CmHmacSha1_80, &mki);
        let packet = rtp::encode(0, 1, 0, 1, &[0; 20]);
        let srtp = protect(&cipher, &packet, 0);

        assert_eq!(srtp.len(), packet.len() + 2 + 10);
        assert_eq!(cipher.extract_mki(&srtp, true), &mki);
        assert_eq!(unprotect(&cipher, &srtp, 0).unwrap(), packet);
    }

    #[test]
    fn test_decrypt_reuses_destination() {
        let cipher = make_cipher(Profile::Aes128CmHmacSha1_80, &[]);
        let packet = rtp::encode(0, 1, 0, 1, &[7; 64]);
        let srtp = protect(&cipher, &packet, 0);

        let dst = Vec::with_capacity(512);
        let ptr = dst.as_ptr();
        let (header, len) = rtp::Header::parse(&srtp).unwrap();
        let out = cipher.decrypt_rtp(dst, &srtp, &header, len, 0).unwrap();
        assert_eq!(out.as_ptr(), ptr);
        assert_eq!(out, packet);
    }

    #[test]
    fn test_protect_unprotect_rtcp_roundtrip() {
        let cipher = make_cipher(Profile::Aes128CmHmacSha1_80, &[]);
        let rtcp = rtcp::empty_sender_report(0xCAFEBABE);

        let srtcp = cipher
            .encrypt_rtcp(Vec::new(), &rtcp, 1, 0xCAFEBABE)
            .unwrap();
        // header(8) + encrypted_payload(20) + E||index(4) + auth_tag(10) = 42
        assert_eq!(srtcp.len(), rtcp.len() + 4 + 10);
        assert_eq!(&srtcp[..8], &rtcp[..8]);
        assert_ne!(&srtcp[8..28], &rtcp[8..28]);
        assert_eq!(&srtcp[28..32], &[0x80, 0, 0, 1]);
        assert_eq!(cipher.rtcp_index(&srtcp), Some(1));

        let decrypted = cipher
            .decrypt_rtcp(Vec::new(), &srtcp, 1, 0xCAFEBABE)
            .unwrap();
        assert_eq!(decrypted, rtcp);
    }

    #[test]
    fn test_srtcp_auth_tag_mismatch() {
        let cipher = make_cipher(Profile::Aes128CmHmacSha1_80, &[]);
        let rtcp = rtcp::empty_sender_report(0xDEADC0DE);
        let mut srtcp = cipher
            .encrypt_rtcp(Vec::new(), &rtcp, 5, 0xDEADC0DE)
            .unwrap();
        let len = srtcp.len();
        srtcp[len - 1] ^= 0xFF;
        assert_eq!(
            cipher.decrypt_rtcp(Vec::new(), &srtcp, 5, 0xDEADC0DE),
            Err(Error::AuthTagMismatch)
        );
    }

    #[test]
    fn test_srtcp_too_short() {
        let cipher = make_cipher(Profile::Aes128CmHmacSha1_80, &[]);
        assert_eq!(cipher.rtcp_index(&[0; 6]), None);
        assert_eq!(
            cipher.decrypt_rtcp(Vec::new(), &[0x80; 21], 0, 0),
            Err(Error::TooShortRtcp(21))
        );
    }
}
