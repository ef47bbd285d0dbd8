//! SRTP keying material and session key derivation (RFC 3711 section 4.3).
//!
//! Master keys arrive either from configuration or from an SDES
//! `a=crypto` line: `AES_CM_128_HMAC_SHA1_80 inline:<base64 key||salt>`.

use std::fmt;
use std::str::FromStr;

use aes::cipher::{KeyIvInit, StreamCipher};
use anyhow::{bail, Context};
use base64::Engine;

use super::error::{Error, Result};

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;

/// Master key length for AES-128 (16 bytes).
pub const MASTER_KEY_LEN: usize = 16;

/// Master salt length (14 bytes per RFC 3711).
pub const MASTER_SALT_LEN: usize = 14;

/// Total keying material: 16 bytes key + 14 bytes salt = 30 bytes.
pub const KEYING_MATERIAL_LEN: usize = MASTER_KEY_LEN + MASTER_SALT_LEN;

/// HMAC-SHA1 session authentication key length (160 bits).
pub const AUTH_KEY_LEN: usize = 20;

/// Key derivation labels (RFC 3711, section 4.3.1).
const LABEL_SRTP_CIPHER_KEY: u8 = 0x00;
const LABEL_SRTP_AUTH_KEY: u8 = 0x01;
const LABEL_SRTP_SALT: u8 = 0x02;
const LABEL_SRTCP_CIPHER_KEY: u8 = 0x03;
const LABEL_SRTCP_AUTH_KEY: u8 = 0x04;
const LABEL_SRTCP_SALT: u8 = 0x05;

/// SRTP protection profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    /// AES-128-CM with an 80-bit HMAC-SHA1 tag.
    #[default]
    Aes128CmHmacSha1_80,
    /// AES-128-CM with a 32-bit HMAC-SHA1 tag on SRTP (SRTCP keeps 80 bits).
    Aes128CmHmacSha1_32,
}

impl Profile {
    pub fn rtp_auth_tag_len(self) -> usize {
        match self {
            Profile::Aes128CmHmacSha1_80 => 10,
            Profile::Aes128CmHmacSha1_32 => 4,
        }
    }

    /// RFC 3711 section 5.2: SRTCP always carries the full 80-bit tag.
    pub fn rtcp_auth_tag_len(self) -> usize {
        10
    }

    /// Extra tag bytes carried inside the ciphertext by AEAD profiles.
    pub fn aead_auth_tag_len(self) -> usize {
        0
    }

    pub fn name(self) -> &'static str {
        match self {
            Profile::Aes128CmHmacSha1_80 => "AES_CM_128_HMAC_SHA1_80",
            Profile::Aes128CmHmacSha1_32 => "AES_CM_128_HMAC_SHA1_32",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Profile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "AES_CM_128_HMAC_SHA1_80" => Ok(Profile::Aes128CmHmacSha1_80),
            "AES_CM_128_HMAC_SHA1_32" => Ok(Profile::Aes128CmHmacSha1_32),
            other => bail!("unsupported SRTP profile: {}", other),
        }
    }
}

/// Master key and salt for one SRTP cryptographic context.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyingMaterial {
    pub master_key: [u8; MASTER_KEY_LEN],
    pub master_salt: [u8; MASTER_SALT_LEN],
}

// Keys stay out of logs.
impl fmt::Debug for KeyingMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyingMaterial").finish_non_exhaustive()
    }
}

impl KeyingMaterial {
    /// Build from separate key and salt slices of the exact lengths.
    pub fn new(master_key: &[u8], master_salt: &[u8]) -> Result<Self> {
        let master_key: [u8; MASTER_KEY_LEN] = master_key
            .try_into()
            .map_err(|_| Error::InvalidMasterKeyLength(master_key.len()))?;
        let master_salt: [u8; MASTER_SALT_LEN] = master_salt
            .try_into()
            .map_err(|_| Error::InvalidMasterSaltLength(master_salt.len()))?;
        Ok(Self {
            master_key,
            master_salt,
        })
    }

    /// Split SDES-style concatenated `key || salt` (extra trailing bytes are ignored).
    pub fn from_concatenated(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < KEYING_MATERIAL_LEN {
            return Err(Error::InvalidMasterKeyLength(bytes.len()));
        }
        Self::new(
            &bytes[..MASTER_KEY_LEN],
            &bytes[MASTER_KEY_LEN..KEYING_MATERIAL_LEN],
        )
    }

    /// Fresh random keying material from the OS CSPRNG.
    pub fn generate() -> anyhow::Result<Self> {
        let mut buf = [0u8; KEYING_MATERIAL_LEN];
        getrandom::getrandom(&mut buf).map_err(|e| anyhow::anyhow!("OS CSPRNG failed: {}", e))?;
        Ok(Self::from_concatenated(&buf)?)
    }

    /// Base64 of `key || salt`, the SDES `inline:` encoding.
    pub fn to_base64(&self) -> String {
        let mut buf = [0u8; KEYING_MATERIAL_LEN];
        buf[..MASTER_KEY_LEN].copy_from_slice(&self.master_key);
        buf[MASTER_KEY_LEN..].copy_from_slice(&self.master_salt);
        base64::engine::general_purpose::STANDARD.encode(buf)
    }

    pub fn from_base64(b64: &str) -> anyhow::Result<Self> {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(b64.trim())
            .context("failed to base64 decode SRTP key")?;
        if decoded.len() < KEYING_MATERIAL_LEN {
            bail!(
                "SRTP keying material too short: {} bytes (need {})",
                decoded.len(),
                KEYING_MATERIAL_LEN
            );
        }
        Ok(Self::from_concatenated(&decoded)?)
    }

    /// Format as an SDP crypto attribute.
    pub fn crypto_line(&self, tag: u32, profile: Profile) -> String {
        format!(
            "a=crypto:{} {} inline:{}|2^31",
            tag,
            profile,
            self.to_base64()
        )
    }
}

/// Parsed SDES crypto attribute.
#[derive(Debug, Clone)]
pub struct CryptoAttribute {
    /// Crypto tag number from SDP.
    pub tag: u32,
    pub profile: Profile,
    pub material: KeyingMaterial,
}

/// Parse an SDP crypto line to extract SRTP keying material.
///
/// Formats handled:
/// - `a=crypto:2 AES_CM_128_HMAC_SHA1_80 inline:<base64key>|2^31|1:1`
/// - `a=crypto:3 AES_CM_128_HMAC_SHA1_32 inline:<base64key>|2^31`
/// - `a=cryptoscale:1 client AES_CM_128_HMAC_SHA1_80 inline:<base64key>|2^31|1:1`
pub fn parse_crypto_line(line: &str) -> anyhow::Result<CryptoAttribute> {
    let line = line.trim();

    let rest = if let Some(rest) = line.strip_prefix("a=crypto:") {
        rest
    } else if let Some(rest) = line.strip_prefix("a=cryptoscale:") {
        rest
    } else {
        bail!("not a crypto line: {}", line);
    };

    let mut fields = rest.split_whitespace();
    let tag = fields
        .next()
        .context("malformed crypto line")?
        .parse::<u32>()
        .context("bad crypto tag")?;

    let mut profile = None;
    let mut inline = None;
    for field in fields {
        if let Some(key_params) = field.strip_prefix("inline:") {
            inline = Some(key_params);
        } else if let Ok(p) = field.parse::<Profile>() {
            profile = Some(p);
        }
    }
    let profile = profile.context("no supported crypto suite in crypto line")?;
    let key_params = inline.context("no inline: key in crypto line")?;

    // Key is everything up to the first '|' (lifetime and MKI follow).
    let b64_key = key_params.split('|').next().unwrap_or(key_params);
    let material = KeyingMaterial::from_base64(b64_key)?;

    Ok(CryptoAttribute {
        tag,
        profile,
        material,
    })
}

/// Session keys for one direction of SRTP or SRTCP.
#[derive(Clone)]
pub struct SessionKeys {
    pub cipher_key: [u8; MASTER_KEY_LEN],
    pub auth_key: [u8; AUTH_KEY_LEN],
    pub salt: [u8; MASTER_SALT_LEN],
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeys").finish_non_exhaustive()
    }
}

impl SessionKeys {
    /// SRTP session keys (labels 0x00-0x02).
    pub fn srtp(material: &KeyingMaterial) -> Self {
        Self {
            cipher_key: prf(material, LABEL_SRTP_CIPHER_KEY),
            auth_key: prf(material, LABEL_SRTP_AUTH_KEY),
            salt: prf(material, LABEL_SRTP_SALT),
        }
    }

    /// SRTCP session keys (labels 0x03-0x05).
    pub fn srtcp(material: &KeyingMaterial) -> Self {
        Self {
            cipher_key: prf(material, LABEL_SRTCP_CIPHER_KEY),
            auth_key: prf(material, LABEL_SRTCP_AUTH_KEY),
            salt: prf(material, LABEL_SRTCP_SALT),
        }
    }
}

/// AES-128-CM PRF with key_derivation_rate = 0 (RFC 3711, 4.3.1 and 4.3.3).
///
/// x = label || r, with r = 0, right-aligned in 14 bytes so the label sits
/// at byte 7; IV = (master_salt XOR x) || 0x0000.
fn prf<const N: usize>(material: &KeyingMaterial, label: u8) -> [u8; N] {
    let mut iv = [0u8; 16];
    iv[..MASTER_SALT_LEN].copy_from_slice(&material.master_salt);
    iv[7] ^= label;

    let mut output = [0u8; N];
    let mut cipher = Aes128Ctr::new((&material.master_key).into(), &iv.into());
    cipher.apply_keystream(&mut output);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 3711 appendix B.3.
    const MASTER_KEY: [u8; 16] = [
        0xE1, 0xF9, 0x7A, 0x0D, 0x3E, 0x01, 0x8B, 0xE0, 0xD6, 0x4F, 0xA3, 0x2C, 0x06, 0xDE, 0x41,
        0x39,
    ];
    const MASTER_SALT: [u8; 14] = [
        0x0E, 0xC6, 0x75, 0xAD, 0x49, 0x8A, 0xFE, 0xEB, 0xB6, 0x96, 0x0B, 0x3A, 0xAB, 0xE6,
    ];

    #[test]
    fn test_rfc3711_key_derivation() {
        let material = KeyingMaterial::new(&MASTER_KEY, &MASTER_SALT).unwrap();
        let keys = SessionKeys::srtp(&material);

        assert_eq!(
            keys.cipher_key,
            [
                0xC6, 0x1E, 0x7A, 0x93, 0x74, 0x4F, 0x39, 0xEE, 0x10, 0x73, 0x4A, 0xFE, 0x3F, 0xF7,
                0xA0, 0x87
            ]
        );
        assert_eq!(
            keys.salt,
            [0x30, 0xCB, 0xBC, 0x08, 0x86, 0x3D, 0x8C, 0x85, 0xD4, 0x9D, 0xB3, 0x4A, 0x9A, 0xE1]
        );
        assert_eq!(
            keys.auth_key,
            [
                0xCE, 0xBE, 0x32, 0x1F, 0x6F, 0xF7, 0x71, 0x6B, 0x6F, 0xD4, 0xAB, 0x49, 0xAF, 0x25,
                0x6A, 0x15, 0x6D, 0x38, 0xBA, 0xA4
            ]
        );
    }

    #[test]
    fn test_srtcp_keys_differ_from_srtp() {
        let material = KeyingMaterial::new(&MASTER_KEY, &MASTER_SALT).unwrap();
        let srtp = SessionKeys::srtp(&material);
        let srtcp = SessionKeys::srtcp(&material);
        assert_ne!(srtp.cipher_key, srtcp.cipher_key);
        assert_ne!(srtp.auth_key, srtcp.auth_key);
        assert_ne!(srtp.salt, srtcp.salt);
    }

    #[test]
    fn test_material_length_checks() {
        assert_eq!(
            KeyingMaterial::new(&[0; 15], &[0; 14]).unwrap_err(),
            Error::InvalidMasterKeyLength(15)
        );
        assert_eq!(
            KeyingMaterial::new(&[0; 16], &[0; 12]).unwrap_err(),
            Error::InvalidMasterSaltLength(12)
        );
        assert!(KeyingMaterial::from_concatenated(&[0; 29]).is_err());
    }

    #[test]
    fn test_parse_crypto_line() {
        let b64 = base64::engine::general_purpose::STANDARD.encode([0xABu8; 30]);
        let line = format!("a=crypto:2 AES_CM_128_HMAC_SHA1_80 inline:{}|2^31|1:1", b64);
        let attr = parse_crypto_line(&line).unwrap();
        assert_eq!(attr.tag, 2);
        assert_eq!(attr.profile, Profile::Aes128CmHmacSha1_80);
        assert_eq!(attr.material.master_key, [0xAB; 16]);
        assert_eq!(attr.material.master_salt, [0xAB; 14]);
    }

    #[test]
    fn test_parse_cryptoscale_line() {
        let b64 = base64::engine::general_purpose::STANDARD.encode([0xCDu8; 30]);
        let line = format!(
            "a=cryptoscale:1 client AES_CM_128_HMAC_SHA1_32 inline:{}|2^31|1:1",
            b64
        );
        let attr = parse_crypto_line(&line).unwrap();
        assert_eq!(attr.tag, 1);
        assert_eq!(attr.profile, Profile::Aes128CmHmacSha1_32);
    }

    #[test]
    fn test_parse_crypto_line_rejects_garbage() {
        assert!(parse_crypto_line("a=rtpmap:0 PCMU/8000").is_err());
        assert!(parse_crypto_line("a=crypto:1 AES_CM_128_HMAC_SHA1_80").is_err());
        assert!(parse_crypto_line("a=crypto:1 F8_128_HMAC_SHA1_80 inline:AAAA").is_err());
        let short = base64::engine::general_purpose::STANDARD.encode([1u8; 10]);
        assert!(parse_crypto_line(&format!(
            "a=crypto:1 AES_CM_128_HMAC_SHA1_80 inline:{}",
            short
        ))
        .is_err());
    }

    #[test]
    fn test_crypto_line_roundtrip() {
        let material = KeyingMaterial::new(&MASTER_KEY, &MASTER_SALT).unwrap();
        let line = material.crypto_line(5, Profile::Aes128CmHmacSha1_32);
        assert!(line.starts_with("a=crypto:5 AES_CM_128_HMAC_SHA1_32 inline:"));
        let attr = parse_crypto_line(&line).unwrap();
        assert_eq!(attr.material, material);
        assert_eq!(attr.profile, Profile::Aes128CmHmacSha1_32);
    }

    #[test]
    fn test_generate_is_random() {
        let a = KeyingMaterial::generate().unwrap();
        let b = KeyingMaterial::generate().unwrap();
        assert_ne!(a, b);
    }
}
