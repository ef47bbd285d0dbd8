//! RTP header encoding/decoding.
//!
//! RTP header format (RFC 3550):
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V=2|P|X|  CC   |M|     PT      |       sequence number         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           timestamp                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           synchronization source (SSRC) identifier            |
//! +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
//! |            contributing source (CSRC) identifiers             |
//! |                             ....                              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! SRTP leaves the header in the clear, so the codec only needs to locate
//! the payload and pull out SSRC and sequence number; it keeps every other
//! field so a parsed header can be written back byte for byte.

use super::HeaderError;

/// Minimum RTP header size in bytes (no CSRC, no extension).
pub const RTP_HEADER_SIZE: usize = 12;

const VERSION: u8 = 2;
const MAX_CSRC: usize = 15;

/// RTP header extension block (RFC 3550 section 5.3.1).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extension {
    pub profile: u16,
    /// Extension body; padded with zeros to a multiple of 4 bytes on write.
    pub payload: Vec<u8>,
}

impl Extension {
    fn words(&self) -> usize {
        self.payload.len().div_ceil(4)
    }
}

/// Parsed RTP header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub padding: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc: Vec<u32>,
    pub extension: Option<Extension>,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            version: VERSION,
            padding: false,
            marker: false,
            payload_type: 0,
            sequence_number: 0,
            timestamp: 0,
            ssrc: 0,
            csrc: Vec::new(),
            extension: None,
        }
    }
}

impl Header {
    /// Parse a header from the front of `data`.
    ///
    /// Returns the header and the number of bytes it occupies; the payload
    /// starts right after.
    pub fn parse(data: &[u8]) -> Result<(Self, usize), HeaderError> {
        if data.len() < RTP_HEADER_SIZE {
            return Err(HeaderError::TooShort(data.len()));
        }

        let version = (data[0] >> 6) & 0x03;
        if version != VERSION {
            return Err(HeaderError::Version(version));
        }

        let padding = (data[0] >> 5) & 0x01 != 0;
        let has_extension = (data[0] >> 4) & 0x01 != 0;
        let csrc_count = (data[0] & 0x0F) as usize;
        let marker = (data[1] >> 7) & 0x01 != 0;
        let payload_type = data[1] & 0x7F;
        let sequence_number = u16::from_be_bytes([data[2], data[3]]);
        let timestamp = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let ssrc = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

        let mut len = RTP_HEADER_SIZE + csrc_count * 4;
        if data.len() < len {
            return Err(HeaderError::TruncatedCsrc);
        }
        let csrc = data[RTP_HEADER_SIZE..len]
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        let extension = if has_extension {
            // 2 bytes profile + 2 bytes length (in 32-bit words)
            if data.len() < len + 4 {
                return Err(HeaderError::TruncatedExtension);
            }
            let profile = u16::from_be_bytes([data[len], data[len + 1]]);
            let ext_words = u16::from_be_bytes([data[len + 2], data[len + 3]]) as usize;
            len += 4;
            if data.len() < len + ext_words * 4 {
                return Err(HeaderError::TruncatedExtension);
            }
            let payload = data[len..len + ext_words * 4].to_vec();
            len += ext_words * 4;
            Some(Extension { profile, payload })
        } else {
            None
        };

        Ok((
            Self {
                version,
                padding,
                marker,
                payload_type,
                sequence_number,
                timestamp,
                ssrc,
                csrc,
                extension,
            },
            len,
        ))
    }

    /// Parse into `self`, returning the header length.
    pub fn unmarshal(&mut self, data: &[u8]) -> Result<usize, HeaderError> {
        let (header, len) = Self::parse(data)?;
        *self = header;
        Ok(len)
    }

    /// Serialized length of this header.
    pub fn marshal_size(&self) -> usize {
        let ext = self.extension.as_ref().map_or(0, |e| 4 + e.words() * 4);
        RTP_HEADER_SIZE + self.csrc.len() * 4 + ext
    }

    /// Write the header into the front of `buf`, returning the bytes written.
    pub fn marshal_to(&self, buf: &mut [u8]) -> Result<usize, HeaderError> {
        if self.csrc.len() > MAX_CSRC {
            return Err(HeaderError::TooManyCsrcs(self.csrc.len()));
        }
        if let Some(ext) = &self.extension {
            if ext.words() > u16::MAX as usize {
                return Err(HeaderError::ExtensionTooLong(ext.words()));
            }
        }
        let size = self.marshal_size();
        if buf.len() < size {
            return Err(HeaderError::BufferTooSmall {
                need: size,
                have: buf.len(),
            });
        }

        buf[0] = (self.version << 6)
            | (u8::from(self.padding) << 5)
            | (u8::from(self.extension.is_some()) << 4)
            | self.csrc.len() as u8;
        buf[1] = (u8::from(self.marker) << 7) | (self.payload_type & 0x7F);
        buf[2..4].copy_from_slice(&self.sequence_number.to_be_bytes());
        buf[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[8..12].copy_from_slice(&self.ssrc.to_be_bytes());

        let mut pos = RTP_HEADER_SIZE;
        for csrc in &self.csrc {
            buf[pos..pos + 4].copy_from_slice(&csrc.to_be_bytes());
            pos += 4;
        }

        if let Some(ext) = &self.extension {
            let words = ext.words();
            buf[pos..pos + 2].copy_from_slice(&ext.profile.to_be_bytes());
            buf[pos + 2..pos + 4].copy_from_slice(&(words as u16).to_be_bytes());
            pos += 4;
            buf[pos..pos + ext.payload.len()].copy_from_slice(&ext.payload);
            buf[pos + ext.payload.len()..pos + words * 4].fill(0);
            pos += words * 4;
        }

        Ok(pos)
    }

    pub fn marshal(&self) -> Result<Vec<u8>, HeaderError> {
        let mut buf = vec![0u8; self.marshal_size()];
        self.marshal_to(&mut buf)?;
        Ok(buf)
    }
}

/// Encode a plain RTP packet (no CSRC, no extension) into bytes.
pub fn encode(payload_type: u8, seq: u16, timestamp: u32, ssrc: u32, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(RTP_HEADER_SIZE + payload.len());

    // Byte 0: V=2, P=0, X=0, CC=0 -> 0x80
    buf.push(0x80);
    // Byte 1: M=0, PT
    buf.push(payload_type & 0x7F);
    buf.extend_from_slice(&seq.to_be_bytes());
    buf.extend_from_slice(&timestamp.to_be_bytes());
    buf.extend_from_slice(&ssrc.to_be_bytes());
    buf.extend_from_slice(payload);

    buf
}
