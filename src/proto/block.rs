use std::{fmt, str};

use super::{ProtoError, Result};

pub(crate) const BLOCK_MARKER: u8 = b'#';

/// Largest block payload accepted, 2-byte samples of a 20M point record.
pub const MAX_BLOCK_LEN: usize = 40_000_000;

/// Header of an IEEE 488.2 arbitrary block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockHeader {
    /// `#<n><len>`, `header_len` is `2 + n`.
    Definite {
        header_len: usize,
        payload_len: usize,
    },
    /// `#0`, the payload runs up to the terminator.
    Indefinite,
}

impl BlockHeader {
    pub const INDEFINITE_HEADER_LEN: usize = 2;

    /// Parse the header at the start of `src`.
    ///
    /// Returns `Ok(None)` while the header is incomplete.
    pub fn parse(src: &[u8]) -> Result<Option<Self>> {
        if src.is_empty() {
            return Ok(None);
        }
        if src[0] != BLOCK_MARKER {
            return Err(ProtoError::protocol(format!(
                "block must start with '#', got {:#04x}",
                src[0]
            )));
        }
        let digits = match src.get(1) {
            None => return Ok(None),
            Some(d) if d.is_ascii_digit() => (d - b'0') as usize,
            Some(d) => {
                return Err(ProtoError::protocol(format!(
                    "invalid block digit count {:?}",
                    *d as char
                )))
            }
        };
        if digits == 0 {
            return Ok(Some(Self::Indefinite));
        }

        let header_len = 2 + digits;
        if src.len() < header_len {
            return Ok(None);
        }
        let len_field = &src[2..header_len];
        if !len_field.iter().all(u8::is_ascii_digit) {
            return Err(ProtoError::protocol(format!(
                "invalid block length {:?}",
                String::from_utf8_lossy(len_field)
            )));
        }
        // Only ASCII digits left, so both conversions hold.
        let payload_len = str::from_utf8(len_field)
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or_else(|| ProtoError::protocol("block length does not fit"))?;
        if payload_len > MAX_BLOCK_LEN {
            return Err(ProtoError::protocol(format!(
                "block announces {} bytes, limit is {}",
                payload_len, MAX_BLOCK_LEN
            )));
        }

        Ok(Some(Self::Definite {
            header_len,
            payload_len,
        }))
    }

    pub fn header_len(&self) -> usize {
        match self {
            Self::Definite { header_len, .. } => *header_len,
            Self::Indefinite => Self::INDEFINITE_HEADER_LEN,
        }
    }
}

/// How far a block transfer got, kept by the codec for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockProgress {
    pub received: usize,
    pub expected: Option<usize>,
}

impl fmt::Display for BlockProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.expected {
            Some(expected) => write!(f, "{} of {} bytes received", self.received, expected),
            None => write!(f, "{} bytes received", self.received),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definite_header() {
        let header = BlockHeader::parse(b"#3120abc").expect("valid header");
        assert_eq!(
            header,
            Some(BlockHeader::Definite {
                header_len: 5,
                payload_len: 120
            })
        );
    }

    #[test]
    fn incomplete_header_needs_more_bytes() {
        assert_eq!(BlockHeader::parse(b"").unwrap(), None);
        assert_eq!(BlockHeader::parse(b"#").unwrap(), None);
        assert_eq!(BlockHeader::parse(b"#41").unwrap(), None);
    }

    #[test]
    fn indefinite_header() {
        assert_eq!(
            BlockHeader::parse(b"#0\x01\x02").unwrap(),
            Some(BlockHeader::Indefinite)
        );
    }

    #[test]
    fn oversized_block_is_rejected() {
        assert!(matches!(
            BlockHeader::parse(b"#9999999999"),
            Err(ProtoError::Protocol(_))
        ));
        assert!(matches!(
            BlockHeader::parse(b"#840000001"),
            Err(ProtoError::Protocol(_))
        ));
        assert_eq!(
            BlockHeader::parse(b"#840000000").unwrap(),
            Some(BlockHeader::Definite {
                header_len: 10,
                payload_len: MAX_BLOCK_LEN
            })
        );
    }

    #[test]
    fn malformed_headers() {
        assert!(matches!(
            BlockHeader::parse(b"1.25\n"),
            Err(ProtoError::Protocol(_))
        ));
        assert!(matches!(
            BlockHeader::parse(b"#x12"),
            Err(ProtoError::Protocol(_))
        ));
        assert!(matches!(
            BlockHeader::parse(b"#21a"),
            Err(ProtoError::Protocol(_))
        ));
    }
}
