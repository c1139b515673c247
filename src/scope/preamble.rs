use crate::proto::response::parse_scalar;
use crate::proto::{ProtoError, Result};

/// Encoding requested with `DATa:ENCdg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataEncoding {
    Ascii,
    /// Signed integer, MSB first.
    SignedBinary,
    /// Unsigned integer, MSB first.
    UnsignedBinary,
}

impl DataEncoding {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            DataEncoding::Ascii => "ASCii",
            DataEncoding::SignedBinary => "RIBinary",
            DataEncoding::UnsignedBinary => "RPBinary",
        }
    }
}

/// What the scope is asked to send for `CURVe?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferFormat {
    pub encoding: DataEncoding,
    /// Bytes per sample, 1 or 2.
    pub width: u8,
}

impl Default for TransferFormat {
    fn default() -> Self {
        Self {
            encoding: DataEncoding::SignedBinary,
            width: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Ascii,
    Binary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Msb,
    Lsb,
}

/// Layout of the codes in a curve transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveformFormat {
    pub encoding: Encoding,
    pub signed: bool,
    pub width: u8,
    pub order: ByteOrder,
}

/// Scaling and layout of the waveform about to be transferred.
///
/// Field names follow the `WFMOutpre` query set: `y_reference` is `YOFf`
/// (in digitizing levels), `y_offset` is `YZEro` (in vertical units).
#[derive(Debug, Clone, PartialEq)]
pub struct Preamble {
    pub format: WaveformFormat,
    pub points: usize,
    pub x_increment: f64,
    pub x_origin: f64,
    pub y_multiplier: f64,
    pub y_offset: f64,
    pub y_reference: f64,
}

const FIELD_COUNT: usize = 10;

/// Largest record a preamble may announce. Bench scopes top out at a few
/// million points, anything above is a corrupt reply.
pub const MAX_POINTS: usize = 20_000_000;

impl Preamble {
    /// Parse the reply to the compound `WFMOutpre` query, e.g.
    /// `BIN;RP;1;MSB;4;1.0E-6;0.0E0;4.0E-2;1.28E2;0.0E0`.
    pub fn parse(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.trim().split(';').map(str::trim).collect();
        if fields.len() != FIELD_COUNT {
            return Err(ProtoError::protocol(format!(
                "preamble has {} fields, expected {}: {:?}",
                fields.len(),
                FIELD_COUNT,
                line
            )));
        }

        let encoding = match fields[0].to_ascii_uppercase().as_str() {
            "BIN" | "BINARY" => Encoding::Binary,
            "ASC" | "ASCII" => Encoding::Ascii,
            other => return Err(ProtoError::protocol(format!("unknown encoding {:?}", other))),
        };
        let signed = match fields[1].to_ascii_uppercase().as_str() {
            "RI" => true,
            "RP" => false,
            other => {
                return Err(ProtoError::protocol(format!(
                    "unknown binary format {:?}",
                    other
                )))
            }
        };
        let width = match number(fields[2], "BYT_Nr")? {
            w if w == 1.0 => 1,
            w if w == 2.0 => 2,
            w => return Err(ProtoError::protocol(format!("unsupported byte width {}", w))),
        };
        let order = match fields[3].to_ascii_uppercase().as_str() {
            "MSB" => ByteOrder::Msb,
            "LSB" => ByteOrder::Lsb,
            other => return Err(ProtoError::protocol(format!("unknown byte order {:?}", other))),
        };

        let points = number(fields[4], "NR_Pt")?;
        if points.fract() != 0.0 {
            return Err(ProtoError::protocol(format!("point count {} is not whole", points)));
        }
        if points > MAX_POINTS as f64 {
            return Err(ProtoError::protocol(format!(
                "point count {} exceeds {}",
                points, MAX_POINTS
            )));
        }

        let preamble = Self {
            format: WaveformFormat {
                encoding,
                signed,
                width,
                order,
            },
            points: if points > 0.0 { points as usize } else { 0 },
            x_increment: number(fields[5], "XINcr")?,
            x_origin: number(fields[6], "XZEro")?,
            y_multiplier: number(fields[7], "YMUlt")?,
            y_reference: number(fields[8], "YOFf")?,
            y_offset: number(fields[9], "YZEro")?,
        };
        preamble.validate()?;
        Ok(preamble)
    }

    pub fn validate(&self) -> Result<()> {
        if self.points == 0 {
            return Err(ProtoError::protocol("preamble reports no points"));
        }
        if self.x_increment == 0.0 {
            return Err(ProtoError::protocol("preamble reports zero x increment"));
        }
        Ok(())
    }

    /// Expected length of a binary curve payload.
    pub fn payload_len(&self) -> Result<usize> {
        self.points
            .checked_mul(usize::from(self.format.width))
            .ok_or_else(|| ProtoError::protocol(format!("{} points overflow", self.points)))
    }

    pub fn time_at(&self, index: usize) -> f64 {
        self.x_origin + index as f64 * self.x_increment
    }

    pub fn value_of(&self, code: f64) -> f64 {
        (code - self.y_reference) * self.y_multiplier + self.y_offset
    }
}

fn number(field: &str, name: &str) -> Result<f64> {
    match parse_scalar(field) {
        Ok((value, "")) if value.is_finite() => Ok(value),
        _ => Err(ProtoError::protocol(format!(
            "preamble field {} is not numeric: {:?}",
            name, field
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: &str = "BIN;RP;1;MSB;4;1.0E-6;0.0E0;4.0E-2;1.28E2;0.0E0";

    #[test]
    fn parse_reply() {
        let preamble = Preamble::parse(REPLY).unwrap();
        assert_eq!(
            preamble.format,
            WaveformFormat {
                encoding: Encoding::Binary,
                signed: false,
                width: 1,
                order: ByteOrder::Msb,
            }
        );
        assert_eq!(preamble.points, 4);
        assert_eq!(preamble.x_increment, 1.0e-6);
        assert_eq!(preamble.y_multiplier, 0.04);
        assert_eq!(preamble.y_reference, 128.0);
        assert_eq!(preamble.y_offset, 0.0);
        assert_eq!(preamble.payload_len().unwrap(), 4);
    }

    #[test]
    fn scaling() {
        let preamble = Preamble::parse("BIN;RI;2;LSB;10;2.0E-3;-5.0E-3;1.0E-1;1.0E1;5.0E-1").unwrap();
        assert_eq!(preamble.time_at(0), -5.0e-3);
        assert_eq!(preamble.time_at(3), -5.0e-3 + 3.0 * 2.0e-3);
        assert_eq!(preamble.value_of(10.0), 0.5);
        assert_eq!(preamble.value_of(20.0), (20.0 - 10.0) * 0.1 + 0.5);
    }

    #[test]
    fn no_points() {
        let err = Preamble::parse("BIN;RP;1;MSB;0;1.0E-6;0;4.0E-2;128;0").unwrap_err();
        assert!(matches!(err, ProtoError::Protocol(_)));
        let err = Preamble::parse("BIN;RP;1;MSB;-3;1.0E-6;0;4.0E-2;128;0").unwrap_err();
        assert!(matches!(err, ProtoError::Protocol(_)));
    }

    #[test]
    fn huge_point_count() {
        let err = Preamble::parse("BIN;RI;2;MSB;1e30;1.0E-6;0;1;0;0").unwrap_err();
        assert!(matches!(err, ProtoError::Protocol(_)), "{:?}", err);
        let err = Preamble::parse(&format!("BIN;RI;2;MSB;{};1.0E-6;0;1;0;0", MAX_POINTS + 1))
            .unwrap_err();
        assert!(matches!(err, ProtoError::Protocol(_)), "{:?}", err);

        let largest =
            Preamble::parse(&format!("BIN;RI;2;MSB;{};1.0E-6;0;1;0;0", MAX_POINTS)).unwrap();
        assert_eq!(largest.payload_len().unwrap(), 2 * MAX_POINTS);
    }

    #[test]
    fn payload_len_overflow() {
        let mut preamble = Preamble::parse(REPLY).unwrap();
        preamble.points = usize::MAX;
        preamble.format.width = 2;
        assert!(matches!(preamble.payload_len(), Err(ProtoError::Protocol(_))));
    }

    #[test]
    fn zero_x_increment() {
        let err = Preamble::parse("BIN;RP;1;MSB;4;0;0;4.0E-2;128;0").unwrap_err();
        assert!(matches!(err, ProtoError::Protocol(_)));
    }

    #[test]
    fn malformed() {
        for reply in [
            "BIN;RP;1;MSB;4;1.0E-6;0;4.0E-2;128",
            "BIN;RP;1;MSB;4;1.0E-6;0;4.0E-2;128;0;7",
            "HEX;RP;1;MSB;4;1.0E-6;0;4.0E-2;128;0",
            "BIN;FP;1;MSB;4;1.0E-6;0;4.0E-2;128;0",
            "BIN;RP;4;MSB;4;1.0E-6;0;4.0E-2;128;0",
            "BIN;RP;1;MID;4;1.0E-6;0;4.0E-2;128;0",
            "BIN;RP;1;MSB;2.5;1.0E-6;0;4.0E-2;128;0",
            "BIN;RP;1;MSB;4;fast;0;4.0E-2;128;0",
        ] {
            assert!(
                matches!(Preamble::parse(reply), Err(ProtoError::Protocol(_))),
                "{}",
                reply
            );
        }
    }
}
