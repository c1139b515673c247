use bytes::Bytes;

use super::{ProtoError, Result};

/// One framed instrument response.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Text line, terminator stripped.
    Line(String),
    /// Payload of a length-prefixed block, header stripped.
    Block(Bytes),
    /// Fixed-size frame.
    Raw(Bytes),
}

impl Response {
    pub fn into_line(self) -> Result<String> {
        match self {
            Response::Line(line) => Ok(line),
            other => Err(ProtoError::Unexpected(other)),
        }
    }

    pub fn into_scalar(self) -> Result<f64> {
        let line = self.into_line()?;
        parse_scalar(&line).map(|(value, _unit)| value)
    }

    pub fn into_raw(self) -> Result<Bytes> {
        match self {
            Response::Raw(raw) => Ok(raw),
            other => Err(ProtoError::Unexpected(other)),
        }
    }
}

/// Split a scalar reply like `+1.2500E+00VDC` into value and unit suffix.
///
/// The suffix is returned as-is and does not scale the value.
pub fn parse_scalar(text: &str) -> Result<(f64, &str)> {
    let text = text.trim();
    let numeric = text
        .find(|c: char| !(c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E')))
        .unwrap_or(text.len());

    // "1.5e" style suffixes make the longest prefix unparsable, back off
    (1..=numeric)
        .rev()
        .find_map(|end| {
            text[..end]
                .parse::<f64>()
                .ok()
                .map(|value| (value, text[end..].trim()))
        })
        .ok_or_else(|| ProtoError::Parse(text.to_string()))
}

/// Answer to `*IDN?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub manufacturer: String,
    pub model: String,
    pub serial: String,
    pub firmware: String,
}

impl TryFrom<&str> for Ident {
    type Error = ProtoError;

    fn try_from(value: &str) -> Result<Self> {
        let values: Vec<&str> = value.trim().splitn(4, ',').collect();
        if values.len() == 4 {
            Ok(Self {
                manufacturer: String::from(values[0].trim()),
                model: String::from(values[1].trim()),
                serial: String::from(values[2].trim()),
                firmware: String::from(values[3].trim()),
            })
        } else {
            Err(ProtoError::Parse(format!(
                "Invalid data for *IDN? response: {}",
                value
            )))
        }
    }
}
