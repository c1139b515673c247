use byteorder::{BigEndian, ByteOrder as _, LittleEndian};
use chrono::{DateTime, Local};

use super::command::Channel;
use super::preamble::{ByteOrder, Preamble};
use crate::proto::response::Response;
use crate::proto::{ProtoError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Seconds relative to the trigger point.
    pub time: f64,
    /// Vertical units, usually volts.
    pub value: f64,
}

/// A scaled capture of one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    channel: Channel,
    preamble: Preamble,
    first: usize,
    samples: Vec<Sample>,
    captured_at: DateTime<Local>,
}

impl Waveform {
    /// Scale raw codes. `codes` must hold exactly `preamble.points` entries.
    pub fn from_codes(channel: Channel, preamble: Preamble, codes: &[f64]) -> Result<Self> {
        Self::from_record_codes(channel, preamble, 0, codes)
    }

    /// Scale codes transferred from record index `first` (0-based) on.
    /// Sample `k` is placed at `x_origin + (first + k) * x_increment`.
    pub fn from_record_codes(
        channel: Channel,
        preamble: Preamble,
        first: usize,
        codes: &[f64],
    ) -> Result<Self> {
        if codes.len() != preamble.points {
            return Err(ProtoError::protocol(format!(
                "received {} samples, preamble announced {}",
                codes.len(),
                preamble.points
            )));
        }
        let samples = codes
            .iter()
            .enumerate()
            .map(|(i, &code)| Sample {
                time: preamble.time_at(first.saturating_add(i)),
                value: preamble.value_of(code),
            })
            .collect();
        Ok(Self {
            channel,
            preamble,
            first,
            samples,
            captured_at: Local::now(),
        })
    }

    /// Decode a `CURVe?` response according to `preamble`.
    pub fn decode(channel: Channel, preamble: Preamble, response: Response) -> Result<Self> {
        Self::decode_at(channel, preamble, 0, response)
    }

    /// Like [`decode`](Self::decode) for a transfer starting at record
    /// index `first`.
    pub fn decode_at(
        channel: Channel,
        preamble: Preamble,
        first: usize,
        response: Response,
    ) -> Result<Self> {
        let codes = match response {
            Response::Block(payload) => decode_binary(&preamble, &payload)?,
            Response::Line(line) => decode_ascii(&line)?,
            other => return Err(ProtoError::Unexpected(other)),
        };
        Self::from_record_codes(channel, preamble, first, &codes)
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn preamble(&self) -> &Preamble {
        &self.preamble
    }

    /// Record index of the first sample.
    pub fn first_index(&self) -> usize {
        self.first
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn captured_at(&self) -> DateTime<Local> {
        self.captured_at
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.time)
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.value)
    }
}

fn decode_binary(preamble: &Preamble, payload: &[u8]) -> Result<Vec<f64>> {
    let format = preamble.format;
    let expected = preamble.payload_len()?;
    if payload.len() != expected {
        return Err(ProtoError::protocol(format!(
            "curve block has {} bytes, expected {} ({} points x {} bytes)",
            payload.len(),
            expected,
            preamble.points,
            format.width
        )));
    }

    let codes = match (format.width, format.signed) {
        (1, true) => payload.iter().map(|&b| f64::from(b as i8)).collect(),
        (1, false) => payload.iter().map(|&b| f64::from(b)).collect(),
        (_, signed) => payload
            .chunks_exact(2)
            .map(|pair| {
                let raw = match format.order {
                    ByteOrder::Msb => BigEndian::read_u16(pair),
                    ByteOrder::Lsb => LittleEndian::read_u16(pair),
                };
                if signed {
                    f64::from(raw as i16)
                } else {
                    f64::from(raw)
                }
            })
            .collect(),
    };
    Ok(codes)
}

fn decode_ascii(line: &str) -> Result<Vec<f64>> {
    line.trim()
        .split(',')
        .map(|field| {
            field.trim().parse::<f64>().map_err(|_| {
                ProtoError::protocol(format!("curve value {:?} is not numeric", field))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn preamble(reply: &str) -> Preamble {
        Preamble::parse(reply).unwrap()
    }

    #[test]
    fn unsigned_bytes() {
        let wfm = Waveform::decode(
            Channel::Ch1,
            preamble("BIN;RP;1;MSB;4;1.0E-6;0;4.0E-2;128;0"),
            Response::Block(Bytes::from_static(&[128, 130, 126, 128])),
        )
        .unwrap();
        let values: Vec<f64> = wfm.values().collect();
        assert_eq!(values, [0.0, 2.0 * 0.04, -2.0 * 0.04, 0.0]);
        assert_eq!(wfm.samples()[1].time, 1.0e-6);
        assert_eq!(wfm.channel(), Channel::Ch1);
    }

    #[test]
    fn signed_words_both_orders() {
        let msb = Waveform::decode(
            Channel::Ch2,
            preamble("BIN;RI;2;MSB;2;1;0;1;0;0"),
            Response::Block(Bytes::from_static(&[0xff, 0xfe, 0x01, 0x00])),
        )
        .unwrap();
        assert_eq!(msb.values().collect::<Vec<_>>(), [-2.0, 256.0]);

        let lsb = Waveform::decode(
            Channel::Ch2,
            preamble("BIN;RI;2;LSB;2;1;0;1;0;0"),
            Response::Block(Bytes::from_static(&[0xfe, 0xff, 0x00, 0x01])),
        )
        .unwrap();
        assert_eq!(lsb.values().collect::<Vec<_>>(), [-2.0, 256.0]);
    }

    #[test]
    fn signed_bytes() {
        let wfm = Waveform::decode(
            Channel::Ch1,
            preamble("BIN;RI;1;MSB;3;1;0;1;0;0"),
            Response::Block(Bytes::from_static(&[0x80, 0x00, 0x7f])),
        )
        .unwrap();
        assert_eq!(wfm.values().collect::<Vec<_>>(), [-128.0, 0.0, 127.0]);
    }

    #[test]
    fn ascii_curve() {
        let wfm = Waveform::decode(
            Channel::Ch1,
            preamble("ASC;RP;1;MSB;4;1.0E-6;0;4.0E-2;128;0"),
            Response::Line("128,130,126,128".into()),
        )
        .unwrap();
        assert_eq!(wfm.len(), 4);
        assert_eq!(wfm.samples()[2].value, -2.0 * 0.04);
    }

    #[test]
    fn length_mismatch_is_protocol_error() {
        let short = Waveform::decode(
            Channel::Ch1,
            preamble("BIN;RI;2;MSB;4;1;0;1;0;0"),
            Response::Block(Bytes::from_static(&[0, 1, 0, 2, 0, 3])),
        );
        assert!(matches!(short, Err(ProtoError::Protocol(_))));

        let ascii = Waveform::decode(
            Channel::Ch1,
            preamble("ASC;RP;1;MSB;4;1;0;1;0;0"),
            Response::Line("1,2,3".into()),
        );
        assert!(matches!(ascii, Err(ProtoError::Protocol(_))));

        let garbage = Waveform::decode(
            Channel::Ch1,
            preamble("ASC;RP;1;MSB;2;1;0;1;0;0"),
            Response::Line("1,x".into()),
        );
        assert!(matches!(garbage, Err(ProtoError::Protocol(_))));
    }

    #[test]
    fn code_at_reference_is_offset() {
        let p = preamble("BIN;RP;1;MSB;8;1.0E-3;-2.0E-3;3.7E-2;1.01E2;4.25E-1");
        let wfm = Waveform::from_codes(Channel::Ch3, p, &[101.0; 8]).unwrap();
        assert!(wfm.values().all(|v| v == 0.425));
    }

    #[test]
    fn window_keeps_record_time() {
        let p = preamble("BIN;RP;1;MSB;2;1.0E-6;0;1;0;0");
        let wfm = Waveform::decode_at(
            Channel::Ch1,
            p,
            10,
            Response::Block(Bytes::from_static(&[1, 2])),
        )
        .unwrap();
        assert_eq!(wfm.first_index(), 10);
        for (time, expected) in wfm.times().zip([1.0e-5, 1.1e-5]) {
            assert!((time - expected).abs() < 1e-15, "{} != {}", time, expected);
        }
    }

    #[test]
    fn huge_point_count_is_rejected_before_decode() {
        let err = Preamble::parse("BIN;RI;2;MSB;1e30;1.0E-6;0;1;0;0").unwrap_err();
        assert!(matches!(err, ProtoError::Protocol(_)));
    }

    #[test]
    fn point_counts() {
        for points in [1usize, 2, 1000, 100_000] {
            let p = preamble(&format!("BIN;RP;1;MSB;{};1.0E-6;5.0E-4;1;0;0", points));
            let codes: Vec<f64> = (0..points).map(|i| (i % 256) as f64).collect();
            let wfm = Waveform::from_codes(Channel::Ch1, p, &codes).unwrap();
            assert_eq!(wfm.len(), points);
            let last = wfm.samples()[points - 1];
            assert_eq!(last.time, 5.0e-4 + (points - 1) as f64 * 1.0e-6);
            assert_eq!(last.value, ((points - 1) % 256) as f64);
        }
    }
}
