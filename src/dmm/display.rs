use std::fmt;

use crate::proto::{ProtoError, Result};

/// Every display frame starts with a carriage return.
pub const FRAME_START: u8 = 0x0D;
pub const FRAME_LEN: usize = 10;

const DECIMAL_POINT: u8 = 0x01;

/// Seven segment patterns, decimal point bit cleared.
fn segment(code: u8) -> Option<&'static str> {
    Some(match code & !DECIMAL_POINT {
        0 | 2 => "",
        252 => "0",
        96 => "1",
        218 => "2",
        242 => "3",
        102 => "4",
        182 => "5",
        190 => "6",
        224 => "7",
        254 => "8",
        230 => "9",
        238 => "A",
        156 => "C",
        122 => "D",
        158 => "E",
        142 => "F",
        140 => "R",
        30 => "T",
        124 => "U",
        28 => "L",
        _ => return None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    MilliVolts,
    Volts,
    MilliAmps,
    Amps,
    Ohms,
    Continuity,
    DiodeTest,
}

impl Quantity {
    fn from_bits(bits: u8) -> Option<Self> {
        Some(match bits {
            1 => Quantity::MilliVolts,
            2 => Quantity::Volts,
            3 => Quantity::MilliAmps,
            4 => Quantity::Amps,
            5 => Quantity::Ohms,
            6 => Quantity::Continuity,
            7 => Quantity::DiodeTest,
            _ => return None,
        })
    }

    pub fn unit(self) -> &'static str {
        match self {
            Quantity::MilliVolts => "mV",
            Quantity::Volts => "V",
            Quantity::MilliAmps => "mA",
            Quantity::Amps => "A",
            Quantity::Ohms => "Ohm",
            Quantity::Continuity => "Continuity",
            Quantity::DiodeTest => "Diode Test",
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.unit())
    }
}

const RANGES: [&str; 6] = [
    "400 Ohm",
    "4 kOhm / 4 Vac / 4 Vdc / 4 mAdc / 1 mAac",
    "40 kOhm / 40 Vac / 40 Vdc / 10 Adc / 10 Aac",
    "400 kOhm / 400 Vac / 400 Vdc / 400 mAdc / 400 mAac / 400 mVdc / 400 mVac",
    "4 MOhm / 750 Vac / 1000 Vdc",
    "40 MOhm",
];

/// Indicator flags from bytes 2 and 9.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Annunciators {
    pub touch_hold: bool,
    pub min_max: bool,
    pub hertz: bool,
    pub null: bool,
    pub auto: bool,
    pub double_beep: bool,
    pub auto_range: bool,
    pub continuity_buzzer: bool,
    pub show_min: bool,
    pub show_max: bool,
    pub show_hold: bool,
    pub gate_10s: bool,
}

impl Annunciators {
    fn from_bytes(mode: u8, status: u8) -> Self {
        let bit = |byte: u8, n: u8| byte & (1 << n) != 0;
        Self {
            touch_hold: bit(mode, 0),
            min_max: bit(mode, 2),
            hertz: bit(mode, 4),
            null: bit(mode, 5),
            auto: bit(mode, 6),
            double_beep: bit(status, 0),
            auto_range: bit(status, 2),
            continuity_buzzer: bit(status, 3),
            show_min: bit(status, 4),
            show_max: bit(status, 5),
            show_hold: bit(status, 6),
            gate_10s: bit(status, 7),
        }
    }
}

/// Decoded front panel.
#[derive(Debug, Clone, PartialEq)]
pub struct Readout {
    pub quantity: Quantity,
    pub ac: bool,
    /// Index into the meter's range table, 0 is the most sensitive.
    pub range: u8,
    /// Display text including sign, e.g. `-1.234` or `0L.`.
    pub text: String,
    pub flags: Annunciators,
}

impl Readout {
    pub fn parse(frame: &[u8]) -> Result<Self> {
        if frame.len() != FRAME_LEN {
            return Err(ProtoError::protocol(format!(
                "display frame has {} bytes, expected {}",
                frame.len(),
                FRAME_LEN
            )));
        }
        if frame[0] != FRAME_START {
            return Err(ProtoError::protocol(format!(
                "display frame starts with {:#04x}",
                frame[0]
            )));
        }

        let quantity = Quantity::from_bits(frame[1] & 0x07).ok_or_else(|| {
            ProtoError::protocol(format!("unknown measurement function in {:#04x}", frame[1]))
        })?;
        let range = (frame[1] & 0x70) >> 4;
        if usize::from(range) >= RANGES.len() {
            return Err(ProtoError::protocol(format!("unknown range {}", range)));
        }

        let mut text = String::new();
        if frame[3] & 0x01 != 0 {
            text.push('-');
        }
        for &code in &frame[4..9] {
            match segment(code) {
                Some(s) => {
                    text.push_str(s);
                    if code & DECIMAL_POINT != 0 {
                        text.push('.');
                    }
                }
                None => log::trace!("Skipping unknown segment code {}", code),
            }
        }

        Ok(Self {
            quantity,
            ac: frame[1] & 0x08 != 0,
            range,
            text,
            flags: Annunciators::from_bytes(frame[2], frame[9]),
        })
    }

    pub fn range_label(&self) -> &'static str {
        RANGES[usize::from(self.range)]
    }

    /// Numeric reading, `None` for overload or other non numeric text.
    ///
    /// Resistance above the lowest range is shown in kOhm and converted
    /// to Ohm here.
    pub fn value(&self) -> Option<f64> {
        let value: f64 = self.text.parse().ok()?;
        if self.quantity == Quantity::Ohms && self.range != 0 {
            Some(value * 1000.0)
        } else {
            Some(value)
        }
    }
}

impl fmt::Display for Readout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}{} [{}]",
            self.text,
            self.quantity,
            if self.ac { " AC" } else { "" },
            self.range_label()
        )
    }
}
