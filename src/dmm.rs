//! TTi 1604 bench multimeter.
//!
//! The meter has no command language. The host "presses" front panel keys by
//! sending single bytes, which the meter echoes, and reads back the raw
//! display as 10-byte frames.

use bytes::BytesMut;
use std::fmt;
use std::str::FromStr;

pub mod display;

pub use display::{Annunciators, Quantity, Readout};

use crate::proto::command::{Message, Reply, Termination};
use crate::proto::response::Response;
use crate::proto::{ProtoError, Result};
use crate::transport::{Link, LinkConfig};

/// Front panel keys and remote control codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Up,
    Down,
    Auto,
    Amps,
    MilliAmps,
    Volts,
    Operate,
    Ohms,
    Hertz,
    Shift,
    Ac,
    Dc,
    MilliVolts,
    Remote,
    Local,
}

impl Key {
    pub fn code(self) -> u8 {
        match self {
            Key::Up => b'a',
            Key::Down => b'b',
            Key::Auto => b'c',
            Key::Amps => b'd',
            Key::MilliAmps => b'e',
            Key::Volts => b'f',
            Key::Operate => b'g',
            Key::Ohms => b'i',
            Key::Hertz => b'j',
            Key::Shift => b'k',
            Key::Ac => b'l',
            Key::Dc => b'm',
            Key::MilliVolts => b'n',
            Key::Remote => b'u',
            Key::Local => b'v',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DmmCommand {
    Press(Key),
    ReadFrame,
}

impl Message for DmmCommand {
    fn encode(&self, dst: &mut BytesMut) -> fmt::Result {
        if let DmmCommand::Press(key) = self {
            dst.extend_from_slice(&[key.code()]);
        }
        Ok(())
    }

    fn reply(&self) -> Reply {
        match self {
            DmmCommand::Press(_) => Reply::Fixed { len: 1, sync: None },
            DmmCommand::ReadFrame => Reply::Fixed {
                len: display::FRAME_LEN,
                sync: Some(display::FRAME_START),
            },
        }
    }
}

/// Measurement functions selectable from the front panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    VoltsDc,
    VoltsAc,
    MilliVoltsDc,
    MilliVoltsAc,
    AmpsDc,
    AmpsAc,
    MilliAmpsDc,
    MilliAmpsAc,
    Ohms,
    Frequency,
}

impl Function {
    /// Key sequence that selects the function.
    pub fn keys(self) -> &'static [Key] {
        match self {
            Function::VoltsDc => &[Key::Volts, Key::Dc],
            Function::VoltsAc => &[Key::Volts, Key::Ac],
            Function::MilliVoltsDc => &[Key::MilliVolts, Key::Dc],
            Function::MilliVoltsAc => &[Key::MilliVolts, Key::Ac],
            Function::AmpsDc => &[Key::Amps, Key::Dc],
            Function::AmpsAc => &[Key::Amps, Key::Ac],
            Function::MilliAmpsDc => &[Key::MilliAmps, Key::Dc],
            Function::MilliAmpsAc => &[Key::MilliAmps, Key::Ac],
            Function::Ohms => &[Key::Ohms],
            Function::Frequency => &[Key::Hertz],
        }
    }
}

impl FromStr for Function {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "vdc" => Function::VoltsDc,
            "vac" => Function::VoltsAc,
            "mvdc" => Function::MilliVoltsDc,
            "mvac" => Function::MilliVoltsAc,
            "adc" => Function::AmpsDc,
            "aac" => Function::AmpsAc,
            "madc" => Function::MilliAmpsDc,
            "maac" => Function::MilliAmpsAc,
            "ohm" => Function::Ohms,
            "hz" => Function::Frequency,
            _ => return Err(ProtoError::Parse(format!("unknown function {:?}", s))),
        })
    }
}

pub struct Multimeter {
    link: Link<DmmCommand>,
}

impl Multimeter {
    pub fn connect(config: &LinkConfig) -> Result<Self> {
        Ok(Self::with_link(Link::open(config, Termination::RAW)?))
    }

    pub fn with_link(link: Link<DmmCommand>) -> Self {
        Self { link }
    }

    #[cfg(test)]
    pub(crate) fn new_faked(fake: crate::proto::fake::FakeBuffer) -> Self {
        Self::with_link(Link::with_port(
            fake,
            "fake",
            std::time::Duration::from_millis(200),
            Termination::RAW,
        ))
    }

    /// Press a key and check the meter echoed it.
    pub async fn press(&mut self, key: Key) -> Result<()> {
        let echo = self.link.query(DmmCommand::Press(key)).await?.into_raw()?;
        if echo.as_ref() == [key.code()] {
            Ok(())
        } else {
            Err(ProtoError::Unexpected(Response::Raw(echo)))
        }
    }

    /// Lock the front panel.
    pub async fn remote(&mut self) -> Result<()> {
        self.press(Key::Remote).await
    }

    pub async fn local(&mut self) -> Result<()> {
        self.press(Key::Local).await
    }

    pub async fn display(&mut self) -> Result<Readout> {
        let frame = self.link.query(DmmCommand::ReadFrame).await?.into_raw()?;
        Readout::parse(&frame)
    }

    pub async fn read_value(&mut self) -> Result<f64> {
        let readout = self.display().await?;
        readout.value().ok_or(ProtoError::Parse(readout.text))
    }

    /// Select `function` and return the next reading.
    pub async fn measure(&mut self, function: Function) -> Result<f64> {
        for key in function.keys() {
            self.press(*key).await?;
        }
        let value = self.read_value().await?;
        log::debug!("{:?}: {}", function, value);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::display::tests::frame;
    use super::*;
    use crate::proto::fake::FakeBuffer;

    #[tokio::test]
    async fn measure_dc_volts() {
        let mut replies = b"fm".to_vec();
        replies.extend(frame(0x12, true, [0, 97, 218, 242, 102]));
        let fake = FakeBuffer::new(replies);
        let written = fake.written();
        let mut dmm = Multimeter::new_faked(fake);

        assert_eq!(dmm.measure(Function::VoltsDc).await.unwrap(), -1.234);
        assert_eq!(written.lock().unwrap().as_slice(), b"fm");
    }

    #[tokio::test]
    async fn resync_to_frame_start() {
        let mut replies = vec![0x42, 0x00, 0x17];
        replies.extend(frame(0x25, false, [0, 96, 219, 182, 252]));
        let mut dmm = Multimeter::new_faked(FakeBuffer::new(replies));
        let readout = dmm.display().await.unwrap();
        assert_eq!(readout.quantity, Quantity::Ohms);
        assert_eq!(readout.value(), Some(12500.0));
    }

    #[tokio::test]
    async fn missing_echo() {
        let mut dmm = Multimeter::new_faked(FakeBuffer::new(b"x".to_vec()));
        assert!(matches!(
            dmm.remote().await,
            Err(ProtoError::Unexpected(Response::Raw(_)))
        ));

        let mut dmm = Multimeter::new_faked(FakeBuffer::stalling(Vec::new()));
        assert!(matches!(dmm.local().await, Err(ProtoError::Timeout(_))));
    }

    #[tokio::test]
    async fn overload_is_not_a_value() {
        let mut dmm = Multimeter::new_faked(FakeBuffer::new(frame(
            0x15,
            false,
            [0, 0, 252, 29, 0],
        )));
        assert!(matches!(dmm.read_value().await, Err(ProtoError::Parse(text)) if text == "0L."));
    }

    #[test]
    fn functions() {
        assert_eq!("mVac".parse::<Function>().unwrap(), Function::MilliVoltsAc);
        assert_eq!(Function::Ohms.keys(), &[Key::Ohms]);
        assert!("volts".parse::<Function>().is_err());
    }
}
