//! Delta Elektronika power supply behind an Arduino remote controller.

use bytes::BytesMut;
use std::fmt::{self, Write};
use std::ops::RangeInclusive;
use std::str::FromStr;

use crate::proto::command::{Message, Reply, Termination};
use crate::proto::response::{parse_scalar, Response};
use crate::proto::{ProtoError, Result};
use crate::transport::{Link, LinkConfig};

/// Volts
pub const VOLTAGE_RANGE: RangeInclusive<f64> = 0.0..=30.0;
/// Amperes
pub const CURRENT_RANGE: RangeInclusive<f64> = 0.0..=5.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PsuCommand {
    Run,
    Stop,
    /// Millivolts
    SetVoltage(u32),
    GetVoltage,
    /// Milliamperes
    SetCurrent(u32),
    GetCurrent,
}

impl Message for PsuCommand {
    fn encode(&self, dst: &mut BytesMut) -> fmt::Result {
        match self {
            PsuCommand::Run => dst.write_str("r"),
            PsuCommand::Stop => dst.write_str("s"),
            PsuCommand::SetVoltage(mv) => write!(dst, "sv {}", mv),
            PsuCommand::GetVoltage => dst.write_str("gv"),
            PsuCommand::SetCurrent(ma) => write!(dst, "sc {}", ma),
            PsuCommand::GetCurrent => dst.write_str("gc"),
        }
    }

    fn reply(&self) -> Reply {
        Reply::Line
    }
}

/// Error reported by the controller as `err: <code> <message>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    UnknownCommand(String),
    ValueOutOfBounds(String),
    CurrentLimit(String),
    Runtime(String),
    Other { code: i32, message: String },
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::UnknownCommand(msg) => write!(f, "unknown command ({})", msg),
            Fault::ValueOutOfBounds(msg) => write!(f, "value out of bounds ({})", msg),
            Fault::CurrentLimit(msg) => write!(f, "current limit reached ({})", msg),
            Fault::Runtime(msg) => write!(f, "runtime error ({})", msg),
            Fault::Other { code, message } => write!(f, "error code {} ({})", code, message),
        }
    }
}

impl FromStr for Fault {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self> {
        let rest = s
            .trim()
            .strip_prefix("err:")
            .ok_or_else(|| ProtoError::Parse(s.to_string()))?;
        let (code, message) = match rest.trim().split_once(' ') {
            Some((code, message)) => (code, message.trim().to_string()),
            None => (rest.trim(), String::new()),
        };
        let code: i32 = code
            .parse()
            .map_err(|_| ProtoError::Parse(format!("invalid error code in {:?}", s)))?;
        Ok(match code {
            0 => Fault::UnknownCommand(message),
            1 => Fault::ValueOutOfBounds(message),
            2 => Fault::CurrentLimit(message),
            3 => Fault::Runtime(message),
            code => Fault::Other { code, message },
        })
    }
}

/// Programmable DC supply.
pub struct PowerSupply {
    link: Link<PsuCommand>,
}

impl PowerSupply {
    pub fn connect(config: &LinkConfig) -> Result<Self> {
        Ok(Self::with_link(Link::open(config, Termination::CR_LF)?))
    }

    pub fn with_link(link: Link<PsuCommand>) -> Self {
        Self { link }
    }

    #[cfg(test)]
    pub(crate) fn new_faked(fake: crate::proto::fake::FakeBuffer) -> Self {
        Self::with_link(Link::with_port(
            fake,
            "fake",
            std::time::Duration::from_millis(200),
            Termination::CR_LF,
        ))
    }

    /// Enable the output.
    pub async fn run(&mut self) -> Result<()> {
        self.command(PsuCommand::Run).await
    }

    /// Disable the output.
    pub async fn stop(&mut self) -> Result<()> {
        self.command(PsuCommand::Stop).await
    }

    pub async fn set_voltage(&mut self, volts: f64) -> Result<()> {
        let mv = milli("voltage", volts, VOLTAGE_RANGE)?;
        self.command(PsuCommand::SetVoltage(mv)).await
    }

    pub async fn set_current_limit(&mut self, amps: f64) -> Result<()> {
        let ma = milli("current", amps, CURRENT_RANGE)?;
        self.command(PsuCommand::SetCurrent(ma)).await
    }

    /// Output voltage in volts.
    pub async fn read_output(&mut self) -> Result<f64> {
        Ok(self.value(PsuCommand::GetVoltage).await? / 1000.0)
    }

    /// Output current in amperes.
    pub async fn read_current(&mut self) -> Result<f64> {
        Ok(self.value(PsuCommand::GetCurrent).await? / 1000.0)
    }

    async fn command(&mut self, cmd: PsuCommand) -> Result<()> {
        let line = self.reply(cmd).await?;
        if line == "OK" {
            Ok(())
        } else {
            Err(ProtoError::Unexpected(Response::Line(line)))
        }
    }

    async fn value(&mut self, cmd: PsuCommand) -> Result<f64> {
        let line = self.reply(cmd).await?;
        parse_scalar(&line).map(|(value, _unit)| value)
    }

    async fn reply(&mut self, cmd: PsuCommand) -> Result<String> {
        let line = self.link.query(cmd).await?.into_line()?;
        let line = line.trim();
        if line.starts_with("err:") {
            let fault: Fault = line.parse()?;
            log::debug!("{}: {}", self.link.port(), fault);
            return Err(ProtoError::PowerSupply(fault));
        }
        Ok(line.to_string())
    }
}

fn milli(what: &'static str, value: f64, range: RangeInclusive<f64>) -> Result<u32> {
    if !range.contains(&value) {
        return Err(ProtoError::OutOfRange {
            what,
            value,
            min: *range.start(),
            max: *range.end(),
        });
    }
    Ok((value * 1000.0).round() as u32)
}
