use std::fmt;
use std::str::FromStr;

use super::command::{Channel, StopAfter};
use crate::proto::{ProtoError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    /// Capture one waveform, then halt.
    Single,
    /// Acquire continuously, only on valid trigger events.
    Normal,
    /// Acquire continuously, free-run when no trigger arrives.
    Auto,
}

impl TriggerMode {
    pub(crate) fn scpi_mode(self) -> &'static str {
        match self {
            TriggerMode::Single | TriggerMode::Normal => "NORMal",
            TriggerMode::Auto => "AUTO",
        }
    }

    pub(crate) fn stop_after(self) -> StopAfter {
        match self {
            TriggerMode::Single => StopAfter::Sequence,
            TriggerMode::Normal | TriggerMode::Auto => StopAfter::RunStop,
        }
    }
}

impl FromStr for TriggerMode {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(TriggerMode::Single),
            "normal" => Ok(TriggerMode::Normal),
            "auto" => Ok(TriggerMode::Auto),
            _ => Err(ProtoError::Parse(format!("invalid trigger mode {:?}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slope {
    Rising,
    Falling,
}

impl Slope {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Slope::Rising => "RISe",
            Slope::Falling => "FALL",
        }
    }
}

impl FromStr for Slope {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rising" | "rise" => Ok(Slope::Rising),
            "falling" | "fall" => Ok(Slope::Falling),
            _ => Err(ProtoError::Parse(format!("invalid slope {:?}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Channel(Channel),
    External,
    Line,
}

impl From<Channel> for TriggerSource {
    fn from(channel: Channel) -> Self {
        Self::Channel(channel)
    }
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSource::Channel(ch) => write!(f, "{}", ch),
            TriggerSource::External => f.write_str("EXT"),
            TriggerSource::Line => f.write_str("LINE"),
        }
    }
}

impl FromStr for TriggerSource {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EXT" => Ok(TriggerSource::External),
            "LINE" => Ok(TriggerSource::Line),
            _ => s.parse::<Channel>().map(TriggerSource::Channel),
        }
    }
}

/// Edge trigger setup for one acquisition.
///
/// ```
/// use benchctl::scope::{Channel, TriggerConfig, TriggerMode, Slope};
///
/// let trigger = TriggerConfig::single(Channel::Ch1).rising_edge(1.0);
/// assert_eq!(trigger.mode, TriggerMode::Single);
/// assert_eq!(trigger.slope, Slope::Rising);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerConfig {
    pub mode: TriggerMode,
    pub source: TriggerSource,
    /// Volts
    pub level: f64,
    pub slope: Slope,
}

impl TriggerConfig {
    pub fn new(mode: TriggerMode, source: TriggerSource, level: f64, slope: Slope) -> Self {
        Self {
            mode,
            source,
            level,
            slope,
        }
    }

    pub fn single(source: impl Into<TriggerSource>) -> TriggerBuilder {
        TriggerBuilder::new(TriggerMode::Single, source.into())
    }

    pub fn normal(source: impl Into<TriggerSource>) -> TriggerBuilder {
        TriggerBuilder::new(TriggerMode::Normal, source.into())
    }

    pub fn auto(source: impl Into<TriggerSource>) -> TriggerBuilder {
        TriggerBuilder::new(TriggerMode::Auto, source.into())
    }
}

#[derive(Debug)]
pub struct TriggerBuilder {
    mode: TriggerMode,
    source: TriggerSource,
}

impl TriggerBuilder {
    fn new(mode: TriggerMode, source: TriggerSource) -> Self {
        Self { mode, source }
    }

    pub fn rising_edge(self, volts: f64) -> TriggerConfig {
        TriggerConfig::new(self.mode, self.source, volts, Slope::Rising)
    }

    pub fn falling_edge(self, volts: f64) -> TriggerConfig {
        TriggerConfig::new(self.mode, self.source, volts, Slope::Falling)
    }
}

/// Trigger system state as reported by `TRIGger:STATE?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Armed,
    Auto,
    Ready,
    Save,
    Triggered,
}

impl FromStr for TriggerState {
    type Err = ProtoError;

    // Short and long forms, depending on VERBose
    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        if upper.starts_with("ARM") {
            Ok(TriggerState::Armed)
        } else if upper.starts_with("AUTO") {
            Ok(TriggerState::Auto)
        } else if upper.starts_with("REA") {
            Ok(TriggerState::Ready)
        } else if upper.starts_with("SAV") {
            Ok(TriggerState::Save)
        } else if upper.starts_with("TRIG") {
            Ok(TriggerState::Triggered)
        } else {
            Err(ProtoError::Parse(format!("unknown trigger state {:?}", s)))
        }
    }
}

/// One status poll: trigger state plus whether acquisition is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeStatus {
    pub trigger: TriggerState,
    pub running: bool,
}

impl ScopeStatus {
    /// Parse the reply to `TRIGger:STATE?;:ACQuire:STATE?`, e.g. `TRIGGER;0`.
    pub fn parse(line: &str) -> Result<Self> {
        let mut fields = line.trim().split(';');
        let (trigger, running) = match (fields.next(), fields.next(), fields.next()) {
            (Some(trigger), Some(running), None) => (trigger, running),
            _ => return Err(ProtoError::Parse(format!("invalid status {:?}", line))),
        };
        let running = match running.trim().to_ascii_uppercase().as_str() {
            "1" | "ON" | "RUN" => true,
            "0" | "OFF" | "STOP" => false,
            other => return Err(ProtoError::Parse(format!("invalid acquisition state {:?}", other))),
        };
        Ok(Self {
            trigger: trigger.parse()?,
            running,
        })
    }

    pub fn triggered(&self) -> bool {
        self.trigger == TriggerState::Triggered
    }

    pub fn stopped(&self) -> bool {
        !self.running || self.trigger == TriggerState::Save
    }

    /// Either flag ends the wait. Both at once (acquisition done before the
    /// first poll) counts as triggered.
    pub fn is_complete(&self) -> bool {
        self.triggered() || self.stopped()
    }
}
