use bytes::BytesMut;
use std::fmt::{self, Write};
use std::str::FromStr;

use super::preamble::DataEncoding;
use super::trigger::{Slope, TriggerMode, TriggerSource};
use crate::proto::command::{Message, Reply};
use crate::proto::ProtoError;

/// Analog input channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Ch1,
    Ch2,
    Ch3,
    Ch4,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::Ch1, Channel::Ch2, Channel::Ch3, Channel::Ch4];

    pub fn number(self) -> u8 {
        match self {
            Channel::Ch1 => 1,
            Channel::Ch2 => 2,
            Channel::Ch3 => 3,
            Channel::Ch4 => 4,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        Self::ALL.get(usize::from(n).checked_sub(1)?).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Ch1 => "CH1",
            Channel::Ch2 => "CH2",
            Channel::Ch3 => "CH3",
            Channel::Ch4 => "CH4",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts `2`, `ch2` and `CH2`.
impl FromStr for Channel {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let digits = upper.strip_prefix("CH").unwrap_or(&upper);
        digits
            .parse::<u8>()
            .ok()
            .and_then(Channel::from_number)
            .ok_or_else(|| ProtoError::Parse(format!("invalid channel {:?}, expected CH1..CH4", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coupling {
    Ac,
    Dc,
    Ground,
}

impl Coupling {
    fn as_str(self) -> &'static str {
        match self {
            Coupling::Ac => "AC",
            Coupling::Dc => "DC",
            Coupling::Ground => "GND",
        }
    }
}

impl FromStr for Coupling {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AC" => Ok(Coupling::Ac),
            "DC" => Ok(Coupling::Dc),
            "GND" => Ok(Coupling::Ground),
            _ => Err(ProtoError::Parse(s.to_string())),
        }
    }
}

/// Input termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Impedance {
    Fifty,
    OneMeg,
}

impl Impedance {
    fn as_str(self) -> &'static str {
        match self {
            Impedance::Fifty => "FIFty",
            Impedance::OneMeg => "MEG",
        }
    }
}

impl FromStr for Impedance {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        if upper.starts_with("FIF") {
            Ok(Impedance::Fifty)
        } else if upper.starts_with("MEG") {
            Ok(Impedance::OneMeg)
        } else {
            Err(ProtoError::Parse(s.to_string()))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopAfter {
    /// Stop after one acquisition sequence.
    Sequence,
    RunStop,
}

/// Preamble fields in the order [`Preamble::parse`](super::Preamble::parse) expects them.
pub(crate) const PREAMBLE_QUERY: &str =
    "WFMOutpre:ENCdg?;BN_Fmt?;BYT_Nr?;BYT_Or?;NR_Pt?;XINcr?;XZEro?;YMUlt?;YOFf?;YZEro?";

/// Tektronix style SCPI commands. Expects `HEADer OFF`.
#[derive(Debug, Clone, PartialEq)]
pub enum ScopeCommand {
    Id,
    Reset,
    ClearStatus,
    HeaderOff,
    // Trigger
    SetTriggerMode(TriggerMode),
    SetTriggerSource(TriggerSource),
    SetTriggerSlope(Slope),
    SetTriggerLevel(f64),
    ForceTrigger,
    // Acquisition
    SetStopAfter(StopAfter),
    SetAcquisitionRunning(bool),
    QueryStatus,
    // Waveform transfer
    QueryChannelSelected(Channel),
    SetDataSource(Channel),
    SetDataEncoding(DataEncoding),
    SetByteWidth(u8),
    SetDataStart(u32),
    SetDataStop(u32),
    GetDataStart,
    GetDataStop,
    QueryPreamble,
    QueryCurve,
    // Horizontal
    GetHorizontalScale,
    SetHorizontalScale(f64),
    GetRecordLength,
    SetRecordLength(u32),
    // Vertical
    GetVerticalScale(Channel),
    GetChannelOffset(Channel),
    GetChannelPosition(Channel),
    GetCoupling(Channel),
    SetCoupling(Channel, Coupling),
    GetImpedance(Channel),
    SetImpedance(Channel, Impedance),
}

impl Message for ScopeCommand {
    fn encode(&self, dst: &mut BytesMut) -> fmt::Result {
        match self {
            ScopeCommand::Id => dst.write_str("*IDN?"),
            ScopeCommand::Reset => dst.write_str("*RST"),
            ScopeCommand::ClearStatus => dst.write_str("*CLS"),
            ScopeCommand::HeaderOff => dst.write_str("HEADer OFF"),
            ScopeCommand::SetTriggerMode(mode) => {
                write!(dst, "TRIGger:A:MODe {}", mode.scpi_mode())
            }
            ScopeCommand::SetTriggerSource(source) => {
                write!(dst, "TRIGger:A:EDGE:SOUrce {}", source)
            }
            ScopeCommand::SetTriggerSlope(slope) => {
                write!(dst, "TRIGger:A:EDGE:SLOpe {}", slope.as_str())
            }
            ScopeCommand::SetTriggerLevel(volts) => write!(dst, "TRIGger:A:LEVel {:E}", volts),
            ScopeCommand::ForceTrigger => dst.write_str("TRIGger FORCe"),
            ScopeCommand::SetStopAfter(StopAfter::Sequence) => {
                dst.write_str("ACQuire:STOPAfter SEQuence")
            }
            ScopeCommand::SetStopAfter(StopAfter::RunStop) => {
                dst.write_str("ACQuire:STOPAfter RUNSTop")
            }
            ScopeCommand::SetAcquisitionRunning(true) => dst.write_str("ACQuire:STATE RUN"),
            ScopeCommand::SetAcquisitionRunning(false) => dst.write_str("ACQuire:STATE STOP"),
            ScopeCommand::QueryStatus => dst.write_str("TRIGger:STATE?;:ACQuire:STATE?"),
            ScopeCommand::QueryChannelSelected(ch) => write!(dst, "SELect:{}?", ch),
            ScopeCommand::SetDataSource(ch) => write!(dst, "DATa:SOUrce {}", ch),
            ScopeCommand::SetDataEncoding(enc) => write!(dst, "DATa:ENCdg {}", enc.as_str()),
            ScopeCommand::SetByteWidth(width) => write!(dst, "WFMOutpre:BYT_Nr {}", width),
            ScopeCommand::SetDataStart(pos) => write!(dst, "DATa:STARt {}", pos),
            ScopeCommand::SetDataStop(pos) => write!(dst, "DATa:STOP {}", pos),
            ScopeCommand::GetDataStart => dst.write_str("DATa:STARt?"),
            ScopeCommand::GetDataStop => dst.write_str("DATa:STOP?"),
            ScopeCommand::QueryPreamble => dst.write_str(PREAMBLE_QUERY),
            ScopeCommand::QueryCurve => dst.write_str("CURVe?"),
            ScopeCommand::GetHorizontalScale => dst.write_str("HORizontal:SCAle?"),
            ScopeCommand::SetHorizontalScale(secs) => write!(dst, "HORizontal:SCAle {:E}", secs),
            ScopeCommand::GetRecordLength => dst.write_str("HORizontal:RECOrdlength?"),
            ScopeCommand::SetRecordLength(len) => write!(dst, "HORizontal:RECOrdlength {}", len),
            ScopeCommand::GetVerticalScale(ch) => write!(dst, "{}:SCAle?", ch),
            ScopeCommand::GetChannelOffset(ch) => write!(dst, "{}:OFFSet?", ch),
            ScopeCommand::GetChannelPosition(ch) => write!(dst, "{}:POSition?", ch),
            ScopeCommand::GetCoupling(ch) => write!(dst, "{}:COUPling?", ch),
            ScopeCommand::SetCoupling(ch, coupling) => {
                write!(dst, "{}:COUPling {}", ch, coupling.as_str())
            }
            ScopeCommand::GetImpedance(ch) => write!(dst, "{}:IMPedance?", ch),
            ScopeCommand::SetImpedance(ch, imp) => write!(dst, "{}:IMPedance {}", ch, imp.as_str()),
        }
    }

    fn reply(&self) -> Reply {
        match self {
            ScopeCommand::Id
            | ScopeCommand::QueryStatus
            | ScopeCommand::QueryChannelSelected(_)
            | ScopeCommand::GetDataStart
            | ScopeCommand::GetDataStop
            | ScopeCommand::QueryPreamble
            | ScopeCommand::GetHorizontalScale
            | ScopeCommand::GetRecordLength
            | ScopeCommand::GetVerticalScale(_)
            | ScopeCommand::GetChannelOffset(_)
            | ScopeCommand::GetChannelPosition(_)
            | ScopeCommand::GetCoupling(_)
            | ScopeCommand::GetImpedance(_) => Reply::Line,
            ScopeCommand::QueryCurve => Reply::Data,
            _ => Reply::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(cmd: ScopeCommand) -> String {
        let mut dst = BytesMut::new();
        cmd.encode(&mut dst).unwrap();
        String::from_utf8(dst.to_vec()).unwrap()
    }

    #[test]
    fn channel_names() {
        assert_eq!("1".parse::<Channel>().unwrap(), Channel::Ch1);
        assert_eq!("ch3".parse::<Channel>().unwrap(), Channel::Ch3);
        assert_eq!(" CH4 ".parse::<Channel>().unwrap(), Channel::Ch4);
        assert!("CH5".parse::<Channel>().is_err());
        assert!("0".parse::<Channel>().is_err());
        assert!("X".parse::<Channel>().is_err());
    }

    #[test]
    fn command_syntax() {
        assert_eq!(encoded(ScopeCommand::SetTriggerLevel(1.0)), "TRIGger:A:LEVel 1E0");
        assert_eq!(
            encoded(ScopeCommand::SetTriggerSource(Channel::Ch2.into())),
            "TRIGger:A:EDGE:SOUrce CH2"
        );
        assert_eq!(
            encoded(ScopeCommand::SetCoupling(Channel::Ch1, Coupling::Ground)),
            "CH1:COUPling GND"
        );
        assert_eq!(encoded(ScopeCommand::QueryChannelSelected(Channel::Ch2)), "SELect:CH2?");
    }

    #[test]
    fn reply_shapes() {
        assert_eq!(ScopeCommand::QueryCurve.reply(), Reply::Data);
        assert_eq!(ScopeCommand::QueryStatus.reply(), Reply::Line);
        assert_eq!(ScopeCommand::ForceTrigger.reply(), Reply::None);
        assert_eq!(ScopeCommand::SetDataStart(1).reply(), Reply::None);
    }
}
