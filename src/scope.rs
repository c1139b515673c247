use std::ops::RangeInclusive;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub mod acquisition;
pub mod command;
pub mod preamble;
pub mod trigger;
pub mod waveform;

pub use acquisition::{Acquisition, AcquisitionState};
pub use command::{Channel, Coupling, Impedance, ScopeCommand, StopAfter};
pub use preamble::{
    ByteOrder, DataEncoding, Encoding, Preamble, TransferFormat, WaveformFormat, MAX_POINTS,
};
pub use trigger::{
    ScopeStatus, Slope, TriggerBuilder, TriggerConfig, TriggerMode, TriggerSource, TriggerState,
};
pub use waveform::{Sample, Waveform};

use crate::proto::command::Termination;
use crate::proto::response::{Ident, Response};
use crate::proto::{ProtoError, Result};
use crate::transport::{Link, LinkConfig};

/// Default pause between two trigger status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Tektronix style digital storage oscilloscope.
pub struct Oscilloscope {
    link: Link<ScopeCommand>,
    transfer: TransferFormat,
}

impl Oscilloscope {
    /// Open the port and switch response headers off.
    pub async fn connect(config: &LinkConfig) -> Result<Self> {
        let link = Link::open(config, Termination::LF)?;
        Self::with_link(link).await
    }

    pub async fn with_link(mut link: Link<ScopeCommand>) -> Result<Self> {
        link.write(ScopeCommand::HeaderOff).await?;
        Ok(Self {
            link,
            transfer: TransferFormat::default(),
        })
    }

    #[cfg(test)]
    pub(crate) fn new_faked(fake: crate::proto::fake::FakeBuffer) -> Self {
        Self {
            link: Link::with_port(fake, "fake", Duration::from_millis(200), Termination::LF),
            transfer: TransferFormat::default(),
        }
    }

    pub fn link(&self) -> &Link<ScopeCommand> {
        &self.link
    }

    /// Release the serial port. The port also closes when the scope is
    /// dropped.
    pub fn close(self) {
        log::debug!("Closing {}", self.link.port());
        drop(self.link);
    }

    pub async fn ident(&mut self) -> Result<Ident> {
        let line = self.link.query(ScopeCommand::Id).await?.into_line()?;
        Ident::try_from(line.as_str())
    }

    /// Reset to factory setup and clear the status registers.
    pub async fn reset(&mut self) -> Result<()> {
        self.link.write(ScopeCommand::Reset).await?;
        self.link.write(ScopeCommand::ClearStatus).await?;
        self.link.write(ScopeCommand::HeaderOff).await
    }

    pub async fn clear_status(&mut self) -> Result<()> {
        self.link.write(ScopeCommand::ClearStatus).await
    }

    pub async fn run(&mut self) -> Result<()> {
        self.link
            .write(ScopeCommand::SetAcquisitionRunning(true))
            .await
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.link
            .write(ScopeCommand::SetAcquisitionRunning(false))
            .await
    }

    pub async fn status(&mut self) -> Result<ScopeStatus> {
        let line = self
            .link
            .query(ScopeCommand::QueryStatus)
            .await?
            .into_line()?;
        ScopeStatus::parse(&line)
    }

    /// Start a trigger-and-read cycle. The scope is busy until the returned
    /// [`Acquisition`] is dropped.
    pub fn acquisition(&mut self) -> Acquisition<'_> {
        Acquisition::new(self)
    }

    /// Arm, wait for the trigger and read one channel.
    pub async fn capture(
        &mut self,
        trigger: TriggerConfig,
        channel: Channel,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Waveform> {
        let mut acquisition = self.acquisition();
        acquisition.arm(trigger).await?;
        acquisition
            .wait_for_trigger(DEFAULT_POLL_INTERVAL, timeout, cancel)
            .await?;
        acquisition.read_waveform(channel).await
    }

    /// Seconds per division
    pub async fn horizontal_scale(&mut self) -> Result<f64> {
        self.query_scalar(ScopeCommand::GetHorizontalScale).await
    }

    pub async fn set_horizontal_scale(&mut self, secs_per_div: f64) -> Result<()> {
        if !(secs_per_div.is_finite() && secs_per_div > 0.0) {
            return Err(ProtoError::OutOfRange {
                what: "horizontal scale",
                value: secs_per_div,
                min: f64::MIN_POSITIVE,
                max: f64::MAX,
            });
        }
        self.link
            .write(ScopeCommand::SetHorizontalScale(secs_per_div))
            .await
    }

    pub async fn record_length(&mut self) -> Result<u32> {
        let len = self.query_scalar(ScopeCommand::GetRecordLength).await?;
        to_position(len)
    }

    pub async fn set_record_length(&mut self, points: u32) -> Result<()> {
        self.link
            .write(ScopeCommand::SetRecordLength(points))
            .await
    }

    /// Volts per division
    pub async fn vertical_scale(&mut self, channel: Channel) -> Result<f64> {
        self.query_scalar(ScopeCommand::GetVerticalScale(channel))
            .await
    }

    pub async fn channel_offset(&mut self, channel: Channel) -> Result<f64> {
        self.query_scalar(ScopeCommand::GetChannelOffset(channel))
            .await
    }

    /// Divisions
    pub async fn channel_position(&mut self, channel: Channel) -> Result<f64> {
        self.query_scalar(ScopeCommand::GetChannelPosition(channel))
            .await
    }

    /// Whether `channel` is switched on and can be transferred.
    pub async fn is_channel_selected(&mut self, channel: Channel) -> Result<bool> {
        let line = self
            .link
            .query(ScopeCommand::QueryChannelSelected(channel))
            .await?
            .into_line()?;
        match line.trim().to_ascii_uppercase().as_str() {
            "1" | "ON" => Ok(true),
            "0" | "OFF" => Ok(false),
            _ => Err(ProtoError::Parse(line)),
        }
    }

    pub async fn coupling(&mut self, channel: Channel) -> Result<Coupling> {
        let line = self
            .link
            .query(ScopeCommand::GetCoupling(channel))
            .await?
            .into_line()?;
        line.parse()
    }

    pub async fn set_coupling(&mut self, channel: Channel, coupling: Coupling) -> Result<()> {
        self.link
            .write(ScopeCommand::SetCoupling(channel, coupling))
            .await
    }

    pub async fn impedance(&mut self, channel: Channel) -> Result<Impedance> {
        let line = self
            .link
            .query(ScopeCommand::GetImpedance(channel))
            .await?
            .into_line()?;
        line.parse()
    }

    pub async fn set_impedance(&mut self, channel: Channel, impedance: Impedance) -> Result<()> {
        self.link
            .write(ScopeCommand::SetImpedance(channel, impedance))
            .await
    }

    /// Record positions (1-based, inclusive) covered by the next transfer.
    pub async fn data_window(&mut self) -> Result<RangeInclusive<u32>> {
        let start = self.query_scalar(ScopeCommand::GetDataStart).await?;
        let stop = self.query_scalar(ScopeCommand::GetDataStop).await?;
        Ok(to_position(start)?..=to_position(stop)?)
    }

    pub async fn set_data_window(&mut self, window: RangeInclusive<u32>) -> Result<()> {
        check_window(&window)?;
        self.link
            .write(ScopeCommand::SetDataStart(*window.start()))
            .await?;
        self.link
            .write(ScopeCommand::SetDataStop(*window.end()))
            .await
    }

    pub fn transfer_format(&self) -> TransferFormat {
        self.transfer
    }

    /// Takes effect with the next waveform read.
    pub fn set_transfer_format(&mut self, format: TransferFormat) -> Result<()> {
        if !(1..=2).contains(&format.width) {
            return Err(ProtoError::OutOfRange {
                what: "byte width",
                value: f64::from(format.width),
                min: 1.0,
                max: 2.0,
            });
        }
        self.transfer = format;
        Ok(())
    }

    /// Record positions of `channel` covering `t0` to `t0 + duration`
    /// seconds, from the current preamble.
    pub async fn time_window(
        &mut self,
        channel: Channel,
        t0: f64,
        duration: f64,
    ) -> Result<RangeInclusive<u32>> {
        self.link.write(ScopeCommand::SetDataSource(channel)).await?;
        let preamble = self.preamble().await?;
        window_between(&preamble, t0, duration)
    }

    /// Layout and scaling of the waveform the next `CURVe?` returns.
    pub async fn preamble(&mut self) -> Result<Preamble> {
        let line = self
            .link
            .query(ScopeCommand::QueryPreamble)
            .await?
            .into_line()?;
        Preamble::parse(&line)
    }

    async fn arm_with(&mut self, config: &TriggerConfig) -> Result<()> {
        self.link
            .write(ScopeCommand::SetTriggerMode(config.mode))
            .await?;
        self.link
            .write(ScopeCommand::SetTriggerSource(config.source))
            .await?;
        self.link
            .write(ScopeCommand::SetTriggerSlope(config.slope))
            .await?;
        self.link
            .write(ScopeCommand::SetTriggerLevel(config.level))
            .await?;
        self.link
            .write(ScopeCommand::SetStopAfter(config.mode.stop_after()))
            .await?;
        self.link
            .write(ScopeCommand::SetAcquisitionRunning(true))
            .await
    }

    async fn fetch_waveform(&mut self, channel: Channel) -> Result<Waveform> {
        if !self.is_channel_selected(channel).await? {
            return Err(ProtoError::ChannelOff(channel));
        }
        let start = to_position(self.query_scalar(ScopeCommand::GetDataStart).await?)?;
        self.link.write(ScopeCommand::SetDataSource(channel)).await?;
        self.link
            .write(ScopeCommand::SetDataEncoding(self.transfer.encoding))
            .await?;
        self.link
            .write(ScopeCommand::SetByteWidth(self.transfer.width))
            .await?;
        let preamble = self.preamble().await?;
        let curve = self.link.query(ScopeCommand::QueryCurve).await?;
        if let Response::Block(payload) = &curve {
            log::trace!("Curve block of {} bytes", payload.len());
        }
        Waveform::decode_at(channel, preamble, start.saturating_sub(1) as usize, curve)
    }

    async fn fetch_between(&mut self, channel: Channel, t0: f64, duration: f64) -> Result<Waveform> {
        let window = self.time_window(channel, t0, duration).await?;
        self.set_data_window(window).await?;
        self.fetch_waveform(channel).await
    }

    async fn query_scalar(&mut self, cmd: ScopeCommand) -> Result<f64> {
        self.link.query(cmd).await?.into_scalar()
    }
}

fn check_window(window: &RangeInclusive<u32>) -> Result<()> {
    if *window.start() == 0 || window.start() > window.end() {
        return Err(ProtoError::OutOfRange {
            what: "data start",
            value: f64::from(*window.start()),
            min: 1.0,
            max: f64::from(*window.end()),
        });
    }
    Ok(())
}

fn window_between(preamble: &Preamble, t0: f64, duration: f64) -> Result<RangeInclusive<u32>> {
    let start = ((t0 - preamble.x_origin) / preamble.x_increment).trunc() + 1.0;
    let stop = ((t0 + duration - preamble.x_origin) / preamble.x_increment).trunc();
    let last = f64::from(u32::MAX);
    if !(start >= 1.0 && start <= last) {
        return Err(ProtoError::OutOfRange {
            what: "window start",
            value: t0,
            min: preamble.x_origin,
            max: preamble.time_at(u32::MAX as usize),
        });
    }
    if !(stop >= start && stop <= last) {
        return Err(ProtoError::OutOfRange {
            what: "window duration",
            value: duration,
            min: preamble.x_increment,
            max: preamble.time_at(u32::MAX as usize) - t0,
        });
    }
    Ok(start as u32..=stop as u32)
}

fn to_position(value: f64) -> Result<u32> {
    if value.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(&value) {
        Ok(value as u32)
    } else {
        Err(ProtoError::Parse(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::fake::FakeBuffer;
    use crate::transport::tests::written_text;

    #[tokio::test]
    async fn connect_sends_header_off() {
        let fake = FakeBuffer::new(Vec::new());
        let written = fake.written();
        let link = Link::with_port(fake, "fake", Duration::from_millis(50), Termination::LF);
        let scope = Oscilloscope::with_link(link).await.unwrap();
        assert_eq!(written_text(&written), "HEADer OFF\n");
        assert_eq!(scope.link().port(), "fake");
    }

    #[tokio::test]
    async fn ident() {
        let mut scope = Oscilloscope::new_faked(FakeBuffer::new(
            b"TEKTRONIX,TDS 2012B,C012345,CF:91.1CT FV:v22.11\n".to_vec(),
        ));
        let id = scope.ident().await.unwrap();
        assert_eq!(id.model, "TDS 2012B");
    }

    #[tokio::test]
    async fn status() {
        let mut scope = Oscilloscope::new_faked(FakeBuffer::new(b"READY;1\n".to_vec()));
        let status = scope.status().await.unwrap();
        assert_eq!(status.trigger, TriggerState::Ready);
        assert!(status.running);
    }

    #[tokio::test]
    async fn channel_settings() {
        let fake = FakeBuffer::new(b"5.0E-1\n-1.2E0\nDC\nMEG\n0\n".to_vec());
        let written = fake.written();
        let mut scope = Oscilloscope::new_faked(fake);
        assert_eq!(scope.vertical_scale(Channel::Ch2).await.unwrap(), 0.5);
        assert_eq!(scope.channel_position(Channel::Ch2).await.unwrap(), -1.2);
        assert_eq!(scope.coupling(Channel::Ch2).await.unwrap(), Coupling::Dc);
        assert_eq!(
            scope.impedance(Channel::Ch2).await.unwrap(),
            Impedance::OneMeg
        );
        assert!(!scope.is_channel_selected(Channel::Ch4).await.unwrap());
        scope
            .set_coupling(Channel::Ch1, Coupling::Ac)
            .await
            .unwrap();
        assert_eq!(
            written_text(&written),
            "CH2:SCAle?\nCH2:POSition?\nCH2:COUPling?\nCH2:IMPedance?\nSELect:CH4?\nCH1:COUPling AC\n"
        );
    }

    #[tokio::test]
    async fn horizontal() {
        let fake = FakeBuffer::new(b"1.0E-3\n2500\n".to_vec());
        let written = fake.written();
        let mut scope = Oscilloscope::new_faked(fake);
        assert_eq!(scope.horizontal_scale().await.unwrap(), 1.0e-3);
        assert_eq!(scope.record_length().await.unwrap(), 2500);
        scope.set_horizontal_scale(5.0e-6).await.unwrap();
        assert!(matches!(
            scope.set_horizontal_scale(0.0).await,
            Err(ProtoError::OutOfRange { .. })
        ));
        assert!(written_text(&written).ends_with("HORizontal:SCAle 5E-6\n"));
    }

    #[tokio::test]
    async fn data_window() {
        let fake = FakeBuffer::new(b"1\n2500\n".to_vec());
        let written = fake.written();
        let mut scope = Oscilloscope::new_faked(fake);
        assert_eq!(scope.data_window().await.unwrap(), 1..=2500);
        scope.set_data_window(100..=199).await.unwrap();
        assert!(matches!(
            scope.set_data_window(0..=5).await,
            Err(ProtoError::OutOfRange { .. })
        ));
        assert!(written_text(&written).ends_with("DATa:STARt 100\nDATa:STOP 199\n"));
    }

    #[tokio::test]
    async fn ascii_transfer() {
        let mut replies = b"TRIGGER;0\n1\n1\n".to_vec();
        replies.extend_from_slice(b"ASC;RI;2;MSB;3;2.0E-6;-1.0E-6;1.0E-2;0;1.0E0\n");
        replies.extend_from_slice(b"-100,0,100\n");
        let fake = FakeBuffer::new(replies);
        let written = fake.written();
        let mut scope = Oscilloscope::new_faked(fake);
        scope
            .set_transfer_format(TransferFormat {
                encoding: DataEncoding::Ascii,
                width: 2,
            })
            .unwrap();

        let wfm = scope
            .capture(
                TriggerConfig::single(Channel::Ch3).rising_edge(0.2),
                Channel::Ch3,
                Duration::from_secs(1),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(wfm.values().collect::<Vec<_>>(), [0.0, 1.0, 2.0]);
        assert_eq!(wfm.samples()[0].time, -1.0e-6);
        assert!(written_text(&written).contains("DATa:SOUrce CH3\nDATa:ENCdg ASCii\n"));
    }

    #[test]
    fn window_from_times() {
        let p = Preamble::parse("BIN;RI;2;MSB;1000;1.0E-6;0;1;0;0").unwrap();
        assert_eq!(window_between(&p, 1.05e-5, 2.0e-6).unwrap(), 11..=12);

        let shifted = Preamble::parse("BIN;RI;2;MSB;1000;5.0E-1;-1.0E0;1;0;0").unwrap();
        assert_eq!(window_between(&shifted, -1.0, 2.0).unwrap(), 1..=4);

        for (t0, duration) in [(-1.0e-5, 1.0e-5), (0.0, 0.0), (f64::NAN, 1.0)] {
            assert!(
                matches!(
                    window_between(&p, t0, duration),
                    Err(ProtoError::OutOfRange { .. })
                ),
                "{} {}",
                t0,
                duration
            );
        }
    }

    #[tokio::test]
    async fn close_releases_port() {
        let fake = FakeBuffer::new(Vec::new());
        let written = fake.written();
        let scope = Oscilloscope::new_faked(fake);
        assert_eq!(std::sync::Arc::strong_count(&written), 2);
        scope.close();
        assert_eq!(std::sync::Arc::strong_count(&written), 1);
    }

    #[test]
    fn invalid_transfer_width() {
        let mut scope = Oscilloscope {
            link: Link::with_port(
                FakeBuffer::new(Vec::new()),
                "fake",
                Duration::from_millis(10),
                Termination::LF,
            ),
            transfer: TransferFormat::default(),
        };
        assert!(scope
            .set_transfer_format(TransferFormat {
                encoding: DataEncoding::SignedBinary,
                width: 4,
            })
            .is_err());
        assert_eq!(scope.transfer_format(), TransferFormat::default());
    }
}
