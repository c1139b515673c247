use std::ops::RangeInclusive;
use std::time::Duration;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use super::command::{Channel, ScopeCommand};
use super::trigger::{ScopeStatus, TriggerConfig};
use super::waveform::Waveform;
use super::Oscilloscope;
use crate::proto::{ProtoError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
    Idle,
    Armed,
    Triggered,
    Reading,
    Complete,
    Failed,
}

/// One trigger-and-read cycle.
///
/// Holds the scope exclusively until dropped. States only move forward:
///
/// ```text
/// Idle -> Armed -> Triggered -> Reading -> Complete
///           |                     |
///           +------> Failed <-----+
/// ```
///
/// An operation called in the wrong state fails with
/// [`ProtoError::InvalidState`] and leaves the state alone.
pub struct Acquisition<'a> {
    scope: &'a mut Oscilloscope,
    state: AcquisitionState,
}

impl<'a> Acquisition<'a> {
    pub(crate) fn new(scope: &'a mut Oscilloscope) -> Self {
        Self {
            scope,
            state: AcquisitionState::Idle,
        }
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    /// Configure the trigger and start acquiring.
    pub async fn arm(&mut self, config: TriggerConfig) -> Result<()> {
        self.require(AcquisitionState::Idle, "arm")?;
        if let Err(err) = self.scope.arm_with(&config).await {
            return Err(self.fail(err));
        }
        log::debug!("Armed {:?} trigger on {}", config.mode, config.source);
        self.state = AcquisitionState::Armed;
        Ok(())
    }

    /// Trigger right away instead of waiting for the edge.
    pub async fn force_trigger(&mut self) -> Result<()> {
        self.require(AcquisitionState::Armed, "force_trigger")?;
        if let Err(err) = self.scope.link.write(ScopeCommand::ForceTrigger).await {
            return Err(self.fail(err));
        }
        self.state = AcquisitionState::Triggered;
        Ok(())
    }

    /// Poll the scope until the trigger fired or acquisition stopped.
    ///
    /// Fails with [`ProtoError::Timeout`] once `timeout` has elapsed and with
    /// [`ProtoError::Cancelled`] as soon as `cancel` fires, including while a
    /// status query is in flight. The scope stays armed in both cases.
    pub async fn wait_for_trigger(
        &mut self,
        poll_interval: Duration,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ScopeStatus> {
        self.require(AcquisitionState::Armed, "wait_for_trigger")?;
        let deadline = Instant::now() + timeout;
        let mut polls = 0u32;

        let outcome = loop {
            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ProtoError::Cancelled),
                _ = time::sleep_until(deadline) => Err(ProtoError::Timeout(timeout)),
                status = self.scope.status() => status,
            };
            polls += 1;
            match polled {
                Ok(status) if status.is_complete() => break Ok(status),
                Ok(status) => log::trace!("Poll {}: {:?}", polls, status),
                Err(err) => break Err(err),
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Err(ProtoError::Cancelled),
                _ = time::sleep_until(deadline) => break Err(ProtoError::Timeout(timeout)),
                _ = time::sleep(poll_interval) => {}
            }
        };

        match outcome {
            Ok(status) => {
                log::debug!("Triggered after {} polls: {:?}", polls, status);
                self.state = AcquisitionState::Triggered;
                Ok(status)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Transfer and scale the full record of `channel`.
    pub async fn read_waveform(&mut self, channel: Channel) -> Result<Waveform> {
        self.require(AcquisitionState::Triggered, "read_waveform")?;
        self.state = AcquisitionState::Reading;
        let result = self.scope.fetch_waveform(channel).await;
        self.finish(result)
    }

    /// Like [`read_waveform`](Self::read_waveform), restricted to the
    /// 1-based record positions in `range`.
    pub async fn read_waveform_range(
        &mut self,
        channel: Channel,
        range: RangeInclusive<u32>,
    ) -> Result<Waveform> {
        self.require(AcquisitionState::Triggered, "read_waveform_range")?;
        super::check_window(&range)?;
        self.state = AcquisitionState::Reading;
        let result = match self.scope.set_data_window(range).await {
            Ok(()) => self.scope.fetch_waveform(channel).await,
            Err(err) => Err(err),
        };
        self.finish(result)
    }

    /// Read the part of the record from `t0` to `t0 + duration` seconds.
    ///
    /// The window is worked out from the channel's preamble: the first
    /// position is `trunc((t0 - x_origin) / x_increment) + 1`.
    pub async fn read_waveform_between(
        &mut self,
        channel: Channel,
        t0: f64,
        duration: f64,
    ) -> Result<Waveform> {
        self.require(AcquisitionState::Triggered, "read_waveform_between")?;
        if !(t0.is_finite() && duration.is_finite() && duration > 0.0) {
            return Err(ProtoError::OutOfRange {
                what: "window duration",
                value: duration,
                min: 0.0,
                max: f64::MAX,
            });
        }
        self.state = AcquisitionState::Reading;
        let result = self.scope.fetch_between(channel, t0, duration).await;
        self.finish(result)
    }

    fn finish(&mut self, result: Result<Waveform>) -> Result<Waveform> {
        match result {
            Ok(waveform) => {
                log::debug!(
                    "Read {} samples from {}",
                    waveform.len(),
                    waveform.channel()
                );
                self.state = AcquisitionState::Complete;
                Ok(waveform)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    fn require(&self, expected: AcquisitionState, operation: &'static str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ProtoError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn fail(&mut self, err: ProtoError) -> ProtoError {
        log::warn!("Acquisition failed while {:?}: {}", self.state, err);
        self.state = AcquisitionState::Failed;
        // a status query may have been cut off mid-response
        self.scope.link.discard();
        err
    }
}
