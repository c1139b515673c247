//!
//! This library drives a small electronics bench over serial links: a
//! Tektronix style oscilloscope, a Delta Elektronika power supply and a
//! TTi 1604 multimeter.
//!
//! <br>
//!
//! # Details
//!
//! - Every instrument owns one [`Link`](transport::Link). Reads are bounded by
//!   the link timeout, nothing is retried behind your back.
//!
//! - Capture one triggered waveform and save it
//!
//!   ```no_run
//!   use benchctl::scope::{Channel, Oscilloscope, TriggerConfig, DEFAULT_POLL_INTERVAL};
//!   use benchctl::transport::LinkConfig;
//!   use std::time::Duration;
//!   use tokio_util::sync::CancellationToken;
//!
//!   #[tokio::main]
//!   async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!       let mut scope = Oscilloscope::connect(&LinkConfig::new("/dev/ttyUSB0")).await?;
//!       let cancel = CancellationToken::new();
//!
//!       let mut acq = scope.acquisition();
//!       acq.arm(TriggerConfig::single(Channel::Ch1).rising_edge(1.0)).await?;
//!       acq.wait_for_trigger(DEFAULT_POLL_INTERVAL, Duration::from_secs(5), &cancel).await?;
//!       let waveform = acq.read_waveform(Channel::Ch1).await?;
//!
//!       benchctl::export::save_csv(&waveform, "ch1.csv")?;
//!       Ok(())
//!   }
//!   ```
//!
//! # Supported devices
//!
//!  * Tektronix TDS/MSO scopes speaking `WFMOutpre`/`CURVe?`
//!  * Delta Elektronika PSU through the Arduino remote controller
//!  * TTi 1604
//!

pub mod dmm;
pub mod export;
pub mod proto;
pub mod psu;
pub mod scope;
pub mod transport;

pub use dmm::Multimeter;
pub use proto::{ProtoError, Result};
pub use psu::PowerSupply;
pub use scope::Oscilloscope;
pub use transport::LinkConfig;

use std::time::Duration;

#[cfg(unix)]
pub const DEFAULT_TTY: &str = "/dev/ttyUSB0";
#[cfg(windows)]
pub const DEFAULT_TTY: &str = "COM1";

/// All three instruments ship configured for 9600 baud.
pub const DEFAULT_BAUDRATE: u32 = 9600;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
