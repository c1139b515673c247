use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{self, Instant};
use tokio_serial::SerialPortBuilderExt;
use tokio_util::codec::{Decoder, Framed};

use crate::proto::codec::InstrumentCodec;
use crate::proto::command::{Message, Termination};
use crate::proto::response::Response;
use crate::proto::{ProtoError, Result};
use crate::{DEFAULT_BAUDRATE, DEFAULT_TIMEOUT, DEFAULT_TTY};

/// Byte stream an instrument link can run over.
pub trait AsyncPort: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> AsyncPort for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Connection parameters supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkConfig {
    pub port: String,
    pub baudrate: u32,
    pub timeout: Duration,
}

impl LinkConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baudrate: DEFAULT_BAUDRATE,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn baudrate(mut self, baudrate: u32) -> Self {
        self.baudrate = baudrate;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TTY)
    }
}

/// A single command link to one instrument.
///
/// Owns the port exclusively. Every read is bounded by the link timeout,
/// nothing is retried here.
pub struct Link<C> {
    stream: Framed<Box<dyn AsyncPort>, InstrumentCodec<C>>,
    port: String,
    timeout: Duration,
    recovering: bool,
}

impl<C: Message> Link<C> {
    /// Open a serial port. Must be called from within a tokio runtime.
    pub fn open(config: &LinkConfig, termination: Termination) -> Result<Self> {
        let mut port = tokio_serial::new(config.port.as_str(), config.baudrate)
            .timeout(config.timeout)
            .open_native_async()
            .map_err(|source| ProtoError::Connection {
                port: config.port.clone(),
                source,
            })?;

        #[cfg(unix)]
        port.set_exclusive(false)?;

        log::debug!("Opened {} at {} baud", config.port, config.baudrate);
        Ok(Self::with_port(
            port,
            config.port.clone(),
            config.timeout,
            termination,
        ))
    }

    /// Run the link over an already opened byte stream.
    pub fn with_port(
        port: impl AsyncPort + 'static,
        name: impl Into<String>,
        timeout: Duration,
        termination: Termination,
    ) -> Self {
        let port: Box<dyn AsyncPort> = Box::new(port);
        Self {
            stream: InstrumentCodec::new(termination).framed(port),
            port: name.into(),
            timeout,
            recovering: false,
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub async fn write(&mut self, cmd: C) -> Result<()> {
        self.stream.send(cmd).await
    }

    /// Wait for the response to the last command.
    pub async fn read(&mut self) -> Result<Response> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match time::timeout_at(deadline, self.stream.next()).await {
                Ok(Some(Ok(response))) => {
                    log::trace!("<- {:?}", response);
                    self.recovering = false;
                    return Ok(response);
                }
                Ok(Some(Err(err))) => {
                    self.discard();
                    self.recovering = true;
                    return Err(err);
                }
                // Framed yields one None after a decode error, skip it
                Ok(None) if self.recovering => {
                    self.recovering = false;
                }
                Ok(None) => return Err(ProtoError::Abort),
                Err(_elapsed) => {
                    let err = match self.stream.codec().progress() {
                        Some(progress) => ProtoError::protocol(format!(
                            "binary block truncated, {}",
                            progress
                        )),
                        None => ProtoError::Timeout(self.timeout),
                    };
                    log::debug!("{}: {}", self.port, err);
                    self.discard();
                    return Err(err);
                }
            }
        }
    }

    pub async fn query(&mut self, cmd: C) -> Result<Response> {
        self.write(cmd).await?;
        self.read().await
    }

    /// Drop a half received response so the next command starts clean.
    pub fn discard(&mut self) {
        self.stream.codec_mut().reset();
        self.stream.read_buffer_mut().clear();
    }
}
