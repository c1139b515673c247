use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// In-memory instrument: replays canned responses, records what was written.
pub(crate) struct FakeBuffer {
    response_buf: Vec<u8>,
    written: Arc<Mutex<Vec<u8>>>,
    stall_when_empty: bool,
}

impl FakeBuffer {
    pub(crate) fn new(response_buf: Vec<u8>) -> Self {
        Self {
            response_buf,
            written: Arc::default(),
            stall_when_empty: false,
        }
    }

    /// Never signal end of stream, reads block once the canned bytes are used
    /// up. Useful to provoke timeouts.
    pub(crate) fn stalling(response_buf: Vec<u8>) -> Self {
        Self {
            stall_when_empty: true,
            ..Self::new(response_buf)
        }
    }

    pub(crate) fn written(&self) -> Arc<Mutex<Vec<u8>>> {
        self.written.clone()
    }
}

impl tokio::io::AsyncRead for FakeBuffer {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        if !self.response_buf.is_empty() {
            let c = if buf.remaining() < self.response_buf.len() {
                buf.remaining()
            } else {
                self.response_buf.len()
            };
            buf.put_slice(&self.response_buf[0..c]);
            self.response_buf.drain(0..c);
        } else if self.stall_when_empty {
            return std::task::Poll::Pending;
        }
        std::task::Poll::Ready(Ok(()))
    }
}

impl tokio::io::AsyncWrite for FakeBuffer {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::result::Result<usize, std::io::Error>> {
        if let Ok(mut written) = self.written.lock() {
            written.extend_from_slice(buf);
        }
        std::task::Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(
        self: Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), std::io::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), std::io::Error>> {
        std::task::Poll::Ready(Ok(()))
    }
}
