use bytes::{Buf, BytesMut};
use std::{io, marker::PhantomData, str};
use tokio_util::codec::{Decoder, Encoder};

use super::block::{BlockHeader, BlockProgress, BLOCK_MARKER, MAX_BLOCK_LEN};
use super::command::{Message, Reply, Termination};
use super::response::Response;
use super::{ProtoError, Result};

/// Framing for one instrument dialect.
///
/// The encoder remembers the reply shape of the last command, the decoder
/// uses it to pick terminator, byte count or block framing for the next
/// response.
pub struct InstrumentCodec<C> {
    termination: Termination,
    pending: Reply,
    skip_terminator: bool,
    progress: Option<BlockProgress>,
    _dialect: PhantomData<fn(C)>,
}

impl<C> InstrumentCodec<C> {
    pub fn new(termination: Termination) -> Self {
        Self {
            termination,
            pending: Reply::None,
            skip_terminator: false,
            progress: None,
            _dialect: PhantomData,
        }
    }

    pub fn termination(&self) -> Termination {
        self.termination
    }

    /// Progress of a block transfer that has started but not finished.
    pub fn progress(&self) -> Option<BlockProgress> {
        self.progress
    }

    /// Forget the pending reply, e.g. after a timeout.
    pub fn reset(&mut self) {
        self.pending = Reply::None;
        self.skip_terminator = false;
        self.progress = None;
    }

    fn decode_line(&self, src: &mut BytesMut) -> Result<Option<Response>> {
        let end = match src.iter().position(|b| *b == self.termination.read) {
            Some(n) => n,
            None => return Ok(None),
        };
        let line = src.split_to(end + 1);
        let mut text = &line[..end];
        if let [head @ .., b'\r'] = text {
            text = head;
        }
        let text = str::from_utf8(text)
            .map_err(|e| ProtoError::protocol(format!("response is not text: {}", e)))?;
        Ok(Some(Response::Line(text.to_string())))
    }

    fn decode_block(&mut self, src: &mut BytesMut) -> Result<Option<Response>> {
        let mut progress = self.progress.unwrap_or_default();
        let header = match BlockHeader::parse(src)? {
            Some(header) => header,
            None => {
                self.progress = Some(progress);
                return Ok(None);
            }
        };
        let header_len = header.header_len();
        progress.received = src.len() - header_len;

        let payload_len = match header {
            BlockHeader::Definite { payload_len, .. } => {
                progress.expected = Some(payload_len);
                if src.len() < header_len + payload_len {
                    self.progress = Some(progress);
                    return Ok(None);
                }
                payload_len
            }
            BlockHeader::Indefinite => {
                let term = self.termination.read;
                match src[header_len..].iter().position(|b| *b == term) {
                    Some(n) => n,
                    None if progress.received > MAX_BLOCK_LEN => {
                        return Err(ProtoError::protocol(format!(
                            "unterminated block exceeds {} bytes",
                            MAX_BLOCK_LEN
                        )))
                    }
                    None => {
                        self.progress = Some(progress);
                        return Ok(None);
                    }
                }
            }
        };

        src.advance(header_len);
        let payload = src.split_to(payload_len).freeze();
        if let BlockHeader::Indefinite = header {
            src.advance(1);
        } else {
            self.skip_terminator = true;
        }
        Ok(Some(Response::Block(payload)))
    }

    fn decode_fixed(
        &self,
        src: &mut BytesMut,
        len: usize,
        sync: Option<u8>,
    ) -> Result<Option<Response>> {
        if let Some(sync) = sync {
            match src.iter().position(|b| *b == sync) {
                Some(0) => {}
                Some(n) => {
                    log::trace!("dropping {} bytes in front of frame start", n);
                    src.advance(n);
                }
                None => {
                    src.clear();
                    return Ok(None);
                }
            }
        }
        if src.len() < len {
            src.reserve(len - src.len());
            return Ok(None);
        }
        Ok(Some(Response::Raw(src.split_to(len).freeze())))
    }
}

impl<C> Decoder for InstrumentCodec<C> {
    type Item = Response;
    // Protocol violations surface as ProtoError right here, the caller gets
    // the same taxonomy no matter which layer noticed the problem.
    type Error = ProtoError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if self.skip_terminator {
            match src.first() {
                None => return Ok(None),
                Some(b) if *b == self.termination.read => src.advance(1),
                Some(_) => {}
            }
            self.skip_terminator = false;
        }

        let decoded = match self.pending {
            Reply::None => return Ok(None),
            Reply::Line => self.decode_line(src)?,
            Reply::Data => {
                if src.first() == Some(&BLOCK_MARKER) {
                    self.decode_block(src)?
                } else {
                    self.decode_line(src)?
                }
            }
            Reply::Fixed { len, sync } => self.decode_fixed(src, len, sync)?,
        };

        if decoded.is_some() {
            self.pending = Reply::None;
            self.progress = None;
        }
        Ok(decoded)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => match self.progress {
                Some(progress) => Err(ProtoError::protocol(format!(
                    "connection closed inside binary block, {}",
                    progress
                ))),
                None => Err(ProtoError::protocol(format!(
                    "connection closed inside response ({} bytes pending)",
                    src.len()
                ))),
            },
        }
    }
}

impl<C: Message> Encoder<C> for InstrumentCodec<C> {
    type Error = ProtoError;

    fn encode(&mut self, item: C, dst: &mut BytesMut) -> Result<()> {
        item.encode(dst)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        dst.extend_from_slice(self.termination.write.as_bytes());
        log::trace!("-> {:?}", item);
        self.pending = item.reply();
        Ok(())
    }
}
