use bytes::BytesMut;
use std::fmt;

/// Shape of the reply an instrument sends for a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Write-only command.
    None,
    /// Text up to the read terminator.
    Line,
    /// Length-prefixed block (`#<n><len><payload>`) or, if the instrument
    /// answers in ASCII, a plain line.
    Data,
    /// Exactly `len` raw bytes. With `sync`, anything in front of the sync
    /// byte is dropped first.
    Fixed { len: usize, sync: Option<u8> },
}

/// Line endings of an instrument dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Termination {
    pub write: &'static str,
    pub read: u8,
}

impl Termination {
    pub const LF: Termination = Termination {
        write: "\n",
        read: b'\n',
    };

    /// Carriage return out, line feed back.
    pub const CR_LF: Termination = Termination {
        write: "\r",
        read: b'\n',
    };

    /// Raw byte protocols without any line structure.
    pub const RAW: Termination = Termination {
        write: "",
        read: b'\r',
    };
}

/// A command of one instrument dialect.
///
/// Each instrument module brings its own command enum. The codec is generic
/// over it, so framing logic is shared while syntax stays per dialect.
pub trait Message: fmt::Debug + Send + 'static {
    /// Write the command text without terminator.
    fn encode(&self, dst: &mut BytesMut) -> fmt::Result;

    fn reply(&self) -> Reply;
}
