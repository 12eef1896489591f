//! Outbound message sinks for persistent connections.

use std::io::{self, Write};

/// A connection that accepts one message at a time.
pub trait FrameSink {
    /// Push one message. Peer-closed conditions surface as `BrokenPipe`,
    /// `ConnectionReset` or `ConnectionAborted`.
    fn send_frame(&mut self, frame: &[u8]) -> io::Result<()>;
}

impl<S: FrameSink + ?Sized> FrameSink for &mut S {
    fn send_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        (**self).send_frame(frame)
    }
}

impl FrameSink for Vec<Vec<u8>> {
    fn send_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.push(frame.to_vec());
        Ok(())
    }
}

/// Newline-delimited messages over any writer, flushed per message.
pub struct LineSink<W: Write> {
    writer: W,
}

impl<W: Write> LineSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> FrameSink for LineSink<W> {
    fn send_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.writer.write_all(frame)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}

/// Whether a write failed because the peer went away.
pub fn is_peer_closed(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    )
}
