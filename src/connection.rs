//! Framed reader over one accepted client connection.
//!
//! Reads are blocking and bounded by an idle timeout. Each read pulls at most
//! `chunk_size` bytes into an accumulation buffer, which the command parser
//! consumes from the front.

use crate::error::{Error, Result};
use crate::protocol::{self, Command, ParseResult};
use bytes::{Buf, BytesMut};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;
use tracing::{debug, trace};

/// Outcome of a single read from the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadEvent {
    /// `n` bytes were appended to the buffer.
    Data(usize),
    /// Peer closed its side (or reset the connection).
    Eof,
    /// No data arrived within the idle timeout.
    Timeout,
}

/// Outcome of waiting for the next command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incoming {
    Command(Command),
    Eof,
    Timeout,
}

/// A single client connection.
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    buffer: BytesMut,
    scratch: Vec<u8>,
}

impl Connection {
    /// Wrap an accepted stream, applying the idle timeout to reads.
    ///
    /// `peer` comes from `accept()`; a peer that already reset the
    /// connection has no address to query afterwards.
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        read_timeout: Duration,
        chunk_size: usize,
    ) -> Result<Self> {
        stream.set_read_timeout(Some(read_timeout))?;

        Ok(Self {
            stream,
            peer,
            buffer: BytesMut::with_capacity(chunk_size),
            scratch: vec![0u8; chunk_size],
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Read up to `chunk_size` bytes into the buffer.
    pub fn read_chunk(&mut self) -> Result<ReadEvent> {
        loop {
            match self.stream.read(&mut self.scratch) {
                Ok(0) => return Ok(ReadEvent::Eof),
                Ok(n) => {
                    trace!(peer = %self.peer, bytes = n, "Read chunk");
                    self.buffer.extend_from_slice(&self.scratch[..n]);
                    return Ok(ReadEvent::Data(n));
                }
                Err(e) => match e.kind() {
                    io::ErrorKind::Interrupted => continue,
                    // Unix reports an expired SO_RCVTIMEO as WouldBlock
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                        return Ok(ReadEvent::Timeout)
                    }
                    io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                        debug!(peer = %self.peer, error = %e, "Connection reset by peer");
                        return Ok(ReadEvent::Eof);
                    }
                    _ => return Err(Error::Connection(e)),
                },
            }
        }
    }

    /// Read until a complete command is buffered, then consume it.
    pub fn next_command(&mut self) -> Result<Incoming> {
        loop {
            if let ParseResult::Complete(command, consumed) = protocol::parse(&self.buffer) {
                self.buffer.advance(consumed);
                return Ok(Incoming::Command(command));
            }

            match self.read_chunk()? {
                ReadEvent::Data(_) => {}
                ReadEvent::Eof => return Ok(Incoming::Eof),
                ReadEvent::Timeout => return Ok(Incoming::Timeout),
            }
        }
    }

    /// Take bytes that were read but not consumed by the parser.
    pub fn take_buffered(&mut self) -> BytesMut {
        self.buffer.split()
    }

    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).map_err(Error::Connection)?;
        self.stream.flush().map_err(Error::Connection)
    }

    /// Close both directions. Failures are logged; the socket is released on drop.
    pub fn shutdown(&mut self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!(peer = %self.peer, error = %e, "Shutdown failed");
        }
    }
}
