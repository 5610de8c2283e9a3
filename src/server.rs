//! Single-shot TCP server for MIDI file transfer.
//!
//! The server loads its payload, binds, accepts exactly one connection,
//! runs one [`Session`] on it, and then stops. Nothing is accepted while a
//! session is active; a second client waits in the backlog until the
//! listener is dropped.

use crate::config::ServerConfig;
use crate::connection::{Connection, Incoming, ReadEvent};
use crate::error::{Error, Result};
use crate::protocol::Command;
use bytes::Bytes;
use socket2::{Domain, Protocol, Socket, Type};
use std::fs::File;
use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// File contents served in response to GET. Loaded once, never modified.
#[derive(Debug, Clone)]
pub struct Payload {
    path: PathBuf,
    bytes: Bytes,
}

impl Payload {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| Error::SourceFileMissing {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            bytes: Bytes::from(bytes),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn len(&self) -> usize {
        self.bytes.len()
    }
}

/// Why a session stopped reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Peer closed or reset the connection.
    Eof,
    /// Idle timeout expired.
    Timeout,
}

/// Summary of one finished session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub peer: SocketAddr,
    /// True once a GET response was sent; the listener is retired when set.
    pub completed: bool,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub uploads: usize,
    pub end: EndReason,
}

/// Protocol state machine for one accepted connection.
pub(crate) struct Session<'a> {
    conn: Connection,
    payload: &'a Payload,
    upload_path: &'a Path,
    completed: bool,
    bytes_sent: u64,
    bytes_received: u64,
    uploads: usize,
}

impl<'a> Session<'a> {
    fn new(conn: Connection, payload: &'a Payload, upload_path: &'a Path) -> Self {
        Self {
            conn,
            payload,
            upload_path,
            completed: false,
            bytes_sent: 0,
            bytes_received: 0,
            uploads: 0,
        }
    }

    /// Drive the connection until EOF or timeout. The connection is closed
    /// on every exit path, including errors.
    pub fn run(mut self) -> Result<SessionReport> {
        let result = self.drive();
        self.conn.shutdown();

        let end = result?;
        Ok(SessionReport {
            peer: self.conn.peer_addr(),
            completed: self.completed,
            bytes_sent: self.bytes_sent,
            bytes_received: self.bytes_received,
            uploads: self.uploads,
            end,
        })
    }

    fn drive(&mut self) -> Result<EndReason> {
        let peer = self.conn.peer_addr();

        loop {
            match self.conn.next_command()? {
                Incoming::Command(Command::KeepAlive) => {
                    debug!(peer = %peer, "Keep-alive");
                }
                Incoming::Command(Command::Get) => self.send_payload()?,
                Incoming::Command(Command::Put) => {
                    return self.receive_upload();
                }
                Incoming::Command(Command::Unknown) => {
                    debug!(peer = %peer, "Ignoring unrecognized input");
                }
                Incoming::Eof => {
                    debug!(peer = %peer, "Connection closed by client");
                    return Ok(EndReason::Eof);
                }
                Incoming::Timeout => {
                    warn!(peer = %peer, "Read timed out, closing connection");
                    return Ok(EndReason::Timeout);
                }
            }
        }
    }

    fn send_payload(&mut self) -> Result<()> {
        info!(
            peer = %self.conn.peer_addr(),
            bytes = self.payload.len(),
            "GET: sending payload"
        );
        self.conn.write_all(self.payload.as_bytes())?;
        self.bytes_sent += self.payload.len() as u64;
        self.completed = true;
        Ok(())
    }

    /// Write every following byte to the upload path until the peer stops
    /// sending. A PUT consumes the rest of the connection, so its end is the
    /// session's end.
    fn receive_upload(&mut self) -> Result<EndReason> {
        info!(
            peer = %self.conn.peer_addr(),
            path = %self.upload_path.display(),
            "PUT: receiving upload"
        );

        let mut sink = File::create(self.upload_path).map_err(|e| self.write_failure(e))?;
        let mut received = 0u64;

        // Bytes that arrived in the same segment as the command
        let mut pending = self.conn.take_buffered();

        let end = loop {
            if !pending.is_empty() {
                sink.write_all(&pending).map_err(|e| self.write_failure(e))?;
                received += pending.len() as u64;
            }

            match self.conn.read_chunk()? {
                ReadEvent::Data(_) => pending = self.conn.take_buffered(),
                ReadEvent::Eof => break EndReason::Eof,
                ReadEvent::Timeout => {
                    warn!(peer = %self.conn.peer_addr(), "Upload stalled, closing connection");
                    break EndReason::Timeout;
                }
            }
        };

        sink.flush().map_err(|e| self.write_failure(e))?;
        drop(sink);

        self.bytes_received += received;
        self.uploads += 1;
        info!(
            path = %self.upload_path.display(),
            bytes = received,
            "Upload saved"
        );
        Ok(end)
    }

    fn write_failure(&self, source: io::Error) -> Error {
        Error::WriteFailure {
            path: self.upload_path.to_path_buf(),
            source,
        }
    }
}

/// Server instance
pub struct Server {
    config: ServerConfig,
    payload: Payload,
    listener: TcpListener,
}

impl Server {
    /// Load the payload, then bind the listener.
    ///
    /// A missing source file fails before any socket is created.
    pub fn bind(config: ServerConfig, source: impl AsRef<Path>) -> Result<Self> {
        let payload = Payload::load(source)?;

        let listener = create_listener(&config.listen).map_err(|source| Error::Bind {
            addr: config.listen.clone(),
            source,
        })?;

        info!(
            address = %config.listen,
            source = %payload.path().display(),
            bytes = payload.len(),
            "Server listening"
        );

        Ok(Server {
            config,
            payload,
            listener,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept one connection, serve it, and stop.
    ///
    /// The listener is dropped when this returns, whether or not the
    /// session completed a GET.
    pub fn run(self) -> Result<SessionReport> {
        let (stream, peer) = self.listener.accept().map_err(Error::Accept)?;
        info!(peer = %peer, "Connection established");

        let result = Connection::new(
            stream,
            peer,
            self.config.read_timeout,
            self.config.chunk_size,
        )
        .and_then(|conn| Session::new(conn, &self.payload, &self.config.upload_path).run());

        match &result {
            Ok(report) if report.completed => {
                info!(
                    peer = %report.peer,
                    bytes_sent = report.bytes_sent,
                    "Payload delivered, retiring listener"
                );
            }
            Ok(report) => {
                info!(
                    peer = %report.peer,
                    end = ?report.end,
                    bytes_received = report.bytes_received,
                    "Session ended"
                );
            }
            Err(e) => {
                error!(peer = %peer, error = %e, "Session failed");
            }
        }

        result
    }
}

/// Serve `source_path` with the default settings: port 1235, uploads to
/// `received_recording.mid`, 5 second idle timeout.
pub fn start(source_path: impl AsRef<Path>) -> Result<SessionReport> {
    Server::bind(ServerConfig::default(), source_path)?.run()
}

/// Create the listening socket. Backlog 0: at most one client waits while
/// a session runs.
fn create_listener(addr: &str) -> io::Result<TcpListener> {
    let addr = addr.to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing")
    })?;

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(0)?;

    Ok(socket.into())
}
