//! Peer side of the relay protocol.
//!
//! Mirrors what a playback device does: connect, send one command, and
//! drain or push bytes until the connection closes.

use crate::error::{Error, Result};
use crate::protocol::{GET, KEEP_ALIVE, PUT};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info};

pub struct Client {
    stream: TcpStream,
    peer: SocketAddr,
}

impl Client {
    /// Connect to a relay. `timeout` bounds the connect and every read.
    pub fn connect(addr: impl ToSocketAddrs, timeout: Duration) -> Result<Self> {
        let mut last_err = None;

        for peer in addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&peer, timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(timeout))?;
                    debug!(peer = %peer, "Connected to relay");
                    return Ok(Self { stream, peer });
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(Error::Connection(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing")
        })))
    }

    pub fn keep_alive(&mut self) -> Result<()> {
        self.stream.write_all(KEEP_ALIVE).map_err(Error::Connection)
    }

    /// Request the stored file and read until the relay closes.
    ///
    /// The protocol carries no length, so a read timeout before the relay
    /// closes is an error rather than a short file.
    pub fn fetch(mut self) -> Result<Vec<u8>> {
        self.stream.write_all(GET).map_err(Error::Connection)?;
        self.stream
            .shutdown(Shutdown::Write)
            .map_err(Error::Connection)?;

        let mut data = Vec::new();
        self.stream
            .read_to_end(&mut data)
            .map_err(Error::Connection)?;

        info!(peer = %self.peer, bytes = data.len(), "Fetched file");
        Ok(data)
    }

    /// Send `data` as an upload and close the write side to end it.
    pub fn upload(mut self, data: &[u8]) -> Result<u64> {
        self.stream.write_all(PUT).map_err(Error::Connection)?;
        self.stream.write_all(data).map_err(Error::Connection)?;
        self.stream
            .shutdown(Shutdown::Write)
            .map_err(Error::Connection)?;

        // Wait for the relay to close so the file is complete on return
        let mut rest = Vec::new();
        if let Err(e) = self.stream.read_to_end(&mut rest) {
            debug!(peer = %self.peer, error = %e, "Relay did not close cleanly after upload");
        }

        info!(peer = %self.peer, bytes = data.len(), "Uploaded file");
        Ok(data.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::server::Server;
    use std::path::PathBuf;
    use std::thread;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("midi-relay-client-{}-{}", std::process::id(), name))
    }

    /// Removes temp files when the test ends.
    struct TempFiles(Vec<PathBuf>);

    impl Drop for TempFiles {
        fn drop(&mut self) {
            for path in &self.0 {
                let _ = std::fs::remove_file(path);
            }
        }
    }

    fn config(upload: &str) -> ServerConfig {
        ServerConfig {
            listen: "127.0.0.1:0".to_string(),
            upload_path: temp_path(upload),
            read_timeout: Duration::from_secs(5),
            chunk_size: 1024,
        }
    }

    #[test]
    fn test_fetch_round_trip() {
        let source = temp_path("fetch.mid");
        let payload: Vec<u8> = (0..4096u32).map(|i| (i * 7) as u8).collect();
        std::fs::write(&source, &payload).unwrap();
        let _files = TempFiles(vec![source.clone()]);

        let server = Server::bind(config("fetch_up.mid"), &source).unwrap();
        let addr = server.local_addr().unwrap();
        let handle = thread::spawn(move || server.run());

        let mut client = Client::connect(addr, Duration::from_secs(5)).unwrap();
        client.keep_alive().unwrap();
        assert_eq!(client.fetch().unwrap(), payload);
        assert!(handle.join().unwrap().unwrap().completed);
    }

    #[test]
    fn test_upload_round_trip() {
        let source = temp_path("upload_src.mid");
        std::fs::write(&source, b"MThd").unwrap();
        let cfg = config("upload_dest.mid");
        let dest = cfg.upload_path.clone();
        let _files = TempFiles(vec![source.clone(), dest.clone()]);

        let server = Server::bind(cfg, &source).unwrap();
        let addr = server.local_addr().unwrap();
        let handle = thread::spawn(move || server.run());

        let data = b"MThd\x00\x00\x00\x06\x00\x01\x00\x02\x01\xe0MTrk".to_vec();
        let client = Client::connect(addr, Duration::from_secs(5)).unwrap();
        assert_eq!(client.upload(&data).unwrap(), data.len() as u64);

        let report = handle.join().unwrap().unwrap();
        assert_eq!(report.bytes_received, data.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), data);
    }

    #[test]
    fn test_connect_refused() {
        let addr = {
            let spare = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            spare.local_addr().unwrap()
        };
        assert!(matches!(
            Client::connect(addr, Duration::from_millis(500)),
            Err(Error::Connection(_))
        ));
    }
}
