//! Byte transport between the link engine and the controller.
//!
//! The engine only needs two primitives: push a whole record out, and wait a
//! bounded time for a whole record to come back.  [`TcpTransport`] is the
//! production implementation; tests substitute scripted transports.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

/// Record-oriented, bounded-wait transport.
pub trait Transport: Send {
    /// Write one complete record.
    ///
    /// # Errors
    ///
    /// Any I/O failure, including a write that exceeds the send timeout.
    fn send(&mut self, record: &[u8]) -> io::Result<()>;

    /// Wait at most `timeout` for a complete record of `len` bytes.
    ///
    /// Returns `Ok(None)` when no full record is available yet.
    fn poll_record(&mut self, len: usize, timeout: Duration) -> io::Result<Option<Vec<u8>>>;

    /// Release the underlying connection.
    fn close(&mut self) {}
}

/// TCP client connection to the controller.
///
/// Partial reads are buffered until a full record has arrived.  A write
/// that times out part way through a record is finished before the next
/// record goes out.
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
    peer: SocketAddr,
    pending: Vec<u8>,
    writer: RecordWriter,
}

impl TcpTransport {
    /// Connect to the first reachable address `addr` resolves to.
    pub fn connect(addr: &str, connect_timeout: Duration, send_timeout: Duration) -> io::Result<Self> {
        let mut last_err = None;
        for candidate in addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&candidate, connect_timeout) {
                Ok(stream) => return Self::from_stream(stream, send_timeout),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("{addr} resolved to no address"))
        }))
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: TcpStream, send_timeout: Duration) -> io::Result<Self> {
        stream.set_write_timeout(Some(send_timeout))?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        debug!(%peer, "tcp transport connected");
        Ok(Self {
            stream,
            peer,
            pending: Vec::new(),
            writer: RecordWriter::default(),
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    fn take_record(&mut self, len: usize) -> Option<Vec<u8>> {
        (self.pending.len() >= len).then(|| self.pending.drain(..len).collect())
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, record: &[u8]) -> io::Result<()> {
        self.writer.send(&mut self.stream, record)
    }

    fn poll_record(&mut self, len: usize, timeout: Duration) -> io::Result<Option<Vec<u8>>> {
        if let Some(record) = self.take_record(len) {
            return Ok(Some(record));
        }

        // A zero read timeout means "block forever" to the OS.
        self.stream
            .set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
        let mut buf = [0u8; 1024];
        match self.stream.read(&mut buf) {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "controller closed the connection",
            )),
            Ok(n) => {
                self.pending.extend_from_slice(&buf[..n]);
                Ok(self.take_record(len))
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn close(&mut self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!(error = %e, "tcp shutdown");
        }
    }
}

/// Keeps record boundaries aligned across interrupted writes.
///
/// The tail of a partly written record is sent ahead of the next record.  A
/// record that failed before its first byte went out is dropped.
#[derive(Debug, Default)]
struct RecordWriter {
    unsent: Vec<u8>,
}

impl RecordWriter {
    fn send<W: Write>(&mut self, out: &mut W, record: &[u8]) -> io::Result<()> {
        if !self.unsent.is_empty() {
            let mut tail = std::mem::take(&mut self.unsent);
            if let Err((written, e)) = write_counted(out, &tail) {
                tail.drain(..written);
                self.unsent = tail;
                return Err(e);
            }
            debug!("finished partly written record");
        }

        match write_counted(out, record) {
            Ok(()) => Ok(()),
            Err((0, e)) => Err(e),
            Err((written, e)) => {
                debug!(written, len = record.len(), "record partly written");
                self.unsent = record[written..].to_vec();
                Err(e)
            }
        }
    }

    #[cfg(test)]
    fn is_aligned(&self) -> bool {
        self.unsent.is_empty()
    }
}

/// `write_all` that reports how far it got on failure.
fn write_counted<W: Write>(out: &mut W, buf: &[u8]) -> Result<(), (usize, io::Error)> {
    let mut written = 0;
    while written < buf.len() {
        match out.write(&buf[written..]) {
            Ok(0) => return Err((written, io::Error::from(io::ErrorKind::WriteZero))),
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err((written, e)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn partial_reads_are_accumulated() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = thread::spawn(move || {
            let (mut peer, _) = listener.accept().unwrap();
            let record: Vec<u8> = (0..144u32).map(|b| b as u8).collect();
            peer.write_all(&record[..100]).unwrap();
            peer.flush().unwrap();
            thread::sleep(Duration::from_millis(50));
            peer.write_all(&record[100..]).unwrap();
            // Second record back to back.
            peer.write_all(&record).unwrap();
            thread::sleep(Duration::from_millis(200));
        });

        let mut transport =
            TcpTransport::connect(&addr, Duration::from_secs(1), Duration::from_millis(100)).unwrap();

        let mut records = Vec::new();
        for _ in 0..200 {
            if let Some(r) = transport.poll_record(144, Duration::from_millis(10)).unwrap() {
                records.push(r);
                if records.len() == 2 {
                    break;
                }
            }
        }
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], records[1]);
        assert_eq!(records[0][143], 143);
        server.join().unwrap();
    }

    #[test]
    fn poll_without_data_returns_none() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = thread::spawn(move || {
            let (_peer, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_millis(100));
        });

        let mut transport =
            TcpTransport::connect(&addr, Duration::from_secs(1), Duration::from_millis(100)).unwrap();
        assert!(transport.poll_record(144, Duration::from_millis(10)).unwrap().is_none());
        server.join().unwrap();
    }

    #[test]
    fn send_reaches_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = thread::spawn(move || {
            let (mut peer, _) = listener.accept().unwrap();
            let mut buf = [0u8; 8];
            peer.read_exact(&mut buf).unwrap();
            buf
        });

        let mut transport =
            TcpTransport::connect(&addr, Duration::from_secs(1), Duration::from_millis(100)).unwrap();
        transport.send(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert_eq!(server.join().unwrap(), [1, 2, 3, 4, 5, 6, 7, 8]);
        transport.close();
    }

    /// Accepts `budget` bytes, then times out until the budget is raised.
    #[derive(Default)]
    struct ChokedWriter {
        accepted: Vec<u8>,
        budget: usize,
    }

    impl Write for ChokedWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::from(io::ErrorKind::TimedOut));
            }
            let n = buf.len().min(self.budget);
            self.accepted.extend_from_slice(&buf[..n]);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn timed_out_record_is_completed_before_the_next() {
        let mut writer = RecordWriter::default();
        let mut out = ChokedWriter {
            budget: 3,
            ..ChokedWriter::default()
        };

        let err = writer.send(&mut out, &[1, 2, 3, 4, 5]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(!writer.is_aligned());

        out.budget = 100;
        writer.send(&mut out, &[6, 7, 8, 9, 10]).unwrap();
        assert!(writer.is_aligned());
        assert_eq!(out.accepted, [1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
    }

    #[test]
    fn tail_that_times_out_again_is_kept() {
        let mut writer = RecordWriter::default();
        let mut out = ChokedWriter {
            budget: 2,
            ..ChokedWriter::default()
        };
        assert!(writer.send(&mut out, &[1, 2, 3, 4, 5]).is_err());

        out.budget = 1;
        assert!(writer.send(&mut out, &[6, 7]).is_err());
        assert!(!writer.is_aligned());

        out.budget = 100;
        writer.send(&mut out, &[8, 9]).unwrap();
        assert_eq!(out.accepted, [1, 2, 3, 4, 5, 8, 9]);
    }

    #[test]
    fn record_refused_outright_is_dropped() {
        let mut writer = RecordWriter::default();
        let mut out = ChokedWriter::default();
        assert!(writer.send(&mut out, &[1, 2, 3]).is_err());
        assert!(writer.is_aligned());

        out.budget = 100;
        writer.send(&mut out, &[4, 5]).unwrap();
        assert_eq!(out.accepted, [4, 5]);
    }

    #[test]
    fn refused_connection_is_an_error() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().to_string()
        };
        assert!(TcpTransport::connect(&addr, Duration::from_millis(200), Duration::from_millis(100)).is_err());
    }
}
