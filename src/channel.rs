//! TCP transport for the three fixed roles (`p0`, `p1`, `p2`/helper).
//!
//! Unlike the n-party, dynamically-ranked channel set this crate's teacher
//! builds in `channel_utils::tcp_channel`, the topology here is fixed and
//! small: P0 dials P1, and both P0 and P1 dial the helper. Each connection
//! opens with a 1-byte role handshake, then carries little-endian `i64`
//! values for the rest of its life (spec §6 wire format). Hostnames are
//! resolved through `P0_HOST`/`P1_HOST`/`P2_HOST` environment variables
//! (defaulting to `p0`/`p1`/`p2`) so the same binary runs unmodified
//! whether the roles are separate containers or loopback processes.

use crate::error::{Error, Result};
use std::io::{BufReader, BufWriter, Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const HELPER_PORT: u16 = 9002;
const PEER_PORT: u16 = 9001;

fn host_env(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

/// Hostname configured for party 0.
pub fn p0_host() -> String {
    host_env("P0_HOST", "p0")
}

/// Hostname configured for party 1.
pub fn p1_host() -> String {
    host_env("P1_HOST", "p1")
}

/// Hostname configured for the helper (P2).
pub fn p2_host() -> String {
    host_env("P2_HOST", "p2")
}

fn connect_with_retry(host: &str, port: u16) -> Result<TcpStream> {
    let addr = (host, port)
        .to_socket_addrs()
        .map_err(Error::Io)?
        .next()
        .ok_or_else(|| Error::InvariantViolation {
            context: format!("could not resolve {host}:{port}"),
        })?;
    TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).map_err(Error::Io)
}

/// A bidirectional byte channel carrying little-endian `i64` values.
pub struct Channel {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Channel {
    /// Wrap a connected stream with buffered reader/writer halves.
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        let read_half = stream.try_clone().map_err(Error::Io)?;
        Ok(Channel {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(stream),
        })
    }

    /// Write a single `i64`, little-endian.
    pub fn write_i64(&mut self, v: i64) -> Result<()> {
        self.writer.write_all(&v.to_le_bytes()).map_err(Error::Io)
    }

    /// Read a single `i64`, little-endian.
    pub fn read_i64(&mut self) -> Result<i64> {
        let mut buf = [0u8; 8];
        self.reader.read_exact(&mut buf).map_err(Error::Io)?;
        Ok(i64::from_le_bytes(buf))
    }

    /// Write an array of `i64`s with no length prefix: both sides already
    /// agree on the length (`k` or `n`) from protocol context, so no length
    /// is sent on the wire.
    pub fn write_i64_array(&mut self, v: &[i64]) -> Result<()> {
        for &x in v {
            self.write_i64(x)?;
        }
        Ok(())
    }

    /// Read exactly `n` `i64`s with no length prefix.
    pub fn read_i64_array(&mut self, n: usize) -> Result<Vec<i64>> {
        (0..n).map(|_| self.read_i64()).collect()
    }

    /// Flush any buffered writes.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(Error::Io)
    }
}

fn send_role(stream: &mut TcpStream, role: u8) -> Result<()> {
    stream.write_all(&[role]).map_err(Error::Io)
}

fn recv_role(stream: &mut TcpStream) -> Result<u8> {
    let mut buf = [0u8; 1];
    stream.read_exact(&mut buf).map_err(Error::Io)?;
    Ok(buf[0])
}

/// Dial the helper on its fixed port and announce `role` (0 or 1).
pub fn connect_helper(role: u8) -> Result<Channel> {
    let mut stream = connect_with_retry(&p2_host(), HELPER_PORT)?;
    send_role(&mut stream, role)?;
    Channel::from_stream(stream)
}

/// Accept the helper's two incoming party connections, returning each
/// channel tagged with the role its party announced. Fails unless the
/// two roles are exactly `{0, 1}`.
pub fn accept_helper_clients() -> Result<((u8, Channel), (u8, Channel))> {
    let listener = TcpListener::bind(("0.0.0.0", HELPER_PORT)).map_err(Error::Io)?;
    let mut incoming = listener.incoming();

    let mut first = incoming
        .next()
        .ok_or_else(|| Error::InvariantViolation {
            context: "helper listener closed before first connection".into(),
        })?
        .map_err(Error::Io)?;
    let role_a = recv_role(&mut first)?;

    let mut second = incoming
        .next()
        .ok_or_else(|| Error::InvariantViolation {
            context: "helper listener closed before second connection".into(),
        })?
        .map_err(Error::Io)?;
    let role_b = recv_role(&mut second)?;

    if role_a == role_b || (role_a != 0 && role_a != 1) || (role_b != 0 && role_b != 1) {
        return Err(Error::InvariantViolation {
            context: format!("expected distinct roles {{0,1}}, got {role_a} and {role_b}"),
        });
    }

    Ok((
        (role_a, Channel::from_stream(first)?),
        (role_b, Channel::from_stream(second)?),
    ))
}

/// Establish the peer-to-peer connection: P0 dials P1, P1 listens and
/// accepts. Both sides then hold a symmetric [`Channel`].
pub fn connect_peer(role: u8) -> Result<Channel> {
    match role {
        0 => {
            let stream = connect_with_retry(&p1_host(), PEER_PORT)?;
            Channel::from_stream(stream)
        }
        1 => {
            let listener = TcpListener::bind(("0.0.0.0", PEER_PORT)).map_err(Error::Io)?;
            let (stream, _addr) = listener.accept().map_err(Error::Io)?;
            Channel::from_stream(stream)
        }
        other => Err(Error::InvariantViolation {
            context: format!("role must be 0 or 1, got {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::thread::spawn(move || TcpStream::connect(addr).unwrap());
        let (server, _) = listener.accept().unwrap();
        (server, client.join().unwrap())
    }

    #[test]
    fn i64_roundtrips_over_loopback() {
        let (a, b) = loopback_pair();
        let mut ca = Channel::from_stream(a).unwrap();
        let mut cb = Channel::from_stream(b).unwrap();

        ca.write_i64(-42).unwrap();
        ca.flush().unwrap();
        assert_eq!(cb.read_i64().unwrap(), -42);

        cb.write_i64_array(&[1, 2, 3]).unwrap();
        cb.flush().unwrap();
        assert_eq!(ca.read_i64_array(3).unwrap(), vec![1, 2, 3]);
    }
}
