use std::fmt;
use std::io::{ErrorKind, Read};
use std::net::TcpStream;
use std::time::Instant;

use crate::error::{HwError, Result};

/// Which part of a response we were waiting on when a read failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPhase {
    Header,
    Payload,
}

impl fmt::Display for ReadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadPhase::Header => f.write_str("response header"),
            ReadPhase::Payload => f.write_str("response payload"),
        }
    }
}

/// Fill `buf` from `stream`, giving up once `deadline` passes.
///
/// The socket read timeout is shortened to whatever is left before the
/// deadline on every iteration so partial reads cannot stretch the total wait.
pub fn read_exact_before(
    stream: &mut TcpStream,
    buf: &mut [u8],
    deadline: Instant,
    phase: ReadPhase,
    addr: &str,
) -> Result<()> {
    let timeout = || HwError::Timeout {
        phase,
        addr: addr.to_string(),
    };
    let mut filled = 0;
    while filled < buf.len() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(timeout());
        }
        stream.set_read_timeout(Some(remaining))?;
        match stream.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(HwError::Closed {
                    phase,
                    addr: addr.to_string(),
                });
            }
            Ok(n) => filled += n,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Err(timeout());
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(HwError::Io(e)),
        }
    }
    Ok(())
}
