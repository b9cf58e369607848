//! Reading a single client connection to completion.
//!
//! A connection carries exactly one message: everything the peer sends until
//! it closes its write side. Reads are best-effort: once any bytes have
//! arrived, a later failure resolves the read with the partial payload
//! instead of discarding it.

use bytes::BytesMut;
use std::fmt;
use std::io::{self, Read};

/// Fatal per-connection read failures.
///
/// Only produced when no payload bytes arrived at all; after the first byte
/// the read always resolves successfully with whatever was received.
#[derive(Debug)]
pub enum ReadError {
    /// The peer sent nothing within the idle read timeout.
    Stalled,
    /// The transport failed before any data arrived.
    Io(io::Error),
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadError::Stalled => write!(f, "connection stalled before any data arrived"),
            ReadError::Io(e) => write!(f, "read failed before any data arrived: {e}"),
        }
    }
}

impl std::error::Error for ReadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReadError::Stalled => None,
            ReadError::Io(e) => Some(e),
        }
    }
}

/// Read one message from `reader`.
///
/// Accumulates `chunk_size`-byte reads until the peer closes the stream or a
/// read fails, decodes the bytes as UTF-8 with invalid sequences replaced,
/// and trims surrounding whitespace. A peer that closes without sending
/// anything yields an empty string, as does a reset before the first byte;
/// zero-byte probe connections are not errors.
///
/// The reader must already enforce bounded reads (a receive timeout on the
/// socket); a timeout before any data arrives maps to [`ReadError::Stalled`].
/// A `chunk_size` of 0 is treated as 1.
pub fn read_message<R: Read>(reader: &mut R, chunk_size: usize) -> Result<String, ReadError> {
    let mut payload = BytesMut::new();
    let mut chunk = vec![0u8; chunk_size.max(1)];

    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => payload.extend_from_slice(&chunk[..n]),
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                if payload.is_empty() {
                    match e.kind() {
                        // Immediate close without a clean EOF: empty payload.
                        io::ErrorKind::ConnectionReset
                        | io::ErrorKind::ConnectionAborted
                        | io::ErrorKind::BrokenPipe => break,
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                            return Err(ReadError::Stalled);
                        }
                        _ => return Err(ReadError::Io(e)),
                    }
                }
                // Keep what we already received.
                break;
            }
        }
    }

    Ok(String::from_utf8_lossy(&payload).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Serves a fixed payload, then fails every subsequent read.
    struct FailingReader {
        data: Cursor<Vec<u8>>,
        kind: io::ErrorKind,
    }

    impl FailingReader {
        fn new(data: &[u8], kind: io::ErrorKind) -> Self {
            Self {
                data: Cursor::new(data.to_vec()),
                kind,
            }
        }
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.data.read(buf) {
                Ok(0) => Err(io::Error::new(self.kind, "injected failure")),
                other => other,
            }
        }
    }

    #[test]
    fn test_reads_and_trims_payload() {
        let mut reader = Cursor::new(b"  hello world\r\n".to_vec());
        let message = read_message(&mut reader, 1024).unwrap();
        assert_eq!(message, "hello world");
    }

    #[test]
    fn test_empty_stream_yields_empty_string() {
        let mut reader = Cursor::new(Vec::new());
        let message = read_message(&mut reader, 1024).unwrap();
        assert_eq!(message, "");
    }

    #[test]
    fn test_whitespace_only_payload_trims_to_empty() {
        let mut reader = Cursor::new(b"   \n\t  ".to_vec());
        let message = read_message(&mut reader, 1024).unwrap();
        assert_eq!(message, "");
    }

    #[test]
    fn test_accumulates_across_chunk_boundaries() {
        let mut reader = Cursor::new(b"a longer payload than the chunk\n".to_vec());
        let message = read_message(&mut reader, 4).unwrap();
        assert_eq!(message, "a longer payload than the chunk");
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut reader = Cursor::new(b"caf\xff\n".to_vec());
        let message = read_message(&mut reader, 1024).unwrap();
        assert_eq!(message, "caf\u{FFFD}");
    }

    #[test]
    fn test_failure_after_partial_data_returns_partial() {
        let mut reader = FailingReader::new(b"partial payload", io::ErrorKind::ConnectionReset);
        let message = read_message(&mut reader, 4).unwrap();
        assert_eq!(message, "partial payload");
    }

    #[test]
    fn test_timeout_after_partial_data_returns_partial() {
        let mut reader = FailingReader::new(b"slow client", io::ErrorKind::WouldBlock);
        let message = read_message(&mut reader, 1024).unwrap();
        assert_eq!(message, "slow client");
    }

    #[test]
    fn test_timeout_with_no_data_is_stalled() {
        let mut reader = FailingReader::new(b"", io::ErrorKind::WouldBlock);
        assert!(matches!(
            read_message(&mut reader, 1024),
            Err(ReadError::Stalled)
        ));
    }

    #[test]
    fn test_reset_with_no_data_yields_empty_string() {
        let mut reader = FailingReader::new(b"", io::ErrorKind::ConnectionReset);
        let message = read_message(&mut reader, 1024).unwrap();
        assert_eq!(message, "");
    }

    #[test]
    fn test_other_error_with_no_data_is_fatal() {
        let mut reader = FailingReader::new(b"", io::ErrorKind::PermissionDenied);
        assert!(matches!(
            read_message(&mut reader, 1024),
            Err(ReadError::Io(_))
        ));
    }

    #[test]
    fn test_zero_chunk_size_is_treated_as_one() {
        let mut reader = Cursor::new(b"ok\n".to_vec());
        let message = read_message(&mut reader, 0).unwrap();
        assert_eq!(message, "ok");
    }
}
