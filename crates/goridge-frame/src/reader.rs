use std::io::{ErrorKind, Read};

use bytes::BytesMut;

use crate::codec::{decode_frame, has_complete_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally — callers always get complete frames.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = decode_frame(&mut self.buf, self.config.max_payload_size)? {
                return Ok(frame);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }
}

impl<T> FrameReader<T> {
    /// Whether a complete frame is already sitting in the read buffer.
    ///
    /// A corrupt buffered prefix also counts: the next `read_frame` returns
    /// the error without blocking.
    pub fn has_buffered_frame(&self) -> bool {
        has_complete_frame(&self.buf, self.config.max_payload_size).unwrap_or(true)
    }

    /// Number of bytes read from the stream but not yet decoded.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum payload size for subsequent frame decoding.
    pub fn set_max_payload_size(&mut self, max_payload_size: usize) {
        self.config.max_payload_size = max_payload_size;
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::codec::encode_frame;
    use crate::flags::{CODEC_JSON, ERROR};

    fn wire(frames: &[Frame]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for frame in frames {
            encode_frame(frame, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    #[test]
    fn read_single_frame() {
        let sent = Frame::new(&b"hello"[..], vec![1, 0], CODEC_JSON);
        let mut reader = FrameReader::new(Cursor::new(wire(&[sent.clone()])));
        let frame = reader.read_frame().unwrap();

        assert_eq!(frame, sent);
    }

    #[test]
    fn read_multiple_frames() {
        let frames = [
            Frame::new(&b"one"[..], vec![1, 0], 0),
            Frame::new(&b"two"[..], vec![2, 0], ERROR),
            Frame::new(&b"three"[..], vec![3, 0], CODEC_JSON),
        ];
        let mut reader = FrameReader::new(Cursor::new(wire(&frames)));

        for expected in &frames {
            assert_eq!(&reader.read_frame().unwrap(), expected);
        }
    }

    #[test]
    fn read_frame_with_large_payload() {
        let payload = vec![0xAB; 512 * 1024];
        let sent = Frame::new(payload.clone(), vec![9, 0], 0);
        let mut reader = FrameReader::new(Cursor::new(wire(&[sent])));
        let frame = reader.read_frame().unwrap();

        assert_eq!(frame.payload.as_ref(), payload.as_slice());
    }

    #[test]
    fn partial_read_handling() {
        let byte_reader = ByteByByteReader {
            bytes: wire(&[Frame::new(&b"slow"[..], vec![4, 0], 0)]),
            pos: 0,
        };
        let mut reader = FrameReader::new(byte_reader);

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.options, vec![4, 0]);
        assert_eq!(frame.payload.as_ref(), b"slow");
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_frame() {
        let mut partial = BytesMut::new();
        partial.put_u8(0);
        partial.put_u64_le(32);
        partial.put_u64_le(32);
        partial.put_slice(b"only-part");

        let mut reader = FrameReader::new(Cursor::new(partial.to_vec()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn desynchronized_stream_fails_fast() {
        let mut bytes = wire(&[Frame::new(&b"ok"[..], vec![1, 0], 0)]);
        bytes[9] ^= 0xFF;
        let mut reader = FrameReader::new(Cursor::new(bytes));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::Prefix { .. }));
        assert!(err.is_integrity());
    }

    #[test]
    fn oversized_frame_in_stream() {
        let mut bytes = BytesMut::new();
        bytes.put_u8(0);
        bytes.put_u64_le(1024);
        bytes.put_u64_le(1024);

        let cfg = FrameConfig {
            max_payload_size: 16,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(Cursor::new(bytes.to_vec()), cfg);
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
    }

    #[test]
    fn buffered_frame_detection() {
        let frames = [
            Frame::new(&b"a"[..], vec![1, 0], 0),
            Frame::new(&b"b"[..], vec![2, 0], 0),
        ];
        let mut reader = FrameReader::new(Cursor::new(wire(&frames)));
        assert!(!reader.has_buffered_frame());

        // The first read pulls both frames into the buffer.
        reader.read_frame().unwrap();
        assert!(reader.has_buffered_frame());
        assert!(reader.buffered_len() > 0);

        reader.read_frame().unwrap();
        assert!(!reader.has_buffered_frame());
        assert_eq!(reader.buffered_len(), 0);
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }

            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    #[test]
    fn roundtrip_over_socket_pair() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        let sent = Frame::new(&b"Service.Pingping"[..], vec![1, 12], CODEC_JSON);
        writer.write_frame(&sent).unwrap();

        assert_eq!(reader.read_frame().unwrap(), sent);
    }

    #[test]
    fn concurrent_reader_writer_threads() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        let reader_thread = std::thread::spawn(move || {
            for expected in 0..64u32 {
                let frame = reader.read_frame().unwrap();
                assert_eq!(frame.options, vec![expected, 0]);
                assert_eq!(frame.payload.as_ref(), format!("msg-{expected}").as_bytes());
            }
        });

        for i in 0..64u32 {
            let payload = format!("msg-{i}");
            writer
                .write_frame(&Frame::new(payload.into_bytes(), vec![i, 0], 0))
                .unwrap();
        }

        reader_thread.join().unwrap();
    }

    #[test]
    fn read_would_block_propagates_io_error() {
        let reader = WouldBlockThenData {
            blocked: false,
            bytes: wire(&[Frame::new(&b"ok"[..], vec![7, 0], 0)]),
            pos: 0,
        };
        let mut framed = FrameReader::new(reader);
        let err = framed.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::WouldBlock));

        // The stream is still usable once data is available.
        let frame = framed.read_frame().unwrap();
        assert_eq!(frame.options, vec![7, 0]);
    }

    struct WouldBlockThenData {
        blocked: bool,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for WouldBlockThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.blocked {
                self.blocked = true;
                return Err(std::io::Error::from(ErrorKind::WouldBlock));
            }
            let n = (self.bytes.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn interrupted_read_retries() {
        let reader = InterruptedThenData {
            interrupted: false,
            inner: Cursor::new(wire(&[Frame::new(&b"ok"[..], vec![8, 0], 0)])),
        };
        let mut framed = FrameReader::new(reader);
        let frame = framed.read_frame().unwrap();

        assert_eq!(frame.options, vec![8, 0]);
        assert_eq!(frame.payload.as_ref(), b"ok");
    }

    struct InterruptedThenData {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }
}
