//! Framed reading of concatenated JSON objects from a byte stream.
//!
//! The Kubernetes watch API responds with an unbounded sequence of JSON
//! objects. [`JsonFrameReader`] cuts that stream into frames without imposing
//! an upper bound on object size.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::bail;
use crate::error::{ErrorKind, SdResult};

/// Initial read buffer capacity.
///
/// The buffer doubles whenever a frame outgrows it; growth is transparent to
/// callers.
const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Reads one complete top-level JSON object per call from an [`AsyncRead`].
///
/// End-of-stream is surfaced as `Ok(None)`, distinct from framing failures:
/// callers treat end-of-stream as a signal to reconnect, not as a dropped
/// frame. A stream that ends in the middle of an object is also treated as
/// end-of-stream.
pub struct JsonFrameReader<R> {
    reader: R,
    buf: BytesMut,
    /// Bytes of `buf` already consumed by the scanner.
    scan_pos: usize,
    /// Offset of the current frame's opening brace within `buf`.
    frame_start: usize,
    scanner: FrameScanner,
}

impl<R: AsyncRead + Unpin> JsonFrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            scan_pos: 0,
            frame_start: 0,
            scanner: FrameScanner::default(),
        }
    }

    /// Returns the next complete JSON object, or `Ok(None)` at end-of-stream.
    pub async fn next_frame(&mut self) -> SdResult<Option<Bytes>> {
        loop {
            while self.scan_pos < self.buf.len() {
                let byte = self.buf[self.scan_pos];
                self.scan_pos += 1;

                match self.scanner.step(byte) {
                    ScanStep::Skip => {}
                    ScanStep::Begin => self.frame_start = self.scan_pos - 1,
                    ScanStep::Continue => {}
                    ScanStep::Complete => {
                        let consumed = self.buf.split_to(self.scan_pos).freeze();
                        let frame = consumed.slice(self.frame_start..);
                        self.scan_pos = 0;
                        self.frame_start = 0;
                        self.scanner = FrameScanner::default();
                        return Ok(Some(frame));
                    }
                    ScanStep::Invalid => {
                        bail!(
                            ErrorKind::DeserializationError,
                            "watch stream does not frame as JSON objects",
                            format!("unexpected byte 0x{byte:02x} between frames")
                        );
                    }
                }
            }

            // The buffered bytes hold no complete frame; grow when full and
            // read more.
            if self.buf.len() == self.buf.capacity() {
                self.buf.reserve(self.buf.capacity());
            }
            let n = self.reader.read_buf(&mut self.buf).await?;
            if n == 0 {
                return Ok(None);
            }
        }
    }
}

/// Incremental scanner tracking JSON object boundaries across reads.
///
/// Only brace depth and string state are tracked; the content of a balanced
/// frame is validated later by the serde decode, so a malformed frame never
/// terminates the stream.
#[derive(Debug, Default)]
struct FrameScanner {
    started: bool,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

enum ScanStep {
    /// Inter-frame whitespace.
    Skip,
    /// The opening brace of a new frame.
    Begin,
    /// A byte inside the current frame.
    Continue,
    /// The closing brace of the current frame.
    Complete,
    /// A byte that cannot start a frame.
    Invalid,
}

impl FrameScanner {
    fn step(&mut self, byte: u8) -> ScanStep {
        if !self.started {
            return match byte {
                b' ' | b'\t' | b'\r' | b'\n' => ScanStep::Skip,
                b'{' => {
                    self.started = true;
                    self.depth = 1;
                    ScanStep::Begin
                }
                _ => ScanStep::Invalid,
            };
        }

        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if byte == b'\\' {
                self.escaped = true;
            } else if byte == b'"' {
                self.in_string = false;
            }
            return ScanStep::Continue;
        }

        match byte {
            b'"' => {
                self.in_string = true;
                ScanStep::Continue
            }
            b'{' => {
                self.depth += 1;
                ScanStep::Continue
            }
            b'}' => {
                self.depth -= 1;
                if self.depth == 0 {
                    ScanStep::Complete
                } else {
                    ScanStep::Continue
                }
            }
            _ => ScanStep::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::{AsyncWriteExt, duplex};

    async fn read_all_frames(data: &[u8]) -> SdResult<Vec<Bytes>> {
        let mut reader = JsonFrameReader::new(Cursor::new(data.to_vec()));
        let mut frames = Vec::new();
        while let Some(frame) = reader.next_frame().await? {
            frames.push(frame);
        }
        Ok(frames)
    }

    #[tokio::test]
    async fn reads_a_single_object() {
        let frames = read_all_frames(br#"{"type":"ADDED","object":{}}"#).await.unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], br#"{"type":"ADDED","object":{}}"#);
    }

    #[tokio::test]
    async fn splits_concatenated_objects() {
        let frames = read_all_frames(b"{\"a\":1}\n{\"b\":{\"c\":2}}\n{\"d\":[1,2]}")
            .await
            .unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(&frames[1][..], br#"{"b":{"c":2}}"#);
        assert_eq!(&frames[2][..], br#"{"d":[1,2]}"#);
    }

    #[tokio::test]
    async fn braces_inside_strings_do_not_close_frames() {
        let frames = read_all_frames(br#"{"a":"}{\"","b":1}"#).await.unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[tokio::test]
    async fn objects_larger_than_the_initial_buffer_are_read_whole() {
        let big_value = "x".repeat(8 * INITIAL_BUFFER_CAPACITY);
        let data = format!(r#"{{"padding":"{big_value}"}}"#);
        let frames = read_all_frames(data.as_bytes()).await.unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), data.len());
    }

    #[tokio::test]
    async fn frames_split_across_reads_are_reassembled() {
        let (mut writer, reader) = duplex(16);
        let mut frame_reader = JsonFrameReader::new(reader);

        let write_task = tokio::spawn(async move {
            writer.write_all(br#"{"type":"ADDED","#).await.unwrap();
            writer.write_all(br#""object":{"metadata":{}}}"#).await.unwrap();
            drop(writer);
        });

        let frame = frame_reader.next_frame().await.unwrap().unwrap();
        assert_eq!(&frame[..], br#"{"type":"ADDED","object":{"metadata":{}}}"#);
        assert!(frame_reader.next_frame().await.unwrap().is_none());

        write_task.await.unwrap();
    }

    #[tokio::test]
    async fn end_of_stream_is_not_an_error() {
        let frames = read_all_frames(b"").await.unwrap();
        assert!(frames.is_empty());
    }

    #[tokio::test]
    async fn truncated_trailing_frame_is_treated_as_end_of_stream() {
        let mut reader = JsonFrameReader::new(Cursor::new(b"{\"a\":1}{\"trunc".to_vec()));
        assert!(reader.next_frame().await.unwrap().is_some());
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn garbage_between_frames_is_a_framing_error() {
        let mut reader = JsonFrameReader::new(Cursor::new(b"garbage".to_vec()));
        let err = reader.next_frame().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeserializationError);
    }
}
