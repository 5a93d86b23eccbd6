//! Message framing over a TCP byte stream.
//!
//! Every message is followed by [`TERMINATOR`]. A single socket read can carry
//! any number of complete messages plus the start of the next one, so readers
//! keep a [`FrameBuffer`] per connection.

use thiserror::Error;

pub const TERMINATOR: u8 = b';';

/// Upper bound on bytes buffered while waiting for a terminator.
pub const MAX_PENDING_BYTES: usize = 64 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("{0} bytes buffered without a frame terminator")]
    Oversized(usize),
}

/// Appends the terminator to a message body.
pub fn frame(body: &str) -> String {
    let mut framed = String::with_capacity(body.len() + 1);
    framed.push_str(body);
    framed.push(TERMINATOR as char);
    framed
}

/// Reassembles frames from arbitrary chunks of a byte stream.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    pending: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds `bytes` and returns every frame completed by them, in order.
    ///
    /// Empty frames are dropped. Invalid UTF-8 is replaced rather than rejected
    /// so the message decoder gets to report it.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>, FrameError> {
        self.pending.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while let Some(end) = self.pending.iter().position(|&b| b == TERMINATOR) {
            let rest = self.pending.split_off(end + 1);
            let mut body = std::mem::replace(&mut self.pending, rest);
            body.pop();
            if !body.is_empty() {
                frames.push(String::from_utf8_lossy(&body).into_owned());
            }
        }

        if self.pending.len() > MAX_PENDING_BYTES {
            return Err(FrameError::Oversized(self.pending.len()));
        }
        Ok(frames)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_appends_terminator() {
        assert_eq!(frame("1\n{}"), "1\n{};");
    }

    #[test]
    fn test_multiple_frames_in_one_read() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(b"a;b;c").unwrap();
        assert_eq!(frames, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(buffer.pending_len(), 1);
    }

    #[test]
    fn test_frame_split_across_reads() {
        let mut buffer = FrameBuffer::new();
        assert!(buffer.push(b"2\n{\"x\"").unwrap().is_empty());
        assert!(buffer.push(b":1").unwrap().is_empty());
        let frames = buffer.push(b"};3\n").unwrap();
        assert_eq!(frames, vec!["2\n{\"x\":1}".to_string()]);
        assert_eq!(buffer.pending_len(), 2);
    }

    #[test]
    fn test_empty_frames_are_skipped() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(b";;x;;").unwrap();
        assert_eq!(frames, vec!["x".to_string()]);
        assert_eq!(buffer.pending_len(), 0);
    }

    #[test]
    fn test_oversized_pending_data() {
        let mut buffer = FrameBuffer::new();
        let chunk = vec![b'a'; MAX_PENDING_BYTES];
        assert!(buffer.push(&chunk).is_ok());
        assert_eq!(
            buffer.push(b"aa"),
            Err(FrameError::Oversized(MAX_PENDING_BYTES + 2))
        );
    }
}
