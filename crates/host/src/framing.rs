//! Brace-balanced JSON framing.
//!
//! The host emits concatenated top-level JSON objects with no length prefix
//! and no delimiter. The scanner extracts one balanced object at a time,
//! counting braces at depth zero while ignoring braces inside string
//! literals (tracking quote toggling and backslash escapes). Byte-level
//! scanning is safe: `{`, `}`, `"` and `\` are ASCII and never appear
//! inside UTF-8 continuation bytes.

use serde_json::Value;

/// Unconsumed idle bytes above this are cleared by the transport when no
/// request is pending.
pub const MAX_IDLE_BUFFER: usize = 2048;

/// A framing failure. The buffer is cleared before this is returned.
#[derive(Debug, Clone, PartialEq)]
pub struct FramingError {
    pub message: String,
}

impl std::fmt::Display for FramingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "framing error: {}", self.message)
    }
}

/// Accumulates raw socket bytes and yields balanced top-level objects.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an incoming chunk.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Bytes buffered but not yet consumed as a frame.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    /// Drop everything buffered.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Extract the next balanced object, if one is complete.
    ///
    /// Junk before the first `{` is discarded. A balanced substring that
    /// fails to parse as JSON clears the buffer and returns an error.
    pub fn next_frame(&mut self) -> Result<Option<Value>, FramingError> {
        // Discard anything before the first opening brace.
        match self.buf.iter().position(|&b| b == b'{') {
            Some(0) => {}
            Some(start) => {
                self.buf.drain(..start);
            }
            None => {
                self.buf.clear();
                return Ok(None);
            }
        }

        let Some(end) = balanced_end(&self.buf) else {
            return Ok(None);
        };

        let frame: Vec<u8> = self.buf.drain(..=end).collect();
        match serde_json::from_slice(&frame) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                self.buf.clear();
                Err(FramingError {
                    message: format!("balanced object is not valid JSON: {e}"),
                })
            }
        }
    }
}

/// Index of the `}` closing the object that starts at byte 0, or None if
/// the object is not yet complete.
fn balanced_end(buf: &[u8]) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in buf.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn drain_all(fb: &mut FrameBuffer) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(Some(v)) = fb.next_frame() {
            out.push(v);
        }
        out
    }

    #[test]
    fn single_object() {
        let mut fb = FrameBuffer::new();
        fb.extend(br#"{"status":"ok","result":42}"#);
        let v = fb.next_frame().unwrap().unwrap();
        assert_eq!(v["result"], 42);
        assert_eq!(fb.pending_len(), 0);
    }

    #[test]
    fn object_split_across_chunks() {
        let mut fb = FrameBuffer::new();
        fb.extend(br#"{"status":"#);
        assert_eq!(fb.next_frame().unwrap(), None);
        fb.extend(br#""ok"}"#);
        let v = fb.next_frame().unwrap().unwrap();
        assert_eq!(v["status"], "ok");
    }

    #[test]
    fn multiple_objects_in_one_chunk() {
        let mut fb = FrameBuffer::new();
        fb.extend(br#"{"a":1}{"b":2}{"c":3}"#);
        let frames = drain_all(&mut fb);
        assert_eq!(frames, vec![json!({"a":1}), json!({"b":2}), json!({"c":3})]);
    }

    #[test]
    fn braces_inside_strings_are_ignored() {
        let mut fb = FrameBuffer::new();
        fb.extend(br#"{"code":"if x { y() }","n":1}"#);
        let v = fb.next_frame().unwrap().unwrap();
        assert_eq!(v["code"], "if x { y() }");
    }

    #[test]
    fn escaped_quotes_inside_strings() {
        let mut fb = FrameBuffer::new();
        fb.extend(br#"{"msg":"he said \"{\" loudly"}"#);
        let v = fb.next_frame().unwrap().unwrap();
        assert_eq!(v["msg"], "he said \"{\" loudly");
    }

    #[test]
    fn chunk_boundaries_do_not_matter() {
        // The same byte stream must yield the same frames no matter how
        // it is sliced.
        let stream = br#"{"a":"x{y}"}{"b":[1,2,{"c":3}]}{"d":"\\"}"#;
        let expected = vec![
            json!({"a":"x{y}"}),
            json!({"b":[1,2,{"c":3}]}),
            json!({"d":"\\"}),
        ];

        for chunk_size in 1..stream.len() {
            let mut fb = FrameBuffer::new();
            let mut frames = Vec::new();
            for chunk in stream.chunks(chunk_size) {
                fb.extend(chunk);
                while let Ok(Some(v)) = fb.next_frame() {
                    frames.push(v);
                }
            }
            assert_eq!(frames, expected, "chunk_size = {chunk_size}");
        }
    }

    #[test]
    fn junk_before_object_is_discarded() {
        let mut fb = FrameBuffer::new();
        fb.extend(b"Blender addon v2 ready\n{\"ok\":true}");
        let v = fb.next_frame().unwrap().unwrap();
        assert_eq!(v["ok"], true);
    }

    #[test]
    fn malformed_balanced_object_clears_buffer() {
        let mut fb = FrameBuffer::new();
        fb.extend(br#"{"a":}{"b":1}"#);
        assert!(fb.next_frame().is_err());
        assert_eq!(fb.pending_len(), 0);
    }

    #[test]
    fn keeps_suffix_after_frame() {
        let mut fb = FrameBuffer::new();
        fb.extend(br#"{"a":1}{"b":"#);
        assert_eq!(fb.next_frame().unwrap(), Some(json!({"a":1})));
        assert_eq!(fb.next_frame().unwrap(), None);
        assert!(fb.pending_len() > 0);
        fb.extend(b"2}");
        assert_eq!(fb.next_frame().unwrap(), Some(json!({"b":2})));
    }
}
