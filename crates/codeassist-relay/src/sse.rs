//! Incremental decoder for upstream server-sent-event bodies.

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

impl SseFrame {
    /// `[DONE]` and empty payloads carry no content.
    pub fn is_sentinel(&self) -> bool {
        let data = self.data.trim();
        data.is_empty() || data == "[DONE]"
    }
}

/// Buffers raw body bytes and yields complete frames. Frames may be split
/// across chunks at any byte, including inside a multi-byte character.
///
/// Input is consumed line by line; `buf` only ever holds the bytes after the
/// last line break, so each byte is scanned once.
#[derive(Default)]
pub(crate) struct SseDecoder {
    buf: Vec<u8>,
    pending: PendingFrame,
}

impl SseDecoder {
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        let Self { buf, pending } = self;
        let scanned = buf.len();
        buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut line_start = 0;
        for pos in scanned..buf.len() {
            if buf[pos] != b'\n' {
                continue;
            }
            let raw = String::from_utf8_lossy(&buf[line_start..pos]);
            let line: &str = &raw;
            match line.strip_suffix('\r').unwrap_or(line) {
                "" => frames.extend(pending.dispatch()),
                field => pending.apply(field),
            }
            line_start = pos + 1;
        }
        buf.drain(..line_start);
        frames
    }

    /// Flushes whatever is left once the body has ended without a final
    /// blank line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        let rest = std::mem::take(&mut self.buf);
        let line = String::from_utf8_lossy(&rest);
        let line = line.trim_end_matches(['\r', '\n']);
        if !line.is_empty() {
            self.pending.apply(line);
        }
        self.pending.dispatch()
    }
}

/// Fields collected since the last blank line.
#[derive(Default)]
struct PendingFrame {
    event: Option<String>,
    data: Vec<String>,
}

impl PendingFrame {
    fn apply(&mut self, line: &str) {
        if line.starts_with(':') {
            return;
        }
        let (name, value) = match line.split_once(':') {
            Some((name, value)) => (name, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match name {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // id, retry and unknown fields carry nothing we relay
            _ => {}
        }
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let PendingFrame { event, data } = std::mem::take(self);
        if event.is_none() && data.is_empty() {
            return None;
        }
        Some(SseFrame {
            event,
            data: data.join("\n"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_partial_chunk_boundaries() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push_chunk(b"data: {\"text\":\"hel").is_empty());
        let frames = decoder.push_chunk(b"lo\"}\n\ndata: [DONE]\n\n");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data, "{\"text\":\"hello\"}");
        assert!(frames[1].is_sentinel());
    }

    #[test]
    fn multibyte_character_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        let body = "data: héllo\r\n\r\n".as_bytes();
        let (a, b) = body.split_at(8);
        assert!(decoder.push_chunk(a).is_empty());
        let frames = decoder.push_chunk(b);
        assert_eq!(frames[0].data, "héllo");
    }

    #[test]
    fn comments_and_event_names() {
        let mut decoder = SseDecoder::default();
        let frames = decoder.push_chunk(b": keep-alive\n\nevent: message\ndata: a\ndata: b\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event.as_deref(), Some("message"));
        assert_eq!(frames[0].data, "a\nb");
    }

    #[test]
    fn finish_returns_unterminated_tail() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push_chunk(b"data: last").is_empty());
        assert_eq!(decoder.finish().map(|f| f.data).as_deref(), Some("last"));
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn large_frame_fed_byte_by_byte() {
        let payload = "x".repeat(10_000);
        let body = format!("id: 7\ndata: {payload}\n\n");
        let mut decoder = SseDecoder::default();
        let mut frames = Vec::new();
        for byte in body.as_bytes() {
            frames.extend(decoder.push_chunk(std::slice::from_ref(byte)));
        }
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, payload);
        assert!(decoder.buf.is_empty());
    }

    #[test]
    fn field_without_colon_is_an_empty_value() {
        let mut decoder = SseDecoder::default();
        let frames = decoder.push_chunk(b"data\ndata:x\n\n");
        assert_eq!(frames[0].data, "\nx");
    }
}
