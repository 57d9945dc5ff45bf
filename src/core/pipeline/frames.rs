use itertools::Itertools;

const DATA_PREFIX: &str = "data:";

/// Incremental splitter for a `text/event-stream` body.
///
/// Bytes are buffered until a blank line closes a frame, so multi-byte
/// characters split across chunks decode correctly.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns the payloads of every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some((end, delimiter_len)) = find_delimiter(&self.buf) {
            let frame: Vec<u8> = self.buf.drain(..end + delimiter_len).take(end).collect();
            payloads.extend(frame_payload(&String::from_utf8_lossy(&frame)));
        }
        payloads
    }

    /// Flushes a trailing frame the server closed without a blank line.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        frame_payload(&String::from_utf8_lossy(&rest))
    }
}

fn find_delimiter(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|pos| (pos, 2));
    let crlf = buf
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| (pos, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Joins the frame's `data:` lines; frames without one (comments,
/// keep-alives, unknown fields) carry no payload.
pub fn frame_payload(frame: &str) -> Option<String> {
    let mut data = frame
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter_map(|line| line.strip_prefix(DATA_PREFIX))
        .map(|value| value.strip_prefix(' ').unwrap_or(value))
        .peekable();
    data.peek()?;
    Some(data.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_split_across_chunks() {
        let mut decoder = FrameDecoder::new();

        assert!(decoder.push(b"data: {\"status\":").is_empty());
        assert_eq!(
            decoder.push(b"\"queued\"}\n\ndata: {\"a\":1}\n"),
            vec!["{\"status\":\"queued\"}"]
        );
        assert_eq!(decoder.push(b"\n"), vec!["{\"a\":1}"]);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let mut decoder = FrameDecoder::new();
        let frame = "data: {\"message\":\"完成\"}\n\n".as_bytes();
        let (head, tail) = frame.split_at(20);

        assert!(decoder.push(head).is_empty());
        assert_eq!(decoder.push(tail), vec!["{\"message\":\"完成\"}"]);
    }

    #[test]
    fn test_frames_without_data_are_ignored() {
        let mut decoder = FrameDecoder::new();

        let payloads = decoder.push(b": keep-alive\n\nevent: ping\n\ndata: x\n\n");

        assert_eq!(payloads, vec!["x"]);
    }

    #[test]
    fn test_crlf_frames_and_multiline_data() {
        let mut decoder = FrameDecoder::new();

        let payloads = decoder.push(b"data: one\r\ndata: two\r\n\r\n");

        assert_eq!(payloads, vec!["one\ntwo"]);
    }

    #[test]
    fn test_finish_flushes_trailing_frame() {
        let mut decoder = FrameDecoder::new();

        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("tail"));
        assert_eq!(decoder.finish(), None);
    }
}
