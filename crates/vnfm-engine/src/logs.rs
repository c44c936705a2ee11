//! Container log de-framing.
//!
//! Without a TTY the engine multiplexes stdout and stderr into frames of
//! `[stream, 0, 0, 0, len_be32] payload`. With a TTY the output is raw. The
//! decoder sniffs the first header and then emits complete text lines.

const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Multiplexed,
    Raw,
}

/// Incremental decoder from log body chunks to lines.
#[derive(Debug, Default)]
pub struct LogDecoder {
    framing: Option<Framing>,
    /// Bytes not yet de-framed.
    pending: Vec<u8>,
    /// De-framed text not yet terminated by a newline.
    text: Vec<u8>,
}

impl LogDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one body chunk; returns every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        if self.framing.is_none() {
            self.framing = sniff(&self.pending);
        }

        match self.framing {
            Some(Framing::Raw) => self.text.append(&mut self.pending),
            Some(Framing::Multiplexed) => self.drain_frames(),
            None => {}
        }

        self.take_lines()
    }

    /// Flush whatever remains once the stream has ended.
    pub fn finish(mut self) -> Option<String> {
        if self.framing != Some(Framing::Multiplexed) {
            self.text.append(&mut self.pending);
        }
        let mut lines = self.take_lines();
        if !self.text.is_empty() {
            lines.push(to_line(&self.text));
        }
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }

    fn drain_frames(&mut self) {
        let mut offset = 0;
        while self.pending.len() - offset >= HEADER_LEN {
            let header = &self.pending[offset..offset + HEADER_LEN];
            let size = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
            let end = offset + HEADER_LEN + size;
            if self.pending.len() < end {
                break;
            }
            self.text
                .extend_from_slice(&self.pending[offset + HEADER_LEN..end]);
            offset = end;
        }
        self.pending.drain(..offset);
    }

    fn take_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(pos) = self.text.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.text.drain(..=pos).collect();
            lines.push(to_line(&line[..pos]));
        }
        lines
    }
}

fn sniff(bytes: &[u8]) -> Option<Framing> {
    let first = *bytes.first()?;
    if first > 2 {
        return Some(Framing::Raw);
    }
    if bytes.len() < HEADER_LEN {
        return None;
    }
    if bytes[1..4] == [0, 0, 0] {
        Some(Framing::Multiplexed)
    } else {
        Some(Framing::Raw)
    }
}

fn to_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(stream: u8, payload: &str) -> Vec<u8> {
        let mut out = vec![stream, 0, 0, 0];
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload.as_bytes());
        out
    }

    #[test]
    fn multiplexed_frames_become_lines() {
        let mut body = frame(1, "hello\n");
        body.extend(frame(2, "oops\n"));

        let mut decoder = LogDecoder::new();
        assert_eq!(decoder.push(&body), vec!["hello", "oops"]);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn frames_split_across_chunks() {
        let body = frame(1, "first line\nsecond");
        let (a, b) = body.split_at(5);

        let mut decoder = LogDecoder::new();
        assert!(decoder.push(a).is_empty());
        assert_eq!(decoder.push(b), vec!["first line"]);
        assert_eq!(decoder.finish().as_deref(), Some("second"));
    }

    #[test]
    fn raw_output_passes_through() {
        let mut decoder = LogDecoder::new();
        assert_eq!(decoder.push(b"tty line\r\nmore"), vec!["tty line"]);
        assert_eq!(decoder.push(b" text\n"), vec!["more text"]);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn short_undecided_input_is_flushed_as_text() {
        let mut decoder = LogDecoder::new();
        assert!(decoder.push(&[1, 0]).is_empty());
        assert!(decoder.finish().is_some());
    }
}
