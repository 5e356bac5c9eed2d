use super::{Chunks, ChunksError};

#[derive(Debug)]
pub enum Error {
    ChunksError(ChunksError),
    InvalidPayload,
}

/// A type for reading server-sent events from a chunk stream.
///
/// Only the `data` field matters to chat completions. Comment lines (used
/// by OpenRouter as keep-alives) and other fields are skipped, multiple
/// `data` lines of one event are joined by `\n`.
pub struct Sse {
    buf: Vec<u8>,
    chunks: Chunks,
    exhausted: bool,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: Vec::new(),
            chunks,
            exhausted: false,
        }
    }

    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            // There may be complete events left in the buffer, try to parse
            // one before touching the stream.
            if let Some(event) = self.try_parse_event()? {
                return Ok(Some(event));
            }
            if self.exhausted {
                return self.flush_tail();
            }

            match self.chunks.next_chunk().await.map_err(Error::ChunksError)? {
                Some(bytes) => self.buf.extend_from_slice(&bytes),
                None => self.exhausted = true,
            }
        }
    }

    fn try_parse_event(&mut self) -> Result<Option<String>, Error> {
        // Events are separated by a blank line. Scanning bytes instead of
        // `str` avoids splitting a multi-byte character across chunks.
        loop {
            let Some((end, sep_len)) = find_event_boundary(&self.buf) else {
                return Ok(None);
            };
            let block = self.buf.drain(..end + sep_len).collect::<Vec<_>>();
            let Ok(block) = String::from_utf8(block) else {
                return Err(Error::InvalidPayload);
            };
            if let Some(data) = parse_block(&block[..end])? {
                return Ok(Some(data));
            }
        }
    }

    /// Handles a final event that is not followed by a blank line.
    fn flush_tail(&mut self) -> Result<Option<String>, Error> {
        if self.buf.is_empty() {
            return Ok(None);
        }
        let tail = std::mem::take(&mut self.buf);
        let Ok(tail) = String::from_utf8(tail) else {
            return Err(Error::InvalidPayload);
        };
        // An unterminated tail is only accepted when it is a single
        // complete line; anything else is a truncated stream.
        if !tail.ends_with('\n') {
            return Ok(None);
        }
        parse_block(&tail)
    }
}

fn find_event_boundary(buf: &[u8]) -> Option<(usize, usize)> {
    let mut idx = 0;
    while idx + 1 < buf.len() {
        if buf[idx] == b'\n' && buf[idx + 1] == b'\n' {
            return Some((idx, 2));
        }
        if idx + 3 < buf.len() && &buf[idx..idx + 4] == b"\r\n\r\n" {
            return Some((idx, 4));
        }
        idx += 1;
    }
    None
}

fn parse_block(block: &str) -> Result<Option<String>, Error> {
    let mut data: Option<String> = None;
    for line in block.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => {
                (field, value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };
        match field {
            "data" => {
                let data = data.get_or_insert_default();
                if !data.is_empty() {
                    data.push('\n');
                }
                data.push_str(value);
            }
            "event" | "id" | "retry" => {}
            _ => return Err(Error::InvalidPayload),
        }
    }
    Ok(data)
}
