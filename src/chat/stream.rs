//! Decoding of the backend's streamed chat answer.
//!
//! Two wire formats are understood: raw UTF-8 text, and the AI SDK data
//! stream protocol (one `<code>:<json>` part per line, announced by the
//! `x-vercel-ai-data-stream: v1` header), of which text (`0`) and error (`3`)
//! parts are used.

use reqwest::header::HeaderMap;

const DATA_STREAM_HEADER: &str = "x-vercel-ai-data-stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    Text,
    DataStream,
}

impl StreamFormat {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        if headers
            .get(DATA_STREAM_HEADER)
            .is_some_and(|value| value == "v1")
        {
            StreamFormat::DataStream
        } else {
            StreamFormat::Text
        }
    }
}

/// A decoded piece of the answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamPart {
    Text(String),
    Error(String),
}

/// Incremental decoder; chunks may split lines and UTF-8 sequences anywhere.
#[derive(Debug)]
pub struct StreamDecoder {
    format: StreamFormat,
    pending: Vec<u8>,
}

impl StreamDecoder {
    pub fn new(format: StreamFormat) -> Self {
        Self {
            format,
            pending: Vec::new(),
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamPart> {
        self.pending.extend_from_slice(chunk);
        match self.format {
            StreamFormat::Text => self.drain_text(false),
            StreamFormat::DataStream => self.drain_lines(),
        }
    }

    /// Flush whatever is left once the body ends.
    pub fn finish(&mut self) -> Vec<StreamPart> {
        match self.format {
            StreamFormat::Text => self.drain_text(true),
            StreamFormat::DataStream => {
                let rest = std::mem::take(&mut self.pending);
                parse_line(&String::from_utf8_lossy(&rest))
                    .into_iter()
                    .collect()
            }
        }
    }

    fn drain_text(&mut self, eof: bool) -> Vec<StreamPart> {
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            // An incomplete trailing sequence waits for the next chunk.
            Err(e) if e.error_len().is_none() && !eof => e.valid_up_to(),
            Err(_) => self.pending.len(),
        };
        if valid == 0 {
            return Vec::new();
        }
        let bytes: Vec<u8> = self.pending.drain(..valid).collect();
        vec![StreamPart::Text(String::from_utf8_lossy(&bytes).into_owned())]
    }

    fn drain_lines(&mut self) -> Vec<StreamPart> {
        let mut parts = Vec::new();
        while let Some(newline) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            if let Some(part) = parse_line(&String::from_utf8_lossy(&line)) {
                parts.push(part);
            }
        }
        parts
    }
}

fn parse_line(line: &str) -> Option<StreamPart> {
    let (code, payload) = line.trim_end().split_once(':')?;
    match code {
        "0" => serde_json::from_str::<String>(payload).ok().map(StreamPart::Text),
        "3" => serde_json::from_str::<String>(payload).ok().map(StreamPart::Error),
        _ => None,
    }
}
