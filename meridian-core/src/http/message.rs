//! The message model that rides alongside the byte-level parser: an order-preserving,
//! duplicate-preserving header list (HTTP headers are a multimap, not a map) plus the
//! ring-buffered body the parser feeds as it goes.

use std::collections::VecDeque;

/// Ordered list of header field/value pairs. Lookups are case-insensitive; insertion
/// order (and duplicates) are preserved exactly as received, since some headers (notably
/// `Set-Cookie`) are only meaningful when every instance is kept.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Headers { entries: Vec::new() }
    }

    pub fn push(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.entries.push((field.into(), value.into()));
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(field))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a str> {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(field))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A FIFO byte body, handed to the caller incrementally as the parser emits `on_body`
/// chunks rather than materialized as a single allocation up front.
#[derive(Debug, Default)]
pub struct Body {
    chunks: VecDeque<Vec<u8>>,
    len: usize,
}

impl Body {
    pub fn new() -> Self {
        Body {
            chunks: VecDeque::new(),
            len: 0,
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.len += data.len();
        self.chunks.push_back(data.to_vec());
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Flatten the accumulated chunks into one buffer. Convenient for tests and small
    /// payloads; large bodies should be drained chunk by chunk instead.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len);
        for chunk in &self.chunks {
            out.extend_from_slice(chunk);
        }
        out
    }

    pub fn drain(&mut self) -> Vec<Vec<u8>> {
        self.len = 0;
        self.chunks.drain(..).collect()
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
    Other,
}

impl Method {
    pub fn from_bytes(bytes: &[u8]) -> Method {
        match bytes {
            b"GET" => Method::Get,
            b"HEAD" => Method::Head,
            b"POST" => Method::Post,
            b"PUT" => Method::Put,
            b"DELETE" => Method::Delete,
            b"CONNECT" => Method::Connect,
            b"OPTIONS" => Method::Options,
            b"TRACE" => Method::Trace,
            b"PATCH" => Method::Patch,
            _ => Method::Other,
        }
    }
}

/// A fully assembled request, built up by a [`crate::http::parser::ParserHandler`]
/// implementation as the byte parser drives it.
#[derive(Debug, Default)]
pub struct Request {
    pub method: Option<Method>,
    pub url: String,
    pub version: (u16, u16),
    pub headers: Headers,
    pub body: Body,
}

/// A fully assembled response.
#[derive(Debug, Default)]
pub struct Response {
    pub status_code: u16,
    pub status_text: String,
    pub version: (u16, u16),
    pub headers: Headers,
    pub body: Body,
}
