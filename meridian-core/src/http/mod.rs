//! HTTP/1.x support: an incremental byte-driven parser (`parser`), the message model it
//! feeds (`message`), URL parsing (`url`), and `multipart/form-data` splitting
//! (`multipart`).

pub mod message;
pub mod multipart;
pub mod parser;
pub mod tls;
pub mod url;

pub use message::{Body, Headers, Method, Request, Response};
pub use multipart::{split_parts, MultipartError, Part};
pub use parser::{Error, HeadersAction, Parser, ParserHandler, ParserLimits, ParserType, Result};
pub use tls::{client_config, server_config, TlsClientSession, TlsServerSession};
pub use url::{Url, UrlError};

/// A [`ParserHandler`] that assembles a [`Request`] as the byte parser drives it —
/// the glue between the low-level state machine and the higher-level message model.
pub struct RequestBuilder {
    request: Request,
    method_buf: Vec<u8>,
    field: Vec<u8>,
    value: Vec<u8>,
    url_buf: Vec<u8>,
    in_value: bool,
}

impl RequestBuilder {
    pub fn new() -> Self {
        RequestBuilder {
            request: Request::default(),
            method_buf: Vec::new(),
            field: Vec::new(),
            value: Vec::new(),
            url_buf: Vec::new(),
            in_value: false,
        }
    }

    /// Consume the builder, returning the assembled request. Call after
    /// `on_message_complete` has fired.
    pub fn finish(mut self) -> Request {
        self.flush_header();
        self.request.method = Some(Method::from_bytes(&self.method_buf));
        if let Ok(url) = Url::parse(&String::from_utf8_lossy(&self.url_buf), false) {
            self.request.url = url.path.unwrap_or_default();
        }
        self.request
    }

    fn flush_header(&mut self) {
        if self.field.is_empty() {
            return;
        }
        let field = String::from_utf8_lossy(&self.field).to_string();
        let value = String::from_utf8_lossy(&self.value).to_string();
        self.request.headers.push(field, value);
        self.field.clear();
        self.value.clear();
        self.in_value = false;
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ParserHandler for RequestBuilder {
    fn on_method(&mut self, data: &[u8]) {
        self.method_buf.extend_from_slice(data);
    }

    fn on_url(&mut self, data: &[u8]) {
        self.url_buf.extend_from_slice(data);
    }

    fn on_header_field(&mut self, data: &[u8]) {
        if self.in_value {
            self.flush_header();
        }
        self.field.extend_from_slice(data);
    }

    fn on_header_value(&mut self, data: &[u8]) {
        self.in_value = true;
        self.value.extend_from_slice(data);
    }

    fn on_headers_complete(&mut self) -> HeadersAction {
        self.flush_header();
        HeadersAction::Continue
    }

    fn on_body(&mut self, data: &[u8]) {
        self.request.body.push(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_simple_get_request() {
        let mut parser = Parser::new(ParserType::Request);
        let mut builder = RequestBuilder::new();

        let raw = b"GET /hello?x=1 HTTP/1.1\r\nHost: example.com\r\nContent-Length: 5\r\n\r\nhowdy";
        let consumed = parser.parse(raw, &mut builder).unwrap();
        assert_eq!(consumed, raw.len());

        let request = builder.finish();
        assert_eq!(request.method, Some(Method::Get));
        assert_eq!(request.url, "/hello");
        assert_eq!(request.headers.get("host"), Some("example.com"));
        assert_eq!(request.body.to_vec(), b"howdy");
    }

    struct ResponseCapture {
        status: Vec<u8>,
        body: Vec<u8>,
        complete: bool,
    }

    impl ParserHandler for ResponseCapture {
        fn on_status(&mut self, data: &[u8]) {
            self.status.extend_from_slice(data);
        }

        fn on_body(&mut self, data: &[u8]) {
            self.body.extend_from_slice(data);
        }

        fn on_message_complete(&mut self) {
            self.complete = true;
        }
    }

    #[test]
    fn test_parses_response_status_line_and_body() {
        let mut parser = Parser::new(ParserType::Response);
        let mut capture = ResponseCapture {
            status: Vec::new(),
            body: Vec::new(),
            complete: false,
        };

        let raw = b"HTTP/1.1 404 Not Found\r\nContent-Length: 3\r\n\r\nabc";
        let consumed = parser.parse(raw, &mut capture).unwrap();
        assert_eq!(consumed, raw.len());
        assert!(capture.complete);
        assert_eq!(capture.status, b"Not Found");
        assert_eq!(capture.body, b"abc");
    }

    #[test]
    fn test_parses_chunked_request_body() {
        let mut parser = Parser::new(ParserType::Request);
        let mut builder = RequestBuilder::new();

        let raw = b"POST /upload HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n";
        let consumed = parser.parse(raw, &mut builder).unwrap();
        assert_eq!(consumed, raw.len());

        let request = builder.finish();
        assert_eq!(request.body.to_vec(), b"Wikipedia");
    }

    #[test]
    fn test_multipart_roundtrip_through_body() {
        let body = b"--xyz\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n--xyz--\r\n";
        let parts = split_parts(body, "xyz").unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].body, b"1");
    }
}
