//! Incremental, byte-at-a-time HTTP/1.x parser in the mold of the classic joyent
//! `http_parser`: feed it whatever bytes arrived off the wire, in whatever chunk sizes
//! the transport happened to deliver them, and it drives a [`ParserHandler`] as tokens
//! complete. No internal buffering of the message body — callbacks see slices straight
//! out of the input the caller passed in.

use serde_derive::{Deserialize, Serialize};
use std::fmt;

use super::multipart;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ParserType {
    Request,
    Response,
    /// Sniff the first bytes to decide: a status line starts `HTTP/`, a request line
    /// starts with a method token. The only ambiguity is `HEAD` vs. a response, resolved
    /// by the second byte (`HT` => response, anything else => request).
    Both,
}

bitflags_like! {
    pub struct Flags: u16 {
        const HEAD_DONE = 1 << 0;
        const CONNECTION_KEEP_ALIVE = 1 << 1;
        const CONNECTION_CLOSE = 1 << 2;
        const CONNECTION_UPGRADE = 1 << 3;
        const TRAILING = 1 << 4;
        const UPGRADE = 1 << 5;
        const SKIP_BODY = 1 << 6;
        const CONTENT_LENGTH = 1 << 7;
        const BOUNDARY = 1 << 8;
        const CHUNKED = 1 << 9;
    }
}

/// A tiny hand-rolled stand-in for the `bitflags!` macro — the crate's own dependency
/// list has no reason to pull that crate in for an 8-bit flag set.
macro_rules! bitflags_like {
    (pub struct $name:ident: $repr:ty { $(const $variant:ident = $value:expr;)* }) => {
        #[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
        pub struct $name($repr);

        impl $name {
            $(pub const $variant: $name = $name($value);)*

            pub const fn empty() -> Self { $name(0) }
            pub fn contains(self, other: Self) -> bool { self.0 & other.0 == other.0 }
            pub fn insert(&mut self, other: Self) { self.0 |= other.0; }
            pub fn remove(&mut self, other: Self) { self.0 &= !other.0; }
        }
    };
}

use bitflags_like;

/// Every tunable named for the parser, as an explicit, `serde`-deserializable config
/// struct rather than compile-time constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserLimits {
    pub max_header_size: usize,
    pub strict: bool,
    pub lenient_transfer_encoding: bool,
}

impl Default for ParserLimits {
    fn default() -> Self {
        ParserLimits {
            max_header_size: 80 * 1024,
            strict: true,
            lenient_transfer_encoding: false,
        }
    }
}

#[derive(Debug, Eq, PartialEq)]
pub enum Error {
    InvalidMethod,
    InvalidVersion,
    InvalidStatus,
    InvalidUrl,
    InvalidHeaderToken,
    InvalidContentLength,
    InvalidTransferEncoding,
    InvalidChunkSize,
    HeaderOverflow,
    LfExpected,
    UnexpectedEof,
    CallbackAbort,
    ClosedConnection,
    InvalidMultipart,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// What `on_headers_complete` told the parser to do about the body.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum HeadersAction {
    /// Parse the body normally (the default).
    Continue,
    /// No body follows regardless of what Content-Length/Transfer-Encoding said
    /// (response to a HEAD request).
    NoBody,
    /// No body, and no further messages on this connection (CONNECT-style upgrade).
    NoBodyNoFurtherMessages,
    /// Abort the parse outright; surfaces as [`Error::CallbackAbort`].
    Abort,
}

/// Callbacks driven by [`Parser::parse`]. Every method has a default no-op so a handler
/// only needs to implement the ones it cares about — a capability object, not a giant
/// interface to implement in full each time.
#[allow(unused_variables)]
pub trait ParserHandler {
    fn on_message_begin(&mut self) {}
    fn on_method(&mut self, data: &[u8]) {}
    fn on_url(&mut self, data: &[u8]) {}
    fn on_status(&mut self, data: &[u8]) {}
    fn on_header_field(&mut self, data: &[u8]) {}
    fn on_header_value(&mut self, data: &[u8]) {}
    fn on_headers_complete(&mut self) -> HeadersAction {
        HeadersAction::Continue
    }
    fn on_body(&mut self, data: &[u8]) {}
    fn on_chunk_header(&mut self, size: u64) {}
    fn on_chunk_complete(&mut self) {}
    /// Fired once per part after a body whose `Content-Type` declared
    /// `multipart/form-data` (or any other `multipart/*`) has been fully buffered and
    /// split on its boundary. `name`/`filename` come from that part's own
    /// `Content-Disposition` header, when present. Plain (non-multipart) bodies still go
    /// through `on_body` only.
    fn on_multipart_part(&mut self, name: Option<&str>, filename: Option<&str>, headers: &[(String, String)], body: &[u8]) {}
    fn on_message_complete(&mut self) {}
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum State {
    ReqMethod,
    ReqSpacesBeforeUrl,
    ReqUrl,
    ReqHttpStart,
    ReqHttpMajor,
    ReqHttpMinor,
    ReqLineAlmostDone,

    /// Only reachable with `ParserType::Both`: first byte of the message not yet seen.
    StartReqOrRes,
    /// Only reachable with `ParserType::Both`: first byte was `H`, second byte decides.
    StartReqOrResH,

    ResHttpStart,
    ResHttpMajor,
    ResHttpMinor,
    ResStatusCodeStart,
    ResStatusCode,
    ResStatusStart,
    ResStatus,
    ResLineAlmostDone,

    HeaderFieldStart,
    HeaderField,
    HeaderValueDiscardWs,
    HeaderValueStart,
    HeaderValue,
    HeaderAlmostDone,
    HeadersAlmostDone,

    BodyIdentity,
    BodyIdentityEof,

    ChunkSizeStart,
    ChunkSize,
    ChunkParameters,
    ChunkSizeAlmostDone,
    ChunkData,
    ChunkDataAlmostDone,
    ChunkTrailerFieldStart,
    ChunkTrailerField,
    ChunkTrailerValueStart,
    ChunkTrailerValue,
    ChunkTrailerAlmostDone,

    MessageDone,
    Dead,
}

/// An incremental HTTP/1.x message parser. One instance parses exactly one message;
/// call [`Parser::reset`] to reuse it for the next message on a keep-alive connection.
pub struct Parser {
    kind: ParserType,
    /// The kind actually in effect for this message. Equal to `kind` unless `kind` is
    /// [`ParserType::Both`], in which case it starts as `Request` and is corrected once
    /// the first bytes disambiguate a status line from a request line.
    effective_kind: ParserType,
    limits: ParserLimits,
    state: State,
    flags: Flags,

    http_major: u16,
    http_minor: u16,
    status_code: u16,

    content_length: Option<u64>,
    chunk_size: u64,

    header_size: usize,
    message_began: bool,
    lit_pos: usize,
    paused: bool,
    /// Set by the caller (`set_skip_body`) before parsing a response to a HEAD request,
    /// matching the classic `http_parser`'s `F_SKIPBODY` convention: the response framing
    /// headers are parsed normally but no body bytes follow regardless of what they say.
    skip_body: bool,

    /// `Some` once `Content-Type` has been seen to declare `multipart/*`, holding the
    /// boundary token extracted from it.
    boundary: Option<String>,
    /// Raw body bytes accumulated while `boundary` is set, handed to `multipart::split_parts`
    /// once the body is fully framed rather than streamed to `on_body` byte-by-byte.
    multipart_buf: Vec<u8>,
    last_part_name: Option<String>,
    last_part_filename: Option<String>,

    cur_field: Vec<u8>,
    cur_value: Vec<u8>,
}

const HTTP_LITERAL: &[u8] = b"HTTP/";

impl Parser {
    pub fn new(kind: ParserType) -> Self {
        Self::with_limits(kind, ParserLimits::default())
    }

    pub fn with_limits(kind: ParserType, limits: ParserLimits) -> Self {
        let state = match kind {
            ParserType::Request => State::ReqMethod,
            ParserType::Response => State::ResHttpStart,
            ParserType::Both => State::StartReqOrRes,
        };
        let effective_kind = match kind {
            ParserType::Both => ParserType::Request,
            other => other,
        };

        Parser {
            kind,
            effective_kind,
            limits,
            state,
            flags: Flags::empty(),
            http_major: 0,
            http_minor: 0,
            status_code: 0,
            content_length: None,
            chunk_size: 0,
            header_size: 0,
            message_began: false,
            lit_pos: 0,
            paused: false,
            skip_body: false,
            boundary: None,
            multipart_buf: Vec::new(),
            last_part_name: None,
            last_part_filename: None,
            cur_field: Vec::new(),
            cur_value: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        let kind = self.kind;
        let limits = self.limits.clone();
        *self = Parser::with_limits(kind, limits);
    }

    /// Tell a response parser that the request it answers was `HEAD` (or otherwise must
    /// not carry a body), independent of the headers the response itself declares.
    pub fn set_skip_body(&mut self, skip: bool) {
        self.skip_body = skip;
    }

    /// Suspend/resume parsing. While paused, `parse` consumes nothing and returns
    /// immediately; the caller is expected to buffer incoming bytes and re-feed them
    /// (from the point `parse` last returned) once resumed.
    pub fn pause(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// `true` once the parser has determined that the body (if any) is terminated only
    /// by the transport closing, not by a declared length or chunked trailer — i.e. the
    /// caller must call [`Parser::eof`] when the connection closes to finalize the
    /// message.
    pub fn needs_eof(&self) -> bool {
        self.state == State::BodyIdentityEof
    }

    /// Signal that the underlying transport has closed. Finalizes an EOF-terminated body
    /// ([`Parser::needs_eof`]); fails with [`Error::UnexpectedEof`] if a message was left
    /// mid-parse for any other reason.
    pub fn eof<H: ParserHandler>(&mut self, handler: &mut H) -> Result<()> {
        if self.needs_eof() {
            return self.finish_body_message(handler);
        }
        if matches!(self.state, State::MessageDone) || !self.message_began {
            return Ok(());
        }
        Err(Error::UnexpectedEof)
    }

    pub fn is_upgrade(&self) -> bool {
        self.flags.contains(Flags::UPGRADE)
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn version(&self) -> (u16, u16) {
        (self.http_major, self.http_minor)
    }

    pub fn is_chunked(&self) -> bool {
        self.flags.contains(Flags::CHUNKED)
    }

    /// The boundary token extracted from a `multipart/*` `Content-Type`, once the headers
    /// that declared it have been seen.
    pub fn boundary(&self) -> Option<&str> {
        self.boundary.as_deref()
    }

    /// The `name` parameter of the most recently completed multipart part's
    /// `Content-Disposition` header, if any.
    pub fn form_name(&self) -> Option<&str> {
        self.last_part_name.as_deref()
    }

    /// The `filename` parameter of the most recently completed multipart part's
    /// `Content-Disposition` header, if any.
    pub fn file_name(&self) -> Option<&str> {
        self.last_part_filename.as_deref()
    }

    pub fn should_keep_alive(&self) -> bool {
        if self.flags.contains(Flags::CONNECTION_CLOSE) {
            return false;
        }
        if self.http_major >= 1 && self.http_minor >= 1 {
            !self.flags.contains(Flags::CONNECTION_CLOSE)
        } else {
            self.flags.contains(Flags::CONNECTION_KEEP_ALIVE)
        }
    }

    /// Feed `data` into the parser, returning the number of bytes consumed. When the
    /// message (headers + any body) is fully parsed, the remaining unconsumed bytes
    /// (belonging to a subsequent pipelined message) are left unread — `len < data.len()`.
    pub fn parse<H: ParserHandler>(&mut self, data: &[u8], handler: &mut H) -> Result<usize> {
        let mut i = 0;

        while i < data.len() {
            if self.paused {
                break;
            }
            if self.state == State::Dead {
                return Err(Error::ClosedConnection);
            }
            if self.state == State::MessageDone {
                break;
            }

            let c = data[i];
            i += 1;
            self.step(c, data, &mut i, handler)?;

            if matches!(
                self.state,
                State::HeaderField | State::HeaderValue | State::HeaderFieldStart | State::HeaderValueStart
            ) {
                self.header_size += 1;
                if self.header_size > self.limits.max_header_size {
                    self.state = State::Dead;
                    return Err(Error::HeaderOverflow);
                }
            }
        }

        Ok(i)
    }

    fn step<H: ParserHandler>(&mut self, c: u8, data: &[u8], i: &mut usize, handler: &mut H) -> Result<()> {
        if !self.message_began
            && matches!(self.state, State::ReqMethod | State::ResHttpStart | State::StartReqOrRes)
        {
            self.message_began = true;
            handler.on_message_begin();
        }

        match self.state {
            State::StartReqOrRes => {
                if c == b'\r' || c == b'\n' {
                    // tolerate a leading CRLF between pipelined messages
                } else if c == b'H' {
                    self.state = State::StartReqOrResH;
                } else {
                    self.effective_kind = ParserType::Request;
                    self.state = State::ReqMethod;
                    self.feed_req_method_char(c, handler)?;
                }
            }
            State::StartReqOrResH => {
                if c == b'T' {
                    self.effective_kind = ParserType::Response;
                    self.lit_pos = 2;
                    self.state = State::ResHttpStart;
                } else {
                    self.effective_kind = ParserType::Request;
                    self.state = State::ReqMethod;
                    self.feed_req_method_char(b'H', handler)?;
                    if self.state == State::ReqMethod {
                        self.feed_req_method_char(c, handler)?;
                    }
                }
            }
            State::ReqMethod => {
                self.feed_req_method_char(c, handler)?;
            }
            State::ReqSpacesBeforeUrl => {
                if c != b' ' {
                    self.emit_one(c, State::ReqUrl, handler, |h, d| h.on_url(d));
                }
            }
            State::ReqUrl => {
                if c == b' ' {
                    self.state = State::ReqHttpStart;
                } else if c == b'\r' || c == b'\n' {
                    return Err(Error::InvalidUrl);
                } else {
                    self.emit_one(c, State::ReqUrl, handler, |h, d| h.on_url(d));
                }
            }
            State::ReqHttpStart => {
                if self.lit_pos == 0 && c == b' ' {
                    // tolerate extra spaces between the URL and the version token
                } else if c == HTTP_LITERAL[self.lit_pos] {
                    self.lit_pos += 1;
                    if self.lit_pos == HTTP_LITERAL.len() {
                        self.lit_pos = 0;
                        self.state = State::ReqHttpMajor;
                    }
                } else {
                    return Err(Error::InvalidVersion);
                }
            }
            State::ResHttpStart => {
                if c == HTTP_LITERAL[self.lit_pos] {
                    self.lit_pos += 1;
                    if self.lit_pos == HTTP_LITERAL.len() {
                        self.lit_pos = 0;
                        self.state = State::ResHttpMajor;
                    }
                } else {
                    return Err(Error::InvalidVersion);
                }
            }
            State::ReqHttpMajor | State::ResHttpMajor => {
                self.parse_version_major(c)?;
            }
            State::ReqHttpMinor | State::ResHttpMinor => {
                self.parse_version_minor(c)?;
            }
            State::ReqLineAlmostDone => {
                if c != b'\n' {
                    return Err(Error::LfExpected);
                }
                self.state = State::HeaderFieldStart;
            }

            State::ResStatusCodeStart => {
                if !c.is_ascii_digit() {
                    return Err(Error::InvalidStatus);
                }
                self.status_code = (c - b'0') as u16;
                self.state = State::ResStatusCode;
            }
            State::ResStatusCode => {
                if c.is_ascii_digit() {
                    self.status_code = self.status_code * 10 + (c - b'0') as u16;
                } else if c == b' ' {
                    self.state = State::ResStatusStart;
                } else if c == b'\r' {
                    self.state = State::ResLineAlmostDone;
                } else {
                    return Err(Error::InvalidStatus);
                }
            }
            State::ResStatusStart => {
                if c != b'\r' {
                    self.emit_one(c, State::ResStatus, handler, |h, d| h.on_status(d));
                } else {
                    self.state = State::ResLineAlmostDone;
                }
            }
            State::ResStatus => {
                if c == b'\r' {
                    self.state = State::ResLineAlmostDone;
                } else if c != b'\n' {
                    self.emit_one(c, State::ResStatus, handler, |h, d| h.on_status(d));
                }
            }
            State::ResLineAlmostDone => {
                if c != b'\n' {
                    return Err(Error::LfExpected);
                }
                self.state = State::HeaderFieldStart;
            }

            State::HeaderFieldStart => {
                if c == b'\r' {
                    self.state = State::HeadersAlmostDone;
                } else {
                    self.cur_field.push(c);
                    self.emit_one(c, State::HeaderField, handler, |h, d| h.on_header_field(d));
                }
            }
            State::HeaderField => {
                if c == b':' {
                    self.state = State::HeaderValueDiscardWs;
                } else if c == b'\r' {
                    self.commit_header()?;
                    self.state = State::HeaderAlmostDone;
                } else if !is_token_char(c) {
                    return Err(Error::InvalidHeaderToken);
                } else {
                    self.cur_field.push(c);
                    self.emit_one(c, State::HeaderField, handler, |h, d| h.on_header_field(d));
                }
            }
            State::HeaderValueDiscardWs => {
                if c == b' ' || c == b'\t' {
                    // stay
                } else if c == b'\r' {
                    self.commit_header()?;
                    self.state = State::HeaderAlmostDone;
                } else {
                    self.cur_value.push(c);
                    self.emit_one(c, State::HeaderValue, handler, |h, d| h.on_header_value(d));
                }
            }
            State::HeaderValueStart | State::HeaderValue => {
                if c == b'\r' {
                    self.commit_header()?;
                    self.state = State::HeaderAlmostDone;
                } else {
                    self.cur_value.push(c);
                    self.emit_one(c, State::HeaderValue, handler, |h, d| h.on_header_value(d));
                }
            }
            State::HeaderAlmostDone => {
                if c != b'\n' {
                    return Err(Error::LfExpected);
                }
                self.state = State::HeaderFieldStart;
            }
            State::HeadersAlmostDone => {
                if c != b'\n' {
                    return Err(Error::LfExpected);
                }
                self.finish_headers(handler)?;
            }

            State::BodyIdentity => {
                self.consume_identity_body(c, data, i, handler)?;
            }
            State::BodyIdentityEof => {
                if self.flags.contains(Flags::BOUNDARY) {
                    self.multipart_buf.push(c);
                } else {
                    handler.on_body(std::slice::from_ref(&c));
                }
            }

            State::ChunkSizeStart => {
                self.chunk_size = hex_digit(c).ok_or(Error::InvalidChunkSize)? as u64;
                self.state = State::ChunkSize;
            }
            State::ChunkSize => {
                if let Some(digit) = hex_digit(c) {
                    self.chunk_size = self
                        .chunk_size
                        .checked_mul(16)
                        .and_then(|v| v.checked_add(digit as u64))
                        .ok_or(Error::InvalidChunkSize)?;
                } else if c == b';' || c == b' ' {
                    self.state = State::ChunkParameters;
                } else if c == b'\r' {
                    self.state = State::ChunkSizeAlmostDone;
                } else {
                    return Err(Error::InvalidChunkSize);
                }
            }
            State::ChunkParameters => {
                if c == b'\r' {
                    self.state = State::ChunkSizeAlmostDone;
                }
            }
            State::ChunkSizeAlmostDone => {
                if c != b'\n' {
                    return Err(Error::LfExpected);
                }
                handler.on_chunk_header(self.chunk_size);
                if self.chunk_size == 0 {
                    self.flags.insert(Flags::TRAILING);
                    self.state = State::ChunkTrailerFieldStart;
                } else {
                    self.state = State::ChunkData;
                }
            }
            State::ChunkData => {
                self.consume_chunk_data(c, data, i, handler);
            }
            State::ChunkDataAlmostDone => {
                if c != b'\n' {
                    return Err(Error::LfExpected);
                }
                handler.on_chunk_complete();
                self.state = State::ChunkSizeStart;
            }

            State::ChunkTrailerFieldStart => {
                if c == b'\r' {
                    self.state = State::ChunkTrailerAlmostDone;
                } else {
                    self.state = State::ChunkTrailerField;
                }
            }
            State::ChunkTrailerField => {
                if c == b':' {
                    self.state = State::ChunkTrailerValueStart;
                } else if c == b'\r' {
                    self.state = State::ChunkTrailerAlmostDone;
                }
            }
            State::ChunkTrailerValueStart => {
                self.state = State::ChunkTrailerValue;
                if c == b'\r' {
                    self.state = State::ChunkTrailerAlmostDone;
                }
            }
            State::ChunkTrailerValue => {
                if c == b'\r' {
                    self.state = State::ChunkTrailerAlmostDone;
                }
            }
            State::ChunkTrailerAlmostDone => {
                if c != b'\n' {
                    return Err(Error::LfExpected);
                }
                self.finish_body_message(handler)?;
            }

            State::MessageDone | State::Dead => {}
        }

        Ok(())
    }

    fn parse_version_major(&mut self, c: u8) -> Result<()> {
        if c == b'.' {
            self.state = match self.effective_kind {
                ParserType::Request => State::ReqHttpMinor,
                ParserType::Response | ParserType::Both => State::ResHttpMinor,
            };
        } else if c.is_ascii_digit() {
            self.http_major = self.http_major * 10 + (c - b'0') as u16;
        } else {
            return Err(Error::InvalidVersion);
        }
        Ok(())
    }

    fn parse_version_minor(&mut self, c: u8) -> Result<()> {
        if c == b' ' && self.effective_kind == ParserType::Request {
            self.state = State::ReqLineAlmostDone;
        } else if c == b' ' && self.effective_kind != ParserType::Request {
            self.state = State::ResStatusCodeStart;
        } else if c.is_ascii_digit() {
            self.http_minor = self.http_minor * 10 + (c - b'0') as u16;
        } else {
            return Err(Error::InvalidVersion);
        }
        Ok(())
    }

    /// Handle one byte of an HTTP request method token. Shared between the plain
    /// `ParserType::Request` path and the `ParserType::Both` disambiguation path, which
    /// may need to replay a buffered `H` through the same logic.
    fn feed_req_method_char<H: ParserHandler>(&mut self, c: u8, handler: &mut H) -> Result<()> {
        if c == b' ' {
            self.state = State::ReqSpacesBeforeUrl;
        } else if !c.is_ascii_uppercase() {
            return Err(Error::InvalidMethod);
        } else {
            handler.on_method(std::slice::from_ref(&c));
        }
        Ok(())
    }

    /// Hand a single byte to `call` and transition to `next_state`. `self` and `handler`
    /// are distinct objects, so there is no borrow conflict in calling both.
    fn emit_one<H, F>(&mut self, c: u8, next_state: State, handler: &mut H, call: F)
    where
        F: FnOnce(&mut H, &[u8]),
        H: ParserHandler,
    {
        call(handler, std::slice::from_ref(&c));
        self.state = next_state;
    }

    fn finish_headers<H: ParserHandler>(&mut self, handler: &mut H) -> Result<()> {
        self.flags.insert(Flags::HEAD_DONE);

        if self.flags.contains(Flags::CHUNKED) && self.flags.contains(Flags::CONTENT_LENGTH) && !self.limits.lenient_transfer_encoding {
            self.state = State::Dead;
            return Err(Error::InvalidTransferEncoding);
        }

        let action = handler.on_headers_complete();
        if action == HeadersAction::Abort {
            self.state = State::Dead;
            return Err(Error::CallbackAbort);
        }

        // 1xx/204/304 responses never carry a body regardless of what Content-Length or
        // Transfer-Encoding claim; a HEAD response is told via `set_skip_body`.
        let status_forbids_body = self.effective_kind == ParserType::Response
            && ((100..200).contains(&self.status_code) || self.status_code == 204 || self.status_code == 304);

        let no_body = matches!(action, HeadersAction::NoBody | HeadersAction::NoBodyNoFurtherMessages)
            || self.flags.contains(Flags::SKIP_BODY)
            || self.skip_body
            || status_forbids_body;

        if no_body {
            handler.on_message_complete();
            self.state = State::MessageDone;
        } else if self.flags.contains(Flags::CHUNKED) {
            self.state = State::ChunkSizeStart;
        } else if let Some(len) = self.content_length {
            if len == 0 {
                self.finish_body_message(handler)?;
            } else {
                self.state = State::BodyIdentity;
            }
        } else if self.effective_kind == ParserType::Response {
            self.state = State::BodyIdentityEof;
        } else {
            self.finish_body_message(handler)?;
        }

        Ok(())
    }

    fn consume_identity_body<H: ParserHandler>(&mut self, c: u8, _data: &[u8], _i: &mut usize, handler: &mut H) -> Result<()> {
        if self.flags.contains(Flags::BOUNDARY) {
            self.multipart_buf.push(c);
        } else {
            handler.on_body(std::slice::from_ref(&c));
        }
        if let Some(len) = self.content_length.as_mut() {
            *len -= 1;
            if *len == 0 {
                self.finish_body_message(handler)?;
            }
        }
        Ok(())
    }

    /// Called once a message's body (if any) is fully framed — a declared
    /// `Content-Length` exhausted, a chunked body's trailer done, or the connection
    /// closing on an EOF-terminated body. When the body's `Content-Type` declared a
    /// multipart boundary, splits the buffered body into parts and fires
    /// `on_multipart_part` for each before `on_message_complete`; otherwise just
    /// finalizes the message, since plain bodies were already streamed to `on_body`
    /// byte-by-byte as they arrived.
    fn finish_body_message<H: ParserHandler>(&mut self, handler: &mut H) -> Result<()> {
        if let Some(boundary) = self.boundary.clone() {
            let buf = std::mem::take(&mut self.multipart_buf);
            let parts = multipart::split_parts(&buf, &boundary).map_err(|_| Error::InvalidMultipart)?;
            for part in &parts {
                let (name, filename) = multipart::parse_disposition(&part.headers);
                self.last_part_name = name.clone();
                self.last_part_filename = filename.clone();
                handler.on_multipart_part(name.as_deref(), filename.as_deref(), &part.headers, &part.body);
            }
        }

        handler.on_message_complete();
        self.state = State::MessageDone;
        Ok(())
    }

    fn consume_chunk_data<H: ParserHandler>(&mut self, c: u8, _data: &[u8], _i: &mut usize, handler: &mut H) {
        if self.flags.contains(Flags::BOUNDARY) {
            self.multipart_buf.push(c);
        } else {
            handler.on_body(std::slice::from_ref(&c));
        }
        self.chunk_size -= 1;
        if self.chunk_size == 0 {
            self.state = State::ChunkDataAlmostDone;
        }
    }

    /// Called internally once a header line's field and value bytes are both fully
    /// scanned, so the parser can act on `Content-Length`/`Transfer-Encoding`/
    /// `Connection` the way the original's internal header-completion hook does,
    /// independent of whatever the handler chooses to do with the same bytes.
    fn commit_header(&mut self) -> Result<()> {
        if self.cur_field.is_empty() {
            return Ok(());
        }
        let field = String::from_utf8_lossy(&self.cur_field).trim().to_string();
        let value = String::from_utf8_lossy(&self.cur_value).trim().to_string();
        self.cur_field.clear();
        self.cur_value.clear();
        self.note_header(&field, &value)
    }

    /// Apply a known header's effect on parsing state (body framing, keep-alive). Exposed
    /// publicly as well, for a handler that wants to short-circuit past the internal
    /// buffering (e.g. a proxy forwarding trailers verbatim).
    pub fn note_header(&mut self, field: &str, value: &str) -> Result<()> {
        if field.eq_ignore_ascii_case("content-length") {
            let parsed: u64 = value.trim().parse().map_err(|_| Error::InvalidContentLength)?;
            if self.flags.contains(Flags::CONTENT_LENGTH) {
                if self.content_length != Some(parsed) {
                    return Err(Error::InvalidContentLength);
                }
            } else {
                self.flags.insert(Flags::CONTENT_LENGTH);
                self.content_length = Some(parsed);
            }
        } else if field.eq_ignore_ascii_case("transfer-encoding") {
            if value.to_ascii_lowercase().contains("chunked") {
                self.flags.insert(Flags::CHUNKED);
            }
        } else if field.eq_ignore_ascii_case("connection") {
            let lower = value.to_ascii_lowercase();
            if lower.contains("keep-alive") {
                self.flags.insert(Flags::CONNECTION_KEEP_ALIVE);
            }
            if lower.contains("close") {
                self.flags.insert(Flags::CONNECTION_CLOSE);
            }
            if lower.contains("upgrade") {
                self.flags.insert(Flags::CONNECTION_UPGRADE);
                self.flags.insert(Flags::UPGRADE);
            }
        } else if field.eq_ignore_ascii_case("content-type") {
            if let Some(boundary) = extract_multipart_boundary(value) {
                self.flags.insert(Flags::BOUNDARY);
                self.boundary = Some(boundary);
            }
        }
        Ok(())
    }
}

/// Detect a `multipart/*` `Content-Type` and pull its `boundary` parameter, the way the
/// original scans the header for `boundary=` rather than fully parsing MIME parameters.
fn extract_multipart_boundary(value: &str) -> Option<String> {
    if !value.trim_start().to_ascii_lowercase().starts_with("multipart/") {
        return None;
    }

    value.split(';').skip(1).find_map(|param| {
        let param = param.trim();
        let (key, val) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("boundary") {
            let val = val.trim().trim_matches('"');
            if val.is_empty() {
                None
            } else {
                Some(val.to_string())
            }
        } else {
            None
        }
    })
}

fn is_token_char(c: u8) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~'
        )
}

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Capture {
        body: Vec<u8>,
        complete: bool,
        action: HeadersAction,
    }

    impl Default for Capture {
        fn default() -> Self {
            Capture { body: Vec::new(), complete: false, action: HeadersAction::Continue }
        }
    }

    impl ParserHandler for Capture {
        fn on_body(&mut self, data: &[u8]) {
            self.body.extend_from_slice(data);
        }

        fn on_message_complete(&mut self) {
            self.complete = true;
        }

        fn on_headers_complete(&mut self) -> HeadersAction {
            self.action
        }
    }

    #[test]
    fn test_pause_stops_consuming_input() {
        let mut parser = Parser::new(ParserType::Request);
        let mut capture = Capture::default();

        let raw = b"GET / HTTP/1.1\r\n\r\n";
        parser.pause(true);
        let consumed = parser.parse(raw, &mut capture).unwrap();
        assert_eq!(consumed, 0);
        assert!(!capture.complete);

        parser.pause(false);
        let consumed = parser.parse(raw, &mut capture).unwrap();
        assert_eq!(consumed, raw.len());
        assert!(capture.complete);
    }

    #[test]
    fn test_response_without_content_length_needs_eof() {
        let mut parser = Parser::new(ParserType::Response);
        let mut capture = Capture::default();

        let raw = b"HTTP/1.1 200 OK\r\n\r\nhello";
        parser.parse(raw, &mut capture).unwrap();

        assert!(parser.needs_eof());
        assert!(!capture.complete);
        assert_eq!(capture.body, b"hello");

        parser.eof(&mut capture).unwrap();
        assert!(capture.complete);
    }

    #[test]
    fn test_eof_mid_message_without_framing_is_error() {
        let mut parser = Parser::new(ParserType::Request);
        let mut capture = Capture::default();

        parser.parse(b"GET / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc", &mut capture).unwrap();
        assert_eq!(parser.eof(&mut capture), Err(Error::UnexpectedEof));
    }

    #[test]
    fn test_conflicting_chunked_and_content_length_rejected() {
        let mut parser = Parser::new(ParserType::Request);
        let mut capture = Capture::default();

        let raw = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\nContent-Length: 4\r\n\r\n";
        assert_eq!(parser.parse(raw, &mut capture), Err(Error::InvalidTransferEncoding));
    }

    #[test]
    fn test_conflicting_chunked_and_content_length_allowed_when_lenient() {
        let mut parser = Parser::with_limits(
            ParserType::Request,
            ParserLimits { lenient_transfer_encoding: true, ..ParserLimits::default() },
        );
        let mut capture = Capture::default();

        let raw = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\nContent-Length: 4\r\n\r\n4\r\nabcd\r\n0\r\n\r\n";
        let consumed = parser.parse(raw, &mut capture).unwrap();
        assert_eq!(consumed, raw.len());
        assert_eq!(capture.body, b"abcd");
    }

    #[test]
    fn test_headers_complete_abort_surfaces_callback_abort() {
        let mut parser = Parser::new(ParserType::Request);
        let mut capture = Capture { action: HeadersAction::Abort, ..Capture::default() };

        let raw = b"GET / HTTP/1.1\r\n\r\n";
        assert_eq!(parser.parse(raw, &mut capture), Err(Error::CallbackAbort));
    }

    #[test]
    fn test_status_204_has_no_body_regardless_of_content_length() {
        let mut parser = Parser::new(ParserType::Response);
        let mut capture = Capture::default();

        let raw = b"HTTP/1.1 204 No Content\r\nContent-Length: 5\r\n\r\nnext-msg";
        let consumed = parser.parse(raw, &mut capture).unwrap();
        assert!(capture.complete);
        assert!(capture.body.is_empty());
        assert_eq!(&raw[consumed..], b"next-msg");
    }

    #[test]
    fn test_set_skip_body_suppresses_head_response_body() {
        let mut parser = Parser::new(ParserType::Response);
        parser.set_skip_body(true);
        let mut capture = Capture::default();

        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nnext-msg";
        let consumed = parser.parse(raw, &mut capture).unwrap();
        assert!(capture.complete);
        assert!(capture.body.is_empty());
        assert_eq!(&raw[consumed..], b"next-msg");
    }

    #[test]
    fn test_both_kind_sniffs_response() {
        let mut parser = Parser::new(ParserType::Both);
        let mut capture = Capture::default();

        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi";
        parser.parse(raw, &mut capture).unwrap();
        assert!(capture.complete);
        assert_eq!(capture.body, b"hi");
        assert_eq!(parser.status_code(), 200);
    }

    #[test]
    fn test_both_kind_sniffs_plain_request() {
        let mut parser = Parser::new(ParserType::Both);
        let mut capture = Capture::default();

        let raw = b"GET /x HTTP/1.1\r\nHost: a\r\n\r\n";
        let consumed = parser.parse(raw, &mut capture).unwrap();
        assert_eq!(consumed, raw.len());
        assert!(capture.complete);
    }

    #[test]
    fn test_both_kind_sniffs_head_request() {
        // "HEAD" starts with the same byte ('H') that disambiguates a status line
        // ("HTTP/..."); the second byte ('E' vs. 'T') must tell them apart.
        let mut parser = Parser::new(ParserType::Both);
        let mut capture = Capture::default();

        let raw = b"HEAD /x HTTP/1.1\r\nHost: a\r\n\r\n";
        let consumed = parser.parse(raw, &mut capture).unwrap();
        assert_eq!(consumed, raw.len());
        assert!(capture.complete);
    }

    #[derive(Default)]
    struct MultipartCapture {
        parts: Vec<(Option<String>, Option<String>, Vec<u8>)>,
        complete: bool,
    }

    impl ParserHandler for MultipartCapture {
        fn on_multipart_part(&mut self, name: Option<&str>, filename: Option<&str>, _headers: &[(String, String)], body: &[u8]) {
            self.parts.push((name.map(String::from), filename.map(String::from), body.to_vec()));
        }

        fn on_message_complete(&mut self) {
            self.complete = true;
        }
    }

    #[test]
    fn test_multipart_content_type_is_detected_and_split_automatically() {
        let mut parser = Parser::new(ParserType::Request);
        let mut capture = MultipartCapture::default();

        let body = b"--xyz\r\nContent-Disposition: form-data; name=\"field\"\r\n\r\nvalue\r\n\
--xyz\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\r\nhi\r\n\
--xyz--\r\n";
        let mut raw = Vec::new();
        raw.extend_from_slice(b"POST /upload HTTP/1.1\r\nContent-Type: multipart/form-data; boundary=xyz\r\nContent-Length: ");
        raw.extend_from_slice(body.len().to_string().as_bytes());
        raw.extend_from_slice(b"\r\n\r\n");
        raw.extend_from_slice(body);

        let consumed = parser.parse(&raw, &mut capture).unwrap();
        assert_eq!(consumed, raw.len());
        assert!(capture.complete);
        assert_eq!(parser.boundary(), Some("xyz"));

        assert_eq!(capture.parts.len(), 2);
        assert_eq!(capture.parts[0], (Some("field".to_string()), None, b"value".to_vec()));
        assert_eq!(capture.parts[1], (Some("file".to_string()), Some("a.txt".to_string()), b"hi".to_vec()));
        assert_eq!(parser.form_name(), Some("file"));
        assert_eq!(parser.file_name(), Some("a.txt"));
    }
}
