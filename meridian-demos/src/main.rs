//! Example drivers for `meridian-core`: a loopback reliable-datagram echo and a small
//! HTTP request parse, selected by subcommand. Mirrors the upstream library's own
//! client/server example pair, generalized from its game-specific payloads.

use clap::{Parser as ClapParser, Subcommand};
use meridian_core::http::{Parser as HttpParser, ParserHandler, ParserType};
use meridian_core::protocol::{Session, SessionConfig};
use slog::{info, o, Drain, Logger};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

#[derive(ClapParser)]
#[command(name = "meridian-demo", about = "meridian-core example drivers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Two in-process `Session`s exchanging a message over a lossy loopback "wire".
    Echo {
        #[arg(long, default_value = "hello from the reliable datagram demo")]
        message: String,
        #[arg(long, default_value_t = 0)]
        drop_every: u32,
    },
    /// Parse a canned HTTP request and print what the callbacks captured.
    HttpParse,
}

fn build_logger() -> Logger {
    use sloggers::terminal::{Destination, TerminalLoggerBuilder};
    use sloggers::types::Severity;
    use sloggers::Build;

    let mut builder = TerminalLoggerBuilder::new();
    builder.level(Severity::Info);
    builder.destination(Destination::Stderr);
    builder.build().unwrap_or_else(|_| Logger::root(slog::Discard, o!()))
}

/// A lossy, shared-queue "wire" standing in for a pair of UDP sockets: each side's
/// `send` callback pushes into the other side's inbox, optionally dropping a packet.
struct Wire {
    inbox: Rc<RefCell<VecDeque<Vec<u8>>>>,
    drop_every: u32,
    sent: u32,
}

fn run_echo(message: &str, drop_every: u32, logger: &Logger) {
    let mut cfg = SessionConfig::fastest();
    cfg.dead_link = 40;

    let mut a = Session::with_logger(1, &cfg, logger.new(o!("side" => "a")));
    let mut b = Session::with_logger(1, &cfg, logger.new(o!("side" => "b")));

    let a_to_b = Rc::new(RefCell::new(VecDeque::new()));
    let b_to_a = Rc::new(RefCell::new(VecDeque::new()));

    let mut wire_a = Wire { inbox: a_to_b.clone(), drop_every, sent: 0 };
    let mut wire_b = Wire { inbox: b_to_a.clone(), drop_every, sent: 0 };

    a.send(message.as_bytes()).expect("message fits within fragment limit");
    info!(logger, "queued message for delivery"; "bytes" => message.len());

    let mut now = 0u32;
    let mut received = Vec::new();

    while received.is_empty() && now < 5_000 {
        now += 10;

        a.update(now, &mut |bytes| {
            wire_a.sent += 1;
            if wire_a.drop_every == 0 || wire_a.sent % wire_a.drop_every != 0 {
                wire_a.inbox.borrow_mut().push_back(bytes.to_vec());
            }
            Ok(())
        })
        .unwrap();

        b.update(now, &mut |bytes| {
            wire_b.sent += 1;
            if wire_b.drop_every == 0 || wire_b.sent % wire_b.drop_every != 0 {
                wire_b.inbox.borrow_mut().push_back(bytes.to_vec());
            }
            Ok(())
        })
        .unwrap();

        while let Some(packet) = b_to_a.borrow_mut().pop_front() {
            a.input(&packet).ok();
        }
        while let Some(packet) = a_to_b.borrow_mut().pop_front() {
            b.input(&packet).ok();
        }

        let mut buf = [0u8; 512];
        if let Ok(len) = b.recv(&mut buf) {
            received.extend_from_slice(&buf[..len]);
        }
    }

    info!(logger, "loopback finished"; "elapsed_ms" => now, "received" => String::from_utf8_lossy(&received).to_string());
    println!("received after {} ms: {:?}", now, String::from_utf8_lossy(&received));
}

struct PrintingHandler;

impl ParserHandler for PrintingHandler {
    fn on_method(&mut self, data: &[u8]) {
        println!("method: {}", String::from_utf8_lossy(data));
    }

    fn on_url(&mut self, data: &[u8]) {
        println!("url: {}", String::from_utf8_lossy(data));
    }

    fn on_header_field(&mut self, data: &[u8]) {
        print!("header {} = ", String::from_utf8_lossy(data));
    }

    fn on_header_value(&mut self, data: &[u8]) {
        println!("{}", String::from_utf8_lossy(data));
    }

    fn on_body(&mut self, data: &[u8]) {
        println!("body chunk: {} bytes", data.len());
    }

    fn on_message_complete(&mut self) {
        println!("message complete");
    }
}

fn run_http_parse(logger: &Logger) {
    let raw = b"POST /widgets HTTP/1.1\r\nHost: example.com\r\nContent-Length: 11\r\n\r\nhello world";
    let mut parser = HttpParser::new(ParserType::Request);
    let mut handler = PrintingHandler;

    let consumed = parser.parse(raw, &mut handler).expect("well-formed request parses cleanly");
    info!(logger, "parsed request"; "consumed" => consumed, "total" => raw.len());
}

fn main() {
    let cli = Cli::parse();
    let logger = build_logger();

    match cli.command {
        Command::Echo { message, drop_every } => run_echo(&message, drop_every, &logger),
        Command::HttpParse => run_http_parse(&logger),
    }
}
