use criterion::{black_box, criterion_group, criterion_main, Criterion};
use meridian_core::http::{Parser, ParserHandler, ParserType};

struct NullHandler;
impl ParserHandler for NullHandler {}

const SMALL_REQUEST: &[u8] =
    b"GET /api/v1/widgets?page=2 HTTP/1.1\r\nHost: example.com\r\nAccept: */*\r\nConnection: keep-alive\r\n\r\n";

fn chunked_request(chunks: usize) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"POST /upload HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n");
    for _ in 0..chunks {
        out.extend_from_slice(b"1a\r\nabcdefghijklmnopqrstuvwxyz\r\n");
    }
    out.extend_from_slice(b"0\r\n\r\n");
    out
}

fn bench_small_request_parse(c: &mut Criterion) {
    c.bench_function("http_parse_small_request", |b| {
        b.iter(|| {
            let mut parser = Parser::new(ParserType::Request);
            let mut handler = NullHandler;
            black_box(parser.parse(SMALL_REQUEST, &mut handler).unwrap());
        });
    });
}

fn bench_chunked_body_parse(c: &mut Criterion) {
    let body = chunked_request(256);

    c.bench_function("http_parse_chunked_256", |b| {
        b.iter(|| {
            let mut parser = Parser::new(ParserType::Request);
            let mut handler = NullHandler;
            black_box(parser.parse(&body, &mut handler).unwrap());
        });
    });
}

criterion_group!(benches, bench_small_request_parse, bench_chunked_body_parse);
criterion_main!(benches);
