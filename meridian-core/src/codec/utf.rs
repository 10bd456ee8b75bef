//! Character-set conversion (`encoding_rs`) and URL percent-encoding
//! (`percent-encoding`) — both published-reference, trivial-interface codecs per
//! spec.md §1.

use encoding_rs::Encoding;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

/// Reserved/unsafe characters for the path+query component of a URL, per RFC 3986
/// `pchar`/`query` minus the subset HTTP clients leave unescaped in practice.
const URL_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'?')
    .add(b'{')
    .add(b'}')
    .add(b'%');

pub fn url_encode(data: &[u8]) -> String {
    percent_encoding::percent_encode(data, URL_ENCODE_SET).to_string()
}

pub fn url_decode(text: &str) -> Vec<u8> {
    percent_decode_str(text).collect()
}

/// Percent-encode (and decode) straight UTF-8 text, for the common case where the
/// input is already a valid `str` rather than arbitrary bytes.
pub fn url_encode_str(text: &str) -> String {
    utf8_percent_encode(text, URL_ENCODE_SET).to_string()
}

/// Decode `bytes` from `label` (e.g. `"gbk"`, `"shift_jis"`) into UTF-8, replacing
/// malformed sequences per the WHATWG Encoding Standard's replacement-character rule.
pub fn decode_to_utf8(label: &str, bytes: &[u8]) -> Option<String> {
    let encoding = Encoding::for_label(label.as_bytes())?;
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        None
    } else {
        Some(text.into_owned())
    }
}

/// Encode UTF-8 `text` into the charset named by `label`.
pub fn encode_from_utf8(label: &str, text: &str) -> Option<Vec<u8>> {
    let encoding = Encoding::for_label(label.as_bytes())?;
    let (bytes, _, had_errors) = encoding.encode(text);
    if had_errors {
        None
    } else {
        Some(bytes.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_roundtrip_is_identity_for_arbitrary_bytes() {
        let samples: &[&[u8]] = &[
            b"",
            b"hello world",
            b"a=1&b=2",
            "\u{1F980}caf\u{e9}".as_bytes(),
            &[0x00, 0x01, 0xff, 0x7f],
        ];

        for sample in samples {
            let encoded = url_encode(sample);
            assert_eq!(url_decode(&encoded), *sample);
        }
    }

    #[test]
    fn test_url_encode_escapes_reserved_characters() {
        let encoded = url_encode_str("a b?c#d");
        assert!(!encoded.contains(' '));
        assert!(!encoded.contains('?'));
        assert!(!encoded.contains('#'));
        assert_eq!(url_decode(&encoded), b"a b?c#d");
    }

    #[test]
    fn test_gbk_roundtrip() {
        let original = "\u{4f60}\u{597d}";
        let encoded = encode_from_utf8("gbk", original).unwrap();
        let decoded = decode_to_utf8("gbk", &encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_unknown_label_returns_none() {
        assert!(decode_to_utf8("not-a-real-charset", b"abc").is_none());
    }
}
