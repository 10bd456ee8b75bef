//! Base64 encode/decode, standard alphabet with padding.

use base64::{engine::general_purpose::STANDARD, Engine as _};

pub fn encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

pub fn decode(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(text)
}
