//! `multipart/form-data` boundary splitter. Separate from the main byte parser the same
//! way the original keeps boundary matching as its own small state machine rather than
//! folding it into the general body-reading states.

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Part {
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[derive(Debug, Eq, PartialEq)]
pub enum MultipartError {
    MissingBoundary,
    MalformedPart,
}

/// Split a complete `multipart/form-data` body into its parts given the boundary token
/// from the `Content-Type` header (without the leading `--`).
pub fn split_parts(body: &[u8], boundary: &str) -> Result<Vec<Part>, MultipartError> {
    if boundary.is_empty() {
        return Err(MultipartError::MissingBoundary);
    }

    let delimiter = format!("--{}", boundary);
    let delimiter = delimiter.as_bytes();

    let mut parts = Vec::new();
    let mut search_from = 0usize;

    let first = match find(body, delimiter, search_from) {
        Some(pos) => pos,
        None => return Err(MultipartError::MissingBoundary),
    };
    search_from = first + delimiter.len();

    loop {
        if search_from >= body.len() {
            break;
        }
        if body[search_from..].starts_with(b"--") {
            break;
        }
        let section_start = skip_crlf(body, search_from);

        let next = match find(body, delimiter, section_start) {
            Some(pos) => pos,
            None => return Err(MultipartError::MalformedPart),
        };

        let section_end = trim_trailing_crlf(body, section_start, next);
        let part = parse_part(&body[section_start..section_end])?;
        parts.push(part);

        search_from = next + delimiter.len();
    }

    Ok(parts)
}

/// Pull `name`/`filename` out of a part's `Content-Disposition: form-data; name="..."`
/// header — the two parameters `http::parser`'s automatic multipart detection surfaces
/// back to the caller per part.
pub fn parse_disposition(headers: &[(String, String)]) -> (Option<String>, Option<String>) {
    let disposition = headers
        .iter()
        .find(|(field, _)| field.eq_ignore_ascii_case("content-disposition"))
        .map(|(_, value)| value.as_str());

    let disposition = match disposition {
        Some(d) => d,
        None => return (None, None),
    };

    (find_param(disposition, "name"), find_param(disposition, "filename"))
}

fn find_param(value: &str, key: &str) -> Option<String> {
    value.split(';').skip(1).find_map(|param| {
        let param = param.trim();
        let (k, v) = param.split_once('=')?;
        if k.trim().eq_ignore_ascii_case(key) {
            Some(v.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

fn parse_part(section: &[u8]) -> Result<Part, MultipartError> {
    let header_end = find(section, b"\r\n\r\n", 0).ok_or(MultipartError::MalformedPart)?;
    let header_block = &section[..header_end];
    let body = section[header_end + 4..].to_vec();

    let mut headers = Vec::new();
    for line in header_block.split(|&b| b == b'\n') {
        let line = strip_cr(line);
        if line.is_empty() {
            continue;
        }
        let colon = line.iter().position(|&b| b == b':').ok_or(MultipartError::MalformedPart)?;
        let field = String::from_utf8_lossy(&line[..colon]).trim().to_string();
        let value = String::from_utf8_lossy(&line[colon + 1..]).trim().to_string();
        headers.push((field, value));
    }

    Ok(Part { headers, body })
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..].windows(needle.len()).position(|w| w == needle).map(|p| p + from)
}

fn skip_crlf(data: &[u8], pos: usize) -> usize {
    if data[pos..].starts_with(b"\r\n") {
        pos + 2
    } else if data.get(pos) == Some(&b'\n') {
        pos + 1
    } else {
        pos
    }
}

fn trim_trailing_crlf(data: &[u8], start: usize, end: usize) -> usize {
    if end >= start + 2 && &data[end - 2..end] == b"\r\n" {
        end - 2
    } else if end >= start + 1 && data[end - 1] == b'\n' {
        end - 1
    } else {
        end
    }
}

fn strip_cr(line: &[u8]) -> &[u8] {
    if line.last() == Some(&b'\r') {
        &line[..line.len() - 1]
    } else {
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_two_parts() {
        let body = b"--boundary\r\n\
Content-Disposition: form-data; name=\"field1\"\r\n\
\r\n\
value1\r\n\
--boundary\r\n\
Content-Disposition: form-data; name=\"field2\"\r\n\
\r\n\
value2\r\n\
--boundary--\r\n";

        let parts = split_parts(body, "boundary").unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].body, b"value1");
        assert_eq!(parts[1].body, b"value2");
        assert_eq!(parts[0].headers[0].0, "Content-Disposition");
    }

    #[test]
    fn test_missing_boundary_errors() {
        let result = split_parts(b"no boundary here", "boundary");
        assert_eq!(result, Err(MultipartError::MissingBoundary));
    }

    #[test]
    fn test_empty_boundary_token_rejected() {
        let result = split_parts(b"--\r\n", "");
        assert_eq!(result, Err(MultipartError::MissingBoundary));
    }

    #[test]
    fn test_parse_disposition_extracts_name_and_filename() {
        let headers = vec![(
            "Content-Disposition".to_string(),
            "form-data; name=\"avatar\"; filename=\"pic.png\"".to_string(),
        )];
        let (name, filename) = parse_disposition(&headers);
        assert_eq!(name.as_deref(), Some("avatar"));
        assert_eq!(filename.as_deref(), Some("pic.png"));
    }

    #[test]
    fn test_parse_disposition_missing_header_returns_none() {
        let (name, filename) = parse_disposition(&[]);
        assert_eq!(name, None);
        assert_eq!(filename, None);
    }
}
