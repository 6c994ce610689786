/// Returns the index of the first occurrence of `needle` in `haystack`.
pub fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Splits `haystack` on every occurrence of `needle`, returning the pieces
/// between occurrences (excluding the needle itself).
pub fn split_on<'a>(haystack: &'a [u8], needle: &[u8]) -> Vec<&'a [u8]> {
    let mut result = Vec::new();
    let mut start = 0;
    while start <= haystack.len() {
        if let Some(pos) = find_subsequence(&haystack[start..], needle) {
            result.push(&haystack[start..start + pos]);
            start += pos + needle.len();
        } else {
            result.push(&haystack[start..]);
            break;
        }
    }
    result
}

/// Extracts the boundary token from a Content-Type header value like
/// `multipart/form-data; boundary=----WebKitFormBoundaryXXX`.
pub fn extract_boundary(content_type: &str) -> Option<String> {
    if !content_type.trim_start().starts_with("multipart/form-data") {
        return None;
    }
    content_type
        .split(';')
        .map(|s| s.trim())
        .find(|s| s.starts_with("boundary="))
        .map(|s| s["boundary=".len()..].trim_matches('"').to_owned())
        .filter(|b| !b.is_empty())
}

/// Extracts the raw bytes of a named file part from a multipart/form-data body.
///
/// Matches on the `name="<field_name>"` attribute of a part that also carries
/// a `filename`, so plain text fields with the same name are ignored.
pub fn multipart_extract_file_by_name(body: &[u8], boundary: &str, field_name: &str) -> Option<Vec<u8>> {
    let delimiter = format!("--{}", boundary);
    let wanted = format!("name=\"{}\"", field_name);

    for part in split_on(body, delimiter.as_bytes()) {
        let sep = b"\r\n\r\n";
        if let Some(sep_pos) = find_subsequence(part, sep) {
            let headers_str = String::from_utf8_lossy(&part[..sep_pos]);
            // `filename="…"` also contains `name="…"`; match the field on a word boundary.
            let has_name = headers_str
                .match_indices(&wanted)
                .any(|(i, _)| i == 0 || !headers_str.as_bytes()[i - 1].is_ascii_alphanumeric());
            let has_filename = headers_str.contains("filename=");
            if has_name && has_filename {
                let raw = &part[sep_pos + sep.len()..];
                let trimmed = raw.strip_suffix(b"\r\n").unwrap_or(raw);
                return Some(trimmed.to_vec());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body() -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(b"--XyZ\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n");
        b.extend_from_slice(
            b"--XyZ\r\nContent-Disposition: form-data; name=\"other\"; filename=\"image\"\r\n\r\nnope\r\n",
        );
        b.extend_from_slice(
            b"--XyZ\r\nContent-Disposition: form-data; name=\"image\"; filename=\"d.png\"\r\n\
              Content-Type: image/png\r\n\r\n\x89PNG\r\n\x00\xff\r\n",
        );
        b.extend_from_slice(b"--XyZ--\r\n");
        b
    }

    #[test]
    fn boundary_from_content_type() {
        assert_eq!(
            extract_boundary("multipart/form-data; boundary=\"XyZ\""),
            Some("XyZ".to_owned())
        );
        assert_eq!(extract_boundary("application/json"), None);
        assert_eq!(extract_boundary("multipart/form-data"), None);
    }

    #[test]
    fn extracts_named_file_with_binary_content() {
        let file = multipart_extract_file_by_name(&body(), "XyZ", "image").unwrap();
        assert_eq!(file, b"\x89PNG\r\n\x00\xff");
    }

    #[test]
    fn text_fields_and_unknown_names_are_ignored() {
        assert_eq!(multipart_extract_file_by_name(&body(), "XyZ", "note"), None);
        assert_eq!(multipart_extract_file_by_name(&body(), "XyZ", "missing"), None);
    }

    #[test]
    fn split_keeps_empty_pieces() {
        assert_eq!(split_on(b"a--b--", b"--"), vec![&b"a"[..], &b"b"[..], &b""[..]]);
    }
}
