//! Decision-document extraction from raw model output.
//!
//! Even with JSON response mode requested, models wrap output in fences or
//! prose often enough that the driver always extracts the first balanced
//! `{...}` substring and parses that.

/// Return the first balanced top-level JSON object in the text, if any.
///
/// Braces inside string literals are ignored (quote toggling + backslash
/// escapes), same discipline as the host frame scanner.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let bytes = raw.as_bytes();
    let start = bytes.iter().position(|&b| b == b'{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
