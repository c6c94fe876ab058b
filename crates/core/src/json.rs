//! JSON text parsing for deeply nested documents.
//!
//! serde_json stops at 128 levels of nesting by default, which a condition
//! tree reaches after roughly 60 groups. Documents that carry condition trees
//! are parsed here instead: nesting is measured up front and capped at
//! [`MAX_JSON_NESTING`], then the parser runs without its own limit.

use serde::de::{DeserializeOwned, Error as _};

/// Deepest array/object nesting accepted by [`from_str`]. Sized for a
/// maximum-depth condition tree (two JSON levels per group) inside a request
/// envelope or rule document.
pub const MAX_JSON_NESTING: usize = 1_100;

/// Deepest array/object nesting in `text`, ignoring brackets inside strings.
pub fn nesting_depth(text: &str) -> usize {
    let mut depth = 0usize;
    let mut max = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for byte in text.bytes() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' | b'[' => {
                depth += 1;
                max = max.max(depth);
            }
            b'}' | b']' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    max
}

/// Parse `text` with the nesting cap instead of serde_json's default limit.
pub fn from_str<T: DeserializeOwned>(text: &str) -> Result<T, serde_json::Error> {
    let depth = nesting_depth(text);
    if depth > MAX_JSON_NESTING {
        return Err(serde_json::Error::custom(format!(
            "document nests {} levels, more than the {} allowed",
            depth, MAX_JSON_NESTING
        )));
    }
    let mut deserializer = serde_json::Deserializer::from_str(text);
    deserializer.disable_recursion_limit();
    let value = T::deserialize(&mut deserializer)?;
    deserializer.end()?;
    Ok(value)
}

/// [`from_str`] for raw request bodies.
pub fn from_slice<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, serde_json::Error> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| serde_json::Error::custom(format!("body is not UTF-8: {}", e)))?;
    from_str(text)
}
