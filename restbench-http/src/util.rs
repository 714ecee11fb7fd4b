pub(super) fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

/// Splits a `KEY:VALUE` header spec, trimming whitespace around both halves.
pub(super) fn split_header(spec: &str) -> Option<(String, String)> {
    let (name, value) = spec.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}
