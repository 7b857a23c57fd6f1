//! Shared utility functions

/// Truncate a string to at most `max_bytes` without splitting a UTF-8 character.
///
/// Used to cap stored error messages; a stack trace pasted into
/// `error_message` should not bloat the event table.
///
/// ```
/// use skilltrace::util::truncate_utf8_safe;
///
/// assert_eq!(truncate_utf8_safe("connection refused", 10), "connection");
///
/// // "é" is two bytes, cutting at 1 backs off to the boundary before it
/// assert_eq!(truncate_utf8_safe("é", 1), "");
/// ```
pub fn truncate_utf8_safe(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Render `part / total` as a percentage with two decimals ("87.50").
///
/// An empty denominator yields "0.00" instead of NaN.
pub fn percentage(part: i64, total: i64) -> String {
    if total <= 0 {
        return "0.00".to_string();
    }
    format!("{:.2}", part as f64 / total as f64 * 100.0)
}

/// Last path segment of a type name, generics stripped
///
/// `std::io::Error` → `Error`, `my_crate::SkillError` → `SkillError`,
/// `Vec<u8>` → `Vec`.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
