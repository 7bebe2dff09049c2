/// True when `text` is made only of ASCII digits, whitespace and decimal
/// points. Empty strings are not numeric.
pub fn is_numeric(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|ch| ch.is_ascii_digit() || ch.is_whitespace() || ch == '.')
}

/// Parses a numeric field the way it is written back into annotations.
/// Returns `None` for strings that classify as numeric but are not a number
/// (`"1.2.3"`, `"."`, `"1 000"`).
pub fn parse_numeric(text: &str) -> Option<f64> {
    if !is_numeric(text) {
        return None;
    }
    text.trim().parse::<f64>().ok()
}
