//! SQL string helpers

/// Escape LIKE pattern metacharacters so user input matches literally.
///
/// Backslash is ClickHouse's default LIKE escape character, so no ESCAPE
/// clause is needed on the call side.
pub fn escape_like_pattern(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_like_metacharacters() {
        assert_eq!(escape_like_pattern("50%_done"), "50\\%\\_done");
        assert_eq!(escape_like_pattern("back\\slash"), "back\\\\slash");
        assert_eq!(escape_like_pattern("plain"), "plain");
    }
}
