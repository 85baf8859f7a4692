//! Query directives embedded in agent replies.
//!
//! A directive is the literal marker followed by a single-line statement,
//! e.g. `QUERY DB:SELECT COUNT(*) FROM GPS`. Detection is a case-sensitive
//! substring match; only the first marker counts.

pub const QUERY_MARKER: &str = "QUERY DB:";

/// Statement carried by the first directive in `reply`, if any.
///
/// Whitespace between the marker and the statement is skipped, then the
/// statement runs to the end of that line. Surrounding backticks are
/// removed. A marker with nothing after it yields an empty statement.
pub fn extract_directive(reply: &str) -> Option<String> {
    let start = reply.find(QUERY_MARKER)? + QUERY_MARKER.len();
    let rest = reply[start..].trim_start();
    let line = rest.lines().next().unwrap_or("");
    Some(line.trim().trim_matches('`').trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_marker() {
        assert_eq!(extract_directive("The max altitude was 12 m."), None);
        assert_eq!(extract_directive("query db: SELECT 1"), None);
    }

    #[test]
    fn test_statement_is_first_line_only() {
        let reply = "Let me check.\nQUERY DB:SELECT MAX(alt) FROM ALT\nThen I will answer.";
        assert_eq!(
            extract_directive(reply).as_deref(),
            Some("SELECT MAX(alt) FROM ALT")
        );
    }

    #[test]
    fn test_leading_whitespace_and_backticks() {
        assert_eq!(
            extract_directive("QUERY DB:  `SELECT fix FROM GPS`  ").as_deref(),
            Some("SELECT fix FROM GPS")
        );
        assert_eq!(
            extract_directive("QUERY DB:\n SELECT 1\nmore").as_deref(),
            Some("SELECT 1")
        );
    }

    #[test]
    fn test_empty_statement() {
        assert_eq!(extract_directive("QUERY DB:").as_deref(), Some(""));
        assert_eq!(extract_directive("QUERY DB: ``").as_deref(), Some(""));
    }

    #[test]
    fn test_first_marker_wins() {
        let reply = "QUERY DB:SELECT 1\nQUERY DB:SELECT 2";
        assert_eq!(extract_directive(reply).as_deref(), Some("SELECT 1"));
    }
}
