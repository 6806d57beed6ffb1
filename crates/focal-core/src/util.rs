//! Small helpers shared by config, remote and outbox code.

use chrono::Utc;

/// Longest error message kept on an outbox entry
const MAX_ERROR_CHARS: usize = 180;

/// Trim optional text; blank input becomes `None`.
pub fn trimmed_non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn has_http_scheme(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Trim and cap an error message before it is persisted
pub fn truncate_error(message: &str) -> String {
    message.trim().chars().take(MAX_ERROR_CHARS).collect()
}

/// Current Unix timestamp in seconds.
pub fn unix_timestamp_now() -> i64 {
    Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_is_none() {
        assert_eq!(trimmed_non_empty(None), None);
        assert_eq!(trimmed_non_empty(Some(" \t ".to_string())), None);
        assert_eq!(
            trimmed_non_empty(Some("  anon-key ".to_string())),
            Some("anon-key".to_string())
        );
    }

    #[test]
    fn only_http_schemes_are_accepted() {
        assert!(has_http_scheme("http://127.0.0.1:54321"));
        assert!(has_http_scheme("https://project.supabase.co"));
        assert!(!has_http_scheme("wss://project.supabase.co"));
        assert!(!has_http_scheme("project.supabase.co"));
    }

    #[test]
    fn long_errors_are_capped() {
        let message = format!("HTTP 500: {}", "y".repeat(400));
        assert_eq!(truncate_error(&message).chars().count(), MAX_ERROR_CHARS);
        assert_eq!(truncate_error("  timeout \n"), "timeout");
    }
}
