// Provider output sanitization
//
// Strips active-content fragments from model output before it reaches the
// UI. Unlike validation, sanitization rewrites rather than rejects.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Fragments removed from output text, in application order
static STRIP_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?is)<script\b[^>]*>.*?</script>",
        r"(?is)<script\b[^>]*/?>",
        r"(?i)javascript:",
        r#"(?i)\bon\w+\s*=\s*"[^"]*""#,
        r"(?i)\bon\w+\s*=\s*'[^']*'",
        r"(?i)\bon\w+\s*=\s*[^\s>]+",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

#[derive(Default)]
pub struct OutputSanitizer;

impl OutputSanitizer {
    pub fn new() -> Self {
        Self
    }

    /// Sanitize a value, preserving its shape. Strings are rewritten;
    /// objects and arrays are walked recursively.
    pub fn sanitize(&self, output: &Value) -> Value {
        match output {
            Value::String(text) => Value::String(self.sanitize_text(text)),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), self.sanitize(value)))
                    .collect(),
            ),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.sanitize(v)).collect()),
            other => other.clone(),
        }
    }

    pub fn sanitize_text(&self, text: &str) -> String {
        STRIP_PATTERNS.iter().fold(text.to_string(), |acc, pattern| {
            pattern.replace_all(&acc, "").into_owned()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strips_script_tag_pair() {
        let sanitizer = OutputSanitizer::new();
        let clean = sanitizer.sanitize_text("before <script>alert(1)</script> after");
        assert_eq!(clean, "before  after");
    }

    #[test]
    fn test_strips_self_closing_script() {
        let sanitizer = OutputSanitizer::new();
        let clean = sanitizer.sanitize_text("x <script src=\"evil.js\"/> y");
        assert!(!clean.contains("script"));
    }

    #[test]
    fn test_strips_event_handlers_and_protocol() {
        let sanitizer = OutputSanitizer::new();
        assert!(!sanitizer
            .sanitize_text("<img src=x onerror=\"alert(1)\">")
            .contains("onerror"));
        assert!(!sanitizer
            .sanitize_text("<a href=\"javascript:run()\">go</a>")
            .contains("javascript:"));
    }

    #[test]
    fn test_plain_text_unchanged() {
        let sanitizer = OutputSanitizer::new();
        let text = "The agenda has 3 points. Consider adding actions.";
        assert_eq!(sanitizer.sanitize_text(text), text);
    }

    #[test]
    fn test_sanitize_preserves_shape() {
        let sanitizer = OutputSanitizer::new();
        let dirty = json!({
            "reply": "ok <script>x</script>",
            "items": ["a", "b <script>y</script>"],
            "count": 2
        });
        let clean = sanitizer.sanitize(&dirty);
        assert_eq!(clean["reply"], "ok ");
        assert_eq!(clean["items"][1], "b ");
        assert_eq!(clean["count"], 2);
    }
}
