// Request input validation
//
// Structural checks on user-supplied content before it reaches a provider:
// length ceilings plus a deny-list of script-injection patterns.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Maximum characters allowed in any single string field
pub const MAX_CONTENT_LENGTH: usize = 10_000;

/// Injection patterns rejected outright, with the error text reported
static DANGEROUS_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?is)<script\b", "script tag"),
        (r"(?i)javascript:", "javascript protocol"),
        (r"(?i)\bon\w+\s*=", "inline event handler"),
        (r"(?i)data:text/html", "html data url"),
    ]
    .iter()
    .filter_map(|(pattern, label)| Regex::new(pattern).ok().map(|re| (re, *label)))
    .collect()
});

/// Outcome of validating one input value
#[derive(Debug, Clone)]
pub struct Validation {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

pub struct InputValidator {
    max_length: usize,
}

impl Default for InputValidator {
    fn default() -> Self {
        Self {
            max_length: MAX_CONTENT_LENGTH,
        }
    }
}

impl InputValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate an input value. Strings are checked directly; objects are
    /// walked recursively with property-prefixed errors. Other shapes
    /// (numbers, booleans, arrays, null) pass unchanged.
    pub fn validate(&self, input: &Value) -> Validation {
        let mut errors = Vec::new();
        self.collect_errors(input, "", &mut errors);
        Validation {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    fn collect_errors(&self, input: &Value, path: &str, errors: &mut Vec<String>) {
        match input {
            Value::String(text) => {
                if text.chars().count() > self.max_length {
                    errors.push(prefixed(path, format!(
                        "content exceeds maximum length of {} characters",
                        self.max_length
                    )));
                }
                for (pattern, label) in DANGEROUS_PATTERNS.iter() {
                    if pattern.is_match(text) {
                        errors.push(prefixed(path, format!("contains disallowed {label}")));
                    }
                }
            }
            Value::Object(map) => {
                for (key, value) in map {
                    let child = if path.is_empty() {
                        key.clone()
                    } else {
                        format!("{path}.{key}")
                    };
                    self.collect_errors(value, &child, errors);
                }
            }
            _ => {}
        }
    }
}

fn prefixed(path: &str, message: String) -> String {
    if path.is_empty() {
        message
    } else {
        format!("{path}: {message}")
    }
}
