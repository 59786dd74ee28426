// Security Manager
//
// Single entry point for the request-side and response-side security
// pipeline: rate limiting, input validation, size ceilings, output
// sanitization, API key checks, and the audit trail.

pub mod audit;
pub mod input_validator;
pub mod output_sanitizer;
pub mod rate_limiter;

use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::models::ai::{ProviderKind, RequestEnvelope};
use crate::services::ai::error::{AiError, AiResult};
use audit::AuditLogger;
use input_validator::InputValidator;
use output_sanitizer::OutputSanitizer;
use rate_limiter::{RateLimiter, RateLimits, RemainingRequests};

/// Serialized request ceiling in bytes
pub const MAX_REQUEST_BYTES: usize = 1_000_000;

/// Serialized response ceiling in bytes
pub const MAX_RESPONSE_BYTES: usize = 2_000_000;

const TRUNCATION_NOTICE: &str = "\n\n[Response truncated: size limit exceeded]";

/// Local obfuscation salt. This is NOT encryption; it only keeps keys from
/// appearing as plain text in settings files on disk.
const OBFUSCATION_SALT: &[u8] = b"meenoe-local-key-obfuscation-v1";

static OPENAI_KEY_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^sk-[A-Za-z0-9_-]{20,}$").ok());
static CLAUDE_KEY_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^sk-ant-[A-Za-z0-9_-]{20,}$").ok());
static GEMINI_KEY_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^AIza[A-Za-z0-9_-]{35}$").ok());

pub struct SecurityManager {
    rate_limiter: RateLimiter,
    validator: InputValidator,
    sanitizer: OutputSanitizer,
    audit: AuditLogger,
}

impl Default for SecurityManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityManager {
    pub fn new() -> Self {
        Self {
            rate_limiter: RateLimiter::new(RateLimits::default()),
            validator: InputValidator::new(),
            sanitizer: OutputSanitizer::new(),
            audit: AuditLogger::new(),
        }
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    pub fn remaining_requests(&self, user_id: &str) -> RemainingRequests {
        self.rate_limiter.remaining_requests(user_id)
    }

    /// Run the full request-side pipeline. Checks run in a fixed order so a
    /// rate-limited caller learns nothing about validation outcomes.
    pub fn validate_request(&self, request: &RequestEnvelope) -> AiResult<()> {
        if !self.rate_limiter.check_limit(&request.user_id) {
            return Err(AiError::RateLimitExceeded);
        }

        let validation = self.validator.validate(&request.validation_view());
        if !validation.is_valid {
            return Err(AiError::InvalidInput(validation.errors));
        }

        let serialized = serde_json::to_vec(request)?;
        if serialized.len() > MAX_REQUEST_BYTES {
            return Err(AiError::RequestTooLarge(serialized.len()));
        }

        self.audit.log_request(
            &request.request_type,
            &request.user_id,
            request.content.chars().count(),
        );
        Ok(())
    }

    /// Run the response-side pipeline: sanitize, enforce the size ceiling,
    /// and record the delivery.
    pub fn sanitize_response(&self, provider: &str, response: &Value) -> AiResult<Value> {
        let mut clean = self.sanitizer.sanitize(response);

        let serialized_len = serde_json::to_vec(&clean)?.len();
        if serialized_len > MAX_RESPONSE_BYTES {
            log::warn!("Response from {provider} exceeded {MAX_RESPONSE_BYTES} bytes, truncating");
            let text = match clean {
                Value::String(s) => s,
                other => other.to_string(),
            };
            let cut = floor_char_boundary(&text, MAX_RESPONSE_BYTES);
            clean = Value::String(format!("{}{TRUNCATION_NOTICE}", &text[..cut]));
        }

        let length = match &clean {
            Value::String(s) => s.chars().count(),
            other => other.to_string().chars().count(),
        };
        self.audit.log_response(provider, length);
        Ok(clean)
    }

    /// Check an API key against the provider's published format
    pub fn validate_api_key(&self, key: &str, provider: &ProviderKind) -> bool {
        let matches = |re: &Lazy<Option<Regex>>| {
            re.as_ref().map(|re| re.is_match(key)).unwrap_or(false)
        };
        match provider {
            ProviderKind::OpenAi => matches(&OPENAI_KEY_RE),
            ProviderKind::Claude => matches(&CLAUDE_KEY_RE),
            ProviderKind::Gemini => matches(&GEMINI_KEY_RE),
            // Local provider; any non-trivial token is accepted
            ProviderKind::Ollama => key.len() >= 8,
        }
    }

    /// Obfuscate an API key for at-rest storage. XOR with a fixed salt plus
    /// base64; reversible by design and not a substitute for encryption.
    pub fn obfuscate_api_key(&self, key: &str) -> String {
        let mixed: Vec<u8> = key
            .bytes()
            .enumerate()
            .map(|(i, b)| b ^ OBFUSCATION_SALT[i % OBFUSCATION_SALT.len()])
            .collect();
        base64::engine::general_purpose::STANDARD.encode(mixed)
    }

    /// Reverse `obfuscate_api_key`
    pub fn reveal_api_key(&self, obfuscated: &str) -> AiResult<String> {
        let mixed = base64::engine::general_purpose::STANDARD
            .decode(obfuscated)
            .map_err(|e| AiError::InvalidConfig(format!("malformed stored key: {e}")))?;
        let bytes: Vec<u8> = mixed
            .iter()
            .enumerate()
            .map(|(i, b)| b ^ OBFUSCATION_SALT[i % OBFUSCATION_SALT.len()])
            .collect();
        String::from_utf8(bytes)
            .map_err(|e| AiError::InvalidConfig(format!("malformed stored key: {e}")))
    }
}

/// Largest byte index <= `max` that falls on a char boundary
fn floor_char_boundary(text: &str, max: usize) -> usize {
    if text.len() <= max {
        return text.len();
    }
    let mut cut = max;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(content: &str) -> RequestEnvelope {
        RequestEnvelope::new("chat", content, "user-1", None)
    }

    #[test]
    fn test_valid_request_passes_and_is_audited() {
        let security = SecurityManager::new();
        assert!(security.validate_request(&envelope("hello")).is_ok());
        let logs = security.audit().get_logs(Some(audit::AuditKind::Request), None);
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].metadata["contentLength"], 5);
    }

    #[test]
    fn test_script_injection_rejected_end_to_end() {
        let security = SecurityManager::new();
        let err = security
            .validate_request(&envelope("<script>alert(1)</script>"))
            .unwrap_err();
        assert!(matches!(err, AiError::InvalidInput(_)));
    }

    #[test]
    fn test_rate_limit_precedes_validation() {
        let security = SecurityManager::new();
        for _ in 0..20 {
            let _ = security.validate_request(&envelope("ok"));
        }
        // Invalid content, but the rate limit answers first
        let err = security
            .validate_request(&envelope("<script>x</script>"))
            .unwrap_err();
        assert!(matches!(err, AiError::RateLimitExceeded));
    }

    #[test]
    fn test_oversized_request_rejected() {
        let security = SecurityManager::new();
        // Arrays pass validation untouched, so the size ceiling is what trips
        let big_context = json!({ "numbers": vec![1_234_567u64; 150_000] });
        let request = RequestEnvelope::new("chat", "hello", "user-1", Some(big_context));
        let err = security.validate_request(&request).unwrap_err();
        assert!(matches!(err, AiError::RequestTooLarge(_)));
    }

    #[test]
    fn test_sanitize_response_strips_and_audits() {
        let security = SecurityManager::new();
        let clean = security
            .sanitize_response("openai", &json!("fine <script>bad</script>"))
            .unwrap();
        assert_eq!(clean, json!("fine "));
        let logs = security.audit().get_logs(Some(audit::AuditKind::Response), None);
        assert_eq!(logs.len(), 1);
    }

    #[test]
    fn test_oversized_response_truncated_with_notice() {
        let security = SecurityManager::new();
        let huge = "a".repeat(MAX_RESPONSE_BYTES + 100);
        let clean = security.sanitize_response("openai", &json!(huge)).unwrap();
        let text = clean.as_str().unwrap();
        assert!(text.ends_with(TRUNCATION_NOTICE));
        assert!(text.len() <= MAX_RESPONSE_BYTES + TRUNCATION_NOTICE.len());
    }

    #[test]
    fn test_api_key_formats() {
        let security = SecurityManager::new();
        assert!(security.validate_api_key(
            "sk-abcdefghijklmnopqrstuv",
            &ProviderKind::OpenAi
        ));
        assert!(!security.validate_api_key("sk-short", &ProviderKind::OpenAi));

        assert!(security.validate_api_key(
            "sk-ant-REDACTED",
            &ProviderKind::Claude
        ));
        // An OpenAI-shaped key must not pass as a Claude key
        assert!(!security.validate_api_key(
            "sk-abcdefghijklmnopqrstuv",
            &ProviderKind::Claude
        ));

        let gemini_key = format!("AIza{}", "x".repeat(35));
        assert!(security.validate_api_key(&gemini_key, &ProviderKind::Gemini));

        assert!(security.validate_api_key("local-token", &ProviderKind::Ollama));
        assert!(!security.validate_api_key("short", &ProviderKind::Ollama));
    }

    #[test]
    fn test_obfuscation_round_trip() {
        let security = SecurityManager::new();
        let key = "sk-abcdefghijklmnopqrstuv";
        let stored = security.obfuscate_api_key(key);
        assert_ne!(stored, key);
        assert!(!stored.contains("sk-"));
        assert_eq!(security.reveal_api_key(&stored).unwrap(), key);
    }

    #[test]
    fn test_reveal_rejects_garbage() {
        let security = SecurityManager::new();
        assert!(security.reveal_api_key("not base64 !!!").is_err());
    }
}
