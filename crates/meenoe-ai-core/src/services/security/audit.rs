// In-memory audit trail
//
// Bounded ring of request/response/error entries. Oldest entries are
// dropped first; nothing is persisted.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::services::ai::error::AiError;

/// Maximum entries retained before the oldest are evicted
pub const MAX_AUDIT_ENTRIES: usize = 1_000;

/// Default number of entries returned by a query
pub const DEFAULT_QUERY_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Request,
    Response,
    Error,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::Request => "request",
            AuditKind::Response => "response",
            AuditKind::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub kind: AuditKind,
    pub timestamp: DateTime<Utc>,
    pub metadata: Value,
}

pub struct AuditLogger {
    max_logs: usize,
    logs: Mutex<VecDeque<AuditEntry>>,
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::with_capacity(MAX_AUDIT_ENTRIES)
    }
}

impl AuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(max_logs: usize) -> Self {
        Self {
            max_logs,
            logs: Mutex::new(VecDeque::new()),
        }
    }

    fn push(&self, kind: AuditKind, metadata: Value) {
        let mut logs = match self.logs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        logs.push_back(AuditEntry {
            kind,
            timestamp: Utc::now(),
            metadata,
        });
        while logs.len() > self.max_logs {
            logs.pop_front();
        }
    }

    /// Record an accepted request; metadata only, never the full content
    pub fn log_request(&self, request_type: &str, user_id: &str, content_length: usize) {
        self.push(
            AuditKind::Request,
            json!({
                "type": request_type,
                "userId": user_id,
                "contentLength": content_length,
            }),
        );
    }

    pub fn log_response(&self, provider: &str, response_length: usize) {
        self.push(
            AuditKind::Response,
            json!({
                "provider": provider,
                "responseLength": response_length,
            }),
        );
    }

    pub fn log_error(&self, error: &AiError, context: &str) {
        log::error!("AI pipeline error in {context}: {error}");
        self.push(
            AuditKind::Error,
            json!({
                "code": error.code().as_str(),
                "message": error.to_string(),
                "context": context,
            }),
        );
    }

    /// Newest-last slice of the trail, optionally filtered by kind
    pub fn get_logs(&self, kind: Option<AuditKind>, limit: Option<usize>) -> Vec<AuditEntry> {
        let logs = match self.logs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let limit = limit.unwrap_or(DEFAULT_QUERY_LIMIT);
        let filtered: Vec<AuditEntry> = logs
            .iter()
            .filter(|entry| kind.map_or(true, |k| entry.kind == k))
            .cloned()
            .collect();
        let skip = filtered.len().saturating_sub(limit);
        filtered.into_iter().skip(skip).collect()
    }

    /// Export the entire trail with summary counts
    pub fn export_logs(&self) -> Value {
        let logs = match self.logs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let count_of = |kind: AuditKind| logs.iter().filter(|e| e.kind == kind).count();
        json!({
            "exportedAt": Utc::now(),
            "totalEntries": logs.len(),
            "requestCount": count_of(AuditKind::Request),
            "responseCount": count_of(AuditKind::Response),
            "errorCount": count_of(AuditKind::Error),
            "entries": logs.iter().collect::<Vec<_>>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oldest_entries_evicted_first() {
        let logger = AuditLogger::new();
        for i in 0..1_001 {
            logger.log_request("chat", &format!("user-{i}"), 10);
        }
        let logs = logger.get_logs(None, Some(2_000));
        assert_eq!(logs.len(), MAX_AUDIT_ENTRIES);
        // Entry 0 was evicted; the ring starts at user-1
        assert_eq!(logs[0].metadata["userId"], "user-1");
        assert_eq!(logs.last().unwrap().metadata["userId"], "user-1000");
    }

    #[test]
    fn test_filter_by_kind() {
        let logger = AuditLogger::new();
        logger.log_request("chat", "u1", 5);
        logger.log_response("openai", 42);
        logger.log_error(&AiError::Timeout, "generate");

        assert_eq!(logger.get_logs(Some(AuditKind::Request), None).len(), 1);
        assert_eq!(logger.get_logs(Some(AuditKind::Error), None).len(), 1);
        assert_eq!(logger.get_logs(None, None).len(), 3);
    }

    #[test]
    fn test_default_query_limit() {
        let logger = AuditLogger::new();
        for _ in 0..150 {
            logger.log_request("chat", "u1", 1);
        }
        assert_eq!(logger.get_logs(None, None).len(), DEFAULT_QUERY_LIMIT);
    }

    #[test]
    fn test_error_entry_carries_code() {
        let logger = AuditLogger::new();
        logger.log_error(&AiError::RateLimitExceeded, "validate");
        let logs = logger.get_logs(Some(AuditKind::Error), None);
        assert_eq!(logs[0].metadata["code"], "AI_RATE_LIMITED");
        assert_eq!(logs[0].metadata["context"], "validate");
    }

    #[test]
    fn test_export_counts() {
        let logger = AuditLogger::new();
        logger.log_request("chat", "u1", 5);
        logger.log_request("chat", "u1", 6);
        logger.log_response("claude", 99);

        let export = logger.export_logs();
        assert_eq!(export["totalEntries"], 3);
        assert_eq!(export["requestCount"], 2);
        assert_eq!(export["responseCount"], 1);
        assert_eq!(export["errorCount"], 0);
        assert_eq!(export["entries"].as_array().unwrap().len(), 3);
    }
}
