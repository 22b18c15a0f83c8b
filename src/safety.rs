//! Safety Gate (§4.1): pre-admission checks. Pure or near-pure; the only
//! I/O is `check_abuse`'s durable-store query, and that path fails open.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::store::durable::DurableStore;
use crate::store::SessionId;

pub const MIN_TIME_LIMIT_MS: i32 = 100;
pub const MAX_TIME_LIMIT_MS: i32 = 60_000;
pub const MIN_MEMORY_MB: i32 = 32;
pub const MAX_MEMORY_MB: i32 = 2048;

const ABUSE_WINDOW_SECONDS: i64 = 60;
const ABUSE_RATE_LIMIT: i64 = 10;
const ABUSE_FAILURE_LIMIT: i64 = 5;
pub const ABUSE_RETRY_AFTER_SECONDS: u64 = 60;

/// One violation of the parameter bounds (§4.1 `validateParams`: "the full list of
/// violations, not just the first").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamViolation {
    TimeLimitOutOfRange { given: i32 },
    MemoryLimitOutOfRange { given: i32 },
}

impl std::fmt::Display for ParamViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamViolation::TimeLimitOutOfRange { given } => write!(
                f,
                "time_limit_ms {given} out of range [{MIN_TIME_LIMIT_MS}, {MAX_TIME_LIMIT_MS}]"
            ),
            ParamViolation::MemoryLimitOutOfRange { given } => write!(
                f,
                "memory_limit_mb {given} out of range [{MIN_MEMORY_MB}, {MAX_MEMORY_MB}]"
            ),
        }
    }
}

/// Validates execution parameters, collecting every violation (§4.1, §8 invariant 8).
pub fn validate_params(time_limit_ms: i32, memory_limit_mb: i32) -> Vec<ParamViolation> {
    let mut violations = Vec::new();

    if !(MIN_TIME_LIMIT_MS..=MAX_TIME_LIMIT_MS).contains(&time_limit_ms) {
        violations.push(ParamViolation::TimeLimitOutOfRange {
            given: time_limit_ms,
        });
    }
    if !(MIN_MEMORY_MB..=MAX_MEMORY_MB).contains(&memory_limit_mb) {
        violations.push(ParamViolation::MemoryLimitOutOfRange {
            given: memory_limit_mb,
        });
    }

    violations
}

#[derive(Debug, Clone)]
pub struct AbuseCheckResult {
    pub allowed: bool,
    pub reason: Option<&'static str>,
    pub retry_after_seconds: u64,
}

impl AbuseCheckResult {
    fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
            retry_after_seconds: 0,
        }
    }

    fn blocked(reason: &'static str) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            retry_after_seconds: ABUSE_RETRY_AFTER_SECONDS,
        }
    }
}

/// Rate/circuit check over this session's recent executions (§4.1 `checkAbuse`,
/// §8 invariant 9). On store failure this fails OPEN: admission must not become
/// unavailable because the abuse check's own telemetry is down (§9 decision 3).
pub async fn check_abuse(store: &DurableStore, session_id: SessionId) -> AbuseCheckResult {
    match store
        .recent_execution_counts(session_id, ABUSE_WINDOW_SECONDS)
        .await
    {
        Ok((total, failed)) => {
            if total >= ABUSE_RATE_LIMIT {
                AbuseCheckResult::blocked("rate limit exceeded")
            } else if failed >= ABUSE_FAILURE_LIMIT {
                AbuseCheckResult::blocked("too many consecutive failures")
            } else {
                AbuseCheckResult::allowed()
            }
        }
        Err(err) => {
            warn!(
                error = %err,
                session_id = %session_id,
                "abuse check failed to query durable store, failing open"
            );
            AbuseCheckResult::allowed()
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoopPatternMatch {
    pub detected: bool,
    pub pattern_description: Option<String>,
}

struct RuntimePatterns {
    runtime: &'static str,
    patterns: Vec<(&'static str, &'static Regex)>,
}

macro_rules! compiled {
    ($name:ident, $pat:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($pat).unwrap());
    };
}

compiled!(PY_WHILE_TRUE, r"while\s+True\s*:");
compiled!(PY_WHILE_1, r"while\s+1\s*:");
compiled!(PY_ITER_INT, r"for\s+\w+\s+in\s+iter\(\s*int\s*,\s*1\s*\)");

compiled!(NODE_WHILE_TRUE, r"while\s*\(\s*true\s*\)");
compiled!(NODE_WHILE_1, r"while\s*\(\s*1\s*\)");
compiled!(NODE_FOR_EVER, r"for\s*\(\s*;\s*;\s*\)");

compiled!(C_WHILE_1, r"while\s*\(\s*1\s*\)");
compiled!(C_WHILE_TRUE, r"while\s*\(\s*true\s*\)");
compiled!(C_FOR_EVER, r"for\s*\(\s*;\s*;\s*\)");

fn patterns_for(runtime: &str) -> Option<RuntimePatterns> {
    match runtime {
        "python" => Some(RuntimePatterns {
            runtime,
            patterns: vec![
                ("while True:", &PY_WHILE_TRUE),
                ("while 1:", &PY_WHILE_1),
                ("for _ in iter(int, 1)", &PY_ITER_INT),
            ],
        }),
        "node" => Some(RuntimePatterns {
            runtime,
            patterns: vec![
                ("while (true)", &NODE_WHILE_TRUE),
                ("while (1)", &NODE_WHILE_1),
                ("for (;;)", &NODE_FOR_EVER),
            ],
        }),
        "gcc" | "g++" => Some(RuntimePatterns {
            runtime,
            patterns: vec![
                ("while (1)", &C_WHILE_1),
                ("while (true)", &C_WHILE_TRUE),
                ("for (;;)", &C_FOR_EVER),
            ],
        }),
        _ => None,
    }
}

/// Advisory-only loop-pattern scan (§4.1 `scanLoopPatterns`). A positive result is
/// logged, never blocking — the Runner's wall-clock timeout is the real safeguard.
pub fn scan_loop_patterns(source: &str, runtime_key: &str) -> LoopPatternMatch {
    let Some(table) = patterns_for(runtime_key) else {
        return LoopPatternMatch {
            detected: false,
            pattern_description: None,
        };
    };

    for (description, pattern) in &table.patterns {
        if pattern.is_match(source) {
            return LoopPatternMatch {
                detected: true,
                pattern_description: Some(format!("{description} ({})", table.runtime)),
            };
        }
    }

    LoopPatternMatch {
        detected: false,
        pattern_description: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_params_accepts_boundary_values() {
        assert!(validate_params(MIN_TIME_LIMIT_MS, MIN_MEMORY_MB).is_empty());
        assert!(validate_params(MAX_TIME_LIMIT_MS, MAX_MEMORY_MB).is_empty());
    }

    #[test]
    fn validate_params_collects_both_violations() {
        let violations = validate_params(50, 16);
        assert_eq!(violations.len(), 2);
    }

    #[test]
    fn validate_params_rejects_below_minimum_time_limit() {
        let violations = validate_params(50, 256);
        assert_eq!(
            violations,
            vec![ParamViolation::TimeLimitOutOfRange { given: 50 }]
        );
    }

    #[test]
    fn scan_detects_python_while_true() {
        let result = scan_loop_patterns("while True:\n    pass\n", "python");
        assert!(result.detected);
    }

    #[test]
    fn scan_ignores_unknown_runtime() {
        let result = scan_loop_patterns("while (1) {}", "php");
        assert!(!result.detected);
    }

    #[test]
    fn scan_no_false_positive_on_benign_node_loop() {
        let result = scan_loop_patterns("for (let i = 0; i < 10; i++) {}", "node");
        assert!(!result.detected);
    }
}
