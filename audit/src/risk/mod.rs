//! Pattern-based risk scoring of raw SQL text.
//!
//! The analyzer runs a fixed catalog of named injection detectors over a
//! whitespace-normalized copy of the statement. The final risk level is the
//! maximum matched tier; confidence starts from the matched tiers and is
//! adjusted for statement shape and execution context. Structurally
//! identical statements within the dedup window are answered from a cache
//! instead of being re-analyzed.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::{Duration, Instant};

use chrono::Timelike;
use config::shared::AnalyzerConfig;
use regex::Regex;
use tracing::warn;

use crate::types::{PatternMatch, QueryContext, RiskAssessment, RiskLevel};

struct Detector {
    category: &'static str,
    level: RiskLevel,
    pattern: Regex,
}

fn detector(category: &'static str, level: RiskLevel, pattern: &str) -> Detector {
    Detector {
        category,
        level,
        pattern: Regex::new(pattern)
            .unwrap_or_else(|_| unreachable!("static pattern is valid")),
    }
}

// The catalog is fixed; configuration only toggles the analyzer as a whole.
static DETECTORS: LazyLock<Vec<Detector>> = LazyLock::new(|| {
    vec![
        detector(
            "union_injection",
            RiskLevel::High,
            r"(?i)\bunion\s+(all\s+)?select\b",
        ),
        detector(
            "boolean_injection",
            RiskLevel::High,
            r#"(?i)\b(or|and)\s+['"]?\d+['"]?\s*=\s*['"]?\d+|'\s*or\s*'[^']*'\s*=\s*'"#,
        ),
        detector(
            "time_injection",
            RiskLevel::High,
            r"(?i)\b(sleep|benchmark|pg_sleep)\s*\(|\bwaitfor\s+delay\b",
        ),
        detector(
            "stacked_queries",
            RiskLevel::High,
            r"(?i);\s*(select|insert|update|delete|drop|create|alter|exec)\b",
        ),
        detector(
            "error_based",
            RiskLevel::High,
            r"(?i)\b(extractvalue|updatexml)\s*\(|\bfloor\s*\(\s*rand\s*\(",
        ),
        detector(
            "file_operation",
            RiskLevel::High,
            r"(?i)\bload_file\s*\(|\binto\s+(out|dump)file\b",
        ),
        detector(
            "comment_injection",
            RiskLevel::Medium,
            r"(?i)(--|#)[^\r\n]*$|/\*.*?\*/",
        ),
        detector(
            "schema_enumeration",
            RiskLevel::Medium,
            r"(?i)\binformation_schema\b|\bmysql\.user\b|\bsysobjects\b|\bsys\.tables\b",
        ),
        detector(
            "blind_injection",
            RiskLevel::Medium,
            r"(?i)\b(substring|substr|ascii|mid)\s*\([^)]*\)\s*[=<>]",
        ),
        detector(
            "suspicious_keywords",
            RiskLevel::Low,
            r"(?i)\b(concat_ws|unhex|hex|char)\s*\(",
        ),
    ]
});

static STRING_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"'[^']*'|"[^"]*""#)
        .unwrap_or_else(|_| unreachable!("static pattern is valid"))
});

static NUMBER_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d+(\.\d+)?\b")
        .unwrap_or_else(|_| unreachable!("static pattern is valid"))
});

fn base_confidence(level: RiskLevel) -> f64 {
    match level {
        RiskLevel::High => 0.8,
        RiskLevel::Medium => 0.6,
        RiskLevel::Low => 0.4,
        RiskLevel::None => 0.0,
    }
}

/// Collapses whitespace and replaces literals with placeholders, so two
/// statements differing only in constants hash identically.
fn structural_form(sql: &str) -> String {
    let collapsed = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    let lowered = collapsed.to_lowercase();
    let without_strings = STRING_LITERAL.replace_all(&lowered, "?");
    NUMBER_LITERAL.replace_all(&without_strings, "?").into_owned()
}

fn structural_hash(sql: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    structural_form(sql).hash(&mut hasher);
    hasher.finish()
}

fn special_char_density(sql: &str) -> f64 {
    if sql.is_empty() {
        return 0.0;
    }
    let special = sql
        .chars()
        .filter(|c| "'\";#()=<>-%".contains(*c))
        .count();
    special as f64 / sql.chars().count() as f64
}

fn has_encoded_payload(sql: &str) -> bool {
    let lowered = sql.to_lowercase();
    lowered.contains("%27")
        || lowered.contains("%20")
        || lowered.contains("0x")
        || lowered.contains("&#")
}

const SYSTEM_SCHEMAS: &[&str] = &["information_schema", "mysql", "performance_schema", "sys"];

/// Net confidence adjustment derived from the execution context.
fn context_adjustment(context: &QueryContext) -> f64 {
    let mut adjustment = 0.0;

    if let Some(actor) = &context.actor {
        let account = actor.split('@').next().unwrap_or(actor).to_lowercase();
        if account == "root" || account.contains("admin") {
            adjustment -= 0.2;
        } else if account.starts_with("web_") || account.starts_with("app_") {
            adjustment += 0.1;
        }
    }

    if let Some(host) = &context.host {
        if host == "localhost" || host == "127.0.0.1" || host.starts_with("10.")
            || host.starts_with("192.168.")
        {
            adjustment -= 0.1;
        } else {
            adjustment += 0.2;
        }
    }

    if let Some(timestamp) = context.timestamp {
        let hour = timestamp.hour();
        if !(6..22).contains(&hour) {
            adjustment += 0.1;
        }
    }

    if let Some(database) = &context.database
        && SYSTEM_SCHEMAS.contains(&database.to_lowercase().as_str())
    {
        adjustment += 0.1;
    }

    adjustment
}

struct CacheEntry {
    stored_at: Instant,
    assessment: RiskAssessment,
}

/// Pattern-based SQL risk analyzer with structural deduplication.
///
/// The dedup cache is owned by the instance and evicted by TTL; cloning the
/// analyzer shares the cache.
#[derive(Clone)]
pub struct RiskAnalyzer {
    dedup_window: Duration,
    cache: Arc<Mutex<HashMap<u64, CacheEntry>>>,
}

impl RiskAnalyzer {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            dedup_window: Duration::from_secs(config.dedup_window_secs),
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Analyzes one statement in its execution context.
    pub fn analyze(&self, sql: &str, context: &QueryContext) -> RiskAssessment {
        let query_hash = structural_hash(sql);

        if let Some(cached) = self.cached(query_hash) {
            return cached;
        }

        let mut matched_patterns = Vec::new();
        let mut risk_level = RiskLevel::None;

        for detector in DETECTORS.iter() {
            if let Some(found) = detector.pattern.find(sql) {
                risk_level = risk_level.max(detector.level);
                matched_patterns.push(PatternMatch {
                    category: detector.category.to_string(),
                    level: detector.level,
                    fragment: found.as_str().to_string(),
                });
            }
        }

        let adjustment = context_adjustment(context);
        let confidence = if matched_patterns.is_empty() {
            0.0
        } else {
            let base: f64 = matched_patterns
                .iter()
                .map(|m| base_confidence(m.level))
                .sum::<f64>()
                / matched_patterns.len() as f64;

            let mut confidence = base;
            if sql.chars().count() > 50 {
                confidence += 0.1;
            }
            if special_char_density(sql) > 0.2 {
                confidence += 0.1;
            }
            if has_encoded_payload(sql) {
                confidence += 0.2;
            }
            (confidence + adjustment).clamp(0.0, 1.0)
        };

        if risk_level >= RiskLevel::Medium {
            warn!(
                risk = ?risk_level,
                confidence,
                patterns = matched_patterns.len(),
                "suspicious statement detected"
            );
        }

        let assessment = RiskAssessment {
            query_hash,
            risk_level,
            confidence,
            matched_patterns,
            context_adjustment: adjustment,
            cached: false,
        };

        self.remember(query_hash, &assessment);

        assessment
    }

    fn cached(&self, query_hash: u64) -> Option<RiskAssessment> {
        let mut cache = match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let entry = cache.get(&query_hash)?;
        if entry.stored_at.elapsed() >= self.dedup_window {
            cache.remove(&query_hash);
            return None;
        }

        let mut assessment = entry.assessment.clone();
        assessment.cached = true;
        Some(assessment)
    }

    fn remember(&self, query_hash: u64, assessment: &RiskAssessment) {
        let mut cache = match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let window = self.dedup_window;
        cache.retain(|_, entry| entry.stored_at.elapsed() < window);

        cache.insert(
            query_hash,
            CacheEntry {
                stored_at: Instant::now(),
                assessment: assessment.clone(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn analyzer() -> RiskAnalyzer {
        RiskAnalyzer::new(&AnalyzerConfig::default())
    }

    #[test]
    fn test_union_injection_is_high_risk() {
        let assessment = analyzer().analyze(
            "SELECT * FROM users WHERE id=1 UNION SELECT user,pass FROM admin",
            &QueryContext::default(),
        );

        assert_eq!(assessment.risk_level, RiskLevel::High);
        assert!(assessment
            .matched_patterns
            .iter()
            .any(|m| m.category == "union_injection"));
        assert!(assessment.confidence > 0.5);
    }

    #[test]
    fn test_plain_select_is_benign() {
        let assessment =
            analyzer().analyze("SELECT * FROM users WHERE id=1", &QueryContext::default());

        assert_eq!(assessment.risk_level, RiskLevel::None);
        assert!(assessment.matched_patterns.is_empty());
        assert_eq!(assessment.confidence, 0.0);
    }

    #[test]
    fn test_boolean_and_time_detectors() {
        let assessment =
            analyzer().analyze("SELECT * FROM t WHERE 1=1 OR 2=2", &QueryContext::default());
        assert_eq!(assessment.risk_level, RiskLevel::High);

        let assessment = analyzer().analyze(
            "SELECT * FROM t WHERE id=1 AND SLEEP(5)",
            &QueryContext::default(),
        );
        assert!(assessment
            .matched_patterns
            .iter()
            .any(|m| m.category == "time_injection"));
    }

    #[test]
    fn test_schema_enumeration_is_medium() {
        let assessment = analyzer().analyze(
            "SELECT table_name FROM information_schema.tables",
            &QueryContext::default(),
        );
        assert_eq!(assessment.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn test_context_raises_and_lowers_confidence() {
        let sql = "SELECT * FROM t WHERE id=1 UNION SELECT 1,2";

        let external = QueryContext {
            host: Some("203.0.113.9".to_string()),
            timestamp: Some(Utc.with_ymd_and_hms(2024, 5, 1, 3, 0, 0).unwrap()),
            ..Default::default()
        };
        let raised = analyzer().analyze(sql, &external);
        assert!(raised.context_adjustment > 0.0);

        let privileged = QueryContext {
            actor: Some("root@localhost".to_string()),
            host: Some("localhost".to_string()),
            ..Default::default()
        };
        let lowered = analyzer().analyze(sql, &privileged);
        assert!(lowered.context_adjustment < 0.0);
        assert!(lowered.confidence < raised.confidence);
    }

    #[test]
    fn test_confidence_clamped_to_unit_interval() {
        let sql = "SELECT * FROM t WHERE id=0x41 UNION SELECT username,password FROM users; \
                   DROP TABLE audit_log; -- cleanup";
        let context = QueryContext {
            host: Some("198.51.100.7".to_string()),
            timestamp: Some(Utc.with_ymd_and_hms(2024, 5, 1, 23, 30, 0).unwrap()),
            database: Some("mysql".to_string()),
            ..Default::default()
        };

        let assessment = analyzer().analyze(sql, &context);
        assert!(assessment.confidence <= 1.0);
        assert_eq!(assessment.risk_level, RiskLevel::High);
    }

    #[test]
    fn test_structural_dedup_serves_cache() {
        let analyzer = analyzer();

        let first = analyzer.analyze(
            "SELECT * FROM users WHERE id=1 UNION SELECT 1,2",
            &QueryContext::default(),
        );
        assert!(!first.cached);

        // Different literals, identical structure.
        let second = analyzer.analyze(
            "SELECT  *  FROM users WHERE id=42 UNION SELECT 3,4",
            &QueryContext::default(),
        );
        assert!(second.cached);
        assert_eq!(second.risk_level, first.risk_level);
        assert_eq!(second.query_hash, first.query_hash);
    }

    #[test]
    fn test_dedup_window_expiry() {
        let analyzer = RiskAnalyzer::new(&AnalyzerConfig {
            enabled: true,
            dedup_window_secs: 0,
        });

        let sql = "SELECT * FROM users WHERE id=1 UNION SELECT 1,2";
        analyzer.analyze(sql, &QueryContext::default());
        let second = analyzer.analyze(sql, &QueryContext::default());
        assert!(!second.cached);
    }

    #[test]
    fn test_structural_form_replaces_literals() {
        assert_eq!(
            structural_form("SELECT * FROM t WHERE name = 'alice'  AND age=30"),
            "select * from t where name = ? and age=?"
        );
    }
}
