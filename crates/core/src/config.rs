use std::env;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    profiled_env_opt(profile, key)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_f64(profile: &str, key: &str, default: f64) -> f64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub queue: QueueConfig,
    pub rate_limit: RateLimitConfig,
    pub identity: IdentityConfig,
    pub fuzzy: FuzzyConfig,
    pub merge: MergeConfig,
    pub validation: ValidationConfig,
    pub worker: WorkerConfig,
    pub webhook: WebhookConfig,
    pub graph: GraphConfig,
}

/// Well-known env keys that identify a profile when prefixed.
const PROFILE_MARKER_KEYS: &[&str] = &["QUEUE_BROKER_URL", "GRAPH_URI", "LLM_API_KEY"];

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `KAIROS_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("KAIROS_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            queue: QueueConfig::from_env_profiled(p),
            rate_limit: RateLimitConfig::from_env_profiled(p),
            identity: IdentityConfig::from_env_profiled(p),
            fuzzy: FuzzyConfig::from_env_profiled(p),
            merge: MergeConfig::from_env_profiled(p),
            validation: ValidationConfig::from_env_profiled(p),
            worker: WorkerConfig::from_env_profiled(p),
            webhook: WebhookConfig::from_env_profiled(p),
            graph: GraphConfig::from_env_profiled(p),
        }
    }

    /// Discover available profiles by scanning env vars for `{PREFIX}_{MARKER_KEY}` patterns.
    /// Always includes "default" (the unprefixed config).
    pub fn available_profiles() -> Vec<String> {
        let mut profiles = std::collections::BTreeSet::new();
        profiles.insert("default".to_string());

        for (key, _) in env::vars() {
            for marker in PROFILE_MARKER_KEYS {
                if let Some(prefix) = key.strip_suffix(&format!("_{}", marker)) {
                    if !prefix.is_empty()
                        && prefix.chars().all(|c| c.is_ascii_uppercase() || c == '_')
                    {
                        profiles.insert(prefix.to_string());
                    }
                }
            }
        }

        profiles.into_iter().collect()
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  queue:       broker_url={}", self.queue.broker_url);
        tracing::info!(
            "  rate_limit:  global_rps={}, tenant_rpm={}",
            self.rate_limit.global_rps,
            self.rate_limit.tenant_rpm
        );
        tracing::info!(
            "  identity:    deterministic_ids={}, enhanced_normalization={}",
            self.identity.use_deterministic_ids,
            self.identity.enhanced_normalization
        );
        tracing::info!("  merge:       strategy={}", self.merge.strategy);
        tracing::info!(
            "  worker:      count={}, batch_size={}, poll_interval={}s",
            self.worker.worker_count,
            self.worker.batch_size,
            self.worker.poll_interval_secs
        );
        tracing::info!("  webhook:     dispatchers={}, queue_capacity={}", self.webhook.dispatch_workers, self.webhook.queue_capacity);
        tracing::info!("  graph:       backend={}", self.graph.backend);
    }

    /// Return a redacted view safe for API responses (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "queue": { "broker_url": self.queue.broker_url, "queue_name": self.queue.queue_name },
            "rate_limit": { "global_rps": self.rate_limit.global_rps, "tenant_rpm": self.rate_limit.tenant_rpm },
            "identity": {
                "use_deterministic_ids": self.identity.use_deterministic_ids,
                "normalize_names": self.identity.normalize_names,
                "enhanced_normalization": self.identity.enhanced_normalization,
                "similarity_threshold": self.identity.similarity_threshold,
            },
            "worker": { "worker_count": self.worker.worker_count, "batch_size": self.worker.batch_size },
            "graph": { "backend": self.graph.backend, "configured": self.graph.is_configured() },
        })
    }
}

// ── Queue (C1) ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub broker_url: String,
    pub queue_name: String,
    pub dlq_name: String,
    pub request_timeout_secs: u64,
    pub default_visibility_timeout_secs: u64,
}

impl QueueConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            broker_url: profiled_env_or(p, "QUEUE_BROKER_URL", "http://localhost:8093"),
            queue_name: profiled_env_or(p, "QUEUE_NAME", "ingestion"),
            dlq_name: profiled_env_or(p, "QUEUE_DLQ_NAME", "ingestion_dead_letter"),
            request_timeout_secs: profiled_env_u64(p, "QUEUE_REQUEST_TIMEOUT_SECS", 30),
            default_visibility_timeout_secs: profiled_env_u64(p, "QUEUE_VISIBILITY_TIMEOUT_SECS", 300),
        }
    }
}

// ── Rate limiter (C2) ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub global_rps: u32,
    pub tenant_rpm: u32,
    pub suspension_secs: u64,
}

impl RateLimitConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            global_rps: profiled_env_u32(p, "RATE_GLOBAL_RPS", 100),
            tenant_rpm: profiled_env_u32(p, "RATE_TENANT_RPM", 60),
            suspension_secs: profiled_env_u64(p, "RATE_TENANT_SUSPENSION_SECS", 60),
        }
    }
}

// ── Identity & normalization (C4) ─────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub use_deterministic_ids: bool,
    pub normalize_names: bool,
    pub enhanced_normalization: bool,
    pub similarity_threshold: f64,
    pub cross_tenant_dedup: bool,
}

impl IdentityConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            use_deterministic_ids: profiled_env_bool(p, "USE_DETERMINISTIC_IDS", true),
            normalize_names: profiled_env_bool(p, "DEDUP_NORMALIZE_NAMES", true),
            enhanced_normalization: profiled_env_bool(p, "DEDUP_ENHANCED_NORMALIZATION", true),
            similarity_threshold: profiled_env_f64(p, "DEDUP_SIMILARITY_THRESHOLD", 0.85),
            cross_tenant_dedup: profiled_env_bool(p, "DEDUP_CROSS_TENANT", false),
        }
    }
}

// ── Fuzzy matching (C3.4) ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuzzyConfig {
    /// "strict" | "balanced" | "permissive" | "custom"
    pub strategy: String,
    pub word_overlap_threshold: f64,
    pub semantic_threshold: f64,
    pub combined_threshold: f64,
    pub edge_threshold: f64,
    pub boost_exact_match: bool,
}

impl FuzzyConfig {
    fn from_env_profiled(p: &str) -> Self {
        let strategy = profiled_env_or(p, "FUZZY_MATCHING_STRATEGY", "balanced");
        let (word, semantic, combined, edge) = match strategy.as_str() {
            "strict" => (0.9, 0.9, 0.9, 0.9),
            "permissive" => (0.5, 0.6, 0.6, 0.6),
            _ => (0.7, 0.75, 0.75, 0.75),
        };
        Self {
            strategy,
            word_overlap_threshold: profiled_env_f64(p, "FUZZY_WORD_OVERLAP_THRESHOLD", word),
            semantic_threshold: profiled_env_f64(p, "FUZZY_SEMANTIC_THRESHOLD", semantic),
            combined_threshold: profiled_env_f64(p, "FUZZY_COMBINED_THRESHOLD", combined),
            edge_threshold: profiled_env_f64(p, "FUZZY_EDGE_THRESHOLD", edge),
            boost_exact_match: profiled_env_bool(p, "FUZZY_BOOST_EXACT_MATCH", true),
        }
    }
}

// ── Merge policy (C3.5 / C6) ──────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// "preserve_oldest" | "preserve_newest" | "preserve_most_complete" | "preserve_highest_centrality" | "aggregate_all"
    pub strategy: String,
    /// "first_wins" | "last_wins" | "longest_wins" | "max" | "min" | "average" | "concatenate" | "list_union" | "custom"
    pub default_conflict_resolution: String,
    pub track_merge_history: bool,
    pub max_history_entries: usize,
    pub allow_cross_tenant_merge: bool,
    pub write_audit_edge: bool,
    pub centrality_weight_degree: f64,
    pub centrality_weight_pagerank: f64,
    pub centrality_weight_betweenness: f64,
    pub centrality_weight_eigenvector: f64,
}

impl MergeConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            strategy: profiled_env_or(p, "MERGE_STRATEGY", "preserve_most_complete"),
            default_conflict_resolution: profiled_env_or(
                p,
                "MERGE_DEFAULT_CONFLICT_RESOLUTION",
                "last_wins",
            ),
            track_merge_history: profiled_env_bool(p, "MERGE_TRACK_HISTORY", true),
            max_history_entries: profiled_env_u32(p, "MERGE_MAX_HISTORY_ENTRIES", 10) as usize,
            allow_cross_tenant_merge: profiled_env_bool(p, "MERGE_ALLOW_CROSS_TENANT", false),
            write_audit_edge: profiled_env_bool(p, "MERGE_WRITE_AUDIT_EDGE", true),
            centrality_weight_degree: profiled_env_f64(p, "MERGE_CENTRALITY_WEIGHT_DEGREE", 0.25),
            centrality_weight_pagerank: profiled_env_f64(p, "MERGE_CENTRALITY_WEIGHT_PAGERANK", 0.25),
            centrality_weight_betweenness: profiled_env_f64(p, "MERGE_CENTRALITY_WEIGHT_BETWEENNESS", 0.25),
            centrality_weight_eigenvector: profiled_env_f64(p, "MERGE_CENTRALITY_WEIGHT_EIGENVECTOR", 0.25),
        }
    }
}

// ── Validation orchestrator (C3) ──────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    pub pre_save_enabled: bool,
    pub post_save_enabled: bool,
    pub post_save_auto_repair: bool,
    pub post_save_timeout_ms: u64,
    pub fail_on_warnings: bool,
    pub fail_on_centrality_errors: bool,
    pub max_wall_clock_ms: u64,
}

impl ValidationConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            pre_save_enabled: profiled_env_bool(p, "VALIDATION_PRE_SAVE_ENABLED", true),
            post_save_enabled: profiled_env_bool(p, "POST_SAVE_VALIDATION_ENABLED", true),
            post_save_auto_repair: profiled_env_bool(p, "POST_SAVE_AUTO_REPAIR", false),
            post_save_timeout_ms: profiled_env_u64(p, "POST_SAVE_TIMEOUT", 5_000),
            fail_on_warnings: profiled_env_bool(p, "VALIDATION_FAIL_ON_WARNINGS", false),
            fail_on_centrality_errors: profiled_env_bool(p, "VALIDATION_FAIL_ON_CENTRALITY_ERRORS", true),
            max_wall_clock_ms: profiled_env_u64(p, "VALIDATION_MAX_WALL_CLOCK_MS", 10_000),
        }
    }
}

// ── Worker pool (C7 / C8) ──────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub worker_count: u32,
    pub batch_size: u32,
    pub poll_interval_secs: u64,
    pub default_max_retries: u32,
    pub shutdown_drain_secs: u64,
}

impl WorkerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            worker_count: profiled_env_u32(p, "WORKER_COUNT", 4),
            batch_size: profiled_env_u32(p, "BATCH_SIZE", 10),
            poll_interval_secs: profiled_env_u64(p, "POLL_INTERVAL", 2),
            default_max_retries: profiled_env_u32(p, "WORKER_MAX_RETRIES", 3),
            shutdown_drain_secs: profiled_env_u64(p, "WORKER_SHUTDOWN_DRAIN_SECS", 30),
        }
    }
}

// ── Webhook dispatcher (C9) ───────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub queue_capacity: usize,
    pub dispatch_workers: u32,
    pub max_retries: u32,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_reset_secs: u64,
    pub request_timeout_secs: u64,
    pub shutdown_drain_secs: u64,
}

impl WebhookConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            queue_capacity: profiled_env_u32(p, "WEBHOOK_QUEUE_CAPACITY", 10_000) as usize,
            dispatch_workers: profiled_env_u32(p, "WEBHOOK_DISPATCH_WORKERS", 3),
            max_retries: profiled_env_u32(p, "WEBHOOK_MAX_RETRIES", 3),
            circuit_breaker_threshold: profiled_env_u32(p, "WEBHOOK_CIRCUIT_BREAKER_THRESHOLD", 10),
            circuit_breaker_reset_secs: profiled_env_u64(p, "WEBHOOK_CIRCUIT_BREAKER_RESET_SECS", 60),
            request_timeout_secs: profiled_env_u64(p, "WEBHOOK_REQUEST_TIMEOUT_SECS", 5),
            shutdown_drain_secs: profiled_env_u64(p, "WEBHOOK_SHUTDOWN_DRAIN_SECS", 10),
        }
    }
}

// ── Graph store ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// "neo4j" | "falkordb" | "memory"
    pub backend: String,
    pub uri: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

impl GraphConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            backend: profiled_env_or(p, "GRAPH_BACKEND", "memory"),
            uri: profiled_env_opt(p, "GRAPH_URI"),
            username: profiled_env_opt(p, "GRAPH_USERNAME"),
            password: profiled_env_opt(p, "GRAPH_PASSWORD"),
            database: profiled_env_opt(p, "GRAPH_DATABASE"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.backend == "memory" || self.uri.is_some()
    }

    /// The constraint-statement graph/index key, falling back to
    /// `database` then a fixed default (teacher's `redacted_summary`
    /// idiom: never panic on a missing optional field).
    pub fn graph_key(&self) -> String {
        self.database.clone().unwrap_or_else(|| "kairos".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane_without_any_env() {
        let cfg = Config::for_profile("");
        assert_eq!(cfg.worker.worker_count, 4);
        assert_eq!(cfg.rate_limit.global_rps, 100);
        assert_eq!(cfg.rate_limit.tenant_rpm, 60);
        assert!(cfg.identity.use_deterministic_ids);
        assert_eq!(cfg.graph.backend, "memory");
    }

    #[test]
    fn fuzzy_strategy_presets_select_distinct_thresholds() {
        std::env::set_var("FUZZY_MATCHING_STRATEGY", "strict");
        let strict = FuzzyConfig::from_env_profiled("");
        std::env::set_var("FUZZY_MATCHING_STRATEGY", "permissive");
        let permissive = FuzzyConfig::from_env_profiled("");
        std::env::remove_var("FUZZY_MATCHING_STRATEGY");
        assert!(strict.combined_threshold > permissive.combined_threshold);
    }

    #[test]
    fn redacted_summary_omits_secrets() {
        let cfg = Config::for_profile("");
        let summary = cfg.redacted_summary();
        assert!(summary.to_string().contains("broker_url"));
        assert!(!summary.to_string().to_lowercase().contains("password"));
    }
}
