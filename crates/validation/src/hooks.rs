//! Pre-save hook registry (§4.3.1).
//!
//! Hooks are keyed by [`HookKind`] and run in ascending priority order.
//! Each hook returns `ok` (optionally with transformed data), `skip`
//! (short-circuits with success but omits persistence), or `fail`
//! (short-circuits with failure).

use std::collections::HashMap;

use serde_json::Value;

/// The point in the save pipeline a hook fires at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookKind {
    PreEntity,
    PreEdge,
    PreEpisode,
    PreBatch,
    PostValidation,
}

/// Outcome of a single hook execution.
#[derive(Debug, Clone)]
pub enum HookOutcome {
    Ok { transformed: Option<Value> },
    Skip { reason: String },
    Fail { reason: String },
}

impl HookOutcome {
    pub fn ok() -> Self {
        Self::Ok { transformed: None }
    }

    pub fn ok_with(transformed: Value) -> Self {
        Self::Ok { transformed: Some(transformed) }
    }

    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skip { reason: reason.into() }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Fail { reason: reason.into() }
    }
}

/// A single named, prioritized hook.
pub trait PreSaveHook: Send + Sync {
    fn name(&self) -> &str;
    fn run(&self, data: &Value) -> HookOutcome;
}

struct Registration {
    name: String,
    priority: i32,
    enabled: bool,
    hook: Box<dyn PreSaveHook>,
}

/// Result of running every registered hook for a kind against one payload.
#[derive(Debug, Clone)]
pub struct HookChainResult {
    pub success: bool,
    /// Final (possibly transformed) data. `None` when a hook requested skip.
    pub data: Option<Value>,
    pub skipped: bool,
    pub failure_reason: Option<String>,
    /// Names of hooks that ran, in order.
    pub ran: Vec<String>,
}

/// Registry of pre-save hooks, sorted and executed by ascending priority.
#[derive(Default)]
pub struct HookRegistry {
    hooks: HashMap<HookKind, Vec<Registration>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook. A hook with the same `name` under the same kind
    /// replaces the existing registration (with a warning).
    pub fn register(
        &mut self,
        kind: HookKind,
        name: impl Into<String>,
        priority: i32,
        hook: Box<dyn PreSaveHook>,
    ) {
        let name = name.into();
        let bucket = self.hooks.entry(kind).or_default();
        if let Some(pos) = bucket.iter().position(|r| r.name == name) {
            tracing::warn!(hook = %name, ?kind, "replacing existing pre-save hook registration");
            bucket.remove(pos);
        }
        bucket.push(Registration { name, priority, enabled: true, hook });
        bucket.sort_by_key(|r| r.priority);
    }

    pub fn set_enabled(&mut self, kind: HookKind, name: &str, enabled: bool) {
        if let Some(bucket) = self.hooks.get_mut(&kind) {
            if let Some(reg) = bucket.iter_mut().find(|r| r.name == name) {
                reg.enabled = enabled;
            }
        }
    }

    /// Execute every enabled hook for `kind` against `data`, chaining
    /// transformed data through successive hooks in priority order.
    pub fn execute(&self, kind: HookKind, data: &Value) -> HookChainResult {
        let mut current = data.clone();
        let mut ran = Vec::new();

        let Some(bucket) = self.hooks.get(&kind) else {
            return HookChainResult { success: true, data: Some(current), skipped: false, failure_reason: None, ran };
        };

        for reg in bucket.iter().filter(|r| r.enabled) {
            ran.push(reg.name.clone());
            match reg.hook.run(&current) {
                HookOutcome::Ok { transformed } => {
                    if let Some(t) = transformed {
                        current = t;
                    }
                }
                HookOutcome::Skip { reason } => {
                    tracing::debug!(hook = %reg.name, %reason, "pre-save hook requested skip");
                    return HookChainResult { success: true, data: None, skipped: true, failure_reason: None, ran };
                }
                HookOutcome::Fail { reason } => {
                    tracing::warn!(hook = %reg.name, %reason, "pre-save hook failed");
                    return HookChainResult {
                        success: false,
                        data: None,
                        skipped: false,
                        failure_reason: Some(reason),
                        ran,
                    };
                }
            }
        }

        HookChainResult { success: true, data: Some(current), skipped: false, failure_reason: None, ran }
    }
}

// ── Built-in hooks ──────────────────────────────────────────────────

/// Required-field presence: `id`, `name`, `tenant` for entities.
pub struct RequiredEntityFields;

impl PreSaveHook for RequiredEntityFields {
    fn name(&self) -> &str {
        "required_entity_fields"
    }

    fn run(&self, data: &Value) -> HookOutcome {
        for field in ["id", "name", "tenant"] {
            match data.get(field) {
                Some(Value::String(s)) if !s.is_empty() => {}
                _ => return HookOutcome::fail(format!("missing required field: {field}")),
            }
        }
        HookOutcome::ok()
    }
}

/// Required-field presence: `id`, `source`, `target`, `tenant` for edges.
pub struct RequiredEdgeFields;

impl PreSaveHook for RequiredEdgeFields {
    fn name(&self) -> &str {
        "required_edge_fields"
    }

    fn run(&self, data: &Value) -> HookOutcome {
        for field in ["id", "source", "target", "tenant"] {
            match data.get(field) {
                Some(Value::String(s)) if !s.is_empty() => {}
                _ => return HookOutcome::fail(format!("missing required field: {field}")),
            }
        }
        HookOutcome::ok()
    }
}

/// Trims and title-cases the `name` field, when enabled.
pub struct NameNormalizationHook {
    pub enabled: bool,
}

impl PreSaveHook for NameNormalizationHook {
    fn name(&self) -> &str {
        "name_normalization"
    }

    fn run(&self, data: &Value) -> HookOutcome {
        if !self.enabled {
            return HookOutcome::ok();
        }
        let Some(Value::String(name)) = data.get("name") else {
            return HookOutcome::ok();
        };
        let trimmed = name.trim();
        let title_cased = title_case(trimmed);
        if title_cased == *name {
            return HookOutcome::ok();
        }
        let mut transformed = data.clone();
        transformed["name"] = Value::String(title_cased);
        HookOutcome::ok_with(transformed)
    }
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Within a batch: same `id` across entries is a hard failure; same
/// `(name, tenant)` skips the later entry (first one wins).
pub fn check_intra_batch_duplicates(items: &[Value]) -> Vec<HookChainResult> {
    let mut seen_ids = std::collections::HashSet::new();
    let mut seen_name_tenant = std::collections::HashSet::new();
    let mut results = Vec::with_capacity(items.len());

    for item in items {
        let id = item.get("id").and_then(Value::as_str).unwrap_or_default();
        let name = item.get("name").and_then(Value::as_str).unwrap_or_default();
        let tenant = item.get("tenant").and_then(Value::as_str).unwrap_or_default();

        if !id.is_empty() && !seen_ids.insert(id.to_string()) {
            results.push(HookChainResult {
                success: false,
                data: None,
                skipped: false,
                failure_reason: Some(format!("duplicate id within batch: {id}")),
                ran: vec!["intra_batch_duplicate_check".to_string()],
            });
            continue;
        }

        let key = (name.to_string(), tenant.to_string());
        if !seen_name_tenant.insert(key) {
            results.push(HookChainResult {
                success: true,
                data: None,
                skipped: true,
                failure_reason: None,
                ran: vec!["intra_batch_duplicate_check".to_string()],
            });
            continue;
        }

        results.push(HookChainResult {
            success: true,
            data: Some(item.clone()),
            skipped: false,
            failure_reason: None,
            ran: vec!["intra_batch_duplicate_check".to_string()],
        });
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registry_runs_hooks_in_priority_order() {
        let mut registry = HookRegistry::new();
        registry.register(HookKind::PreEntity, "required", 0, Box::new(RequiredEntityFields));
        registry.register(
            HookKind::PreEntity,
            "normalize",
            10,
            Box::new(NameNormalizationHook { enabled: true }),
        );

        let data = json!({"id": "e1", "name": "  john smith  ", "tenant": "t1"});
        let result = registry.execute(HookKind::PreEntity, &data);
        assert!(result.success);
        assert_eq!(result.data.unwrap()["name"], "John Smith");
    }

    #[test]
    fn missing_required_field_fails_chain() {
        let mut registry = HookRegistry::new();
        registry.register(HookKind::PreEntity, "required", 0, Box::new(RequiredEntityFields));
        let data = json!({"id": "e1", "tenant": "t1"});
        let result = registry.execute(HookKind::PreEntity, &data);
        assert!(!result.success);
        assert!(result.failure_reason.unwrap().contains("name"));
    }

    #[test]
    fn replacing_hook_with_same_name_logs_and_replaces() {
        let mut registry = HookRegistry::new();
        registry.register(HookKind::PreEdge, "required", 0, Box::new(RequiredEdgeFields));
        registry.register(HookKind::PreEdge, "required", 0, Box::new(RequiredEdgeFields));
        assert_eq!(registry.hooks.get(&HookKind::PreEdge).unwrap().len(), 1);
    }

    #[test]
    fn disabled_hook_is_skipped() {
        let mut registry = HookRegistry::new();
        registry.register(HookKind::PreEntity, "required", 0, Box::new(RequiredEntityFields));
        registry.set_enabled(HookKind::PreEntity, "required", false);
        let data = json!({"tenant": "t1"});
        let result = registry.execute(HookKind::PreEntity, &data);
        assert!(result.success);
    }

    #[test]
    fn intra_batch_same_id_fails() {
        let items = vec![
            json!({"id": "a", "name": "x", "tenant": "t"}),
            json!({"id": "a", "name": "y", "tenant": "t"}),
        ];
        let results = check_intra_batch_duplicates(&items);
        assert!(results[0].success);
        assert!(!results[1].success);
    }

    #[test]
    fn intra_batch_same_name_tenant_skips_later() {
        let items = vec![
            json!({"id": "a", "name": "x", "tenant": "t"}),
            json!({"id": "b", "name": "x", "tenant": "t"}),
        ];
        let results = check_intra_batch_duplicates(&items);
        assert!(results[0].success && !results[0].skipped);
        assert!(results[1].success && results[1].skipped);
    }
}
