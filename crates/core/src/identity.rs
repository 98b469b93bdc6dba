//! Deterministic identity derivation and name normalization (C4).
//!
//! Grounded on the namespace strings, normalization tables, and similarity
//! formula used by the original Python `uuid_utils` module.

use std::collections::HashSet;

use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

/// `Uuid::NAMESPACE_DNS`, reused as the root namespace for both entity and
/// edge derivation, matching the source system's constants verbatim.
const NAMESPACE_DNS: Uuid = Uuid::NAMESPACE_DNS;

/// `entity_id(name, tenant) = v5(v5(DNS, "graphiti.entity." + tenant), normalize(name))` (§4.4, §8.1).
pub fn entity_id(normalized_name: &str, tenant: &str) -> Uuid {
    let tenant_ns = Uuid::new_v5(&NAMESPACE_DNS, format!("graphiti.entity.{tenant}").as_bytes());
    Uuid::new_v5(&tenant_ns, normalized_name.as_bytes())
}

/// `edge_id(source, target, rel, tenant) = v5(v5(DNS, "graphiti.edge."+tenant), "{source}|{target}|{REL}")` (§4.4, §8.2).
pub fn edge_id(source_id: &str, target_id: &str, relation_name: Option<&str>, tenant: &str) -> Uuid {
    let tenant_ns = Uuid::new_v5(&NAMESPACE_DNS, format!("graphiti.edge.{tenant}").as_bytes());
    let rel = relation_name
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_uppercase())
        .unwrap_or_else(|| "RELATES_TO".to_string());
    let key = format!("{source_id}|{target_id}|{rel}");
    Uuid::new_v5(&tenant_ns, key.as_bytes())
}

/// Either a deterministic v5 id or a random v4, gated by `USE_DETERMINISTIC_IDS`.
pub fn derive_entity_id(use_deterministic: bool, normalized_name: &str, tenant: &str) -> Uuid {
    if use_deterministic {
        entity_id(normalized_name, tenant)
    } else {
        Uuid::new_v4()
    }
}

pub fn derive_edge_id(
    use_deterministic: bool,
    source_id: &str,
    target_id: &str,
    relation_name: Option<&str>,
    tenant: &str,
) -> Uuid {
    if use_deterministic {
        edge_id(source_id, target_id, relation_name, tenant)
    } else {
        Uuid::new_v4()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationMode {
    Basic,
    Enhanced,
}

/// Basic mode: lowercase, collapse separators to `_`, strip non `[a-z0-9_]`, trim `_`.
pub fn basic_normalize(name: &str) -> String {
    let lower = name.to_lowercase();
    let mut collapsed = String::with_capacity(lower.len());
    let mut last_was_sep = false;
    for ch in lower.chars() {
        if ch == '-' || ch == '.' || ch == '_' || ch.is_whitespace() {
            if !last_was_sep {
                collapsed.push('_');
                last_was_sep = true;
            }
        } else {
            collapsed.push(ch);
            last_was_sep = false;
        }
    }
    let stripped: String = collapsed
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    stripped.trim_matches('_').to_string()
}

const PERSONAL_TITLES: &[&str] = &["mr", "mrs", "ms", "dr", "prof", "sir", "madam"];
const TRAILING_SUFFIXES: &[&str] = &["jr", "sr", "ii", "iii", "iv", "phd", "md", "esq"];
const COMPANY_INDICATORS: &[&str] = &[
    "inc", "corp", "ltd", "llc", "co", "company", "corporation", "limited",
];

/// Known informal-name / abbreviation expansions applied during enhanced
/// normalization, so `"bob smith"` and `"robert smith"` converge.
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("bob", "robert"),
    ("bill", "william"),
    ("bobby", "robert"),
    ("mike", "michael"),
    ("mikey", "michael"),
    ("jim", "james"),
    ("jimmy", "james"),
    ("dave", "david"),
    ("dick", "richard"),
    ("rick", "richard"),
    ("tom", "thomas"),
    ("tommy", "thomas"),
    ("liz", "elizabeth"),
    ("beth", "elizabeth"),
    ("kate", "katherine"),
    ("katie", "katherine"),
    ("corp", "corporation"),
    ("inc", "incorporated"),
    ("ltd", "limited"),
    ("co", "company"),
];

/// Enhanced mode: Unicode NFKD strip-combining, possessive/contraction
/// handling, title/suffix/company-indicator stripping, abbreviation
/// expansion. Falls back to basic normalization if the result is empty.
pub fn enhanced_normalize(name: &str) -> String {
    let decomposed: String = name.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    let lower = decomposed.to_lowercase();
    let lower = lower.replace("'s", "").replace("n't", " not");

    let mut tokens: Vec<String> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect();

    tokens.retain(|t| !PERSONAL_TITLES.contains(&t.as_str()));

    while let Some(last) = tokens.last() {
        if TRAILING_SUFFIXES.contains(&last.as_str()) {
            tokens.pop();
        } else {
            break;
        }
    }

    tokens.retain(|t| !COMPANY_INDICATORS.contains(&t.as_str()));

    let expanded: Vec<String> = tokens
        .into_iter()
        .map(|t| {
            ABBREVIATIONS
                .iter()
                .find(|(abbr, _)| *abbr == t)
                .map(|(_, full)| full.to_string())
                .unwrap_or(t)
        })
        .collect();

    let joined = expanded.join("_");
    let stripped: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    let stripped = stripped.trim_matches('_').to_string();

    if stripped.is_empty() {
        basic_normalize(name)
    } else {
        stripped
    }
}

fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0x20D0..=0x20FF)
}

pub fn normalize(name: &str, mode: NormalizationMode) -> String {
    match mode {
        NormalizationMode::Basic => basic_normalize(name),
        NormalizationMode::Enhanced => enhanced_normalize(name),
    }
}

/// A selection of alternate surface forms a name may appear as, used to
/// widen exact-match lookups before falling back to fuzzy comparison.
pub fn name_variants(name: &str) -> Vec<String> {
    let mut variants = HashSet::new();
    variants.insert(name.to_string());
    variants.insert(name.to_lowercase());
    variants.insert(basic_normalize(name));
    variants.insert(enhanced_normalize(name));
    variants.into_iter().collect()
}

/// Approximates Python's `difflib.SequenceMatcher.ratio()`: `2*M / T` where
/// `M` is the longest-common-subsequence length and `T` is the combined
/// length of both strings.
fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let (m, n) = (a.len(), b.len());
    let mut prev = vec![0usize; n + 1];
    let mut curr = vec![0usize; n + 1];
    for i in 1..=m {
        for j in 1..=n {
            curr[j] = if a[i - 1] == b[j - 1] {
                prev[j - 1] + 1
            } else {
                prev[j].max(curr[j - 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    let lcs = prev[n];
    (2 * lcs) as f64 / (m + n) as f64
}

fn jaccard_tokens(a: &str, b: &str) -> f64 {
    let ta: HashSet<&str> = a.split('_').filter(|s| !s.is_empty()).collect();
    let tb: HashSet<&str> = b.split('_').filter(|s| !s.is_empty()).collect();
    if ta.is_empty() && tb.is_empty() {
        return 1.0;
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// `max(sequence_ratio(a,b), 0.8 * jaccard(tokens(a), tokens(b)))` (§4.4).
/// Inputs are expected to already be normalized.
pub fn name_similarity(normalized_a: &str, normalized_b: &str) -> f64 {
    let ratio = sequence_ratio(normalized_a, normalized_b);
    let jaccard = 0.8 * jaccard_tokens(normalized_a, normalized_b);
    ratio.max(jaccard)
}

pub fn is_likely_same_entity(normalized_a: &str, normalized_b: &str, threshold: f64) -> bool {
    if is_compound_pair(normalized_a, normalized_b) {
        return false;
    }
    name_similarity(normalized_a, normalized_b) >= threshold
}

/// Compound-name guard: one token set is a strict subset of the other's and
/// the length difference is >= 2, e.g. `"bmo"` vs `"bmo corporate travel"` (§4.4, §8 boundary).
pub fn is_compound_pair(normalized_a: &str, normalized_b: &str) -> bool {
    let ta: HashSet<&str> = normalized_a.split('_').filter(|s| !s.is_empty()).collect();
    let tb: HashSet<&str> = normalized_b.split('_').filter(|s| !s.is_empty()).collect();
    if ta.is_empty() || tb.is_empty() || ta == tb {
        return false;
    }
    let (smaller, larger) = if ta.len() < tb.len() { (&ta, &tb) } else { (&tb, &ta) };
    let is_subset = smaller.iter().all(|t| larger.contains(t));
    let length_diff = (normalized_a.len() as i64 - normalized_b.len() as i64).abs();
    is_subset && length_diff >= 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_is_deterministic() {
        let a = entity_id("john_smith", "T");
        let b = entity_id("john_smith", "T");
        assert_eq!(a, b);
        let c = entity_id("john_smith", "U");
        assert_ne!(a, c);
    }

    #[test]
    fn edge_id_defaults_relation_to_relates_to() {
        let a = edge_id("s", "t", None, "T");
        let b = edge_id("s", "t", Some("RELATES_TO"), "T");
        assert_eq!(a, b);
    }

    #[test]
    fn basic_normalize_collapses_separators() {
        assert_eq!(basic_normalize("  John   Smith--Jr. "), "john_smith_jr");
        assert_eq!(basic_normalize("Déjà Vu!!"), "dj_vu");
    }

    #[test]
    fn enhanced_normalize_strips_titles_and_suffixes() {
        assert_eq!(enhanced_normalize("Dr. John Smith"), "john_smith");
        assert_eq!(enhanced_normalize("John Smith Jr."), "john_smith");
        // "corp" is a company indicator, stripped before abbreviation
        // expansion ever sees it — it never becomes "corporation".
        assert_eq!(enhanced_normalize("Acme Corp"), "acme");
    }

    #[test]
    fn enhanced_normalize_expands_abbreviations() {
        assert_eq!(enhanced_normalize("Bob Smith"), "robert_smith");
        assert_eq!(enhanced_normalize("Mike Jones"), "michael_jones");
    }

    #[test]
    fn enhanced_normalize_converges_case_variants() {
        let a = enhanced_normalize("Dr. John Smith");
        let b = enhanced_normalize("john smith");
        let c = enhanced_normalize("JOHN SMITH");
        assert_eq!(a, "john_smith");
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn enhanced_normalize_falls_back_when_empty() {
        // All tokens stripped as a title -> falls back to basic normalization.
        assert_eq!(enhanced_normalize("Dr."), basic_normalize("Dr."));
    }

    #[test]
    fn normalize_is_idempotent() {
        for input in ["Dr. John Smith", "BMO Corporate Travel", "  weird -- input_"] {
            let once = enhanced_normalize(input);
            let twice = enhanced_normalize(&once);
            assert_eq!(once, twice);
            let once_b = basic_normalize(input);
            let twice_b = basic_normalize(&once_b);
            assert_eq!(once_b, twice_b);
        }
    }

    #[test]
    fn compound_guard_blocks_bmo_case() {
        let a = basic_normalize("BMO");
        let b = basic_normalize("BMO Corporate Travel");
        assert!(is_compound_pair(&a, &b));
        assert!(!is_likely_same_entity(&a, &b, 0.0));
    }

    #[test]
    fn compound_guard_allows_short_variants() {
        // "Claude" vs "claude" differ only in case; after normalization
        // they're identical, so the compound guard must not fire.
        let a = basic_normalize("Claude");
        let b = basic_normalize("claude");
        assert!(!is_compound_pair(&a, &b));
    }

    #[test]
    fn compound_guard_considers_claude_code_a_compound() {
        let a = basic_normalize("Claude");
        let b = basic_normalize("Claude Code");
        assert!(is_compound_pair(&a, &b));
    }

    #[test]
    fn name_similarity_exact_match_is_one() {
        assert_eq!(name_similarity("john_smith", "john_smith"), 1.0);
    }
}
