//! Ranked product-name matching.
//!
//! Tiers, best first: exact normalized equality, prefix, token subset, fuzzy.
//! Within a tier candidates are ordered by score, then by catalog order.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use sheetkeeper_schema::normalize_text;

/// Minimum Jaro-Winkler similarity for a fuzzy match.
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.85;
/// Minimum token Jaccard overlap for a fuzzy match.
pub const DEFAULT_OVERLAP_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Fuzzy,
    TokenSubset,
    Prefix,
    Exact,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchPolicy {
    pub fuzzy_threshold: f64,
    pub overlap_threshold: f64,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
        }
    }
}

/// A name prepared for matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameKey {
    normalized: String,
    tokens: BTreeSet<String>,
}

impl NameKey {
    pub fn new(raw: &str) -> Self {
        Self::from_normalized(normalize_text(raw))
    }

    pub fn from_normalized(normalized: String) -> Self {
        let tokens = normalized.split(' ').filter(|t| !t.is_empty()).map(str::to_string).collect();
        Self { normalized, tokens }
    }

    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.normalized
    }
}

/// How well one catalog name matches a query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchScore {
    pub tier: MatchTier,
    /// Similarity in `[0, 1]`; `1.0` for exact matches.
    pub score: f64,
}

impl MatchScore {
    /// Best-first ordering: higher tier, then higher score.
    pub fn rank_cmp(&self, other: &MatchScore) -> Ordering {
        other
            .tier
            .cmp(&self.tier)
            .then_with(|| other.score.total_cmp(&self.score))
    }

    /// Whether two matches are indistinguishable for resolution purposes.
    pub fn ties_with(&self, other: &MatchScore) -> bool {
        match (self.tier, other.tier) {
            (MatchTier::Fuzzy, MatchTier::Fuzzy) => (self.score - other.score).abs() < f64::EPSILON,
            (a, b) => a == b,
        }
    }
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Score `name` against `query`, or `None` when it clears no tier.
pub fn score(query: &NameKey, name: &NameKey, policy: &MatchPolicy) -> Option<MatchScore> {
    if query.is_empty() || name.is_empty() {
        return None;
    }

    if query.normalized == name.normalized {
        return Some(MatchScore {
            tier: MatchTier::Exact,
            score: 1.0,
        });
    }

    if name.normalized.starts_with(&query.normalized) {
        return Some(MatchScore {
            tier: MatchTier::Prefix,
            score: query.normalized.len() as f64 / name.normalized.len() as f64,
        });
    }

    let overlap = jaccard(&query.tokens, &name.tokens);
    if query.tokens.is_subset(&name.tokens) || name.tokens.is_subset(&query.tokens) {
        return Some(MatchScore {
            tier: MatchTier::TokenSubset,
            score: overlap,
        });
    }

    let similarity = strsim::jaro_winkler(&query.normalized, &name.normalized);
    if similarity >= policy.fuzzy_threshold || overlap >= policy.overlap_threshold {
        return Some(MatchScore {
            tier: MatchTier::Fuzzy,
            score: similarity.max(overlap),
        });
    }

    None
}
