// Copyright 2025 Runlens Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Slice / group recommendations.
//!
//! Candidates are metadata fields that would actually partition the
//! filtered record set: more than one distinct value, but fewer than one
//! per record (a constant field groups nothing, an all-unique field
//! explodes the table). Fields already used as a slice, group, or filter
//! target are excluded. The same algorithm serves the table's slice
//! recommendations and the logs API's group recommendations.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::categorize::MetadataStats;
use crate::condition::Condition;

/// Strategy for ordering (or suppressing) recommendations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupsRecommendationStrategy {
    None,
    /// Alphabetical candidate order.
    FirstAlphabetical,
    /// Fields producing fewer, denser rows first: ascending distinct-value
    /// count, ties broken alphabetically.
    #[default]
    Concise,
}

impl GroupsRecommendationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupsRecommendationStrategy::None => "none",
            GroupsRecommendationStrategy::FirstAlphabetical => "first_alphabetical",
            GroupsRecommendationStrategy::Concise => "concise",
        }
    }
}

impl std::str::FromStr for GroupsRecommendationStrategy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "first_alphabetical" => Ok(Self::FirstAlphabetical),
            "concise" => Ok(Self::Concise),
            other => Err(format!("unknown recommendation strategy `{other}`")),
        }
    }
}

/// Recommend additional slice/group fields given the field statistics of
/// the filtered record set and the conditions already in play.
pub fn recommend_groups(
    stats: &MetadataStats,
    current: &[Condition],
    strategy: GroupsRecommendationStrategy,
) -> Vec<String> {
    if strategy == GroupsRecommendationStrategy::None {
        return Vec::new();
    }

    let taken: BTreeSet<&str> = current.iter().map(|c| c.field_name.as_str()).collect();
    // BTreeMap iteration keeps candidates alphabetical.
    let mut candidates: Vec<(&String, usize)> = stats
        .fields
        .iter()
        .filter(|(name, field)| {
            !taken.contains(name.as_str())
                && field.distinct > 1
                && field.distinct < stats.record_count
        })
        .map(|(name, field)| (name, field.distinct))
        .collect();

    if strategy == GroupsRecommendationStrategy::Concise {
        candidates.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
    }

    candidates.into_iter().map(|(name, _)| name.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorize::analyze_metadata;
    use crate::condition::parse_conditions;
    use crate::entry::MetricsEntry;
    use serde_json::json;

    fn entries() -> Vec<MetricsEntry> {
        // 4 records: `model` has 3 distinct values, `runner` 2,
        // `agent_name` is constant, `run_id` all-unique.
        [
            ("m-1", "local", "a"),
            ("m-2", "local", "b"),
            ("m-3", "hub", "c"),
            ("m-1", "hub", "d"),
        ]
        .iter()
        .map(|(model, runner, run_id)| {
            serde_json::from_value(json!({
                "metadata": {
                    "agent_name": "navigator",
                    "model": model,
                    "runner": runner,
                    "run_id": run_id,
                },
                "metrics": {}
            }))
            .unwrap()
        })
        .collect()
    }

    #[test]
    fn pool_excludes_constant_and_unique_fields() {
        let stats = analyze_metadata(&entries());
        let recs = recommend_groups(&stats, &[], GroupsRecommendationStrategy::FirstAlphabetical);
        assert_eq!(recs, vec!["model", "runner"]);
    }

    #[test]
    fn concise_prefers_fewer_distinct_values() {
        let stats = analyze_metadata(&entries());
        let recs = recommend_groups(&stats, &[], GroupsRecommendationStrategy::Concise);
        assert_eq!(recs, vec!["runner", "model"]);
    }

    #[test]
    fn current_targets_are_excluded() {
        let stats = analyze_metadata(&entries());
        let current = parse_conditions("runner:in:local").unwrap();
        let recs = recommend_groups(&stats, &current, GroupsRecommendationStrategy::Concise);
        assert_eq!(recs, vec!["model"]);
    }

    #[test]
    fn none_strategy_is_empty() {
        let stats = analyze_metadata(&entries());
        assert!(recommend_groups(&stats, &[], GroupsRecommendationStrategy::None).is_empty());
    }

    #[test]
    fn deterministic_across_calls() {
        let stats = analyze_metadata(&entries());
        let a = recommend_groups(&stats, &[], GroupsRecommendationStrategy::Concise);
        let b = recommend_groups(&stats, &[], GroupsRecommendationStrategy::Concise);
        assert_eq!(a, b);
    }
}
