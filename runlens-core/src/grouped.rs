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

//! Grouped log listing shapes for the logs API.

use serde::Serialize;

use crate::entry::MetricsEntry;

/// One group of runs sharing a group-key combination, with a synthetic
/// aggregate entry summarizing the group.
#[derive(Debug, Clone, Serialize)]
pub struct GroupedMetrics {
    pub aggr_entry: MetricsEntry,
    pub entries: Vec<MetricsEntry>,
}

/// The logs listing: groups in reverse chronological order plus group
/// recommendations.
#[derive(Debug, Clone, Serialize)]
pub struct GroupedMetricsList {
    pub groups: Vec<GroupedMetrics>,
    pub group_recommendations: Vec<String>,
}
