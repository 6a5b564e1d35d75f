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

//! Runlens core: the query and aggregation engine over per-run agent
//! metrics records.
//!
//! Every query is one synchronous, side-effect-free pass over an immutable
//! record set supplied by the storage collaborator: filter, partition into
//! buckets, reduce each bucket, prune uninformative columns, and assemble
//! the table / logs / time-series response shapes.

pub mod aggregate;
pub mod categorize;
pub mod column_tree;
pub mod condition;
pub mod entry;
pub mod error;
pub mod grouped;
pub mod moving;
pub mod prune;
pub mod recommend;
pub mod table;
pub mod transform;
pub mod value;

pub use aggregate::{aggregate_entries, partition_entries, AbsentMetricsStrategy, SliceKey};
pub use categorize::{analyze_metadata, MetadataFieldCategory, MetadataStats};
pub use column_tree::{
    build_column_tree, ColumnNode, SelectionState, TableColumn, TableColumnUnit,
};
pub use condition::{
    check_filters_against_entry, filter_entries, parse_condition_list, parse_conditions,
    parse_filter_list, parse_slice_list, Condition, ConditionOperator, ConditionValues,
};
pub use entry::{extract_base_field_name, FieldMap, LogFile, MetricsEntry};
pub use error::{Error, Result};
pub use grouped::{GroupedMetrics, GroupedMetricsList};
pub use moving::{
    create_moving_aggregation, MovingAggregation, MovingAggregationParams, TimeSeriesOutcome,
    DEFAULT_TIME_FIELD, MAX_GRAPH_LINES,
};
pub use prune::{prune_entries, PruneMode};
pub use recommend::{recommend_groups, GroupsRecommendationStrategy};
pub use table::{SortOrder, SortedBy, Table, TableCell};
pub use transform::{
    check_field_presence, create_logs_list, create_table, determine_column_unit, LogsParams,
    TableParams,
};
