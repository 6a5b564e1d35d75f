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

//! Runlens CLI
//!
//! Command-line interface for slicing agent-run metrics without the
//! service: aggregation tables, grouped log listings, and time series
//! over a local metrics directory.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

use runlens_core::{
    create_logs_list, create_moving_aggregation, create_table, AbsentMetricsStrategy,
    GroupsRecommendationStrategy, LogsParams, MovingAggregationParams, PruneMode, SortOrder,
    TableParams, TimeSeriesOutcome, DEFAULT_TIME_FIELD,
};
use runlens_storage::load_entries_from_dir;

#[derive(Parser)]
#[command(name = "runlens")]
#[command(about = "Runlens - agent-run metrics analytics", long_about = None)]
struct Cli {
    /// Metrics directory (one subdirectory per run)
    #[arg(short = 'd', long, default_value = "./metrics-data")]
    metrics_dir: PathBuf,

    /// Verbose mode
    #[arg(short, long)]
    verbose: bool,

    /// Output as JSON (machine-readable)
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an aggregation table
    Table {
        /// Filter condition, e.g. "runner:not_in:local" (repeatable)
        #[arg(short, long = "filter")]
        filters: Vec<String>,

        /// Slice condition, e.g. "agent_name" (repeatable)
        #[arg(short, long = "slice")]
        slices: Vec<String>,

        /// Column selection, e.g. "/metrics/" (repeatable)
        #[arg(short = 'c', long = "column", default_values_t = vec![String::from("/metrics/")])]
        columns: Vec<String>,

        /// Column id to sort by
        #[arg(long)]
        sort_by: Option<String>,

        /// Sort order: asc or desc
        #[arg(long, default_value = "desc")]
        sort_order: String,

        /// Prune mode: none, all, or column
        #[arg(long, default_value = "column")]
        prune_mode: String,

        /// Absent-metrics strategy: nullify, accept_subset, or
        /// all_or_nothing
        #[arg(long, default_value = "all_or_nothing")]
        absent_metrics: String,

        /// Write the table as CSV to this path instead of stdout
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// List runs grouped by metadata fields
    Logs {
        /// Filter condition (repeatable)
        #[arg(short, long = "filter")]
        filters: Vec<String>,

        /// Group condition (repeatable)
        #[arg(short, long = "group")]
        groups: Vec<String>,

        /// Prune mode: none, all, or column
        #[arg(long, default_value = "all")]
        prune_mode: String,
    },

    /// Compute a time-bucketed series for one field
    Timeseries {
        /// Window width in milliseconds
        #[arg(long, default_value = "86400000")]
        granulation: i64,

        /// Field (or sub-selector) reduced per window
        field: String,

        /// Global filter condition (repeatable)
        #[arg(short, long = "filter")]
        filters: Vec<String>,

        /// Per-window filter condition (repeatable)
        #[arg(long = "moving-filter")]
        moving_filters: Vec<String>,

        /// Field producing one series per distinct value
        #[arg(long)]
        slice_field: Option<String>,

        /// Timestamp field used for bucketing
        #[arg(long, default_value = DEFAULT_TIME_FIELD)]
        time_field: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "runlens=debug" } else { "runlens=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .init();

    match cli.command {
        Commands::Table {
            filters,
            slices,
            columns,
            sort_by,
            sort_order,
            prune_mode,
            absent_metrics,
            csv,
        } => {
            let entries = load_entries_from_dir(&cli.metrics_dir, false)
                .with_context(|| format!("loading {}", cli.metrics_dir.display()))?;
            let sort_order =
                SortOrder::from_str(&sort_order).map_err(anyhow::Error::msg)?;
            let params = TableParams {
                filters,
                slices,
                column_selections: columns,
                sort_by: sort_by.map(|column| (column, sort_order)),
                prune_mode: PruneMode::from_str(&prune_mode).map_err(anyhow::Error::msg)?,
                absent_metrics_strategy: AbsentMetricsStrategy::from_str(&absent_metrics)
                    .map_err(anyhow::Error::msg)?,
                slices_recommendation_strategy: GroupsRecommendationStrategy::None,
            };
            let table = create_table(entries, &params, &[], &[])?;
            match csv {
                Some(path) => {
                    std::fs::write(&path, table.to_csv())
                        .with_context(|| format!("writing {}", path.display()))?;
                    tracing::info!(path = %path.display(), "wrote CSV");
                }
                None if cli.json => println!("{}", serde_json::to_string_pretty(&table)?),
                None => print!("{}", table.to_csv()),
            }
        }

        Commands::Logs {
            filters,
            groups,
            prune_mode,
        } => {
            let entries = load_entries_from_dir(&cli.metrics_dir, true)
                .with_context(|| format!("loading {}", cli.metrics_dir.display()))?;
            let params = LogsParams {
                filters,
                groups,
                prune_mode: PruneMode::from_str(&prune_mode).map_err(anyhow::Error::msg)?,
                groups_recommendation_strategy: GroupsRecommendationStrategy::None,
            };
            let list = create_logs_list(entries, &params)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&list)?);
            } else {
                for group in &list.groups {
                    println!("== {}", group.aggr_entry.name);
                    for entry in &group.entries {
                        let time = entry
                            .fetch_value(DEFAULT_TIME_FIELD)
                            .map(runlens_core::value::value_to_string)
                            .unwrap_or_default();
                        println!("  {}  {}", time, entry.name);
                    }
                }
            }
        }

        Commands::Timeseries {
            granulation,
            field,
            filters,
            moving_filters,
            slice_field,
            time_field,
        } => {
            let entries = load_entries_from_dir(&cli.metrics_dir, false)
                .with_context(|| format!("loading {}", cli.metrics_dir.display()))?;
            let params = MovingAggregationParams {
                time_granulation: granulation,
                field_name: field,
                global_filters: filters,
                moving_filters,
                slice_field: slice_field.unwrap_or_default(),
                time_field,
            };
            match create_moving_aggregation(entries, &params)? {
                TimeSeriesOutcome::Series(series) => {
                    println!("{}", serde_json::to_string_pretty(&series)?);
                }
                TimeSeriesOutcome::TooManyLines { line_count, limit } => {
                    anyhow::bail!(
                        "slicing would draw {line_count} lines (limit {limit}); narrow the filters or drop the slice"
                    );
                }
            }
        }
    }

    Ok(())
}
