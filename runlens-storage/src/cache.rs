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

//! Snapshot store over the local-files layout.
//!
//! Queries are side-effect-free passes over an immutable record set, so
//! the store hands out cloned snapshots: a query never observes a reload
//! mid-flight. Loaded snapshots are cached with a short TTL to keep
//! repeated dashboard queries off the disk.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;

use runlens_core::MetricsEntry;

use crate::local::load_entries_from_dir;
use crate::Result;

/// Store of run records under one metrics directory.
pub struct MetricsStore {
    metrics_dir: PathBuf,
    // Keyed by include_log_files: the logs path needs file contents, the
    // table paths should not pay for them.
    snapshots: Cache<bool, Arc<Vec<MetricsEntry>>>,
}

impl MetricsStore {
    pub fn new(metrics_dir: PathBuf, cache_ttl: Duration) -> Self {
        let snapshots = Cache::builder()
            .max_capacity(2)
            .time_to_live(cache_ttl)
            .build();
        Self {
            metrics_dir,
            snapshots,
        }
    }

    pub fn metrics_dir(&self) -> &PathBuf {
        &self.metrics_dir
    }

    /// A consistent snapshot of all runs, cloned for the caller to own.
    pub fn load_entries(&self, include_log_files: bool) -> Result<Vec<MetricsEntry>> {
        if let Some(snapshot) = self.snapshots.get(&include_log_files) {
            tracing::debug!(entries = snapshot.len(), "serving cached snapshot");
            return Ok(snapshot.as_ref().clone());
        }
        let entries = load_entries_from_dir(&self.metrics_dir, include_log_files)?;
        tracing::info!(
            dir = %self.metrics_dir.display(),
            entries = entries.len(),
            include_log_files,
            "loaded metrics entries"
        );
        let snapshot = Arc::new(entries);
        self.snapshots.insert(include_log_files, snapshot.clone());
        Ok(snapshot.as_ref().clone())
    }

    /// Drop cached snapshots; the next load reads from disk.
    pub fn invalidate(&self) {
        self.snapshots.invalidate_all();
    }
}
