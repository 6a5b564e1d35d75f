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

//! Local-files record layout: one directory per run holding a
//! `metrics.json` (`{"metadata": {...}, "metrics": {...}}`) plus the log
//! files listed under `metadata.files`.

use std::fs;
use std::path::Path;

use serde_json::Value;

use runlens_core::{LogFile, MetricsEntry};

use crate::{Result, StorageError};

const METRICS_FILE: &str = "metrics.json";

/// Load one run from its directory. The directory name becomes the entry
/// name. Log-file contents are read only when `include_log_files` is set.
pub fn load_entry_from_dir(entry_path: &Path, include_log_files: bool) -> Result<MetricsEntry> {
    let metrics_json = entry_path.join(METRICS_FILE);
    let raw = fs::read_to_string(&metrics_json)?;
    let mut entry: MetricsEntry =
        serde_json::from_str(&raw).map_err(|source| StorageError::MalformedEntry {
            path: metrics_json,
            source,
        })?;
    entry.name = entry_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if include_log_files {
        entry.log_files = load_log_files(entry_path, &entry);
    }
    Ok(entry)
}

/// Read the log files referenced from `metadata.files`. Missing or
/// unreadable files are skipped with a warning; a run with a stale file
/// list is still worth showing.
fn load_log_files(entry_path: &Path, entry: &MetricsEntry) -> Vec<LogFile> {
    let Some(Value::Array(files)) = entry.metadata.get("files") else {
        return Vec::new();
    };
    let mut log_files = Vec::with_capacity(files.len());
    for file in files {
        let Some(filename) = file.get("filename").and_then(Value::as_str) else {
            tracing::warn!(entry = %entry.name, "file reference without filename");
            continue;
        };
        let description = file
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);
        let path = entry_path.join(filename);
        match fs::read_to_string(&path) {
            Ok(content) => log_files.push(LogFile {
                filename: filename.to_string(),
                description,
                content: Some(content),
            }),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable log file");
            }
        }
    }
    log_files
}

/// Load every run found under `logs_dir`, sorted by entry name.
///
/// Subdirectories without a `metrics.json`, and entries that fail to
/// parse, are skipped with a warning rather than failing the whole load —
/// one bad run must not take down every query.
pub fn load_entries_from_dir(logs_dir: &Path, include_log_files: bool) -> Result<Vec<MetricsEntry>> {
    if !logs_dir.is_dir() {
        return Err(StorageError::DirNotFound(logs_dir.to_path_buf()));
    }

    let mut entries = Vec::new();
    for dir_entry in fs::read_dir(logs_dir)? {
        let dir_entry = dir_entry?;
        let path = dir_entry.path();
        if !path.is_dir() {
            continue;
        }
        if !path.join(METRICS_FILE).is_file() {
            tracing::warn!(path = %path.display(), "no metrics.json, skipping");
            continue;
        }
        match load_entry_from_dir(&path, include_log_files) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unloadable entry");
            }
        }
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_run(dir: &Path, name: &str, payload: &str) {
        let run_dir = dir.join(name);
        fs::create_dir_all(&run_dir).unwrap();
        let mut f = fs::File::create(run_dir.join(METRICS_FILE)).unwrap();
        f.write_all(payload.as_bytes()).unwrap();
    }

    #[test]
    fn loads_runs_and_names_them_after_directories() {
        let tmp = TempDir::new().unwrap();
        write_run(
            tmp.path(),
            "run-b",
            r#"{"metadata": {"agent_name": "beta"}, "metrics": {"lat": {"value": 2.0}}}"#,
        );
        write_run(
            tmp.path(),
            "run-a",
            r#"{"metadata": {"agent_name": "alpha"}, "metrics": {}}"#,
        );
        let entries = load_entries_from_dir(tmp.path(), false).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "run-a");
        assert_eq!(entries[1].name, "run-b");
        assert_eq!(
            entries[1].fetch_value("lat"),
            Some(&json!(2.0))
        );
    }

    #[test]
    fn skips_malformed_and_incomplete_runs() {
        let tmp = TempDir::new().unwrap();
        write_run(tmp.path(), "good", r#"{"metadata": {}, "metrics": {}}"#);
        write_run(tmp.path(), "bad", "{not json");
        fs::create_dir_all(tmp.path().join("empty")).unwrap();
        let entries = load_entries_from_dir(tmp.path(), false).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "good");
    }

    #[test]
    fn missing_dir_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        assert!(matches!(
            load_entries_from_dir(&missing, false),
            Err(StorageError::DirNotFound(_))
        ));
    }

    #[test]
    fn loads_referenced_log_files_on_demand() {
        let tmp = TempDir::new().unwrap();
        write_run(
            tmp.path(),
            "run-a",
            r#"{"metadata": {"files": [
                {"filename": "agent.log", "description": "agent output"},
                {"filename": "missing.log"}
            ]}, "metrics": {}}"#,
        );
        fs::write(tmp.path().join("run-a/agent.log"), "line one\n").unwrap();

        let without = load_entries_from_dir(tmp.path(), false).unwrap();
        assert!(without[0].log_files.is_empty());

        let with = load_entries_from_dir(tmp.path(), true).unwrap();
        assert_eq!(with[0].log_files.len(), 1);
        assert_eq!(with[0].log_files[0].filename, "agent.log");
        assert_eq!(
            with[0].log_files[0].description.as_deref(),
            Some("agent output")
        );
        assert_eq!(with[0].log_files[0].content.as_deref(), Some("line one\n"));
    }
}
