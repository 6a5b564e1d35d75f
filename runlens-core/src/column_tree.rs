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

//! Column tree: the hierarchical namespace of metadata and metric paths
//! observed across a record set, with tri-state selection.
//!
//! Node ids are absolute paths: internal nodes end with `/`
//! (`/metrics/api_calls/`), leaves do not (`/metadata/time_end_utc`), and
//! a leaf may carry numeric sub-selector children such as
//! `/metadata/time_end_utc/max_value`. Selecting a non-leaf selects every
//! leaf below it; selecting a leaf does not select its sub-selectors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entry::MetricsEntry;

const METADATA_PREFIX: &str = "/metadata/";
const METRICS_PREFIX: &str = "/metrics/";

/// Subfields of a field object that are not addressable sub-selectors.
const NON_SUBFIELDS: &[&str] = &["value", "description", "n_genuine"];

/// Selection state of a node in the column tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionState {
    /// Every leaf below this node is selected. For a leaf: the leaf itself
    /// is selected (sub-selectors are tracked separately).
    All,
    /// No leaf below this node is selected.
    None,
    /// Mixed.
    Partial,
}

/// Unit of a table column, for display formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableColumnUnit {
    Timestamp,
    Numerical,
    String,
}

/// A selected column, flattened out of the tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableColumn {
    /// Absolute node id, e.g. `/metrics/api_calls/env_init/count`.
    pub column_id: String,
    /// Display name: the id without its `/metadata/` or `/metrics/` prefix.
    pub name: String,
    pub description: Option<String>,
    pub unit: Option<TableColumnUnit>,
}

/// A node in the column tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnNode {
    pub column_node_id: String,
    pub name: String,
    pub selection_state: SelectionState,
    pub children: Vec<ColumnNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ColumnNode {
    fn new(column_node_id: String, name: String, description: Option<String>) -> Self {
        Self {
            column_node_id,
            name,
            selection_state: SelectionState::None,
            children: Vec::new(),
            description,
        }
    }

    pub fn is_leaf(&self) -> bool {
        !self.column_node_id.ends_with('/')
    }

    pub fn find_node(&self, node_id: &str) -> Option<&ColumnNode> {
        if self.column_node_id == node_id {
            return Some(self);
        }
        self.children
            .iter()
            .find(|c| covers(&c.column_node_id, node_id))
            .and_then(|c| c.find_node(node_id))
    }

    fn find_node_mut(&mut self, node_id: &str) -> Option<&mut ColumnNode> {
        if self.column_node_id == node_id {
            return Some(self);
        }
        self.children
            .iter_mut()
            .find(|c| covers(&c.column_node_id, node_id))
            .and_then(|c| c.find_node_mut(node_id))
    }

    /// Select the nodes with the given ids (subtrees select all their
    /// leaves). Ids not present in the tree select nothing.
    pub fn add_selection<S: AsRef<str>>(&mut self, node_ids: &[S]) {
        for node_id in node_ids {
            if let Some(node) = self.find_node_mut(node_id.as_ref()) {
                node.select();
            }
        }
        self.propagate_selection_states();
    }

    /// Deselect the nodes with the given ids. Within one call sequence,
    /// removals applied after additions win for any leaf touched by both.
    pub fn remove_selection<S: AsRef<str>>(&mut self, node_ids: &[S]) {
        for node_id in node_ids {
            if let Some(node) = self.find_node_mut(node_id.as_ref()) {
                node.deselect();
            }
        }
        self.propagate_selection_states();
    }

    fn select(&mut self) {
        if self.selection_state == SelectionState::All {
            return;
        }
        self.selection_state = SelectionState::All;
        if self.is_leaf() {
            // Sub-selectors must be chosen explicitly.
            return;
        }
        for child in &mut self.children {
            child.select();
        }
    }

    fn deselect(&mut self) {
        if self.selection_state == SelectionState::None {
            return;
        }
        self.selection_state = SelectionState::None;
        for child in &mut self.children {
            child.deselect();
        }
    }

    /// Recompute every node's state bottom-up from its leaf descendants.
    fn propagate_selection_states(&mut self) {
        for child in &mut self.children {
            child.propagate_selection_states();
        }
        self.update_selection_state();
    }

    fn update_selection_state(&mut self) {
        if self.children.is_empty() {
            return;
        }
        if self.is_leaf() && self.selection_state == SelectionState::All {
            // A selected leaf stays fully selected regardless of its
            // sub-selector states.
            return;
        }
        let mut states: Vec<SelectionState> =
            self.children.iter().map(|c| c.selection_state).collect();
        if self.is_leaf() {
            states.push(self.selection_state);
        }
        self.selection_state = if states.iter().all(|s| *s == SelectionState::All) {
            SelectionState::All
        } else if states.iter().all(|s| *s == SelectionState::None) {
            SelectionState::None
        } else {
            SelectionState::Partial
        };
    }

    /// Flatten the selected leaves into column descriptors, in id order.
    /// Units are not populated here; they depend on the record set.
    pub fn get_selection(&self) -> Vec<TableColumn> {
        let mut columns = Vec::new();
        self.collect_selected(&mut columns);
        columns
    }

    fn collect_selected(&self, out: &mut Vec<TableColumn>) {
        if self.selection_state == SelectionState::None {
            return;
        }
        if self.is_leaf() && self.selection_state == SelectionState::All {
            out.push(TableColumn {
                column_id: self.column_node_id.clone(),
                name: display_name(&self.column_node_id),
                description: self.description.clone(),
                unit: None,
            });
        }
        for child in &self.children {
            child.collect_selected(out);
        }
    }
}

/// `candidate` is an ancestor-or-self of `node_id` in path terms.
fn covers(candidate: &str, node_id: &str) -> bool {
    if candidate == node_id {
        return true;
    }
    match node_id.strip_prefix(candidate) {
        Some(rest) => candidate.ends_with('/') || rest.starts_with('/'),
        None => false,
    }
}

fn display_name(column_id: &str) -> String {
    column_id
        .strip_prefix(METADATA_PREFIX)
        .or_else(|| column_id.strip_prefix(METRICS_PREFIX))
        .unwrap_or(column_id)
        .to_string()
}

/// Build the column tree from every field observed across `entries`.
///
/// Descriptions come from the first record that defines a path. Object
/// fields contribute their non-reserved subfields (`min_value`,
/// `max_value`, `n_samples`, ...) as sub-selector leaves.
pub fn build_column_tree(entries: &[MetricsEntry]) -> ColumnNode {
    let mut leaves: BTreeMap<String, ColumnNode> = BTreeMap::new();
    let mut leaf_subfields: BTreeMap<String, BTreeMap<String, ColumnNode>> = BTreeMap::new();

    let mut add_leaf = |key: String, v: &Value| {
        if !leaves.contains_key(&key) {
            let name = key.rsplit('/').next().unwrap_or(&key).to_string();
            let description = match v {
                Value::Object(obj) => obj
                    .get("description")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            };
            leaves.insert(key.clone(), ColumnNode::new(key.clone(), name, description));
            leaf_subfields.insert(key.clone(), BTreeMap::new());
        }
        if let Value::Object(obj) = v {
            let subfields = leaf_subfields.get_mut(&key).unwrap();
            for subfield in obj.keys() {
                if !NON_SUBFIELDS.contains(&subfield.as_str())
                    && !subfields.contains_key(subfield)
                {
                    subfields.insert(
                        subfield.clone(),
                        ColumnNode::new(format!("{key}/{subfield}"), subfield.clone(), None),
                    );
                }
            }
        }
    };

    for entry in entries {
        for (k, v) in &entry.metadata {
            if k == "files" {
                continue;
            }
            add_leaf(format!("{METADATA_PREFIX}{k}"), v);
        }
        for (k, v) in &entry.metrics {
            add_leaf(format!("{METRICS_PREFIX}{k}"), v);
        }
    }

    for (key, subfields) in leaf_subfields {
        if let Some(leaf) = leaves.get_mut(&key) {
            leaf.children = subfields.into_values().collect();
        }
    }

    // Stack of leaves in reverse id order; popping yields ascending ids.
    let mut stack: Vec<ColumnNode> = leaves.into_values().rev().collect();

    let mut root = ColumnNode::new("/".to_string(), "/".to_string(), None);
    build_subtree(&mut root, &mut stack);
    root
}

fn build_subtree(root: &mut ColumnNode, stack: &mut Vec<ColumnNode>) {
    while stack
        .last()
        .is_some_and(|n| n.column_node_id.starts_with(&root.column_node_id))
    {
        let rest = &stack.last().unwrap().column_node_id[root.column_node_id.len()..];
        match rest.split_once('/') {
            None => {
                root.children.push(stack.pop().unwrap());
            }
            Some((segment, _)) => {
                let mut node = ColumnNode::new(
                    format!("{}{}/", root.column_node_id, segment),
                    segment.to_string(),
                    None,
                );
                build_subtree(&mut node, stack);
                root.children.push(node);
            }
        }
    }
}
