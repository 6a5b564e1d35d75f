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

//! The externally visible table shape: a header row plus one row per
//! bucket, each cell carrying display values and tooltip details.

use serde::Serialize;
use serde_json::Value;

use crate::column_tree::{ColumnNode, TableColumn};
use crate::condition::Condition;
use crate::entry::{flatten_values, remove_subfields, FieldMap};
use crate::error::{Error, Result};

/// Sort order for table rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(format!("unknown sort order `{other}`")),
        }
    }
}

/// The sort applied to the table, echoed back in the response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SortedBy {
    pub column_id: String,
    pub sort_order: SortOrder,
}

/// One (row, column) intersection. `values` holds what the grid renders
/// (`value`, `min_value`, `max_value`); `details` carries the column's
/// static metadata plus the per-cell numbers for tooltips.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableCell {
    pub values: FieldMap,
    pub details: FieldMap,
}

impl TableCell {
    pub fn flatten_values(&mut self) {
        flatten_values(&mut self.values);
        flatten_values(&mut self.details);
    }

    pub fn remove_subfields(&mut self, subfields: &[&str]) {
        remove_subfields(&mut self.values, subfields);
        remove_subfields(&mut self.details, subfields);
    }
}

/// An aggregation table. `rows[0]` is the header row; every data row
/// starts with a row-name cell holding the bucket's slice values.
#[derive(Debug, Clone, Serialize)]
pub struct Table {
    pub rows: Vec<Vec<TableCell>>,
    pub column_tree: ColumnNode,
    pub columns: Vec<TableColumn>,
    pub filters: Vec<Condition>,
    pub slices: Vec<Condition>,
    pub slice_recommendations: Vec<String>,
    pub sorted_by: Option<SortedBy>,
}

const HEADER_ROWS: usize = 1;

impl Table {
    /// Sort data rows by a selected column. Missing cells sort last
    /// regardless of direction; numbers sort before strings.
    ///
    /// Fails closed when `column_id` is not among the selected columns —
    /// silently ignoring a sort would reorder rows behind the analyst's
    /// back.
    pub fn sort_rows(&mut self, column_id: &str, sort_order: SortOrder) -> Result<()> {
        let column_index = self
            .columns
            .iter()
            .position(|c| c.column_id == column_id)
            .ok_or_else(|| Error::SortColumnNotFound(column_id.to_string()))?;
        // Account for the row-name cell.
        let cell_index = column_index + 1;

        if self.rows.len() <= HEADER_ROWS {
            self.sorted_by = Some(SortedBy {
                column_id: column_id.to_string(),
                sort_order,
            });
            return Ok(());
        }

        let mut data_rows: Vec<Vec<TableCell>> = self.rows.split_off(HEADER_ROWS);
        data_rows.sort_by(|a, b| {
            let ka = sort_key(a, cell_index);
            let kb = sort_key(b, cell_index);
            compare_keys(&ka, &kb, sort_order)
        });
        self.rows.extend(data_rows);

        self.sorted_by = Some(SortedBy {
            column_id: column_id.to_string(),
            sort_order,
        });
        Ok(())
    }

    pub fn flatten_values(&mut self) {
        for row in &mut self.rows {
            for cell in row {
                cell.flatten_values();
            }
        }
    }

    pub fn remove_subfields(&mut self, subfields: &[&str]) {
        for row in &mut self.rows {
            for cell in row {
                cell.remove_subfields(subfields);
            }
        }
    }

    /// CSV rendering of the visible rows and columns. The row-name cell is
    /// rendered as `key: value` lines, data cells as `value [min, max]`.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        for row in &self.rows {
            let mut fields = Vec::with_capacity(row.len());
            for (i, cell) in row.iter().enumerate() {
                let text = if i == 0 {
                    format_row_name(cell)
                } else {
                    format_cell_values(cell)
                };
                fields.push(csv_escape(&text));
            }
            out.push_str(&fields.join(","));
            out.push_str("\r\n");
        }
        out
    }
}

#[derive(Debug, PartialEq)]
enum SortKey {
    Number(f64),
    Text(String),
    Missing,
}

fn sort_key(row: &[TableCell], cell_index: usize) -> SortKey {
    let Some(cell) = row.get(cell_index) else {
        return SortKey::Missing;
    };
    let value = cell
        .values
        .get("value")
        .or_else(|| cell.values.get("max_value"));
    match value {
        None | Some(Value::Null) => SortKey::Missing,
        Some(Value::Number(n)) => n
            .as_f64()
            .map_or(SortKey::Missing, SortKey::Number),
        Some(Value::String(s)) => SortKey::Text(s.clone()),
        Some(other) => SortKey::Text(other.to_string()),
    }
}

fn compare_keys(a: &SortKey, b: &SortKey, order: SortOrder) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    let rank = |k: &SortKey| match k {
        SortKey::Number(_) => 0u8,
        SortKey::Text(_) => 1,
        SortKey::Missing => 2,
    };
    let by_rank = rank(a).cmp(&rank(b));
    if by_rank != Ordering::Equal {
        // Kind buckets are fixed; direction only applies within a kind.
        return by_rank;
    }
    let ord = match (a, b) {
        (SortKey::Number(x), SortKey::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (SortKey::Text(x), SortKey::Text(y)) => x.cmp(y),
        _ => Ordering::Equal,
    };
    match order {
        SortOrder::Asc => ord,
        SortOrder::Desc => ord.reverse(),
    }
}

/// `key: value` per line, skipping empty values.
fn format_row_name(cell: &TableCell) -> String {
    let mut items = Vec::new();
    for (k, v) in &cell.values {
        if v.is_null() {
            continue;
        }
        let text = crate::value::value_to_string(v);
        if text.is_empty() {
            continue;
        }
        items.push(format!("{k}: {text}"));
    }
    items.join("\n")
}

fn format_cell_values(cell: &TableCell) -> String {
    let mut text = String::new();
    if let Some(v) = cell.values.get("value") {
        if !v.is_null() {
            text = crate::value::value_to_string(v);
        }
    }
    let min_v = cell.values.get("min_value").filter(|v| !v.is_null());
    let max_v = cell.values.get("max_value").filter(|v| !v.is_null());
    if let (Some(min_v), Some(max_v)) = (min_v, max_v) {
        let range = format!(
            "[{}, {}]",
            crate::value::value_to_string(min_v),
            crate::value::value_to_string(max_v)
        );
        if text.is_empty() {
            text = range;
        } else {
            text = format!("{text} {range}");
        }
    }
    text
}

fn csv_escape(field: &str) -> String {
    if field.contains(['"', ',', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column_tree::build_column_tree;
    use serde_json::json;

    fn cell(values: Value) -> TableCell {
        TableCell {
            values: serde_json::from_value(values).unwrap(),
            details: FieldMap::new(),
        }
    }

    fn test_table() -> Table {
        let columns = vec![TableColumn {
            column_id: "/metrics/lat".to_string(),
            name: "lat".to_string(),
            description: None,
            unit: None,
        }];
        let header = vec![cell(json!({})), cell(json!({"value": "lat"}))];
        let rows = vec![
            header,
            vec![cell(json!({"agent_name": "a"})), cell(json!({"value": 2.0}))],
            vec![cell(json!({"agent_name": "b"})), cell(json!({"value": 10.0}))],
            vec![cell(json!({"agent_name": "c"})), cell(json!({}))],
            vec![cell(json!({"agent_name": "d"})), cell(json!({"value": 1.0}))],
        ];
        Table {
            rows,
            column_tree: build_column_tree(&[]),
            columns,
            filters: Vec::new(),
            slices: Vec::new(),
            slice_recommendations: Vec::new(),
            sorted_by: None,
        }
    }

    fn row_agents(table: &Table) -> Vec<String> {
        table.rows[HEADER_ROWS..]
            .iter()
            .map(|r| r[0].values.get("agent_name").unwrap().as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn sorts_desc_with_missing_last() {
        let mut table = test_table();
        table.sort_rows("/metrics/lat", SortOrder::Desc).unwrap();
        assert_eq!(row_agents(&table), vec!["b", "a", "d", "c"]);
        assert_eq!(
            table.sorted_by,
            Some(SortedBy {
                column_id: "/metrics/lat".to_string(),
                sort_order: SortOrder::Desc
            })
        );
    }

    #[test]
    fn sorts_asc_with_missing_still_last() {
        let mut table = test_table();
        table.sort_rows("/metrics/lat", SortOrder::Asc).unwrap();
        assert_eq!(row_agents(&table), vec!["d", "a", "b", "c"]);
    }

    #[test]
    fn unknown_sort_column_fails_closed() {
        let mut table = test_table();
        let err = table.sort_rows("/metrics/nope", SortOrder::Asc).unwrap_err();
        assert_eq!(err, Error::SortColumnNotFound("/metrics/nope".to_string()));
        assert!(table.sorted_by.is_none());
    }

    #[test]
    fn falls_back_to_max_value_for_summarized_cells() {
        let mut table = test_table();
        table.rows[3][1] = cell(json!({"max_value": 100.0}));
        table.sort_rows("/metrics/lat", SortOrder::Desc).unwrap();
        assert_eq!(row_agents(&table), vec!["c", "b", "a", "d"]);
    }

    #[test]
    fn csv_rendering() {
        let mut table = test_table();
        table.rows.truncate(3);
        table.rows[1][1] = cell(json!({"value": 2.0, "min_value": 1.0, "max_value": 3.0}));
        let csv = table.to_csv();
        let lines: Vec<&str> = csv.trim_end().split("\r\n").collect();
        assert_eq!(lines[0], ",lat");
        assert_eq!(lines[1], "agent_name: a,\"2.0 [1.0, 3.0]\"");
        assert_eq!(lines[2], "agent_name: b,10.0");
    }

    #[test]
    fn csv_escapes_embedded_quotes_and_newlines() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_escape("two\nlines"), "\"two\nlines\"");
    }
}
