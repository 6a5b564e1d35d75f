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

//! Error types for the query engine.

use thiserror::Error;

/// Errors surfaced to callers of the engine.
///
/// Unknown field or column names are deliberately not errors: a filter on a
/// field no record defines simply never matches, and a column selection for
/// a path absent from the current record set selects nothing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// A filter string could not be parsed. The offending input is echoed
    /// back so the caller can show it to the analyst.
    #[error("invalid filter syntax in `{input}`: {reason}")]
    InvalidFilterSyntax { input: String, reason: String },

    /// A slice/group string could not be parsed.
    #[error("invalid slice syntax in `{input}`: {reason}")]
    InvalidSliceSyntax { input: String, reason: String },

    /// A sort was requested on a column that is not part of the current
    /// selection. Fails closed: silently ignoring the sort would change row
    /// order without telling the analyst.
    #[error("sort column not found: `{0}`")]
    SortColumnNotFound(String),

    /// Time-series window width must be a positive number of milliseconds.
    #[error("time granulation must be positive, got {0}")]
    InvalidTimeGranulation(i64),
}

impl Error {
    /// Reinterpret a filter-syntax error as a slice-syntax error. Slice
    /// strings share the filter grammar but are reported separately.
    pub(crate) fn into_slice_error(self) -> Error {
        match self {
            Error::InvalidFilterSyntax { input, reason } => {
                Error::InvalidSliceSyntax { input, reason }
            }
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
