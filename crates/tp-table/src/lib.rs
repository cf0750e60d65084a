#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tp_columnar::{Column, ColumnError};
use tp_types::{DType, Granularity, Scalar};

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("unknown field: {field}")]
    UnknownField { field: String },
    #[error("field {field} has dtype {found:?} but the operation requires {expected}")]
    WrongDtype {
        field: String,
        expected: &'static str,
        found: DType,
    },
    #[error("duplicate field name: {field}")]
    DuplicateField { field: String },
    #[error("field {field} has length {column_len} but the table has {num_rows} rows")]
    LengthMismatch {
        field: String,
        column_len: usize,
        num_rows: usize,
    },
    #[error(transparent)]
    Column(#[from] ColumnError),
}

/// Named equal-length columns over positional rows.
///
/// Field order is the caller's (for CSV data, file order). Tables are
/// immutable; every operation returns a new table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    num_rows: usize,
    fields: Vec<String>,
    columns: BTreeMap<String, Column>,
}

impl Table {
    pub fn new(columns: Vec<(String, Column)>) -> Result<Self, SchemaError> {
        let num_rows = columns.first().map_or(0, |(_, column)| column.len());

        let mut fields = Vec::with_capacity(columns.len());
        let mut by_name = BTreeMap::new();
        for (field, column) in columns {
            if column.len() != num_rows {
                return Err(SchemaError::LengthMismatch {
                    field,
                    column_len: column.len(),
                    num_rows,
                });
            }
            if by_name.insert(field.clone(), column).is_some() {
                return Err(SchemaError::DuplicateField { field });
            }
            fields.push(field);
        }

        Ok(Self {
            num_rows,
            fields,
            columns: by_name,
        })
    }

    #[must_use]
    pub fn empty() -> Self {
        Self {
            num_rows: 0,
            fields: Vec::new(),
            columns: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    /// Field names in original (file) order.
    #[must_use]
    pub fn field_names(&self) -> &[String] {
        &self.fields
    }

    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.columns.contains_key(field)
    }

    pub fn column(&self, field: &str) -> Result<&Column, SchemaError> {
        self.columns.get(field).ok_or_else(|| SchemaError::UnknownField {
            field: field.to_owned(),
        })
    }

    /// Positional row subset preserving the order of `positions`.
    pub fn take_rows(&self, positions: &[usize]) -> Result<Self, SchemaError> {
        let mut columns = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let column = self.column(field)?;
            columns.push((field.clone(), column.take(positions)?));
        }
        Self::new(columns)
    }

    /// Replace an existing field or append a new one.
    pub fn with_column(&self, field: impl Into<String>, column: Column) -> Result<Self, SchemaError> {
        let field = field.into();
        if column.len() != self.num_rows {
            return Err(SchemaError::LengthMismatch {
                field,
                column_len: column.len(),
                num_rows: self.num_rows,
            });
        }

        let mut out = self.clone();
        if out.columns.insert(field.clone(), column).is_none() {
            out.fields.push(field);
        }
        Ok(out)
    }

    /// Add the derived period field for a date column, e.g.
    /// `"Order Date (month)"` holding `"2016-11"` labels.
    ///
    /// Deriving the same granularity again recomputes the same labels, so
    /// the operation is idempotent. Missing dates yield missing labels;
    /// any non-date value fails with `SchemaError`.
    pub fn derive_period(
        &self,
        date_field: &str,
        granularity: Granularity,
    ) -> Result<Self, SchemaError> {
        let source = self.column(date_field)?;
        if !matches!(source.dtype(), DType::Date | DType::Null) {
            return Err(SchemaError::WrongDtype {
                field: date_field.to_owned(),
                expected: "a date-valued field",
                found: source.dtype(),
            });
        }

        let labels = source
            .values()
            .iter()
            .map(|value| {
                if value.is_missing() {
                    return Ok(Scalar::Null(tp_types::NullKind::Null));
                }
                let date = value.as_date().map_err(|_| SchemaError::WrongDtype {
                    field: date_field.to_owned(),
                    expected: "a date-valued field",
                    found: value.dtype(),
                })?;
                Ok(Scalar::Utf8(granularity.label(date)))
            })
            .collect::<Result<Vec<_>, SchemaError>>()?;

        let column = Column::new(DType::Utf8, labels)?;
        self.with_column(period_field_name(date_field, granularity), column)
    }
}

/// Name of the column `derive_period` produces for a date field.
#[must_use]
pub fn period_field_name(date_field: &str, granularity: Granularity) -> String {
    format!("{date_field} ({})", granularity.as_str())
}
