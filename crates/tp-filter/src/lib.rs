#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tp_table::{SchemaError, Table};
use tp_types::{NullKind, Scalar};

#[derive(Debug, Error)]
pub enum FilterError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Hashable projection of a scalar for set membership.
///
/// NaN floats collapse onto one key so a NaN value can still be selected
/// or excluded deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CategoryKey {
    Bool(bool),
    Int64(i64),
    FloatBits(u64),
    Utf8(String),
    Date(NaiveDate),
    Null(NullKind),
}

impl From<&Scalar> for CategoryKey {
    fn from(value: &Scalar) -> Self {
        match value {
            Scalar::Bool(v) => Self::Bool(*v),
            Scalar::Int64(v) => Self::Int64(*v),
            Scalar::Float64(v) => Self::FloatBits(if v.is_nan() {
                f64::NAN.to_bits()
            } else {
                v.to_bits()
            }),
            Scalar::Utf8(v) => Self::Utf8(v.clone()),
            Scalar::Date(v) => Self::Date(*v),
            Scalar::Null(kind) => Self::Null(*kind),
        }
    }
}

/// Multi-select filter state: field name to allowed-value set.
///
/// A field absent from the spec is unrestricted. An empty allowed set is
/// a valid constraint no record can satisfy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    constraints: BTreeMap<String, HashSet<CategoryKey>>,
}

impl FilterSpec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Constrain a field to the given values, replacing any prior
    /// constraint on the same field.
    #[must_use]
    pub fn allow(mut self, field: impl Into<String>, values: impl IntoIterator<Item = Scalar>) -> Self {
        let allowed = values
            .into_iter()
            .map(|value| CategoryKey::from(&value))
            .collect();
        self.constraints.insert(field.into(), allowed);
        self
    }

    /// Convenience for the common case of string-valued categories.
    #[must_use]
    pub fn allow_utf8<I, S>(self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values
            .into_iter()
            .map(|value| Scalar::Utf8(value.into()))
            .collect::<Vec<_>>();
        self.allow(field, values)
    }

    #[must_use]
    pub fn is_unrestricted(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn constrained_fields(&self) -> impl Iterator<Item = &str> {
        self.constraints.keys().map(String::as_str)
    }

    #[must_use]
    pub fn allowed(&self, field: &str) -> Option<&HashSet<CategoryKey>> {
        self.constraints.get(field)
    }
}

/// Order-preserving subsequence of rows satisfying every constraint.
///
/// An empty result is a value, never an error; only a constraint on a
/// field the table does not have fails.
pub fn filter(table: &Table, spec: &FilterSpec) -> Result<Table, FilterError> {
    if spec.is_unrestricted() {
        return Ok(table.clone());
    }

    let mut constrained = Vec::with_capacity(spec.constraints.len());
    for (field, allowed) in &spec.constraints {
        constrained.push((table.column(field)?, allowed));
    }

    let positions = (0..table.num_rows())
        .filter(|&row| {
            constrained.iter().all(|(column, allowed)| {
                column
                    .value(row)
                    .is_some_and(|value| allowed.contains(&CategoryKey::from(value)))
            })
        })
        .collect::<Vec<_>>();

    #[cfg(feature = "tracing")]
    tracing::debug!(
        rows_in = table.num_rows(),
        rows_out = positions.len(),
        constrained_fields = spec.constraints.len(),
        "filter pass"
    );

    Ok(table.take_rows(&positions)?)
}

/// Distinct values of a field in first-seen order, suitable as the
/// option list of a multi-select control.
pub fn observed_values(table: &Table, field: &str) -> Result<Vec<Scalar>, FilterError> {
    Ok(table.column(field)?.distinct())
}
