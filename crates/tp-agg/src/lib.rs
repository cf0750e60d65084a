#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tp_columnar::Column;
use tp_table::{SchemaError, Table};
use tp_types::{NullKind, Scalar};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduce {
    Sum,
    Mean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupOptions {
    pub dropna: bool,
}

impl Default for GroupOptions {
    fn default() -> Self {
        Self { dropna: true }
    }
}

#[derive(Debug, Error)]
pub enum AggError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// One reduced series per measure field, one entry per distinct group key.
///
/// Keys appear in first-seen row order. Groups with zero contributing
/// records do not appear at all; a view can therefore be empty, which is
/// a value and not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateView {
    group_field: String,
    keys: Vec<Scalar>,
    measures: Vec<MeasureSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureSeries {
    field: String,
    values: Vec<f64>,
}

impl MeasureSeries {
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

impl AggregateView {
    #[must_use]
    pub fn group_field(&self) -> &str {
        &self.group_field
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[must_use]
    pub fn keys(&self) -> &[Scalar] {
        &self.keys
    }

    #[must_use]
    pub fn measures(&self) -> &[MeasureSeries] {
        &self.measures
    }

    pub fn measure(&self, field: &str) -> Result<&[f64], AggError> {
        self.measures
            .iter()
            .find(|series| series.field == field)
            .map(|series| series.values.as_slice())
            .ok_or_else(|| {
                AggError::Schema(SchemaError::UnknownField {
                    field: field.to_owned(),
                })
            })
    }

    /// Reorder entries by the given positions (internal to rank/sort).
    fn reordered(&self, positions: &[usize]) -> Self {
        Self {
            group_field: self.group_field.clone(),
            keys: positions.iter().map(|&idx| self.keys[idx].clone()).collect(),
            measures: self
                .measures
                .iter()
                .map(|series| MeasureSeries {
                    field: series.field.clone(),
                    values: positions.iter().map(|&idx| series.values[idx]).collect(),
                })
                .collect(),
        }
    }
}

/// Group rows by one field and reduce one or more measure fields.
///
/// Missing measure values are skipped; missing group keys are dropped
/// unless `options.dropna` is false, in which case they collapse into a
/// single null group. A non-numeric measure dtype is rejected up front.
pub fn aggregate(
    table: &Table,
    group_field: &str,
    measure_fields: &[&str],
    reduce: Reduce,
    options: GroupOptions,
) -> Result<AggregateView, AggError> {
    let keys = table.column(group_field)?;

    let mut measures = Vec::with_capacity(measure_fields.len());
    for &field in measure_fields {
        let column = table.column(field)?;
        if !column.dtype().is_numeric() {
            return Err(AggError::Schema(SchemaError::WrongDtype {
                field: field.to_owned(),
                expected: "a numeric measure",
                found: column.dtype(),
            }));
        }
        measures.push(column);
    }

    let accumulated =
        match try_aggregate_dense_int64(keys.values(), &measures, options.dropna) {
            Some(accumulated) => accumulated,
            None => aggregate_hashed(keys.values(), &measures, options.dropna),
        };

    #[cfg(feature = "tracing")]
    tracing::debug!(
        rows = table.num_rows(),
        groups = accumulated.keys.len(),
        measures = measure_fields.len(),
        "aggregate pass"
    );

    Ok(accumulated.finalize(group_field, measure_fields, reduce))
}

/// First `n` entries sorted by a measure, stable so ties keep their
/// original grouping order. Fewer than `n` entries returns all of them.
pub fn rank(
    view: &AggregateView,
    measure_field: &str,
    direction: SortDirection,
    n: usize,
) -> Result<AggregateView, AggError> {
    let values = view.measure(measure_field)?;

    let mut positions = (0..values.len()).collect::<Vec<_>>();
    positions.sort_by(|&a, &b| match direction {
        SortDirection::Ascending => values[a].total_cmp(&values[b]),
        SortDirection::Descending => values[b].total_cmp(&values[a]),
    });
    positions.truncate(n);

    Ok(view.reordered(&positions))
}

/// Reorder entries by group key. Trend views use this to turn
/// first-seen order into chronological order of period labels.
#[must_use]
pub fn sort_by_group(view: &AggregateView, direction: SortDirection) -> AggregateView {
    let keys = view.keys();
    let mut positions = (0..keys.len()).collect::<Vec<_>>();
    positions.sort_by(|&a, &b| match direction {
        SortDirection::Ascending => cmp_keys(&keys[a], &keys[b]),
        SortDirection::Descending => cmp_keys(&keys[b], &keys[a]),
    });
    view.reordered(&positions)
}

/// Total order over group keys: within a dtype the natural order, across
/// dtypes a fixed rank so mixed keys still sort deterministically.
fn cmp_keys(left: &Scalar, right: &Scalar) -> Ordering {
    fn dtype_rank(value: &Scalar) -> u8 {
        match value {
            Scalar::Bool(_) => 0,
            Scalar::Int64(_) | Scalar::Float64(_) => 1,
            Scalar::Date(_) => 2,
            Scalar::Utf8(_) => 3,
            Scalar::Null(_) => 4,
        }
    }

    match (left, right) {
        (Scalar::Bool(a), Scalar::Bool(b)) => a.cmp(b),
        (Scalar::Int64(a), Scalar::Int64(b)) => a.cmp(b),
        (Scalar::Float64(a), Scalar::Float64(b)) => a.total_cmp(b),
        (Scalar::Int64(a), Scalar::Float64(b)) => (*a as f64).total_cmp(b),
        (Scalar::Float64(a), Scalar::Int64(b)) => a.total_cmp(&(*b as f64)),
        (Scalar::Date(a), Scalar::Date(b)) => a.cmp(b),
        (Scalar::Utf8(a), Scalar::Utf8(b)) => a.cmp(b),
        _ => dtype_rank(left).cmp(&dtype_rank(right)),
    }
}

/// Per-group running sums and counts, keys in first-seen order.
struct Accumulated {
    keys: Vec<Scalar>,
    sums: Vec<Vec<f64>>,
    counts: Vec<Vec<u64>>,
}

impl Accumulated {
    fn with_capacity(measures: usize) -> Self {
        Self {
            keys: Vec::new(),
            sums: vec![Vec::new(); measures],
            counts: vec![Vec::new(); measures],
        }
    }

    fn push_group(&mut self, key: Scalar) -> usize {
        self.keys.push(key);
        for sums in &mut self.sums {
            sums.push(0.0);
        }
        for counts in &mut self.counts {
            counts.push(0);
        }
        self.keys.len() - 1
    }

    fn add(&mut self, slot: usize, measure: usize, value: &Scalar) {
        if value.is_missing() {
            return;
        }
        if let Ok(v) = value.to_f64() {
            self.sums[measure][slot] += v;
            self.counts[measure][slot] += 1;
        }
    }

    fn finalize(self, group_field: &str, measure_fields: &[&str], reduce: Reduce) -> AggregateView {
        let measures = measure_fields
            .iter()
            .zip(self.sums)
            .zip(self.counts)
            .map(|((&field, sums), counts)| MeasureSeries {
                field: field.to_owned(),
                values: sums
                    .into_iter()
                    .zip(counts)
                    .map(|(sum, count)| match reduce {
                        Reduce::Sum => sum,
                        Reduce::Mean => {
                            if count == 0 {
                                f64::NAN
                            } else {
                                sum / count as f64
                            }
                        }
                    })
                    .collect(),
            })
            .collect();

        AggregateView {
            group_field: group_field.to_owned(),
            keys: self.keys,
            measures,
        }
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum GroupKeyRef<'a> {
    Bool(bool),
    Int64(i64),
    FloatBits(u64),
    Utf8(&'a str),
    Date(NaiveDate),
    Null(NullKind),
}

impl<'a> GroupKeyRef<'a> {
    fn from_scalar(key: &'a Scalar) -> Self {
        match key {
            Scalar::Bool(v) => Self::Bool(*v),
            Scalar::Int64(v) => Self::Int64(*v),
            Scalar::Float64(v) => Self::FloatBits(if v.is_nan() {
                f64::NAN.to_bits()
            } else {
                v.to_bits()
            }),
            Scalar::Utf8(v) => Self::Utf8(v.as_str()),
            Scalar::Date(v) => Self::Date(*v),
            Scalar::Null(kind) => Self::Null(*kind),
        }
    }
}

fn aggregate_hashed(keys: &[Scalar], measures: &[&Column], dropna: bool) -> Accumulated {
    let mut accumulated = Accumulated::with_capacity(measures.len());
    let mut slots = HashMap::<GroupKeyRef<'_>, usize>::new();

    for (row, key) in keys.iter().enumerate() {
        if dropna && key.is_missing() {
            continue;
        }

        let key_id = GroupKeyRef::from_scalar(key);
        let slot = match slots.get(&key_id) {
            Some(&slot) => slot,
            None => {
                let label = if key.is_missing() {
                    Scalar::Null(NullKind::Null)
                } else {
                    key.clone()
                };
                let slot = accumulated.push_group(label);
                slots.insert(key_id, slot);
                slot
            }
        };

        for (measure, column) in measures.iter().enumerate() {
            if let Some(value) = column.value(row) {
                accumulated.add(slot, measure, value);
            }
        }
    }

    accumulated
}

const DENSE_INT_KEY_RANGE_LIMIT: i128 = 65_536;

/// Dense-bucket fast path for `Int64` group keys.
///
/// Falls back to the generic hash path unless every non-dropped key is
/// `Int64` and the key span is within a bounded range budget.
fn try_aggregate_dense_int64(
    keys: &[Scalar],
    measures: &[&Column],
    dropna: bool,
) -> Option<Accumulated> {
    let mut min_key = i64::MAX;
    let mut max_key = i64::MIN;
    let mut saw_int_key = false;

    for key in keys {
        match key {
            Scalar::Int64(v) => {
                saw_int_key = true;
                min_key = min_key.min(*v);
                max_key = max_key.max(*v);
            }
            Scalar::Null(_) if dropna => continue,
            _ => return None,
        }
    }

    if !saw_int_key {
        return Some(Accumulated::with_capacity(measures.len()));
    }

    let span = i128::from(max_key) - i128::from(min_key) + 1;
    if span <= 0 || span > DENSE_INT_KEY_RANGE_LIMIT {
        return None;
    }

    let bucket_len = usize::try_from(span).ok()?;
    let mut bucket_slots = vec![usize::MAX; bucket_len];
    let mut accumulated = Accumulated::with_capacity(measures.len());

    for (row, key) in keys.iter().enumerate() {
        let key = match key {
            Scalar::Int64(v) => *v,
            Scalar::Null(_) if dropna => continue,
            _ => return None,
        };

        let raw = i128::from(key) - i128::from(min_key);
        let bucket = usize::try_from(raw).ok()?;
        let slot = if bucket_slots[bucket] == usize::MAX {
            let slot = accumulated.push_group(Scalar::Int64(key));
            bucket_slots[bucket] = slot;
            slot
        } else {
            bucket_slots[bucket]
        };

        for (measure, column) in measures.iter().enumerate() {
            if let Some(value) = column.value(row) {
                accumulated.add(slot, measure, value);
            }
        }
    }

    Some(accumulated)
}
