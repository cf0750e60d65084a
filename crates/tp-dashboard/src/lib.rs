#![forbid(unsafe_code)]

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tp_agg::{
    AggError, AggregateView, GroupOptions, Reduce, SortDirection, aggregate, rank, sort_by_group,
};
use tp_filter::{FilterError, FilterSpec, filter};
use tp_io::{LoadOptions, TextEncoding};
use tp_table::{SchemaError, Table, period_field_name};
use tp_types::Granularity;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error(transparent)]
    Agg(#[from] AggError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Field names of a retail sales dataset. The pipeline itself is generic
/// over field names; this is the one place a concrete schema is spelled
/// out, defaulting to the Superstore export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetailSchema {
    pub category: String,
    pub sub_category: String,
    pub segment: String,
    pub state: String,
    pub order_date: String,
    pub ship_date: String,
    pub sales: String,
    pub profit: String,
    pub discount: String,
}

impl Default for RetailSchema {
    fn default() -> Self {
        Self {
            category: "Category".to_owned(),
            sub_category: "Sub-Category".to_owned(),
            segment: "Segment".to_owned(),
            state: "State".to_owned(),
            order_date: "Order Date".to_owned(),
            ship_date: "Ship Date".to_owned(),
            sales: "Sales".to_owned(),
            profit: "Profit".to_owned(),
            discount: "Discount".to_owned(),
        }
    }
}

impl RetailSchema {
    /// Load options matching the reference export: Latin-1 encoded,
    /// identifier columns dropped, exact duplicate rows removed, both
    /// date fields parsed.
    #[must_use]
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions::default()
            .with_encoding(TextEncoding::Latin1)
            .drop_field("Row ID")
            .drop_field("Postal Code")
            .dedup_rows()
            .parse_date(self.order_date.clone())
            .parse_date(self.ship_date.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardOptions {
    /// How many states the top/bottom rankings keep.
    pub state_rank_n: usize,
    /// Period granularity of the trend view.
    pub granularity: Granularity,
}

impl Default for DashboardOptions {
    fn default() -> Self {
        Self {
            state_rank_n: 10,
            granularity: Granularity::Month,
        }
    }
}

/// One record-level point for scatter consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatterPoint {
    pub x: f64,
    pub y: f64,
    pub hue: String,
}

/// Everything the presentation layer renders, recomputed from scratch on
/// each filter change. Plain serializable data; no rendering here.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardViews {
    pub filtered_rows: usize,
    pub monthly_trend: AggregateView,
    pub category_summary: AggregateView,
    pub sub_category_profit: AggregateView,
    pub segment_performance: AggregateView,
    pub top_states: AggregateView,
    pub bottom_states: AggregateView,
    pub discount_profit: Vec<ScatterPoint>,
}

pub fn build_views(
    table: &Table,
    spec: &FilterSpec,
    schema: &RetailSchema,
    options: &DashboardOptions,
) -> Result<DashboardViews, DashboardError> {
    let filtered = filter(table, spec)?;
    let sales_profit = [schema.sales.as_str(), schema.profit.as_str()];

    let with_period = filtered.derive_period(&schema.order_date, options.granularity)?;
    let period_field = period_field_name(&schema.order_date, options.granularity);
    let monthly_trend = sort_by_group(
        &aggregate(
            &with_period,
            &period_field,
            &sales_profit,
            Reduce::Sum,
            GroupOptions::default(),
        )?,
        SortDirection::Ascending,
    );

    let category_summary = sort_by_group(
        &aggregate(
            &filtered,
            &schema.category,
            &sales_profit,
            Reduce::Sum,
            GroupOptions::default(),
        )?,
        SortDirection::Ascending,
    );

    let sub_category = aggregate(
        &filtered,
        &schema.sub_category,
        &[schema.profit.as_str()],
        Reduce::Sum,
        GroupOptions::default(),
    )?;
    let sub_category_profit = rank(
        &sub_category,
        &schema.profit,
        SortDirection::Ascending,
        sub_category.len(),
    )?;

    let segment_performance = sort_by_group(
        &aggregate(
            &filtered,
            &schema.segment,
            &sales_profit,
            Reduce::Sum,
            GroupOptions::default(),
        )?,
        SortDirection::Ascending,
    );

    let states = aggregate(
        &filtered,
        &schema.state,
        &sales_profit,
        Reduce::Sum,
        GroupOptions::default(),
    )?;
    let top_states = rank(
        &states,
        &schema.profit,
        SortDirection::Descending,
        options.state_rank_n,
    )?;
    let bottom_states = rank(
        &states,
        &schema.profit,
        SortDirection::Ascending,
        options.state_rank_n,
    )?;

    let discount_profit =
        scatter_points(&filtered, &schema.discount, &schema.profit, &schema.category)?;

    Ok(DashboardViews {
        filtered_rows: filtered.num_rows(),
        monthly_trend,
        category_summary,
        sub_category_profit,
        segment_performance,
        top_states,
        bottom_states,
        discount_profit,
    })
}

/// Record-level (x, y, hue) triples from a table. Rows with a missing
/// coordinate are skipped; a non-numeric coordinate dtype fails.
pub fn scatter_points(
    table: &Table,
    x_field: &str,
    y_field: &str,
    hue_field: &str,
) -> Result<Vec<ScatterPoint>, DashboardError> {
    let x = table.column(x_field)?;
    let y = table.column(y_field)?;
    let hue = table.column(hue_field)?;

    for (field, column) in [(x_field, x), (y_field, y)] {
        if !column.dtype().is_numeric() {
            return Err(DashboardError::Schema(SchemaError::WrongDtype {
                field: field.to_owned(),
                expected: "a numeric measure",
                found: column.dtype(),
            }));
        }
    }

    let mut points = Vec::with_capacity(table.num_rows());
    for row in 0..table.num_rows() {
        let (Some(x_value), Some(y_value)) = (x.value(row), y.value(row)) else {
            continue;
        };
        if x_value.is_missing() || y_value.is_missing() {
            continue;
        }
        let (Ok(x_num), Ok(y_num)) = (x_value.to_f64(), y_value.to_f64()) else {
            continue;
        };
        let hue_label = hue
            .value(row)
            .map_or_else(String::new, ToString::to_string);
        points.push(ScatterPoint {
            x: x_num,
            y: y_num,
            hue: hue_label,
        });
    }

    Ok(points)
}

/// Plain-text rendering of the views for terminal consumers.
#[must_use]
pub fn render_plain(views: &DashboardViews) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "filtered rows: {}", views.filtered_rows);

    for (title, view) in [
        ("monthly trend", &views.monthly_trend),
        ("category summary", &views.category_summary),
        ("profit by sub-category", &views.sub_category_profit),
        ("segment performance", &views.segment_performance),
        ("top states by profit", &views.top_states),
        ("bottom states by profit", &views.bottom_states),
    ] {
        let _ = writeln!(out, "\n[{title}] ({} groups)", view.len());
        for (idx, key) in view.keys().iter().enumerate() {
            let measures = view
                .measures()
                .iter()
                .map(|series| format!("{}={:.2}", series.field(), series.values()[idx]))
                .collect::<Vec<_>>()
                .join(" ");
            let _ = writeln!(out, "  {key}: {measures}");
        }
    }

    let _ = writeln!(
        out,
        "\n[discount vs profit] {} points",
        views.discount_profit.len()
    );
    out
}

#[cfg(test)]
mod tests {
    use tp_columnar::Column;
    use tp_filter::FilterSpec;
    use tp_table::Table;
    use tp_types::Scalar;

    use super::{DashboardError, scatter_points};

    fn utf8(value: &str) -> Scalar {
        Scalar::Utf8(value.to_owned())
    }

    fn discount_table() -> Table {
        Table::new(vec![
            (
                "Discount".to_owned(),
                Column::from_values(vec![
                    Scalar::Float64(0.2),
                    Scalar::Float64(0.0),
                    Scalar::Null(tp_types::NullKind::NaN),
                ])
                .expect("discount"),
            ),
            (
                "Profit".to_owned(),
                Column::from_values(vec![
                    Scalar::Float64(-1.0),
                    Scalar::Float64(4.5),
                    Scalar::Float64(2.0),
                ])
                .expect("profit"),
            ),
            (
                "Category".to_owned(),
                Column::from_values(vec![utf8("A"), utf8("B"), utf8("A")]).expect("category"),
            ),
        ])
        .expect("table")
    }

    #[test]
    fn scatter_points_skip_rows_with_missing_coordinates() {
        let points =
            scatter_points(&discount_table(), "Discount", "Profit", "Category").expect("points");

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].x, 0.2);
        assert_eq!(points[0].hue, "A");
        assert_eq!(points[1].y, 4.5);
    }

    #[test]
    fn scatter_points_reject_non_numeric_axes() {
        let err = scatter_points(&discount_table(), "Category", "Profit", "Category")
            .expect_err("must fail");

        assert!(matches!(err, DashboardError::Schema(_)));
    }

    #[test]
    fn unknown_scatter_field_is_a_schema_error() {
        let err = scatter_points(&discount_table(), "Quantity", "Profit", "Category")
            .expect_err("must fail");
        assert_eq!(err.to_string(), "unknown field: Quantity");
    }

    #[test]
    fn default_filter_spec_is_unrestricted() {
        // The dashboard builds its spec from UI selections; no selection
        // must mean no restriction.
        assert!(FilterSpec::new().is_unrestricted());
    }
}
