#![forbid(unsafe_code)]

//! Facade over the tabpipe workspace: one `use tabpipe::...` for the
//! pipeline (`filter` → `aggregate` → `rank`), the IO and caching layer
//! around it, and the dashboard view compositions built on top.

pub use tp_agg::{
    AggError, AggregateView, GroupOptions, MeasureSeries, Reduce, SortDirection, aggregate, rank,
    sort_by_group,
};
pub use tp_cache::{CacheError, DatasetCache, LoadedDataset};
pub use tp_columnar::{Column, ColumnError, ValidityMask};
pub use tp_dashboard::{
    DashboardError, DashboardOptions, DashboardViews, RetailSchema, ScatterPoint, build_views,
    render_plain, scatter_points,
};
pub use tp_filter::{CategoryKey, FilterError, FilterSpec, filter, observed_values};
pub use tp_io::{
    IoError, LoadOptions, LoadReport, TextEncoding, read_csv_bytes, read_csv_path, read_csv_str,
    write_csv_string,
};
pub use tp_table::{SchemaError, Table, period_field_name};
pub use tp_textgen::{
    CannedGenerator, GenerateError, GeneratorCache, GeneratorCacheError, TextGenerator,
};
pub use tp_types::{DType, Granularity, NullKind, Scalar, TypeError};
