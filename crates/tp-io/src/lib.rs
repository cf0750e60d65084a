#![forbid(unsafe_code)]

use std::collections::HashSet;
use std::path::Path;

use chrono::NaiveDate;
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tp_columnar::{Column, ColumnError};
use tp_table::{SchemaError, Table};
use tp_types::{NullKind, Scalar};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("csv input has no headers")]
    MissingHeaders,
    #[error("input is not valid {encoding} (bytes decode cleanly up to offset {valid_up_to})")]
    Decode {
        encoding: &'static str,
        valid_up_to: usize,
    },
    #[error("date field {field} has value {value:?} not parseable by any configured format")]
    DateParse { field: String, value: String },
    #[error("unknown text encoding {name:?} (expected utf-8 or latin-1)")]
    UnknownEncoding { name: String },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Column(#[from] ColumnError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Text encoding of a CSV source. The reference retail dataset ships as
/// Latin-1, so UTF-8 is configurable rather than assumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextEncoding {
    Utf8,
    Latin1,
}

impl TextEncoding {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Latin1 => "latin-1",
        }
    }

    pub fn parse(input: &str) -> Result<Self, IoError> {
        match input.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(Self::Latin1),
            other => Err(IoError::UnknownEncoding {
                name: other.to_owned(),
            }),
        }
    }

    pub fn decode(self, bytes: &[u8]) -> Result<String, IoError> {
        match self {
            Self::Utf8 => String::from_utf8(bytes.to_vec()).map_err(|err| IoError::Decode {
                encoding: self.as_str(),
                valid_up_to: err.utf8_error().valid_up_to(),
            }),
            // Latin-1 maps every byte to the code point of the same value.
            Self::Latin1 => Ok(bytes.iter().map(|&byte| char::from(byte)).collect()),
        }
    }
}

/// Configuration for the load step, including the data-cleaning moves the
/// reference dashboard performed implicitly. Nothing here happens unless
/// asked for, and everything that happens is counted in [`LoadReport`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoadOptions {
    pub encoding: TextEncoding,
    /// Fields discarded at load (identifier columns the pipeline never
    /// groups or measures by).
    pub drop_fields: Vec<String>,
    /// Drop exact duplicate rows, keeping the first occurrence.
    pub dedup_rows: bool,
    /// Fields parsed as dates instead of going through scalar inference.
    pub date_fields: Vec<String>,
    /// Formats tried in order for every declared date field.
    pub date_formats: Vec<String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            encoding: TextEncoding::Utf8,
            drop_fields: Vec::new(),
            dedup_rows: false,
            date_fields: Vec::new(),
            date_formats: vec!["%m/%d/%Y".to_owned(), "%Y-%m-%d".to_owned()],
        }
    }
}

impl LoadOptions {
    #[must_use]
    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    #[must_use]
    pub fn drop_field(mut self, field: impl Into<String>) -> Self {
        self.drop_fields.push(field.into());
        self
    }

    #[must_use]
    pub fn dedup_rows(mut self) -> Self {
        self.dedup_rows = true;
        self
    }

    #[must_use]
    pub fn parse_date(mut self, field: impl Into<String>) -> Self {
        self.date_fields.push(field.into());
        self
    }
}

/// What the clean step actually did, returned alongside every load so
/// callers can surface it instead of silently losing rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub rows_read: usize,
    pub rows_kept: usize,
    pub duplicate_rows_dropped: usize,
    pub fields_dropped: Vec<String>,
}

pub fn read_csv_path(
    path: impl AsRef<Path>,
    options: &LoadOptions,
) -> Result<(Table, LoadReport), IoError> {
    let bytes = std::fs::read(path)?;
    read_csv_bytes(&bytes, options)
}

pub fn read_csv_bytes(bytes: &[u8], options: &LoadOptions) -> Result<(Table, LoadReport), IoError> {
    let input = options.encoding.decode(bytes)?;
    read_csv_str(&input, options)
}

pub fn read_csv_str(input: &str, options: &LoadOptions) -> Result<(Table, LoadReport), IoError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(input.as_bytes());

    let headers = reader.headers().cloned().map_err(IoError::from)?;
    if headers.is_empty() || headers.iter().all(str::is_empty) {
        return Err(IoError::MissingHeaders);
    }

    let mut kept = Vec::new();
    let mut fields_dropped = Vec::new();
    for (idx, header) in headers.iter().enumerate() {
        if options.drop_fields.iter().any(|field| field == header) {
            fields_dropped.push(header.to_owned());
        } else {
            kept.push((idx, header.to_owned()));
        }
    }

    let mut values_by_column = vec![Vec::<Scalar>::new(); kept.len()];
    let mut seen_rows = HashSet::<Vec<String>>::new();
    let mut report = LoadReport {
        fields_dropped,
        ..LoadReport::default()
    };

    for row in reader.records() {
        let record = row?;
        report.rows_read += 1;

        let raw = kept
            .iter()
            .map(|&(idx, _)| record.get(idx).unwrap_or_default().to_owned())
            .collect::<Vec<_>>();

        if options.dedup_rows && !seen_rows.insert(raw.clone()) {
            report.duplicate_rows_dropped += 1;
            continue;
        }
        report.rows_kept += 1;

        for ((field, values), (_, header)) in raw.iter().zip(&mut values_by_column).zip(&kept) {
            let scalar = if options.date_fields.iter().any(|date| date == header) {
                parse_date(field, header, &options.date_formats)?
            } else {
                parse_scalar(field)
            };
            values.push(scalar);
        }
    }

    #[cfg(feature = "tracing")]
    if report.duplicate_rows_dropped > 0 || !report.fields_dropped.is_empty() {
        tracing::info!(
            rows_read = report.rows_read,
            rows_kept = report.rows_kept,
            duplicate_rows_dropped = report.duplicate_rows_dropped,
            fields_dropped = report.fields_dropped.len(),
            "load clean step"
        );
    }

    let mut columns = Vec::with_capacity(kept.len());
    for ((_, header), values) in kept.into_iter().zip(values_by_column) {
        columns.push((header, Column::from_values(values)?));
    }

    Ok((Table::new(columns)?, report))
}

pub fn write_csv_string(table: &Table) -> Result<String, IoError> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());

    writer.write_record(table.field_names())?;

    for row_idx in 0..table.num_rows() {
        let row = table
            .field_names()
            .iter()
            .map(|name| {
                table
                    .column(name)
                    .ok()
                    .and_then(|column| column.value(row_idx))
                    .map_or_else(String::new, scalar_to_csv)
            })
            .collect::<Vec<_>>();
        writer.write_record(&row)?;
    }

    let bytes = writer.into_inner().map_err(|err| err.into_error())?;
    // The writer only ever receives UTF-8 strings.
    String::from_utf8(bytes).map_err(|err| IoError::Decode {
        encoding: "utf-8",
        valid_up_to: err.utf8_error().valid_up_to(),
    })
}

fn parse_date(field: &str, header: &str, formats: &[String]) -> Result<Scalar, IoError> {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return Ok(Scalar::Null(NullKind::NaT));
    }

    for format in formats {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(Scalar::Date(date));
        }
    }

    Err(IoError::DateParse {
        field: header.to_owned(),
        value: trimmed.to_owned(),
    })
}

fn parse_scalar(field: &str) -> Scalar {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return Scalar::Null(NullKind::Null);
    }

    if let Ok(value) = trimmed.parse::<i64>() {
        return Scalar::Int64(value);
    }
    if let Ok(value) = trimmed.parse::<f64>() {
        return Scalar::Float64(value);
    }
    if let Ok(value) = trimmed.parse::<bool>() {
        return Scalar::Bool(value);
    }

    Scalar::Utf8(trimmed.to_owned())
}

fn scalar_to_csv(scalar: &Scalar) -> String {
    match scalar {
        Scalar::Null(_) => String::new(),
        Scalar::Bool(v) => v.to_string(),
        Scalar::Int64(v) => v.to_string(),
        Scalar::Float64(v) => {
            if v.is_nan() {
                String::new()
            } else {
                v.to_string()
            }
        }
        Scalar::Utf8(v) => v.clone(),
        Scalar::Date(v) => v.format("%Y-%m-%d").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use tp_types::{NullKind, Scalar};

    use super::{IoError, LoadOptions, TextEncoding, read_csv_bytes, read_csv_str, write_csv_string};

    #[test]
    fn csv_round_trip_preserves_null_and_numeric_shape() {
        let input = "id,value\n1,10\n2,\n3,3.5\n";
        let (table, report) = read_csv_str(input, &LoadOptions::default()).expect("read");
        let value_col = table.column("value").expect("value");

        assert_eq!(value_col.values()[1], Scalar::Null(NullKind::NaN));
        assert_eq!(report.rows_read, 3);
        assert_eq!(report.rows_kept, 3);

        let out = write_csv_string(&table).expect("write");
        assert!(out.contains("id,value"));
        assert!(out.contains("3,3.5"));
    }

    #[test]
    fn latin1_bytes_decode_without_an_encoding_table() {
        let bytes = b"City,Value\nM\xfcnchen,3\n";
        let options = LoadOptions::default().with_encoding(TextEncoding::Latin1);
        let (table, _) = read_csv_bytes(bytes, &options).expect("read");

        assert_eq!(
            table.column("City").expect("city").values()[0],
            Scalar::Utf8("München".to_owned())
        );
    }

    #[test]
    fn invalid_utf8_fails_with_offset_detail() {
        let bytes = b"City,Value\nM\xfcnchen,3\n";
        let err = read_csv_bytes(bytes, &LoadOptions::default()).expect_err("must fail");

        assert!(matches!(
            err,
            IoError::Decode {
                encoding: "utf-8",
                valid_up_to: 12
            }
        ));
    }

    #[test]
    fn dedup_keeps_first_occurrence_and_counts_drops() {
        let input = "Category,Sales\nA,10\nA,10\nB,5\nA,10\n";
        let options = LoadOptions::default().dedup_rows();
        let (table, report) = read_csv_str(input, &options).expect("read");

        assert_eq!(table.num_rows(), 2);
        assert_eq!(report.rows_read, 4);
        assert_eq!(report.rows_kept, 2);
        assert_eq!(report.duplicate_rows_dropped, 2);
    }

    #[test]
    fn dropped_fields_disappear_from_schema_and_are_reported() {
        let input = "Row ID,Category,Sales\n1,A,10\n2,B,5\n";
        let options = LoadOptions::default().drop_field("Row ID");
        let (table, report) = read_csv_str(input, &options).expect("read");

        assert!(!table.has_field("Row ID"));
        assert_eq!(table.field_names(), &["Category".to_owned(), "Sales".to_owned()]);
        assert_eq!(report.fields_dropped, vec!["Row ID".to_owned()]);
    }

    #[test]
    fn dedup_considers_rows_after_field_drops() {
        // The identifier column differs, so rows only collide once it is
        // dropped.
        let input = "Row ID,Category,Sales\n1,A,10\n2,A,10\n";
        let options = LoadOptions::default().drop_field("Row ID").dedup_rows();
        let (table, report) = read_csv_str(input, &options).expect("read");

        assert_eq!(table.num_rows(), 1);
        assert_eq!(report.duplicate_rows_dropped, 1);
    }

    #[test]
    fn declared_date_fields_parse_reference_format() {
        let input = "Order Date,Sales\n11/8/2016,10\n,5\n";
        let options = LoadOptions::default().parse_date("Order Date");
        let (table, _) = read_csv_str(input, &options).expect("read");

        let dates = table.column("Order Date").expect("order date");
        assert_eq!(
            dates.values()[0],
            Scalar::Date(NaiveDate::from_ymd_opt(2016, 11, 8).expect("date"))
        );
        assert_eq!(dates.values()[1], Scalar::Null(NullKind::NaT));
    }

    #[test]
    fn unparseable_date_names_the_field_and_value() {
        let input = "Order Date,Sales\nnot-a-date,10\n";
        let options = LoadOptions::default().parse_date("Order Date");
        let err = read_csv_str(input, &options).expect_err("must fail");

        assert_eq!(
            err.to_string(),
            "date field Order Date has value \"not-a-date\" not parseable by any configured format"
        );
    }

    #[test]
    fn headerless_input_is_rejected() {
        let err = read_csv_str("", &LoadOptions::default()).expect_err("must fail");
        assert!(matches!(err, IoError::MissingHeaders));
    }

    #[test]
    fn dates_export_in_iso_format() {
        let input = "Order Date,Sales\n11/8/2016,10\n";
        let options = LoadOptions::default().parse_date("Order Date");
        let (table, _) = read_csv_str(input, &options).expect("read");

        let out = write_csv_string(&table).expect("write");
        assert!(out.contains("2016-11-08,10"));
    }
}
