#![no_main]

use libfuzzer_sys::fuzz_target;
use tp_filter::{FilterSpec, filter, observed_values};
use tp_io::{LoadOptions, TextEncoding, read_csv_bytes};

fuzz_target!(|data: &[u8]| {
    let options = LoadOptions::default().with_encoding(TextEncoding::Latin1);
    let Ok((table, _)) = read_csv_bytes(data, &options) else {
        return;
    };
    let Some(field) = table.field_names().first().cloned() else {
        return;
    };
    let Ok(values) = observed_values(&table, &field) else {
        return;
    };

    // Every other observed value: filtering can never grow the table.
    let allowed = values.into_iter().step_by(2).collect::<Vec<_>>();
    let spec = FilterSpec::new().allow(field, allowed);
    let filtered = filter(&table, &spec).expect("observed fields exist");
    assert!(filtered.num_rows() <= table.num_rows());
});
