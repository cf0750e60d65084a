#![no_main]

use libfuzzer_sys::fuzz_target;
use tp_agg::{GroupOptions, Reduce, aggregate};
use tp_io::{LoadOptions, TextEncoding, read_csv_bytes};

fuzz_target!(|data: &[u8]| {
    let options = LoadOptions::default().with_encoding(TextEncoding::Latin1);
    let Ok((table, _)) = read_csv_bytes(data, &options) else {
        return;
    };
    let fields = table.field_names().to_vec();
    let Some(group) = fields.first() else {
        return;
    };

    for measure in &fields {
        if let Ok(view) = aggregate(
            &table,
            group,
            &[measure.as_str()],
            Reduce::Sum,
            GroupOptions::default(),
        ) {
            // A group per distinct key at most, one reduced value each.
            assert!(view.len() <= table.num_rows());
            assert_eq!(view.measure(measure).expect("measure exists").len(), view.len());
        }
    }
});
