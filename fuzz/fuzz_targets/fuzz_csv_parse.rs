#![no_main]

use libfuzzer_sys::fuzz_target;
use tp_io::{LoadOptions, TextEncoding, read_csv_bytes};

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must either load or fail cleanly in both encodings.
    let _ = read_csv_bytes(data, &LoadOptions::default());

    let latin1 = LoadOptions::default()
        .with_encoding(TextEncoding::Latin1)
        .dedup_rows();
    if let Ok((table, report)) = read_csv_bytes(data, &latin1) {
        assert_eq!(report.rows_kept, table.num_rows());
        assert_eq!(
            report.rows_read,
            report.rows_kept + report.duplicate_rows_dropped
        );
    }
});
