#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;

use tp_cache::DatasetCache;
use tp_dashboard::{DashboardOptions, RetailSchema, build_views, render_plain};
use tp_filter::FilterSpec;
use tp_io::TextEncoding;
use tp_types::Granularity;

#[derive(Debug, Clone)]
struct CliArgs {
    data: PathBuf,
    encoding: Option<TextEncoding>,
    categories: Option<Vec<String>>,
    segments: Option<Vec<String>>,
    state_rank_n: usize,
    granularity: Granularity,
    json: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("tp-dashboard-cli error: {error}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<(), String> {
    let args = parse_args()?;
    let schema = RetailSchema::default();

    let mut load_options = schema.load_options();
    if let Some(encoding) = args.encoding {
        load_options.encoding = encoding;
    }

    let dataset = DatasetCache::global()
        .load_csv(&args.data, &load_options)
        .map_err(|error| error.to_string())?;

    println!(
        "loaded {} ({} rows read, {} duplicates dropped, {} fields dropped)",
        args.data.display(),
        dataset.report.rows_read,
        dataset.report.duplicate_rows_dropped,
        dataset.report.fields_dropped.len()
    );

    let mut spec = FilterSpec::new();
    if let Some(categories) = args.categories {
        spec = spec.allow_utf8(schema.category.clone(), categories);
    }
    if let Some(segments) = args.segments {
        spec = spec.allow_utf8(schema.segment.clone(), segments);
    }

    let options = DashboardOptions {
        state_rank_n: args.state_rank_n,
        granularity: args.granularity,
    };

    let views = build_views(&dataset.table, &spec, &schema, &options)
        .map_err(|error| error.to_string())?;

    if args.json {
        let rendered = serde_json::to_string_pretty(&views).map_err(|error| error.to_string())?;
        println!("{rendered}");
    } else {
        println!("{}", render_plain(&views));
    }

    Ok(())
}

fn parse_args() -> Result<CliArgs, String> {
    let mut data = None;
    let mut encoding = None;
    let mut categories = None;
    let mut segments = None;
    let mut state_rank_n = DashboardOptions::default().state_rank_n;
    let mut granularity = DashboardOptions::default().granularity;
    let mut json = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--data" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--data requires a path".to_owned())?;
                data = Some(PathBuf::from(value));
            }
            "--encoding" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--encoding requires utf-8 or latin-1".to_owned())?;
                encoding = Some(TextEncoding::parse(&value).map_err(|error| error.to_string())?);
            }
            "--category" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--category requires a comma-separated list".to_owned())?;
                categories = Some(split_selection(&value));
            }
            "--segment" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--segment requires a comma-separated list".to_owned())?;
                segments = Some(split_selection(&value));
            }
            "--top-n" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--top-n requires a count".to_owned())?;
                state_rank_n = value
                    .parse()
                    .map_err(|_| format!("--top-n requires a count, got {value:?}"))?;
            }
            "--granularity" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--granularity requires year, month, or day".to_owned())?;
                granularity =
                    Granularity::parse(&value).map_err(|error| error.to_string())?;
            }
            "--json" => {
                json = true;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }

    Ok(CliArgs {
        data: data.ok_or_else(|| "--data <path> is required".to_owned())?,
        encoding,
        categories,
        segments,
        state_rank_n,
        granularity,
        json,
    })
}

/// An explicitly empty selection (`--category ""`) is a constraint no
/// row satisfies, matching a cleared multi-select.
fn split_selection(value: &str) -> Vec<String> {
    if value.is_empty() {
        return Vec::new();
    }
    value.split(',').map(str::to_owned).collect()
}

fn print_help() {
    println!(
        "tp-dashboard-cli\n\
         Usage:\n\
         \ttp-dashboard-cli --data <path> [--encoding <utf-8|latin-1>] [--category a,b] [--segment a,b] [--top-n <N>] [--granularity <year|month|day>] [--json]\n\
         Options:\n\
         \t--data <path>            CSV export to load (cached per process)\n\
         \t--encoding <name>        override the schema default (latin-1)\n\
         \t--category a,b           restrict rows to the listed categories\n\
         \t--segment a,b            restrict rows to the listed segments\n\
         \t--top-n <N>              entries kept in the state rankings (default 10)\n\
         \t--granularity <unit>     trend period granularity (default month)\n\
         \t--json                   print views as JSON instead of text\n\
         \t-h, --help               show this help"
    );
}
