mod analyser;
mod ui;

use clap::{Parser, ArgAction};
use ui::output;
use std::error::Error;
use std::fs;
use std::path::Path;

/// tlsniff infers request/response structure of TLS flows from sizes and timing
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// pcap/pcapng file to analyze
    #[arg(short = 'f', long, value_parser)]
    file: String,

    /// Perform analysis only on stream n
    #[arg(short, long, default_value_t = -1, value_parser)]
    nstream: i32,

    /// Additional tshark display filter, ANDed with "tcp"
    #[arg(short = 'd', long, value_parser)]
    filter: Option<String>,

    /// Only look at the first n packets of each stream, 0 for all
    #[arg(short = 'l', long, default_value_t = 0, value_parser)]
    limit: usize,

    /// Only read the first t seconds of the capture, 0 for all
    #[arg(short = 't', long, default_value_t = 0.0, value_parser)]
    time_limit: f64,

    /// Directory to write results to instead of stdout
    #[arg(short = 'o', long, value_parser)]
    output_dir: Option<String>,

    /// Display output as formatted JSON
    #[arg(short = 'j', long, action = ArgAction::SetTrue)]
    json: bool,

    /// Display output as an ARFF header plus one data row per stream
    #[arg(short = 'a', long, action = ArgAction::SetTrue, conflicts_with = "json")]
    arff: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    simple_logger::init_with_env()?;

    let args = Args::parse();

    if let Some(out_dir) = args.output_dir.as_deref() {
        log::info!("Output directory {out_dir}");
        fs::create_dir_all(out_dir)?;
    }

    let filter = analyser::utils::display_filter(args.filter.as_deref());
    let selection = analyser::utils::Selection {
        stream: args.nstream,
        limit: args.limit,
        time_limit: args.time_limit,
    };
    let streams = analyser::utils::load_file(&args.file, &filter, selection)?;

    if streams.is_empty() {
        log::warn!("No TCP streams found in {}", args.file);
    }

    let mut ids: Vec<&u32> = streams.keys().collect();
    ids.sort();

    let reports: Vec<_> = ids
        .into_iter()
        .map(|id| analyser::core::analyse(*id, &streams[id]))
        .collect();

    // ---- Output ----
    let (data, file_name) = if args.json {
        (output::data_as_json(&reports)?, "tls_flows.json")
    } else if args.arff {
        (output::data_as_arff(&reports), "tls_flows.arff")
    } else {
        output::print_results(&reports);
        return Ok(());
    };

    match args.output_dir.as_deref() {
        Some(out_dir) => output::data_to_file(data, &Path::new(out_dir).join(file_name))?,
        None => println!("{data}"),
    }

    Ok(())
}
