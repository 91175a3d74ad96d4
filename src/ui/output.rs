use crate::analyser::containers::FlowReport;
use crate::analyser::histogram::{SIZE_BOUNDS, TIME_BOUNDS_MS};
use ansi_term::Colour;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use std::fs::File;
use std::io::Write;
use std::path::Path;

lazy_static! {
    /// Names of the 60 values, in the order [crate::analyser::containers::FlowFeatures::values] emits them.
    pub static ref ATTRIBUTE_NAMES: Vec<String> = {
        let mut names = Vec::new();
        for side in ["up", "down"] {
            names.extend(SIZE_BOUNDS.iter().map(|b| format!("web_{side}_size_{b}")));
            names.push(format!("web_{side}_size_max"));
        }
        names.extend(TIME_BOUNDS_MS.iter().map(|b| format!("web_up_query_{b}")));
        names.extend(TIME_BOUNDS_MS.iter().map(|b| format!("web_down_resp_{b}")));
        names
    };
}

pub fn print_results(reports: &[FlowReport]) {
    println!("\n\u{250F}\u{2501}\u{2501}\u{2501}\u{2501} Results");
    for report in reports {
        print_report(report);
    }
}

pub fn print_report(report: &FlowReport) {
    println!("\u{2503}");
    println!("\u{2503} Stream {}", Colour::Red.paint(report.stream.to_string()));
    println!("\u{2503} Started          : {}", Colour::Fixed(226).paint(format_start(report.started_at)));
    println!("\u{2503} Protocol         : {}", Colour::Fixed(226).paint(report.protocol));
    println!("\u{2503} Initiator        : {}", Colour::Fixed(226).paint(report.initiator.to_string()));
    println!("\u{2503} Peer             : {}", Colour::Fixed(226).paint(report.peer.to_string()));
    println!("\u{2503} Packets          : {}", Colour::Fixed(226).paint(report.packets.to_string()));
    println!("\u{2503} Messages up      : {}", Colour::Fixed(226).paint(report.up_messages.to_string()));
    println!("\u{2503} Messages down    : {}", Colour::Fixed(226).paint(report.down_messages.to_string()));
    println!("\u{2503} Final phase      : {}", Colour::Fixed(226).paint(format!("{:?}", report.final_phase)));

    let values = report.features.values();
    let mut any = false;
    for (name, value) in ATTRIBUTE_NAMES.iter().zip(values.iter()) {
        if *value == 0.0 {
            continue;
        }
        any = true;
        println!("\u{2503}   {:<20} {}", name, Colour::Green.paint(format!("{value:.3}")));
    }
    if !any {
        println!("\u{2503}   {}", Colour::Fixed(244).paint("no TLS application data"));
    }
    println!("\u{2503} ");
}

fn format_start(micros: Option<i64>) -> String {
    micros
        .and_then(DateTime::<Utc>::from_timestamp_micros)
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S%.6f UTC").to_string())
        .unwrap_or_else(|| String::from("unknown"))
}

/// Seconds since the epoch with microsecond precision, "?" if unknown.
fn format_timestamp(micros: Option<i64>) -> String {
    match micros {
        Some(micros) => format!("{}.{:06}", micros.div_euclid(1_000_000), micros.rem_euclid(1_000_000)),
        None => String::from("?"),
    }
}

/// Comma separated, 3 fractional digits each.
pub fn format_values(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format!("{v:.3}"))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn arff_header() -> String {
    let mut header = String::from("@relation tlsniff\n\n");
    header.push_str("% first packet timestamp, transport protocol, initiating endpoint, peer endpoint\n");
    header.push_str("@attribute stream numeric\n");
    header.push_str("@attribute first_ts numeric\n");
    header.push_str("@attribute protocol {TCP,UDP}\n");
    header.push_str("@attribute src_addr string\n");
    header.push_str("@attribute src_port numeric\n");
    header.push_str("@attribute dst_addr string\n");
    header.push_str("@attribute dst_port numeric\n");
    for name in ATTRIBUTE_NAMES.iter() {
        header.push_str(&format!("@attribute {name} numeric\n"));
    }
    header.push_str("\n@data\n");
    header
}

pub fn arff_row(report: &FlowReport) -> String {
    format!(
        "{},{},{},{},{},{}",
        report.stream,
        format_timestamp(report.started_at),
        report.protocol,
        report.initiator,
        report.peer,
        format_values(&report.features.values())
    )
}

pub fn data_as_arff(reports: &[FlowReport]) -> String {
    let mut out = arff_header();
    for report in reports {
        out.push_str(&arff_row(report));
        out.push('\n');
    }
    out
}

pub fn data_as_json(reports: &[FlowReport]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(reports)
}

pub fn data_to_file(data: String, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(data.as_bytes())?;
    log::info!("Wrote {}", path.display());
    Ok(())
}
