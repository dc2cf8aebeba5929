use clap::Parser;
use log::{error, info};
use siphon::anonymization::{
    anonymize_file, anonymize_in_place, default_output_path, UuidMapper,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "siphon-anonymize")]
#[command(version = "0.0.2")]
#[command(about = "Replace UUIDs in recorded JSONL session logs with stable stand-ins")]
struct Args {
    /// JSONL log to anonymize
    input: PathBuf,

    /// Destination; defaults to `<input stem>.anonymized.jsonl`
    #[arg(conflicts_with = "in_place")]
    output: Option<PathBuf>,

    /// Overwrite the input instead of writing a new file
    #[arg(long)]
    in_place: bool,

    /// Print every original UUID next to its replacement
    #[arg(long)]
    show_mapping: bool,
}

fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    let args = Args::parse();

    let mut mapper = UuidMapper::new().unwrap_or_else(|e| {
        error!("{}", e);
        std::process::exit(1);
    });

    let (result, destination) = if args.in_place {
        println!("Anonymizing UUIDs in-place: {}", args.input.display());
        (
            anonymize_in_place(&args.input, &mut mapper),
            args.input.clone(),
        )
    } else {
        let output = args
            .output
            .clone()
            .unwrap_or_else(|| default_output_path(&args.input));
        println!("Anonymizing UUIDs in: {}", args.input.display());
        println!("Output will be written to: {}", output.display());
        (anonymize_file(&args.input, &output, &mut mapper), output)
    };

    let summary = result.unwrap_or_else(|e| {
        error!("{}", e);
        std::process::exit(1);
    });
    info!(
        "Processed {} lines ({} blank, {} not JSON)",
        summary.lines, summary.empty, summary.invalid
    );

    println!();
    println!("Successfully anonymized {} unique UUIDs", mapper.len());
    if args.in_place {
        println!("Original file overwritten: {}", destination.display());
    } else {
        println!("Output written to: {}", destination.display());
    }

    if args.show_mapping {
        println!();
        println!("Anonymized {} unique UUIDs:", mapper.len());
        println!("{}", "=".repeat(80));
        for (original, anonymized) in mapper.mapping() {
            println!("{} -> {}", original, anonymized);
        }
    } else {
        println!();
        println!("Use --show-mapping to see the full UUID mapping");
    }
}
