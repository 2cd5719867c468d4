//! wavalign - align and compare WAV files.
//!
//! Each reference/test pair is aligned on the best-match offset (unless
//! `--no-align` is given) and then compared sample by sample. Directories
//! are compared file by file, reusing one alignment workspace. The process
//! exits with status 1 unless every pair was compared and matched exactly.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use wavalign_core::align::{StreamSide, Workspace};
use wavalign_core::compare::{
    compare_files, pair_inputs, CompareOptions, Metrics, OutputMode, PairReport, SessionSummary,
};
use wavalign_core::config::ConfigManager;
use wavalign_core::logging::{init_tracing, LogLevel};

#[derive(Parser, Debug)]
#[command(name = "wavalign", version, about = "Best-match alignment and comparison of WAV files")]
struct Cli {
    /// Reference WAV file or directory
    reference: PathBuf,

    /// WAV file or directory to compare against the reference
    test: PathBuf,

    /// Write the difference (test - reference) to this file or directory
    output: Option<PathBuf>,

    /// Write the aligned test signal instead of the difference
    #[arg(long, requires = "output")]
    save_aligned: bool,

    /// Compare from the current start without searching for an offset
    #[arg(long, conflicts_with = "max_offset")]
    no_align: bool,

    /// Largest offset to search, in frames (overrides config)
    #[arg(short = 'm', long)]
    max_offset: Option<usize>,

    /// Config file path
    #[arg(short, long, default_value = ".config/wavalign.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error; overrides config)
    #[arg(short, long)]
    log_level: Option<LogLevel>,

    /// Print the results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Failure {
    reference: PathBuf,
    test: PathBuf,
    error: String,
}

#[derive(Serialize)]
struct Report<'a> {
    pairs: &'a [PairReport],
    failures: &'a [Failure],
    summary: &'a SessionSummary,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = ConfigManager::new(&cli.config);
    config
        .load_or_create()
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;
    let settings = config.settings().clone();

    init_tracing(cli.log_level.unwrap_or(settings.logging.level));

    let pairs = pair_inputs(&cli.reference, &cli.test, cli.output.as_deref())
        .context("Failed to collect input files")?;
    if pairs.is_empty() {
        anyhow::bail!("No WAV files found under {}", cli.reference.display());
    }

    let max_offset = cli.max_offset.unwrap_or(settings.align.max_offset_frames);
    let options = CompareOptions {
        max_offset_frames: (!cli.no_align).then_some(max_offset),
        output_mode: if cli.save_aligned {
            OutputMode::AlignedTest
        } else {
            OutputMode::Difference
        },
    };

    // One workspace for the whole run, pre-sized from the config.
    let mut workspace = Workspace::new();
    if !cli.no_align {
        workspace
            .open(max_offset, settings.align.max_channels.max(1))
            .context("Failed to set up alignment workspace")?;
    }

    let mut reports = Vec::new();
    let mut failures = Vec::new();
    let mut summary = SessionSummary::default();
    for pair in &pairs {
        match compare_files(&mut workspace, pair, &options) {
            Ok(report) => {
                summary.record(&pair.test.display().to_string(), &report.stats);
                if !cli.json {
                    print_pair(&report);
                }
                reports.push(report);
            }
            Err(err) => {
                tracing::error!(
                    reference = %pair.reference.display(),
                    test = %pair.test.display(),
                    "{}",
                    err
                );
                summary.record_failure();
                failures.push(Failure {
                    reference: pair.reference.clone(),
                    test: pair.test.clone(),
                    error: err.to_string(),
                });
            }
        }
    }
    workspace.close();

    if cli.json {
        let report = Report {
            pairs: &reports,
            failures: &failures,
            summary: &summary,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if pairs.len() > 1 {
        print_summary(&summary);
    }

    Ok(if summary.all_bit_exact() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn db(value: Option<f64>) -> String {
    value.map_or_else(|| "MATCH".to_string(), |db| format!("{:.2}", db))
}

fn opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:+.6}", v))
}

fn side_path<'a>(report: &'a PairReport, side: StreamSide) -> &'a Path {
    match side {
        StreamSide::Reference => &report.reference,
        StreamSide::Test => &report.test,
    }
}

fn print_pair(report: &PairReport) {
    println!(
        "{} <-> {}",
        report.reference.display(),
        report.test.display()
    );
    if let Some(alignment) = &report.alignment {
        match alignment.advanced {
            Some(side) => println!(
                "  {} is ahead by {} frames ({} bytes), residual {:.6e}",
                side_path(report, side).display(),
                alignment.offset_frames,
                alignment.byte_offset,
                alignment.min_ssd
            ),
            None => println!("  No offset found"),
        }
        if alignment.common_silence_frames > 0 {
            println!(
                "  Common leading silence: {} frames",
                alignment.common_silence_frames
            );
        }
    }

    println!("  Frames compared: {}", report.frames);
    let [reference_left, test_left] = report.unmatched_frames;
    if reference_left > 0 || test_left > 0 {
        println!(
            "  Unmatched frames: reference {}, test {}",
            reference_left, test_left
        );
    }

    if report.metrics.bit_exact {
        println!("  Bit-exact");
        return;
    }
    print_metrics("total", &report.metrics);
    if report.channel_metrics.len() > 1 {
        for (ch, metrics) in report.channel_metrics.iter().enumerate() {
            print_metrics(&format!("ch {}", ch), metrics);
        }
    }
}

fn print_metrics(label: &str, m: &Metrics) {
    println!(
        "  {:>6}: PSNR {} dB, SNR {} dB, peak {:.6} ({} dB), RMS {:.3e}, DC {:+.3e}, bits {}, gain {}, corr {}, ACF {}",
        label,
        db(m.psnr_square_db),
        db(m.snr_db),
        m.abs_max,
        db(m.abs_max_db),
        m.rms,
        m.dc_offset,
        m.effective_bits
            .map_or_else(|| "-".to_string(), |b| format!("{:.3}", b)),
        opt(m.amplification),
        opt(m.signal_correlation),
        opt(m.noise_autocorrelation),
    );
}

fn print_summary(summary: &SessionSummary) {
    let metrics = summary.metrics();
    println!();
    println!(
        "{} of {} pairs compared, {} differ",
        summary.compared, summary.pairs, summary.differing
    );
    println!("Average PSNR: {} dB", db(metrics.psnr_square_db));
    if let Some(name) = &summary.worst_mean_sqr_name {
        println!("Worst PSNR:   {} dB ({})", db(summary.worst_psnr_db()), name);
    }
    if let Some(name) = &summary.worst_abs_name {
        println!("Worst peak:   {:.6} ({})", summary.worst_abs, name);
    }
}
