// Entry point.
//
// With `--file <path>` the report runs once, offline:
// - previews of the status table and KPI table are printed as markdown,
// - `dashboard.png`, `kpi.csv` and `summary.json` land in `--out` (default `.`).
// Without `--file` the Telegram bot starts and serves uploads until Ctrl-C.
mod aggregator;
mod bot;
mod composer;
mod config;
mod error;
mod loader;
mod logging;
mod message;
mod normalizer;
mod output;
mod pipeline;
mod render;
mod sheets;
mod types;
mod util;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use config::AppConfig;
use std::path::{Path, PathBuf};
use tracing::info;
use types::{Composition, RunSummary};

/// Daily work-order KPI report: Telegram bot, or a one-off offline run.
#[derive(Parser, Debug, Default, PartialEq)]
#[command(name = "kpi-report-bot")]
#[command(about = "Work-order dashboard and KPI report, as a Telegram bot or offline")]
struct CliArgs {
    /// Spreadsheet to report on; without it the bot starts
    #[arg(long, value_name = "FILE")]
    file: Option<PathBuf>,

    /// Reference day for the KPI windows (defaults to today)
    #[arg(long, value_name = "YYYY-MM-DD", value_parser = parse_day)]
    day: Option<NaiveDate>,

    /// Directory for dashboard.png, kpi.csv and summary.json
    #[arg(long, value_name = "DIR")]
    out: Option<PathBuf>,
}

fn parse_day(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| format!("{raw} is not YYYY-MM-DD: {e}"))
}

/// Run the pipeline over a local file and write every output next to each other.
fn run_offline(path: &Path, day: Option<NaiveDate>, out_dir: &Path, config: &AppConfig) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let today = day.unwrap_or_else(|| aggregator::reference_day_now(config.offset));

    let out = match pipeline::run(&bytes, &file_name, today, &config.report) {
        Ok(out) => out,
        Err(err) => bail!("{}", err.user_message()),
    };
    std::fs::create_dir_all(out_dir).with_context(|| format!("failed to create {}", out_dir.display()))?;

    println!(
        "Read {} rows from {} of {} sheets ({:?} source)\n",
        util::format_int(out.load.rows as u64),
        out.load.sheets_matched,
        out.load.sheets_scanned,
        out.load.format
    );
    println!("{}\n", message::diagnostic_message(&out.normalize, out.latest_day, out.daily_records.len()));

    println!("Daily status dashboard, {}\n", util::format_long_date(out.latest_day));
    match &out.composition {
        Composition::Table(table) => {
            let rows = output::report_preview_rows(table);
            output::preview_table_rows(&rows, rows.len());
        }
        Composition::NoRelevantData => println!("(no relevant data)\n"),
    }
    let png_path = out_dir.join("dashboard.png");
    match render::render_dashboard(
        &out.composition,
        out.latest_day,
        &config.font_path,
        &render::RenderStyle::default(),
    )
    .and_then(|png| output::write_bytes(&png_path, &png))
    {
        Ok(()) => println!("(Dashboard image saved to {})\n", png_path.display()),
        Err(e) => eprintln!("Render error: {}", e),
    }

    println!("{}\n", message::summary_message(&out.summary, out.latest_day));
    if out.summary.failed > 0 {
        let composer = &config.report.composer;
        let listing = message::order_listing(
            &out.daily_records,
            &composer.areas,
            std::slice::from_ref(&composer.failed_status),
        );
        println!("Failed orders\n\n{}\n", listing);
    }

    if let Some(kpi) = &out.kpi {
        println!("KPI per area, reference day {}\n", util::format_long_date(kpi.reference_day));
        let rows = output::kpi_preview_rows(kpi);
        output::preview_table_rows(&rows, rows.len());
        let csv_path = out_dir.join("kpi.csv");
        if let Err(e) = output::write_csv(&csv_path, &rows) {
            eprintln!("Write error: {}", e);
        } else {
            println!("(Full table exported to {})\n", csv_path.display());
        }
    } else {
        println!("KPI columns not present in this file; KPI table skipped.\n");
    }

    let summary = RunSummary {
        file: file_name,
        latest_day: out.latest_day,
        rows_read: out.normalize.rows_read,
        rows_dropped: out.normalize.dropped_no_status_date,
        rows_on_latest_day: out.daily_records.len(),
        headline: out.summary,
        kpi: out.kpi.clone(),
    };
    let json_path = out_dir.join("summary.json");
    if let Err(e) = output::write_json(&json_path, &summary) {
        eprintln!("Write error: {}", e);
    }
    info!(out = %out_dir.display(), "offline report written");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let args = CliArgs::parse();
    let config = AppConfig::from_env()?;

    match args.file {
        Some(path) => {
            let out_dir = args.out.unwrap_or_else(|| PathBuf::from("."));
            run_offline(&path, args.day, &out_dir, &config)
        }
        None => bot::run(config).await,
    }
}
