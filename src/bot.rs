// Telegram front end: commands plus the spreadsheet upload flow.
//
// Each upload runs the pipeline once. The outputs that follow are sent
// independently, so a failed photo or sheet write never hides the text.
use crate::aggregator::reference_day_now;
use crate::config::AppConfig;
use crate::error::{ReportError, ReportResult};
use crate::message::{diagnostic_message, kpi_message, order_listing, split_message, summary_message, MESSAGE_LIMIT};
use crate::pipeline::{self, PipelineOutput};
use crate::render::{render_dashboard, RenderStyle};
use crate::sheets::{cell_updates, SheetsClient};
use crate::types::KpiTable;
use crate::util::format_long_date;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::sync::Arc;
use teloxide::dispatching::UpdateFilterExt;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{Document, InputFile};
use teloxide::utils::command::BotCommands;
use teloxide::RequestError;
use tracing::{debug, error, info, warn};

const SPREADSHEET_EXTENSIONS: &[&str] = &["xls", "xlsx", "xlsm", "xlsb", "ods"];

#[derive(Debug, BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
enum Command {
    #[command(description = "introduce the bot")]
    Start,
    #[command(description = "show this help")]
    Help,
}

pub async fn run(config: AppConfig) -> Result<()> {
    let token = std::env::var("TELOXIDE_TOKEN").context("TELOXIDE_TOKEN is not set")?;
    let bot = Bot::new(token);

    match bot.get_me().await {
        Ok(me) => info!(username = ?me.user.username, "bot started"),
        Err(err) => warn!(error = %err, "failed to fetch bot info"),
    }
    if !config.sheets_enabled() {
        info!("sheet sink disabled, SHEETS_ACCESS_TOKEN or SHEETS_SPREADSHEET_ID missing");
    }

    let handler = Update::filter_message()
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(dptree::filter(|msg: Message| msg.document().is_some()).endpoint(handle_document));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![Arc::new(config)])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_command(bot: Bot, msg: Message, cmd: Command) -> Result<()> {
    info!(chat_id = %msg.chat.id, command = ?cmd, "command received");
    let text = match cmd {
        Command::Start => "Send me the work-order export (.xls or .xlsx) and I will reply with the \
                           daily dashboard, the headline summary and the KPI per area."
            .to_string(),
        Command::Help => Command::descriptions().to_string(),
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

/// Whether the upload name carries a spreadsheet extension.
fn is_spreadsheet_name(name: &str) -> bool {
    let Some((_, ext)) = name.rsplit_once('.') else {
        return false;
    };
    let ext = ext.to_ascii_lowercase();
    SPREADSHEET_EXTENSIONS.contains(&ext.as_str())
}

fn log_send<T>(what: &str, res: Result<T, RequestError>) {
    if let Err(err) = res {
        warn!(error = %err, what, "telegram send failed");
    }
}

async fn handle_document(bot: Bot, msg: Message, config: Arc<AppConfig>) -> Result<()> {
    let Some(doc) = msg.document() else {
        return Ok(());
    };
    let chat = msg.chat.id;
    let file_name = doc.file_name.clone().unwrap_or_default();
    info!(chat_id = %chat, file = %file_name, size = doc.file.size, "document received");

    if !is_spreadsheet_name(&file_name) {
        bot.send_message(chat, "Please upload the report as an .xls or .xlsx file.")
            .await?;
        return Ok(());
    }

    bot.send_message(chat, format!("Processing {file_name} ...")).await?;

    let built = match download(&bot, doc).await {
        Ok(bytes) => build_report(bytes, file_name.clone(), reference_day_now(config.offset), Arc::clone(&config)).await,
        Err(err) => Err(err),
    };
    let (out, png) = match built {
        Ok(v) => v,
        Err(err) => {
            warn!(chat_id = %chat, file = %file_name, error = %err, "upload failed");
            bot.send_message(chat, err.user_message()).await?;
            return Ok(());
        }
    };

    log_send(
        "diagnostic",
        bot.send_message(chat, diagnostic_message(&out.normalize, out.latest_day, out.daily_records.len()))
            .await,
    );

    match png {
        Ok(png) => log_send(
            "dashboard",
            bot.send_photo(chat, InputFile::memory(png).file_name("dashboard.png"))
                .caption(format!("Dashboard for latest date: {}", format_long_date(out.latest_day)))
                .await,
        ),
        Err(err) => {
            warn!(error = %err, "dashboard render failed");
            log_send(
                "dashboard notice",
                bot.send_message(chat, "The dashboard image could not be rendered.").await,
            );
        }
    }

    log_send(
        "summary",
        bot.send_message(chat, summary_message(&out.summary, out.latest_day)).await,
    );
    send_failed_orders(&bot, chat, &out, &config).await;

    if let Some(kpi) = &out.kpi {
        for chunk in split_message(&kpi_message(kpi), MESSAGE_LIMIT) {
            log_send("kpi", bot.send_message(chat, chunk).await);
        }
        if let Some(status) = write_sheet(kpi, &config).await {
            log_send("sheet status", bot.send_message(chat, status).await);
        }
    }

    info!(chat_id = %chat, file = %file_name, "report delivered");
    Ok(())
}

/// Anything that stops an upload after it was acknowledged.
#[derive(Debug, thiserror::Error)]
enum UploadError {
    #[error("download failed: {0}")]
    Download(String),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error("report task died: {0}")]
    Crashed(#[from] tokio::task::JoinError),
}

impl UploadError {
    fn user_message(&self) -> String {
        match self {
            UploadError::Download(reason) => {
                format!("An error occurred while fetching your file from Telegram: {reason}")
            }
            UploadError::Report(err) => err.user_message(),
            UploadError::Crashed(_) => {
                "An error occurred while processing your file. Please try again.".to_string()
            }
        }
    }
}

async fn download(bot: &Bot, doc: &Document) -> Result<Vec<u8>, UploadError> {
    let file = bot
        .get_file(doc.file.id.clone())
        .await
        .map_err(|e| UploadError::Download(e.to_string()))?;
    let mut bytes = Vec::with_capacity(file.size as usize);
    bot.download_file(&file.path, &mut bytes)
        .await
        .map_err(|e| UploadError::Download(e.to_string()))?;
    debug!(size = bytes.len(), "upload downloaded");
    Ok(bytes)
}

/// Pipeline plus dashboard render, off the async workers. A render failure
/// is carried alongside the output instead of failing the upload.
async fn build_report(
    bytes: Vec<u8>,
    file_name: String,
    today: NaiveDate,
    config: Arc<AppConfig>,
) -> Result<(PipelineOutput, ReportResult<Vec<u8>>), UploadError> {
    let (out, png) = tokio::task::spawn_blocking(move || {
        let out = pipeline::run(&bytes, &file_name, today, &config.report)?;
        let png = render_dashboard(&out.composition, out.latest_day, &config.font_path, &RenderStyle::default());
        Ok::<_, ReportError>((out, png))
    })
    .await??;
    Ok((out, png))
}

async fn send_failed_orders(bot: &Bot, chat: ChatId, out: &PipelineOutput, config: &AppConfig) {
    if out.summary.failed == 0 {
        return;
    }
    let composer = &config.report.composer;
    let listing = order_listing(
        &out.daily_records,
        &composer.areas,
        std::slice::from_ref(&composer.failed_status),
    );
    let text = format!("Failed orders\n\n{listing}");
    for chunk in split_message(&text, MESSAGE_LIMIT) {
        log_send("failed orders", bot.send_message(chat, chunk).await);
    }
}

/// Status line for the chat, or `None` when the sheet sink is not configured.
async fn write_sheet(kpi: &KpiTable, config: &AppConfig) -> Option<String> {
    let (Some(token), Some(mapping)) = (&config.sheets_access_token, &config.sheet_mapping) else {
        return None;
    };
    let updates = cell_updates(kpi, mapping);
    let status = match SheetsClient::new(token.clone()).write(mapping, &updates).await {
        Ok(cells) => format!("Spreadsheet updated ({cells} cells)."),
        Err(err) if !err.is_terminal() => {
            warn!(error = %err, "sheet write failed");
            err.user_message()
        }
        Err(err) => {
            error!(error = %err, "sheet write failed unexpectedly");
            "Spreadsheet update failed.".to_string()
        }
    };
    Some(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spreadsheet_names_are_recognized_by_extension() {
        assert!(is_spreadsheet_name("report.xls"));
        assert!(is_spreadsheet_name("REPORT.XLSX"));
        assert!(is_spreadsheet_name("export.2025.03.05.xlsx"));
        assert!(!is_spreadsheet_name("report.csv"));
        assert!(!is_spreadsheet_name("report"));
        assert!(!is_spreadsheet_name(""));
    }

    fn config(font_path: std::path::PathBuf) -> Arc<AppConfig> {
        Arc::new(AppConfig {
            report: crate::config::ReportConfig::default(),
            offset: chrono::FixedOffset::east_opt(7 * 3600).unwrap(),
            font_path,
            sheets_access_token: None,
            sheet_mapping: None,
        })
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 5).unwrap()
    }

    #[tokio::test]
    async fn unreadable_upload_gets_an_explanation() {
        let err = build_report(vec![0, 159, 146, 150], "broken.xlsx".into(), day(), config("missing.ttf".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Report(ReportError::MalformedFile(_))));
        assert_eq!(
            err.user_message(),
            ReportError::MalformedFile(String::new()).user_message()
        );
    }

    #[tokio::test]
    async fn render_failure_does_not_fail_the_upload() {
        let html = b"<table>\
            <tr><th>SCORDERNO</th><th>STO</th><th>STATUSDATE</th><th>STATUS</th><th>ERRORCODE</th><th>SUBERRORCODE</th></tr>\
            <tr><td>1</td><td>CID</td><td>2025-03-05</td><td>COMPWORK</td><td></td><td></td></tr>\
            </table>";
        let dir = tempfile::tempdir().unwrap();
        let (out, png) = build_report(html.to_vec(), "export.xls".into(), day(), config(dir.path().join("missing.ttf")))
            .await
            .unwrap();
        assert_eq!(out.latest_day, day());
        assert!(png.is_err());
    }

    #[tokio::test]
    async fn crashed_and_download_failures_have_user_replies() {
        let join_err = tokio::spawn(async { panic!("render thread died") }).await.unwrap_err();
        let crashed = UploadError::from(join_err);
        assert!(crashed.user_message().starts_with("An error occurred while processing your file"));

        let download = UploadError::Download("timed out".into());
        assert_eq!(
            download.user_message(),
            "An error occurred while fetching your file from Telegram: timed out"
        );
    }

    #[test]
    fn help_lists_both_commands() {
        let help = Command::descriptions().to_string();
        assert!(help.contains("/start"));
        assert!(help.contains("/help"));
    }
}
