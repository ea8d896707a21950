// File and console output for the command line mode.
use crate::aggregator::completion_rate_today;
use crate::error::ReportResult;
use crate::types::{KpiPreviewRow, KpiTable, Metric, ReportPreviewRow, ReportTable};
use crate::util::format_percentage;
use serde::Serialize;
use std::error::Error;
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), Box<dyn Error>> {
    let mut wtr = csv::Writer::from_path(path)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), Box<dyn Error>> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

pub fn write_bytes(path: &Path, bytes: &[u8]) -> ReportResult<()> {
    std::fs::write(path, bytes)?;
    Ok(())
}

pub fn kpi_preview_rows(kpi: &KpiTable) -> Vec<KpiPreviewRow> {
    kpi.rows
        .iter()
        .map(|row| KpiPreviewRow {
            area: row.area.clone(),
            created_today: row.get(Metric::CreatedToday),
            completed_today: row.get(Metric::CompletedToday),
            completed_yesterday: row.get(Metric::CompletedYesterday),
            completed_last_7_days: row.get(Metric::CompletedLast7Days),
            started_overdue: row.get(Metric::StartedOverdue),
            started_due_today: row.get(Metric::StartedDueToday),
            started_due_tomorrow: row.get(Metric::StartedDueTomorrow),
            started_due_later: row.get(Metric::StartedDueLater),
            failed_customer: row.get(Metric::FailedCustomer),
            failed_network: row.get(Metric::FailedNetwork),
            completion_rate: format_percentage(completion_rate_today(row)),
        })
        .collect()
}

pub fn report_preview_rows(table: &ReportTable) -> Vec<ReportPreviewRow> {
    table
        .rows
        .iter()
        .map(|row| ReportPreviewRow {
            level: row.level.depth(),
            label: format!("{}{}", "  ".repeat(row.level.depth().saturating_sub(1) as usize), row.label),
            counts: table
                .areas
                .iter()
                .zip(&row.counts)
                .map(|(a, c)| format!("{a}={c}"))
                .collect::<Vec<_>>()
                .join(" "),
            total: row.total,
        })
        .collect()
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().cloned().take(max_rows).collect();
    if slice.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let table_str = Table::new(slice).with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}
