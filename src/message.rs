// Plain-text chat messages built from the pipeline output.
use crate::aggregator::{completion_rate_month_to_date, completion_rate_today};
use crate::normalizer::NormalizeReport;
use crate::types::{DailySummary, KpiTable, Metric, WorkOrderRecord};
use crate::util::{format_int, format_long_date, format_percentage};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Telegram rejects text messages longer than this.
pub const MESSAGE_LIMIT: usize = 4096;

const RULE: &str = "------------------------------------";

pub fn diagnostic_message(report: &NormalizeReport, latest: NaiveDate, rows_on_latest: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Data diagnostics");
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Rows in file: {}", format_int(report.rows_read as u64));
    let _ = writeln!(
        out,
        "Rows dropped (empty STATUSDATE): {}",
        format_int(report.dropped_no_status_date as u64)
    );
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Latest date found: {}", format_long_date(latest));
    let _ = writeln!(out, "Rows for this date: {}", format_int(rows_on_latest as u64));
    let _ = write!(out, "{RULE}");
    out
}

pub fn summary_message(summary: &DailySummary, day: NaiveDate) -> String {
    let lines = [
        ("Completed", summary.completed),
        ("Acknowledged / validated", summary.acknowledged),
        ("Started", summary.started),
        ("Progressing", summary.progressing),
        ("Failed", summary.failed),
        ("Estimated completion", summary.estimated_completion),
    ];
    let mut out = format!("Summary for {}\n", format_long_date(day));
    for (label, value) in lines {
        let _ = writeln!(out, "{label}: {}", format_int(value));
    }
    out.trim_end().to_string()
}

pub fn kpi_message(kpi: &KpiTable) -> String {
    let mut out = format!("KPI per area, {}\n", format_long_date(kpi.reference_day));
    let _ = writeln!(
        out,
        "All areas: created {} | completed {} | failed {}",
        kpi.total(Metric::CreatedToday),
        kpi.total(Metric::CompletedToday),
        kpi.total(Metric::FailedCustomer) + kpi.total(Metric::FailedNetwork)
    );
    for row in &kpi.rows {
        let _ = writeln!(out, "\n{}", row.area);
        let _ = writeln!(
            out,
            "  Created today: {} | completion rate {}",
            row.get(Metric::CreatedToday),
            format_percentage(completion_rate_today(row))
        );
        let _ = writeln!(
            out,
            "  Completed today / yesterday / 7 days: {} / {} / {}",
            row.get(Metric::CompletedToday),
            row.get(Metric::CompletedYesterday),
            row.get(Metric::CompletedLast7Days)
        );
        let _ = writeln!(
            out,
            "  Started overdue / today / tomorrow / later: {} / {} / {} / {}",
            row.get(Metric::StartedOverdue),
            row.get(Metric::StartedDueToday),
            row.get(Metric::StartedDueTomorrow),
            row.get(Metric::StartedDueLater)
        );
        if row.get(Metric::StartedNoPromise) > 0 {
            let _ = writeln!(out, "  Started without promise date: {}", row.get(Metric::StartedNoPromise));
        }
        let _ = writeln!(
            out,
            "  Failed customer / network: {} / {}",
            row.get(Metric::FailedCustomer),
            row.get(Metric::FailedNetwork)
        );
        let _ = writeln!(
            out,
            "  Product line completed today / potential: {} / {}",
            row.get(Metric::ProductCompletedToday),
            row.get(Metric::ProductPotential)
        );
        let _ = writeln!(
            out,
            "  Month to date created / completed: {} / {} ({})",
            row.get(Metric::CreatedMonthToDate),
            row.get(Metric::CompletedMonthToDate),
            format_percentage(completion_rate_month_to_date(row))
        );
    }
    out.trim_end().to_string()
}

/// Order ids grouped by area, then status, for the given statuses only.
pub fn order_listing(records: &[WorkOrderRecord], areas: &[String], statuses: &[String]) -> String {
    let mut grouped: BTreeMap<(usize, usize), Vec<&str>> = BTreeMap::new();
    for r in records {
        let (Some(a), Some(s)) = (
            areas.iter().position(|x| x == &r.area),
            statuses.iter().position(|x| x == &r.status),
        ) else {
            continue;
        };
        grouped.entry((a, s)).or_default().push(r.order_id.as_str());
    }

    let mut out = String::new();
    let mut current_area = None;
    for ((a, s), mut ids) in grouped {
        if current_area != Some(a) {
            let _ = writeln!(out, "\n{}", areas[a]);
            current_area = Some(a);
        }
        ids.sort_unstable();
        let _ = writeln!(out, "  {} ({}): {}", statuses[s], ids.len(), ids.join(", "));
    }
    if out.is_empty() {
        return "No matching orders.".to_string();
    }
    out.trim().to_string()
}

/// Split on line boundaries so every chunk fits in `limit` characters.
/// A single line longer than the limit is cut.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in text.lines() {
        let line: String = line.chars().take(limit).collect();
        let needed = if current.is_empty() { line.chars().count() } else { current.chars().count() + 1 + line.chars().count() };
        if needed > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(&line);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KpiRow;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 5).unwrap()
    }

    #[test]
    fn diagnostic_lists_counts_and_date() {
        let report = NormalizeReport {
            rows_read: 1200,
            dropped_no_status_date: 3,
            rows_kept: 1197,
        };
        let text = diagnostic_message(&report, day(), 412);
        assert!(text.contains("Rows in file: 1,200"));
        assert!(text.contains("Rows dropped (empty STATUSDATE): 3"));
        assert!(text.contains("Latest date found: 05 March 2025"));
        assert!(text.contains("Rows for this date: 412"));
    }

    #[test]
    fn summary_has_six_headline_numbers() {
        let summary = DailySummary {
            completed: 4,
            acknowledged: 2,
            started: 1,
            progressing: 3,
            failed: 5,
            estimated_completion: 6,
        };
        let text = summary_message(&summary, day());
        assert_eq!(text.lines().count(), 7);
        assert!(text.contains("Estimated completion: 6"));
    }

    #[test]
    fn kpi_message_mentions_every_area() {
        let mut cid = KpiRow::zeroed("CID");
        cid.bump(Metric::CreatedToday);
        cid.bump(Metric::CompletedToday);
        let kpi = KpiTable {
            reference_day: day(),
            rows: vec![cid, KpiRow::zeroed("CPP")],
        };
        let text = kpi_message(&kpi);
        assert!(text.contains("\nCID\n"));
        assert!(text.contains("\nCPP\n"));
        assert!(text.contains("completion rate 100.0%"));
        assert!(text.contains("completion rate -"));
    }

    #[test]
    fn listing_groups_by_area_then_status() {
        let rec = |id: &str, area: &str, status: &str| WorkOrderRecord {
            order_id: id.into(),
            area: area.into(),
            created_at: None,
            status_date: None,
            status: status.into(),
            error_code: None,
            sub_error_code: None,
            promise_date: None,
            package: None,
            product: None,
            product_type: None,
        };
        let records = vec![
            rec("B2", "CPP", "WORKFAIL"),
            rec("A9", "CID", "STARTWORK"),
            rec("A1", "CID", "STARTWORK"),
            rec("C1", "XYZ", "STARTWORK"),
        ];
        let areas = vec!["CID".to_string(), "CPP".to_string()];
        let statuses = vec!["STARTWORK".to_string(), "WORKFAIL".to_string()];
        let text = order_listing(&records, &areas, &statuses);
        assert_eq!(text, "CID\n  STARTWORK (2): A1, A9\n\nCPP\n  WORKFAIL (1): B2");
        assert_eq!(order_listing(&[], &areas, &statuses), "No matching orders.");
    }

    #[test]
    fn long_text_is_split_on_lines() {
        let text = (0..10).map(|i| format!("line {i:02}")).collect::<Vec<_>>().join("\n");
        let chunks = split_message(&text, 20);
        assert!(chunks.iter().all(|c| c.chars().count() <= 20));
        assert_eq!(chunks.join("\n"), text);
        assert_eq!(chunks.len(), 5);
    }
}
