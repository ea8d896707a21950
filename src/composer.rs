// Report composer: one day's records -> hierarchical status table and the
// headline summary.
use crate::config::ComposerConfig;
use crate::types::{Composition, DailySummary, ReportRow, ReportTable, RowLevel, WorkOrderRecord};
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// The most recent status-change day and the records that fall on it.
pub fn select_latest_day(records: &[WorkOrderRecord]) -> Option<(NaiveDate, Vec<WorkOrderRecord>)> {
    let latest = records.iter().filter_map(|r| r.status_day()).max()?;
    Some((latest, select_day(records, latest)))
}

pub fn select_day(records: &[WorkOrderRecord], day: NaiveDate) -> Vec<WorkOrderRecord> {
    records
        .iter()
        .filter(|r| r.status_day() == Some(day))
        .cloned()
        .collect()
}

struct AreaCounter<'a> {
    areas: &'a [String],
    index: HashMap<&'a str, usize>,
}

impl<'a> AreaCounter<'a> {
    fn new(areas: &'a [String]) -> Self {
        let index = areas.iter().enumerate().map(|(i, a)| (a.as_str(), i)).collect();
        AreaCounter { areas, index }
    }

    fn count<'r, I>(&self, records: I) -> Vec<u64>
    where
        I: IntoIterator<Item = &'r WorkOrderRecord>,
    {
        let mut counts = vec![0u64; self.areas.len()];
        for r in records {
            if let Some(&i) = self.index.get(r.area.as_str()) {
                counts[i] += 1;
            }
        }
        counts
    }

    fn known(&self, record: &WorkOrderRecord) -> bool {
        self.index.contains_key(record.area.as_str())
    }
}

pub fn compose(records: &[WorkOrderRecord], day: Option<NaiveDate>, config: &ComposerConfig) -> Composition {
    let counter = AreaCounter::new(&config.areas);
    let is_null = |v: &str| config.null_sentinels.iter().any(|n| n == v);
    let mut rows: Vec<ReportRow> = Vec::new();
    let mut grand = vec![0u64; config.areas.len()];

    for status in &config.status_order {
        let with_status: Vec<&WorkOrderRecord> = records
            .iter()
            .filter(|r| &r.status == status && counter.known(r))
            .collect();
        let status_row = ReportRow::new(RowLevel::Status, status.clone(), counter.count(with_status.iter().copied()));
        if status_row.total == 0 {
            continue;
        }
        for (g, c) in grand.iter_mut().zip(&status_row.counts) {
            *g += c;
        }
        rows.push(status_row);

        if status != &config.failed_status {
            continue;
        }

        let codes: BTreeSet<&str> = with_status
            .iter()
            .filter_map(|r| r.error_code.as_deref())
            .filter(|c| !is_null(*c))
            .collect();
        for code in codes {
            let with_code: Vec<&WorkOrderRecord> = with_status
                .iter()
                .copied()
                .filter(|r| r.error_code.as_deref() == Some(code))
                .collect();
            rows.push(ReportRow::new(
                RowLevel::ErrorCode,
                code,
                counter.count(with_code.iter().copied()),
            ));

            let sub_codes: BTreeSet<&str> = with_code
                .iter()
                .filter_map(|r| r.sub_error_code.as_deref())
                .filter(|c| !is_null(*c))
                .collect();
            for sub in sub_codes {
                let sub_row = ReportRow::new(
                    RowLevel::SubErrorCode,
                    sub,
                    counter.count(
                        with_code
                            .iter()
                            .copied()
                            .filter(|r| r.sub_error_code.as_deref() == Some(sub)),
                    ),
                );
                // all-zero sub rows are hidden to keep the image compact
                if sub_row.total > 0 {
                    rows.push(sub_row);
                }
            }
        }
    }

    if rows.is_empty() {
        debug!(records = records.len(), "no record matches the status display order");
        return Composition::NoRelevantData;
    }

    rows.push(ReportRow::new(
        RowLevel::GrandTotal,
        config.grand_total_label.clone(),
        grand,
    ));
    debug!(rows = rows.len(), "report table composed");
    Composition::Table(ReportTable {
        day,
        areas: config.areas.clone(),
        rows,
    })
}

/// Headline numbers over the whole record set handed in.
pub fn summarize(records: &[WorkOrderRecord], config: &ComposerConfig) -> DailySummary {
    let completed = count_statuses(records, &config.completed_statuses);
    let acknowledged = count_statuses(records, &config.acknowledged_statuses);
    DailySummary {
        completed,
        acknowledged,
        started: count_statuses(records, &config.started_statuses),
        progressing: count_statuses(records, &config.progressing_statuses),
        failed: count_statuses(records, std::slice::from_ref(&config.failed_status)),
        estimated_completion: completed + acknowledged,
    }
}

fn count_statuses(records: &[WorkOrderRecord], statuses: &[String]) -> u64 {
    records
        .iter()
        .filter(|r| statuses.iter().any(|s| s == &r.status))
        .count() as u64
}
