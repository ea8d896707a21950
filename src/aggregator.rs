// KPI aggregator: per-area counts for one reference day.
//
// Window and status predicates are evaluated once per record; every known
// area gets a row even when nothing matched it.
use crate::config::AggregatorConfig;
use crate::types::{KpiRow, KpiTable, Metric, ProductField, ProductLine, WorkOrderRecord};
use crate::util::percentage;
use chrono::{Datelike, Duration, FixedOffset, NaiveDate, Utc};
use std::collections::HashMap;
use tracing::debug;

/// Today's calendar date in the given fixed offset.
pub fn reference_day_now(offset: FixedOffset) -> NaiveDate {
    Utc::now().with_timezone(&offset).date_naive()
}

/// Checks the package, product and product-type fields in that order and
/// returns the first one carrying the configured marker.
pub fn classify_product(record: &WorkOrderRecord, config: &AggregatorConfig) -> Option<ProductLine> {
    let marker = config.product_marker.trim().to_uppercase();
    if marker.is_empty() {
        return None;
    }
    let fields = [
        (ProductField::Package, record.package.as_deref()),
        (ProductField::Product, record.product.as_deref()),
        (ProductField::ProductType, record.product_type.as_deref()),
    ];
    fields
        .into_iter()
        .find(|(_, value)| value.is_some_and(|v| v.to_uppercase().contains(&marker)))
        .map(|(field, _)| ProductLine {
            marker: marker.clone(),
            matched_on: field,
        })
}

/// Where a started order's promise date falls relative to the reference day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseBucket {
    Overdue,
    DueToday,
    DueTomorrow,
    DueLater,
    NoPromise,
}

impl PromiseBucket {
    pub fn of(promise: Option<NaiveDate>, today: NaiveDate) -> Self {
        let Some(promise) = promise else {
            return PromiseBucket::NoPromise;
        };
        match (promise - today).num_days() {
            d if d < 0 => PromiseBucket::Overdue,
            0 => PromiseBucket::DueToday,
            1 => PromiseBucket::DueTomorrow,
            _ => PromiseBucket::DueLater,
        }
    }

    fn metric(self) -> Metric {
        match self {
            PromiseBucket::Overdue => Metric::StartedOverdue,
            PromiseBucket::DueToday => Metric::StartedDueToday,
            PromiseBucket::DueTomorrow => Metric::StartedDueTomorrow,
            PromiseBucket::DueLater => Metric::StartedDueLater,
            PromiseBucket::NoPromise => Metric::StartedNoPromise,
        }
    }
}

/// Failure cause derived from the error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    Customer,
    Network,
}

pub fn classify_failure(error_code: Option<&str>, config: &AggregatorConfig) -> Option<FailureCause> {
    let code = error_code?;
    if config.customer_error_codes.iter().any(|c| c == code) {
        Some(FailureCause::Customer)
    } else if config.network_error_codes.iter().any(|c| c == code) {
        Some(FailureCause::Network)
    } else {
        None
    }
}

struct Windows {
    today: NaiveDate,
    yesterday: NaiveDate,
    week_start: NaiveDate,
    month_start: NaiveDate,
}

impl Windows {
    fn new(today: NaiveDate) -> Self {
        Windows {
            today,
            yesterday: today - Duration::days(1),
            week_start: today - Duration::days(6),
            month_start: today.with_day(1).unwrap_or(today),
        }
    }

    fn in_month_to_date(&self, d: NaiveDate) -> bool {
        d >= self.month_start && d <= self.today
    }
}

pub fn aggregate(records: &[WorkOrderRecord], today: NaiveDate, config: &AggregatorConfig) -> KpiTable {
    let windows = Windows::new(today);
    let mut rows: Vec<KpiRow> = config.areas.iter().map(|a| KpiRow::zeroed(a)).collect();
    let index: HashMap<&str, usize> = config
        .areas
        .iter()
        .enumerate()
        .map(|(i, a)| (a.as_str(), i))
        .collect();

    let mut skipped_unknown_area = 0usize;

    for record in records {
        let Some(&row_idx) = index.get(record.area.as_str()) else {
            skipped_unknown_area += 1;
            continue;
        };
        let row = &mut rows[row_idx];

        let changed = record.status_day();
        let created = record.created_at.map(|d| d.date());
        let changed_today = changed == Some(windows.today);
        let changed_yesterday = changed == Some(windows.yesterday);
        let changed_this_week = changed.is_some_and(|d| d >= windows.week_start && d <= windows.today);
        let changed_this_month = changed.is_some_and(|d| windows.in_month_to_date(d));

        let completed = contains(&config.completed_statuses, &record.status);
        let started = contains(&config.started_statuses, &record.status);
        let failed = contains(&config.failed_statuses, &record.status);

        if created == Some(windows.today) {
            row.bump(Metric::CreatedToday);
        }
        if created.is_some_and(|d| windows.in_month_to_date(d)) {
            row.bump(Metric::CreatedMonthToDate);
        }

        if completed {
            if changed_today {
                row.bump(Metric::CompletedToday);
            }
            if changed_yesterday {
                row.bump(Metric::CompletedYesterday);
            }
            if changed_this_week {
                row.bump(Metric::CompletedLast7Days);
            }
            if changed_this_month {
                row.bump(Metric::CompletedMonthToDate);
            }
        }

        if started {
            let bucket = PromiseBucket::of(record.promise_date.map(|d| d.date()), windows.today);
            row.bump(bucket.metric());
        }

        if failed {
            match classify_failure(record.error_code.as_deref(), config) {
                Some(FailureCause::Customer) => row.bump(Metric::FailedCustomer),
                Some(FailureCause::Network) => row.bump(Metric::FailedNetwork),
                None => {}
            }
        }

        if classify_product(record, config).is_some() {
            if completed && changed_today {
                row.bump(Metric::ProductCompletedToday);
            }
            if !completed && !failed {
                row.bump(Metric::ProductPotential);
            }
        }
    }

    debug!(
        records = records.len(),
        skipped_unknown_area,
        areas = rows.len(),
        %today,
        "kpi aggregation done"
    );
    KpiTable {
        reference_day: today,
        rows,
    }
}

fn contains(set: &[String], status: &str) -> bool {
    set.iter().any(|s| s == status)
}

/// Completed today over created today, in percent.
pub fn completion_rate_today(row: &KpiRow) -> Option<f64> {
    percentage(row.get(Metric::CompletedToday), row.get(Metric::CreatedToday))
}

/// Month-to-date completed over month-to-date created, in percent.
pub fn completion_rate_month_to_date(row: &KpiRow) -> Option<f64> {
    percentage(
        row.get(Metric::CompletedMonthToDate),
        row.get(Metric::CreatedMonthToDate),
    )
}
