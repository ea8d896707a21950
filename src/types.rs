use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tabled::Tabled;

/// Cell text keyed by upper-cased header, as read from any sheet or table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecordSet {
    pub columns: Vec<String>,
    pub rows: Vec<HashMap<String, String>>,
}

impl RawRecordSet {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Append another set, keeping the first-seen column order.
    pub fn extend(&mut self, other: RawRecordSet) {
        for col in other.columns {
            if !self.columns.contains(&col) {
                self.columns.push(col);
            }
        }
        self.rows.extend(other.rows);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkOrderRecord {
    pub order_id: String,
    pub area: String,
    pub created_at: Option<NaiveDateTime>,
    pub status_date: Option<NaiveDateTime>,
    pub status: String,
    pub error_code: Option<String>,
    pub sub_error_code: Option<String>,
    pub promise_date: Option<NaiveDateTime>,
    pub package: Option<String>,
    pub product: Option<String>,
    pub product_type: Option<String>,
}

impl WorkOrderRecord {
    pub fn status_day(&self) -> Option<NaiveDate> {
        self.status_date.map(|d| d.date())
    }
}

/// Named KPI columns produced per area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    CreatedToday,
    CompletedToday,
    CompletedYesterday,
    #[serde(rename = "completed_last_7_days")]
    CompletedLast7Days,
    StartedOverdue,
    StartedDueToday,
    StartedDueTomorrow,
    StartedDueLater,
    StartedNoPromise,
    FailedCustomer,
    FailedNetwork,
    ProductCompletedToday,
    ProductPotential,
    CreatedMonthToDate,
    CompletedMonthToDate,
}

impl Metric {
    pub const ALL: [Metric; 15] = [
        Metric::CreatedToday,
        Metric::CompletedToday,
        Metric::CompletedYesterday,
        Metric::CompletedLast7Days,
        Metric::StartedOverdue,
        Metric::StartedDueToday,
        Metric::StartedDueTomorrow,
        Metric::StartedDueLater,
        Metric::StartedNoPromise,
        Metric::FailedCustomer,
        Metric::FailedNetwork,
        Metric::ProductCompletedToday,
        Metric::ProductPotential,
        Metric::CreatedMonthToDate,
        Metric::CompletedMonthToDate,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KpiRow {
    pub area: String,
    pub metrics: BTreeMap<Metric, u64>,
}

impl KpiRow {
    pub fn zeroed(area: &str) -> Self {
        KpiRow {
            area: area.to_string(),
            metrics: Metric::ALL.iter().map(|m| (*m, 0)).collect(),
        }
    }

    pub fn get(&self, metric: Metric) -> u64 {
        self.metrics.get(&metric).copied().unwrap_or(0)
    }

    pub fn bump(&mut self, metric: Metric) {
        *self.metrics.entry(metric).or_insert(0) += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiTable {
    pub reference_day: NaiveDate,
    pub rows: Vec<KpiRow>,
}

impl KpiTable {
    pub fn row(&self, area: &str) -> Option<&KpiRow> {
        self.rows.iter().find(|r| r.area == area)
    }

    pub fn get(&self, area: &str, metric: Metric) -> u64 {
        self.row(area).map(|r| r.get(metric)).unwrap_or(0)
    }

    pub fn total(&self, metric: Metric) -> u64 {
        self.rows.iter().map(|r| r.get(metric)).sum()
    }
}

/// 0 = grand total, 1 = status, 2 = error code, 3 = sub-error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RowLevel {
    GrandTotal = 0,
    Status = 1,
    ErrorCode = 2,
    SubErrorCode = 3,
}

impl RowLevel {
    pub fn depth(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub level: RowLevel,
    pub label: String,
    pub counts: Vec<u64>,
    pub total: u64,
}

impl ReportRow {
    pub fn new(level: RowLevel, label: impl Into<String>, counts: Vec<u64>) -> Self {
        let total = counts.iter().sum();
        ReportRow {
            level,
            label: label.into(),
            counts,
            total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportTable {
    pub day: Option<NaiveDate>,
    pub areas: Vec<String>,
    pub rows: Vec<ReportRow>,
}

impl ReportTable {
    pub fn grand_total(&self) -> Option<&ReportRow> {
        self.rows.iter().find(|r| r.level == RowLevel::GrandTotal)
    }
}

#[cfg(test)]
impl ReportTable {
    pub fn find(&self, level: RowLevel, label: &str) -> Option<&ReportRow> {
        self.rows.iter().find(|r| r.level == level && r.label == label)
    }
}

/// Result of composing a day's records.
#[derive(Debug, Clone, PartialEq)]
pub enum Composition {
    Table(ReportTable),
    NoRelevantData,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DailySummary {
    pub completed: u64,
    pub acknowledged: u64,
    pub started: u64,
    pub progressing: u64,
    pub failed: u64,
    pub estimated_completion: u64,
}

/// Which product field carried the marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductField {
    Package,
    Product,
    ProductType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductLine {
    pub marker: String,
    pub matched_on: ProductField,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct KpiPreviewRow {
    #[serde(rename = "Area")]
    #[tabled(rename = "Area")]
    pub area: String,
    #[serde(rename = "Created")]
    #[tabled(rename = "Created")]
    pub created_today: u64,
    #[serde(rename = "CompToday")]
    #[tabled(rename = "CompToday")]
    pub completed_today: u64,
    #[serde(rename = "CompYesterday")]
    #[tabled(rename = "CompYesterday")]
    pub completed_yesterday: u64,
    #[serde(rename = "Comp7d")]
    #[tabled(rename = "Comp7d")]
    pub completed_last_7_days: u64,
    #[serde(rename = "Overdue")]
    #[tabled(rename = "Overdue")]
    pub started_overdue: u64,
    #[serde(rename = "DueToday")]
    #[tabled(rename = "DueToday")]
    pub started_due_today: u64,
    #[serde(rename = "DueTomorrow")]
    #[tabled(rename = "DueTomorrow")]
    pub started_due_tomorrow: u64,
    #[serde(rename = "DueLater")]
    #[tabled(rename = "DueLater")]
    pub started_due_later: u64,
    #[serde(rename = "FailCust")]
    #[tabled(rename = "FailCust")]
    pub failed_customer: u64,
    #[serde(rename = "FailNet")]
    #[tabled(rename = "FailNet")]
    pub failed_network: u64,
    #[serde(rename = "CompRate")]
    #[tabled(rename = "CompRate")]
    pub completion_rate: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct ReportPreviewRow {
    #[serde(rename = "Level")]
    #[tabled(rename = "Level")]
    pub level: u8,
    #[serde(rename = "Category")]
    #[tabled(rename = "Category")]
    pub label: String,
    #[serde(rename = "Counts")]
    #[tabled(rename = "Counts")]
    pub counts: String,
    #[serde(rename = "Total")]
    #[tabled(rename = "Total")]
    pub total: u64,
}

/// Contents of `summary.json` in command line mode.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub file: String,
    pub latest_day: NaiveDate,
    pub rows_read: usize,
    pub rows_dropped: usize,
    pub rows_on_latest_day: usize,
    pub headline: DailySummary,
    pub kpi: Option<KpiTable>,
}
