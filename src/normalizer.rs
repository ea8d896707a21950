// Field normalizer: raw cell text -> canonical work-order records.
use crate::config::{NormalizerConfig, ReportKind};
use crate::error::{ReportError, ReportResult};
use crate::types::{RawRecordSet, WorkOrderRecord};
use crate::util::{canonical, canonical_opt, parse_datetime_safe};
use std::collections::HashMap;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub rows_read: usize,
    pub dropped_no_status_date: usize,
    pub rows_kept: usize,
}

/// Names from `required` that the record set does not carry, in order.
pub fn missing_columns(raw: &RawRecordSet, required: &[String]) -> Vec<String> {
    required
        .iter()
        .filter(|col| !raw.has_column(col))
        .cloned()
        .collect()
}

pub fn normalize(
    raw: &RawRecordSet,
    kind: ReportKind,
    config: &NormalizerConfig,
) -> ReportResult<(Vec<WorkOrderRecord>, NormalizeReport)> {
    let required = match kind {
        ReportKind::Dashboard => config.columns.dashboard_required(),
        ReportKind::Kpi => config.columns.kpi_required(),
    };
    let missing = missing_columns(raw, &required);
    if !missing.is_empty() {
        info!(?missing, "upload rejected, required columns absent");
        return Err(ReportError::MissingRequiredColumns(missing));
    }

    let parsed = raw
        .rows
        .iter()
        .map(|row| record_from_row(row, config))
        .collect();
    let (records, report) = normalize_records(parsed, config);
    info!(
        read = report.rows_read,
        dropped = report.dropped_no_status_date,
        kept = report.rows_kept,
        "records normalized"
    );

    if records.is_empty() {
        return Err(ReportError::NoValidDateData);
    }
    Ok((records, report))
}

/// Canonicalize every record and drop the ones without a status date.
///
/// Applying this to its own output changes nothing.
pub fn normalize_records(
    records: Vec<WorkOrderRecord>,
    config: &NormalizerConfig,
) -> (Vec<WorkOrderRecord>, NormalizeReport) {
    let rows_read = records.len();
    let kept: Vec<WorkOrderRecord> = records
        .into_iter()
        .map(|r| canonicalize(r, &config.null_sentinels))
        .filter(|r| r.status_date.is_some())
        .collect();
    let report = NormalizeReport {
        rows_read,
        dropped_no_status_date: rows_read - kept.len(),
        rows_kept: kept.len(),
    };
    (kept, report)
}

pub fn canonicalize(record: WorkOrderRecord, null_sentinels: &[String]) -> WorkOrderRecord {
    WorkOrderRecord {
        order_id: canonical(&record.order_id),
        area: canonical(&record.area),
        status: canonical(&record.status),
        error_code: canonical_opt(record.error_code.as_deref(), null_sentinels),
        sub_error_code: canonical_opt(record.sub_error_code.as_deref(), null_sentinels),
        package: canonical_opt(record.package.as_deref(), null_sentinels),
        product: canonical_opt(record.product.as_deref(), null_sentinels),
        product_type: canonical_opt(record.product_type.as_deref(), null_sentinels),
        ..record
    }
}

fn record_from_row(row: &HashMap<String, String>, config: &NormalizerConfig) -> WorkOrderRecord {
    let cols = &config.columns;
    let text = |name: &str| row.get(name).map(|s| s.as_str());
    let date = |name: &str| {
        let value = text(name);
        let parsed = parse_datetime_safe(value);
        if parsed.is_none() && value.is_some_and(|v| !v.trim().is_empty()) {
            debug!(column = name, value = value.unwrap_or_default(), "unparseable date");
        }
        parsed
    };

    WorkOrderRecord {
        order_id: text(&cols.order_id).unwrap_or_default().to_string(),
        area: text(&cols.area).unwrap_or_default().to_string(),
        created_at: date(&cols.created_at),
        status_date: date(&cols.status_date),
        status: text(&cols.status).unwrap_or_default().to_string(),
        error_code: text(&cols.error_code).map(str::to_string),
        sub_error_code: text(&cols.sub_error_code).map(str::to_string),
        promise_date: date(&cols.promise_date),
        package: text(&cols.package).map(str::to_string),
        product: text(&cols.product).map(str::to_string),
        product_type: text(&cols.product_type).map(str::to_string),
    }
}
