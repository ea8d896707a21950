// One upload, start to finish: load -> normalize -> aggregate -> compose.
//
// Everything here is synchronous and owned by the call; sinks consume the
// returned `PipelineOutput`.
use crate::aggregator::aggregate;
use crate::composer::{compose, select_latest_day, summarize};
use crate::config::{ReportConfig, ReportKind};
use crate::error::{ReportError, ReportResult};
use crate::loader::{load_records, LoadReport};
use crate::normalizer::{missing_columns, normalize, NormalizeReport};
use crate::types::{Composition, DailySummary, KpiTable, WorkOrderRecord};
use chrono::NaiveDate;
use tracing::info;

#[derive(Debug)]
pub struct PipelineOutput {
    pub load: LoadReport,
    pub normalize: NormalizeReport,
    pub latest_day: NaiveDate,
    pub daily_records: Vec<WorkOrderRecord>,
    pub composition: Composition,
    pub summary: DailySummary,
    /// Present only when the upload carries the KPI columns.
    pub kpi: Option<KpiTable>,
}

pub fn run(bytes: &[u8], file_name: &str, today: NaiveDate, config: &ReportConfig) -> ReportResult<PipelineOutput> {
    let (raw, load) = load_records(bytes, file_name, &config.loader)?;

    let kpi_missing = missing_columns(&raw, &config.normalizer.columns.kpi_required());
    let kind = if kpi_missing.is_empty() { ReportKind::Kpi } else { ReportKind::Dashboard };
    let (records, normalize_report) = normalize(&raw, kind, &config.normalizer)?;

    let (latest_day, daily_records) = select_latest_day(&records).ok_or(ReportError::NoValidDateData)?;
    let composition = compose(&daily_records, Some(latest_day), &config.composer);
    let summary = summarize(&daily_records, &config.composer);

    let kpi = if kind == ReportKind::Kpi {
        Some(aggregate(&records, today, &config.aggregator))
    } else {
        info!(missing = ?kpi_missing, "kpi columns absent, skipping kpi aggregation");
        None
    };

    info!(
        file = file_name,
        latest = %latest_day,
        daily_rows = daily_records.len(),
        kpi = kpi.is_some(),
        "pipeline finished"
    );
    Ok(PipelineOutput {
        load,
        normalize: normalize_report,
        latest_day,
        daily_records,
        composition,
        summary,
        kpi,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Metric, RowLevel};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 5).unwrap()
    }

    fn html(header: &[&str], rows: &[&[&str]]) -> Vec<u8> {
        let mut out = String::from("<html><body><table>");
        out.push_str("<tr>");
        for h in header {
            out.push_str(&format!("<th>{h}</th>"));
        }
        out.push_str("</tr>");
        for row in rows {
            out.push_str("<tr>");
            for cell in *row {
                out.push_str(&format!("<td>{cell}</td>"));
            }
            out.push_str("</tr>");
        }
        out.push_str("</table></body></html>");
        out.into_bytes()
    }

    const KPI_HEADER: &[&str] = &[
        "SCORDERNO", "STO", "ORDERDATE", "STATUSDATE", "STATUS", "ERRORCODE", "SUBERRORCODE", "TGL_MANJA",
    ];

    #[test]
    fn kpi_export_runs_end_to_end() {
        crate::logging::init_test();
        let bytes = html(
            KPI_HEADER,
            &[
                &["1", "cid", "2025-03-01", "2025-03-05 10:00:00", "COMPWORK", "", "", ""],
                &["2", "CPP", "2025-03-05", "2025-03-05 11:00:00", "workfail", "KENDALA TEKNIK", "ODP FULL", ""],
                &["3", "CPP", "2025-03-04", "not a date", "WORKFAIL", "KENDALA PELANGGAN", "", ""],
                &["4", "CKA", "2025-03-02", "2025-03-04 09:00:00", "STARTWORK", "", "", "2025-03-06"],
            ],
        );
        let out = run(&bytes, "export.xls", today(), &ReportConfig::default()).unwrap();

        assert_eq!(out.normalize.rows_read, 4);
        assert_eq!(out.normalize.dropped_no_status_date, 1);
        assert_eq!(out.latest_day, today());
        assert_eq!(out.daily_records.len(), 2);

        let kpi = out.kpi.expect("kpi columns are present");
        assert_eq!(kpi.get("CID", Metric::CompletedToday), 1);
        assert_eq!(kpi.get("CPP", Metric::FailedNetwork), 1);
        // the undated failure was dropped before aggregation
        assert_eq!(kpi.get("CPP", Metric::FailedCustomer), 0);
        assert_eq!(kpi.get("CKA", Metric::StartedDueTomorrow), 1);
        assert_eq!(out.summary.completed, 1);
        assert_eq!(out.summary.failed, 1);

        match out.composition {
            Composition::Table(t) => {
                assert!(t.find(RowLevel::ErrorCode, "KENDALA TEKNIK").is_some());
                assert!(t.find(RowLevel::SubErrorCode, "ODP FULL").is_some());
                assert_eq!(t.grand_total().map(|r| r.total), Some(2));
            }
            Composition::NoRelevantData => panic!("expected a table"),
        }
    }

    #[test]
    fn dashboard_export_skips_kpi() {
        let bytes = html(
            &["SCORDERNO", "STO", "STATUSDATE", "STATUS", "ERRORCODE", "SUBERRORCODE"],
            &[&["1", "CID", "2025-03-05", "COMPWORK", "", ""]],
        );
        let out = run(&bytes, "export.xls", today(), &ReportConfig::default()).unwrap();
        assert!(out.kpi.is_none());
        assert!(matches!(out.composition, Composition::Table(_)));
    }

    #[test]
    fn missing_headers_are_reported_by_name() {
        let bytes = html(&["SCORDERNO", "STO", "STATUS"], &[&["1", "CID", "COMPWORK"]]);
        let err = run(&bytes, "export.xls", today(), &ReportConfig::default()).unwrap_err();
        match err {
            ReportError::MissingRequiredColumns(missing) => {
                assert_eq!(missing, vec!["STATUSDATE", "ERRORCODE", "SUBERRORCODE"])
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn statuses_outside_display_order_give_no_relevant_data() {
        let bytes = html(
            &["SCORDERNO", "STO", "STATUSDATE", "STATUS", "ERRORCODE", "SUBERRORCODE"],
            &[&["1", "CID", "2025-03-05", "ARCHIVED", "", ""]],
        );
        let out = run(&bytes, "export.xls", today(), &ReportConfig::default()).unwrap();
        assert_eq!(out.composition, Composition::NoRelevantData);
    }
}
