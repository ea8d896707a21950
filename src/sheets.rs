// External sheet sink: KPI values written to fixed cells of a shared
// spreadsheet through the Sheets v4 `values:batchUpdate` endpoint.
//
// The cell coordinates are static configuration. Any failure here is
// reported as `ExternalSinkFailure` and never stops the other outputs.
use crate::error::{ReportError, ReportResult};
use crate::types::{KpiTable, Metric};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

#[derive(Debug, Clone)]
pub struct SheetMapping {
    pub spreadsheet_id: String,
    pub tab: String,
    /// Area code -> 1-based sheet row.
    pub area_rows: BTreeMap<String, u32>,
    /// Metric -> column letter(s).
    pub metric_columns: BTreeMap<Metric, String>,
}

impl SheetMapping {
    /// Default layout of the daily KPI tab for the given spreadsheet.
    pub fn with_spreadsheet(spreadsheet_id: impl Into<String>) -> Self {
        let area_rows = [("CID", 5), ("CPP", 6), ("CKA", 7), ("SKB", 8), ("PLR", 9)]
            .into_iter()
            .map(|(a, r)| (a.to_string(), r))
            .collect();
        let metric_columns = [
            (Metric::CreatedToday, "C"),
            (Metric::CompletedToday, "D"),
            (Metric::CompletedYesterday, "E"),
            (Metric::CompletedLast7Days, "F"),
            (Metric::StartedOverdue, "G"),
            (Metric::StartedDueToday, "H"),
            (Metric::StartedDueTomorrow, "I"),
            (Metric::StartedDueLater, "J"),
            (Metric::FailedCustomer, "K"),
            (Metric::FailedNetwork, "L"),
            (Metric::ProductCompletedToday, "M"),
            (Metric::ProductPotential, "N"),
        ]
        .into_iter()
        .map(|(m, c)| (m, c.to_string()))
        .collect();

        SheetMapping {
            spreadsheet_id: spreadsheet_id.into(),
            tab: "KPI HARIAN".to_string(),
            area_rows,
            metric_columns,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellUpdate {
    pub row: u32,
    pub column: String,
    pub value: u64,
}

impl CellUpdate {
    pub fn a1(&self, tab: &str) -> String {
        format!("'{}'!{}{}", tab.replace('\'', "''"), self.column, self.row)
    }
}

/// Cells to write for a KPI table; areas or metrics without a mapping are skipped.
pub fn cell_updates(kpi: &KpiTable, mapping: &SheetMapping) -> Vec<CellUpdate> {
    let mut updates = Vec::new();
    for (area, &sheet_row) in &mapping.area_rows {
        if kpi.row(area).is_none() {
            continue;
        }
        for (metric, column) in &mapping.metric_columns {
            updates.push(CellUpdate {
                row: sheet_row,
                column: column.clone(),
                value: kpi.get(area, *metric),
            });
        }
    }
    updates
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchUpdateRequest {
    value_input_option: &'static str,
    data: Vec<ValueRange>,
}

#[derive(Debug, Serialize)]
struct ValueRange {
    range: String,
    values: Vec<Vec<u64>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchUpdateResponse {
    #[serde(default)]
    total_updated_cells: usize,
}

fn batch_request(tab: &str, updates: &[CellUpdate]) -> BatchUpdateRequest {
    BatchUpdateRequest {
        value_input_option: "USER_ENTERED",
        data: updates
            .iter()
            .map(|u| ValueRange {
                range: u.a1(tab),
                values: vec![vec![u.value]],
            })
            .collect(),
    }
}

pub struct SheetsClient {
    http: reqwest::Client,
    access_token: String,
    base_url: String,
}

impl SheetsClient {
    pub fn new(access_token: impl Into<String>) -> Self {
        SheetsClient {
            http: reqwest::Client::new(),
            access_token: access_token.into(),
            base_url: SHEETS_API.to_string(),
        }
    }

    /// Single best-effort write; returns the number of updated cells.
    pub async fn write(&self, mapping: &SheetMapping, updates: &[CellUpdate]) -> ReportResult<usize> {
        if updates.is_empty() {
            return Ok(0);
        }
        let url = format!("{}/{}/values:batchUpdate", self.base_url, mapping.spreadsheet_id);
        let body = batch_request(&mapping.tab, updates);

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(%status, spreadsheet = %mapping.spreadsheet_id, "sheet update rejected");
            return Err(ReportError::ExternalSinkFailure(format!(
                "{}: {}",
                status,
                text.chars().take(200).collect::<String>()
            )));
        }

        let body = resp.text().await?;
        let cells = updated_cells(&body).unwrap_or_else(|| {
            warn!(
                spreadsheet = %mapping.spreadsheet_id,
                "sheet update accepted but the response was not understood, assuming every cell was written"
            );
            updates.len()
        });
        info!(spreadsheet = %mapping.spreadsheet_id, tab = %mapping.tab, cells, "sheet updated");
        Ok(cells)
    }
}

/// `totalUpdatedCells` from a batchUpdate response body, `None` when the body
/// is not the expected JSON.
fn updated_cells(body: &str) -> Option<usize> {
    match serde_json::from_str::<BatchUpdateResponse>(body) {
        Ok(parsed) => Some(parsed.total_updated_cells),
        Err(e) => {
            warn!(error = %e, "undecodable sheet update response");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KpiRow;
    use chrono::NaiveDate;

    fn kpi() -> KpiTable {
        let mut cid = KpiRow::zeroed("CID");
        cid.bump(Metric::CompletedToday);
        cid.bump(Metric::CompletedToday);
        let mut cpp = KpiRow::zeroed("CPP");
        cpp.bump(Metric::FailedNetwork);
        KpiTable {
            reference_day: NaiveDate::from_ymd_opt(2025, 3, 5).unwrap(),
            rows: vec![cid, cpp, KpiRow::zeroed("ZZZ")],
        }
    }

    #[test]
    fn updates_follow_the_static_mapping() {
        let mapping = SheetMapping::with_spreadsheet("sheet-id");
        let updates = cell_updates(&kpi(), &mapping);

        // two mapped areas, every mapped metric each
        assert_eq!(updates.len(), 2 * mapping.metric_columns.len());
        assert!(updates.contains(&CellUpdate { row: 5, column: "D".into(), value: 2 }));
        assert!(updates.contains(&CellUpdate { row: 6, column: "L".into(), value: 1 }));
        assert!(updates.contains(&CellUpdate { row: 6, column: "D".into(), value: 0 }));
    }

    #[test]
    fn alternate_mapping_only_writes_listed_cells() {
        let mapping = SheetMapping {
            spreadsheet_id: "x".into(),
            tab: "Daily".into(),
            area_rows: [("CPP".to_string(), 12)].into_iter().collect(),
            metric_columns: [(Metric::FailedNetwork, "AB".to_string())].into_iter().collect(),
        };
        let updates = cell_updates(&kpi(), &mapping);
        assert_eq!(updates, vec![CellUpdate { row: 12, column: "AB".into(), value: 1 }]);
        assert_eq!(updates[0].a1(&mapping.tab), "'Daily'!AB12");
    }

    #[test]
    fn updated_cell_count_comes_from_the_response() {
        assert_eq!(updated_cells(r#"{"spreadsheetId":"x","totalUpdatedCells":24}"#), Some(24));
        assert_eq!(updated_cells("{}"), Some(0));
        assert_eq!(updated_cells("<html>proxy error</html>"), None);
    }

    #[test]
    fn request_body_uses_a1_ranges() {
        let updates = vec![CellUpdate { row: 5, column: "D".into(), value: 2 }];
        let body = serde_json::to_value(batch_request("KPI HARIAN", &updates)).unwrap();
        assert_eq!(body["valueInputOption"], "USER_ENTERED");
        assert_eq!(body["data"][0]["range"], "'KPI HARIAN'!D5");
        assert_eq!(body["data"][0]["values"][0][0], 2);
    }
}
