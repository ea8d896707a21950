// Immutable configuration for the report pipeline and the bot process.
//
// Vocabularies and column names live here instead of module constants so the
// aggregator and composer can be exercised against alternate mappings.
use crate::sheets::SheetMapping;
use chrono::FixedOffset;
use std::env;
use std::path::PathBuf;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_areas() -> Vec<String> {
    strings(&["CID", "CPP", "CKA", "SKB", "PLR"])
}

#[derive(Debug, Clone)]
pub struct ColumnNames {
    pub order_id: String,
    pub area: String,
    pub created_at: String,
    pub status_date: String,
    pub status: String,
    pub error_code: String,
    pub sub_error_code: String,
    pub promise_date: String,
    pub package: String,
    pub product: String,
    pub product_type: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        ColumnNames {
            order_id: "SCORDERNO".into(),
            area: "STO".into(),
            created_at: "ORDERDATE".into(),
            status_date: "STATUSDATE".into(),
            status: "STATUS".into(),
            error_code: "ERRORCODE".into(),
            sub_error_code: "SUBERRORCODE".into(),
            promise_date: "TGL_MANJA".into(),
            package: "PACKAGE_NAME".into(),
            product: "PRODUCT".into(),
            product_type: "PRODUCT_TYPE".into(),
        }
    }
}

impl ColumnNames {
    /// Columns the daily status dashboard cannot do without.
    pub fn dashboard_required(&self) -> Vec<String> {
        vec![
            self.order_id.clone(),
            self.area.clone(),
            self.status_date.clone(),
            self.status.clone(),
            self.error_code.clone(),
            self.sub_error_code.clone(),
        ]
    }

    /// Dashboard columns plus the ones the KPI windows read.
    pub fn kpi_required(&self) -> Vec<String> {
        let mut cols = self.dashboard_required();
        cols.push(self.created_at.clone());
        cols.push(self.promise_date.clone());
        cols
    }
}

/// Which column set an upload is validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Dashboard,
    Kpi,
}

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub essential_headers: Vec<String>,
    pub header_scan_rows: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            essential_headers: strings(&["SCORDERNO", "STO", "STATUS"]),
            header_scan_rows: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    pub columns: ColumnNames,
    /// Values that mean "no value" after trimming and upper-casing.
    pub null_sentinels: Vec<String>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        NormalizerConfig {
            columns: ColumnNames::default(),
            null_sentinels: strings(&["", "NAN", "NONE", "NULL", "NAT", "-"]),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub areas: Vec<String>,
    pub completed_statuses: Vec<String>,
    pub started_statuses: Vec<String>,
    pub failed_statuses: Vec<String>,
    pub customer_error_codes: Vec<String>,
    pub network_error_codes: Vec<String>,
    pub product_marker: String,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        AggregatorConfig {
            areas: default_areas(),
            completed_statuses: strings(&["COMPWORK"]),
            started_statuses: strings(&["STARTWORK"]),
            failed_statuses: strings(&["WORKFAIL"]),
            customer_error_codes: strings(&[
                "KENDALA PELANGGAN",
                "PELANGGAN MENOLAK",
                "PELANGGAN TIDAK DITEMUKAN",
                "ALAMAT TIDAK DITEMUKAN",
                "RUMAH KOSONG",
                "DOUBLE INPUT",
            ]),
            network_error_codes: strings(&[
                "KENDALA TEKNIK",
                "KENDALA JARINGAN",
                "ODP FULL",
                "ODP JAUH",
                "ODP RUSAK",
                "REDAMAN TINGGI",
                "TIANG TIDAK ADA",
            ]),
            product_marker: "INDIBIZ".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComposerConfig {
    pub areas: Vec<String>,
    pub status_order: Vec<String>,
    pub failed_status: String,
    pub null_sentinels: Vec<String>,
    pub completed_statuses: Vec<String>,
    pub acknowledged_statuses: Vec<String>,
    pub started_statuses: Vec<String>,
    pub progressing_statuses: Vec<String>,
    pub grand_total_label: String,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        ComposerConfig {
            areas: default_areas(),
            status_order: strings(&[
                "STARTWORK",
                "PENDWORK",
                "CONTWORK",
                "INSTCOMP",
                "ACTCOMP",
                "VALSTART",
                "VALCOMP",
                "COMPWORK",
                "WORKFAIL",
                "CANCLWORK",
            ]),
            failed_status: "WORKFAIL".into(),
            null_sentinels: strings(&["", "NAN", "NONE", "NULL", "NAT", "-"]),
            completed_statuses: strings(&["COMPWORK"]),
            acknowledged_statuses: strings(&["ACTCOMP", "VALSTART", "VALCOMP"]),
            started_statuses: strings(&["STARTWORK"]),
            progressing_statuses: strings(&["PENDWORK", "CONTWORK", "INSTCOMP"]),
            grand_total_label: "Grand Total".into(),
        }
    }
}

/// Everything the pipeline needs for one upload.
#[derive(Debug, Clone, Default)]
pub struct ReportConfig {
    pub loader: LoaderConfig,
    pub normalizer: NormalizerConfig,
    pub aggregator: AggregatorConfig,
    pub composer: ComposerConfig,
}

/// Process settings read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub report: ReportConfig,
    pub offset: FixedOffset,
    pub font_path: PathBuf,
    pub sheets_access_token: Option<String>,
    pub sheet_mapping: Option<SheetMapping>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let offset_hours = match env::var("REPORT_UTC_OFFSET_HOURS") {
            Ok(raw) => raw
                .trim()
                .parse::<i32>()
                .map_err(|e| anyhow::anyhow!("REPORT_UTC_OFFSET_HOURS={raw}: {e}"))?,
            Err(_) => 7,
        };
        let offset = FixedOffset::east_opt(offset_hours * 3600)
            .ok_or_else(|| anyhow::anyhow!("REPORT_UTC_OFFSET_HOURS={offset_hours} is out of range"))?;
        let font_path = env::var("REPORT_FONT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"));

        let sheets_access_token = non_empty_var("SHEETS_ACCESS_TOKEN");
        let sheet_mapping = non_empty_var("SHEETS_SPREADSHEET_ID").map(|id| {
            let mut mapping = SheetMapping::with_spreadsheet(id);
            if let Some(tab) = non_empty_var("SHEETS_TAB") {
                mapping.tab = tab;
            }
            mapping
        });

        Ok(AppConfig {
            report: ReportConfig::default(),
            offset,
            font_path,
            sheets_access_token,
            sheet_mapping,
        })
    }

    pub fn sheets_enabled(&self) -> bool {
        self.sheets_access_token.is_some() && self.sheet_mapping.is_some()
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kpi_columns_extend_dashboard_columns() {
        let cols = ColumnNames::default();
        let dash = cols.dashboard_required();
        let kpi = cols.kpi_required();
        assert!(dash.iter().all(|c| kpi.contains(c)));
        assert!(kpi.contains(&"TGL_MANJA".to_string()));
    }
}
