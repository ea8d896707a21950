// Error taxonomy for one upload.
//
// The first four variants end the request and are explained to the user.
// `ExternalSinkFailure` is only ever logged and shown as a status line.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("missing required columns: {}", .0.join(", "))]
    MissingRequiredColumns(Vec<String>),

    #[error("no row has a valid status-change date")]
    NoValidDateData,

    #[error("no sheet or table contains the essential headers")]
    NoValidDataFound,

    #[error("file could not be parsed as a spreadsheet or html table: {0}")]
    MalformedFile(String),

    #[error("external sheet update failed: {0}")]
    ExternalSinkFailure(String),

    #[error("rendering failed: {0}")]
    Render(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ReportError {
    /// Whether the request must stop here.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReportError::ExternalSinkFailure(_))
    }

    /// Sentence shown to the chat user.
    pub fn user_message(&self) -> String {
        match self {
            ReportError::MissingRequiredColumns(missing) => format!(
                "The uploaded file is missing required headers: {}",
                missing.join(", ")
            ),
            ReportError::NoValidDateData => {
                "No rows with a valid date were found in the STATUSDATE column.".to_string()
            }
            ReportError::NoValidDataFound => {
                "No sheet in the file contains the expected report headers.".to_string()
            }
            ReportError::MalformedFile(_) => {
                "The file could not be read. Please upload an .xls or .xlsx export.".to_string()
            }
            ReportError::ExternalSinkFailure(reason) => {
                format!("Spreadsheet update skipped: {}", reason)
            }
            ReportError::Render(_) | ReportError::Io(_) => {
                "Something went wrong while preparing the report. Please try again.".to_string()
            }
        }
    }
}

impl From<reqwest::Error> for ReportError {
    fn from(err: reqwest::Error) -> Self {
        ReportError::ExternalSinkFailure(err.to_string())
    }
}

pub type ReportResult<T> = Result<T, ReportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_columns_are_listed_in_message() {
        let err = ReportError::MissingRequiredColumns(vec!["STO".into(), "STATUS".into()]);
        assert_eq!(err.to_string(), "missing required columns: STO, STATUS");
        assert!(err.user_message().contains("STO, STATUS"));
        assert!(err.is_terminal());
    }

    #[test]
    fn sink_failure_is_not_terminal() {
        let err = ReportError::ExternalSinkFailure("403".into());
        assert!(!err.is_terminal());
    }
}
