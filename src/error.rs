use thiserror::Error;

/// Precondition failures that abort a batch before any output is written.
///
/// Row-level degeneracies (undefined ratios, constant features) are not
/// errors and never surface here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScoringError {
    /// The feature table is missing columns the scorers depend on.
    #[error("Feature table is missing required columns: {}", columns.join(", "))]
    MissingColumns { columns: Vec<String> },

    /// A transfer amount that is negative or not an integer.
    #[error("Invalid amount '{value}' on transfer {transfer_id}")]
    InvalidAmount { transfer_id: String, value: String },

    /// A batch period that does not name a calendar month.
    #[error("Invalid batch period {year}-{month:02}")]
    InvalidPeriod { year: i32, month: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_columns_lists_every_column() {
        let err = ScoringError::MissingColumns {
            columns: vec!["egonet_density".to_string(), "unique_in_degree".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Feature table is missing required columns: egonet_density, unique_in_degree"
        );
    }
}
