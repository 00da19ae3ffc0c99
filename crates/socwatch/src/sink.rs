//! Publisher selection for the daemon.

use tracing::info;

use socwatch_core::{AnalysisMap, CoreError, Publisher, SheetsPublisher};

/// Google Sheets when configured; otherwise analyses only land on disk.
pub enum Sink {
    Sheets(SheetsPublisher),
    Disabled,
}

impl Publisher for Sink {
    async fn publish(&self, analyses: &AnalysisMap) -> Result<(), CoreError> {
        match self {
            Self::Sheets(sheets) => sheets.publish(analyses).await,
            Self::Disabled => {
                info!(sites = analyses.len(), "publishing disabled, analysis kept on disk");
                Ok(())
            }
        }
    }
}
