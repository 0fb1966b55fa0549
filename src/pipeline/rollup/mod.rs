use chrono::NaiveDate;
use thiserror::Error;

use crate::repo::StoreError;

pub mod device;
pub mod generation;
pub mod room;

pub use device::DeviceRollup;
pub use generation::GenerationRollup;
pub use room::RoomRollup;

#[derive(Debug, Error)]
pub enum RollupError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no previous day exists before {0}")]
    InvalidWindow(NaiveDate),
}

/// Counters for one rollup tier invocation. `date` is the day that was
/// summarized, which is always the day before the run date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollupReport {
    pub date: NaiveDate,
    pub daily_written: usize,
    pub monthly_written: usize,
    pub entities_skipped: usize,
}

impl RollupReport {
    fn for_date(date: NaiveDate) -> Self {
        Self { date, daily_written: 0, monthly_written: 0, entities_skipped: 0 }
    }
}
