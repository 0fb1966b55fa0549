use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use tracing::debug;

use super::{RollupError, RollupReport};
use crate::domain::{previous_month, GenerationDaily, GenerationMonthly, HomeId};
use crate::repo::{SummaryBatch, TelemetryStore};

/// Daily and monthly rollups of renewable generation per home.
#[derive(Default)]
pub struct GenerationRollup;

impl GenerationRollup {
    pub async fn run(
        &self,
        store: &dyn TelemetryStore,
        today: NaiveDate,
    ) -> Result<RollupReport, RollupError> {
        let yesterday = today.pred_opt().ok_or(RollupError::InvalidWindow(today))?;
        let homes = store.homes().await?;
        let mut report = RollupReport::for_date(yesterday);
        let mut batch = SummaryBatch::default();

        for home in &homes {
            match store.sum_generation_energy_on(home.id, yesterday).await? {
                Some(total_kwh) => batch.generation_dailies.push(GenerationDaily {
                    home_id: home.id,
                    date: yesterday,
                    total_kwh,
                }),
                None => {
                    debug!(home = %home.name, date = %yesterday, "no readings, skipping daily");
                    report.entities_skipped += 1;
                }
            }
        }
        report.daily_written = batch.generation_dailies.len();

        if let Some(span) = previous_month(today) {
            let staged: HashMap<HomeId, f64> =
                batch.generation_dailies.iter().map(|d| (d.home_id, d.total_kwh)).collect();
            for home in &homes {
                let mut dailies =
                    store.generation_dailies_between(home.id, span.first, span.last).await?;
                if let Some(&fresh) = staged.get(&home.id) {
                    match dailies.iter_mut().find(|d| d.date == span.last) {
                        Some(slot) => slot.total_kwh = fresh,
                        None => dailies.push(GenerationDaily {
                            home_id: home.id,
                            date: span.last,
                            total_kwh: fresh,
                        }),
                    }
                }
                if dailies.is_empty() {
                    continue;
                }
                let daily_totals: BTreeMap<NaiveDate, f64> =
                    dailies.iter().map(|d| (d.date, d.total_kwh)).collect();
                batch.generation_monthlies.push(GenerationMonthly {
                    home_id: home.id,
                    year: span.year,
                    month: span.month,
                    total_kwh: daily_totals.values().sum(),
                    daily_totals,
                });
            }
            report.monthly_written = batch.generation_monthlies.len();
        }

        if !batch.is_empty() {
            store.apply(batch).await?;
        }
        Ok(report)
    }
}
