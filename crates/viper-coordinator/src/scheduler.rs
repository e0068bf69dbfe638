//! Background task driving scheduled refreshes

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use viper_core::RefreshReason;

use crate::coordinator::Coordinator;

impl Coordinator {
    /// Spawn the scheduled refresh loop
    ///
    /// Returns None when the refresh interval is zero: no timer is armed and
    /// data only changes on manual refreshes and commands. The loop ticks at
    /// the budget's tick period and lets the budget decide which vehicles are
    /// due. It stops once `shutdown` turns true or its sender is dropped.
    pub fn spawn_scheduler(&self, mut shutdown: watch::Receiver<bool>) -> Option<JoinHandle<()>> {
        let budget = self.budget();
        let Some(period) = budget.tick_period() else {
            info!("Automatic refresh disabled, data updates on manual refresh and commands only");
            return None;
        };

        let vehicles = self.vehicle_ids().len();
        if let Some(projected) = budget.projected_annual_calls(vehicles) {
            if budget.exceeds_annual_budget(vehicles) {
                warn!(
                    projected,
                    allowance = viper_core::ANNUAL_CALL_BUDGET,
                    "Refresh interval would exceed the yearly call allowance"
                );
            }
        }

        info!(interval = ?budget.interval(), tick = ?period, "Starting refresh scheduler");

        let coordinator = self.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        for (vehicle_id, result) in coordinator.refresh_all(RefreshReason::Scheduled).await {
                            if let Err(err) = result {
                                debug!(vehicle_id = %vehicle_id, error = %err, "Scheduled refresh failed");
                            }
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            debug!("Refresh scheduler stopping");
                            break;
                        }
                    }
                }
            }
        }))
    }
}
