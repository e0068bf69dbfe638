//! Call budget tracking and refresh frequency gating
//!
//! The Viper service allows roughly 5,000 calls per year and exposes no
//! counter of its own, so the tracker cannot enforce the quota. It only gates
//! how often *scheduled* refreshes may run:
//!
//! - interval 0 (the default) disables scheduled refreshes entirely
//! - otherwise a scheduled refresh is allowed once `interval` has elapsed since
//!   the vehicle's last refresh attempt, whatever triggered that attempt
//! - after a remote start the vehicle enters a boosted window in which the
//!   lower bound shrinks to `min(interval, boost_interval)`
//!
//! Manual and post-command refreshes are always granted.

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};
use viper_core::{RefreshReason, VehicleId, ANNUAL_CALL_BUDGET, CALLS_PER_REFRESH};

const SECONDS_PER_YEAR: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Default)]
struct BudgetEntry {
    last_attempt: Option<Instant>,
    boosted_until: Option<Instant>,
    calls: u64,
}

/// Per-vehicle frequency gate and call counter
pub struct RateBudget {
    interval: Option<Duration>,
    boost_interval: Duration,
    boost_duration: Duration,
    entries: DashMap<VehicleId, BudgetEntry>,
}

impl RateBudget {
    /// Create a tracker; a zero `interval` disables scheduled refreshes
    pub fn new(interval: Duration, boost_interval: Duration, boost_duration: Duration) -> Self {
        Self {
            interval: (!interval.is_zero()).then_some(interval),
            boost_interval,
            boost_duration,
            entries: DashMap::new(),
        }
    }

    /// Whether scheduled refreshes can ever run
    pub fn polling_enabled(&self) -> bool {
        self.interval.is_some()
    }

    /// The configured lower bound between scheduled refreshes
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// How often a scheduler should ask; fine enough to honour the boosted bound
    pub fn tick_period(&self) -> Option<Duration> {
        self.interval.map(|i| i.min(self.boost_interval))
    }

    /// Whether a refresh for this reason may run now
    pub fn may_refresh(&self, vehicle_id: &VehicleId, reason: RefreshReason) -> bool {
        if reason.is_explicit() {
            return true;
        }

        let Some(interval) = self.interval else {
            trace!(vehicle_id = %vehicle_id, "Scheduled refresh disabled");
            return false;
        };

        let now = Instant::now();
        let mut entry = self.entries.entry(vehicle_id.clone()).or_default();

        if entry.boosted_until.is_some_and(|until| now >= until) {
            debug!(vehicle_id = %vehicle_id, "Boosted polling window expired");
            entry.boosted_until = None;
        }

        let bound = if entry.boosted_until.is_some() {
            interval.min(self.boost_interval)
        } else {
            interval
        };

        match entry.last_attempt {
            None => true,
            Some(last) => now.duration_since(last) >= bound,
        }
    }

    /// Note that a refresh started now, for any reason
    pub fn mark_attempt(&self, vehicle_id: &VehicleId) {
        self.entries.entry(vehicle_id.clone()).or_default().last_attempt = Some(Instant::now());
    }

    /// Count upstream calls made on behalf of a vehicle
    pub fn record_call(&self, vehicle_id: &VehicleId, count: u32) {
        self.entries.entry(vehicle_id.clone()).or_default().calls += u64::from(count);
    }

    /// Calls recorded for one vehicle since startup
    pub fn calls(&self, vehicle_id: &VehicleId) -> u64 {
        self.entries.get(vehicle_id).map(|e| e.calls).unwrap_or(0)
    }

    /// Calls recorded across all vehicles since startup
    pub fn total_calls(&self) -> u64 {
        self.entries.iter().map(|e| e.calls).sum()
    }

    /// Open the boosted window for a vehicle, e.g. after a remote start
    pub fn start_boost(&self, vehicle_id: &VehicleId) {
        if self.interval.is_none() {
            return;
        }
        let until = Instant::now() + self.boost_duration;
        self.entries.entry(vehicle_id.clone()).or_default().boosted_until = Some(until);
        debug!(vehicle_id = %vehicle_id, duration = ?self.boost_duration, "Boosted polling enabled");
    }

    pub fn end_boost(&self, vehicle_id: &VehicleId) {
        if let Some(mut entry) = self.entries.get_mut(vehicle_id) {
            if entry.boosted_until.take().is_some() {
                debug!(vehicle_id = %vehicle_id, "Boosted polling ended");
            }
        }
    }

    pub fn is_boosted(&self, vehicle_id: &VehicleId) -> bool {
        let now = Instant::now();
        self.entries
            .get(vehicle_id)
            .and_then(|e| e.boosted_until)
            .is_some_and(|until| now < until)
    }

    /// Yearly calls the configured interval would consume for `vehicles`, if polling is on
    pub fn projected_annual_calls(&self, vehicles: usize) -> Option<u64> {
        let secs = self.interval?.as_secs().max(1);
        Some(SECONDS_PER_YEAR / secs * u64::from(CALLS_PER_REFRESH) * vehicles as u64)
    }

    /// Whether the projection exceeds the documented yearly allowance
    pub fn exceeds_annual_budget(&self, vehicles: usize) -> bool {
        self.projected_annual_calls(vehicles)
            .is_some_and(|calls| calls > ANNUAL_CALL_BUDGET)
    }
}
