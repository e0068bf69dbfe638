//! The vehicle state coordinator
//!
//! The coordinator is the only writer of the snapshot cache. It decides when a
//! refresh may run, collapses concurrent refreshes of one vehicle into a single
//! pair of upstream calls, keeps the last good snapshot when upstream fails, and
//! verifies commands with a follow-up refresh.
//!
//! ```text
//! Idle --refresh--> Refreshing --done (ok or err)--> Idle
//!         ^              |
//!         |     concurrent refresh: join the running one
//! Idle --command ok--> Refreshing(post_command) --> Idle (command settled)
//! ```
//!
//! Each in-flight refresh runs in its own task and completes even if every
//! caller stops waiting for it.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn, Instrument};
use viper_api::{combine, ApiError, ApiResult, SharedVehicleApi};
use viper_core::{
    Command, CommandRequest, RefreshReason, VehicleId, VehicleInfo, VehicleSnapshot,
    VehicleStatus, CALLS_PER_REFRESH,
};

use crate::budget::RateBudget;
use crate::cache::StateCache;
use crate::error::{CommandError, RefreshError, RefreshResult};
use crate::listeners::{ListenerId, Listeners, SnapshotListener};

/// Coordinator tuning, derived from the installation's configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    /// Lower bound between scheduled refreshes; zero disables them
    pub refresh_interval: Duration,
    /// Bound on each upstream call
    pub request_timeout: Duration,
    /// Wait between an accepted command and its verification refresh
    pub action_refresh_delay: Duration,
    /// Scheduled lower bound while a remote start is being watched
    pub boost_interval: Duration,
    /// Longest a boosted window may last
    pub boost_duration: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::ZERO,
            request_timeout: Duration::from_secs(30),
            action_refresh_delay: Duration::from_secs(10),
            boost_interval: Duration::from_secs(60),
            boost_duration: Duration::from_secs(30 * 60),
        }
    }
}

/// Read-only view of a vehicle's refresh bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshState {
    pub last_attempted: Option<DateTime<Utc>>,
    pub in_flight: bool,
    pub pending_verification: bool,
}

/// Result of an accepted command, once its verification refresh has settled
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub request: CommandRequest,
    /// Snapshot read after the command, or why it could not be read
    pub verification: RefreshResult,
}

impl CommandOutcome {
    pub fn verified_snapshot(&self) -> Option<&VehicleSnapshot> {
        self.verification.as_ref().ok()
    }
}

type SharedRefresh = Shared<BoxFuture<'static, RefreshResult>>;

struct InFlight {
    epoch: u64,
    reason: RefreshReason,
    future: SharedRefresh,
}

#[derive(Default)]
struct RefreshSlot {
    /// Incremented each time a refresh starts
    epoch: u64,
    in_flight: Option<InFlight>,
    last_attempted: Option<DateTime<Utc>>,
    /// Accepted commands still waiting for their verification refresh
    pending_commands: usize,
}

pub(crate) struct Inner {
    api: SharedVehicleApi,
    config: CoordinatorConfig,
    pub(crate) budget: RateBudget,
    cache: StateCache,
    listeners: Listeners,
    pub(crate) vehicle_ids: Vec<VehicleId>,
    vehicles: DashMap<VehicleId, VehicleInfo>,
    slots: DashMap<VehicleId, RefreshSlot>,
    auth_failed: AtomicBool,
    login_lock: Mutex<()>,
}

/// Owner of all cached vehicle state for one installation
///
/// Cloning is cheap and every clone shares the same state.
#[derive(Clone)]
pub struct Coordinator {
    pub(crate) inner: Arc<Inner>,
}

impl Coordinator {
    /// Create a coordinator for the given vehicles
    ///
    /// Every vehicle starts with an invalid snapshot; nothing is fetched until
    /// [`setup`](Self::setup) or a refresh runs.
    pub fn new(api: SharedVehicleApi, vehicle_ids: Vec<VehicleId>, config: CoordinatorConfig) -> Self {
        let budget = RateBudget::new(
            config.refresh_interval,
            config.boost_interval,
            config.boost_duration,
        );
        let cache = StateCache::new();
        let vehicles = DashMap::new();
        let slots = DashMap::new();

        let mut ids: Vec<VehicleId> = Vec::with_capacity(vehicle_ids.len());
        for id in vehicle_ids {
            if ids.contains(&id) {
                continue;
            }
            cache.register(&id);
            vehicles.insert(id.clone(), VehicleInfo::unnamed(id.clone()));
            slots.insert(id.clone(), RefreshSlot::default());
            ids.push(id);
        }

        Self {
            inner: Arc::new(Inner {
                api,
                config,
                budget,
                cache,
                listeners: Listeners::new(),
                vehicle_ids: ids,
                vehicles,
                slots,
                auth_failed: AtomicBool::new(false),
                login_lock: Mutex::new(()),
            }),
        }
    }

    /// Log in and resolve configured vehicles against the account
    ///
    /// Vehicles the account does not list keep a placeholder name.
    #[instrument(skip(self))]
    pub async fn setup(&self) -> Result<(), RefreshError> {
        let inner = &self.inner;
        {
            let _guard = inner.login_lock.lock().await;
            inner
                .with_timeout(inner.api.login())
                .await
                .map_err(|err| inner.auth_failure(err))?;
            inner.auth_failed.store(false, Ordering::SeqCst);
        }

        let listed = inner
            .authorized(move || inner.with_timeout(inner.api.list_vehicles()))
            .await?;

        for id in &inner.vehicle_ids {
            match listed.iter().find(|v| &v.id == id) {
                Some(info) => {
                    debug!(vehicle_id = %id, name = %info.name, "Resolved vehicle");
                    inner.vehicles.insert(id.clone(), info.clone());
                }
                None => warn!(vehicle_id = %id, "Configured vehicle not listed on account"),
            }
        }

        info!(vehicles = inner.vehicle_ids.len(), "Coordinator set up");
        Ok(())
    }

    /// Replace the account credentials and log in with them
    ///
    /// Clears the auth-failed latch on success. On failure the latch stays set
    /// and the new credentials are kept for the next attempt.
    #[instrument(skip(self, password))]
    pub async fn reauthenticate(&self, username: &str, password: &str) -> Result<(), RefreshError> {
        let inner = &self.inner;
        let _guard = inner.login_lock.lock().await;
        inner.api.set_credentials(username, password).await;
        inner
            .with_timeout(inner.api.login())
            .await
            .map_err(|err| inner.auth_failure(err))?;

        if inner.auth_failed.swap(false, Ordering::SeqCst) {
            info!("Reauthenticated, refreshes resumed");
        }
        Ok(())
    }

    /// Refresh one vehicle's snapshot
    ///
    /// A scheduled refresh the budget does not allow returns the cached
    /// snapshot. Any other refresh joins the one already running for the
    /// vehicle, or starts a new one.
    #[instrument(skip(self), fields(vehicle_id = %vehicle_id, reason = %reason))]
    pub async fn refresh(&self, vehicle_id: &VehicleId, reason: RefreshReason) -> RefreshResult {
        let future = {
            let mut slot = self
                .inner
                .slots
                .get_mut(vehicle_id)
                .ok_or_else(|| RefreshError::UnknownVehicle(vehicle_id.clone()))?;

            if !self.inner.budget.may_refresh(vehicle_id, reason) {
                drop(slot);
                debug!("Scheduled refresh not due, serving cached snapshot");
                return self.cached(vehicle_id);
            }

            match &slot.in_flight {
                Some(running) => {
                    debug!(running = %running.reason, "Joining in-flight refresh");
                    running.future.clone()
                }
                None => self.start(&mut slot, vehicle_id, reason),
            }
        };

        future.await
    }

    /// Refresh every configured vehicle concurrently
    pub async fn refresh_all(&self, reason: RefreshReason) -> Vec<(VehicleId, RefreshResult)> {
        let refreshes = self
            .inner
            .vehicle_ids
            .iter()
            .map(|id| async move { (id.clone(), self.refresh(id, reason).await) });

        futures::future::join_all(refreshes).await
    }

    /// Send a command and verify it with a refresh
    ///
    /// Returns once the verification refresh has finished and its snapshot (if
    /// any) is in the cache. A failed verification still reports the command
    /// as accepted; the failure is carried in the outcome. Once the command is
    /// accepted, the settle delay and verification run in their own task and
    /// complete even if the caller stops waiting.
    #[instrument(skip(self), fields(vehicle_id = %vehicle_id, command = %command))]
    pub async fn send_command(
        &self,
        vehicle_id: &VehicleId,
        command: Command,
    ) -> Result<CommandOutcome, CommandError> {
        let inner = &self.inner;
        if !inner.slots.contains_key(vehicle_id) {
            return Err(CommandError::UnknownVehicle(vehicle_id.clone()));
        }

        let request = CommandRequest::new(vehicle_id.clone(), command);

        let sent = match inner.check_auth() {
            Err(err) => Err(err),
            Ok(()) => {
                inner
                    .authorized(move || async move {
                        inner.budget.record_call(vehicle_id, 1);
                        inner
                            .with_timeout(inner.api.send_command(vehicle_id, command))
                            .await
                    })
                    .await
            }
        };

        if let Err(source) = sent {
            warn!(error = %source, "Command failed");
            return Err(CommandError::Upstream {
                vehicle_id: vehicle_id.clone(),
                command,
                source,
            });
        }

        info!("Command accepted, verifying");

        // Refreshes started at or before this epoch predate the command
        let command_epoch = match inner.slots.get_mut(vehicle_id) {
            Some(mut slot) => {
                slot.pending_commands += 1;
                slot.epoch
            }
            None => 0,
        };

        let pending = PendingVerification {
            inner: inner.clone(),
            vehicle_id: vehicle_id.clone(),
        };

        if command == Command::Start {
            inner.budget.start_boost(vehicle_id);
        }

        let delay = inner.config.action_refresh_delay;
        let coordinator = self.clone();
        let id = vehicle_id.clone();
        let verification = tokio::spawn(
            async move {
                let _pending = pending;
                if !delay.is_zero() {
                    debug!(?delay, "Waiting before verification refresh");
                    tokio::time::sleep(delay).await;
                }
                coordinator.refresh_after(&id, command_epoch).await
            }
            .in_current_span(),
        )
        .await
        .unwrap_or_else(|err| Err(RefreshError::Task(err.to_string())));

        match &verification {
            Ok(_) => debug!("Command verified"),
            Err(err) => warn!(error = %err, "Verification refresh failed"),
        }

        Ok(CommandOutcome {
            request,
            verification,
        })
    }

    /// Current cached snapshot; never touches the network
    ///
    /// None only for vehicles this coordinator does not manage.
    pub fn get_snapshot(&self, vehicle_id: &VehicleId) -> Option<VehicleSnapshot> {
        self.inner.cache.get(vehicle_id)
    }

    pub fn refresh_state(&self, vehicle_id: &VehicleId) -> Option<RefreshState> {
        self.inner.slots.get(vehicle_id).map(|slot| RefreshState {
            last_attempted: slot.last_attempted,
            in_flight: slot.in_flight.is_some(),
            pending_verification: slot.pending_commands > 0,
        })
    }

    /// Register a listener called after each successful snapshot write
    pub fn subscribe(&self, vehicle_id: &VehicleId, listener: SnapshotListener) -> ListenerId {
        self.inner.listeners.subscribe(vehicle_id, listener)
    }

    pub fn unsubscribe(&self, listener_id: ListenerId) -> bool {
        self.inner.listeners.unsubscribe(listener_id)
    }

    pub fn vehicle_ids(&self) -> &[VehicleId] {
        &self.inner.vehicle_ids
    }

    pub fn vehicle_info(&self, vehicle_id: &VehicleId) -> Option<VehicleInfo> {
        self.inner.vehicles.get(vehicle_id).map(|v| v.clone())
    }

    pub fn budget(&self) -> &RateBudget {
        &self.inner.budget
    }

    /// True while credentials are known bad and refreshes are suspended
    pub fn is_auth_failed(&self) -> bool {
        self.inner.auth_failed.load(Ordering::SeqCst)
    }

    /// Tear down at integration removal: drop listeners and cached snapshots
    pub fn unload(&self) {
        self.inner.listeners.clear();
        for id in &self.inner.vehicle_ids {
            self.inner.cache.remove(id);
        }
        info!("Coordinator unloaded");
    }

    fn cached(&self, vehicle_id: &VehicleId) -> RefreshResult {
        self.inner
            .cache
            .get(vehicle_id)
            .ok_or_else(|| RefreshError::UnknownVehicle(vehicle_id.clone()))
    }

    /// Start a refresh task; the caller holds the vehicle's slot
    fn start(&self, slot: &mut RefreshSlot, vehicle_id: &VehicleId, reason: RefreshReason) -> SharedRefresh {
        slot.epoch += 1;
        slot.last_attempted = Some(Utc::now());
        self.inner.budget.mark_attempt(vehicle_id);

        let epoch = slot.epoch;
        let inner = self.inner.clone();
        let id = vehicle_id.clone();
        debug!(epoch, "Starting refresh");

        let task = tokio::spawn(async move { inner.run_refresh(id, epoch).await });
        let future = async move {
            task.await
                .unwrap_or_else(|err| Err(RefreshError::Task(err.to_string())))
        }
        .boxed()
        .shared();

        slot.in_flight = Some(InFlight {
            epoch,
            reason,
            future: future.clone(),
        });
        future
    }

    /// Post-command refresh that only counts refreshes started after `command_epoch`
    async fn refresh_after(&self, vehicle_id: &VehicleId, command_epoch: u64) -> RefreshResult {
        loop {
            let (future, predates_command) = {
                let mut slot = self
                    .inner
                    .slots
                    .get_mut(vehicle_id)
                    .ok_or_else(|| RefreshError::UnknownVehicle(vehicle_id.clone()))?;

                match &slot.in_flight {
                    Some(running) if running.epoch > command_epoch => {
                        debug!("Joining refresh started after the command");
                        (running.future.clone(), false)
                    }
                    Some(running) => (running.future.clone(), true),
                    None => (
                        self.start(&mut slot, vehicle_id, RefreshReason::PostCommand),
                        false,
                    ),
                }
            };

            if predates_command {
                debug!("Waiting out a refresh that predates the command");
                let _ = future.await;
                continue;
            }

            return future.await;
        }
    }
}

/// Settles one accepted command's verification when its task ends, however it ends
struct PendingVerification {
    inner: Arc<Inner>,
    vehicle_id: VehicleId,
}

impl Drop for PendingVerification {
    fn drop(&mut self) {
        if let Some(mut slot) = self.inner.slots.get_mut(&self.vehicle_id) {
            slot.pending_commands = slot.pending_commands.saturating_sub(1);
        }
    }
}

/// Clears the vehicle's in-flight marker when a refresh task ends, even by panic
struct InFlightGuard {
    inner: Arc<Inner>,
    vehicle_id: VehicleId,
    epoch: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Some(mut slot) = self.inner.slots.get_mut(&self.vehicle_id) {
            if slot.in_flight.as_ref().is_some_and(|f| f.epoch == self.epoch) {
                slot.in_flight = None;
            }
        }
    }
}

impl Inner {
    async fn run_refresh(self: Arc<Self>, vehicle_id: VehicleId, epoch: u64) -> RefreshResult {
        let guard = InFlightGuard {
            inner: self.clone(),
            vehicle_id: vehicle_id.clone(),
            epoch,
        };

        let outcome = match self.fetch_status(&vehicle_id).await {
            Ok(status) => {
                let snapshot = VehicleSnapshot::observed(vehicle_id.clone(), status, Utc::now());
                if self.cache.put(snapshot.clone()) {
                    debug!(vehicle_id = %vehicle_id, "Snapshot updated");
                    if snapshot.status.remote_starter_active != Some(true) {
                        self.budget.end_boost(&vehicle_id);
                    }
                    // Still in flight: no newer refresh can write and notify before this one
                    self.listeners.notify(&snapshot);
                }
                Ok(snapshot)
            }
            Err(err) => {
                warn!(vehicle_id = %vehicle_id, error = %err, "Refresh failed, keeping previous data");
                Err(err)
            }
        };

        drop(guard);
        outcome
    }

    async fn fetch_status(&self, vehicle_id: &VehicleId) -> Result<VehicleStatus, RefreshError> {
        self.check_auth()?;
        let status = self
            .authorized(move || self.read_status(vehicle_id))
            .await?;
        Ok(status)
    }

    /// Both status reads must succeed for a refresh to count
    async fn read_status(&self, vehicle_id: &VehicleId) -> ApiResult<VehicleStatus> {
        self.budget.record_call(vehicle_id, CALLS_PER_REFRESH);

        let (active, current) = futures::try_join!(
            self.with_timeout(self.api.get_active_status(vehicle_id)),
            self.with_timeout(self.api.get_current_status(vehicle_id)),
        )?;

        Ok(combine(active, current))
    }

    async fn with_timeout<T>(&self, call: impl Future<Output = ApiResult<T>>) -> ApiResult<T> {
        let limit = self.config.request_timeout;
        tokio::time::timeout(limit, call)
            .await
            .unwrap_or_else(|_| Err(ApiError::Timeout(limit)))
    }

    /// Run `op`, logging in again and retrying once if the token was rejected
    async fn authorized<T, F, Fut>(&self, op: F) -> ApiResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        match op().await {
            Err(err) if err.is_auth() => {
                debug!(error = %err, "Token rejected, logging in again");
                self.relogin().await?;
                match op().await {
                    Err(err) if err.is_auth() => Err(self.auth_failure(err)),
                    other => other,
                }
            }
            other => other,
        }
    }

    async fn relogin(&self) -> ApiResult<()> {
        let _guard = self.login_lock.lock().await;
        self.with_timeout(self.api.login())
            .await
            .map_err(|err| self.auth_failure(err))
    }

    fn check_auth(&self) -> ApiResult<()> {
        if self.auth_failed.load(Ordering::SeqCst) {
            Err(ApiError::Auth(
                "credentials rejected, reauthentication required".into(),
            ))
        } else {
            Ok(())
        }
    }

    /// Latch the auth-failed state if `err` is an auth error; passes it through
    fn auth_failure(&self, err: ApiError) -> ApiError {
        if err.is_auth() && !self.auth_failed.swap(true, Ordering::SeqCst) {
            error!(error = %err, "Credentials rejected, refreshes suspended until reauthentication");
        }
        err
    }
}
