//! Mock vehicle API for testing
//!
//! Holds one simulated vehicle state shared by every vehicle id. Commands
//! change that state the way the real module would, so a verification refresh
//! observes the command's effect.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use viper_api::{ActiveStatus, ApiError, ApiResult, CurrentStatus, VehicleApi};
use viper_core::{Command, VehicleId, VehicleInfo};

#[derive(Debug, Default)]
struct Script {
    active: ActiveStatus,
    current: CurrentStatus,
    /// Error returned by every status read while set
    read_error: Option<ApiError>,
    /// Upcoming active reads that fail with an auth error
    auth_rejections: usize,
    /// Error returned by every command while set
    command_error: Option<ApiError>,
    login_error: Option<ApiError>,
    /// Login fails unless the stored password equals this
    required_password: Option<String>,
    credentials: Option<(String, String)>,
    /// Simulated latency of each status read
    read_delay: Duration,
    /// Extra latency of `read_current` only
    current_delay: Duration,
    vehicles: Vec<VehicleInfo>,
}

/// A scriptable [`VehicleApi`] that counts its calls
#[derive(Debug, Default)]
pub struct MockApi {
    script: Mutex<Script>,
    pub logins: AtomicUsize,
    pub active_reads: AtomicUsize,
    pub current_reads: AtomicUsize,
    commands: Mutex<Vec<(VehicleId, Command)>>,
}

impl MockApi {
    /// A parked, locked vehicle with a healthy battery
    pub fn new() -> Self {
        let api = Self::default();
        {
            let mut script = api.script.lock().unwrap();
            script.active = ActiveStatus {
                latitude: Some(45.5),
                longitude: Some(-73.6),
                battery_voltage: Some(12.6),
                doors_open: Some(false),
                ignition_on: Some(false),
                trunk_open: Some(false),
                hood_open: Some(false),
                ..Default::default()
            };
            script.current = CurrentStatus {
                doors_locked: Some(true),
                remote_starter_active: Some(false),
                security_system_armed: Some(true),
                panic_on: Some(false),
                valet_on: Some(false),
            };
        }
        api
    }

    pub fn set_battery(&self, volts: f64) {
        self.script.lock().unwrap().active.battery_voltage = Some(volts);
    }

    pub fn set_locked(&self, locked: bool) {
        self.script.lock().unwrap().current.doors_locked = Some(locked);
    }

    pub fn fail_reads(&self, error: Option<ApiError>) {
        self.script.lock().unwrap().read_error = error;
    }

    pub fn reject_auth(&self, times: usize) {
        self.script.lock().unwrap().auth_rejections = times;
    }

    pub fn fail_commands(&self, error: Option<ApiError>) {
        self.script.lock().unwrap().command_error = error;
    }

    pub fn fail_login(&self, error: Option<ApiError>) {
        self.script.lock().unwrap().login_error = error;
    }

    pub fn set_read_delay(&self, delay: Duration) {
        self.script.lock().unwrap().read_delay = delay;
    }

    pub fn require_password(&self, password: &str) {
        self.script.lock().unwrap().required_password = Some(password.to_string());
    }

    pub fn credentials(&self) -> Option<(String, String)> {
        self.script.lock().unwrap().credentials.clone()
    }

    pub fn delay_current_reads(&self, delay: Duration) {
        self.script.lock().unwrap().current_delay = delay;
    }

    pub fn set_vehicles(&self, vehicles: Vec<VehicleInfo>) {
        self.script.lock().unwrap().vehicles = vehicles;
    }

    pub fn commands(&self) -> Vec<(VehicleId, Command)> {
        self.commands.lock().unwrap().clone()
    }

    pub fn active_reads(&self) -> usize {
        self.active_reads.load(Ordering::SeqCst)
    }

    pub fn current_reads(&self) -> usize {
        self.current_reads.load(Ordering::SeqCst)
    }

    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    /// Upstream calls of every kind made so far
    pub fn total_calls(&self) -> usize {
        self.active_reads() + self.current_reads() + self.commands.lock().unwrap().len()
    }
}

#[async_trait]
impl VehicleApi for MockApi {
    async fn login(&self) -> ApiResult<()> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().unwrap();
        if let Some(err) = script.login_error.clone() {
            return Err(err);
        }
        match &script.required_password {
            Some(required) if script.credentials.as_ref().map(|(_, p)| p) != Some(required) => {
                Err(ApiError::Auth("invalid password".into()))
            }
            _ => Ok(()),
        }
    }

    async fn set_credentials(&self, username: &str, password: &str) {
        self.script.lock().unwrap().credentials = Some((username.to_string(), password.to_string()));
    }

    async fn list_vehicles(&self) -> ApiResult<Vec<VehicleInfo>> {
        Ok(self.script.lock().unwrap().vehicles.clone())
    }

    async fn get_active_status(&self, _vehicle_id: &VehicleId) -> ApiResult<ActiveStatus> {
        self.active_reads.fetch_add(1, Ordering::SeqCst);
        // State is captured when the call is made, not when it returns
        let (result, delay) = {
            let mut script = self.script.lock().unwrap();
            let result = if script.auth_rejections > 0 {
                script.auth_rejections -= 1;
                Err(ApiError::Auth("token expired".into()))
            } else if let Some(err) = script.read_error.clone() {
                Err(err)
            } else {
                Ok(script.active.clone())
            };
            (result, script.read_delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn get_current_status(&self, _vehicle_id: &VehicleId) -> ApiResult<CurrentStatus> {
        self.current_reads.fetch_add(1, Ordering::SeqCst);
        let (result, delay) = {
            let script = self.script.lock().unwrap();
            let result = match script.read_error.clone() {
                Some(err) => Err(err),
                None => Ok(script.current.clone()),
            };
            (result, script.read_delay + script.current_delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn send_command(&self, vehicle_id: &VehicleId, command: Command) -> ApiResult<()> {
        self.commands.lock().unwrap().push((vehicle_id.clone(), command));
        let mut script = self.script.lock().unwrap();
        if let Some(err) = script.command_error.clone() {
            return Err(err);
        }
        match command {
            Command::Start => script.current.remote_starter_active = Some(true),
            Command::Stop => script.current.remote_starter_active = Some(false),
            Command::Lock => script.current.doors_locked = Some(true),
            Command::Unlock => script.current.doors_locked = Some(false),
        }
        Ok(())
    }
}
