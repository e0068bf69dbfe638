//! Wiring of a coordinator's vehicles to entity adapters and their states

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use viper_coordinator::{CommandOutcome, Coordinator, ListenerId, SnapshotListener};
use viper_core::{slugify, Context, EntityId, State, VehicleId, VehicleInfo, VehicleSnapshot};

use crate::binary_sensor::{BinarySensorKind, VehicleBinarySensor};
use crate::button::{ButtonKind, VehicleButton};
use crate::device::DeviceInfo;
use crate::device_tracker::VehicleTracker;
use crate::entity::{EntityError, VehicleEntity};
use crate::sensor::{BatteryVoltageSensor, LastUpdatedSensor};
use crate::store::SharedEntityStateStore;
use crate::switch::RemoteStartSwitch;

/// All entities of one installation, kept in sync with the coordinator's cache
///
/// States are re-rendered synchronously from the coordinator's snapshot
/// listener, so a write to the cache is visible here as soon as the refresh
/// that made it returns.
pub struct EntityPlatform {
    coordinator: Coordinator,
    store: SharedEntityStateStore,
    devices: Vec<DeviceInfo>,
    entities: Vec<Arc<dyn VehicleEntity>>,
    switches: HashMap<String, Arc<RemoteStartSwitch>>,
    buttons: HashMap<String, Arc<VehicleButton>>,
    listeners: Vec<ListenerId>,
}

impl EntityPlatform {
    /// Create every vehicle's entities, render their current states, and subscribe to updates
    #[instrument(skip_all)]
    pub fn setup(coordinator: Coordinator, store: SharedEntityStateStore) -> Result<Self, EntityError> {
        let mut platform = Self {
            coordinator,
            store,
            devices: Vec::new(),
            entities: Vec::new(),
            switches: HashMap::new(),
            buttons: HashMap::new(),
            listeners: Vec::new(),
        };

        let mut taken_slugs = HashSet::new();
        let vehicle_ids = platform.coordinator.vehicle_ids().to_vec();
        for vehicle_id in &vehicle_ids {
            let info = platform
                .coordinator
                .vehicle_info(vehicle_id)
                .unwrap_or_else(|| VehicleInfo::unnamed(vehicle_id.clone()));
            let device_name = unique_device_name(&info, &mut taken_slugs);

            platform.add_vehicle(&info, &device_name)?;
        }

        info!(
            vehicles = vehicle_ids.len(),
            entities = platform.entities.len(),
            "Entity platform set up"
        );
        Ok(platform)
    }

    fn add_vehicle(&mut self, info: &VehicleInfo, device_name: &str) -> Result<(), EntityError> {
        let switch = Arc::new(RemoteStartSwitch::new(info, device_name)?);

        let mut entities: Vec<Arc<dyn VehicleEntity>> = vec![
            Arc::new(BatteryVoltageSensor::new(info, device_name)?),
            Arc::new(LastUpdatedSensor::new(info, device_name)?),
        ];
        for kind in BinarySensorKind::ALL {
            entities.push(Arc::new(VehicleBinarySensor::new(info, device_name, kind)?));
        }
        entities.push(Arc::new(VehicleTracker::new(info, device_name)?));
        entities.push(switch.clone() as Arc<dyn VehicleEntity>);
        self.switches.insert(switch.entity_id().to_string(), switch);

        for kind in ButtonKind::ALL {
            let button = Arc::new(VehicleButton::new(info, device_name, kind)?);
            entities.push(button.clone() as Arc<dyn VehicleEntity>);
            self.buttons.insert(button.entity_id().to_string(), button);
        }

        let snapshot = self
            .coordinator
            .get_snapshot(&info.id)
            .unwrap_or_else(|| VehicleSnapshot::invalid(info.id.clone()));
        render_into(&self.store, &entities, &snapshot);

        let store = self.store.clone();
        let rendered = entities.clone();
        let listener: SnapshotListener =
            Arc::new(move |snapshot: &VehicleSnapshot| render_into(&store, &rendered, snapshot));
        self.listeners.push(self.coordinator.subscribe(&info.id, listener));

        debug!(vehicle_id = %info.id, device = %device_name, entities = entities.len(), "Vehicle entities created");
        self.devices.push(DeviceInfo::for_vehicle(info, device_name));
        self.entities.extend(entities);
        Ok(())
    }

    /// Start the engine via a remote start switch
    pub async fn turn_on(&self, entity_id: &str) -> Result<CommandOutcome, EntityError> {
        self.switch(entity_id)?.turn_on(&self.coordinator).await
    }

    /// Stop the engine via a remote start switch
    pub async fn turn_off(&self, entity_id: &str) -> Result<CommandOutcome, EntityError> {
        self.switch(entity_id)?.turn_off(&self.coordinator).await
    }

    /// Press a button; its state becomes the press time even if the action fails
    pub async fn press(&self, entity_id: &str) -> Result<(), EntityError> {
        let button = self
            .buttons
            .get(entity_id)
            .ok_or_else(|| EntityError::NotFound(entity_id.to_string()))?;

        let result = button.press(&self.coordinator).await;
        self.render_entity(button.as_ref());
        result
    }

    pub fn state(&self, entity_id: &str) -> Option<State> {
        self.store.get(entity_id)
    }

    pub fn states(&self) -> Vec<State> {
        self.entities
            .iter()
            .filter_map(|e| self.store.get(&e.entity_id().to_string()))
            .collect()
    }

    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.entities.iter().map(|e| e.entity_id().clone()).collect()
    }

    /// Entities belonging to one vehicle
    pub fn vehicle_entities(&self, vehicle_id: &VehicleId) -> Vec<Arc<dyn VehicleEntity>> {
        self.entities
            .iter()
            .filter(|e| &e.base().vehicle_id == vehicle_id)
            .cloned()
            .collect()
    }

    pub fn devices(&self) -> &[DeviceInfo] {
        &self.devices
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// Unsubscribe from the coordinator and drop every rendered state
    pub fn unload(self) {
        for listener in &self.listeners {
            self.coordinator.unsubscribe(*listener);
        }
        for entity in &self.entities {
            self.store.remove(entity.entity_id());
        }
        info!(entities = self.entities.len(), "Entity platform unloaded");
    }

    fn switch(&self, entity_id: &str) -> Result<&Arc<RemoteStartSwitch>, EntityError> {
        self.switches
            .get(entity_id)
            .ok_or_else(|| EntityError::NotFound(entity_id.to_string()))
    }

    fn render_entity(&self, entity: &dyn VehicleEntity) {
        let vehicle_id = &entity.base().vehicle_id;
        let snapshot = self
            .coordinator
            .get_snapshot(vehicle_id)
            .unwrap_or_else(|| VehicleSnapshot::invalid(vehicle_id.clone()));
        let (state, attributes) = entity.render(&snapshot);
        self.store
            .set(entity.entity_id().clone(), state, attributes, Context::new());
    }
}

/// The vehicle's name, or "{name} {id}" when an earlier vehicle's name slugs the same
///
/// Entity ids are built from the slug, so "Truck" and "truck" would collide.
fn unique_device_name(info: &VehicleInfo, taken_slugs: &mut HashSet<String>) -> String {
    let mut candidate = info.name.clone();
    let mut suffix = 1;
    while !taken_slugs.insert(slugify(&candidate)) {
        candidate = if suffix == 1 {
            format!("{} {}", info.name, info.id)
        } else {
            format!("{} {} {}", info.name, info.id, suffix)
        };
        suffix += 1;
    }
    if candidate != info.name {
        debug!(vehicle_id = %info.id, name = %info.name, device = %candidate, "Disambiguated device name");
    }
    candidate
}

fn render_into(
    store: &SharedEntityStateStore,
    entities: &[Arc<dyn VehicleEntity>],
    snapshot: &VehicleSnapshot,
) {
    let context = Context::new();
    for entity in entities {
        let (state, attributes) = entity.render(snapshot);
        store.set(entity.entity_id().clone(), state, attributes, context.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EntityStateStore;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use viper_api::{ActiveStatus, ApiResult, CurrentStatus, VehicleApi};
    use viper_coordinator::CoordinatorConfig;
    use viper_core::{Command, RefreshReason, STATE_UNAVAILABLE, STATE_UNKNOWN};

    struct FakeApi {
        vehicles: Vec<VehicleInfo>,
        active: Mutex<ActiveStatus>,
        current: Mutex<CurrentStatus>,
        commands: Mutex<Vec<Command>>,
    }

    impl FakeApi {
        fn new(vehicles: Vec<VehicleInfo>) -> Self {
            Self {
                vehicles,
                active: Mutex::new(ActiveStatus {
                    battery_voltage: Some(12.48),
                    ignition_on: Some(false),
                    ..Default::default()
                }),
                current: Mutex::new(CurrentStatus {
                    remote_starter_active: Some(false),
                    doors_locked: Some(false),
                    ..Default::default()
                }),
                commands: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl VehicleApi for FakeApi {
        async fn login(&self) -> ApiResult<()> {
            Ok(())
        }

        async fn set_credentials(&self, _username: &str, _password: &str) {}

        async fn list_vehicles(&self) -> ApiResult<Vec<VehicleInfo>> {
            Ok(self.vehicles.clone())
        }

        async fn get_active_status(&self, _vehicle_id: &VehicleId) -> ApiResult<ActiveStatus> {
            Ok(self.active.lock().unwrap().clone())
        }

        async fn get_current_status(&self, _vehicle_id: &VehicleId) -> ApiResult<CurrentStatus> {
            Ok(self.current.lock().unwrap().clone())
        }

        async fn send_command(&self, _vehicle_id: &VehicleId, command: Command) -> ApiResult<()> {
            self.commands.lock().unwrap().push(command);
            let mut current = self.current.lock().unwrap();
            match command {
                Command::Start => current.remote_starter_active = Some(true),
                Command::Stop => current.remote_starter_active = Some(false),
                Command::Lock => current.doors_locked = Some(true),
                Command::Unlock => current.doors_locked = Some(false),
            }
            Ok(())
        }
    }

    fn named(id: &str, name: &str) -> VehicleInfo {
        VehicleInfo {
            name: name.to_string(),
            ..VehicleInfo::unnamed(VehicleId::new(id))
        }
    }

    async fn setup(vehicles: Vec<VehicleInfo>) -> (Arc<FakeApi>, EntityPlatform) {
        let ids = vehicles.iter().map(|v| v.id.clone()).collect();
        let api = Arc::new(FakeApi::new(vehicles));
        let coordinator = Coordinator::new(
            api.clone(),
            ids,
            CoordinatorConfig {
                action_refresh_delay: std::time::Duration::ZERO,
                ..Default::default()
            },
        );
        coordinator.setup().await.unwrap();
        let platform = EntityPlatform::setup(coordinator, Arc::new(EntityStateStore::new())).unwrap();
        (api, platform)
    }

    #[tokio::test]
    async fn test_entities_unavailable_until_first_refresh() {
        let (_, platform) = setup(vec![named("1", "Civic")]).await;

        assert_eq!(platform.entity_ids().len(), 11);
        assert_eq!(
            platform.state("sensor.civic_battery_voltage").unwrap().state,
            STATE_UNAVAILABLE
        );
        assert_eq!(
            platform.state("switch.civic_remote_start").unwrap().state,
            STATE_UNAVAILABLE
        );
        assert_eq!(platform.state("button.civic_refresh").unwrap().state, STATE_UNKNOWN);
    }

    #[tokio::test]
    async fn test_refresh_updates_states() {
        let (_, platform) = setup(vec![named("1", "Civic")]).await;

        tokio_test::assert_ok!(
            platform
                .coordinator()
                .refresh(&VehicleId::new("1"), RefreshReason::Manual)
                .await
        );

        assert_eq!(platform.state("sensor.civic_battery_voltage").unwrap().state, "12.48");
        assert_eq!(platform.state("binary_sensor.civic_ignition_on").unwrap().state, "off");
        assert_eq!(platform.state("switch.civic_remote_start").unwrap().state, "off");
        assert!(platform
            .state("sensor.civic_battery_voltage")
            .unwrap()
            .attributes
            .contains_key("last_updated"));
    }

    #[tokio::test]
    async fn test_remote_start_switch() {
        let (api, platform) = setup(vec![named("1", "Civic")]).await;
        platform.press("button.civic_refresh").await.unwrap();

        let outcome = platform.turn_on("switch.civic_remote_start").await.unwrap();
        assert_eq!(
            outcome.verified_snapshot().unwrap().status.remote_starter_active,
            Some(true)
        );
        assert_eq!(platform.state("switch.civic_remote_start").unwrap().state, "on");

        let err = platform.turn_on("switch.civic_remote_start").await.unwrap_err();
        assert!(matches!(err, EntityError::Refused { .. }));
        assert_eq!(*api.commands.lock().unwrap(), vec![Command::Start]);

        platform.turn_off("switch.civic_remote_start").await.unwrap();
        assert_eq!(platform.state("switch.civic_remote_start").unwrap().state, "off");
    }

    #[tokio::test]
    async fn test_switch_refuses_with_key_in_ignition() {
        let (api, platform) = setup(vec![named("1", "Civic")]).await;
        api.active.lock().unwrap().ignition_on = Some(true);
        platform.press("button.civic_refresh").await.unwrap();

        let err = platform.turn_on("switch.civic_remote_start").await.unwrap_err();
        assert!(matches!(err, EntityError::Refused { reason, .. } if reason == "ignition is already on"));
        assert!(api.commands.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lock_button() {
        let (api, platform) = setup(vec![named("1", "Civic")]).await;

        platform.press("button.civic_lock").await.unwrap();

        assert_eq!(*api.commands.lock().unwrap(), vec![Command::Lock]);
        assert_ne!(platform.state("button.civic_lock").unwrap().state, STATE_UNKNOWN);
        // Verification refresh rendered the snapshot
        assert_eq!(platform.state("sensor.civic_battery_voltage").unwrap().state, "12.48");
    }

    #[tokio::test]
    async fn test_unknown_entity() {
        let (_, platform) = setup(vec![named("1", "Civic")]).await;

        assert!(matches!(
            platform.press("button.nope").await,
            Err(EntityError::NotFound(_))
        ));
        assert!(matches!(
            platform.turn_on("button.civic_lock").await,
            Err(EntityError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_names_get_distinct_ids() {
        let (_, platform) = setup(vec![named("1", "Car"), named("2", "Car")]).await;

        assert!(platform.state("sensor.car_battery_voltage").is_some());
        assert!(platform.state("sensor.car_2_battery_voltage").is_some());
        assert_eq!(platform.devices().len(), 2);
        assert_eq!(platform.vehicle_entities(&VehicleId::new("2")).len(), 11);
    }

    #[tokio::test]
    async fn test_names_differing_in_case_get_distinct_ids() {
        let (_, platform) =
            setup(vec![named("1", "Truck"), named("2", "truck"), named("3", "My-Truck"), named("4", "My Truck")]).await;

        let ids = platform.entity_ids();
        let distinct: HashSet<_> = ids.iter().collect();
        assert_eq!(ids.len(), 44);
        assert_eq!(distinct.len(), 44);
        assert!(platform.state("switch.truck_remote_start").is_some());
        assert!(platform.state("switch.truck_2_remote_start").is_some());
        assert!(platform.state("switch.my_truck_4_remote_start").is_some());
        assert_eq!(platform.devices()[1].name, "truck 2");
    }

    #[tokio::test]
    async fn test_unload_removes_states() {
        let (_, platform) = setup(vec![named("1", "Civic")]).await;
        let coordinator = platform.coordinator().clone();
        let store = platform.store.clone();

        platform.unload();

        assert_eq!(store.entity_count(), 0);
        coordinator
            .refresh(&VehicleId::new("1"), RefreshReason::Manual)
            .await
            .unwrap();
        assert_eq!(store.entity_count(), 0);
    }
}
