//! Entity adapters for Viper vehicles
//!
//! Every configured vehicle is exposed as a device with these entities:
//!
//! | Domain          | Key                                      |
//! |-----------------|------------------------------------------|
//! | `sensor`        | `battery_voltage`, `last_updated`        |
//! | `binary_sensor` | `doors_open`, `ignition_on`, `trunk_open`, `hood_open` |
//! | `device_tracker`| `location`                               |
//! | `switch`        | `remote_start`                           |
//! | `button`        | `lock`, `unlock`, `refresh`              |
//!
//! Entities are views over the coordinator's cached snapshot. They render
//! `unavailable` until the vehicle's first successful refresh and never touch
//! the network themselves; switches and buttons act through the coordinator.

mod binary_sensor;
mod button;
mod device;
mod device_tracker;
mod entity;
mod platform;
mod sensor;
mod store;
mod switch;

pub use binary_sensor::{BinarySensorKind, VehicleBinarySensor};
pub use button::{ButtonKind, VehicleButton};
pub use device::DeviceInfo;
pub use device_tracker::VehicleTracker;
pub use entity::{Attributes, EntityBase, EntityError, VehicleEntity};
pub use platform::EntityPlatform;
pub use sensor::{BatteryVoltageSensor, LastUpdatedSensor};
pub use store::{EntityStateStore, SharedEntityStateStore};
pub use switch::RemoteStartSwitch;
