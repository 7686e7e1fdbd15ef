use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lib_realtime::{EventRouter, Subscription};

use crate::dashboard_logic::model::{
    AlarmEvent, DeviceStatus, EnvironmentReading, ALARM_RAISE, DEVICE_UPDATE, ENVIRONMENT_UPDATE,
};
use crate::dashboard_logic::snapshot::Snapshot;

// Panel capacities, newest entries first
pub const ENVIRONMENT_CAPACITY: usize = 10;
pub const ALARM_CAPACITY: usize = 20;

pub const CONNECTED_TEXT: &str = "Realtime Connected";
pub const CONNECTING_TEXT: &str = "Connecting...";

#[derive(Debug, Default)]
struct Panels {
    environment: VecDeque<EnvironmentReading>,
    devices: HashMap<String, DeviceStatus>,
    alarms: VecDeque<AlarmEvent>,
    connected: bool,
}

/// What the dashboard shows. Cloning shares the same panels.
#[derive(Debug, Clone, Default)]
pub struct DashboardState {
    panels: Arc<Mutex<Panels>>,
}

fn push_capped<T>(list: &mut VecDeque<T>, item: T, capacity: usize) {
    list.push_front(item);
    list.truncate(capacity);
}

impl DashboardState {
    pub fn new() -> Self {
        Self::default()
    }

    fn panels(&self) -> MutexGuard<'_, Panels> {
        self.panels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces panel contents with a REST snapshot. The connected flag is kept.
    pub fn seed(&self, snapshot: Snapshot) {
        let mut panels = self.panels();
        panels.environment = snapshot.environment.into_iter().take(ENVIRONMENT_CAPACITY).collect();
        panels.devices = snapshot
            .devices
            .into_iter()
            .map(|device| (device.device_id.clone(), device))
            .collect();
        panels.alarms = snapshot.alarms.into_iter().take(ALARM_CAPACITY).collect();
    }

    pub fn push_reading(&self, reading: EnvironmentReading) {
        push_capped(&mut self.panels().environment, reading, ENVIRONMENT_CAPACITY);
    }

    pub fn upsert_device(&self, device: DeviceStatus) {
        self.panels().devices.insert(device.device_id.clone(), device);
    }

    pub fn push_alarm(&self, alarm: AlarmEvent) {
        push_capped(&mut self.panels().alarms, alarm, ALARM_CAPACITY);
    }

    pub fn set_connected(&self, connected: bool) {
        self.panels().connected = connected;
    }

    pub fn is_connected(&self) -> bool {
        self.panels().connected
    }

    pub fn indicator(&self) -> &'static str {
        if self.is_connected() { CONNECTED_TEXT } else { CONNECTING_TEXT }
    }

    pub fn readings(&self) -> Vec<EnvironmentReading> {
        self.panels().environment.iter().cloned().collect()
    }

    pub fn latest_reading(&self) -> Option<EnvironmentReading> {
        self.panels().environment.front().cloned()
    }

    /// Devices ordered by id.
    pub fn devices(&self) -> Vec<DeviceStatus> {
        let mut devices: Vec<DeviceStatus> = self.panels().devices.values().cloned().collect();
        devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        devices
    }

    pub fn alarms(&self) -> Vec<AlarmEvent> {
        self.panels().alarms.iter().cloned().collect()
    }

    /// One-line status for the log.
    pub fn summary(&self) -> String {
        let latest = match self.latest_reading() {
            Some(r) => format!("{:.1}°C {:.0}% at {}", r.temperature, r.humidity, r.location),
            None => "no readings".to_string(),
        };
        let devices = self
            .devices()
            .iter()
            .map(|d| format!("{}={}({})", d.device_id, d.status, d.status_class()))
            .collect::<Vec<_>>()
            .join(" ");
        format!(
            "[{}] {} | readings {} | devices [{}] | alarms {}",
            self.indicator(),
            latest,
            self.readings().len(),
            devices,
            self.alarms().len()
        )
    }

    /// Subscribes the panels to the feed. Dropping the returned handles keeps
    /// the subscriptions; unsubscribe them to detach.
    pub fn attach(&self, router: &EventRouter) -> Vec<Subscription> {
        let environment = self.clone();
        let devices = self.clone();
        let alarms = self.clone();
        let opened = self.clone();
        let closed = self.clone();
        let errored = self.clone();

        vec![
            router.on_typed(ENVIRONMENT_UPDATE, move |reading: EnvironmentReading| environment.push_reading(reading)),
            router.on_typed(DEVICE_UPDATE, move |device: DeviceStatus| devices.upsert_device(device)),
            router.on_typed(ALARM_RAISE, move |alarm: AlarmEvent| alarms.push_alarm(alarm)),
            router.on_open(move |_| opened.set_connected(true)),
            router.on_close(move |_| closed.set_connected(false)),
            router.on_error(move |_| errored.set_connected(false)),
        ]
    }
}
