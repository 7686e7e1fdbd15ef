//! Startup snapshot from the REST API, fetched before the feed goes live.

use anyhow::Result;
use lib_realtime::retrieve::ApiClient;

use crate::dashboard_logic::model::{AlarmEvent, DeviceStatus, EnvironmentReading};

pub const ENVIRONMENT_PATH: &str = "/api/environment";
pub const DEVICES_PATH: &str = "/api/devices";
pub const ALARMS_PATH: &str = "/api/alarms";

#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub environment: Vec<EnvironmentReading>,
    pub devices: Vec<DeviceStatus>,
    pub alarms: Vec<AlarmEvent>,
}

/// Fetches all three panels concurrently. Any failure fails the whole snapshot.
pub async fn fetch_snapshot(api: &ApiClient) -> Result<Snapshot> {
    let (environment, devices, alarms) = tokio::try_join!(
        api.get::<Vec<EnvironmentReading>>(ENVIRONMENT_PATH),
        api.get::<Vec<DeviceStatus>>(DEVICES_PATH),
        api.get::<Vec<AlarmEvent>>(ALARMS_PATH),
    )?;

    log::info!(
        "Snapshot from {}: {} readings, {} devices, {} alarms",
        api.base_url(),
        environment.len(),
        devices.len(),
        alarms.len()
    );
    Ok(Snapshot {
        environment,
        devices,
        alarms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard_logic::model::Severity;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    fn environment_route() -> Router {
        Router::new().route(
            ENVIRONMENT_PATH,
            get(|| async {
                Json(json!([
                    {"location": "lab", "temperature": 21.5, "humidity": 40.0, "created_at": "2024-05-01 10:00:00"},
                    {"location": "lab", "temperature": 21.0, "humidity": 41.0, "aqi": 35.0}
                ]))
            }),
        )
    }

    fn device_route() -> Router {
        Router::new().route(
            DEVICES_PATH,
            get(|| async { Json(json!([{"device_id": "d1", "name": "Pump", "status": "offline"}])) }),
        )
    }

    #[tokio::test]
    async fn fetches_all_three_panels() {
        let alarms = Router::new().route(
            ALARMS_PATH,
            get(|| async {
                Json(json!([
                    {"code": "DEVICE_OFFLINE", "message": "d1 offline", "severity": "warning", "device_id": "d1"}
                ]))
            }),
        );
        let base = serve(environment_route().merge(device_route()).merge(alarms)).await;
        let api = ApiClient::new(&base).unwrap();

        let snapshot = fetch_snapshot(&api).await.unwrap();

        assert_eq!(snapshot.environment.len(), 2);
        assert_eq!(snapshot.environment[0].temperature, 21.5);
        assert!(snapshot.environment[0].created_at.is_some());
        assert_eq!(snapshot.environment[1].air_quality_index, Some(35.0));
        assert_eq!(snapshot.devices[0].name, "Pump");
        assert_eq!(snapshot.devices[0].status_class(), "danger");
        assert_eq!(snapshot.alarms[0].severity, Severity::Warning);
        assert_eq!(snapshot.alarms[0].device_id.as_deref(), Some("d1"));
    }

    #[tokio::test]
    async fn missing_panel_fails_the_whole_snapshot() {
        let base = serve(environment_route().merge(device_route())).await;
        let api = ApiClient::new(&base).unwrap();

        let err = fetch_snapshot(&api).await.unwrap_err();
        assert!(err.to_string().starts_with("HTTP 404"), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn malformed_panel_body_is_an_error() {
        let broken = Router::new().route(ALARMS_PATH, get(|| async { Json(json!({"not": "a list"})) }));
        let base = serve(environment_route().merge(device_route()).merge(broken)).await;
        let api = ApiClient::new(&base).unwrap();

        assert!(fetch_snapshot(&api).await.is_err());
    }
}
