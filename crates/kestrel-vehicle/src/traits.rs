//! Narrow capability traits over the vehicle link, one per concern.
//!
//! Components depend on the capability they use instead of a monolithic
//! client handle; the MAVLink backend implements all of them, the fake in
//! [`crate::fake`] implements them for tests.

use std::path::Path;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::{ActionError, LogError, MissionError, OffboardError, ParamError};
use crate::types::{
    AllParams, ConnectionState, FencePolygon, FlightMode, Health, HomePosition, LogEntry,
    MissionItem, MissionProgress, Position, Setpoint, StatusText, TuneDescription,
};

/// Last-value telemetry streams. Receivers coalesce; consumers are
/// edge-triggered and only care about the latest value.
pub trait TelemetryStreams: Send + Sync {
    fn connection_state(&self) -> watch::Receiver<ConnectionState>;
    fn health(&self) -> watch::Receiver<Health>;
    fn position(&self) -> watch::Receiver<Option<Position>>;
    fn flight_mode(&self) -> watch::Receiver<FlightMode>;
    fn in_air(&self) -> watch::Receiver<bool>;
    fn mission_progress(&self) -> watch::Receiver<MissionProgress>;
    fn status_text(&self) -> watch::Receiver<Option<StatusText>>;
    fn home(&self) -> watch::Receiver<Option<HomePosition>>;
}

/// High-level vehicle actions (arm, takeoff, land).
#[async_trait]
pub trait Action: Send + Sync {
    async fn arm(&self) -> Result<(), ActionError>;
    async fn disarm(&self) -> Result<(), ActionError>;
    async fn takeoff(&self) -> Result<(), ActionError>;
    async fn set_takeoff_altitude(&self, altitude_m: f32) -> Result<(), ActionError>;
    async fn land(&self) -> Result<(), ActionError>;
}

/// Offboard mode control and setpoint issuance.
#[async_trait]
pub trait Offboard: Send + Sync {
    /// Enter offboard mode. A setpoint must have been seeded first.
    async fn start(&self) -> Result<(), OffboardError>;
    /// Leave offboard mode (hand control back to the autopilot).
    async fn stop(&self) -> Result<(), OffboardError>;
    async fn set_setpoint(&self, setpoint: Setpoint) -> Result<(), OffboardError>;
}

#[async_trait]
pub trait Mission: Send + Sync {
    async fn upload(&self, items: &[MissionItem]) -> Result<(), MissionError>;
    async fn start(&self) -> Result<(), ActionError>;
}

#[async_trait]
pub trait Param: Send + Sync {
    async fn all_params(&self) -> Result<AllParams, ParamError>;
}

#[async_trait]
pub trait Geofence: Send + Sync {
    async fn upload(&self, polygons: &[FencePolygon]) -> Result<(), MissionError>;
}

#[async_trait]
pub trait Tune: Send + Sync {
    async fn play(&self, tune: &TuneDescription) -> Result<(), ActionError>;
}

#[async_trait]
pub trait LogFiles: Send + Sync {
    async fn entries(&self) -> Result<Vec<LogEntry>, LogError>;
    async fn download(&self, entry: &LogEntry, dest: &Path) -> Result<(), LogError>;
}
