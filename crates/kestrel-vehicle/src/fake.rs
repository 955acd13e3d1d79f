//! In-memory vehicle used by tests across the workspace.
//!
//! Records every command in arrival order and exposes the telemetry watch
//! senders so a test can script connection, health, and in-air sequences.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::{ActionError, LogError, MissionError, OffboardError, Rejection};
use crate::session::Session;
use crate::traits::{Action, Geofence, LogFiles, Mission, Offboard, Param, TelemetryStreams, Tune};
use crate::types::{
    AllParams, ConnectionState, FencePolygon, FlightMode, Health, HomePosition, LogEntry,
    MissionItem, MissionProgress, Position, Setpoint, StatusText, TuneDescription,
};

/// One recorded command, in issue order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Arm,
    Disarm,
    Takeoff,
    SetTakeoffAltitude(f32),
    Land,
    OffboardStart,
    OffboardStop,
    Setpoint(Setpoint),
    MissionUpload(usize),
    MissionStart,
    GeofenceUpload(usize),
    TunePlay,
}

pub struct FakeVehicle {
    calls: Mutex<Vec<Call>>,
    offboard_start_failure: Mutex<Option<OffboardError>>,
    params: Mutex<AllParams>,
    log_entries: Mutex<Vec<LogEntry>>,

    connection_tx: watch::Sender<ConnectionState>,
    health_tx: watch::Sender<Health>,
    position_tx: watch::Sender<Option<Position>>,
    flight_mode_tx: watch::Sender<FlightMode>,
    in_air_tx: watch::Sender<bool>,
    mission_progress_tx: watch::Sender<MissionProgress>,
    status_text_tx: watch::Sender<Option<StatusText>>,
    home_tx: watch::Sender<Option<HomePosition>>,
}

impl FakeVehicle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            offboard_start_failure: Mutex::new(None),
            params: Mutex::new(AllParams::default()),
            log_entries: Mutex::new(Vec::new()),
            connection_tx: watch::Sender::new(ConnectionState::Disconnected),
            health_tx: watch::Sender::new(Health::default()),
            position_tx: watch::Sender::new(None),
            flight_mode_tx: watch::Sender::new(FlightMode::Unknown),
            in_air_tx: watch::Sender::new(false),
            mission_progress_tx: watch::Sender::new(MissionProgress::default()),
            status_text_tx: watch::Sender::new(None),
            home_tx: watch::Sender::new(None),
        })
    }

    pub fn session(self: &Arc<Self>) -> Session {
        Session::from_backend(self.clone())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    /// Make the next `Offboard::start` fail with the given rejection code.
    pub fn reject_next_offboard_start(&self, rejection: Rejection) {
        *self.offboard_start_failure.lock().unwrap() = Some(OffboardError::Rejected(rejection));
    }

    pub fn set_connected(&self) {
        self.connection_tx.send_replace(ConnectionState::Connected);
    }

    pub fn set_health(&self, health: Health) {
        self.health_tx.send_replace(health);
    }

    pub fn set_health_ok(&self) {
        self.set_health(Health { global_position_ok: true, home_position_ok: true });
    }

    pub fn set_in_air(&self, in_air: bool) {
        self.in_air_tx.send_replace(in_air);
    }

    pub fn set_relative_altitude(&self, altitude_m: f32) {
        self.position_tx.send_replace(Some(Position {
            relative_altitude_m: altitude_m,
            ..Position::default()
        }));
    }

    pub fn set_flight_mode(&self, mode: FlightMode) {
        self.flight_mode_tx.send_replace(mode);
    }

    pub fn set_mission_progress(&self, progress: MissionProgress) {
        self.mission_progress_tx.send_replace(progress);
    }

    pub fn push_status_text(&self, status: StatusText) {
        self.status_text_tx.send_replace(Some(status));
    }

    pub fn set_params(&self, params: AllParams) {
        *self.params.lock().unwrap() = params;
    }

    pub fn set_log_entries(&self, entries: Vec<LogEntry>) {
        *self.log_entries.lock().unwrap() = entries;
    }
}

impl TelemetryStreams for FakeVehicle {
    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection_tx.subscribe()
    }
    fn health(&self) -> watch::Receiver<Health> {
        self.health_tx.subscribe()
    }
    fn position(&self) -> watch::Receiver<Option<Position>> {
        self.position_tx.subscribe()
    }
    fn flight_mode(&self) -> watch::Receiver<FlightMode> {
        self.flight_mode_tx.subscribe()
    }
    fn in_air(&self) -> watch::Receiver<bool> {
        self.in_air_tx.subscribe()
    }
    fn mission_progress(&self) -> watch::Receiver<MissionProgress> {
        self.mission_progress_tx.subscribe()
    }
    fn status_text(&self) -> watch::Receiver<Option<StatusText>> {
        self.status_text_tx.subscribe()
    }
    fn home(&self) -> watch::Receiver<Option<HomePosition>> {
        self.home_tx.subscribe()
    }
}

#[async_trait]
impl Action for FakeVehicle {
    async fn arm(&self) -> Result<(), ActionError> {
        self.record(Call::Arm);
        Ok(())
    }
    async fn disarm(&self) -> Result<(), ActionError> {
        self.record(Call::Disarm);
        Ok(())
    }
    async fn takeoff(&self) -> Result<(), ActionError> {
        self.record(Call::Takeoff);
        Ok(())
    }
    async fn set_takeoff_altitude(&self, altitude_m: f32) -> Result<(), ActionError> {
        self.record(Call::SetTakeoffAltitude(altitude_m));
        Ok(())
    }
    async fn land(&self) -> Result<(), ActionError> {
        self.record(Call::Land);
        Ok(())
    }
}

#[async_trait]
impl Offboard for FakeVehicle {
    async fn start(&self) -> Result<(), OffboardError> {
        self.record(Call::OffboardStart);
        match self.offboard_start_failure.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
    async fn stop(&self) -> Result<(), OffboardError> {
        self.record(Call::OffboardStop);
        Ok(())
    }
    async fn set_setpoint(&self, setpoint: Setpoint) -> Result<(), OffboardError> {
        self.record(Call::Setpoint(setpoint));
        Ok(())
    }
}

#[async_trait]
impl Mission for FakeVehicle {
    async fn upload(&self, items: &[MissionItem]) -> Result<(), MissionError> {
        self.record(Call::MissionUpload(items.len()));
        Ok(())
    }
    async fn start(&self) -> Result<(), ActionError> {
        self.record(Call::MissionStart);
        Ok(())
    }
}

#[async_trait]
impl Param for FakeVehicle {
    async fn all_params(&self) -> Result<AllParams, crate::error::ParamError> {
        Ok(self.params.lock().unwrap().clone())
    }
}

#[async_trait]
impl Geofence for FakeVehicle {
    async fn upload(&self, polygons: &[FencePolygon]) -> Result<(), MissionError> {
        self.record(Call::GeofenceUpload(polygons.len()));
        Ok(())
    }
}

#[async_trait]
impl Tune for FakeVehicle {
    async fn play(&self, _tune: &TuneDescription) -> Result<(), ActionError> {
        self.record(Call::TunePlay);
        Ok(())
    }
}

#[async_trait]
impl LogFiles for FakeVehicle {
    async fn entries(&self) -> Result<Vec<LogEntry>, LogError> {
        Ok(self.log_entries.lock().unwrap().clone())
    }
    async fn download(&self, _entry: &LogEntry, _dest: &Path) -> Result<(), LogError> {
        Ok(())
    }
}
