//! MAVLink-backed implementation of the vehicle capability traits.
//!
//! One reader thread turns the incoming message stream into watch channels
//! and per-exchange collectors; one pump thread sends the companion
//! heartbeat and re-sends the last seeded setpoint at 20 Hz so long holds do
//! not trip the autopilot's offboard watchdog. Both threads stop when the
//! last vehicle handle is dropped.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use mavlink::common::{
    MavAutopilot, MavCmd, MavFrame, MavLandedState, MavMessage, MavMissionResult, MavModeFlag,
    MavParamType, MavResult, MavSeverity, MavState, MavType, COMMAND_LONG_DATA, HEARTBEAT_DATA,
    LOG_REQUEST_DATA_DATA, LOG_REQUEST_LIST_DATA, MISSION_COUNT_DATA, MISSION_ITEM_INT_DATA,
    PARAM_REQUEST_LIST_DATA, PARAM_SET_DATA, PLAY_TUNE_DATA,
};
use mavlink::{MavConnection, MavHeader};
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use kestrel_vehicle::{
    Action, ActionError, AllParams, ConnectionState, FencePolygon, FenceType, FlightMode,
    FloatParam, Geofence, Health, HomePosition, IntParam, LogEntry, LogError, LogFiles, Mission,
    MissionError, MissionItem, MissionProgress, Offboard, OffboardError, Param, ParamError,
    Position, Rejection, Session, Setpoint, Severity, StatusText, TelemetryStreams, Tune,
    TuneDescription,
};

use crate::descriptor::Descriptor;
use crate::{px4, tune, wire};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
/// 20 Hz keepalive, comfortably above the 2 Hz the offboard watchdog needs.
const KEEPALIVE_PERIOD: Duration = Duration::from_millis(50);
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(10);
const MAX_RECV_ERROR_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct MavConfig {
    /// Our ids on the link (ground/companion side).
    pub system_id: u8,
    pub component_id: u8,
    /// The flight controller's ids; 1/1 is the common default.
    pub target_system: u8,
    pub target_component: u8,
    pub ack_timeout: Duration,
    pub transfer_timeout: Duration,
}

impl Default for MavConfig {
    fn default() -> Self {
        Self {
            system_id: 245,
            component_id: 190,
            target_system: 1,
            target_component: 1,
            ack_timeout: Duration::from_secs(3),
            transfer_timeout: Duration::from_secs(15),
        }
    }
}

/// Write half: connection plus our header with its running sequence.
struct Link {
    conn: Box<dyn MavConnection<MavMessage> + Send + Sync>,
    header: Mutex<MavHeader>,
}

struct SendFailed;

impl Link {
    fn send(&self, msg: &MavMessage) -> std::result::Result<(), SendFailed> {
        let header = {
            let mut h = self.header.lock().unwrap();
            h.sequence = h.sequence.wrapping_add(1);
            *h
        };
        self.conn.send(&header, msg).map(|_| ()).map_err(|_| SendFailed)
    }
}

struct ParamListState {
    params: Vec<(String, f32, MavParamType)>,
    done: Option<oneshot::Sender<Vec<(String, f32, MavParamType)>>>,
}

struct LogListState {
    entries: Vec<LogEntry>,
    done: Option<oneshot::Sender<Vec<LogEntry>>>,
}

struct MissionUpload {
    items: Vec<MISSION_ITEM_INT_DATA>,
    done: Option<oneshot::Sender<std::result::Result<(), MissionError>>>,
}

struct Shared {
    connection_tx: watch::Sender<ConnectionState>,
    health_tx: watch::Sender<Health>,
    position_tx: watch::Sender<Option<Position>>,
    flight_mode_tx: watch::Sender<FlightMode>,
    in_air_tx: watch::Sender<bool>,
    mission_progress_tx: watch::Sender<MissionProgress>,
    status_text_tx: watch::Sender<Option<StatusText>>,
    home_tx: watch::Sender<Option<HomePosition>>,

    pending_acks: Mutex<HashMap<u32, oneshot::Sender<MavResult>>>,
    pending_param_set: Mutex<Option<(String, oneshot::Sender<()>)>>,
    param_list: Mutex<Option<ParamListState>>,
    log_list: Mutex<Option<LogListState>>,
    log_data_tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    mission_upload: Mutex<Option<MissionUpload>>,
    mission_total: AtomicU16,

    last_setpoint: Mutex<Option<Setpoint>>,
    closed: AtomicBool,
    boot: Instant,
}

impl Shared {
    fn new() -> Self {
        Self {
            connection_tx: watch::Sender::new(ConnectionState::Disconnected),
            health_tx: watch::Sender::new(Health::default()),
            position_tx: watch::Sender::new(None),
            flight_mode_tx: watch::Sender::new(FlightMode::Unknown),
            in_air_tx: watch::Sender::new(false),
            mission_progress_tx: watch::Sender::new(MissionProgress::default()),
            status_text_tx: watch::Sender::new(None),
            home_tx: watch::Sender::new(None),
            pending_acks: Mutex::new(HashMap::new()),
            pending_param_set: Mutex::new(None),
            param_list: Mutex::new(None),
            log_list: Mutex::new(None),
            log_data_tx: Mutex::new(None),
            mission_upload: Mutex::new(None),
            mission_total: AtomicU16::new(0),
            last_setpoint: Mutex::new(None),
            closed: AtomicBool::new(false),
            boot: Instant::now(),
        }
    }

    fn time_boot_ms(&self) -> u32 {
        self.boot.elapsed().as_millis() as u32
    }
}

pub struct MavVehicle {
    cfg: MavConfig,
    link: Arc<Link>,
    shared: Arc<Shared>,
}

impl MavVehicle {
    /// Open the transport and spawn the reader and pump tasks. Returns as
    /// soon as the transport is up; "connected" is only reported once the
    /// autopilot's heartbeat is seen.
    pub async fn connect(descriptor: &Descriptor, cfg: MavConfig) -> Result<Arc<Self>> {
        if let Descriptor::Serial { dev, baud } = descriptor {
            // quick validate device
            let _ = tokio_serial::new(dev, *baud)
                .open_native_async()
                .with_context(|| format!("open serial device {dev}"))?;
        }

        let address = descriptor.to_mavlink_address();
        info!(descriptor = %descriptor, "connecting vehicle link");
        let conn = tokio::task::spawn_blocking(move || mavlink::connect::<MavMessage>(&address))
            .await
            .context("mavlink connect task")?
            .with_context(|| format!("mavlink connect {descriptor}"))?;

        let link = Arc::new(Link {
            conn,
            header: Mutex::new(MavHeader {
                system_id: cfg.system_id,
                component_id: cfg.component_id,
                sequence: 0,
            }),
        });
        let shared = Arc::new(Shared::new());
        let vehicle = Arc::new(Self {
            cfg: cfg.clone(),
            link: link.clone(),
            shared: shared.clone(),
        });

        // Plain threads, not spawn_blocking: runtime shutdown must not wait
        // for a recv that may never return.
        {
            let (cfg, link, shared) = (cfg.clone(), link.clone(), shared.clone());
            std::thread::Builder::new()
                .name("mav-reader".into())
                .spawn(move || reader_loop(&cfg, &link, &shared))
                .context("spawn mavlink reader thread")?;
        }
        std::thread::Builder::new()
            .name("mav-pump".into())
            .spawn(move || pump_loop(&cfg, &link, &shared))
            .context("spawn mavlink pump thread")?;

        Ok(vehicle)
    }

    pub fn session(self: &Arc<Self>) -> Session {
        Session::from_backend(self.clone())
    }

    /// Stop the reader and pump threads. Also happens when the last handle
    /// (every `Session` slot is a clone of this allocation) is dropped.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Relaxed);
    }

    /// Send a COMMAND_LONG and wait for its ack.
    async fn command(
        &self,
        command: MavCmd,
        params: [f32; 7],
    ) -> std::result::Result<MavResult, CommandFailure> {
        let key = command as u32;
        let (tx, rx) = oneshot::channel();
        self.shared.pending_acks.lock().unwrap().insert(key, tx);

        let msg = MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
            target_system: self.cfg.target_system,
            target_component: self.cfg.target_component,
            command,
            confirmation: 0,
            param1: params[0],
            param2: params[1],
            param3: params[2],
            param4: params[3],
            param5: params[4],
            param6: params[5],
            param7: params[6],
        });
        if self.link.send(&msg).is_err() {
            self.shared.pending_acks.lock().unwrap().remove(&key);
            return Err(CommandFailure::LinkClosed);
        }

        match tokio::time::timeout(self.cfg.ack_timeout, rx).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(CommandFailure::LinkClosed),
            Err(_) => {
                self.shared.pending_acks.lock().unwrap().remove(&key);
                Err(CommandFailure::Timeout)
            }
        }
    }

    async fn set_param_float(&self, name: &str, value: f32) -> std::result::Result<(), ActionError> {
        let (tx, rx) = oneshot::channel();
        *self.shared.pending_param_set.lock().unwrap() = Some((name.to_string(), tx));

        let mut param_id = [0u8; 16];
        param_id[..name.len()].copy_from_slice(name.as_bytes());
        let msg = MavMessage::PARAM_SET(PARAM_SET_DATA {
            target_system: self.cfg.target_system,
            target_component: self.cfg.target_component,
            param_id,
            param_value: value,
            param_type: MavParamType::MAV_PARAM_TYPE_REAL32,
        });
        if self.link.send(&msg).is_err() {
            *self.shared.pending_param_set.lock().unwrap() = None;
            return Err(ActionError::LinkClosed);
        }

        match tokio::time::timeout(self.cfg.ack_timeout, rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(ActionError::LinkClosed),
            Err(_) => {
                *self.shared.pending_param_set.lock().unwrap() = None;
                Err(ActionError::Timeout)
            }
        }
    }

    /// Run one mission-item transfer: MISSION_COUNT, answer the vehicle's
    /// item requests from the reader task, finish on MISSION_ACK.
    async fn transfer_items(
        &self,
        items: Vec<MISSION_ITEM_INT_DATA>,
    ) -> std::result::Result<(), MissionError> {
        let count = items.len() as u16;
        let (tx, rx) = oneshot::channel();
        *self.shared.mission_upload.lock().unwrap() =
            Some(MissionUpload { items, done: Some(tx) });

        let msg = MavMessage::MISSION_COUNT(MISSION_COUNT_DATA {
            target_system: self.cfg.target_system,
            target_component: self.cfg.target_component,
            count,
            ..Default::default()
        });
        if self.link.send(&msg).is_err() {
            *self.shared.mission_upload.lock().unwrap() = None;
            return Err(MissionError::LinkClosed);
        }

        match tokio::time::timeout(self.cfg.transfer_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(MissionError::LinkClosed),
            Err(_) => {
                *self.shared.mission_upload.lock().unwrap() = None;
                Err(MissionError::Timeout)
            }
        }
    }
}

impl Drop for MavVehicle {
    fn drop(&mut self) {
        self.close();
    }
}

enum CommandFailure {
    Timeout,
    LinkClosed,
}

fn action_result(result: MavResult) -> std::result::Result<(), ActionError> {
    match rejection(result) {
        None => Ok(()),
        Some(r) => Err(ActionError::Rejected(r)),
    }
}

fn offboard_result(result: MavResult) -> std::result::Result<(), OffboardError> {
    match rejection(result) {
        None => Ok(()),
        Some(r) => Err(OffboardError::Rejected(r)),
    }
}

fn rejection(result: MavResult) -> Option<Rejection> {
    match result {
        MavResult::MAV_RESULT_ACCEPTED | MavResult::MAV_RESULT_IN_PROGRESS => None,
        MavResult::MAV_RESULT_TEMPORARILY_REJECTED => Some(Rejection::TemporarilyRejected),
        MavResult::MAV_RESULT_DENIED => Some(Rejection::Denied),
        MavResult::MAV_RESULT_UNSUPPORTED => Some(Rejection::Unsupported),
        _ => Some(Rejection::Failed),
    }
}

fn action_failure(failure: CommandFailure) -> ActionError {
    match failure {
        CommandFailure::Timeout => ActionError::Timeout,
        CommandFailure::LinkClosed => ActionError::LinkClosed,
    }
}

fn offboard_failure(failure: CommandFailure) -> OffboardError {
    match failure {
        CommandFailure::Timeout => OffboardError::Timeout,
        CommandFailure::LinkClosed => OffboardError::LinkClosed,
    }
}

// ----- background loops -----

fn reader_loop(cfg: &MavConfig, link: &Link, shared: &Shared) {
    let mut backoff = RECV_ERROR_BACKOFF;
    while !shared.closed.load(Ordering::Relaxed) {
        match link.conn.recv() {
            Ok((header, msg)) => {
                backoff = RECV_ERROR_BACKOFF;
                handle_message(cfg, link, shared, &header, msg);
            }
            Err(err) => {
                // Parser hiccups are routine on lossy links; a dead socket
                // errors on every call, so back off instead of spinning.
                debug!(error = ?err, "mavlink recv error");
                std::thread::sleep(backoff);
                backoff = (backoff * 2).min(MAX_RECV_ERROR_BACKOFF);
            }
        }
    }
    debug!("mavlink reader stopped");
}

fn pump_loop(cfg: &MavConfig, link: &Link, shared: &Shared) {
    let mut last_heartbeat: Option<Instant> = None;
    while !shared.closed.load(Ordering::Relaxed) {
        let due = last_heartbeat.map_or(true, |t| t.elapsed() >= HEARTBEAT_INTERVAL);
        if due {
            let hb = MavMessage::HEARTBEAT(HEARTBEAT_DATA {
                custom_mode: 0,
                mavtype: MavType::MAV_TYPE_GCS,
                autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
                base_mode: MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
                system_status: MavState::MAV_STATE_ACTIVE,
                mavlink_version: 3,
            });
            let _ = link.send(&hb);
            last_heartbeat = Some(Instant::now());
        }

        if let Some(msg) = keepalive_message(cfg, shared) {
            let _ = link.send(&msg);
        }

        std::thread::sleep(KEEPALIVE_PERIOD);
    }
    debug!("mavlink pump stopped");
}

/// The setpoint keepalive frame, present whenever a setpoint is seeded.
/// The stream has to flow before the offboard-start ack arrives, or the
/// autopilot refuses the mode switch.
fn keepalive_message(cfg: &MavConfig, shared: &Shared) -> Option<MavMessage> {
    let setpoint = (*shared.last_setpoint.lock().unwrap())?;
    Some(wire::setpoint_message(
        &setpoint,
        cfg.target_system,
        cfg.target_component,
        shared.time_boot_ms(),
    ))
}

fn handle_message(
    cfg: &MavConfig,
    link: &Link,
    shared: &Shared,
    header: &MavHeader,
    msg: MavMessage,
) {
    match msg {
        MavMessage::HEARTBEAT(hb) => {
            if header.system_id != cfg.target_system {
                return;
            }
            let previous = shared.connection_tx.send_replace(ConnectionState::Connected);
            if previous == ConnectionState::Disconnected {
                info!(system_id = header.system_id, "vehicle discovered");
            }
            shared
                .flight_mode_tx
                .send_replace(px4::decode_flight_mode(hb.custom_mode));
        }
        MavMessage::GLOBAL_POSITION_INT(p) => {
            shared.position_tx.send_replace(Some(Position {
                latitude_deg: p.lat as f64 / 1e7,
                longitude_deg: p.lon as f64 / 1e7,
                absolute_altitude_m: p.alt as f32 / 1000.0,
                relative_altitude_m: p.relative_alt as f32 / 1000.0,
            }));
            shared.health_tx.send_modify(|h| h.global_position_ok = true);
        }
        MavMessage::HOME_POSITION(h) => {
            shared.home_tx.send_replace(Some(HomePosition {
                latitude_deg: h.latitude as f64 / 1e7,
                longitude_deg: h.longitude as f64 / 1e7,
                absolute_altitude_m: h.altitude as f32 / 1000.0,
            }));
            shared.health_tx.send_modify(|h| h.home_position_ok = true);
        }
        MavMessage::EXTENDED_SYS_STATE(e) => {
            shared
                .in_air_tx
                .send_replace(e.landed_state == MavLandedState::MAV_LANDED_STATE_IN_AIR);
        }
        MavMessage::MISSION_ITEM_REACHED(m) => {
            let total = shared.mission_total.load(Ordering::Relaxed);
            if let Some(progress) = items_completed(m.seq, total) {
                shared.mission_progress_tx.send_replace(progress);
            }
        }
        MavMessage::STATUSTEXT(s) => {
            shared.status_text_tx.send_replace(Some(StatusText {
                severity: map_severity(s.severity),
                text: bytes_to_string(&s.text),
            }));
        }
        MavMessage::COMMAND_ACK(ack) => {
            let pending = shared.pending_acks.lock().unwrap().remove(&(ack.command as u32));
            match pending {
                Some(tx) => {
                    let _ = tx.send(ack.result);
                }
                None => debug!(command = ?ack.command, result = ?ack.result, "unsolicited ack"),
            }
        }
        MavMessage::PARAM_VALUE(p) => {
            let name = bytes_to_string(&p.param_id);
            {
                let mut pending = shared.pending_param_set.lock().unwrap();
                if pending.as_ref().is_some_and(|(n, _)| *n == name) {
                    let (_, tx) = pending.take().unwrap();
                    let _ = tx.send(());
                    return;
                }
            }
            let mut list = shared.param_list.lock().unwrap();
            if let Some(state) = list.as_mut() {
                state.params.push((name, p.param_value, p.param_type));
                if state.params.len() as u16 >= p.param_count {
                    let mut state = list.take().unwrap();
                    if let Some(tx) = state.done.take() {
                        let _ = tx.send(state.params);
                    }
                }
            }
        }
        MavMessage::LOG_ENTRY(e) => {
            let mut list = shared.log_list.lock().unwrap();
            if let Some(state) = list.as_mut() {
                if e.num_logs == 0 {
                    let mut state = list.take().unwrap();
                    if let Some(tx) = state.done.take() {
                        let _ = tx.send(Vec::new());
                    }
                    return;
                }
                state.entries.push(LogEntry {
                    id: e.id,
                    date: (e.time_utc != 0)
                        .then(|| OffsetDateTime::from_unix_timestamp(e.time_utc as i64).ok())
                        .flatten(),
                    size_bytes: e.size,
                });
                if state.entries.len() as u16 >= e.num_logs {
                    let mut state = list.take().unwrap();
                    if let Some(tx) = state.done.take() {
                        let _ = tx.send(state.entries);
                    }
                }
            }
        }
        MavMessage::LOG_DATA(d) => {
            if let Some(tx) = shared.log_data_tx.lock().unwrap().as_ref() {
                let n = (d.count as usize).min(d.data.len());
                let _ = tx.send(d.data[..n].to_vec());
            }
        }
        MavMessage::MISSION_REQUEST_INT(r) => send_mission_item(link, shared, r.seq),
        MavMessage::MISSION_REQUEST(r) => send_mission_item(link, shared, r.seq),
        MavMessage::MISSION_ACK(ack) => {
            let mut upload = shared.mission_upload.lock().unwrap();
            if let Some(mut state) = upload.take() {
                let result = if ack.mavtype == MavMissionResult::MAV_MISSION_ACCEPTED {
                    Ok(())
                } else {
                    warn!(result = ?ack.mavtype, "mission transfer refused");
                    Err(MissionError::Rejected)
                };
                if let Some(tx) = state.done.take() {
                    let _ = tx.send(result);
                }
            }
        }
        _ => {}
    }
}

fn send_mission_item(link: &Link, shared: &Shared, seq: u16) {
    let upload = shared.mission_upload.lock().unwrap();
    let Some(state) = upload.as_ref() else { return };
    match state.items.get(seq as usize) {
        Some(item) => {
            let _ = link.send(&MavMessage::MISSION_ITEM_INT(item.clone()));
        }
        None => warn!(seq, "vehicle requested mission item out of range"),
    }
}

/// Progress as items completed out of the uploaded total, so reaching the
/// final item reports `total/total`. Nothing is published before an upload.
fn items_completed(reached_seq: u16, total: u16) -> Option<MissionProgress> {
    if total == 0 {
        return None;
    }
    Some(MissionProgress { current: reached_seq.saturating_add(1).min(total), total })
}

fn bytes_to_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn map_severity(severity: MavSeverity) -> Severity {
    match severity {
        MavSeverity::MAV_SEVERITY_EMERGENCY => Severity::Emergency,
        MavSeverity::MAV_SEVERITY_ALERT => Severity::Alert,
        MavSeverity::MAV_SEVERITY_CRITICAL => Severity::Critical,
        MavSeverity::MAV_SEVERITY_ERROR => Severity::Error,
        MavSeverity::MAV_SEVERITY_WARNING => Severity::Warning,
        MavSeverity::MAV_SEVERITY_NOTICE => Severity::Notice,
        MavSeverity::MAV_SEVERITY_INFO => Severity::Info,
        MavSeverity::MAV_SEVERITY_DEBUG => Severity::Debug,
    }
}

// ----- capability impls -----

impl TelemetryStreams for MavVehicle {
    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.connection_tx.subscribe()
    }
    fn health(&self) -> watch::Receiver<Health> {
        self.shared.health_tx.subscribe()
    }
    fn position(&self) -> watch::Receiver<Option<Position>> {
        self.shared.position_tx.subscribe()
    }
    fn flight_mode(&self) -> watch::Receiver<FlightMode> {
        self.shared.flight_mode_tx.subscribe()
    }
    fn in_air(&self) -> watch::Receiver<bool> {
        self.shared.in_air_tx.subscribe()
    }
    fn mission_progress(&self) -> watch::Receiver<MissionProgress> {
        self.shared.mission_progress_tx.subscribe()
    }
    fn status_text(&self) -> watch::Receiver<Option<StatusText>> {
        self.shared.status_text_tx.subscribe()
    }
    fn home(&self) -> watch::Receiver<Option<HomePosition>> {
        self.shared.home_tx.subscribe()
    }
}

#[async_trait]
impl Action for MavVehicle {
    async fn arm(&self) -> std::result::Result<(), ActionError> {
        debug!("sending arm");
        let result = self
            .command(MavCmd::MAV_CMD_COMPONENT_ARM_DISARM, [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0])
            .await
            .map_err(action_failure)?;
        action_result(result)
    }

    async fn disarm(&self) -> std::result::Result<(), ActionError> {
        debug!("sending disarm");
        let result = self
            .command(MavCmd::MAV_CMD_COMPONENT_ARM_DISARM, [0.0; 7])
            .await
            .map_err(action_failure)?;
        action_result(result)
    }

    async fn takeoff(&self) -> std::result::Result<(), ActionError> {
        debug!("sending takeoff");
        let result = self
            .command(MavCmd::MAV_CMD_NAV_TAKEOFF, [f32::NAN, 0.0, 0.0, f32::NAN, f32::NAN, f32::NAN, f32::NAN])
            .await
            .map_err(action_failure)?;
        action_result(result)
    }

    async fn set_takeoff_altitude(&self, altitude_m: f32) -> std::result::Result<(), ActionError> {
        self.set_param_float("MIS_TAKEOFF_ALT", altitude_m).await
    }

    async fn land(&self) -> std::result::Result<(), ActionError> {
        debug!("sending land");
        let result = self
            .command(MavCmd::MAV_CMD_NAV_LAND, [0.0, 0.0, 0.0, f32::NAN, f32::NAN, f32::NAN, f32::NAN])
            .await
            .map_err(action_failure)?;
        action_result(result)
    }
}

#[async_trait]
impl Offboard for MavVehicle {
    async fn start(&self) -> std::result::Result<(), OffboardError> {
        if self.shared.last_setpoint.lock().unwrap().is_none() {
            return Err(OffboardError::NoSetpointSet);
        }
        let result = self
            .command(
                MavCmd::MAV_CMD_DO_SET_MODE,
                [1.0, px4::MAIN_MODE_OFFBOARD as f32, 0.0, 0.0, 0.0, 0.0, 0.0],
            )
            .await
            .map_err(offboard_failure)?;
        offboard_result(result)
    }

    async fn stop(&self) -> std::result::Result<(), OffboardError> {
        // Hand control back to the autopilot's loiter.
        let result = self
            .command(
                MavCmd::MAV_CMD_DO_SET_MODE,
                [
                    1.0,
                    px4::MAIN_MODE_AUTO as f32,
                    px4::SUB_MODE_AUTO_LOITER as f32,
                    0.0,
                    0.0,
                    0.0,
                    0.0,
                ],
            )
            .await
            .map_err(offboard_failure)?;
        offboard_result(result)?;
        // The setpoint stream ends with offboard mode.
        *self.shared.last_setpoint.lock().unwrap() = None;
        Ok(())
    }

    async fn set_setpoint(&self, setpoint: Setpoint) -> std::result::Result<(), OffboardError> {
        *self.shared.last_setpoint.lock().unwrap() = Some(setpoint);
        let msg = wire::setpoint_message(
            &setpoint,
            self.cfg.target_system,
            self.cfg.target_component,
            self.shared.time_boot_ms(),
        );
        self.link.send(&msg).map_err(|_| OffboardError::LinkClosed)
    }
}

#[async_trait]
impl Mission for MavVehicle {
    async fn upload(&self, items: &[MissionItem]) -> std::result::Result<(), MissionError> {
        let mut data: Vec<MISSION_ITEM_INT_DATA> = Vec::new();
        for item in items {
            // A waypoint's speed applies from the leg before it, so the
            // speed-change item precedes the waypoint itself.
            if let Some(speed) = item.speed_m_s {
                data.push(MISSION_ITEM_INT_DATA {
                    target_system: self.cfg.target_system,
                    target_component: self.cfg.target_component,
                    seq: data.len() as u16,
                    frame: MavFrame::MAV_FRAME_MISSION,
                    command: MavCmd::MAV_CMD_DO_CHANGE_SPEED,
                    current: data.is_empty() as u8,
                    autocontinue: 1,
                    param1: 1.0,
                    param2: speed,
                    param3: -1.0,
                    ..Default::default()
                });
            }
            data.push(MISSION_ITEM_INT_DATA {
                target_system: self.cfg.target_system,
                target_component: self.cfg.target_component,
                seq: data.len() as u16,
                frame: MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT,
                command: MavCmd::MAV_CMD_NAV_WAYPOINT,
                current: data.is_empty() as u8,
                autocontinue: 1,
                param1: if item.is_fly_through { 0.0 } else { 1.0 },
                param2: 1.0,
                param4: f32::NAN,
                x: (item.latitude_deg * 1e7) as i32,
                y: (item.longitude_deg * 1e7) as i32,
                z: item.relative_altitude_m,
                ..Default::default()
            });
        }

        info!(items = data.len(), "uploading mission");
        let total = data.len() as u16;
        self.transfer_items(data).await?;
        self.shared.mission_total.store(total, Ordering::Relaxed);
        Ok(())
    }

    async fn start(&self) -> std::result::Result<(), ActionError> {
        debug!("sending mission start");
        let result = self
            .command(MavCmd::MAV_CMD_MISSION_START, [0.0; 7])
            .await
            .map_err(action_failure)?;
        action_result(result)
    }
}

#[async_trait]
impl Param for MavVehicle {
    async fn all_params(&self) -> std::result::Result<AllParams, ParamError> {
        let (tx, rx) = oneshot::channel();
        *self.shared.param_list.lock().unwrap() =
            Some(ParamListState { params: Vec::new(), done: Some(tx) });

        let msg = MavMessage::PARAM_REQUEST_LIST(PARAM_REQUEST_LIST_DATA {
            target_system: self.cfg.target_system,
            target_component: self.cfg.target_component,
        });
        if self.link.send(&msg).is_err() {
            *self.shared.param_list.lock().unwrap() = None;
            return Err(ParamError::LinkClosed);
        }

        let params = match tokio::time::timeout(self.cfg.transfer_timeout, rx).await {
            Ok(Ok(params)) => params,
            Ok(Err(_)) => return Err(ParamError::LinkClosed),
            Err(_) => {
                *self.shared.param_list.lock().unwrap() = None;
                return Err(ParamError::Timeout);
            }
        };

        let mut all = AllParams::default();
        for (name, value, param_type) in params {
            match param_type {
                MavParamType::MAV_PARAM_TYPE_REAL32 | MavParamType::MAV_PARAM_TYPE_REAL64 => {
                    all.float_params.push(FloatParam { name, value });
                }
                _ => all.int_params.push(IntParam { name, value: value as i32 }),
            }
        }
        Ok(all)
    }
}

#[async_trait]
impl Geofence for MavVehicle {
    async fn upload(&self, polygons: &[FencePolygon]) -> std::result::Result<(), MissionError> {
        let mut data = Vec::new();
        for polygon in polygons {
            let vertex_count = polygon.points.len() as f32;
            let command = match polygon.fence_type {
                FenceType::Inclusion => MavCmd::MAV_CMD_NAV_FENCE_POLYGON_VERTEX_INCLUSION,
                FenceType::Exclusion => MavCmd::MAV_CMD_NAV_FENCE_POLYGON_VERTEX_EXCLUSION,
            };
            for point in &polygon.points {
                let seq = data.len() as u16;
                data.push(MISSION_ITEM_INT_DATA {
                    target_system: self.cfg.target_system,
                    target_component: self.cfg.target_component,
                    seq,
                    frame: MavFrame::MAV_FRAME_GLOBAL,
                    command,
                    autocontinue: 1,
                    param1: vertex_count,
                    x: (point.latitude_deg * 1e7) as i32,
                    y: (point.longitude_deg * 1e7) as i32,
                    ..Default::default()
                });
            }
        }
        info!(vertices = data.len(), "uploading geofence");
        self.transfer_items(data).await
    }
}

#[async_trait]
impl Tune for MavVehicle {
    async fn play(&self, description: &TuneDescription) -> std::result::Result<(), ActionError> {
        let encoded = tune::encode(description);
        let bytes = encoded.as_bytes();
        let mut buf = [0u8; 30];
        if bytes.len() > buf.len() {
            warn!(length = bytes.len(), "tune string truncated to 30 bytes");
        }
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);

        let msg = MavMessage::PLAY_TUNE(PLAY_TUNE_DATA {
            target_system: self.cfg.target_system,
            target_component: self.cfg.target_component,
            tune: buf,
            ..Default::default()
        });
        // PLAY_TUNE is not acked.
        self.link.send(&msg).map_err(|_| ActionError::LinkClosed)
    }
}

#[async_trait]
impl LogFiles for MavVehicle {
    async fn entries(&self) -> std::result::Result<Vec<LogEntry>, LogError> {
        let (tx, rx) = oneshot::channel();
        *self.shared.log_list.lock().unwrap() =
            Some(LogListState { entries: Vec::new(), done: Some(tx) });

        let msg = MavMessage::LOG_REQUEST_LIST(LOG_REQUEST_LIST_DATA {
            target_system: self.cfg.target_system,
            target_component: self.cfg.target_component,
            start: 0,
            end: u16::MAX,
        });
        if self.link.send(&msg).is_err() {
            *self.shared.log_list.lock().unwrap() = None;
            return Err(LogError::LinkClosed);
        }

        match tokio::time::timeout(self.cfg.transfer_timeout, rx).await {
            Ok(Ok(mut entries)) => {
                entries.sort_by_key(|e| e.id);
                Ok(entries)
            }
            Ok(Err(_)) => Err(LogError::LinkClosed),
            Err(_) => {
                *self.shared.log_list.lock().unwrap() = None;
                Err(LogError::Timeout)
            }
        }
    }

    async fn download(&self, entry: &LogEntry, dest: &Path) -> std::result::Result<(), LogError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        *self.shared.log_data_tx.lock().unwrap() = Some(tx);

        let msg = MavMessage::LOG_REQUEST_DATA(LOG_REQUEST_DATA_DATA {
            target_system: self.cfg.target_system,
            target_component: self.cfg.target_component,
            id: entry.id,
            ofs: 0,
            count: entry.size_bytes,
        });
        if self.link.send(&msg).is_err() {
            *self.shared.log_data_tx.lock().unwrap() = None;
            return Err(LogError::LinkClosed);
        }

        info!(id = entry.id, size = entry.size_bytes, dest = %dest.display(), "downloading log");
        let mut file = tokio::fs::File::create(dest).await?;
        let expected = entry.size_bytes as u64;
        let mut received: u64 = 0;
        let mut last_percent = None;

        // Chunks assumed in order; the transports in use deliver them that way.
        while received < expected {
            let chunk = match tokio::time::timeout(self.cfg.transfer_timeout, rx.recv()).await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => {
                    *self.shared.log_data_tx.lock().unwrap() = None;
                    return Err(LogError::LinkClosed);
                }
                Err(_) => {
                    *self.shared.log_data_tx.lock().unwrap() = None;
                    return Err(LogError::Timeout);
                }
            };
            if chunk.is_empty() {
                continue;
            }
            file.write_all(&chunk).await?;
            received += chunk.len() as u64;

            let percent = (received * 100 / expected.max(1)) as u32;
            if last_percent != Some(percent) {
                info!(percent, "log download progress");
                last_percent = Some(percent);
            }
        }

        *self.shared.log_data_tx.lock().unwrap() = None;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nul_padded_ids_become_clean_strings() {
        let mut raw = [0u8; 16];
        raw[..9].copy_from_slice(b"SR_EXTRA1");
        assert_eq!(bytes_to_string(&raw), "SR_EXTRA1");
        assert_eq!(bytes_to_string(&[0u8; 16]), "");
    }

    #[test]
    fn accepted_and_in_progress_are_success() {
        assert!(action_result(MavResult::MAV_RESULT_ACCEPTED).is_ok());
        assert!(action_result(MavResult::MAV_RESULT_IN_PROGRESS).is_ok());
        assert_eq!(
            action_result(MavResult::MAV_RESULT_TEMPORARILY_REJECTED),
            Err(ActionError::Rejected(Rejection::TemporarilyRejected))
        );
        assert_eq!(
            offboard_result(MavResult::MAV_RESULT_DENIED),
            Err(OffboardError::Rejected(Rejection::Denied))
        );
    }

    #[test]
    fn severity_maps_one_to_one() {
        assert_eq!(map_severity(MavSeverity::MAV_SEVERITY_INFO), Severity::Info);
        assert_eq!(map_severity(MavSeverity::MAV_SEVERITY_CRITICAL), Severity::Critical);
    }

    #[test]
    fn keepalive_streams_once_a_setpoint_is_seeded() {
        let cfg = MavConfig::default();
        let shared = Shared::new();
        assert!(keepalive_message(&cfg, &shared).is_none());

        *shared.last_setpoint.lock().unwrap() = Some(Setpoint::PositionNedYaw {
            north_m: 0.0,
            east_m: 0.0,
            down_m: -5.0,
            yaw_deg: 0.0,
        });
        // No mode switch yet; the stream must flow anyway.
        assert!(matches!(
            keepalive_message(&cfg, &shared),
            Some(MavMessage::SET_POSITION_TARGET_LOCAL_NED(_))
        ));

        *shared.last_setpoint.lock().unwrap() = None;
        assert!(keepalive_message(&cfg, &shared).is_none());
    }

    #[test]
    fn mission_progress_counts_completed_items() {
        assert_eq!(items_completed(0, 0), None);
        assert_eq!(items_completed(0, 3), Some(MissionProgress { current: 1, total: 3 }));
        // Reaching the final item reports a complete mission.
        assert_eq!(items_completed(2, 3), Some(MissionProgress { current: 3, total: 3 }));
    }

    #[test]
    fn runtime_drop_returns_while_the_link_is_up() {
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let descriptor: Descriptor = "udp://:14581".parse().unwrap();
                let _vehicle = MavVehicle::connect(&descriptor, MavConfig::default())
                    .await
                    .unwrap();
            });
            drop(rt);
            let _ = done_tx.send(());
        });
        done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("runtime drop must not wait on the link threads");
    }
}
