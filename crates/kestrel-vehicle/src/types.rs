use serde::Deserialize;
use time::OffsetDateTime;

/// One externally supplied target command, issued to the vehicle at a point
/// in time while offboard mode is active.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Setpoint {
    /// Local position in the north/east/down frame plus heading.
    PositionNedYaw {
        north_m: f32,
        east_m: f32,
        down_m: f32,
        yaw_deg: f32,
    },
    /// Attitude angles plus normalized thrust (0.0..=1.0).
    Attitude {
        roll_deg: f32,
        pitch_deg: f32,
        yaw_deg: f32,
        thrust: f32,
    },
    /// Body-frame velocity plus yaw rate.
    VelocityBodyYawspeed {
        forward_m_s: f32,
        right_m_s: f32,
        down_m_s: f32,
        yawspeed_deg_s: f32,
    },
    /// NED-frame velocity plus heading.
    VelocityNedYaw {
        north_m_s: f32,
        east_m_s: f32,
        down_m_s: f32,
        yaw_deg: f32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

/// Position/home fix health, the gate for arming and offboard flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Health {
    pub global_position_ok: bool,
    pub home_position_ok: bool,
}

impl Health {
    pub fn ready(&self) -> bool {
        self.global_position_ok && self.home_position_ok
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub absolute_altitude_m: f32,
    pub relative_altitude_m: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HomePosition {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub absolute_altitude_m: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlightMode {
    #[default]
    Unknown,
    Manual,
    Altctl,
    Posctl,
    Acro,
    Stabilized,
    Offboard,
    Ready,
    Takeoff,
    Hold,
    Mission,
    ReturnToLaunch,
    Land,
}

impl std::fmt::Display for FlightMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FlightMode::Unknown => "UNKNOWN",
            FlightMode::Manual => "MANUAL",
            FlightMode::Altctl => "ALTCTL",
            FlightMode::Posctl => "POSCTL",
            FlightMode::Acro => "ACRO",
            FlightMode::Stabilized => "STABILIZED",
            FlightMode::Offboard => "OFFBOARD",
            FlightMode::Ready => "READY",
            FlightMode::Takeoff => "TAKEOFF",
            FlightMode::Hold => "HOLD",
            FlightMode::Mission => "MISSION",
            FlightMode::ReturnToLaunch => "RTL",
            FlightMode::Land => "LAND",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MissionProgress {
    pub current: u16,
    pub total: u16,
}

impl std::fmt::Display for MissionProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.current, self.total)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Info,
    Debug,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Emergency => "EMERGENCY",
            Severity::Alert => "ALERT",
            Severity::Critical => "CRITICAL",
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Notice => "NOTICE",
            Severity::Info => "INFO",
            Severity::Debug => "DEBUG",
        };
        f.write_str(s)
    }
}

/// Free-text status message from the autopilot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusText {
    pub severity: Severity,
    pub text: String,
}

/// One waypoint of an uploadable mission.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MissionItem {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub relative_altitude_m: f32,
    pub speed_m_s: Option<f32>,
    pub is_fly_through: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FencePoint {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceType {
    Inclusion,
    Exclusion,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FencePolygon {
    pub points: Vec<FencePoint>,
    pub fence_type: FenceType,
}

impl FencePolygon {
    /// Square inclusion fence centered on a position, `half_side_deg` degrees
    /// to each side.
    pub fn square_around(latitude_deg: f64, longitude_deg: f64, half_side_deg: f64) -> Self {
        let d = half_side_deg;
        Self {
            points: vec![
                FencePoint { latitude_deg: latitude_deg - d, longitude_deg: longitude_deg - d },
                FencePoint { latitude_deg: latitude_deg + d, longitude_deg: longitude_deg - d },
                FencePoint { latitude_deg: latitude_deg + d, longitude_deg: longitude_deg + d },
                FencePoint { latitude_deg: latitude_deg - d, longitude_deg: longitude_deg + d },
            ],
            fence_type: FenceType::Inclusion,
        }
    }
}

/// Elements of a playable buzzer tune.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SongElement {
    Duration1,
    Duration2,
    Duration4,
    Duration8,
    NoteA,
    NoteB,
    NoteC,
    NoteD,
    NoteE,
    NoteF,
    NoteG,
    NotePause,
    Sharp,
    Flat,
    OctaveUp,
    OctaveDown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TuneDescription {
    pub elements: Vec<SongElement>,
    /// Quarter notes per minute.
    pub tempo: u32,
}

/// One on-vehicle log file as reported by the autopilot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub id: u16,
    pub date: Option<OffsetDateTime>,
    pub size_bytes: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntParam {
    pub name: String,
    pub value: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FloatParam {
    pub name: String,
    pub value: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllParams {
    pub int_params: Vec<IntParam>,
    pub float_params: Vec<FloatParam>,
}
