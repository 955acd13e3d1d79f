//! The scripted maneuver core: a fixed timeline of setpoints with
//! timer-based pacing, bracketed by arm / offboard-start / offboard-stop /
//! land. No feedback, no retries, no mid-sequence cancellation.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

use kestrel_vehicle::{ActionError, OffboardError, Session, Setpoint};

/// Heading held through the plain takeoff maneuver, degrees from north.
const TAKEOFF_YAW_DEG: f32 = 0.0;

/// Hold after the land command so touchdown completes before teardown.
const POST_LAND_HOLD: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Maneuver {
    /// Climb to -5 m down, turn to face east, land.
    Takeoff,
    /// Assisted takeoff, then attitude/thrust setpoints (roll left/right).
    AltitudeControl,
    /// A local-position box: out 5 m north, 10 m east and back down.
    GpsControl,
    /// Body-frame velocity: spin, climb, fly circles forward and sideways.
    VelocityControl,
    /// NED velocity sweeps through the four cardinal directions.
    GpsVelocityControl,
}

impl Maneuver {
    pub const ALL: [Maneuver; 5] = [
        Maneuver::Takeoff,
        Maneuver::AltitudeControl,
        Maneuver::GpsControl,
        Maneuver::VelocityControl,
        Maneuver::GpsVelocityControl,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Maneuver::Takeoff => "takeoff",
            Maneuver::AltitudeControl => "altitude_control",
            Maneuver::GpsControl => "gps_control",
            Maneuver::VelocityControl => "velocity_control",
            Maneuver::GpsVelocityControl => "gps_velocity_control",
        }
    }
}

impl std::fmt::Display for Maneuver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown maneuver '{0}', expected one of: takeoff, altitude_control, gps_control, velocity_control, gps_velocity_control")]
pub struct UnknownManeuver(String);

impl FromStr for Maneuver {
    type Err = UnknownManeuver;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Maneuver::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| UnknownManeuver(s.to_string()))
    }
}

/// Autopilot-assisted takeoff executed before offboard mode is entered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TakeoffPhase {
    pub altitude_m: f32,
    pub settle: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub label: &'static str,
    pub setpoint: Setpoint,
    pub hold: Duration,
}

/// A maneuver's full timeline. Everything here is a compile-time constant;
/// ordering is fixed at authoring time.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub maneuver: Maneuver,
    pub takeoff: Option<TakeoffPhase>,
    /// Seed setpoint, issued before offboard start as the protocol requires.
    pub neutral: Setpoint,
    pub steps: Vec<Step>,
    pub post_land_hold: Duration,
}

#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("starting offboard mode failed: {0}")]
    OffboardRejected(#[source] OffboardError),
    #[error("issuing setpoint failed: {0}")]
    Setpoint(#[source] OffboardError),
    #[error(transparent)]
    Action(#[from] ActionError),
}

fn pos(north_m: f32, east_m: f32, down_m: f32, yaw_deg: f32) -> Setpoint {
    Setpoint::PositionNedYaw { north_m, east_m, down_m, yaw_deg }
}

fn att(roll_deg: f32, pitch_deg: f32, yaw_deg: f32, thrust: f32) -> Setpoint {
    Setpoint::Attitude { roll_deg, pitch_deg, yaw_deg, thrust }
}

fn vel_body(forward_m_s: f32, right_m_s: f32, down_m_s: f32, yawspeed_deg_s: f32) -> Setpoint {
    Setpoint::VelocityBodyYawspeed { forward_m_s, right_m_s, down_m_s, yawspeed_deg_s }
}

fn vel_ned(north_m_s: f32, east_m_s: f32, down_m_s: f32, yaw_deg: f32) -> Setpoint {
    Setpoint::VelocityNedYaw { north_m_s, east_m_s, down_m_s, yaw_deg }
}

fn step(label: &'static str, setpoint: Setpoint, hold_s: u64) -> Step {
    Step { label, setpoint, hold: Duration::from_secs(hold_s) }
}

/// The fixed maneuver catalog.
pub fn plan(maneuver: Maneuver) -> Plan {
    match maneuver {
        Maneuver::Takeoff => Plan {
            maneuver,
            takeoff: None,
            neutral: pos(0.0, 0.0, 0.0, TAKEOFF_YAW_DEG),
            steps: vec![
                step("go 0m north, 0m east, -5m down", pos(0.0, 0.0, -5.0, TAKEOFF_YAW_DEG), 10),
                step("hold -5m down, turn to face south", pos(0.0, 0.0, -5.0, 180.0), 10),
            ],
            post_land_hold: POST_LAND_HOLD,
        },
        Maneuver::AltitudeControl => Plan {
            maneuver,
            takeoff: Some(TakeoffPhase { altitude_m: 4.0, settle: Duration::from_secs(8) }),
            neutral: att(0.0, 0.0, 0.0, 0.0),
            steps: vec![
                step("go up at 70% thrust", att(0.0, 0.0, 0.0, 0.7), 4),
                step("roll 30 at 60% thrust", att(30.0, 0.0, 0.0, 0.6), 2),
                step("roll -30 at 60% thrust", att(-30.0, 0.0, 0.0, 0.6), 2),
                step("hover at 60% thrust", att(0.0, 0.0, 0.0, 0.6), 2),
            ],
            post_land_hold: POST_LAND_HOLD,
        },
        Maneuver::GpsControl => Plan {
            maneuver,
            takeoff: None,
            neutral: pos(0.0, 0.0, 0.0, 0.0),
            steps: vec![
                step("go 0m north, 0m east, -5m down", pos(0.0, 0.0, -5.0, 0.0), 10),
                step("go 5m north, turn to face east", pos(5.0, 0.0, -5.0, 90.0), 10),
                step("go 5m north, 10m east", pos(5.0, 10.0, -5.0, 90.0), 15),
                step("go 0m north, 10m east, turn to face south", pos(0.0, 10.0, 0.0, 180.0), 10),
            ],
            post_land_hold: POST_LAND_HOLD,
        },
        Maneuver::VelocityControl => Plan {
            maneuver,
            takeoff: None,
            neutral: vel_body(0.0, 0.0, 0.0, 0.0),
            steps: vec![
                step("turn clockwise and climb", vel_body(0.0, 0.0, -1.0, 60.0), 5),
                step("turn back anti-clockwise", vel_body(0.0, 0.0, 0.0, -60.0), 5),
                step("hold", vel_body(0.0, 0.0, 0.0, 0.0), 2),
                step("fly a circle", vel_body(5.0, 0.0, 0.0, 30.0), 15),
                step("hold", vel_body(0.0, 0.0, 0.0, 0.0), 5),
                step("fly a circle sideways", vel_body(0.0, -5.0, 0.0, 30.0), 15),
                step("hold", vel_body(0.0, 0.0, 0.0, 0.0), 8),
            ],
            post_land_hold: POST_LAND_HOLD,
        },
        Maneuver::GpsVelocityControl => Plan {
            maneuver,
            takeoff: None,
            neutral: vel_ned(0.0, 0.0, 0.0, 0.0),
            steps: vec![
                step("go up 2 m/s", vel_ned(0.0, 0.0, -2.0, 0.0), 4),
                step("go north 2 m/s, turn to face east", vel_ned(2.0, 0.0, 0.0, 90.0), 4),
                step("go south 2 m/s, turn to face west", vel_ned(-2.0, 0.0, 0.0, 270.0), 4),
                step("go west 2 m/s, turn to face east", vel_ned(0.0, -2.0, 0.0, 90.0), 4),
                step("go east 2 m/s", vel_ned(0.0, 2.0, 0.0, 90.0), 4),
                step("turn to face south", vel_ned(0.0, 0.0, 0.0, 180.0), 2),
                step("go down 1 m/s, turn to face north", vel_ned(0.0, 0.0, 1.0, 0.0), 4),
            ],
            post_land_hold: POST_LAND_HOLD,
        },
    }
}

/// Execute one maneuver to completion.
///
/// Order is fixed: arm, optional assisted takeoff, seed setpoint, offboard
/// start, the timed steps, offboard stop, land, post-land hold. If offboard
/// start is rejected the vehicle is disarmed and no further setpoint is
/// issued. A rejected offboard stop is logged and the landing proceeds.
pub async fn run(session: &Session, maneuver: Maneuver) -> Result<(), SequenceError> {
    let plan = plan(maneuver);
    info!(maneuver = %plan.maneuver, steps = plan.steps.len(), "starting maneuver");

    info!("arming");
    session.action.arm().await?;

    if let Some(phase) = &plan.takeoff {
        info!(altitude_m = phase.altitude_m, "assisted takeoff");
        session.action.set_takeoff_altitude(phase.altitude_m).await?;
        session.action.takeoff().await?;
        sleep(phase.settle).await;
    }

    info!("seeding initial setpoint");
    session
        .offboard
        .set_setpoint(plan.neutral)
        .await
        .map_err(SequenceError::Setpoint)?;

    info!("starting offboard");
    if let Err(err) = session.offboard.start().await {
        warn!(error = %err, "starting offboard mode failed, disarming");
        if let Err(disarm_err) = session.action.disarm().await {
            warn!(error = %disarm_err, "disarm after offboard failure also failed");
        }
        return Err(SequenceError::OffboardRejected(err));
    }

    for step in &plan.steps {
        info!("{}", step.label);
        session
            .offboard
            .set_setpoint(step.setpoint)
            .await
            .map_err(SequenceError::Setpoint)?;
        sleep(step.hold).await;
    }

    info!("stopping offboard");
    if let Err(err) = session.offboard.stop().await {
        // Not retried; the land below still takes control back.
        warn!(error = %err, "stopping offboard mode failed");
    }

    info!("landing");
    session.action.land().await?;
    sleep(plan.post_land_hold).await;

    info!(maneuver = %plan.maneuver, "maneuver complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_vehicle::fake::{Call, FakeVehicle};
    use kestrel_vehicle::Rejection;

    #[tokio::test(start_paused = true)]
    async fn takeoff_sequences_exact_timeline() {
        let fake = FakeVehicle::new();
        let session = fake.session();
        let started = tokio::time::Instant::now();

        run(&session, Maneuver::Takeoff).await.unwrap();

        assert_eq!(
            fake.calls(),
            vec![
                Call::Arm,
                Call::Setpoint(pos(0.0, 0.0, 0.0, 0.0)),
                Call::OffboardStart,
                Call::Setpoint(pos(0.0, 0.0, -5.0, 0.0)),
                Call::Setpoint(pos(0.0, 0.0, -5.0, 180.0)),
                Call::OffboardStop,
                Call::Land,
            ]
        );
        // Two 10 s holds plus the 10 s post-land hold.
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_offboard_start_disarms_and_stops() {
        let fake = FakeVehicle::new();
        fake.reject_next_offboard_start(Rejection::Denied);
        let session = fake.session();

        let err = run(&session, Maneuver::Takeoff).await.unwrap_err();
        assert!(matches!(
            err,
            SequenceError::OffboardRejected(OffboardError::Rejected(Rejection::Denied))
        ));

        let calls = fake.calls();
        assert_eq!(
            calls,
            vec![
                Call::Arm,
                Call::Setpoint(pos(0.0, 0.0, 0.0, 0.0)),
                Call::OffboardStart,
                Call::Disarm,
            ]
        );
        // No setpoint after the rejected start, and no land.
        assert!(!calls.contains(&Call::Land));
    }

    #[tokio::test(start_paused = true)]
    async fn every_maneuver_honors_the_offboard_bracketing() {
        for maneuver in Maneuver::ALL {
            let fake = FakeVehicle::new();
            let session = fake.session();
            run(&session, maneuver).await.unwrap();

            let calls = fake.calls();
            let first_setpoint = calls
                .iter()
                .position(|c| matches!(c, Call::Setpoint(_)))
                .expect("maneuver issues setpoints");
            let last_setpoint = calls
                .iter()
                .rposition(|c| matches!(c, Call::Setpoint(_)))
                .unwrap();
            let arm = calls.iter().position(|c| *c == Call::Arm).unwrap();
            let start = calls.iter().position(|c| *c == Call::OffboardStart).unwrap();
            let stop = calls.iter().position(|c| *c == Call::OffboardStop).unwrap();
            let land = calls.iter().position(|c| *c == Call::Land).unwrap();

            assert!(arm < start, "{maneuver}: arm must precede offboard start");
            assert!(
                first_setpoint < start,
                "{maneuver}: a setpoint must be seeded before offboard start"
            );
            assert!(
                start < last_setpoint,
                "{maneuver}: maneuver steps must follow offboard start"
            );
            assert!(last_setpoint < stop, "{maneuver}: steps end before offboard stop");
            assert!(stop < land, "{maneuver}: offboard stop must precede land");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn altitude_control_runs_assisted_takeoff_first() {
        let fake = FakeVehicle::new();
        let session = fake.session();
        run(&session, Maneuver::AltitudeControl).await.unwrap();

        let calls = fake.calls();
        let set_alt = calls
            .iter()
            .position(|c| *c == Call::SetTakeoffAltitude(4.0))
            .unwrap();
        let takeoff = calls.iter().position(|c| *c == Call::Takeoff).unwrap();
        let first_setpoint = calls
            .iter()
            .position(|c| matches!(c, Call::Setpoint(_)))
            .unwrap();
        assert!(set_alt < takeoff);
        assert!(takeoff < first_setpoint);
    }

    #[test]
    fn catalog_is_complete_and_well_formed() {
        for maneuver in Maneuver::ALL {
            let plan = plan(maneuver);
            assert!(!plan.steps.is_empty(), "{maneuver} has no steps");
            assert_eq!(plan.post_land_hold, Duration::from_secs(10));
            for step in &plan.steps {
                assert!(step.hold > Duration::ZERO, "{maneuver}: zero hold");
            }
        }
    }

    #[test]
    fn maneuver_names_round_trip() {
        for maneuver in Maneuver::ALL {
            assert_eq!(maneuver.name().parse::<Maneuver>().unwrap(), maneuver);
        }
        assert!("barrel_roll".parse::<Maneuver>().is_err());
    }
}
