//! Setpoint encoding into MAVLink target messages.

use mavlink::common::{
    AttitudeTargetTypemask, MavFrame, MavMessage, PositionTargetTypemask,
    SET_ATTITUDE_TARGET_DATA, SET_POSITION_TARGET_LOCAL_NED_DATA,
};

use kestrel_vehicle::Setpoint;

/// Ignore everything except position and yaw.
fn position_mask() -> PositionTargetTypemask {
    PositionTargetTypemask::POSITION_TARGET_TYPEMASK_VX_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_VY_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_VZ_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_AX_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_AY_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_AZ_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_YAW_RATE_IGNORE
}

/// Ignore everything except velocity and yaw.
fn velocity_yaw_mask() -> PositionTargetTypemask {
    PositionTargetTypemask::POSITION_TARGET_TYPEMASK_X_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_Y_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_Z_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_AX_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_AY_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_AZ_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_YAW_RATE_IGNORE
}

/// Ignore everything except velocity and yaw rate.
fn velocity_yawrate_mask() -> PositionTargetTypemask {
    PositionTargetTypemask::POSITION_TARGET_TYPEMASK_X_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_Y_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_Z_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_AX_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_AY_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_AZ_IGNORE
        | PositionTargetTypemask::POSITION_TARGET_TYPEMASK_YAW_IGNORE
}

/// ZYX euler angles (degrees) to the `[w, x, y, z]` quaternion MAVLink wants.
pub fn euler_to_quaternion(roll_deg: f32, pitch_deg: f32, yaw_deg: f32) -> [f32; 4] {
    let (roll, pitch, yaw) = (
        roll_deg.to_radians() / 2.0,
        pitch_deg.to_radians() / 2.0,
        yaw_deg.to_radians() / 2.0,
    );
    let (sr, cr) = roll.sin_cos();
    let (sp, cp) = pitch.sin_cos();
    let (sy, cy) = yaw.sin_cos();
    [
        cr * cp * cy + sr * sp * sy,
        sr * cp * cy - cr * sp * sy,
        cr * sp * cy + sr * cp * sy,
        cr * cp * sy - sr * sp * cy,
    ]
}

/// Encode one setpoint as the MAVLink message offboard mode consumes.
pub fn setpoint_message(
    setpoint: &Setpoint,
    target_system: u8,
    target_component: u8,
    time_boot_ms: u32,
) -> MavMessage {
    match *setpoint {
        Setpoint::PositionNedYaw { north_m, east_m, down_m, yaw_deg } => {
            MavMessage::SET_POSITION_TARGET_LOCAL_NED(SET_POSITION_TARGET_LOCAL_NED_DATA {
                time_boot_ms,
                target_system,
                target_component,
                coordinate_frame: MavFrame::MAV_FRAME_LOCAL_NED,
                type_mask: position_mask(),
                x: north_m,
                y: east_m,
                z: down_m,
                yaw: yaw_deg.to_radians(),
                ..Default::default()
            })
        }
        Setpoint::VelocityNedYaw { north_m_s, east_m_s, down_m_s, yaw_deg } => {
            MavMessage::SET_POSITION_TARGET_LOCAL_NED(SET_POSITION_TARGET_LOCAL_NED_DATA {
                time_boot_ms,
                target_system,
                target_component,
                coordinate_frame: MavFrame::MAV_FRAME_LOCAL_NED,
                type_mask: velocity_yaw_mask(),
                vx: north_m_s,
                vy: east_m_s,
                vz: down_m_s,
                yaw: yaw_deg.to_radians(),
                ..Default::default()
            })
        }
        Setpoint::VelocityBodyYawspeed { forward_m_s, right_m_s, down_m_s, yawspeed_deg_s } => {
            MavMessage::SET_POSITION_TARGET_LOCAL_NED(SET_POSITION_TARGET_LOCAL_NED_DATA {
                time_boot_ms,
                target_system,
                target_component,
                coordinate_frame: MavFrame::MAV_FRAME_BODY_NED,
                type_mask: velocity_yawrate_mask(),
                vx: forward_m_s,
                vy: right_m_s,
                vz: down_m_s,
                yaw_rate: yawspeed_deg_s.to_radians(),
                ..Default::default()
            })
        }
        Setpoint::Attitude { roll_deg, pitch_deg, yaw_deg, thrust } => {
            MavMessage::SET_ATTITUDE_TARGET(SET_ATTITUDE_TARGET_DATA {
                time_boot_ms,
                target_system,
                target_component,
                type_mask: AttitudeTargetTypemask::ATTITUDE_TARGET_TYPEMASK_BODY_ROLL_RATE_IGNORE
                    | AttitudeTargetTypemask::ATTITUDE_TARGET_TYPEMASK_BODY_PITCH_RATE_IGNORE
                    | AttitudeTargetTypemask::ATTITUDE_TARGET_TYPEMASK_BODY_YAW_RATE_IGNORE,
                q: euler_to_quaternion(roll_deg, pitch_deg, yaw_deg),
                thrust,
                ..Default::default()
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f32, b: f32) {
        assert!((a - b).abs() < 1e-5, "{a} != {b}");
    }

    #[test]
    fn level_attitude_is_identity_quaternion() {
        let q = euler_to_quaternion(0.0, 0.0, 0.0);
        assert_close(q[0], 1.0);
        assert_close(q[1], 0.0);
        assert_close(q[2], 0.0);
        assert_close(q[3], 0.0);
    }

    #[test]
    fn pure_yaw_rotates_about_z() {
        let q = euler_to_quaternion(0.0, 0.0, 90.0);
        let half_sqrt2 = (2.0_f32).sqrt() / 2.0;
        assert_close(q[0], half_sqrt2);
        assert_close(q[1], 0.0);
        assert_close(q[2], 0.0);
        assert_close(q[3], half_sqrt2);
    }

    #[test]
    fn position_setpoint_keeps_position_axes() {
        let sp = Setpoint::PositionNedYaw { north_m: 1.0, east_m: 2.0, down_m: -5.0, yaw_deg: 90.0 };
        let MavMessage::SET_POSITION_TARGET_LOCAL_NED(data) = setpoint_message(&sp, 1, 1, 0) else {
            panic!("wrong message type");
        };
        let mask = data.type_mask;
        assert!(!mask.contains(PositionTargetTypemask::POSITION_TARGET_TYPEMASK_X_IGNORE));
        assert!(mask.contains(PositionTargetTypemask::POSITION_TARGET_TYPEMASK_VX_IGNORE));
        assert!(mask.contains(PositionTargetTypemask::POSITION_TARGET_TYPEMASK_YAW_RATE_IGNORE));
        assert_close(data.x, 1.0);
        assert_close(data.z, -5.0);
        assert_close(data.yaw, std::f32::consts::FRAC_PI_2);
    }

    #[test]
    fn body_velocity_uses_body_frame_and_yaw_rate() {
        let sp = Setpoint::VelocityBodyYawspeed {
            forward_m_s: 5.0,
            right_m_s: 0.0,
            down_m_s: -1.0,
            yawspeed_deg_s: 60.0,
        };
        let MavMessage::SET_POSITION_TARGET_LOCAL_NED(data) = setpoint_message(&sp, 1, 1, 0) else {
            panic!("wrong message type");
        };
        assert_eq!(data.coordinate_frame, MavFrame::MAV_FRAME_BODY_NED);
        assert!(data.type_mask.contains(PositionTargetTypemask::POSITION_TARGET_TYPEMASK_YAW_IGNORE));
        assert!(!data.type_mask.contains(PositionTargetTypemask::POSITION_TARGET_TYPEMASK_VX_IGNORE));
        assert_close(data.vx, 5.0);
        assert_close(data.yaw_rate, 60.0_f32.to_radians());
    }

    #[test]
    fn attitude_setpoint_carries_thrust() {
        let sp = Setpoint::Attitude { roll_deg: 30.0, pitch_deg: 0.0, yaw_deg: 0.0, thrust: 0.6 };
        let MavMessage::SET_ATTITUDE_TARGET(data) = setpoint_message(&sp, 1, 1, 0) else {
            panic!("wrong message type");
        };
        assert_close(data.thrust, 0.6);
        assert!(data
            .type_mask
            .contains(AttitudeTargetTypemask::ATTITUDE_TARGET_TYPEMASK_BODY_YAW_RATE_IGNORE));
    }
}
