//! PX4 custom-mode encoding. The 32-bit `custom_mode` carries the main mode
//! in byte 2 and the automatic sub-mode in byte 3.

use kestrel_vehicle::FlightMode;

pub const MAIN_MODE_MANUAL: u8 = 1;
pub const MAIN_MODE_ALTCTL: u8 = 2;
pub const MAIN_MODE_POSCTL: u8 = 3;
pub const MAIN_MODE_AUTO: u8 = 4;
pub const MAIN_MODE_ACRO: u8 = 5;
pub const MAIN_MODE_OFFBOARD: u8 = 6;
pub const MAIN_MODE_STABILIZED: u8 = 7;

pub const SUB_MODE_AUTO_READY: u8 = 1;
pub const SUB_MODE_AUTO_TAKEOFF: u8 = 2;
pub const SUB_MODE_AUTO_LOITER: u8 = 3;
pub const SUB_MODE_AUTO_MISSION: u8 = 4;
pub const SUB_MODE_AUTO_RTL: u8 = 5;
pub const SUB_MODE_AUTO_LAND: u8 = 6;

pub fn custom_mode(main_mode: u8, sub_mode: u8) -> u32 {
    ((sub_mode as u32) << 24) | ((main_mode as u32) << 16)
}

pub fn decode_flight_mode(custom_mode: u32) -> FlightMode {
    let main = ((custom_mode >> 16) & 0xff) as u8;
    let sub = ((custom_mode >> 24) & 0xff) as u8;
    match main {
        MAIN_MODE_MANUAL => FlightMode::Manual,
        MAIN_MODE_ALTCTL => FlightMode::Altctl,
        MAIN_MODE_POSCTL => FlightMode::Posctl,
        MAIN_MODE_ACRO => FlightMode::Acro,
        MAIN_MODE_OFFBOARD => FlightMode::Offboard,
        MAIN_MODE_STABILIZED => FlightMode::Stabilized,
        MAIN_MODE_AUTO => match sub {
            SUB_MODE_AUTO_READY => FlightMode::Ready,
            SUB_MODE_AUTO_TAKEOFF => FlightMode::Takeoff,
            SUB_MODE_AUTO_LOITER => FlightMode::Hold,
            SUB_MODE_AUTO_MISSION => FlightMode::Mission,
            SUB_MODE_AUTO_RTL => FlightMode::ReturnToLaunch,
            SUB_MODE_AUTO_LAND => FlightMode::Land,
            _ => FlightMode::Unknown,
        },
        _ => FlightMode::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offboard_round_trips() {
        assert_eq!(
            decode_flight_mode(custom_mode(MAIN_MODE_OFFBOARD, 0)),
            FlightMode::Offboard
        );
    }

    #[test]
    fn auto_sub_modes_decode() {
        assert_eq!(
            decode_flight_mode(custom_mode(MAIN_MODE_AUTO, SUB_MODE_AUTO_LOITER)),
            FlightMode::Hold
        );
        assert_eq!(
            decode_flight_mode(custom_mode(MAIN_MODE_AUTO, SUB_MODE_AUTO_RTL)),
            FlightMode::ReturnToLaunch
        );
        assert_eq!(
            decode_flight_mode(custom_mode(MAIN_MODE_AUTO, SUB_MODE_AUTO_LAND)),
            FlightMode::Land
        );
    }

    #[test]
    fn unknown_modes_are_unknown() {
        assert_eq!(decode_flight_mode(0), FlightMode::Unknown);
        assert_eq!(decode_flight_mode(custom_mode(42, 0)), FlightMode::Unknown);
        assert_eq!(decode_flight_mode(custom_mode(MAIN_MODE_AUTO, 99)), FlightMode::Unknown);
    }
}
