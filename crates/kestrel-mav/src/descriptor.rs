//! Transport descriptors: the connection strings callers pass in, mapped to
//! the address syntax the `mavlink` crate expects.
//!
//! - `udp://:14540` listen on a local port (simulator default)
//! - `udp://10.0.0.2:14550` send to a remote endpoint
//! - `tcp://10.0.0.2:5760` outgoing TCP
//! - `serial:///dev/ttyACM0:921600` serial device and baud rate

use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Descriptor {
    Udp { host: Option<String>, port: u16 },
    Tcp { host: String, port: u16 },
    Serial { dev: String, baud: u32 },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("unsupported transport descriptor '{0}'")]
    UnknownScheme(String),
    #[error("malformed transport descriptor '{0}'")]
    Malformed(String),
}

impl FromStr for Descriptor {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix("udp://") {
            let (host, port) = split_host_port(rest).ok_or_else(|| malformed(s))?;
            return Ok(Descriptor::Udp { host, port });
        }
        if let Some(rest) = s.strip_prefix("tcp://") {
            let (host, port) = split_host_port(rest).ok_or_else(|| malformed(s))?;
            let host = host.ok_or_else(|| malformed(s))?;
            return Ok(Descriptor::Tcp { host, port });
        }
        if let Some(rest) = s.strip_prefix("serial://") {
            let (dev, baud) = rest.rsplit_once(':').ok_or_else(|| malformed(s))?;
            if dev.is_empty() {
                return Err(malformed(s));
            }
            let baud = baud.parse().map_err(|_| malformed(s))?;
            return Ok(Descriptor::Serial { dev: dev.to_string(), baud });
        }
        Err(DescriptorError::UnknownScheme(s.to_string()))
    }
}

impl Descriptor {
    /// Address string for [`mavlink::connect`].
    pub fn to_mavlink_address(&self) -> String {
        match self {
            Descriptor::Udp { host: None, port } => format!("udpin:0.0.0.0:{port}"),
            Descriptor::Udp { host: Some(host), port } => format!("udpout:{host}:{port}"),
            Descriptor::Tcp { host, port } => format!("tcpout:{host}:{port}"),
            Descriptor::Serial { dev, baud } => format!("serial:{dev}:{baud}"),
        }
    }
}

impl std::fmt::Display for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Descriptor::Udp { host: None, port } => write!(f, "udp://:{port}"),
            Descriptor::Udp { host: Some(host), port } => write!(f, "udp://{host}:{port}"),
            Descriptor::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            Descriptor::Serial { dev, baud } => write!(f, "serial://{dev}:{baud}"),
        }
    }
}

fn split_host_port(rest: &str) -> Option<(Option<String>, u16)> {
    let (host, port) = rest.rsplit_once(':')?;
    let port = port.parse().ok()?;
    let host = if host.is_empty() { None } else { Some(host.to_string()) };
    Some((host, port))
}

fn malformed(s: &str) -> DescriptorError {
    DescriptorError::Malformed(s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulator_udp_listen() {
        let d: Descriptor = "udp://:14540".parse().unwrap();
        assert_eq!(d, Descriptor::Udp { host: None, port: 14540 });
        assert_eq!(d.to_mavlink_address(), "udpin:0.0.0.0:14540");
    }

    #[test]
    fn udp_remote_endpoint() {
        let d: Descriptor = "udp://10.1.2.3:14550".parse().unwrap();
        assert_eq!(d.to_mavlink_address(), "udpout:10.1.2.3:14550");
    }

    #[test]
    fn telemetry_radio_serial() {
        let d: Descriptor = "serial:///dev/ttyUSB0:921600".parse().unwrap();
        assert_eq!(d, Descriptor::Serial { dev: "/dev/ttyUSB0".into(), baud: 921600 });
        assert_eq!(d.to_mavlink_address(), "serial:/dev/ttyUSB0:921600");
    }

    #[test]
    fn tcp_needs_a_host() {
        assert!("tcp://:5760".parse::<Descriptor>().is_err());
        let d: Descriptor = "tcp://127.0.0.1:5760".parse().unwrap();
        assert_eq!(d.to_mavlink_address(), "tcpout:127.0.0.1:5760");
    }

    #[test]
    fn junk_is_rejected() {
        assert!(matches!(
            "carrier-pigeon://coop".parse::<Descriptor>(),
            Err(DescriptorError::UnknownScheme(_))
        ));
        assert!(matches!(
            "serial:///dev/ttyACM0:fast".parse::<Descriptor>(),
            Err(DescriptorError::Malformed(_))
        ));
    }

    #[test]
    fn display_round_trips() {
        for s in ["udp://:14540", "udp://h:1", "tcp://h:2", "serial:///dev/ttyACM0:115200"] {
            let d: Descriptor = s.parse().unwrap();
            assert_eq!(d.to_string(), s);
        }
    }
}
