//! Blocking waits for the two link-up gates: the transport reporting
//! connected, then the autopilot reporting a usable position/home fix.

use std::time::Duration;

use thiserror::Error;
use tracing::info;

use kestrel_vehicle::{ConnectionState, TelemetryStreams};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    #[error("link never reported connected within {0:?}")]
    ConnectionTimeout(Duration),
    #[error("no global position/home fix within {0:?}")]
    HealthTimeout(Duration),
    #[error("telemetry stream closed")]
    StreamClosed,
}

/// Resolve once the connection-state stream reports connected.
pub async fn wait_until_connected(
    telemetry: &dyn TelemetryStreams,
    timeout: Duration,
) -> Result<(), ConnectError> {
    info!("waiting for vehicle to connect");
    let mut rx = telemetry.connection_state();
    let wait = async move {
        loop {
            if *rx.borrow_and_update() == ConnectionState::Connected {
                return Ok(());
            }
            if rx.changed().await.is_err() {
                return Err(ConnectError::StreamClosed);
            }
        }
    };
    tokio::time::timeout(timeout, wait)
        .await
        .map_err(|_| ConnectError::ConnectionTimeout(timeout))??;
    info!("vehicle connected");
    Ok(())
}

/// Resolve once health reports both a global position and a home position
/// fix. `timeout: None` waits indefinitely (GPS lock can legitimately take
/// a while outdoors); the config default is finite.
pub async fn wait_until_ready(
    telemetry: &dyn TelemetryStreams,
    timeout: Option<Duration>,
) -> Result<(), ConnectError> {
    info!("waiting for global position estimate");
    let mut rx = telemetry.health();
    let wait = async move {
        loop {
            if rx.borrow_and_update().ready() {
                return Ok(());
            }
            if rx.changed().await.is_err() {
                return Err(ConnectError::StreamClosed);
            }
        }
    };
    match timeout {
        Some(t) => tokio::time::timeout(t, wait)
            .await
            .map_err(|_| ConnectError::HealthTimeout(t))??,
        None => wait.await?,
    }
    info!("global position estimate OK");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_vehicle::fake::FakeVehicle;
    use kestrel_vehicle::Health;

    #[tokio::test(start_paused = true)]
    async fn connected_after_one_event() {
        let fake = FakeVehicle::new();
        let session = fake.session();
        let waiter = {
            let session = session.clone();
            tokio::spawn(async move {
                wait_until_connected(&*session.telemetry, Duration::from_secs(30)).await
            })
        };
        tokio::task::yield_now().await;
        fake.set_connected();
        assert_eq!(waiter.await.unwrap(), Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn connect_times_out_when_no_signal_arrives() {
        let fake = FakeVehicle::new();
        let session = fake.session();
        let err = wait_until_connected(&*session.telemetry, Duration::from_secs(30))
            .await
            .unwrap_err();
        assert_eq!(err, ConnectError::ConnectionTimeout(Duration::from_secs(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn ready_requires_both_health_flags() {
        let fake = FakeVehicle::new();
        let session = fake.session();
        let waiter = {
            let session = session.clone();
            tokio::spawn(async move {
                wait_until_ready(&*session.telemetry, Some(Duration::from_secs(60))).await
            })
        };
        tokio::task::yield_now().await;
        fake.set_health(Health { global_position_ok: true, home_position_ok: false });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        fake.set_health_ok();
        assert_eq!(waiter.await.unwrap(), Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn ready_times_out_with_finite_timeout() {
        let fake = FakeVehicle::new();
        let session = fake.session();
        let err = wait_until_ready(&*session.telemetry, Some(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert_eq!(err, ConnectError::HealthTimeout(Duration::from_secs(5)));
    }
}
