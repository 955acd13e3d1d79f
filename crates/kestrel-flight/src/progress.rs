//! Blocks a mission run until the vehicle reports every uploaded item
//! reached.

use tracing::{info, warn};

use kestrel_vehicle::TelemetryStreams;

/// Follow the mission-progress stream until `current` reaches `total`.
///
/// Progress counts items completed, so a finished mission reports
/// `total/total`. The idle `0/0` placeholder is skipped. Returns early if
/// the stream closes.
pub async fn wait_until_mission_complete(telemetry: &dyn TelemetryStreams) {
    let mut rx = telemetry.mission_progress();
    loop {
        let progress = *rx.borrow_and_update();
        if progress.total > 0 {
            info!(%progress, "mission progress");
            if progress.current >= progress.total {
                info!("mission complete");
                return;
            }
        }
        if rx.changed().await.is_err() {
            warn!("mission progress stream closed");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_vehicle::fake::FakeVehicle;
    use kestrel_vehicle::MissionProgress;

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn completes_when_the_last_item_is_reached() {
        let fake = FakeVehicle::new();
        let session = fake.session();
        let waiter = tokio::spawn(async move {
            wait_until_mission_complete(&*session.telemetry).await;
        });

        for current in 1..=2 {
            fake.set_mission_progress(MissionProgress { current, total: 3 });
            settle().await;
            assert!(!waiter.is_finished(), "still {current}/3");
        }
        fake.set_mission_progress(MissionProgress { current: 3, total: 3 });
        settle().await;
        assert!(waiter.is_finished());
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn idle_placeholder_does_not_complete() {
        let fake = FakeVehicle::new();
        let session = fake.session();
        let waiter = tokio::spawn(async move {
            wait_until_mission_complete(&*session.telemetry).await;
        });

        fake.set_mission_progress(MissionProgress::default());
        settle().await;
        assert!(!waiter.is_finished());

        fake.set_mission_progress(MissionProgress { current: 1, total: 1 });
        settle().await;
        waiter.await.unwrap();
    }
}
