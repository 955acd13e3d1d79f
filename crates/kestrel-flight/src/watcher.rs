//! Edge-triggered telemetry printers. Each watcher follows one stream and
//! logs a line only when the tracked value differs from the one it last
//! printed, so a stable value stays quiet no matter how often it is re-sent.

use tokio::sync::watch;
use tracing::info;

use kestrel_vehicle::{Session, TelemetryStreams};

use crate::tasks::TaskRegistry;

/// Drive `sink` with the mapped value of `rx` every time it changes.
///
/// `map` returning `None` means "nothing to report yet" (stream still on its
/// initial placeholder). Returns when the sender side is dropped.
pub async fn on_change<T, U, M, S>(mut rx: watch::Receiver<T>, mut map: M, mut sink: S)
where
    M: FnMut(&T) -> Option<U>,
    U: PartialEq,
    S: FnMut(&U),
{
    let mut last: Option<U> = None;
    loop {
        let mapped = {
            let guard = rx.borrow_and_update();
            map(&guard)
        };
        if let Some(value) = mapped {
            if last.as_ref() != Some(&value) {
                sink(&value);
                last = Some(value);
            }
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Spawn the altitude / flight-mode / mission-progress watchers.
pub fn spawn_watchers(session: &Session, registry: &mut TaskRegistry) {
    let position = session.telemetry.position();
    registry.spawn("altitude-watcher", async move {
        on_change(
            position,
            |p| p.map(|p| p.relative_altitude_m.round() as i32),
            |altitude| info!("altitude: {altitude} m"),
        )
        .await;
    });

    let flight_mode = session.telemetry.flight_mode();
    registry.spawn("flight-mode-watcher", async move {
        on_change(
            flight_mode,
            |m| (*m != kestrel_vehicle::FlightMode::Unknown).then_some(*m),
            |mode| info!("flight mode: {mode}"),
        )
        .await;
    });

    let progress = session.telemetry.mission_progress();
    registry.spawn("mission-progress-watcher", async move {
        on_change(
            progress,
            |p| (*p != kestrel_vehicle::MissionProgress::default()).then_some(*p),
            |progress| info!("mission progress: {progress}"),
        )
        .await;
    });
}

/// Spawn the status-text printer. Separate from [`spawn_watchers`] because it
/// starts as soon as the transport connects, before health is established.
pub fn spawn_status_text(session: &Session, registry: &mut TaskRegistry) {
    let status = session.telemetry.status_text();
    registry.spawn("status-text", async move {
        on_change(
            status,
            |s| s.clone(),
            |status| info!("status: {}: {}", status.severity, status.text),
        )
        .await;
    });
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn emits_only_on_changed_rounded_altitude() {
        let (tx, rx) = watch::channel(None::<f32>);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let watcher = tokio::spawn(on_change(
            rx,
            |alt: &Option<f32>| alt.map(|a| a.round() as i32),
            move |v| sink.lock().unwrap().push(*v),
        ));

        for altitude in [4.6_f32, 5.2, 5.4, 6.0] {
            tx.send_replace(Some(altitude));
            settle().await;
        }
        drop(tx);
        watcher.await.unwrap();

        // 4.6, 5.2 and 5.4 all round to 5; only the first of them prints.
        assert_eq!(*seen.lock().unwrap(), vec![5, 6]);
    }

    #[tokio::test]
    async fn initial_placeholder_is_not_reported() {
        let (tx, rx) = watch::channel(None::<i32>);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let watcher = tokio::spawn(on_change(rx, |v: &Option<i32>| *v, move |v| {
            sink.lock().unwrap().push(*v)
        }));

        settle().await;
        assert!(seen.lock().unwrap().is_empty());

        tx.send_replace(Some(7));
        settle().await;
        drop(tx);
        watcher.await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn repeated_identical_values_print_once() {
        let (tx, rx) = watch::channel(0_u32);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let watcher = tokio::spawn(on_change(rx, |v: &u32| Some(*v), move |v| {
            sink.lock().unwrap().push(*v)
        }));

        for value in [0, 0, 1, 1, 1, 2] {
            tx.send_replace(value);
            settle().await;
        }
        drop(tx);
        watcher.await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }
}
