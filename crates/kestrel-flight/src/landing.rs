//! Watches the in-air stream and reports the airborne → landed transition.
//!
//! The subscription is infinite; the task registry is what eventually stops
//! it. One "landed" callback fires per continuous in-air phase, then the
//! observer re-arms for the next flight.

use tokio::sync::watch;
use tracing::info;

/// Invoke `on_landed` once for every in-air → not-in-air transition.
pub async fn observe_landing<F>(mut in_air: watch::Receiver<bool>, mut on_landed: F)
where
    F: FnMut(),
{
    let mut was_in_air = *in_air.borrow();
    while in_air.changed().await.is_ok() {
        let now_in_air = *in_air.borrow_and_update();
        if now_in_air {
            was_in_air = true;
        }
        if was_in_air && !now_in_air {
            info!("landed");
            on_landed();
            was_in_air = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    fn spawn_observer(
        rx: watch::Receiver<bool>,
    ) -> (Arc<AtomicUsize>, tokio::task::JoinHandle<()>) {
        let landings = Arc::new(AtomicUsize::new(0));
        let counter = landings.clone();
        let handle = tokio::spawn(observe_landing(rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        (landings, handle)
    }

    #[tokio::test]
    async fn one_event_per_flight() {
        let (tx, rx) = watch::channel(false);
        let (landings, handle) = spawn_observer(rx);

        tx.send_replace(true);
        settle().await;
        tx.send_replace(false);
        settle().await;
        assert_eq!(landings.load(Ordering::SeqCst), 1);

        // A second full flight produces a second event.
        tx.send_replace(true);
        settle().await;
        tx.send_replace(false);
        settle().await;
        assert_eq!(landings.load(Ordering::SeqCst), 2);

        drop(tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn no_event_if_never_in_air() {
        let (tx, rx) = watch::channel(false);
        let (landings, handle) = spawn_observer(rx);

        tx.send_replace(false);
        settle().await;
        tx.send_replace(false);
        settle().await;

        drop(tx);
        handle.await.unwrap();
        assert_eq!(landings.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn repeated_not_in_air_after_landing_stays_quiet() {
        let (tx, rx) = watch::channel(false);
        let (landings, handle) = spawn_observer(rx);

        tx.send_replace(true);
        settle().await;
        for _ in 0..3 {
            tx.send_replace(false);
            settle().await;
        }

        drop(tx);
        handle.await.unwrap();
        assert_eq!(landings.load(Ordering::SeqCst), 1);
    }
}
