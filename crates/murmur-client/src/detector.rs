//! Talk detection.
//!
//! One sampling task per audio source: every frame it reads the source's
//! frequency spectrum, compares the mean magnitude against the
//! configured threshold, and reports edges of the resulting boolean to
//! the controller. Muting is a hard override for the local party — a
//! muted sample reads inactive no matter how loud the raw signal is.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::media::{AudioSource, SPECTRUM_BINS};
use crate::session::events::{ControlEvent, InternalEvent, Party};

/// One sample per rendered frame, give or take.
const SAMPLE_INTERVAL: Duration = Duration::from_millis(16);

/// Cancellation handle for a sampling task. Dropping it (or calling
/// [`detach`](DetectorHandle::detach)) stops the task and releases the
/// source — there is no free-running loop left behind.
pub(crate) struct DetectorHandle {
    shutdown: mpsc::Sender<()>,
}

impl DetectorHandle {
    pub(crate) fn detach(self) {
        // Drop does the work.
    }
}

impl Drop for DetectorHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.try_send(());
    }
}

/// Start sampling `source` and report activity edges for `party`.
///
/// `muted` is provided for the local party only; `None` means the
/// override never applies (remote streams cannot be muted by us).
pub(crate) fn attach(
    source: Arc<dyn AudioSource>,
    party: Party,
    epoch: u64,
    threshold: f32,
    muted: Option<watch::Receiver<bool>>,
    events: mpsc::Sender<ControlEvent>,
) -> DetectorHandle {
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SAMPLE_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut bins = vec![0u8; SPECTRUM_BINS];
        let mut active = false;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let silenced = muted.as_ref().map(|rx| *rx.borrow()).unwrap_or(false);
                    let now = if silenced {
                        false
                    } else {
                        source.frequency_magnitudes(&mut bins);
                        mean(&bins) > threshold
                    };
                    if now != active {
                        active = now;
                        let event = ControlEvent::Internal(InternalEvent::Talking {
                            epoch,
                            party,
                            active,
                        });
                        if events.send(event).await.is_err() {
                            break;
                        }
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    });

    DetectorHandle {
        shutdown: shutdown_tx,
    }
}

fn mean(bins: &[u8]) -> f32 {
    bins.iter().map(|&b| u32::from(b)).sum::<u32>() as f32 / bins.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU8, Ordering};
    use tokio::time::timeout;

    struct FlatSource {
        level: AtomicU8,
    }

    impl FlatSource {
        fn new(level: u8) -> Arc<Self> {
            Arc::new(Self {
                level: AtomicU8::new(level),
            })
        }
    }

    impl AudioSource for FlatSource {
        fn frequency_magnitudes(&self, out: &mut [u8]) {
            out.fill(self.level.load(Ordering::Relaxed));
        }

        fn set_enabled(&self, _enabled: bool) {}
    }

    async fn next_talking(rx: &mut mpsc::Receiver<ControlEvent>) -> (Party, bool) {
        let event = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("no detector event")
            .expect("channel closed");
        match event {
            ControlEvent::Internal(InternalEvent::Talking { party, active, .. }) => (party, active),
            _ => panic!("unexpected event"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reports_edges_when_level_crosses_threshold() {
        let source = FlatSource::new(50);
        let (tx, mut rx) = mpsc::channel(16);
        let _handle = attach(source.clone(), Party::Remote, 1, 10.0, None, tx);

        assert_eq!(next_talking(&mut rx).await, (Party::Remote, true));

        source.level.store(0, Ordering::Relaxed);
        assert_eq!(next_talking(&mut rx).await, (Party::Remote, false));
    }

    #[tokio::test(start_paused = true)]
    async fn mute_overrides_hot_signal() {
        let source = FlatSource::new(200);
        let (muted_tx, muted_rx) = watch::channel(false);
        let (tx, mut rx) = mpsc::channel(16);
        let _handle = attach(source, Party::Local, 1, 10.0, Some(muted_rx), tx);

        assert_eq!(next_talking(&mut rx).await, (Party::Local, true));

        // Still at full level; the override alone must flip it off.
        muted_tx.send_replace(true);
        assert_eq!(next_talking(&mut rx).await, (Party::Local, false));
    }

    #[tokio::test(start_paused = true)]
    async fn detach_stops_sampling() {
        let source = FlatSource::new(0);
        let (tx, mut rx) = mpsc::channel(16);
        let handle = attach(source.clone(), Party::Local, 1, 10.0, None, tx);

        handle.detach();
        tokio::time::sleep(Duration::from_millis(50)).await;

        source.level.store(200, Ordering::Relaxed);
        let silent = timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(silent.is_err(), "detached detector kept sampling");
    }
}
