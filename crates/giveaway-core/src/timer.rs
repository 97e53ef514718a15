// Cancellable countdown timers, one live task per `TimerKind`.
//
// Timer tasks never touch orchestration state. They only send `TimerEvent`s
// onto the shared event queue, tagged with the generation they were started
// with so the state machine can drop events from superseded timers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::protocol::{Event, TimerEvent, TimerKind};

/// How long `cancel` waits for a timer task to notice its flag before
/// aborting it.
pub const CANCEL_JOIN_WAIT: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Cancel flag
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct CancelFlag {
    cancelled: AtomicBool,
    wake: Notify,
}

impl CancelFlag {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// TimerHandle
// ---------------------------------------------------------------------------

/// A live (or finished) timer task.
#[derive(Debug)]
pub struct TimerHandle {
    pub kind: TimerKind,
    pub generation: u64,
    pub context: String,
    pub deadline: Instant,
    cancel: Arc<CancelFlag>,
    task: JoinHandle<()>,
}

impl TimerHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

// ---------------------------------------------------------------------------
// TimerCoordinator
// ---------------------------------------------------------------------------

pub struct TimerCoordinator {
    tx: mpsc::Sender<Event>,
    handles: HashMap<TimerKind, TimerHandle>,
    join_wait: Duration,
}

impl TimerCoordinator {
    pub fn new(tx: mpsc::Sender<Event>) -> Self {
        Self {
            tx,
            handles: HashMap::new(),
            join_wait: CANCEL_JOIN_WAIT,
        }
    }

    /// Start a timer of `kind`, first cancelling and joining any timer of the
    /// same kind.
    pub async fn start(&mut self, kind: TimerKind, generation: u64, context: String, duration: Duration) {
        self.cancel(kind).await;

        let cancel = Arc::new(CancelFlag::default());
        let task = tokio::spawn(run_timer(
            kind,
            generation,
            context.clone(),
            duration,
            Arc::clone(&cancel),
            self.tx.clone(),
        ));
        info!(?kind, generation, %context, ?duration, "timer started");
        self.handles.insert(
            kind,
            TimerHandle {
                kind,
                generation,
                context,
                deadline: Instant::now() + duration,
                cancel,
                task,
            },
        );
    }

    /// Cancel the timer of `kind`. Safe to call when none is running.
    /// Returns true if a running timer was stopped.
    pub async fn cancel(&mut self, kind: TimerKind) -> bool {
        let Some(mut handle) = self.handles.remove(&kind) else {
            return false;
        };
        let was_running = handle.is_running();
        handle.cancel.cancel();

        if tokio::time::timeout(self.join_wait, &mut handle.task).await.is_err() {
            warn!(?kind, generation = handle.generation, "timer task did not stop in time, aborting");
            handle.task.abort();
        } else if was_running {
            debug!(?kind, generation = handle.generation, "timer cancelled");
        }
        was_running
    }

    pub async fn cancel_all(&mut self) {
        for kind in TimerKind::ALL {
            self.cancel(kind).await;
        }
    }

    pub fn is_active(&self, kind: TimerKind) -> bool {
        self.handles.get(&kind).is_some_and(TimerHandle::is_running)
    }

    pub fn handle(&self, kind: TimerKind) -> Option<&TimerHandle> {
        self.handles.get(&kind)
    }

    pub fn active_kinds(&self) -> Vec<TimerKind> {
        TimerKind::ALL
            .into_iter()
            .filter(|k| self.is_active(*k))
            .collect()
    }
}

impl Drop for TimerCoordinator {
    fn drop(&mut self) {
        for handle in self.handles.values() {
            handle.task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Timer task
// ---------------------------------------------------------------------------

async fn run_timer(
    kind: TimerKind,
    generation: u64,
    context: String,
    duration: Duration,
    cancel: Arc<CancelFlag>,
    tx: mpsc::Sender<Event>,
) {
    let start = Instant::now();
    let deadline = start + duration;
    let thresholds = kind.thresholds();
    let mut next_threshold = 0;

    let mut ticker = tokio::time::interval(kind.resolution());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.wake.notified() => {}
        }

        if cancel.is_cancelled() {
            let _ = tx
                .send(Event::Timer(TimerEvent::Cancelled { kind, generation }))
                .await;
            return;
        }

        let now = Instant::now();
        if now >= deadline {
            let _ = tx
                .send(Event::Timer(TimerEvent::Expired {
                    kind,
                    generation,
                    context,
                }))
                .await;
            return;
        }

        let elapsed = now - start;
        while let Some(&percent) = thresholds.get(next_threshold) {
            if elapsed * 100 < duration * u32::from(percent) {
                break;
            }
            next_threshold += 1;
            if tx
                .send(Event::Timer(TimerEvent::Threshold {
                    kind,
                    generation,
                    percent,
                }))
                .await
                .is_err()
            {
                return;
            }
        }

        // Progress is advisory; drop it rather than stall on a full queue.
        let _ = tx.try_send(Event::Timer(TimerEvent::Progress {
            kind,
            generation,
            remaining: deadline - now,
            total: duration,
        }));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect_until_terminal(rx: &mut mpsc::Receiver<Event>) -> Vec<TimerEvent> {
        let mut out = Vec::new();
        while let Some(Event::Timer(ev)) = rx.recv().await {
            let terminal = matches!(ev, TimerEvent::Expired { .. } | TimerEvent::Cancelled { .. });
            out.push(ev);
            if terminal {
                break;
            }
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn expires_with_context_after_duration() {
        let (tx, mut rx) = mpsc::channel(256);
        let mut timers = TimerCoordinator::new(tx);
        let started = Instant::now();
        timers
            .start(TimerKind::ExternalResponse, 3, "amy".into(), Duration::from_secs(1))
            .await;

        let events = collect_until_terminal(&mut rx).await;
        assert_eq!(
            events.last(),
            Some(&TimerEvent::Expired {
                kind: TimerKind::ExternalResponse,
                generation: 3,
                context: "amy".into(),
            })
        );
        assert!(started.elapsed() >= Duration::from_secs(1));
        let progress = events
            .iter()
            .filter(|e| matches!(e, TimerEvent::Progress { .. }))
            .count();
        assert!(progress >= 9, "expected ~10 progress ticks, got {progress}");
        assert!(!timers.is_active(TimerKind::ExternalResponse));
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_thresholds_fire_once_in_order() {
        let (tx, mut rx) = mpsc::channel(256);
        let mut timers = TimerCoordinator::new(tx);
        timers
            .start(TimerKind::Confirmation, 1, "amy".into(), Duration::from_secs(2))
            .await;

        let events = collect_until_terminal(&mut rx).await;
        let thresholds: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                TimerEvent::Threshold { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect();
        assert_eq!(thresholds, vec![15, 50, 75]);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_timer_ticks_once_per_second() {
        let (tx, mut rx) = mpsc::channel(256);
        let mut timers = TimerCoordinator::new(tx);
        timers
            .start(TimerKind::Poll, 1, "poll".into(), Duration::from_secs(3))
            .await;

        let events = collect_until_terminal(&mut rx).await;
        let remaining: Vec<Duration> = events
            .iter()
            .filter_map(|e| match e {
                TimerEvent::Progress { remaining, .. } => Some(*remaining),
                _ => None,
            })
            .collect();
        assert_eq!(
            remaining,
            vec![
                Duration::from_secs(3),
                Duration::from_secs(2),
                Duration::from_secs(1)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_emits_cancelled_and_is_idempotent() {
        let (tx, mut rx) = mpsc::channel(256);
        let mut timers = TimerCoordinator::new(tx);
        timers
            .start(TimerKind::Confirmation, 5, "amy".into(), Duration::from_secs(90))
            .await;
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert!(timers.cancel(TimerKind::Confirmation).await);
        assert!(!timers.cancel(TimerKind::Confirmation).await);
        assert!(!timers.cancel(TimerKind::Poll).await);

        let events = collect_until_terminal(&mut rx).await;
        assert_eq!(
            events.last(),
            Some(&TimerEvent::Cancelled {
                kind: TimerKind::Confirmation,
                generation: 5,
            })
        );
        assert!(timers.active_kinds().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_a_kind_replaces_the_old_timer() {
        let (tx, mut rx) = mpsc::channel(256);
        let mut timers = TimerCoordinator::new(tx);
        timers
            .start(TimerKind::QuickWatchdog, 1, "a".into(), Duration::from_secs(5))
            .await;
        timers
            .start(TimerKind::QuickWatchdog, 2, "b".into(), Duration::from_millis(300))
            .await;
        assert_eq!(timers.active_kinds(), vec![TimerKind::QuickWatchdog]);
        assert_eq!(timers.handle(TimerKind::QuickWatchdog).map(|h| h.generation), Some(2));

        let first = collect_until_terminal(&mut rx).await;
        assert!(matches!(
            first.last(),
            Some(TimerEvent::Cancelled { generation: 1, .. })
        ));
        let second = collect_until_terminal(&mut rx).await;
        assert!(matches!(
            second.last(),
            Some(TimerEvent::Expired { generation: 2, .. })
        ));
        assert!(second.iter().all(|e| e.generation() == 2));
    }

    #[tokio::test(start_paused = true)]
    async fn kinds_run_independently() {
        let (tx, _rx) = mpsc::channel(1024);
        let mut timers = TimerCoordinator::new(tx);
        timers
            .start(TimerKind::Confirmation, 1, "a".into(), Duration::from_secs(30))
            .await;
        timers
            .start(TimerKind::Poll, 1, "poll".into(), Duration::from_secs(30))
            .await;
        assert_eq!(
            timers.active_kinds(),
            vec![TimerKind::Confirmation, TimerKind::Poll]
        );
        timers.cancel_all().await;
        assert!(timers.active_kinds().is_empty());
    }
}
