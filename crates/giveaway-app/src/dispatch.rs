// Carries out the effects produced by the state machine.
//
// Timer starts and cancels are awaited so a cancelled timer is gone before
// the pump handles the next event. Everything else that touches the network
// runs on spawned tasks; presentation updates never block.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use giveaway_core::protocol::{Effect, Event, LookupRequest, UiUpdate};
use giveaway_core::timer::TimerCoordinator;
use giveaway_lookup::{LookupClient, LookupTiming};

use crate::chat::ChatSink;

/// Outbound announcements waiting for the chat sender task.
const SAY_QUEUE_DEPTH: usize = 64;

pub struct Dispatcher {
    timers: TimerCoordinator,
    events_tx: mpsc::Sender<Event>,
    ui_tx: mpsc::Sender<UiUpdate>,
    say_tx: mpsc::Sender<String>,
    say_task: JoinHandle<()>,
    chat: Arc<dyn ChatSink>,
    lookup: LookupClient,
    timing: LookupTiming,
    lookup_task: Option<JoinHandle<()>>,
    idle_task: Option<JoinHandle<()>>,
}

impl Dispatcher {
    pub fn new(
        events_tx: mpsc::Sender<Event>,
        ui_tx: mpsc::Sender<UiUpdate>,
        chat: Arc<dyn ChatSink>,
        lookup: LookupClient,
        timing: LookupTiming,
    ) -> Self {
        let (say_tx, say_rx) = mpsc::channel(SAY_QUEUE_DEPTH);
        let say_task = tokio::spawn(send_announcements(say_rx, Arc::clone(&chat)));
        Self {
            timers: TimerCoordinator::new(events_tx.clone()),
            events_tx,
            ui_tx,
            say_tx,
            say_task,
            chat,
            lookup,
            timing,
            lookup_task: None,
            idle_task: None,
        }
    }

    pub fn timers(&self) -> &TimerCoordinator {
        &self.timers
    }

    /// Apply effects in order. Returns true once shutdown was requested.
    pub async fn apply(&mut self, effects: Vec<Effect>) -> bool {
        let mut shutdown = false;
        for effect in effects {
            match effect {
                Effect::Say(text) => {
                    if let Err(e) = self.say_tx.try_send(text) {
                        warn!("announcement dropped: {e}");
                    }
                }
                Effect::StartTimer {
                    kind,
                    generation,
                    context,
                    duration,
                } => self.timers.start(kind, generation, context, duration).await,
                Effect::CancelTimer(kind) => {
                    self.timers.cancel(kind).await;
                }
                Effect::Lookup { generation, request } => self.spawn_lookup(generation, request),
                Effect::CancelLookup => self.abort_lookup(),
                Effect::ScheduleReturnToIdle { token, delay } => {
                    if let Some(task) = self.idle_task.take() {
                        task.abort();
                    }
                    let tx = self.events_tx.clone();
                    self.idle_task = Some(tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(Event::ReturnToIdle { token }).await;
                    }));
                }
                Effect::PrizeConsumed { source, remaining } => {
                    info!(%source, remaining = remaining.len(), "configured prize list updated");
                }
                Effect::Ui(update) => self.present(update),
                Effect::Refuse { reason } => self.present(UiUpdate::Refused(reason)),
                Effect::ReconnectChat => self.chat.request_reconnect(),
                Effect::Shutdown => shutdown = true,
            }
        }
        shutdown
    }

    fn present(&self, update: UiUpdate) {
        if let Err(e) = self.ui_tx.try_send(update) {
            debug!("presentation update dropped: {e}");
        }
    }

    fn spawn_lookup(&mut self, generation: u64, request: LookupRequest) {
        self.abort_lookup();
        debug!(generation, ?request, "starting lookup");
        let lookup = self.lookup.clone();
        let timing = self.timing;
        let tx = self.events_tx.clone();
        self.lookup_task = Some(tokio::spawn(async move {
            let event = lookup.perform(generation, request, timing).await;
            let _ = tx.send(Event::Lookup(event)).await;
        }));
    }

    fn abort_lookup(&mut self) {
        if let Some(task) = self.lookup_task.take() {
            task.abort();
        }
    }

    /// Stop every background task. Queued announcements get `grace` to
    /// drain.
    pub async fn shutdown(mut self, grace: std::time::Duration) {
        self.timers.cancel_all().await;
        self.abort_lookup();
        if let Some(task) = self.idle_task.take() {
            task.abort();
        }
        drop(self.say_tx);
        if tokio::time::timeout(grace, &mut self.say_task).await.is_err() {
            warn!("announcements still pending at shutdown");
            self.say_task.abort();
        }
    }
}

async fn send_announcements(mut rx: mpsc::Receiver<String>, chat: Arc<dyn ChatSink>) {
    while let Some(text) = rx.recv().await {
        if !chat.send(&text).await {
            warn!("chat announcement not delivered: {text}");
        }
    }
}
