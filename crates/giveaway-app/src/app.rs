// The event pump: sole owner of the orchestration state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::MissedTickBehavior;
use tracing::info;

use giveaway_core::config::Config;
use giveaway_core::machine::Orchestrator;
use giveaway_core::protocol::{Event, UiUpdate};
use giveaway_lookup::{LookupClient, LookupTiming};

use crate::chat::ChatSink;
use crate::dispatch::Dispatcher;

/// How long queued announcements may take to flush on shutdown.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Everything the pump needs besides the state machine itself.
pub struct OrchestrationContext {
    pub config: Config,
    /// Sender side of the pump's own queue, for timers and lookup workers.
    pub events_tx: mpsc::Sender<Event>,
    pub ui_tx: mpsc::Sender<UiUpdate>,
    pub chat: Arc<dyn ChatSink>,
    pub lookup: LookupClient,
}

/// Run the event pump until shutdown is requested.
///
/// Every tick drains the queue, feeding each event to the state machine in
/// arrival order and dispatching the resulting effects before the next
/// event is taken. Returns the final state machine.
pub async fn run(
    mut rx: mpsc::Receiver<Event>,
    ctx: OrchestrationContext,
    mut machine: Orchestrator,
) -> anyhow::Result<Orchestrator> {
    info!(state = %machine.state(), "event pump started");

    let timing = LookupTiming::from_config(&ctx.config);
    let mut dispatcher = Dispatcher::new(ctx.events_tx, ctx.ui_tx, ctx.chat, ctx.lookup, timing);
    let mut tick = tokio::time::interval(ctx.config.timers.pump_tick());
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    'pump: loop {
        tick.tick().await;
        loop {
            match rx.try_recv() {
                Ok(event) => {
                    let effects = machine.transition(event);
                    if dispatcher.apply(effects).await {
                        info!("shutdown requested");
                        break 'pump;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    info!("event queue closed, shutting down");
                    break 'pump;
                }
            }
        }
    }

    dispatcher.shutdown(SHUTDOWN_GRACE).await;
    info!(state = %machine.state(), "event pump exiting");
    Ok(machine)
}
