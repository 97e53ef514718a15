// Chat connection management: a pluggable primary feed with the IRC client
// as fallback.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Notify};
use tracing::{info, warn};

use giveaway_core::irc::IrcClient;
use giveaway_core::protocol::Event;

/// Where outbound chat announcements go.
#[async_trait]
pub trait ChatSink: Send + Sync {
    /// Send one line to chat. Failures are reported as `false`.
    async fn send(&self, text: &str) -> bool;

    /// Ask the connection owner to try connecting again.
    fn request_reconnect(&self) {}
}

/// A primary chat integration (e.g. a platform SDK). It must put incoming
/// chat lines on `tx` as `Event::Chat` and report `ChatStatus` itself.
#[async_trait]
pub trait PrimaryFeed: Send + Sync {
    /// Run until the feed stops. Returning, with or without an error, hands
    /// chat over to the IRC fallback.
    async fn run(&self, tx: mpsc::Sender<Event>) -> anyhow::Result<()>;

    async fn send(&self, text: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRoute {
    Offline,
    Primary,
    Fallback,
}

pub struct ChatSession {
    primary: Option<Arc<dyn PrimaryFeed>>,
    irc: IrcClient,
    route: watch::Sender<ChatRoute>,
    reconnect: Notify,
}

impl ChatSession {
    pub fn new(irc: IrcClient, primary: Option<Arc<dyn PrimaryFeed>>) -> Self {
        let (route, _) = watch::channel(ChatRoute::Offline);
        Self {
            primary,
            irc,
            route,
            reconnect: Notify::new(),
        }
    }

    pub fn route(&self) -> ChatRoute {
        *self.route.borrow()
    }

    /// Watch route changes.
    pub fn subscribe(&self) -> watch::Receiver<ChatRoute> {
        self.route.subscribe()
    }

    /// Connect, stay connected as long as possible, then wait for a
    /// reconnect request. Runs until the event queue closes.
    pub async fn supervise(self: Arc<Self>, tx: mpsc::Sender<Event>) {
        loop {
            if tx.send(Event::ChatConnecting).await.is_err() {
                return;
            }
            self.connect_once(&tx).await;
            self.route.send_replace(ChatRoute::Offline);
            if tx.is_closed() {
                return;
            }
            info!("chat offline; waiting for a reconnect request");
            self.reconnect.notified().await;
        }
    }

    async fn connect_once(&self, tx: &mpsc::Sender<Event>) {
        if let Some(primary) = &self.primary {
            self.route.send_replace(ChatRoute::Primary);
            match primary.run(tx.clone()).await {
                Ok(()) => info!("primary chat feed ended; switching to IRC"),
                Err(e) => warn!("primary chat feed failed, switching to IRC: {e:#}"),
            }
        }

        // The route must be in place before the client reports ready.
        self.route.send_replace(ChatRoute::Fallback);
        match self.irc.connect(tx.clone()).await {
            Ok(handle) => match handle.await {
                Ok(exit) => info!(?exit, "IRC read loop finished"),
                Err(e) => warn!("IRC read loop task failed: {e}"),
            },
            Err(e) => {
                warn!("chat fallback unavailable: {e}");
                self.route.send_replace(ChatRoute::Offline);
                let _ = tx.send(Event::ChatStatus { ready: false }).await;
            }
        }
    }

    /// Stop the IRC read loop. Used on shutdown.
    pub fn stop(&self) {
        self.irc.stop();
    }
}

#[async_trait]
impl ChatSink for ChatSession {
    async fn send(&self, text: &str) -> bool {
        let route = self.route();
        match (route, &self.primary) {
            (ChatRoute::Primary, Some(primary)) => primary.send(text).await,
            (ChatRoute::Fallback, _) => self.irc.send(text).await,
            _ => {
                warn!("chat is offline; dropping announcement");
                false
            }
        }
    }

    fn request_reconnect(&self) {
        self.reconnect.notify_one();
    }
}
