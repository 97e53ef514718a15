// Message types shared between the event pump and everything that feeds it.
//
// Every producer (timer tasks, the chat read loop, lookup workers, the
// operator console) sends `Event`s onto one bounded queue. The state machine
// answers each event with a list of `Effect`s for the dispatcher to carry out.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::machine::GiveawayState;

// ---------------------------------------------------------------------------
// Timers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Winner must speak in chat before this runs out.
    Confirmation,
    /// Waiting on the external profile bot to answer.
    ExternalResponse,
    /// Prize poll voting window.
    Poll,
    /// Short watchdog bounding a profile lookup.
    QuickWatchdog,
}

impl TimerKind {
    pub const ALL: [TimerKind; 4] = [
        TimerKind::Confirmation,
        TimerKind::ExternalResponse,
        TimerKind::Poll,
        TimerKind::QuickWatchdog,
    ];

    /// How often the timer task wakes to report progress.
    pub fn resolution(self) -> Duration {
        match self {
            TimerKind::Poll => Duration::from_secs(1),
            _ => Duration::from_millis(100),
        }
    }

    /// Elapsed percentages at which a one-shot `Threshold` fires.
    pub fn thresholds(self) -> &'static [u8] {
        match self {
            TimerKind::Confirmation => &[15, 50, 75],
            _ => &[],
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            TimerKind::Confirmation => 0,
            TimerKind::ExternalResponse => 1,
            TimerKind::Poll => 2,
            TimerKind::QuickWatchdog => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    Progress {
        kind: TimerKind,
        generation: u64,
        remaining: Duration,
        total: Duration,
    },
    Threshold {
        kind: TimerKind,
        generation: u64,
        percent: u8,
    },
    Expired {
        kind: TimerKind,
        generation: u64,
        context: String,
    },
    Cancelled {
        kind: TimerKind,
        generation: u64,
    },
}

impl TimerEvent {
    pub fn kind(&self) -> TimerKind {
        match self {
            TimerEvent::Progress { kind, .. }
            | TimerEvent::Threshold { kind, .. }
            | TimerEvent::Expired { kind, .. }
            | TimerEvent::Cancelled { kind, .. } => *kind,
        }
    }

    pub fn generation(&self) -> u64 {
        match self {
            TimerEvent::Progress { generation, .. }
            | TimerEvent::Threshold { generation, .. }
            | TimerEvent::Expired { generation, .. }
            | TimerEvent::Cancelled { generation, .. } => *generation,
        }
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// One chat line, identical whether it came from the primary feed or the
/// IRC fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub user: String,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(user: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            text: text.into(),
            received_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Profile lookup
// ---------------------------------------------------------------------------

/// Enriched in-game profile of a winner.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Profile {
    pub name: String,
    pub character_id: Option<u64>,
    pub corporation: Option<String>,
    pub alliance: Option<String>,
    pub portrait_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupRequest {
    /// Resolve a chat username to an in-game name.
    Resolve { username: String },
    /// Fetch the full profile for an in-game name.
    Enrich { name: String },
}

/// Terminal result of a lookup worker. Each request yields exactly one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupEvent {
    Resolved {
        generation: u64,
        username: String,
        name: String,
    },
    NotFound {
        generation: u64,
        username: String,
    },
    ResolveFailed {
        generation: u64,
        reason: String,
    },
    ProfileReady {
        generation: u64,
        profile: Profile,
    },
    ProfileFailed {
        generation: u64,
        reason: String,
    },
}

impl LookupEvent {
    pub fn generation(&self) -> u64 {
        match self {
            LookupEvent::Resolved { generation, .. }
            | LookupEvent::NotFound { generation, .. }
            | LookupEvent::ResolveFailed { generation, .. }
            | LookupEvent::ProfileReady { generation, .. }
            | LookupEvent::ProfileFailed { generation, .. } => *generation,
        }
    }
}

// ---------------------------------------------------------------------------
// Operator commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    OpenDraw,
    CloseDraw,
    DrawWinner,
    Abandon,
    Purge,
    RemoveParticipants(Vec<String>),
    SetPrize(String),
    ClearPrize,
    PickRandomPrize,
    StartPoll,
    ReconnectChat,
    /// Presentation finished revealing this winner.
    RevealFinished { winner: String },
    Shutdown,
}

// ---------------------------------------------------------------------------
// Events (into the pump)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Chat(ChatMessage),
    /// A chat connection attempt has started.
    ChatConnecting,
    ChatStatus { ready: bool },
    Timer(TimerEvent),
    Lookup(LookupEvent),
    Command(OperatorCommand),
    /// Delayed return to idle after a confirmed result was displayed.
    ReturnToIdle { token: u64 },
}

// ---------------------------------------------------------------------------
// Effects (out of the state machine)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Best-effort chat announcement.
    Say(String),
    StartTimer {
        kind: TimerKind,
        generation: u64,
        context: String,
        duration: Duration,
    },
    CancelTimer(TimerKind),
    Lookup {
        generation: u64,
        request: LookupRequest,
    },
    CancelLookup,
    /// Send `Event::ReturnToIdle { token }` after `delay`.
    ScheduleReturnToIdle { token: u64, delay: Duration },
    /// The configured prize list changed after a win.
    PrizeConsumed { source: String, remaining: Vec<String> },
    Ui(UiUpdate),
    /// An operator command was not allowed in the current state.
    Refuse { reason: String },
    ReconnectChat,
    Shutdown,
}

// ---------------------------------------------------------------------------
// Presentation updates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiUpdate {
    StateChanged {
        from: GiveawayState,
        to: GiveawayState,
    },
    ParticipantJoined(String),
    ParticipantCount(usize),
    PrizeChanged(Option<String>),
    PrizeListChanged(Vec<String>),
    RevealWinner {
        winner: String,
        prize: Option<String>,
    },
    Countdown {
        kind: TimerKind,
        remaining: Duration,
        total: Duration,
    },
    /// Confirmation countdown crossed an escalation threshold.
    Warning { percent: u8 },
    StopWarnings,
    PollOpened(Vec<(u8, String)>),
    PollResult(Option<String>),
    ProfileShown(Profile),
    Refused(String),
    Notice(String),
}
