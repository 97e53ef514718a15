use std::fmt;

use crate::ledger::PrizeEntry;
use crate::protocol::{Profile, TimerKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GiveawayState {
    Starting,
    BotConnecting,
    BotDown,
    Idle,
    Collecting,
    AnimatingWinner,
    AwaitingConfirmation,
    AwaitingExternalResponse,
    FetchingProfileData,
    ConfirmedNoProfile,
    ConfirmedWithProfile,
    TimedOut,
    ExternalTimedOut,
    AwaitingPrizePollVotes,
}

impl GiveawayState {
    /// States a new draw may start from.
    pub fn is_resting(self) -> bool {
        matches!(
            self,
            GiveawayState::Idle
                | GiveawayState::TimedOut
                | GiveawayState::ExternalTimedOut
                | GiveawayState::ConfirmedNoProfile
                | GiveawayState::ConfirmedWithProfile
        )
    }

    /// States that only accept their own transitions, timer expiry, or
    /// abandon.
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            GiveawayState::AnimatingWinner
                | GiveawayState::AwaitingConfirmation
                | GiveawayState::AwaitingExternalResponse
                | GiveawayState::FetchingProfileData
                | GiveawayState::BotConnecting
                | GiveawayState::AwaitingPrizePollVotes
        )
    }

    /// The timer that runs for exactly as long as this state lasts.
    pub fn timer(self) -> Option<TimerKind> {
        match self {
            GiveawayState::AwaitingConfirmation => Some(TimerKind::Confirmation),
            GiveawayState::AwaitingExternalResponse => Some(TimerKind::ExternalResponse),
            GiveawayState::AwaitingPrizePollVotes => Some(TimerKind::Poll),
            GiveawayState::FetchingProfileData => Some(TimerKind::QuickWatchdog),
            _ => None,
        }
    }
}

impl fmt::Display for GiveawayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GiveawayState::Starting => "starting",
            GiveawayState::BotConnecting => "connecting to chat",
            GiveawayState::BotDown => "chat offline",
            GiveawayState::Idle => "idle",
            GiveawayState::Collecting => "collecting entries",
            GiveawayState::AnimatingWinner => "revealing winner",
            GiveawayState::AwaitingConfirmation => "awaiting winner confirmation",
            GiveawayState::AwaitingExternalResponse => "awaiting profile bot",
            GiveawayState::FetchingProfileData => "fetching profile",
            GiveawayState::ConfirmedNoProfile => "confirmed without profile",
            GiveawayState::ConfirmedWithProfile => "confirmed with profile",
            GiveawayState::TimedOut => "confirmation timed out",
            GiveawayState::ExternalTimedOut => "profile bot timed out",
            GiveawayState::AwaitingPrizePollVotes => "prize poll open",
        };
        f.write_str(s)
    }
}

/// The participant selected in the current cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Winner {
    pub username: String,
    /// Prize as it was when the winner was drawn.
    pub prize: Option<PrizeEntry>,
    pub profile: Option<Profile>,
    /// Set once the winner (or the profile bot) has answered the profile
    /// request, which rules out the automatic lookup.
    pub responded: bool,
}

impl Winner {
    pub fn is(&self, user: &str) -> bool {
        self.username.eq_ignore_ascii_case(user.trim_start_matches('@'))
    }
}
