// Giveaway orchestration state machine.
//
// `Orchestrator::transition` is the only code that changes orchestration
// state. It performs no I/O: each event updates state and yields the effects
// (announcements, timer starts and stops, lookups, presentation updates) for
// the dispatcher to carry out.

mod chat;
mod state;

pub use chat::{
    is_reply_about, mention_profile, parse_profile_command, profile_hint, quoted_profile_name,
    ProfileCommand, ProfileHint,
};
pub use state::{GiveawayState, Winner};

use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::config::{render, Config, DrawConfig, EntryConfig, MessagesConfig, PrizeMode, TimersConfig};
use crate::ledger::{parse_prize, start_poll, PollSession, PrizeEntry, PrizeList, PrizePool, VoteOutcome};
use crate::protocol::{
    ChatMessage, Effect, Event, LookupEvent, LookupRequest, OperatorCommand, Profile, TimerEvent,
    TimerKind, UiUpdate,
};

const NO_PRIZE_TEXT: &str = "a surprise prize";

/// Which lookup stage, if any, the state machine is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupStage {
    Resolving,
    Enriching,
}

pub struct Orchestrator {
    entry: EntryConfig,
    draw: DrawConfig,
    timers: TimersConfig,
    messages: MessagesConfig,
    auto_lookup: bool,
    external_bot: Option<String>,

    state: GiveawayState,
    chat_ready: bool,
    participants: Vec<String>,
    prize: Option<PrizeEntry>,
    pool: PrizePool,
    winner: Option<Winner>,
    poll: Option<PollSession>,

    /// Current generation per timer kind; events from older timers are stale.
    timer_generations: [u64; 4],
    lookup_generation: u64,
    lookup: Option<LookupStage>,
    /// QuickWatchdog is bounding an automatic name resolution.
    resolve_watchdog: bool,
    /// Bumped on every draw, abandon, and purge.
    cycle: u64,
    idle_token: u64,
    rng: StdRng,
}

impl Orchestrator {
    pub fn new(config: &Config, rng: StdRng) -> Self {
        Self {
            entry: config.entry.clone(),
            draw: config.draw.clone(),
            timers: config.timers.clone(),
            messages: config.messages.clone(),
            auto_lookup: config.lookup.auto_lookup,
            external_bot: config.chat.external_bot_name.clone(),
            state: GiveawayState::Starting,
            chat_ready: false,
            participants: Vec::new(),
            prize: None,
            pool: PrizePool::new(config.prizes.common.clone(), config.prizes.configured.clone()),
            winner: None,
            poll: None,
            timer_generations: [0; 4],
            lookup_generation: 0,
            lookup: None,
            resolve_watchdog: false,
            cycle: 0,
            idle_token: 0,
            rng,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn state(&self) -> GiveawayState {
        self.state
    }

    pub fn chat_ready(&self) -> bool {
        self.chat_ready
    }

    pub fn participants(&self) -> &[String] {
        &self.participants
    }

    pub fn prize(&self) -> Option<&PrizeEntry> {
        self.prize.as_ref()
    }

    pub fn pool(&self) -> &PrizePool {
        &self.pool
    }

    pub fn winner(&self) -> Option<&Winner> {
        self.winner.as_ref()
    }

    pub fn poll(&self) -> Option<&PollSession> {
        self.poll.as_ref()
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn timer_generation(&self, kind: TimerKind) -> u64 {
        self.timer_generations[kind.index()]
    }

    pub fn lookup_generation(&self) -> u64 {
        self.lookup_generation
    }

    pub fn lookup_stage(&self) -> Option<LookupStage> {
        self.lookup
    }

    /// Timers that should be running right now.
    pub fn live_timers(&self) -> Vec<TimerKind> {
        let mut kinds: Vec<TimerKind> = self.state.timer().into_iter().collect();
        if self.resolve_watchdog {
            kinds.push(TimerKind::QuickWatchdog);
        }
        kinds
    }

    // -----------------------------------------------------------------------
    // Transition
    // -----------------------------------------------------------------------

    /// Apply one event and return the effects it produces.
    pub fn transition(&mut self, event: Event) -> Vec<Effect> {
        let mut fx = Vec::new();
        match event {
            Event::Chat(msg) => self.on_chat(msg, &mut fx),
            Event::ChatConnecting => self.on_chat_connecting(&mut fx),
            Event::ChatStatus { ready } => self.on_chat_status(ready, &mut fx),
            Event::Timer(ev) => self.on_timer(ev, &mut fx),
            Event::Lookup(ev) => self.on_lookup(ev, &mut fx),
            Event::Command(cmd) => self.on_command(cmd, &mut fx),
            Event::ReturnToIdle { token } => self.on_return_to_idle(token, &mut fx),
        }
        fx
    }

    // -----------------------------------------------------------------------
    // State and timer bookkeeping
    // -----------------------------------------------------------------------

    /// Move to `next`, stopping the timer the old state owned and starting
    /// the one the new state owns.
    fn set_state(&mut self, next: GiveawayState, fx: &mut Vec<Effect>) {
        let prev = self.state;
        if prev == next {
            return;
        }

        if let Some(kind) = prev.timer() {
            self.stop_timer(kind, fx);
        }
        if self.resolve_watchdog {
            self.resolve_watchdog = false;
            self.stop_timer(TimerKind::QuickWatchdog, fx);
        }
        if matches!(
            prev,
            GiveawayState::ConfirmedNoProfile | GiveawayState::FetchingProfileData
        ) {
            self.cancel_lookup(fx);
        }

        self.state = next;
        info!(from = %prev, to = %next, "state changed");
        fx.push(Effect::Ui(UiUpdate::StateChanged { from: prev, to: next }));

        if let Some(kind) = next.timer() {
            let winner = self.winner_name().to_string();
            let (context, duration) = match kind {
                TimerKind::Confirmation => (winner, self.timers.confirmation()),
                TimerKind::ExternalResponse => (winner, self.timers.external_response()),
                TimerKind::Poll => ("poll".to_string(), self.timers.poll()),
                TimerKind::QuickWatchdog => (winner, self.timers.watchdog()),
            };
            self.start_timer(kind, context, duration, fx);
        }
    }

    /// Change state after everything has already been halted.
    fn force_state(&mut self, next: GiveawayState, fx: &mut Vec<Effect>) {
        let prev = self.state;
        self.state = next;
        if prev != next {
            info!(from = %prev, to = %next, "state forced");
            fx.push(Effect::Ui(UiUpdate::StateChanged { from: prev, to: next }));
        }
    }

    fn start_timer(&mut self, kind: TimerKind, context: String, duration: Duration, fx: &mut Vec<Effect>) {
        let generation = &mut self.timer_generations[kind.index()];
        *generation += 1;
        fx.push(Effect::StartTimer {
            kind,
            generation: *generation,
            context,
            duration,
        });
    }

    fn stop_timer(&mut self, kind: TimerKind, fx: &mut Vec<Effect>) {
        self.timer_generations[kind.index()] += 1;
        fx.push(Effect::CancelTimer(kind));
        if kind == TimerKind::Confirmation {
            fx.push(Effect::Ui(UiUpdate::StopWarnings));
        }
    }

    fn cancel_lookup(&mut self, fx: &mut Vec<Effect>) {
        if self.lookup.take().is_some() {
            self.lookup_generation += 1;
            fx.push(Effect::CancelLookup);
        }
    }

    /// Stop every timer and the in-flight lookup.
    fn halt_everything(&mut self, fx: &mut Vec<Effect>) {
        for kind in TimerKind::ALL {
            self.stop_timer(kind, fx);
        }
        self.resolve_watchdog = false;
        self.cancel_lookup(fx);
    }

    fn schedule_idle(&mut self, fx: &mut Vec<Effect>) {
        self.idle_token += 1;
        fx.push(Effect::ScheduleReturnToIdle {
            token: self.idle_token,
            delay: self.timers.display_delay(),
        });
    }

    // -----------------------------------------------------------------------
    // Small helpers
    // -----------------------------------------------------------------------

    fn winner_name(&self) -> &str {
        self.winner.as_ref().map(|w| w.username.as_str()).unwrap_or_default()
    }

    fn is_participant(&self, user: &str) -> bool {
        self.participants.iter().any(|p| p.eq_ignore_ascii_case(user))
    }

    fn remove_participant(&mut self, user: &str, fx: &mut Vec<Effect>) {
        let before = self.participants.len();
        self.participants.retain(|p| !p.eq_ignore_ascii_case(user));
        if self.participants.len() != before {
            debug!(user, "participant removed");
            fx.push(Effect::Ui(UiUpdate::ParticipantCount(self.participants.len())));
        }
    }

    fn set_prize(&mut self, prize: Option<PrizeEntry>, fx: &mut Vec<Effect>) {
        let display = prize.as_ref().map(|p| p.display.clone());
        self.prize = prize;
        fx.push(Effect::Ui(UiUpdate::PrizeChanged(display)));
    }

    /// Render a chat template. `extra` values win over the defaults
    /// (`winner`, `prize`, `command`).
    fn announce(&self, template: &str, extra: &[(&str, &str)], fx: &mut Vec<Effect>) {
        let prize = self
            .winner
            .as_ref()
            .and_then(|w| w.prize.as_ref())
            .or(self.prize.as_ref())
            .map(|p| p.display.as_str())
            .unwrap_or(NO_PRIZE_TEXT);
        let mut vars = extra.to_vec();
        vars.extend([
            ("winner", self.winner_name()),
            ("prize", prize),
            ("command", self.draw.profile_command.as_str()),
        ]);
        fx.push(Effect::Say(render(template, &vars)));
    }

    fn refuse(&self, reason: impl Into<String>, fx: &mut Vec<Effect>) {
        let reason = reason.into();
        warn!("command refused: {reason}");
        fx.push(Effect::Refuse { reason });
    }

    // -----------------------------------------------------------------------
    // Chat connection
    // -----------------------------------------------------------------------

    fn on_chat_connecting(&mut self, fx: &mut Vec<Effect>) {
        if matches!(self.state, GiveawayState::Starting | GiveawayState::BotDown) {
            self.set_state(GiveawayState::BotConnecting, fx);
        }
    }

    fn on_chat_status(&mut self, ready: bool, fx: &mut Vec<Effect>) {
        self.chat_ready = ready;
        match (self.state, ready) {
            (
                GiveawayState::Starting | GiveawayState::BotConnecting | GiveawayState::BotDown,
                true,
            ) => self.set_state(GiveawayState::Idle, fx),
            (GiveawayState::Starting | GiveawayState::BotConnecting, false) => {
                self.set_state(GiveawayState::BotDown, fx)
            }
            (state, false) if state.is_resting() => self.set_state(GiveawayState::BotDown, fx),
            (state, ready) => debug!(%state, ready, "chat status recorded"),
        }
    }

    // -----------------------------------------------------------------------
    // Chat messages
    // -----------------------------------------------------------------------

    fn on_chat(&mut self, msg: ChatMessage, fx: &mut Vec<Effect>) {
        match self.state {
            GiveawayState::Collecting => self.try_enter(&msg, fx),
            GiveawayState::AwaitingConfirmation => self.on_winner_reply(&msg, fx),
            GiveawayState::AwaitingExternalResponse | GiveawayState::ConfirmedNoProfile => {
                self.on_profile_chat(&msg, fx)
            }
            GiveawayState::AwaitingPrizePollVotes => self.on_vote(&msg),
            _ => {}
        }
    }

    fn try_enter(&mut self, msg: &ChatMessage, fx: &mut Vec<Effect>) {
        if !self.entry.qualifies(&msg.text) || self.is_participant(&msg.user) {
            return;
        }
        self.participants.push(msg.user.clone());
        debug!(user = %msg.user, count = self.participants.len(), "participant entered");
        fx.push(Effect::Ui(UiUpdate::ParticipantJoined(msg.user.clone())));
        fx.push(Effect::Ui(UiUpdate::ParticipantCount(self.participants.len())));
    }

    fn on_winner_reply(&mut self, msg: &ChatMessage, fx: &mut Vec<Effect>) {
        if !self.winner.as_ref().is_some_and(|w| w.is(&msg.user)) {
            return;
        }
        info!(winner = %msg.user, "winner confirmed");
        self.confirm_winner(fx);

        match parse_profile_command(&msg.text, &self.draw.profile_command) {
            Some(ProfileCommand::Inline(name)) => {
                self.announce(&self.messages.confirmed, &[], fx);
                self.begin_fetch(name, fx);
            }
            Some(ProfileCommand::Bare) => {
                if let Some(w) = self.winner.as_mut() {
                    w.responded = true;
                }
                self.announce(&self.messages.confirmed, &[], fx);
                self.set_state(GiveawayState::AwaitingExternalResponse, fx);
            }
            None => {
                self.set_state(GiveawayState::ConfirmedNoProfile, fx);
                let responded = self.winner.as_ref().is_some_and(|w| w.responded);
                if self.auto_lookup && !responded {
                    self.announce(&self.messages.auto_lookup_attempt, &[], fx);
                    self.start_resolution(fx);
                } else {
                    self.announce(&self.messages.awaiting_profile, &[], fx);
                }
            }
        }
    }

    fn on_profile_chat(&mut self, msg: &ChatMessage, fx: &mut Vec<Effect>) {
        let Some(winner) = self.winner.as_ref() else {
            return;
        };
        let hint = profile_hint(
            &msg.text,
            &msg.user,
            &winner.username,
            self.external_bot.as_deref(),
            &self.draw.profile_command,
        );
        match (self.state, hint) {
            (_, Some(ProfileHint::Name(name))) => self.begin_fetch(name, fx),
            (GiveawayState::AwaitingExternalResponse, Some(ProfileHint::BotHasNone)) => {
                info!("profile bot has no name on record for the winner");
                self.set_state(GiveawayState::ConfirmedNoProfile, fx);
                self.announce(&self.messages.lookup_failed, &[], fx);
            }
            (GiveawayState::ConfirmedNoProfile, Some(ProfileHint::Bare)) => {
                if let Some(w) = self.winner.as_mut() {
                    w.responded = true;
                }
                self.set_state(GiveawayState::AwaitingExternalResponse, fx);
            }
            _ => {}
        }
    }

    fn on_vote(&mut self, msg: &ChatMessage) {
        let Some(poll) = self.poll.as_mut() else {
            return;
        };
        match poll.vote(&msg.user, &msg.text) {
            VoteOutcome::Counted { label } => debug!(user = %msg.user, label, "vote counted"),
            VoteOutcome::AlreadyVoted => debug!(user = %msg.user, "repeat vote ignored"),
            VoteOutcome::NotAVote => {}
        }
    }

    // -----------------------------------------------------------------------
    // Confirmation and lookups
    // -----------------------------------------------------------------------

    /// The winner has spoken: remove them (single-draw mode) and use up the
    /// prize they won.
    fn confirm_winner(&mut self, fx: &mut Vec<Effect>) {
        let Some(winner) = self.winner.clone() else {
            return;
        };
        if !self.draw.multi_draw {
            self.remove_participant(&winner.username, fx);
        }

        let Some(won) = winner.prize else {
            return;
        };
        if won.list != PrizeList::Configured || !self.pool.consume(&won.source) {
            return;
        }
        info!(prize = %won.source, "prize consumed");
        fx.push(Effect::PrizeConsumed {
            source: won.source.clone(),
            remaining: self.pool.configured().to_vec(),
        });
        fx.push(Effect::Ui(UiUpdate::PrizeListChanged(self.pool.configured().to_vec())));

        if self.prize.as_ref() == Some(&won) {
            let leftover = self
                .pool
                .configured()
                .iter()
                .find(|s| parse_prize(s).display_key() == won.display)
                .map(|s| self.pool.entry_for(s));
            self.set_prize(leftover, fx);
        }
    }

    fn start_resolution(&mut self, fx: &mut Vec<Effect>) {
        let username = self.winner_name().to_string();
        self.cancel_lookup(fx);
        self.lookup_generation += 1;
        self.lookup = Some(LookupStage::Resolving);
        fx.push(Effect::Lookup {
            generation: self.lookup_generation,
            request: LookupRequest::Resolve {
                username: username.clone(),
            },
        });
        self.start_timer(TimerKind::QuickWatchdog, username, self.timers.lookup_timeout(), fx);
        self.resolve_watchdog = true;
    }

    fn stop_resolution(&mut self, fx: &mut Vec<Effect>) {
        self.lookup = None;
        if self.resolve_watchdog {
            self.resolve_watchdog = false;
            self.stop_timer(TimerKind::QuickWatchdog, fx);
        }
    }

    fn begin_fetch(&mut self, name: String, fx: &mut Vec<Effect>) {
        if let Some(w) = self.winner.as_mut() {
            w.responded = true;
        }
        self.set_state(GiveawayState::FetchingProfileData, fx);
        self.cancel_lookup(fx);
        self.lookup_generation += 1;
        self.lookup = Some(LookupStage::Enriching);
        info!(%name, generation = self.lookup_generation, "fetching profile");
        fx.push(Effect::Lookup {
            generation: self.lookup_generation,
            request: LookupRequest::Enrich { name },
        });
    }

    fn on_lookup(&mut self, ev: LookupEvent, fx: &mut Vec<Effect>) {
        if ev.generation() != self.lookup_generation || self.lookup.is_none() {
            debug!(
                "Discarding stale lookup event (event gen: {}, current gen: {})",
                ev.generation(),
                self.lookup_generation
            );
            return;
        }

        match (self.lookup, ev) {
            (Some(LookupStage::Resolving), LookupEvent::Resolved { name, .. }) => {
                self.stop_resolution(fx);
                info!(%name, "winner resolved automatically");
                self.begin_fetch(name, fx);
            }
            (Some(LookupStage::Resolving), LookupEvent::NotFound { username, .. }) => {
                self.stop_resolution(fx);
                info!(%username, "no profile registered for winner");
                self.announce(&self.messages.lookup_failed, &[], fx);
            }
            (Some(LookupStage::Resolving), LookupEvent::ResolveFailed { reason, .. }) => {
                self.stop_resolution(fx);
                warn!("automatic lookup failed: {reason}");
                fx.push(Effect::Ui(UiUpdate::Notice(format!("automatic lookup failed: {reason}"))));
                self.announce(&self.messages.awaiting_profile, &[], fx);
            }
            (Some(LookupStage::Enriching), LookupEvent::ProfileReady { profile, .. }) => {
                self.lookup = None;
                self.show_profile(profile, fx);
            }
            (Some(LookupStage::Enriching), LookupEvent::ProfileFailed { reason, .. }) => {
                self.lookup = None;
                warn!("profile lookup failed: {reason}");
                fx.push(Effect::Ui(UiUpdate::Notice(format!("profile lookup failed: {reason}"))));
                self.set_state(GiveawayState::ConfirmedNoProfile, fx);
                self.announce(&self.messages.lookup_failed, &[], fx);
                self.schedule_idle(fx);
            }
            (stage, ev) => debug!(?stage, ?ev, "lookup event does not match the pending request"),
        }
    }

    fn show_profile(&mut self, profile: Profile, fx: &mut Vec<Effect>) {
        info!(name = %profile.name, "profile verified");
        if let Some(w) = self.winner.as_mut() {
            w.profile = Some(profile.clone());
        }
        self.set_state(GiveawayState::ConfirmedWithProfile, fx);
        self.announce(&self.messages.profile_found, &[("ign", profile.name.as_str())], fx);
        fx.push(Effect::Ui(UiUpdate::ProfileShown(profile)));
        self.schedule_idle(fx);
    }

    fn on_return_to_idle(&mut self, token: u64, fx: &mut Vec<Effect>) {
        let confirmed = matches!(
            self.state,
            GiveawayState::ConfirmedWithProfile | GiveawayState::ConfirmedNoProfile
        );
        if token != self.idle_token || !confirmed {
            debug!(token, state = %self.state, "ignoring stale return to idle");
            return;
        }
        self.winner = None;
        self.set_state(GiveawayState::Idle, fx);
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    fn on_timer(&mut self, ev: TimerEvent, fx: &mut Vec<Effect>) {
        let kind = ev.kind();
        let current = self.timer_generations[kind.index()];
        if ev.generation() != current {
            debug!(
                ?kind,
                "Discarding stale timer event (event gen: {}, current gen: {})",
                ev.generation(),
                current
            );
            return;
        }

        match ev {
            TimerEvent::Progress {
                kind,
                remaining,
                total,
                ..
            } => fx.push(Effect::Ui(UiUpdate::Countdown {
                kind,
                remaining,
                total,
            })),
            TimerEvent::Threshold { percent, .. } => {
                fx.push(Effect::Ui(UiUpdate::Warning { percent }))
            }
            TimerEvent::Cancelled { .. } => {}
            TimerEvent::Expired { kind, context, .. } => self.on_expired(kind, &context, fx),
        }
    }

    fn on_expired(&mut self, kind: TimerKind, context: &str, fx: &mut Vec<Effect>) {
        match (kind, self.state) {
            (TimerKind::Confirmation, GiveawayState::AwaitingConfirmation) => {
                let Some(winner) = self.winner.clone() else {
                    return;
                };
                if !winner.is(context) {
                    debug!(context, "confirmation expiry for a different winner");
                    return;
                }
                info!(winner = %winner.username, "winner did not confirm in time");
                self.remove_participant(&winner.username, fx);
                self.announce(&self.messages.confirmation_timeout, &[], fx);
                self.set_state(GiveawayState::TimedOut, fx);
            }
            (TimerKind::ExternalResponse, GiveawayState::AwaitingExternalResponse) => {
                info!("profile bot did not answer in time");
                self.announce(&self.messages.external_timeout, &[], fx);
                self.set_state(GiveawayState::ExternalTimedOut, fx);
            }
            (TimerKind::Poll, GiveawayState::AwaitingPrizePollVotes) => self.finish_poll(fx),
            (TimerKind::QuickWatchdog, GiveawayState::FetchingProfileData) => {
                warn!("profile lookup timed out");
                fx.push(Effect::Ui(UiUpdate::Notice("profile lookup timed out".into())));
                self.set_state(GiveawayState::ConfirmedNoProfile, fx);
                self.announce(&self.messages.awaiting_profile, &[], fx);
                self.schedule_idle(fx);
            }
            (TimerKind::QuickWatchdog, GiveawayState::ConfirmedNoProfile) if self.resolve_watchdog => {
                warn!("automatic lookup timed out");
                self.resolve_watchdog = false;
                self.cancel_lookup(fx);
                fx.push(Effect::Ui(UiUpdate::Notice("automatic lookup timed out".into())));
                self.announce(&self.messages.awaiting_profile, &[], fx);
            }
            (kind, state) => debug!(?kind, %state, "ignoring timer expiry"),
        }
    }

    fn finish_poll(&mut self, fx: &mut Vec<Effect>) {
        let Some(poll) = self.poll.take() else {
            self.set_state(GiveawayState::Idle, fx);
            return;
        };
        let chosen = poll
            .tally(&mut self.rng)
            .and_then(|i| self.pool.configured().get(i).cloned());
        info!(votes = poll.total_votes(), chosen = ?chosen, "prize poll closed");

        match chosen {
            Some(source) => {
                let entry = self.pool.entry_for(&source);
                let display = entry.display.clone();
                self.set_prize(Some(entry), fx);
                self.announce(&self.messages.poll_result, &[("prize", display.as_str())], fx);
                fx.push(Effect::Ui(UiUpdate::PollResult(Some(display))));
            }
            None => {
                self.set_prize(None, fx);
                self.announce(&self.messages.poll_no_result, &[], fx);
                fx.push(Effect::Ui(UiUpdate::PollResult(None)));
            }
        }
        self.set_state(GiveawayState::Idle, fx);
    }

    // -----------------------------------------------------------------------
    // Operator commands
    // -----------------------------------------------------------------------

    fn on_command(&mut self, cmd: OperatorCommand, fx: &mut Vec<Effect>) {
        info!(?cmd, state = %self.state, "operator command");
        match cmd {
            OperatorCommand::OpenDraw => self.open_draw(fx),
            OperatorCommand::CloseDraw => self.close_draw(fx),
            OperatorCommand::DrawWinner => self.draw_winner(fx),
            OperatorCommand::Abandon => self.abandon(fx),
            OperatorCommand::Purge => self.purge(fx),
            OperatorCommand::RemoveParticipants(names) => self.remove_participants(&names, fx),
            OperatorCommand::SetPrize(text) => self.set_prize_text(&text, fx),
            OperatorCommand::ClearPrize => self.clear_prize(fx),
            OperatorCommand::PickRandomPrize => self.pick_random_prize(fx),
            OperatorCommand::StartPoll => self.open_poll(fx),
            OperatorCommand::ReconnectChat => self.reconnect(fx),
            OperatorCommand::RevealFinished { winner } => self.reveal_finished(&winner, fx),
            OperatorCommand::Shutdown => {
                self.halt_everything(fx);
                fx.push(Effect::Shutdown);
            }
        }
    }

    fn open_draw(&mut self, fx: &mut Vec<Effect>) {
        if !self.state.is_resting() {
            return self.refuse(format!("cannot open a draw while {}", self.state), fx);
        }
        if !self.chat_ready {
            return self.refuse("chat is not connected", fx);
        }
        self.winner = None;
        self.set_state(GiveawayState::Collecting, fx);

        let requirement = match self.entry.required_command() {
            Some(cmd) => format!("Type '{cmd}'"),
            None => "Type anything".to_string(),
        };
        self.announce(&self.messages.draw_opened, &[("requirement", requirement.as_str())], fx);
    }

    fn close_draw(&mut self, fx: &mut Vec<Effect>) {
        if self.state != GiveawayState::Collecting {
            return self.refuse("no draw is open", fx);
        }
        self.announce(&self.messages.draw_closed, &[], fx);
        self.set_state(GiveawayState::Idle, fx);
    }

    fn draw_winner(&mut self, fx: &mut Vec<Effect>) {
        let collecting = self.state == GiveawayState::Collecting;
        if !(self.state.is_resting() || collecting) {
            return self.refuse(format!("cannot draw while {}", self.state), fx);
        }
        if !self.chat_ready {
            return self.refuse("chat is not connected", fx);
        }
        if self.participants.is_empty() {
            return self.refuse("there are no participants", fx);
        }
        if self.prize.is_none() {
            if self.draw.prize_mode.requires_prize() {
                return self.refuse("set a prize before drawing", fx);
            }
            if let Some(entry) = self.pool.pick_random(&mut self.rng) {
                self.set_prize(Some(entry), fx);
            }
        }

        if collecting {
            self.announce(&self.messages.draw_closed, &[], fx);
        }
        let Some(username) = self.participants.choose(&mut self.rng).cloned() else {
            return;
        };
        self.cycle += 1;
        info!(winner = %username, cycle = self.cycle, "winner drawn");
        self.winner = Some(Winner {
            username: username.clone(),
            prize: self.prize.clone(),
            profile: None,
            responded: false,
        });
        self.set_state(GiveawayState::AnimatingWinner, fx);
        fx.push(Effect::Ui(UiUpdate::RevealWinner {
            winner: username,
            prize: self.prize.as_ref().map(|p| p.display.clone()),
        }));
    }

    fn reveal_finished(&mut self, name: &str, fx: &mut Vec<Effect>) {
        if self.state != GiveawayState::AnimatingWinner {
            debug!(name, "reveal finished outside of a reveal");
            return;
        }
        if !self.winner.as_ref().is_some_and(|w| w.is(name)) {
            warn!(name, winner = self.winner_name(), "reveal finished for the wrong winner");
            self.winner = None;
            self.set_state(GiveawayState::Idle, fx);
            return;
        }
        self.set_state(GiveawayState::AwaitingConfirmation, fx);
        let timeout = self.timers.confirmation_secs.to_string();
        self.announce(&self.messages.confirmation_needed, &[("timeout", timeout.as_str())], fx);
    }

    fn abandon(&mut self, fx: &mut Vec<Effect>) {
        let collecting = self.state == GiveawayState::Collecting;
        let pending_lookup = self.lookup.is_some() || self.resolve_watchdog;
        if !(self.state.is_busy() || collecting || pending_lookup) {
            return self.refuse("nothing to abandon", fx);
        }

        self.halt_everything(fx);
        if collecting {
            self.announce(&self.messages.draw_abandoned, &[], fx);
        }
        self.winner = None;
        self.poll = None;
        self.cycle += 1;
        fx.push(Effect::Ui(UiUpdate::Notice("giveaway abandoned".into())));
        let next = if self.chat_ready {
            GiveawayState::Idle
        } else {
            GiveawayState::BotDown
        };
        self.force_state(next, fx);
    }

    fn purge(&mut self, fx: &mut Vec<Effect>) {
        let collecting = self.state == GiveawayState::Collecting;
        let in_cycle = (self.state.is_busy() && self.state != GiveawayState::BotConnecting)
            || collecting
            || self.lookup.is_some()
            || self.resolve_watchdog;
        if in_cycle {
            self.halt_everything(fx);
            if collecting {
                self.announce(&self.messages.draw_abandoned, &[], fx);
            }
            let next = if self.chat_ready {
                GiveawayState::Idle
            } else {
                GiveawayState::BotDown
            };
            self.force_state(next, fx);
        }
        self.participants.clear();
        self.winner = None;
        self.poll = None;
        self.cycle += 1;
        fx.push(Effect::Ui(UiUpdate::ParticipantCount(0)));
        fx.push(Effect::Ui(UiUpdate::Notice("participants purged".into())));
    }

    fn remove_participants(&mut self, names: &[String], fx: &mut Vec<Effect>) {
        if self.state.is_busy() && self.state != GiveawayState::AwaitingPrizePollVotes {
            return self.refuse(format!("cannot remove participants while {}", self.state), fx);
        }
        for name in names {
            self.remove_participant(name.trim_start_matches('@'), fx);
        }
    }

    fn prize_locked(&self) -> bool {
        self.state.is_busy() && self.state != GiveawayState::BotConnecting
    }

    fn set_prize_text(&mut self, text: &str, fx: &mut Vec<Effect>) {
        if self.prize_locked() {
            return self.refuse(format!("cannot change the prize while {}", self.state), fx);
        }
        if text.trim().is_empty() {
            return self.refuse("prize text is empty", fx);
        }
        let entry = self.pool.entry_for(text);
        self.set_prize(Some(entry), fx);
    }

    fn clear_prize(&mut self, fx: &mut Vec<Effect>) {
        if self.prize_locked() {
            return self.refuse(format!("cannot change the prize while {}", self.state), fx);
        }
        self.set_prize(None, fx);
    }

    fn pick_random_prize(&mut self, fx: &mut Vec<Effect>) {
        if self.prize_locked() {
            return self.refuse(format!("cannot change the prize while {}", self.state), fx);
        }
        match self.pool.pick_random(&mut self.rng) {
            Some(entry) => self.set_prize(Some(entry), fx),
            None => self.refuse("the prize lists are empty", fx),
        }
    }

    fn open_poll(&mut self, fx: &mut Vec<Effect>) {
        if self.draw.prize_mode != PrizeMode::Poll {
            return self.refuse("prize polls need the poll prize mode", fx);
        }
        if self.state != GiveawayState::Idle {
            return self.refuse(format!("cannot start a poll while {}", self.state), fx);
        }
        let Some(mut poll) = start_poll(self.pool.configured(), &mut self.rng) else {
            return self.refuse("there are no configured prizes to poll", fx);
        };
        poll.deadline = chrono::Duration::from_std(self.timers.poll())
            .ok()
            .map(|d| Utc::now() + d);

        let options: Vec<(u8, String)> = poll
            .options()
            .iter()
            .map(|o| (o.label, o.display.clone()))
            .collect();
        self.poll = Some(poll);
        self.set_state(GiveawayState::AwaitingPrizePollVotes, fx);

        let listing = options
            .iter()
            .map(|(label, display)| format!("[{label}] {display}"))
            .collect::<Vec<_>>()
            .join(" | ");
        let timeout = self.timers.poll_secs.to_string();
        self.announce(
            &self.messages.poll_opened,
            &[("options", listing.as_str()), ("timeout", timeout.as_str())],
            fx,
        );
        fx.push(Effect::Ui(UiUpdate::PollOpened(options)));
    }

    fn reconnect(&mut self, fx: &mut Vec<Effect>) {
        if self.chat_ready {
            return self.refuse("chat is already connected", fx);
        }
        if matches!(self.state, GiveawayState::Starting | GiveawayState::BotDown) {
            self.set_state(GiveawayState::BotConnecting, fx);
        }
        fx.push(Effect::ReconnectChat);
    }
}
