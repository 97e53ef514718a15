// Line-oriented operator console: stdin commands in, presentation updates
// out as text.

use std::time::Duration;

use anyhow::bail;

use giveaway_core::protocol::{OperatorCommand, TimerKind, UiUpdate};

pub const HELP: &str = "\
commands:
  open                 open a draw
  close                close the open draw
  draw                 draw a winner
  abandon              cancel whatever is running
  purge                clear all participants
  remove <names..>     remove participants
  prize <text>         set the prize
  clear-prize          clear the prize
  random-prize         pick a random prize from the lists
  poll                 start a prize poll
  reconnect            reconnect to chat
  quit                 shut down";

/// Parse one console line. Blank lines and `help` yield `None`.
pub fn parse_command(line: &str) -> anyhow::Result<Option<OperatorCommand>> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let cmd = match word.to_ascii_lowercase().as_str() {
        "" | "help" | "?" => return Ok(None),
        "open" => OperatorCommand::OpenDraw,
        "close" => OperatorCommand::CloseDraw,
        "draw" => OperatorCommand::DrawWinner,
        "abandon" => OperatorCommand::Abandon,
        "purge" => OperatorCommand::Purge,
        "remove" => {
            let names: Vec<String> = rest
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect();
            if names.is_empty() {
                bail!("usage: remove <names..>");
            }
            OperatorCommand::RemoveParticipants(names)
        }
        "prize" => {
            if rest.is_empty() {
                bail!("usage: prize <text>");
            }
            OperatorCommand::SetPrize(rest.to_string())
        }
        "clear-prize" => OperatorCommand::ClearPrize,
        "random-prize" => OperatorCommand::PickRandomPrize,
        "poll" => OperatorCommand::StartPoll,
        "reconnect" => OperatorCommand::ReconnectChat,
        "quit" | "exit" => OperatorCommand::Shutdown,
        other => bail!("unknown command '{other}' (try 'help')"),
    };
    Ok(Some(cmd))
}

/// Thins countdown updates to whole seconds worth printing.
#[derive(Debug, Default)]
pub struct CountdownFilter {
    last: Option<(TimerKind, u64)>,
}

impl CountdownFilter {
    /// Seconds to print for this tick: every tenth second, and each of the
    /// last five.
    pub fn accept(&mut self, kind: TimerKind, remaining: Duration) -> Option<u64> {
        let secs = remaining.as_secs_f64().ceil() as u64;
        if self.last == Some((kind, secs)) {
            return None;
        }
        self.last = Some((kind, secs));
        (secs % 10 == 0 || secs <= 5).then_some(secs)
    }
}

fn timer_label(kind: TimerKind) -> &'static str {
    match kind {
        TimerKind::Confirmation => "confirmation",
        TimerKind::ExternalResponse => "profile bot",
        TimerKind::Poll => "poll",
        TimerKind::QuickWatchdog => "lookup",
    }
}

/// Console text for a presentation update, if it is worth showing.
pub fn render_update(update: &UiUpdate, countdown: &mut CountdownFilter) -> Option<String> {
    let text = match update {
        UiUpdate::StateChanged { to, .. } => format!("[state] {to}"),
        UiUpdate::ParticipantJoined(name) => format!("[entry] {name}"),
        UiUpdate::ParticipantCount(n) => format!("[entries] {n} participant(s)"),
        UiUpdate::PrizeChanged(Some(prize)) => format!("[prize] {prize}"),
        UiUpdate::PrizeChanged(None) => "[prize] none".to_string(),
        UiUpdate::PrizeListChanged(list) => format!("[prizes] {} configured left", list.len()),
        UiUpdate::RevealWinner { winner, prize } => match prize {
            Some(prize) => format!("*** WINNER: {winner} ({prize}) ***"),
            None => format!("*** WINNER: {winner} ***"),
        },
        UiUpdate::Countdown {
            kind, remaining, ..
        } => {
            let secs = countdown.accept(*kind, *remaining)?;
            format!("[{}] {secs}s left", timer_label(*kind))
        }
        UiUpdate::Warning { percent } => format!("[warning] {percent}% of the confirmation time used"),
        UiUpdate::StopWarnings => return None,
        UiUpdate::PollOpened(options) => {
            let listed: Vec<String> = options.iter().map(|(n, d)| format!("[{n}] {d}")).collect();
            format!("[poll] {}", listed.join(" | "))
        }
        UiUpdate::PollResult(Some(prize)) => format!("[poll] won by {prize}"),
        UiUpdate::PollResult(None) => "[poll] no votes".to_string(),
        UiUpdate::ProfileShown(profile) => {
            let mut line = format!("[profile] {}", profile.name);
            if let Some(corp) = &profile.corporation {
                line.push_str(&format!(" | {corp}"));
            }
            if let Some(alliance) = &profile.alliance {
                line.push_str(&format!(" | {alliance}"));
            }
            if let Some(url) = &profile.portrait_url {
                line.push_str(&format!(" | {url}"));
            }
            line
        }
        UiUpdate::Refused(reason) => format!("[refused] {reason}"),
        UiUpdate::Notice(text) => format!("[notice] {text}"),
    };
    Some(text)
}
