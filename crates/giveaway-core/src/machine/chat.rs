// Recognisers for the chat messages that move a winner through
// confirmation.

use std::sync::OnceLock;

use regex::Regex;

/// What a winner's message asks for with respect to their profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileCommand {
    /// `!ign` alone: ask the profile bot.
    Bare,
    /// `!ign <name>`: the winner supplied their name.
    Inline(String),
}

/// Parse the profile command (e.g. `!ign`) at the start of a message.
pub fn parse_profile_command(text: &str, command: &str) -> Option<ProfileCommand> {
    let text = text.trim();
    let command = command.trim();
    let head = text.get(..command.len())?;
    if !head.eq_ignore_ascii_case(command) {
        return None;
    }
    let tail = &text[command.len()..];
    if tail.is_empty() {
        return Some(ProfileCommand::Bare);
    }
    if !tail.starts_with(char::is_whitespace) {
        return None;
    }
    let name = tail.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    if name.is_empty() {
        Some(ProfileCommand::Bare)
    } else {
        Some(ProfileCommand::Inline(name.to_string()))
    }
}

fn quoted_ign_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\bIGN\s*["']([^"']+)["']"#).expect("quoted ign pattern is valid")
    })
}

fn mention_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)@(\w+)\s*:\s*IGN\s*["']([^"']+)["']"#).expect("mention pattern is valid")
    })
}

fn ign_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bign\b").expect("ign word pattern is valid"))
}

/// `IGN "Name"` anywhere in the message.
pub fn quoted_profile_name(text: &str) -> Option<String> {
    let caps = quoted_ign_re().captures(text)?;
    let name = caps[1].trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// `@user: IGN "Name"`, returning the mentioned user and the name.
pub fn mention_profile(text: &str) -> Option<(String, String)> {
    let caps = mention_re().captures(text)?;
    let name = caps[2].trim();
    if name.is_empty() {
        return None;
    }
    Some((caps[1].to_string(), name.to_string()))
}

/// Whether a profile-bot reply is about `winner`: it mentions them and the
/// word IGN.
pub fn is_reply_about(text: &str, winner: &str) -> bool {
    let lower = text.to_lowercase();
    let mention = format!("@{}", winner.to_lowercase());
    let mentions_winner = lower.match_indices(&mention).any(|(at, m)| {
        lower[at + m.len()..]
            .chars()
            .next()
            .map_or(true, |c| !(c.is_alphanumeric() || c == '_'))
    });
    mentions_winner && ign_word_re().is_match(text)
}

/// What a chat message says about the winner's profile name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileHint {
    /// A name to look up.
    Name(String),
    /// The winner asked the profile bot.
    Bare,
    /// The profile bot answered but has no name on record.
    BotHasNone,
}

/// Inspect `text` from `sender` for anything about `winner`'s profile.
///
/// Recognised, in order: `@winner: IGN "Name"` from anyone; a profile bot
/// reply mentioning the winner; and from the winner themselves the profile
/// command or `IGN "Name"`.
pub fn profile_hint(
    text: &str,
    sender: &str,
    winner: &str,
    external_bot: Option<&str>,
    command: &str,
) -> Option<ProfileHint> {
    let winner = winner.trim_start_matches('@');
    if let Some((user, name)) = mention_profile(text) {
        if user.eq_ignore_ascii_case(winner) {
            return Some(ProfileHint::Name(name));
        }
    }

    let from_bot = external_bot.is_some_and(|b| b.eq_ignore_ascii_case(sender));
    if from_bot && is_reply_about(text, winner) {
        return Some(match quoted_profile_name(text) {
            Some(name) => ProfileHint::Name(name),
            None => ProfileHint::BotHasNone,
        });
    }

    if !sender.eq_ignore_ascii_case(winner) {
        return None;
    }
    match parse_profile_command(text, command) {
        Some(ProfileCommand::Inline(name)) => Some(ProfileHint::Name(name)),
        Some(ProfileCommand::Bare) => Some(ProfileHint::Bare),
        None => quoted_profile_name(text).map(ProfileHint::Name),
    }
}
