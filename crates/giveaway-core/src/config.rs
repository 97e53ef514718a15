// Configuration loading and parsing (giveaway.toml, credentials.toml).

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("neither config/ nor defaults/ found under {base}; run from the install directory")]
    NoConfigDir { base: PathBuf },

    #[error("failed to write {path} from defaults: {source}")]
    Seed {
        path: PathBuf,
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub chat: ChatConfig,
    pub entry: EntryConfig,
    pub draw: DrawConfig,
    pub timers: TimersConfig,
    pub lookup: LookupConfig,
    pub prizes: PrizesConfig,
    pub messages: MessagesConfig,
    pub credentials: CredentialsConfig,
}

// ---------------------------------------------------------------------------
// giveaway.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire giveaway.toml file.
#[derive(Debug, Clone, Deserialize)]
struct GiveawayFile {
    chat: ChatConfig,
    entry: EntryConfig,
    #[serde(default)]
    draw: DrawConfig,
    #[serde(default)]
    timers: TimersConfig,
    #[serde(default)]
    lookup: LookupConfig,
    #[serde(default)]
    prizes: PrizesConfig,
    #[serde(default)]
    messages: MessagesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub channel: String,
    pub nick: String,
    /// Name of the bot that answers `!ign` requests in chat.
    #[serde(default)]
    pub external_bot_name: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

fn default_host() -> String {
    "irc.chat.twitch.tv".to_string()
}

fn default_port() -> u16 {
    6667
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_read_timeout_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryMode {
    /// Entrants type the standard join command.
    Predefined,
    /// Entrants type the streamer's custom command.
    Custom,
    /// Any chat message enters.
    Anything,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntryConfig {
    pub mode: EntryMode,
    #[serde(default = "default_join_command")]
    pub join_command: String,
    #[serde(default = "default_custom_command")]
    pub custom_command: String,
}

fn default_join_command() -> String {
    "!play".to_string()
}

fn default_custom_command() -> String {
    "!win".to_string()
}

impl EntryConfig {
    /// The command chat must type, or `None` when any message enters.
    pub fn required_command(&self) -> Option<&str> {
        match self.mode {
            EntryMode::Predefined => Some(&self.join_command),
            EntryMode::Custom => Some(&self.custom_command),
            EntryMode::Anything => None,
        }
    }

    pub fn qualifies(&self, text: &str) -> bool {
        let text = text.trim();
        match self.required_command() {
            Some(cmd) => text.eq_ignore_ascii_case(cmd.trim()),
            None => !text.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PrizeMode {
    /// Chat votes on the prize; a prize must be set to draw.
    #[default]
    Poll,
    /// The streamer picks the prize; a prize must be set to draw.
    Streamer,
    /// A random prize is picked when none is set.
    Random,
}

impl PrizeMode {
    pub fn requires_prize(self) -> bool {
        !matches!(self, PrizeMode::Random)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DrawConfig {
    /// Winners stay in the participant list and may win again.
    pub multi_draw: bool,
    pub prize_mode: PrizeMode,
    pub profile_command: String,
}

impl Default for DrawConfig {
    fn default() -> Self {
        Self {
            multi_draw: false,
            prize_mode: PrizeMode::Poll,
            profile_command: "!ign".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimersConfig {
    pub confirmation_secs: u64,
    pub external_response_secs: u64,
    pub poll_secs: u64,
    /// Watchdog for resolving a winner's username to a profile name.
    pub lookup_timeout_secs: u64,
    /// Watchdog for fetching the full profile.
    pub watchdog_secs: u64,
    pub display_delay_ms: u64,
    pub pump_tick_ms: u64,
}

impl Default for TimersConfig {
    fn default() -> Self {
        Self {
            confirmation_secs: 90,
            external_response_secs: 300,
            poll_secs: 30,
            lookup_timeout_secs: 10,
            watchdog_secs: 5,
            display_delay_ms: 1500,
            pump_tick_ms: 50,
        }
    }
}

impl TimersConfig {
    pub fn confirmation(&self) -> Duration {
        Duration::from_secs(self.confirmation_secs)
    }

    pub fn external_response(&self) -> Duration {
        Duration::from_secs(self.external_response_secs)
    }

    pub fn poll(&self) -> Duration {
        Duration::from_secs(self.poll_secs)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }

    pub fn watchdog(&self) -> Duration {
        Duration::from_secs(self.watchdog_secs)
    }

    pub fn display_delay(&self) -> Duration {
        Duration::from_millis(self.display_delay_ms)
    }

    pub fn pump_tick(&self) -> Duration {
        Duration::from_millis(self.pump_tick_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// Try to resolve the winner's profile name without asking them.
    pub auto_lookup: bool,
    /// Name resolution endpoint. `{twitch}` is replaced with the username;
    /// without it the username is sent as a `twitch` query parameter.
    pub resolve_url: Option<String>,
    pub profile_base_url: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub retry_interval_ms: u64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            auto_lookup: false,
            resolve_url: None,
            profile_base_url: "https://esi.evetech.net/latest".to_string(),
            user_agent: "giveaway-orchestrator".to_string(),
            request_timeout_secs: 5,
            retry_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PrizesConfig {
    /// Prizes always available; never consumed by a win.
    pub common: Vec<String>,
    /// Prizes used up as they are won.
    pub configured: Vec<String>,
}

/// Chat announcement templates. Placeholders in braces are filled by
/// [`render`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MessagesConfig {
    pub draw_opened: String,
    pub draw_closed: String,
    pub draw_abandoned: String,
    pub confirmation_needed: String,
    pub confirmed: String,
    pub auto_lookup_attempt: String,
    pub lookup_failed: String,
    pub awaiting_profile: String,
    pub profile_found: String,
    pub confirmation_timeout: String,
    pub external_timeout: String,
    pub poll_opened: String,
    pub poll_result: String,
    pub poll_no_result: String,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            draw_opened: "🎁 GIVEAWAY OPEN! 🎁 Prize: {prize}. {requirement} in chat!".into(),
            draw_closed: "Giveaway entries are now CLOSED.".into(),
            draw_abandoned: "The giveaway has been cancelled.".into(),
            confirmation_needed: "🎉 Congrats @{winner}! 🎉 You won: {prize}! Type anything (or {command}) in chat within {timeout}s to confirm!".into(),
            confirmed: "@{winner} confirmed! Congratulations!".into(),
            auto_lookup_attempt: "@{winner} confirmed! Congratulations! Attempting automatic lookup, please wait.".into(),
            lookup_failed: "@{winner} confirmed! We could not validate your IGN automatically. Please register with the IGN bot or type '{command} <your in-game name>' in chat to provide your IGN.".into(),
            awaiting_profile: "@{winner} confirmed! Congratulations! Please type {command} in chat".into(),
            profile_found: "@{winner} IGN verified: {ign}. Congratulations on winning!".into(),
            confirmation_timeout: "@{winner} did not confirm in time. Rerolling may occur.".into(),
            external_timeout: "@{winner} no IGN response arrived in time.".into(),
            poll_opened: "🏆 PRIZE POLL 🏆 Vote with the number: {options} | Poll ends in {timeout}s!".into(),
            poll_result: "PRIZE POLL ENDED! 🏆 Winning prize: {prize}".into(),
            poll_no_result: "PRIZE POLL ENDED! No prize selected.".into(),
        }
    }
}

/// Fill `{name}` placeholders in `template`.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    /// Chat OAuth token, with or without the `oauth:` prefix.
    pub oauth_token: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Files written from `defaults/` into `config/` when missing. The
/// credentials file is created by the operator from its `.example`.
const SEEDED_FILES: &[&str] = &["giveaway.toml"];

/// Locates `config/` and `defaults/` under one base directory.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    base: PathBuf,
}

impl ConfigPaths {
    pub fn under(base_dir: &Path) -> Self {
        Self {
            base: base_dir.to_path_buf(),
        }
    }

    pub fn config_dir(&self) -> PathBuf {
        self.base.join("config")
    }

    pub fn defaults_dir(&self) -> PathBuf {
        self.base.join("defaults")
    }

    pub fn giveaway(&self) -> PathBuf {
        self.config_dir().join("giveaway.toml")
    }

    pub fn credentials(&self) -> PathBuf {
        self.config_dir().join("credentials.toml")
    }

    /// Write every seeded file `config/` lacks from `defaults/`. An existing
    /// file is never touched. Returns the files written.
    pub fn seed(&self) -> Result<Vec<PathBuf>, ConfigError> {
        let config_dir = self.config_dir();
        let defaults_dir = self.defaults_dir();
        if !defaults_dir.is_dir() {
            if config_dir.is_dir() {
                return Ok(Vec::new());
            }
            return Err(ConfigError::NoConfigDir {
                base: self.base.clone(),
            });
        }
        std::fs::create_dir_all(&config_dir).map_err(|source| ConfigError::Seed {
            path: config_dir.clone(),
            source,
        })?;

        let mut written = Vec::new();
        for name in SEEDED_FILES {
            let from = defaults_dir.join(name);
            if !from.is_file() {
                debug!(file = %from.display(), "no default to seed from");
                continue;
            }
            let to = config_dir.join(name);
            if seed_file(&from, &to)? {
                info!(file = %to.display(), "wrote config file from defaults");
                written.push(to);
            }
        }
        if !self.credentials().exists() {
            debug!("no credentials.toml; chat login has no token");
        }
        Ok(written)
    }

    /// Read and validate `giveaway.toml` and, when present,
    /// `credentials.toml`.
    pub fn load(&self) -> Result<Config, ConfigError> {
        let file: GiveawayFile = parse_file(&self.giveaway())?;
        let credentials_path = self.credentials();
        let credentials = if credentials_path.exists() {
            parse_file(&credentials_path)?
        } else {
            CredentialsConfig::default()
        };
        file.into_config(credentials)
    }
}

impl GiveawayFile {
    fn into_config(self, credentials: CredentialsConfig) -> Result<Config, ConfigError> {
        let config = Config {
            chat: self.chat,
            entry: self.entry,
            draw: self.draw,
            timers: self.timers,
            lookup: self.lookup,
            prizes: self.prizes,
            messages: self.messages,
            credentials,
        };
        validate(&config)?;
        Ok(config)
    }
}

impl Config {
    /// Parse and validate giveaway.toml content held in memory, with no
    /// credentials.
    pub fn from_toml(text: &str) -> Result<Config, ConfigError> {
        let file: GiveawayFile = toml::from_str(text).map_err(|source| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        file.into_config(CredentialsConfig::default())
    }
}

/// Load the configuration under `base_dir` without seeding it.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    ConfigPaths::under(base_dir).load()
}

/// Seed, then load, the configuration under the working directory.
pub fn load_config() -> Result<Config, ConfigError> {
    let base = std::env::current_dir().map_err(|source| ConfigError::Read {
        path: PathBuf::from("."),
        source,
    })?;
    let paths = ConfigPaths::under(&base);
    paths.seed()?;
    paths.load()
}

/// Copy `from` to `to` unless `to` exists. Returns whether a copy was made.
fn seed_file(from: &Path, to: &Path) -> Result<bool, ConfigError> {
    let mut dest = match OpenOptions::new().write(true).create_new(true).open(to) {
        Ok(dest) => dest,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
        Err(source) => {
            return Err(ConfigError::Seed {
                path: to.to_path_buf(),
                source,
            })
        }
    };
    let mut src = File::open(from).map_err(|source| ConfigError::Read {
        path: from.to_path_buf(),
        source,
    })?;
    io::copy(&mut src, &mut dest).map_err(|source| ConfigError::Seed {
        path: to.to_path_buf(),
        source,
    })?;
    Ok(true)
}

fn parse_file<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::ParseError {
        path: path.to_path_buf(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let invalid = |field: &str, message: &str| ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    };

    if config.chat.channel.trim().is_empty() {
        return Err(invalid("chat.channel", "must not be empty"));
    }
    if config.chat.nick.trim().is_empty() {
        return Err(invalid("chat.nick", "must not be empty"));
    }
    if config.chat.read_timeout_ms == 0 {
        return Err(invalid("chat.read_timeout_ms", "must be greater than 0"));
    }

    match config.entry.mode {
        EntryMode::Predefined if config.entry.join_command.trim().is_empty() => {
            return Err(invalid(
                "entry.join_command",
                "must not be empty when mode is `predefined`",
            ));
        }
        EntryMode::Custom if config.entry.custom_command.trim().is_empty() => {
            return Err(invalid(
                "entry.custom_command",
                "must not be empty when mode is `custom`",
            ));
        }
        _ => {}
    }

    if config.draw.profile_command.trim().is_empty() {
        return Err(invalid("draw.profile_command", "must not be empty"));
    }

    let t = &config.timers;
    let timer_fields: &[(&str, u64)] = &[
        ("timers.confirmation_secs", t.confirmation_secs),
        ("timers.external_response_secs", t.external_response_secs),
        ("timers.poll_secs", t.poll_secs),
        ("timers.lookup_timeout_secs", t.lookup_timeout_secs),
        ("timers.watchdog_secs", t.watchdog_secs),
        ("timers.pump_tick_ms", t.pump_tick_ms),
    ];
    for (name, val) in timer_fields {
        if *val == 0 {
            return Err(invalid(*name, "must be greater than 0"));
        }
    }

    if config.lookup.request_timeout_secs == 0 {
        return Err(invalid("lookup.request_timeout_secs", "must be greater than 0"));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults_dir() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../defaults")
    }

    const MINIMAL: &str = r#"
[chat]
channel = "streamer"
nick = "giveawaybot"

[entry]
mode = "predefined"
"#;

    fn write_config(name: &str, giveaway: &str, credentials: Option<&str>) -> PathBuf {
        let tmp = std::env::temp_dir().join(name);
        let _ = std::fs::remove_dir_all(&tmp);
        let config_dir = tmp.join("config");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(config_dir.join("giveaway.toml"), giveaway).unwrap();
        if let Some(creds) = credentials {
            std::fs::write(config_dir.join("credentials.toml"), creds).unwrap();
        }
        tmp
    }

    fn expect_validation_error(name: &str, giveaway: &str, field: &str) {
        let tmp = write_config(name, giveaway, None);
        match load_config_from(&tmp) {
            Err(ConfigError::ValidationError { field: f, .. }) => assert_eq!(f, field),
            other => panic!("expected validation error for {field}, got {other:?}"),
        }
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn shipped_defaults_load_and_validate() {
        let tmp = std::env::temp_dir().join("giveaway_config_shipped_defaults");
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(tmp.join("defaults")).unwrap();
        for entry in std::fs::read_dir(defaults_dir()).unwrap() {
            let path = entry.unwrap().path();
            std::fs::copy(&path, tmp.join("defaults").join(path.file_name().unwrap())).unwrap();
        }

        let written = ConfigPaths::under(&tmp).seed().unwrap();
        assert_eq!(written, vec![tmp.join("config").join("giveaway.toml")]);

        let config = load_config_from(&tmp).unwrap();
        assert_eq!(config.chat.host, "irc.chat.twitch.tv");
        assert_eq!(config.chat.port, 6667);
        assert_eq!(config.timers.confirmation_secs, 90);
        assert_eq!(config.entry.join_command, "!play");
        assert!(config.credentials.oauth_token.is_none());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn minimal_file_uses_defaults() {
        let tmp = write_config("giveaway_config_minimal", MINIMAL, None);
        let config = load_config_from(&tmp).unwrap();
        assert_eq!(config.entry.mode, EntryMode::Predefined);
        assert_eq!(config.draw.profile_command, "!ign");
        assert_eq!(config.draw.prize_mode, PrizeMode::Poll);
        assert_eq!(config.timers.external_response(), Duration::from_secs(300));
        assert_eq!(config.timers.display_delay(), Duration::from_millis(1500));
        assert!(config.prizes.configured.is_empty());
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn credentials_toml_with_token() {
        let tmp = write_config(
            "giveaway_config_with_creds",
            MINIMAL,
            Some("oauth_token = \"abc123\"\n"),
        );
        let config = load_config_from(&tmp).unwrap();
        assert_eq!(config.credentials.oauth_token.as_deref(), Some("abc123"));
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_empty_channel() {
        let text = MINIMAL.replace("channel = \"streamer\"", "channel = \"  \"");
        expect_validation_error("giveaway_config_empty_channel", &text, "chat.channel");
    }

    #[test]
    fn rejects_zero_confirmation_timer() {
        let text = format!("{MINIMAL}\n[timers]\nconfirmation_secs = 0\n");
        expect_validation_error(
            "giveaway_config_zero_confirmation",
            &text,
            "timers.confirmation_secs",
        );
    }

    #[test]
    fn rejects_empty_custom_command() {
        let text = MINIMAL.replace(
            "mode = \"predefined\"",
            "mode = \"custom\"\ncustom_command = \"\"",
        );
        expect_validation_error(
            "giveaway_config_empty_custom",
            &text,
            "entry.custom_command",
        );
    }

    #[test]
    fn file_not_found_for_missing_giveaway_toml() {
        let tmp = std::env::temp_dir().join("giveaway_config_missing");
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(tmp.join("config")).unwrap();
        assert!(matches!(
            load_config_from(&tmp),
            Err(ConfigError::FileNotFound { .. })
        ));
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn parse_error_for_unknown_entry_mode() {
        let text = MINIMAL.replace("predefined", "sometimes");
        let tmp = write_config("giveaway_config_bad_mode", &text, None);
        assert!(matches!(
            load_config_from(&tmp),
            Err(ConfigError::ParseError { .. })
        ));
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn seeding_keeps_the_operators_file() {
        let tmp = std::env::temp_dir().join("giveaway_config_seed_keeps");
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(tmp.join("defaults")).unwrap();
        std::fs::create_dir_all(tmp.join("config")).unwrap();
        std::fs::write(tmp.join("defaults/giveaway.toml"), "from defaults").unwrap();
        std::fs::write(tmp.join("config/giveaway.toml"), "user edited").unwrap();

        let written = ConfigPaths::under(&tmp).seed().unwrap();
        assert!(written.is_empty());
        let kept = std::fs::read_to_string(tmp.join("config/giveaway.toml")).unwrap();
        assert_eq!(kept, "user edited");
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn seeding_writes_only_the_giveaway_file() {
        let tmp = std::env::temp_dir().join("giveaway_config_seed_only_known");
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(tmp.join("defaults")).unwrap();
        std::fs::write(tmp.join("defaults/giveaway.toml"), MINIMAL).unwrap();
        std::fs::write(tmp.join("defaults/credentials.toml.example"), "oauth_token = \"x\"\n").unwrap();
        std::fs::write(tmp.join("defaults/notes.txt"), "scratch").unwrap();

        let paths = ConfigPaths::under(&tmp);
        assert_eq!(paths.seed().unwrap(), vec![paths.giveaway()]);
        assert!(!paths.credentials().exists());
        assert!(!paths.config_dir().join("notes.txt").exists());
        assert!(!paths.config_dir().join("credentials.toml.example").exists());

        let config = paths.load().unwrap();
        assert_eq!(config.chat.channel, "streamer");
        assert!(config.credentials.oauth_token.is_none());
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn config_dir_without_defaults_is_enough() {
        let tmp = write_config("giveaway_config_no_defaults", MINIMAL, None);
        assert!(ConfigPaths::under(&tmp).seed().unwrap().is_empty());
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn seeding_without_any_config_dir_fails() {
        let tmp = std::env::temp_dir().join("giveaway_config_both_missing");
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();
        match ConfigPaths::under(&tmp).seed() {
            Err(ConfigError::NoConfigDir { base }) => assert_eq!(base, tmp),
            other => panic!("expected NoConfigDir, got {other:?}"),
        }
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn broken_credentials_file_is_a_parse_error() {
        let tmp = write_config("giveaway_config_bad_creds", MINIMAL, Some("oauth_token = [\n"));
        match load_config_from(&tmp) {
            Err(ConfigError::ParseError { path, .. }) => assert!(path.ends_with("credentials.toml")),
            other => panic!("expected ParseError, got {other:?}"),
        }
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn entry_predicate_by_mode() {
        let mut entry = EntryConfig {
            mode: EntryMode::Predefined,
            join_command: "!play".into(),
            custom_command: "!win".into(),
        };
        assert!(entry.qualifies("  !PLAY "));
        assert!(!entry.qualifies("!play now"));
        entry.mode = EntryMode::Custom;
        assert!(entry.qualifies("!win"));
        assert!(!entry.qualifies("!play"));
        entry.mode = EntryMode::Anything;
        assert!(entry.qualifies("hello"));
        assert!(!entry.qualifies("   "));
    }

    #[test]
    fn render_fills_placeholders() {
        let out = render("@{winner} won {prize}, @{winner}!", &[("winner", "amy"), ("prize", "Hat")]);
        assert_eq!(out, "@amy won Hat, @amy!");
    }
}
