// Fallback chat client speaking the Twitch IRC line protocol.
//
// Used when the primary chat feed is unavailable. Line parsing is a pure
// function; the read loop is generic over the transport so it runs against
// in-memory pipes in tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::protocol::{ChatMessage, Event};

// ---------------------------------------------------------------------------
// Errors and settings
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum IrcError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    #[error("timed out connecting to {addr}")]
    Timeout { addr: String },

    #[error("chat connection I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct IrcSettings {
    pub host: String,
    pub port: u16,
    pub nick: String,
    /// OAuth token without the `oauth:` prefix.
    pub token: String,
    /// Channel name without the leading `#`.
    pub channel: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl IrcSettings {
    pub fn from_config(config: &Config) -> Self {
        let token = config.credentials.oauth_token.clone().unwrap_or_default();
        Self {
            host: config.chat.host.clone(),
            port: config.chat.port,
            nick: config.chat.nick.trim().to_lowercase(),
            token: token.trim().trim_start_matches("oauth:").to_string(),
            channel: config.chat.channel.trim().trim_start_matches('#').to_lowercase(),
            connect_timeout: Duration::from_secs(config.chat.connect_timeout_secs),
            read_timeout: Duration::from_millis(config.chat.read_timeout_ms),
        }
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ---------------------------------------------------------------------------
// Line parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    Ping(String),
    Chat {
        user: String,
        channel: String,
        text: String,
    },
    Other,
}

fn privmsg_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^:(\w+)!\w+@\w+\.[\w.-]+ PRIVMSG #(\w+) :(.*)$")
            .expect("privmsg pattern is valid")
    })
}

/// Classify one protocol line (without its CRLF).
pub fn parse_line(raw: &str) -> LineEvent {
    let line = raw.trim_end_matches(['\r', '\n']);
    if let Some(token) = line.strip_prefix("PING") {
        if token.is_empty() || token.starts_with(' ') {
            return LineEvent::Ping(token.trim().trim_start_matches(':').to_string());
        }
    }
    match privmsg_re().captures(line) {
        Some(caps) => LineEvent::Chat {
            user: caps[1].to_string(),
            channel: caps[2].to_string(),
            text: caps[3].to_string(),
        },
        None => LineEvent::Other,
    }
}

// ---------------------------------------------------------------------------
// Wire helpers
// ---------------------------------------------------------------------------

/// Write half shared between the read loop (for PONG) and `send`.
pub type SharedWriter = Arc<Mutex<Option<Box<dyn AsyncWrite + Send + Unpin>>>>;

/// Callback invoked for every chat line before it is queued.
pub type MessageCallback = Arc<dyn Fn(&ChatMessage) + Send + Sync>;

async fn write_line(writer: &SharedWriter, line: &str) -> std::io::Result<()> {
    let mut guard = writer.lock().await;
    let Some(w) = guard.as_mut() else {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotConnected,
            "chat connection closed",
        ));
    };
    w.write_all(line.as_bytes()).await?;
    w.write_all(b"\r\n").await?;
    w.flush().await
}

/// Send the login handshake: PASS, NICK, JOIN.
pub async fn handshake<W: AsyncWrite + Unpin>(
    writer: &mut W,
    token: &str,
    nick: &str,
    channel: &str,
) -> std::io::Result<()> {
    let lines = format!("PASS oauth:{token}\r\nNICK {nick}\r\nJOIN #{channel}\r\n");
    writer.write_all(lines.as_bytes()).await?;
    writer.flush().await
}

// ---------------------------------------------------------------------------
// Read loop
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// Stop was requested or the event queue went away.
    Stopped,
    Eof,
    Error(String),
}

/// Everything the read loop needs besides the transport itself.
#[derive(Clone)]
pub struct ReadLoopContext {
    pub own_nick: String,
    pub tx: mpsc::Sender<Event>,
    pub writer: SharedWriter,
    pub callback: Option<MessageCallback>,
    pub stop: Arc<AtomicBool>,
    pub read_timeout: Duration,
}

/// Longest partial line kept while waiting for its CRLF.
pub const MAX_LINE_BYTES: usize = 8 * 1024;

/// Read lines until EOF, error, or a stop request. PINGs are answered before
/// any later line is handled. A line longer than [`MAX_LINE_BYTES`] is
/// dropped whole.
pub async fn read_loop<R: AsyncRead + Unpin>(mut reader: R, ctx: ReadLoopContext) -> LoopExit {
    let mut pending: Vec<u8> = Vec::with_capacity(4096);
    let mut chunk = [0u8; 2048];
    // Set while skipping the rest of an overlong line.
    let mut skipping = false;

    loop {
        if ctx.stop.load(Ordering::Acquire) {
            return LoopExit::Stopped;
        }

        let n = match tokio::time::timeout(ctx.read_timeout, reader.read(&mut chunk)).await {
            Err(_) => continue,
            Ok(Ok(0)) => return LoopExit::Eof,
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                warn!("chat read error: {e}");
                return LoopExit::Error(e.to_string());
            }
        };
        pending.extend_from_slice(&chunk[..n]);

        while let Some(pos) = pending.windows(2).position(|w| w == b"\r\n") {
            let raw: Vec<u8> = pending.drain(..pos + 2).collect();
            if skipping {
                skipping = false;
                continue;
            }
            let line = String::from_utf8_lossy(&raw[..pos]);

            match parse_line(&line) {
                LineEvent::Ping(token) => {
                    if let Err(e) = write_line(&ctx.writer, &format!("PONG :{token}")).await {
                        warn!("failed to answer PING: {e}");
                        return LoopExit::Error(e.to_string());
                    }
                    trace!("answered PING");
                }
                LineEvent::Chat { user, text, .. } => {
                    if user.eq_ignore_ascii_case(&ctx.own_nick) {
                        continue;
                    }
                    let msg = ChatMessage::new(user, text);
                    if let Some(cb) = &ctx.callback {
                        cb(&msg);
                    }
                    if ctx.tx.send(Event::Chat(msg)).await.is_err() {
                        return LoopExit::Stopped;
                    }
                }
                LineEvent::Other => {
                    debug!(line = %line, "ignoring chat line");
                }
            }
        }

        if pending.len() > MAX_LINE_BYTES {
            warn!(bytes = pending.len(), "dropping overlong chat line");
            pending.clear();
            skipping = true;
        }
    }
}

// ---------------------------------------------------------------------------
// IrcClient
// ---------------------------------------------------------------------------

pub struct IrcClient {
    settings: IrcSettings,
    writer: SharedWriter,
    stop: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    callback: Option<MessageCallback>,
}

impl IrcClient {
    pub fn new(settings: IrcSettings) -> Self {
        Self {
            settings,
            writer: Arc::new(Mutex::new(None)),
            stop: Arc::new(AtomicBool::new(false)),
            connected: Arc::new(AtomicBool::new(false)),
            callback: None,
        }
    }

    pub fn with_callback(mut self, callback: MessageCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Connect, log in, and spawn the read loop. Reports `ChatStatus` ready
    /// once logged in and not-ready when the loop ends on EOF or error.
    /// Reconnecting is left to the caller.
    pub async fn connect(&self, tx: mpsc::Sender<Event>) -> Result<JoinHandle<LoopExit>, IrcError> {
        let addr = self.settings.addr();
        let stream = match tokio::time::timeout(
            self.settings.connect_timeout,
            TcpStream::connect(addr.as_str()),
        )
        .await
        {
            Err(_) => return Err(IrcError::Timeout { addr }),
            Ok(Err(source)) => return Err(IrcError::Connect { addr, source }),
            Ok(Ok(stream)) => stream,
        };
        let (reader, mut writer) = stream.into_split();

        handshake(
            &mut writer,
            &self.settings.token,
            &self.settings.nick,
            &self.settings.channel,
        )
        .await?;
        *self.writer.lock().await = Some(Box::new(writer));
        self.stop.store(false, Ordering::Release);
        self.connected.store(true, Ordering::Release);
        info!("chat fallback connected to {addr} as {}", self.settings.nick);
        let _ = tx.send(Event::ChatStatus { ready: true }).await;

        let ctx = ReadLoopContext {
            own_nick: self.settings.nick.clone(),
            tx: tx.clone(),
            writer: Arc::clone(&self.writer),
            callback: self.callback.clone(),
            stop: Arc::clone(&self.stop),
            read_timeout: self.settings.read_timeout,
        };
        let connected = Arc::clone(&self.connected);
        let writer = Arc::clone(&self.writer);

        Ok(tokio::spawn(async move {
            let exit = read_loop(reader, ctx).await;
            connected.store(false, Ordering::Release);
            writer.lock().await.take();
            match &exit {
                LoopExit::Stopped => info!("chat fallback stopped"),
                LoopExit::Eof | LoopExit::Error(_) => {
                    warn!(?exit, "chat fallback disconnected");
                    let _ = tx.send(Event::ChatStatus { ready: false }).await;
                }
            }
            exit
        }))
    }

    /// Send one chat line. Returns false instead of failing.
    pub async fn send(&self, text: &str) -> bool {
        let text = text.replace(['\r', '\n'], " ");
        let line = format!("PRIVMSG #{} :{}", self.settings.channel, text);
        match write_line(&self.writer, &line).await {
            Ok(()) => true,
            Err(e) => {
                warn!("chat send failed: {e}");
                false
            }
        }
    }

    /// Ask the read loop to stop; it notices within one read timeout.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::Mutex as StdMutex;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    /// Writer that appends every write to a shared transcript.
    struct Transcript(Arc<StdMutex<Vec<String>>>);

    impl AsyncWrite for Transcript {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            self.0
                .lock()
                .unwrap()
                .push(format!("W:{}", String::from_utf8_lossy(buf)));
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn context(
        tx: mpsc::Sender<Event>,
        writer: SharedWriter,
        callback: Option<MessageCallback>,
    ) -> ReadLoopContext {
        ReadLoopContext {
            own_nick: "giveawaybot".into(),
            tx,
            writer,
            callback,
            stop: Arc::new(AtomicBool::new(false)),
            read_timeout: Duration::from_millis(50),
        }
    }

    // -- parse_line --

    #[test]
    fn parses_privmsg() {
        assert_eq!(
            parse_line(":alice!alice@alice.tmi.twitch.tv PRIVMSG #streamer :!play\r\n"),
            LineEvent::Chat {
                user: "alice".into(),
                channel: "streamer".into(),
                text: "!play".into(),
            }
        );
    }

    #[test]
    fn parses_ping_with_and_without_colon() {
        assert_eq!(parse_line("PING :tmi.twitch.tv"), LineEvent::Ping("tmi.twitch.tv".into()));
        assert_eq!(parse_line("PING tmi.twitch.tv"), LineEvent::Ping("tmi.twitch.tv".into()));
    }

    #[test]
    fn other_lines_are_ignored() {
        assert_eq!(parse_line(":tmi.twitch.tv 001 giveawaybot :Welcome, GLHF!"), LineEvent::Other);
        assert_eq!(parse_line("PINGPONG"), LineEvent::Other);
        assert_eq!(parse_line(""), LineEvent::Other);
        assert_eq!(
            parse_line(":bob!bob@bob.tmi.twitch.tv JOIN #streamer"),
            LineEvent::Other
        );
    }

    #[test]
    fn message_text_keeps_colons() {
        match parse_line(":bob!bob@bob.tmi.twitch.tv PRIVMSG #s :@amy: IGN \"X\"") {
            LineEvent::Chat { text, .. } => assert_eq!(text, "@amy: IGN \"X\""),
            other => panic!("unexpected {other:?}"),
        }
    }

    // -- read_loop --

    #[tokio::test]
    async fn ping_is_answered_before_the_next_line() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let writer: SharedWriter = Arc::new(Mutex::new(Some(Box::new(Transcript(Arc::clone(&log))))));
        let cb_log = Arc::clone(&log);
        let callback: MessageCallback =
            Arc::new(move |m: &ChatMessage| cb_log.lock().unwrap().push(format!("C:{}", m.text)));
        let (tx, mut rx) = mpsc::channel(16);

        let input: &[u8] =
            b"PING :tmi.twitch.tv\r\n:alice!alice@alice.tmi.twitch.tv PRIVMSG #streamer :hello\r\n";
        let exit = read_loop(input, context(tx, writer, Some(callback))).await;
        assert_eq!(exit, LoopExit::Eof);

        let log = log.lock().unwrap().clone();
        let joined = log.join("");
        let pong_at = joined.find("W:PONG :tmi.twitch.tv").expect("PONG written");
        let chat_at = joined.find("C:hello").expect("callback ran");
        assert!(pong_at < chat_at);

        match rx.recv().await {
            Some(Event::Chat(msg)) => {
                assert_eq!(msg.user, "alice");
                assert_eq!(msg.text, "hello");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn lines_split_across_reads_are_reassembled() {
        let (mut server, client) = tokio::io::duplex(64);
        let writer: SharedWriter = Arc::new(Mutex::new(None));
        let (tx, mut rx) = mpsc::channel(16);
        let task = tokio::spawn(read_loop(client, context(tx, writer, None)));

        server.write_all(b":bob!bob@bob.tmi.twitch.tv PRIV").await.unwrap();
        server.write_all(b"MSG #streamer :split line\r\n").await.unwrap();
        drop(server);

        match rx.recv().await {
            Some(Event::Chat(msg)) => assert_eq!(msg.text, "split line"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(task.await.unwrap(), LoopExit::Eof);
    }

    #[tokio::test]
    async fn own_messages_are_suppressed() {
        let writer: SharedWriter = Arc::new(Mutex::new(None));
        let (tx, mut rx) = mpsc::channel(16);
        let input: &[u8] = b":GiveawayBot!giveawaybot@giveawaybot.tmi.twitch.tv PRIVMSG #streamer :hi\r\n\
:carl!carl@carl.tmi.twitch.tv PRIVMSG #streamer :yo\r\n";
        read_loop(input, context(tx, writer, None)).await;

        match rx.recv().await {
            Some(Event::Chat(msg)) => assert_eq!(msg.user, "carl"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn overlong_line_is_dropped_and_reading_continues() {
        let writer: SharedWriter = Arc::new(Mutex::new(None));
        let (tx, mut rx) = mpsc::channel(16);
        let mut input = b":mallory!mallory@mallory.tmi.twitch.tv PRIVMSG #streamer :".to_vec();
        input.extend(std::iter::repeat(b'x').take(4 * MAX_LINE_BYTES));
        input.extend_from_slice(b"\r\n:carl!carl@carl.tmi.twitch.tv PRIVMSG #streamer :!play\r\n");

        let exit = read_loop(input.as_slice(), context(tx, writer, None)).await;
        assert_eq!(exit, LoopExit::Eof);

        match rx.recv().await {
            Some(Event::Chat(msg)) => {
                assert_eq!(msg.user, "carl");
                assert_eq!(msg.text, "!play");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn stop_flag_is_observed_between_reads() {
        let (_server, client) = tokio::io::duplex(64);
        let writer: SharedWriter = Arc::new(Mutex::new(None));
        let (tx, _rx) = mpsc::channel(16);
        let ctx = context(tx, writer, None);
        let stop = Arc::clone(&ctx.stop);
        let task = tokio::spawn(read_loop(client, ctx));

        tokio::time::sleep(Duration::from_millis(20)).await;
        stop.store(true, Ordering::Release);
        let exit = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("loop should stop")
            .unwrap();
        assert_eq!(exit, LoopExit::Stopped);
    }

    // -- IrcClient against a mock server --

    #[tokio::test]
    async fn mock_server_full_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = socket.into_split();
            let mut lines = BufReader::new(read_half).lines();

            let mut login = Vec::new();
            for _ in 0..3 {
                login.push(lines.next_line().await.unwrap().unwrap());
            }

            write_half.write_all(b"PING :tmi.twitch.tv\r\n").await.unwrap();
            let pong = lines.next_line().await.unwrap().unwrap();

            write_half
                .write_all(b":dana!dana@dana.tmi.twitch.tv PRIVMSG #streamer :!play\r\n")
                .await
                .unwrap();
            let said = lines.next_line().await.unwrap().unwrap();
            (login, pong, said)
        });

        let settings = IrcSettings {
            host: "127.0.0.1".into(),
            port,
            nick: "giveawaybot".into(),
            token: "secret".into(),
            channel: "streamer".into(),
            connect_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_millis(50),
        };
        let client = IrcClient::new(settings);
        let (tx, mut rx) = mpsc::channel(16);
        let reader = client.connect(tx).await.unwrap();
        assert!(client.is_connected());

        assert_eq!(rx.recv().await, Some(Event::ChatStatus { ready: true }));
        match rx.recv().await {
            Some(Event::Chat(msg)) => assert_eq!((msg.user.as_str(), msg.text.as_str()), ("dana", "!play")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(client.send("Giveaway entries are now CLOSED.").await);

        let (login, pong, said) = server.await.unwrap();
        assert_eq!(
            login,
            vec!["PASS oauth:secret", "NICK giveawaybot", "JOIN #streamer"]
        );
        assert_eq!(pong, "PONG :tmi.twitch.tv");
        assert_eq!(said, "PRIVMSG #streamer :Giveaway entries are now CLOSED.");

        // Server hung up after its script.
        assert_eq!(rx.recv().await, Some(Event::ChatStatus { ready: false }));
        assert_eq!(reader.await.unwrap(), LoopExit::Eof);
        assert!(!client.is_connected());
        assert!(!client.send("late").await);
    }

    #[tokio::test]
    async fn connect_refused_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let settings = IrcSettings {
            host: "127.0.0.1".into(),
            port,
            nick: "bot".into(),
            token: String::new(),
            channel: "streamer".into(),
            connect_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_millis(50),
        };
        let (tx, _rx) = mpsc::channel(4);
        let result = IrcClient::new(settings).connect(tx).await;
        assert!(matches!(result, Err(IrcError::Connect { .. })));
    }
}
