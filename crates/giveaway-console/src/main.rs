// Giveaway console entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, not terminal)
// 2. Load config
// 3. Create mpsc channels
// 4. Build the state machine and lookup client
// 5. Build the chat session (IRC)
// 6. Spawn the chat supervisor
// 7. Spawn the event pump
// 8. Spawn the update printer
// 9. Read operator commands from stdin until quit or Ctrl+C
// 10. Cleanup on exit

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use giveaway_app::app::{self, OrchestrationContext};
use giveaway_app::chat::ChatSession;
use giveaway_console::console::{self, CountdownFilter};
use giveaway_core::config;
use giveaway_core::irc::{IrcClient, IrcSettings};
use giveaway_core::machine::Orchestrator;
use giveaway_core::protocol::{Event, OperatorCommand, UiUpdate};
use giveaway_lookup::LookupClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing (log to file, not terminal)
    init_tracing()?;
    info!("Giveaway starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: channel=#{}, entry={:?}, prize mode={:?}",
        config.chat.channel, config.entry.mode, config.draw.prize_mode
    );

    // 3. Create mpsc channels
    let (events_tx, events_rx) = mpsc::channel(256);
    let (ui_tx, ui_rx) = mpsc::channel(256);

    // 4. State machine and lookup client
    let machine = Orchestrator::new(&config, StdRng::from_entropy());
    let lookup = LookupClient::from_config(&config).context("failed to build lookup client")?;
    match &lookup {
        LookupClient::Active(_) => info!("Profile lookup enabled"),
        LookupClient::Disabled => info!("Profile lookup disabled (no lookup URLs configured)"),
    }

    // 5. Chat session: IRC only, no primary feed in the console build
    let irc = IrcClient::new(IrcSettings::from_config(&config));
    let session = Arc::new(ChatSession::new(irc, None));

    // 6. Chat supervisor
    let supervisor = tokio::spawn(Arc::clone(&session).supervise(events_tx.clone()));

    // 7. Event pump
    let ctx = OrchestrationContext {
        config,
        events_tx: events_tx.clone(),
        ui_tx,
        chat: session.clone(),
        lookup,
    };
    let pump = tokio::spawn(async move {
        match app::run(events_rx, ctx, machine).await {
            Ok(machine) => info!(state = %machine.state(), "event pump finished"),
            Err(e) => error!("Event pump error: {:#}", e),
        }
    });

    // 8. Update printer
    let printer = tokio::spawn(print_updates(ui_rx, events_tx.clone()));

    // 9. Operator commands
    println!("{}", console::HELP);
    if let Err(e) = read_commands(events_tx).await {
        error!("Console input error: {:#}", e);
    }

    // 10. Cleanup: wait for the pump to flush (with timeout)
    if tokio::time::timeout(Duration::from_secs(5), pump).await.is_err() {
        warn!("event pump did not stop in time");
    }
    session.stop();
    supervisor.abort();
    printer.abort();

    info!("Giveaway shut down cleanly");
    Ok(())
}

/// Forward stdin commands to the pump until `quit`, Ctrl+C or end of input.
async fn read_commands(events_tx: mpsc::Sender<Event>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            events_tx
                .send(Event::Command(OperatorCommand::Shutdown))
                .await
                .context("event pump is gone")?;
            return Ok(());
        };
        match console::parse_command(&line) {
            Ok(None) => println!("{}", console::HELP),
            Ok(Some(cmd)) => {
                let quit = cmd == OperatorCommand::Shutdown;
                events_tx
                    .send(Event::Command(cmd))
                    .await
                    .context("event pump is gone")?;
                if quit {
                    return Ok(());
                }
            }
            Err(e) => println!("{e}"),
        }
    }
}

/// Print presentation updates. The console has no reveal animation, so a
/// revealed winner is acknowledged straight away.
async fn print_updates(mut ui_rx: mpsc::Receiver<UiUpdate>, events_tx: mpsc::Sender<Event>) {
    let mut countdown = CountdownFilter::default();
    while let Some(update) = ui_rx.recv().await {
        if let Some(text) = console::render_update(&update, &mut countdown) {
            println!("{text}");
        }
        if let UiUpdate::RevealWinner { winner, .. } = update {
            let finished = OperatorCommand::RevealFinished { winner };
            if events_tx.send(Event::Command(finished)).await.is_err() {
                break;
            }
        }
    }
}

/// Initialize tracing to log to a file so console output stays readable.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("giveaway.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("giveaway=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
