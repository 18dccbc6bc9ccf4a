//! DeltaFi - Drive the remote arbitrage agent from your terminal

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use deltafi_arbitrage::{
    amount,
    client::{AgentClient, HttpTransport},
    config::AppConfig,
    identity::Identity,
    lifecycle::{LifecycleController, StartConfig},
    poller::fetch_snapshot,
    snapshot::SnapshotParser,
    App, AppMessage,
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{
    fs::OpenOptions,
    io,
    sync::{Arc, Mutex},
};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "deltafi")]
#[command(about = "DeltaFi - Drive the remote arbitrage agent from your terminal")]
#[command(version)]
struct Cli {
    /// Compute unit URL
    #[arg(long, global = true)]
    cu_url: Option<String>,

    /// Message relay URL
    #[arg(long, global = true)]
    relay_url: Option<String>,

    /// Arbitrage agent process id
    #[arg(long, global = true)]
    agent: Option<String>,

    /// Registry process that maps wallets to their processes
    #[arg(long, global = true)]
    main_process: Option<String>,

    /// Your own (caller) process id, instead of looking it up
    #[arg(long, global = true)]
    caller: Option<String>,

    /// Wallet address
    #[arg(long, global = true)]
    wallet: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe the agent once and print its lifecycle state
    Status,
    /// Configure and start the agent
    Start {
        /// Input token symbol or address
        #[arg(long)]
        input: String,
        /// Target token symbol or address
        #[arg(long)]
        target: String,
        /// Maximum amount of the input token the agent may use
        #[arg(long)]
        allowance: String,
        /// Slippage tolerance in percent
        #[arg(long)]
        slippage: Option<String>,
        /// Minimum profit per trade, in input token units
        #[arg(long)]
        min_profit: Option<String>,
    },
    /// Stop the agent
    Stop,
    /// Fetch the agent's arbitrage data and print it
    Snapshot,
    /// Save the given endpoint and wallet flags as the new defaults
    Config,
}

impl Cli {
    /// Overrides apply to this run only unless saved with `config`.
    fn apply(&self, config: &mut AppConfig) {
        if let Some(url) = &self.cu_url {
            config.cu_url = url.clone();
        }
        if let Some(url) = &self.relay_url {
            config.relay_url = url.clone();
        }
        if let Some(agent) = &self.agent {
            config.agent_process_id = agent.clone();
        }
        if let Some(main_process) = &self.main_process {
            config.main_process_id = main_process.clone();
        }
        if let Some(wallet) = &self.wallet {
            config.wallet_address = Some(wallet.clone());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load()?;
    cli.apply(&mut config);
    let mut identity = Identity::from_config(&config);
    identity.caller_process_id = cli.caller.clone();

    let transport = HttpTransport::new(
        config.cu_url.clone(),
        config.relay_url.clone(),
        identity.wallet_address.clone(),
    );
    let client = AgentClient::new(Arc::new(transport), config.request_timeout());

    match cli.command {
        None => {
            init_file_logging()?;
            run_tui(config, identity, client).await
        }
        Some(command) => {
            init_stderr_logging();
            run_command(command, config, identity, client).await
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// The cockpit owns the terminal, so logs go to a file.
fn init_file_logging() -> Result<()> {
    let dir = AppConfig::dir();
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("deltafi.log");
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(io::stderr)
        .init();
}

async fn run_command(
    command: Command,
    config: AppConfig,
    mut identity: Identity,
    client: AgentClient,
) -> Result<()> {
    let parser = SnapshotParser::default();
    let mut lifecycle = LifecycleController::new(config.agent_process_id.clone());

    match command {
        Command::Status => {
            if !identity.is_connected() {
                bail!(
                    "no wallet connected; pass --wallet or set wallet_address in {}",
                    AppConfig::path().display()
                );
            }
            identity.discover_session(&client, &config.main_process_id).await?;
            let report = lifecycle.initialize(&client, &parser, &identity).await;
            println!("Agent {}: {}", lifecycle.agent_process_id(), lifecycle.state());
            if let Some(report) = report.filter(|r| r.enabled) {
                for line in report.transcript() {
                    println!("  {}", line);
                }
            }
        }
        Command::Start { input, target, allowance, slippage, min_profit } => {
            let registry = parser.registry();
            let min_profit_threshold_base_units = match min_profit {
                Some(value) => amount::parse_display(&value)?,
                None => config.default_min_profit_threshold,
            };
            let start = StartConfig {
                input_token: registry.resolve(&input).address,
                target_token: registry.resolve(&target).address,
                slippage_percent: slippage.unwrap_or_else(|| config.default_slippage.clone()),
                allowance_base_units: amount::parse_display(&allowance)?,
                min_profit_threshold_base_units,
                caller_process_id: None,
            };

            identity.discover_session(&client, &config.main_process_id).await?;
            lifecycle.initialize(&client, &parser, &identity).await;
            lifecycle.start(&client, &identity, start).await?;
            println!("Arbitrage bot started successfully!");
        }
        Command::Stop => {
            identity.discover_session(&client, &config.main_process_id).await?;
            lifecycle.initialize(&client, &parser, &identity).await;
            lifecycle.stop(&client, &identity).await?;
            println!("Arbitrage bot stopped successfully");
        }
        Command::Snapshot => {
            let parsed = fetch_snapshot(&client, &parser, &config.agent_process_id).await?;
            for line in parsed.transcript {
                println!("{}", line);
            }
        }
        Command::Config => {
            config.save()?;
            println!("Saved {}", AppConfig::path().display());
        }
    }
    Ok(())
}

async fn run_tui(config: AppConfig, identity: Identity, client: AgentClient) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Create message channel for async operations
    let (tx, mut rx) = mpsc::channel::<AppMessage>(32);

    let mut app = App::new(config, identity, client, tx.clone());

    // Probe whether the agent is already running
    app.init_session(tx.clone());

    let result = run_app(&mut terminal, &mut app, tx, &mut rx).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
    }

    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    tx: mpsc::Sender<AppMessage>,
    rx: &mut mpsc::Receiver<AppMessage>,
) -> Result<()> {
    loop {
        // Handle async messages
        while let Ok(msg) = rx.try_recv() {
            app.handle_message(msg).await?;
        }

        // Draw UI
        if app.needs_redraw() {
            terminal.draw(|f| app.render(f))?;
        }

        // Poll for events with timeout
        if event::poll(std::time::Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    // Global quit
                    if key.code == KeyCode::Char('q') && app.can_quit() {
                        return Ok(());
                    }

                    // Let app handle key
                    app.handle_key(key.code, tx.clone()).await?;
                }
            }
        }

        // Check if app wants to quit
        if app.should_quit() {
            return Ok(());
        }
    }
}
