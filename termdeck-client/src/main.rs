//! termdeck client
//!
//! `termdeck run` owns the console for as long as it runs and takes
//! commands on stdin. Every other subcommand loads the persisted state,
//! applies one change, saves it and delivers the resulting messages.

use std::sync::Arc;

use termdeck_client::archive::{
    ArchiveStore, HttpArchiveStore, HttpSettingsSource, MemoryArchiveStore, SettingsSource,
    StaticSettings,
};
use termdeck_client::auto_start::{ensure_server_running, AutoStartConfig, ServerStartResult};
use termdeck_client::cache::CacheLimits;
use termdeck_client::cli::{Args, Command};
use termdeck_client::config::{ClientConfig, ConfigLoader};
use termdeck_client::persistence::StateStore;
use termdeck_client::sync::{Connection, ServerAddr};
use termdeck_client::{deliver_once, Console, ConsoleCommand, ConsoleOptions, ConsoleRuntime, NewSession};
use termdeck_utils::{init_logging_with_config, LogConfig, Result, TermdeckError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    init_logging_with_config(LogConfig::client())?;
    tracing::info!("termdeck client starting");
    tracing::debug!("CLI args: {:?}", args);

    match run_app(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::error!("termdeck client error: {}", e);
            eprintln!("Error: {}", e);
            Err(e)
        }
    }
}

fn server_addr(args: &Args, config: &ClientConfig) -> Result<ServerAddr> {
    match args.addr.as_deref().or(config.addr.as_deref()) {
        Some(addr) => ServerAddr::parse(config.resolve_addr(addr)),
        None => Ok(ServerAddr::default_unix()),
    }
}

fn archive_store(config: &ClientConfig) -> Arc<dyn ArchiveStore> {
    match &config.api_base_url {
        Some(base) => Arc::new(HttpArchiveStore::new(base.clone())),
        None => Arc::new(MemoryArchiveStore::new()),
    }
}

fn settings_source(config: &ClientConfig) -> Arc<dyn SettingsSource> {
    match &config.api_base_url {
        Some(base) => Arc::new(HttpSettingsSource::new(base)),
        None => Arc::new(StaticSettings {
            auto_archive_days: config.auto_archive_days,
        }),
    }
}

async fn require_server(args: &Args, config: &ClientConfig, addr: &ServerAddr) -> Result<()> {
    let auto_start = AutoStartConfig {
        enabled: args.auto_start_enabled() && config.auto_start,
        timeout_ms: args.server_timeout,
        ..Default::default()
    };

    match ensure_server_running(addr, &auto_start).await? {
        ServerStartResult::AlreadyRunning => tracing::info!("Server already running"),
        ServerStartResult::Started => tracing::info!("Server started automatically"),
        ServerStartResult::NotRunning => {
            if let ServerAddr::Unix(path) = addr {
                return Err(TermdeckError::ServerNotRunning { path: path.clone() });
            }
        }
    }
    Ok(())
}

async fn run_app(args: Args) -> Result<()> {
    let config = ConfigLoader::load_and_validate(args.config.as_deref())?;
    let addr = server_addr(&args, &config)?;

    let mut console = Console::load(
        ConsoleOptions::from_config(&config),
        StateStore::new(config.state_dir()),
        archive_store(&config),
        CacheLimits::from(&config.cache),
    );

    match args.command() {
        Command::Run => {
            require_server(&args, &config, &addr).await?;
            return run_console(console, &config, addr).await;
        }
        Command::List => {
            print_sessions(&console);
            return Ok(());
        }
        Command::Archived => {
            for record in console.list_archived().await? {
                println!(
                    "{}  {:<12} {}  (archived {})",
                    record.session_id,
                    record.kind,
                    record.label,
                    record.archived_at.format("%Y-%m-%d %H:%M")
                );
            }
            return Ok(());
        }
        Command::New {
            kind,
            label,
            group,
            cwd,
            command,
        } => {
            let mut request = NewSession::new(kind.into());
            request.label = label;
            request.group = group;
            request.cwd = cwd;
            request.command = command;
            let session_id = console.create_session(request)?;
            println!("{}", session_id);
        }
        Command::Split { direction, kind } => {
            let mut request = NewSession::new(kind.into());
            request.orientation = direction.into();
            let session_id = console.create_session(request)?;
            println!("{}", session_id);
        }
        Command::Close { pane } => {
            console.close_pane(pane)?;
        }
        Command::Group { label } => {
            println!("{}", console.create_group(&label));
        }
        Command::RenameGroup { group, label } => console.rename_group(group, label)?,
        Command::SwitchGroup { group } => {
            console.switch_group(group)?;
        }
        Command::Archive { session } => console.archive_session(session).await?,
        Command::ArchiveGroup { group } => {
            let archived = console.archive_group(group).await?;
            println!("Archived {} sessions", archived);
        }
        Command::Restore { session } => {
            println!("{}", console.restore_session(session).await?);
        }
        Command::Clear => console.clear_all_sessions()?,
    }

    console.flush_now()?;
    require_server(&args, &config, &addr).await?;
    let mut connection = Connection::new(addr);
    let sent = deliver_once(&mut console, &mut connection).await?;
    tracing::debug!(sent, "One-shot command delivered");
    Ok(())
}

fn print_sessions(console: &Console) {
    let registry = console.registry();
    let active_group = registry.active_group();
    for group in registry.groups_sorted() {
        let marker = if Some(group.id) == active_group { "*" } else { " " };
        println!("{} {}  {}", marker, group.id, group.label);
        for session in registry.sessions_in_group(group.id) {
            println!(
                "    {}  {:<12} {:<7} {}",
                session.id,
                session.kind,
                format!("{:?}", session.status).to_lowercase(),
                session.label
            );
        }
    }
    let ungrouped: Vec<_> = registry
        .sessions_sorted()
        .into_iter()
        .filter(|s| s.group_id.is_none())
        .collect();
    if !ungrouped.is_empty() {
        println!("  (no group)");
        for session in ungrouped {
            println!("    {}  {:<12} {}", session.id, session.kind, session.label);
        }
    }
}

async fn run_console(console: Console, config: &ClientConfig, addr: ServerAddr) -> Result<()> {
    let cancel = CancellationToken::new();
    let runtime = ConsoleRuntime::new(
        console,
        Connection::new(addr),
        settings_source(config),
        config.auto_archive_days,
        cancel.clone(),
    );

    let (tx, rx) = mpsc::channel(32);
    let input = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<ConsoleCommand>() {
                Ok(command) => {
                    let quit = command == ConsoleCommand::Quit;
                    if tx.send(command).await.is_err() || quit {
                        break;
                    }
                }
                Err(e) => eprintln!("{}", e),
            }
        }
    });

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_cancel.cancel();
        }
    });

    let console = runtime.run(rx).await;
    input.abort();
    tracing::info!(
        "Console stopped with {} sessions in {} groups",
        console.registry().session_count(),
        console.registry().group_count()
    );
    Ok(())
}
