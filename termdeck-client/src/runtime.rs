//! Console runtime loop
//!
//! One task owns the [`Console`] and is its only mutation path. Server
//! events, the persistence debounce, the auto-archive interval, reconnect
//! timers, user commands and shutdown are multiplexed with `select!`.

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use termdeck_protocol::{ClientMessage, GroupId, PaneId, SessionId, TerminalId};
use termdeck_utils::{Result, TermdeckError};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::archive::{ArchiveThreshold, SettingsSource, CHECK_INTERVAL, INITIAL_CHECK_DELAY};
use crate::console::{Console, NewSession};
use crate::layout::{MovePosition, Orientation};
use crate::registry::SessionKind;
use crate::sync::{Backoff, Connection, ConnectionEvent, MessageSender};

/// Keepalive spacing while connected
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// A request from the user to the running console
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    NewSession { kind: SessionKind, label: Option<String> },
    Split { kind: SessionKind, orientation: Orientation },
    ClosePane(PaneId),
    FocusPane(PaneId),
    SwapPanes(PaneId, PaneId),
    MovePane { source: PaneId, target: PaneId, position: MovePosition },
    ResizeSplit { split: PaneId, ratio: f32 },
    ToggleZoom(PaneId),
    SwitchSession(SessionId),
    CreateGroup(String),
    RenameGroup(GroupId, String),
    SwitchGroup(GroupId),
    ArchiveSession(SessionId),
    ArchiveGroup(GroupId),
    Restore(SessionId),
    Input { terminal_id: TerminalId, data: Vec<u8> },
    Resize { terminal_id: TerminalId, cols: u16, rows: u16 },
    Grid,
    ClearAll,
    Quit,
}

fn parse_id(word: Option<&str>) -> Result<Uuid> {
    let word = word.ok_or_else(|| TermdeckError::InvalidMessage("missing id".into()))?;
    Uuid::parse_str(word)
        .map_err(|e| TermdeckError::InvalidMessage(format!("invalid id '{}': {}", word, e)))
}

fn parse_kind(word: Option<&str>) -> Result<SessionKind> {
    match word {
        None | Some("assistant") | Some("claude") => Ok(SessionKind::ClaudeLike),
        Some("shell") => Ok(SessionKind::Shell),
        Some(other) => Err(TermdeckError::InvalidMessage(format!(
            "unknown session kind '{}'",
            other
        ))),
    }
}

impl FromStr for ConsoleCommand {
    type Err = TermdeckError;

    /// Parse one line of the interactive command language
    ///
    /// `new [shell|assistant] [label]`, `split [h|v] [shell|assistant]`,
    /// `close <pane>`, `focus <pane>`, `swap <pane> <pane>`,
    /// `move <pane> <target> left|right|top|bottom`, `ratio <split> <0..1>`,
    /// `zoom <pane>`, `switch <session>`, `group <label>`,
    /// `rename-group <group> <label>`, `switch-group <group>`,
    /// `archive <session>`, `archive-group <group>`, `restore <session>`,
    /// `send <terminal> <text>`, `resize <terminal> <cols> <rows>`, `grid`,
    /// `clear`, `quit`.
    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim();
        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        let mut words = rest.split_whitespace();

        let command = match verb {
            "new" => {
                let kind = parse_kind(words.next())?;
                let label: Vec<&str> = words.collect();
                ConsoleCommand::NewSession {
                    kind,
                    label: (!label.is_empty()).then(|| label.join(" ")),
                }
            }
            "split" => {
                let orientation = match words.next() {
                    None | Some("h") => Orientation::Horizontal,
                    Some("v") => Orientation::Vertical,
                    Some(other) => {
                        return Err(TermdeckError::InvalidMessage(format!(
                            "unknown orientation '{}'",
                            other
                        )))
                    }
                };
                ConsoleCommand::Split {
                    kind: parse_kind(words.next())?,
                    orientation,
                }
            }
            "close" => ConsoleCommand::ClosePane(parse_id(words.next())?),
            "focus" => ConsoleCommand::FocusPane(parse_id(words.next())?),
            "swap" => ConsoleCommand::SwapPanes(parse_id(words.next())?, parse_id(words.next())?),
            "move" => {
                let source = parse_id(words.next())?;
                let target = parse_id(words.next())?;
                let position = match words.next() {
                    Some("left") => MovePosition::Left,
                    Some("right") => MovePosition::Right,
                    Some("top") => MovePosition::Top,
                    Some("bottom") => MovePosition::Bottom,
                    other => {
                        return Err(TermdeckError::InvalidMessage(format!(
                            "invalid position {:?}",
                            other
                        )))
                    }
                };
                ConsoleCommand::MovePane {
                    source,
                    target,
                    position,
                }
            }
            "ratio" => {
                let split = parse_id(words.next())?;
                let ratio = words
                    .next()
                    .and_then(|w| w.parse::<f32>().ok())
                    .filter(|r| *r > 0.0 && *r < 1.0)
                    .ok_or_else(|| TermdeckError::InvalidMessage("ratio must be in (0, 1)".into()))?;
                ConsoleCommand::ResizeSplit { split, ratio }
            }
            "zoom" => ConsoleCommand::ToggleZoom(parse_id(words.next())?),
            "switch" => ConsoleCommand::SwitchSession(parse_id(words.next())?),
            "group" if !rest.is_empty() => ConsoleCommand::CreateGroup(rest.to_string()),
            "rename-group" => {
                let group = parse_id(words.next())?;
                let label: Vec<&str> = words.collect();
                if label.is_empty() {
                    return Err(TermdeckError::InvalidMessage("missing label".into()));
                }
                ConsoleCommand::RenameGroup(group, label.join(" "))
            }
            "switch-group" => ConsoleCommand::SwitchGroup(parse_id(words.next())?),
            "archive" => ConsoleCommand::ArchiveSession(parse_id(words.next())?),
            "archive-group" => ConsoleCommand::ArchiveGroup(parse_id(words.next())?),
            "restore" => ConsoleCommand::Restore(parse_id(words.next())?),
            "send" => {
                let terminal_id = parse_id(words.next())?;
                let text = rest.split_once(' ').map(|(_, t)| t).unwrap_or("");
                ConsoleCommand::Input {
                    terminal_id,
                    data: format!("{}\r", text).into_bytes(),
                }
            }
            "resize" => {
                let terminal_id = parse_id(words.next())?;
                let mut dim = || -> Result<u16> {
                    words
                        .next()
                        .and_then(|w| w.parse().ok())
                        .ok_or_else(|| TermdeckError::InvalidMessage("invalid size".into()))
                };
                let cols = dim()?;
                let rows = dim()?;
                ConsoleCommand::Resize {
                    terminal_id,
                    cols,
                    rows,
                }
            }
            "grid" => ConsoleCommand::Grid,
            "clear" => ConsoleCommand::ClearAll,
            "quit" | "exit" => ConsoleCommand::Quit,
            _ => {
                return Err(TermdeckError::InvalidMessage(format!(
                    "unknown command '{}'",
                    line
                )))
            }
        };
        Ok(command)
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Owner of the console for a long-lived client
pub struct ConsoleRuntime {
    console: Console,
    connection: Connection,
    settings: Arc<dyn SettingsSource>,
    threshold: ArchiveThreshold,
    backoff: Backoff,
    cancel: CancellationToken,
}

impl ConsoleRuntime {
    pub fn new(
        console: Console,
        connection: Connection,
        settings: Arc<dyn SettingsSource>,
        initial_archive_days: u32,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            console,
            connection,
            settings,
            threshold: ArchiveThreshold::new(initial_archive_days),
            backoff: Backoff::new(),
            cancel,
        }
    }

    /// Run until cancelled or told to quit; returns the console
    ///
    /// State is flushed to disk before returning.
    pub async fn run(mut self, mut commands: mpsc::Receiver<ConsoleCommand>) -> Console {
        let (event_tx, mut event_rx) = mpsc::channel::<ConnectionEvent>(256);
        let mut reconnect_at = self.connect(&event_tx).await;

        let mut archive_timer =
            tokio::time::interval_at(Instant::now() + INITIAL_CHECK_DELAY, CHECK_INTERVAL);
        archive_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ping_timer = tokio::time::interval_at(Instant::now() + PING_INTERVAL, PING_INTERVAL);
        ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let persist_deadline = self.console.persist_deadline();

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Console runtime cancelled");
                    break;
                }

                Some(event) = event_rx.recv() => match event {
                    ConnectionEvent::Message(tagged) => self.console.apply_event(tagged),
                    ConnectionEvent::Closed { epoch } if epoch == self.console.epoch() => {
                        let delay = self.backoff.next_delay();
                        warn!(epoch, ?delay, "Connection lost, reconnecting");
                        self.connection.set_reconnecting();
                        reconnect_at = Some(Instant::now() + delay);
                    }
                    ConnectionEvent::Closed { epoch } => {
                        debug!(epoch, "Superseded connection closed");
                    }
                },

                _ = sleep_until(persist_deadline) => {
                    if let Err(e) = self.console.flush_if_due(Instant::now()) {
                        warn!("Failed to persist console state: {}", e);
                    }
                }

                _ = sleep_until(reconnect_at) => {
                    reconnect_at = self.connect(&event_tx).await;
                }

                _ = archive_timer.tick() => {
                    let days = self.threshold.refresh(self.settings.as_ref()).await;
                    self.console.run_archive_check(days, Utc::now()).await;
                }

                _ = ping_timer.tick() => {
                    if let Some(sender) = self.connection.sender() {
                        sender.send_nowait(ClientMessage::Ping);
                    }
                }

                command = commands.recv() => match command {
                    None | Some(ConsoleCommand::Quit) => {
                        info!("Console runtime stopping");
                        break;
                    }
                    Some(command) => {
                        if let Err(e) = self.handle_command(command).await {
                            warn!("Command failed: {}", e);
                        }
                    }
                },
            }

            self.drain_outbox().await;
            self.send_heartbeats();
        }

        self.drain_outbox().await;
        if let Err(e) = self.console.flush_now() {
            warn!("Failed to persist console state on shutdown: {}", e);
        }
        self.connection.close().await;
        self.console
    }

    /// Attempt a connection; returns when to retry on failure
    ///
    /// Errors that cannot heal by waiting leave the console offline with its
    /// outbox intact.
    async fn connect(&mut self, events: &mpsc::Sender<ConnectionEvent>) -> Option<Instant> {
        let epoch = self.console.begin_connection();
        match self.connection.connect(epoch, events.clone()).await {
            Ok(()) => {
                self.backoff.reset();
                None
            }
            Err(e) if !e.is_retryable() => {
                error!(
                    "Cannot connect to {}, staying offline: {}",
                    self.connection.addr(),
                    e
                );
                self.connection.disconnect().await;
                None
            }
            Err(e) => {
                let delay = self.backoff.next_delay();
                warn!(
                    attempt = self.backoff.attempts(),
                    ?delay,
                    "Failed to connect to {}: {}",
                    self.connection.addr(),
                    e
                );
                self.connection.set_reconnecting();
                Some(Instant::now() + delay)
            }
        }
    }

    /// Send queued messages while connected; otherwise they wait for replay
    async fn drain_outbox(&mut self) {
        if !self.connection.is_connected() {
            return;
        }
        let Some(sender) = self.connection.sender() else {
            return;
        };
        if let Err(e) = send_outbox(&mut self.console, &sender).await {
            warn!(
                unsent = self.console.outbox_len(),
                "Failed to send, keeping for the next connection: {}",
                e
            );
        }
    }

    fn send_heartbeats(&mut self) {
        let session_ids = self.console.take_heartbeats();
        if session_ids.is_empty() {
            return;
        }
        let archive = self.console.archive_store();
        tokio::spawn(async move {
            if let Err(e) = archive.heartbeat(session_ids, Utc::now()).await {
                debug!("Activity heartbeat failed: {}", e);
            }
        });
    }

    async fn handle_command(&mut self, command: ConsoleCommand) -> Result<()> {
        match command {
            ConsoleCommand::NewSession { kind, label } => {
                let mut request = NewSession::new(kind);
                request.label = label;
                let session_id = self.console.create_session(request)?;
                info!(%session_id, "Session created");
            }
            ConsoleCommand::Split { kind, orientation } => {
                let mut request = NewSession::new(kind);
                request.orientation = orientation;
                self.console.create_session(request)?;
            }
            ConsoleCommand::ClosePane(pane_id) => {
                self.console.close_pane(pane_id)?;
            }
            ConsoleCommand::FocusPane(pane_id) => self.console.focus_pane(pane_id)?,
            ConsoleCommand::SwapPanes(a, b) => {
                self.console.swap_panes(a, b)?;
            }
            ConsoleCommand::MovePane {
                source,
                target,
                position,
            } => {
                if !self.console.move_pane(source, target, position)? {
                    warn!(%source, %target, "Pane cannot be moved there");
                }
            }
            ConsoleCommand::ResizeSplit { split, ratio } => {
                self.console.resize_split(split, ratio)?;
            }
            ConsoleCommand::ToggleZoom(pane_id) => {
                self.console.toggle_zoom(pane_id)?;
            }
            ConsoleCommand::SwitchSession(session_id) => self.console.switch_session(session_id)?,
            ConsoleCommand::CreateGroup(label) => {
                self.console.create_group(&label);
            }
            ConsoleCommand::RenameGroup(group_id, label) => {
                self.console.rename_group(group_id, label)?
            }
            ConsoleCommand::SwitchGroup(group_id) => {
                self.console.switch_group(group_id)?;
            }
            ConsoleCommand::ArchiveSession(session_id) => {
                self.console.archive_session(session_id).await?
            }
            ConsoleCommand::ArchiveGroup(group_id) => {
                self.console.archive_group(group_id).await?;
            }
            ConsoleCommand::Restore(session_id) => {
                self.console.restore_session(session_id).await?;
            }
            ConsoleCommand::Input { terminal_id, data } => {
                self.console.send_input(terminal_id, data)?
            }
            ConsoleCommand::Resize {
                terminal_id,
                cols,
                rows,
            } => self.console.resize_terminal(terminal_id, cols, rows)?,
            ConsoleCommand::Grid => {
                self.console.arrange_grid()?;
            }
            ConsoleCommand::ClearAll => self.console.clear_all_sessions()?,
            ConsoleCommand::Quit => {}
        }
        Ok(())
    }
}

/// Connection attempts one-shot delivery makes before giving up
const DELIVERY_ATTEMPTS: u32 = 3;

/// Deliver a one-shot command's messages on a short-lived connection
///
/// Only the handshake and the messages the command queued are sent; no
/// replay happens. Transient connect failures are retried with backoff.
/// If no connection can be made the messages stay queued in the console.
pub async fn deliver_once(console: &mut Console, connection: &mut Connection) -> Result<usize> {
    if console.outbox_len() == 0 {
        return Ok(0);
    }
    let (events, _events_rx) = mpsc::channel(16);
    let mut backoff = Backoff::new();
    loop {
        match connection.connect(console.epoch(), events.clone()).await {
            Ok(()) => break,
            Err(e) if e.is_retryable() && backoff.attempts() + 1 < DELIVERY_ATTEMPTS => {
                let delay = backoff.next_delay();
                debug!(?delay, "Server not reachable yet, retrying: {}", e);
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                warn!(
                    unsent = console.outbox_len(),
                    "Could not deliver command to {}: {}",
                    connection.addr(),
                    e
                );
                return Err(e);
            }
        }
    }

    let sender = connection
        .sender()
        .ok_or_else(|| TermdeckError::connection("Not connected"))?;
    let handshake = ClientMessage::Connect {
        client_id: console.options().client_id,
        protocol_version: termdeck_protocol::PROTOCOL_VERSION,
    };
    let result = match sender.send(handshake).await {
        Ok(()) => send_outbox(console, &sender).await,
        Err(e) => Err(e),
    };
    drop(sender);
    connection.close().await;
    result
}

/// Send the outbox in order; whatever was not sent goes back to the front
async fn send_outbox(console: &mut Console, sender: &MessageSender) -> Result<usize> {
    let mut pending = VecDeque::from(console.take_outbox());
    let mut sent = 0;
    while let Some(message) = pending.pop_front() {
        if let Err(e) = sender.send(message.clone()).await {
            pending.push_front(message);
            console.requeue_front(pending.into());
            return Err(e);
        }
        sent += 1;
    }
    Ok(sent)
}
