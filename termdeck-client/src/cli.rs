//! Command-line argument parsing for the termdeck client

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use termdeck_protocol::{GroupId, PaneId, SessionId};

use crate::layout::Orientation;
use crate::registry::SessionKind;

/// termdeck - multi-session terminal console
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Server address (socket path, unix://path, tcp://host:port or a
    /// remote alias from the config)
    #[arg(long, env = "TERMDECK_ADDR")]
    pub addr: Option<String>,

    /// Fail instead of starting the server when it is not running
    #[arg(long, default_value_t = false)]
    pub no_auto_start: bool,

    /// Server startup timeout in milliseconds
    #[arg(long, default_value_t = 2000)]
    pub server_timeout: u64,

    /// Client configuration file
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Assistant,
    Shell,
}

impl From<KindArg> for SessionKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Assistant => SessionKind::ClaudeLike,
            KindArg::Shell => SessionKind::Shell,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SplitArg {
    /// Side by side
    H,
    /// Stacked
    V,
}

impl From<SplitArg> for Orientation {
    fn from(split: SplitArg) -> Self {
        match split {
            SplitArg::H => Orientation::Horizontal,
            SplitArg::V => Orientation::Vertical,
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the console, reading commands from stdin (default)
    Run,
    /// Create a session
    New {
        #[arg(value_enum, default_value_t = KindArg::Assistant)]
        kind: KindArg,
        #[arg(long, short = 'l')]
        label: Option<String>,
        /// Group to place the session in
        #[arg(long, short = 'g')]
        group: Option<GroupId>,
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Command for an assistant session
        #[arg(long)]
        command: Option<String>,
    },
    /// Split the focused pane with a new session
    Split {
        #[arg(value_enum, default_value_t = SplitArg::H)]
        direction: SplitArg,
        #[arg(long, value_enum, default_value_t = KindArg::Shell)]
        kind: KindArg,
    },
    /// List groups and sessions
    List,
    /// Close a pane and its terminal
    Close { pane: PaneId },
    /// Create a group
    Group { label: String },
    /// Rename a group
    RenameGroup { group: GroupId, label: String },
    /// Make a group active
    SwitchGroup { group: GroupId },
    /// Archive an idle session
    Archive { session: SessionId },
    /// Archive a group and all of its sessions
    ArchiveGroup { group: GroupId },
    /// List archived sessions
    Archived,
    /// Bring an archived session back
    Restore { session: SessionId },
    /// Close every terminal and forget all sessions and groups
    Clear,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn auto_start_enabled(&self) -> bool {
        !self.no_auto_start
    }

    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_default_args() {
        let args = Args::parse_from(["termdeck"]);
        assert!(args.auto_start_enabled());
        assert_eq!(args.server_timeout, 2000);
        assert!(args.addr.is_none());
        assert_eq!(args.command(), Command::Run);
    }

    #[test]
    fn test_no_auto_start_and_addr() {
        let args = Args::parse_from(["termdeck", "--no-auto-start", "--addr", "tcp://h:1", "list"]);
        assert!(!args.auto_start_enabled());
        assert_eq!(args.addr.as_deref(), Some("tcp://h:1"));
        assert_eq!(args.command(), Command::List);
    }

    #[test]
    fn test_new_session_args() {
        let group = Uuid::new_v4();
        let args = Args::parse_from([
            "termdeck",
            "new",
            "shell",
            "--label",
            "build",
            "--group",
            &group.to_string(),
        ]);
        match args.command() {
            Command::New {
                kind,
                label,
                group: g,
                ..
            } => {
                assert_eq!(SessionKind::from(kind), SessionKind::Shell);
                assert_eq!(label.as_deref(), Some("build"));
                assert_eq!(g, Some(group));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_split_defaults() {
        let args = Args::parse_from(["termdeck", "split", "v"]);
        assert_eq!(
            args.command(),
            Command::Split {
                direction: SplitArg::V,
                kind: KindArg::Shell
            }
        );
        assert_eq!(Orientation::from(SplitArg::V), Orientation::Vertical);
    }

    #[test]
    fn test_rejects_bad_ids() {
        assert!(Args::try_parse_from(["termdeck", "close", "pane-1"]).is_err());
        assert!(Args::try_parse_from(["termdeck", "restore"]).is_err());
    }
}
