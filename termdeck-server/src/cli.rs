//! Command-line arguments for the server daemon

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "termdeck-server", version, about = "termdeck PTY host")]
pub struct Args {
    /// Configuration file (defaults to the XDG config location)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Unix socket to listen on
    #[arg(short, long, value_name = "PATH", env = "TERMDECK_SOCKET")]
    pub socket: Option<PathBuf>,

    /// Also listen on a TCP address (e.g. 127.0.0.1:7878)
    #[arg(long, value_name = "ADDR")]
    pub tcp: Option<String>,

    /// Log to stderr instead of the log file
    #[arg(short, long)]
    pub foreground: bool,
}
