//! What to run in a new terminal

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Program, arguments and environment for one terminal process
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Inherit the server's cwd when unset
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub cols: u16,
    pub rows: u16,
    /// Append output to the terminal's capture log
    pub logging: bool,
}

/// `$SHELL`, or /bin/sh
pub fn default_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".into())
}

impl SpawnSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            cols: 80,
            rows: 24,
            logging: false,
        }
    }

    /// Split a command line such as `claude --resume` on whitespace
    ///
    /// Returns `None` for a blank line.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let program = words.next()?;
        let mut spec = Self::new(program);
        spec.args = words.map(str::to_string).collect();
        Some(spec)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn in_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(vars);
        self
    }

    pub fn size(mut self, cols: u16, rows: u16) -> Self {
        self.cols = cols;
        self.rows = rows;
        self
    }

    pub fn capture(mut self, logging: bool) -> Self {
        self.logging = logging;
        self
    }

    /// Program and arguments as one line, for logs
    pub fn display_command(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
