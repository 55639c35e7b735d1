//! Terminal surfaces held by the resource cache

/// A terminal emulation instance together with its helpers
///
/// `dispose` is only ever called by the resource cache, which owns every
/// surface it holds.
pub trait TerminalSurface: Send {
    /// Feed process output into the emulator
    fn write(&mut self, data: &[u8]);

    /// Resize the emulated screen
    fn resize(&mut self, cols: u16, rows: u16);

    /// Capture the screen as a replayable byte stream
    fn serialize(&self) -> String;

    /// Rows whose text contains `needle`
    fn search(&self, needle: &str) -> Vec<u16>;

    /// Release the emulator and detach it from its container
    fn dispose(&mut self);

    fn is_disposed(&self) -> bool;
}

/// Lines of scrollback kept by each emulator
const SCROLLBACK_LINES: usize = 1000;

/// Surface backed by a `vt100` parser
pub struct Vt100Surface {
    parser: Option<vt100::Parser>,
}

impl Vt100Surface {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            parser: Some(vt100::Parser::new(rows, cols, SCROLLBACK_LINES)),
        }
    }

    /// Create a surface and replay a previously serialized screen into it
    pub fn restored(cols: u16, rows: u16, snapshot: &str) -> Self {
        let mut surface = Self::new(cols, rows);
        surface.write(snapshot.as_bytes());
        surface
    }

    /// Plain text of the visible screen
    pub fn contents(&self) -> String {
        self.parser
            .as_ref()
            .map(|p| p.screen().contents())
            .unwrap_or_default()
    }
}

impl TerminalSurface for Vt100Surface {
    fn write(&mut self, data: &[u8]) {
        if let Some(parser) = self.parser.as_mut() {
            parser.process(data);
        }
    }

    fn resize(&mut self, cols: u16, rows: u16) {
        if let Some(parser) = self.parser.as_mut() {
            parser.set_size(rows, cols);
        }
    }

    fn serialize(&self) -> String {
        self.parser
            .as_ref()
            .map(|p| String::from_utf8_lossy(&p.screen().contents_formatted()).into_owned())
            .unwrap_or_default()
    }

    fn search(&self, needle: &str) -> Vec<u16> {
        if needle.is_empty() {
            return Vec::new();
        }
        self.contents()
            .lines()
            .enumerate()
            .filter(|(_, line)| line.contains(needle))
            .map(|(row, _)| row as u16)
            .collect()
    }

    fn dispose(&mut self) {
        self.parser = None;
    }

    fn is_disposed(&self) -> bool {
        self.parser.is_none()
    }
}
