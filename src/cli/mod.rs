pub mod ascii_preview;
pub mod terminal;

pub use ascii_preview::{clear_screen, is_quit_key, poll_key, AsciiRenderer};
pub use terminal::{RawTerminal, TerminalCaptureControl, TerminalDisplay};
