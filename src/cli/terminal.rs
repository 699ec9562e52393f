use super::ascii_preview::{clear_screen, is_quit_key, poll_key, AsciiRenderer, Overlay};
use crate::core::detector::FaceBox;
use crate::core::enrollment::{CaptureCommand, CaptureControl};
use crate::core::pipeline::RecognitionResult;
use crate::core::recognition::{DisplaySink, DisplayState};
use crossterm::{cursor, event::KeyCode, style::Print, terminal};
use image::DynamicImage;
use std::io::{self, Write};

/// Raw mode with a hidden cursor for as long as it lives.
pub struct RawTerminal;

impl RawTerminal {
    pub fn enter() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        crossterm::execute!(io::stdout(), cursor::Hide)?;
        clear_screen()?;
        Ok(Self)
    }
}

impl Drop for RawTerminal {
    fn drop(&mut self) {
        crossterm::execute!(io::stdout(), cursor::Show).ok();
        terminal::disable_raw_mode().ok();
        println!();
    }
}

const STATUS_WIDTH: usize = 48;
const STATUS_LINES: usize = 4;

fn status_row(renderer: &AsciiRenderer, line: usize) -> u16 {
    (renderer.height() + 1 + line) as u16
}

/// The error line sits below every status line so frames never overwrite it.
fn error_row(renderer: &AsciiRenderer) -> u16 {
    status_row(renderer, STATUS_LINES + 1)
}

/// Single padded line; raw mode does not return the carriage on `\n`.
fn error_line(message: &str) -> String {
    let flat: String = message.chars().map(|c| if c == '\n' || c == '\r' { ' ' } else { c }).collect();
    format!("{:<width$}", format!("Error: {}", flat), width = STATUS_WIDTH)
}

fn draw(renderer: &AsciiRenderer, ascii: &str, status: &[String]) {
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, cursor::MoveTo(0, 0), Print(ascii)).ok();
    for (i, line) in status.iter().enumerate() {
        let text = format!("{:<width$}", line, width = STATUS_WIDTH);
        crossterm::execute!(stdout, cursor::MoveTo(0, status_row(renderer, i)), Print(text)).ok();
    }
    stdout.flush().ok();
}

/// Live recognition view: ASCII video plus name, role and access lines.
pub struct TerminalDisplay {
    renderer: AsciiRenderer,
}

impl TerminalDisplay {
    pub fn new(renderer: AsciiRenderer) -> Self {
        Self { renderer }
    }
}

impl DisplaySink for TerminalDisplay {
    fn show_frame(&mut self, frame: &DynamicImage, results: &[RecognitionResult], state: &DisplayState) {
        let overlays: Vec<Overlay<'_>> = results
            .iter()
            .map(|r| Overlay { face: &r.bounding_box, caption: Some(r.identity.label()) })
            .collect();
        let ascii = self.renderer.render_frame(frame, &overlays);

        draw(
            &self.renderer,
            &ascii,
            &[
                format!("Name:   {}", state.name),
                format!("Role:   {}", state.role),
                format!("Access: {}", state.access),
                "Press q or ESC to stop".to_string(),
            ],
        );
    }

    fn clear(&mut self) {
        clear_screen().ok();
    }

    fn show_error(&mut self, message: &str) {
        let mut stdout = io::stdout();
        crossterm::execute!(stdout, cursor::MoveTo(0, error_row(&self.renderer)), Print(error_line(message))).ok();
        stdout.flush().ok();
    }
}

/// Capture preview. `s` saves (manual mode), `q`/ESC cancels.
pub struct TerminalCaptureControl {
    renderer: AsciiRenderer,
    hint: &'static str,
}

impl TerminalCaptureControl {
    pub fn new(renderer: AsciiRenderer, manual: bool) -> Self {
        let hint = if manual {
            "Press s to save the photo, q or ESC to cancel"
        } else {
            "Look at the camera; q or ESC to cancel"
        };
        Self { renderer, hint }
    }
}

impl CaptureControl for TerminalCaptureControl {
    fn poll(&mut self, frame: &DynamicImage, faces: &[FaceBox]) -> CaptureCommand {
        let overlays: Vec<Overlay<'_>> = faces.iter().take(1).map(|face| Overlay { face, caption: None }).collect();
        let ascii = self.renderer.render_frame(frame, &overlays);
        let detected = if faces.is_empty() { "No face detected" } else { "Face detected" };
        draw(&self.renderer, &ascii, &[detected.to_string(), self.hint.to_string()]);

        match poll_key() {
            Ok(Some(code)) if is_quit_key(code) => CaptureCommand::Cancel,
            Ok(Some(KeyCode::Char('s'))) | Ok(Some(KeyCode::Char('S'))) => CaptureCommand::Save,
            Ok(_) => CaptureCommand::Continue,
            Err(e) => {
                tracing::warn!("Failed to read key: {}", e);
                CaptureCommand::Continue
            }
        }
    }
}
