use crate::core::detector::FaceBox;
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{self, ClearType},
};
use image::DynamicImage;
use std::io::{self, Write};
use std::time::Duration;

const ASCII_RAMP: &str = " .·:;+=xX#@";
const DEFAULT_WIDTH: usize = 80;
const DEFAULT_HEIGHT: usize = 30;

/// A face box to draw, with an optional caption above it.
pub struct Overlay<'a> {
    pub face: &'a FaceBox,
    pub caption: Option<&'a str>,
}

pub struct AsciiRenderer {
    width: usize,
    height: usize,
}

impl AsciiRenderer {
    pub fn new(width: Option<usize>, height: Option<usize>) -> Self {
        let (term_width, term_height) = terminal::size()
            .map(|(w, h)| (w as usize, h as usize))
            .unwrap_or((DEFAULT_WIDTH, DEFAULT_HEIGHT));

        // Half resolution keeps redraws cheap
        Self {
            width: width.unwrap_or((term_width / 2).min(DEFAULT_WIDTH / 2)).max(1),
            height: height.unwrap_or((term_height.saturating_sub(6) / 2).min(DEFAULT_HEIGHT / 2)).max(1),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn render_frame(&self, image: &DynamicImage, overlays: &[Overlay<'_>]) -> String {
        let mut grid = self.image_to_ascii(image);
        let (img_width, img_height) = (image.width() as f32, image.height() as f32);

        for overlay in overlays {
            self.draw_face_box(&mut grid, overlay.face, img_width, img_height);

            if let Some(caption) = overlay.caption {
                let x1 = ((overlay.face.x1 / img_width) * self.width as f32) as usize;
                let x2 = ((overlay.face.x2 / img_width) * self.width as f32) as usize;
                let y1 = ((overlay.face.y1 / img_height) * self.height as f32) as usize;
                if y1 > 0 {
                    self.overlay_text(&mut grid, caption, (x1 + x2) / 2, y1 - 1);
                }
            }
        }

        self.grid_to_string(&grid)
    }

    fn image_to_ascii(&self, image: &DynamicImage) -> Vec<Vec<char>> {
        let mut grid = vec![vec![' '; self.width]; self.height];
        let ramp: Vec<char> = ASCII_RAMP.chars().collect();

        let gray = image.to_luma8();
        let (img_width, img_height) = gray.dimensions();

        for (term_y, row) in grid.iter_mut().enumerate() {
            for (term_x, cell) in row.iter_mut().enumerate() {
                let img_x = (term_x as f32 / self.width as f32 * img_width as f32) as u32;
                let img_y = (term_y as f32 / self.height as f32 * img_height as f32) as u32;

                if img_x < img_width && img_y < img_height {
                    let brightness = gray.get_pixel(img_x, img_y)[0] as usize;
                    *cell = ramp[brightness * (ramp.len() - 1) / 255];
                }
            }
        }

        grid
    }

    fn overlay_text(&self, grid: &mut [Vec<char>], text: &str, center_x: usize, y: usize) {
        if y >= self.height {
            return;
        }

        let start_x = center_x.saturating_sub(text.chars().count() / 2);
        for (i, ch) in text.chars().enumerate() {
            let x = start_x + i;
            if x < self.width {
                grid[y][x] = ch;
            }
        }
    }

    fn draw_face_box(&self, grid: &mut [Vec<char>], face: &FaceBox, img_width: f32, img_height: f32) {
        let scale = |v: f32, extent: f32, cells: usize| ((v / extent) * cells as f32) as usize;
        let x1 = scale(face.x1, img_width, self.width).min(self.width - 1);
        let x2 = scale(face.x2, img_width, self.width).saturating_sub(1).min(self.width - 1);
        let y1 = scale(face.y1, img_height, self.height).min(self.height - 1);
        let y2 = scale(face.y2, img_height, self.height).saturating_sub(1).min(self.height - 1);
        if x2 <= x1 || y2 <= y1 {
            return;
        }

        for x in (x1 + 1)..x2 {
            grid[y1][x] = '─';
            grid[y2][x] = '─';
        }
        for row in grid.iter_mut().take(y2).skip(y1 + 1) {
            row[x1] = '│';
            row[x2] = '│';
        }

        grid[y1][x1] = '┌';
        grid[y1][x2] = '┐';
        grid[y2][x1] = '└';
        grid[y2][x2] = '┘';
    }

    fn grid_to_string(&self, grid: &[Vec<char>]) -> String {
        grid.iter()
            .map(|row| row.iter().take(self.width).collect::<String>())
            .collect::<Vec<_>>()
            .join("\r\n")
    }
}

pub fn clear_screen() -> io::Result<()> {
    crossterm::execute!(io::stdout(), terminal::Clear(ClearType::All), cursor::MoveTo(0, 0))?;
    io::stdout().flush()
}

/// Returns a pressed key without blocking.
pub fn poll_key() -> io::Result<Option<KeyCode>> {
    if event::poll(Duration::from_millis(0))? {
        if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
            if kind != KeyEventKind::Release {
                return Ok(Some(code));
            }
        }
    }
    Ok(None)
}

pub fn is_quit_key(code: KeyCode) -> bool {
    matches!(code, KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q'))
}
