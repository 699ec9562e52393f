use crate::camera::FrameSource;
use crate::common::Result;
use crate::core::matcher::UNKNOWN_LABEL;
use crate::core::pipeline::{FacePipeline, RecognitionResult};
use crate::storage::Gallery;
use image::{DynamicImage, Rgb};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::fmt;
use std::time::{Duration, Instant};

const KNOWN_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const UNKNOWN_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Registered,
    Visitor,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Registered => "registered",
            Role::Visitor => "visitor",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Granted,
    Denied,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Access::Granted => "granted",
            Access::Denied => "denied",
        })
    }
}

/// What the operator sees for one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayState {
    pub name: String,
    pub role: Role,
    pub access: Access,
}

impl DisplayState {
    pub fn visitor() -> Self {
        Self {
            name: UNKNOWN_LABEL.to_string(),
            role: Role::Visitor,
            access: Access::Denied,
        }
    }

    /// The first positively matched face decides the state.
    pub fn from_results(results: &[RecognitionResult]) -> Self {
        match results.iter().find(|r| r.identity.is_known()) {
            Some(result) => Self {
                name: result.identity.label().to_string(),
                role: Role::Registered,
                access: Access::Granted,
            },
            None => Self::visitor(),
        }
    }
}

/// Where annotated frames and status labels go.
pub trait DisplaySink {
    fn show_frame(&mut self, frame: &DynamicImage, results: &[RecognitionResult], state: &DisplayState);

    /// Drops any displayed video.
    fn clear(&mut self);

    fn show_error(&mut self, message: &str);
}

#[derive(Debug, Clone)]
pub struct FrameReport {
    pub results: Vec<RecognitionResult>,
    pub display: DisplayState,
}

/// Draws a box per face: green for known, red for unknown.
pub fn annotate(frame: &DynamicImage, results: &[RecognitionResult]) -> DynamicImage {
    let mut rgb = frame.to_rgb8();
    for result in results {
        let face = &result.bounding_box;
        let color = if result.identity.is_known() { KNOWN_COLOR } else { UNKNOWN_COLOR };
        let (w, h) = (face.width() as u32, face.height() as u32);
        if w < 3 || h < 3 {
            continue;
        }
        let (x, y) = (face.x1 as i32, face.y1 as i32);
        draw_hollow_rect_mut(&mut rgb, Rect::at(x, y).of_size(w, h), color);
        draw_hollow_rect_mut(&mut rgb, Rect::at(x + 1, y + 1).of_size(w - 2, h - 2), color);
    }
    DynamicImage::ImageRgb8(rgb)
}

/// Polls the frame source on a fixed tick and runs recognition on each frame.
/// Reads the gallery snapshot it was given; it never modifies it.
pub struct RecognitionLoop {
    source: Box<dyn FrameSource>,
    pipeline: FacePipeline,
    gallery: Gallery,
    display: Box<dyn DisplaySink>,
    state: LoopState,
    frames_processed: u64,
}

impl RecognitionLoop {
    pub fn new(
        source: Box<dyn FrameSource>,
        pipeline: FacePipeline,
        gallery: Gallery,
        display: Box<dyn DisplaySink>,
    ) -> Self {
        Self {
            source,
            pipeline,
            gallery,
            display,
            state: LoopState::Stopped,
            frames_processed: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Takes effect from the next tick.
    pub fn replace_gallery(&mut self, gallery: Gallery) {
        tracing::info!("Gallery reloaded: {} entries", gallery.len());
        self.gallery = gallery;
    }

    pub fn start(&mut self) -> Result<()> {
        if self.state == LoopState::Running {
            tracing::warn!("Recognition already running");
            return Ok(());
        }

        if let Err(e) = self.source.open() {
            tracing::error!("Could not start camera: {}", e);
            self.display.show_error(&format!("Could not access the camera: {}", e));
            return Err(e);
        }

        self.state = LoopState::Running;
        tracing::info!("Camera started; {} gallery entries", self.gallery.len());
        Ok(())
    }

    pub fn stop(&mut self) {
        if self.state == LoopState::Stopped {
            return;
        }
        self.source.close();
        self.display.clear();
        self.state = LoopState::Stopped;
        tracing::info!("Camera stopped after {} frames", self.frames_processed);
    }

    /// Processes at most one frame. Returns `None` when stopped, when no frame
    /// was ready, or when the frame had to be skipped.
    pub fn tick(&mut self) -> Option<FrameReport> {
        if self.state != LoopState::Running {
            return None;
        }

        let frame = match self.source.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Frame capture failed: {}", e);
                return None;
            }
        };

        match self.process_frame(&frame) {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!("Skipping frame: {}", e);
                None
            }
        }
    }

    fn process_frame(&mut self, frame: &DynamicImage) -> Result<FrameReport> {
        let started = Instant::now();
        let results = self.pipeline.recognize(frame, &self.gallery)?;
        let display = DisplayState::from_results(&results);

        let annotated = annotate(frame, &results);
        self.display.show_frame(&annotated, &results, &display);

        self.frames_processed += 1;
        if self.frames_processed % 100 == 1 {
            // `display` would resolve to `tracing::field::display` inside the macro.
            let state = &display;
            tracing::debug!(
                "Frame {}: {} face(s), {} ({}), {:.1}ms",
                self.frames_processed,
                results.len(),
                state.name,
                state.access,
                started.elapsed().as_secs_f32() * 1000.0
            );
        }

        Ok(FrameReport { results, display })
    }

    /// Starts the camera and ticks every `interval` until `should_stop`
    /// returns true, then stops. Ticks never overlap.
    pub fn run(&mut self, interval: Duration, mut should_stop: impl FnMut() -> bool) -> Result<()> {
        self.start()?;

        let mut next_tick = Instant::now();
        while self.is_running() && !should_stop() {
            self.tick();

            next_tick += interval;
            let now = Instant::now();
            if next_tick > now {
                std::thread::sleep(next_tick - now);
            } else {
                // Fell behind; don't try to catch up with a burst of ticks
                next_tick = now;
            }
        }

        self.stop();
        Ok(())
    }
}
