//! In-memory stand-ins for the camera, detector, embedder and display.

use crate::camera::FrameSource;
use crate::common::{FaceGateError, RecognizerBackend, Result};
use crate::core::detector::{FaceBox, FaceDetector};
use crate::core::enrollment::{CaptureCommand, CaptureControl};
use crate::core::pipeline::RecognitionResult;
use crate::core::recognition::{DisplaySink, DisplayState};
use crate::core::recognizer::{Embedder, Embedding};
use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Black canvas with a centred square of `color` covering half of each side.
pub fn solid_square(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
    let (x0, y0, x1, y1) = (width / 4, height / 4, width * 3 / 4, height * 3 / 4);
    let img = RgbImage::from_fn(width, height, |x, y| {
        if x >= x0 && x < x1 && y >= y0 && y < y1 {
            Rgb(color)
        } else {
            Rgb([0, 0, 0])
        }
    });
    DynamicImage::ImageRgb8(img)
}

/// "Detects" the bounding box of all non-dark pixels as a single face.
pub struct BrightRegionDetector;

impl FaceDetector for BrightRegionDetector {
    fn detect(&mut self, gray: &GrayImage) -> Result<Vec<FaceBox>> {
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for (x, y, pixel) in gray.enumerate_pixels() {
            if pixel[0] > 8 {
                bounds = Some(match bounds {
                    None => (x, y, x, y),
                    Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
                });
            }
        }
        Ok(bounds
            .map(|(x0, y0, x1, y1)| vec![FaceBox::from_rect(x0 as i32, y0 as i32, x1 - x0 + 1, y1 - y0 + 1, 1.0)])
            .unwrap_or_default())
    }
}

pub struct FailingDetector;

impl FaceDetector for FailingDetector {
    fn detect(&mut self, _gray: &GrayImage) -> Result<Vec<FaceBox>> {
        Err(FaceGateError::Model("detector exploded".into()))
    }
}

/// Mean RGB of the crop; identical crops give identical vectors and pure
/// red/green/blue faces are mutually orthogonal.
pub struct MeanColorEmbedder;

impl Embedder for MeanColorEmbedder {
    fn backend(&self) -> RecognizerBackend {
        RecognizerBackend::Onnx
    }

    fn embed(&self, face: &DynamicImage) -> Result<Embedding> {
        let rgb = face.to_rgb8();
        let count = (rgb.width() * rgb.height()).max(1) as f32;
        let mut sum = [0f32; 3];
        for pixel in rgb.pixels() {
            for c in 0..3 {
                sum[c] += pixel[c] as f32 / 255.0;
            }
        }
        Ok(sum.iter().map(|s| s / count).collect())
    }
}

pub struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn backend(&self) -> RecognizerBackend {
        RecognizerBackend::Onnx
    }

    fn embed(&self, _face: &DynamicImage) -> Result<Embedding> {
        Err(FaceGateError::Model("embedder exploded".into()))
    }
}

#[derive(Default)]
pub struct SourceLog {
    pub opens: u32,
    pub closes: u32,
}

/// Plays back a fixed list of frames; `None` entries are empty polls.
pub struct ScriptedSource {
    frames: VecDeque<Option<DynamicImage>>,
    open: bool,
    fail_open: bool,
    fail_reads: bool,
    pub log: Rc<RefCell<SourceLog>>,
}

impl ScriptedSource {
    pub fn new(frames: Vec<Option<DynamicImage>>) -> Self {
        Self {
            frames: frames.into(),
            open: false,
            fail_open: false,
            fail_reads: false,
            log: Rc::default(),
        }
    }

    pub fn unavailable() -> Self {
        Self { fail_open: true, ..Self::new(Vec::new()) }
    }

    /// Opens fine, then every read fails.
    pub fn broken() -> Self {
        Self { fail_reads: true, ..Self::new(Vec::new()) }
    }
}

impl FrameSource for ScriptedSource {
    fn open(&mut self) -> Result<()> {
        if self.fail_open {
            return Err(FaceGateError::Camera("no such device".into()));
        }
        self.open = true;
        self.log.borrow_mut().opens += 1;
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.log.borrow_mut().closes += 1;
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn read_frame(&mut self) -> Result<Option<DynamicImage>> {
        if !self.open {
            return Ok(None);
        }
        if self.fail_reads {
            return Err(FaceGateError::Camera("device unplugged".into()));
        }
        Ok(self.frames.pop_front().flatten())
    }
}

#[derive(Default)]
pub struct SinkLog {
    pub states: Vec<DisplayState>,
    pub results: Vec<Vec<RecognitionResult>>,
    pub last_frame: Option<DynamicImage>,
    pub clears: u32,
    pub errors: Vec<String>,
}

#[derive(Default, Clone)]
pub struct RecordingSink {
    pub log: Rc<RefCell<SinkLog>>,
}

impl DisplaySink for RecordingSink {
    fn show_frame(&mut self, frame: &DynamicImage, results: &[RecognitionResult], state: &DisplayState) {
        let mut log = self.log.borrow_mut();
        log.states.push(state.clone());
        log.results.push(results.to_vec());
        log.last_frame = Some(frame.clone());
    }

    fn clear(&mut self) {
        self.log.borrow_mut().clears += 1;
    }

    fn show_error(&mut self, message: &str) {
        self.log.borrow_mut().errors.push(message.to_string());
    }
}

/// Replays commands in order, then keeps answering `Continue`.
pub struct ScriptedControl {
    commands: VecDeque<CaptureCommand>,
    pub polls: usize,
}

impl ScriptedControl {
    pub fn new(commands: Vec<CaptureCommand>) -> Self {
        Self { commands: commands.into(), polls: 0 }
    }
}

impl CaptureControl for ScriptedControl {
    fn poll(&mut self, _frame: &DynamicImage, _faces: &[FaceBox]) -> CaptureCommand {
        self.polls += 1;
        self.commands.pop_front().unwrap_or(CaptureCommand::Continue)
    }
}
