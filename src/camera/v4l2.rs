use crate::camera::FrameSource;
use crate::common::config::CameraConfig;
use crate::common::{FaceGateError, Result};
use image::{DynamicImage, ImageBuffer, ImageFormat, Luma, Rgb};
use std::fs;
use std::io::ErrorKind;
use std::time::Duration;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

#[derive(Debug, Clone)]
pub struct CameraInfo {
    pub index: u32,
    pub name: String,
    pub formats: Vec<String>,
    pub can_capture: bool,
}

pub struct Camera {
    config: CameraConfig,
    session: Option<CameraSession>,
}

// Field order matters: the stream must be dropped before the device.
struct CameraSession {
    stream: Stream<'static>,
    format: v4l::Format,
    _device: Device,
    index: u32,
}

impl Camera {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            config: config.clone(),
            session: None,
        }
    }

    /// List all available cameras with their capabilities
    pub fn list_all_cameras() -> Result<Vec<CameraInfo>> {
        let mut cameras = Vec::new();

        for entry in fs::read_dir("/dev")? {
            let entry = entry?;
            let filename = entry.file_name();
            let Some(index) = filename
                .to_str()
                .and_then(|name| name.strip_prefix("video"))
                .and_then(|index| index.parse::<u32>().ok())
            else {
                continue;
            };

            let Ok(device) = Device::new(index as usize) else { continue };
            let Ok(caps) = device.query_caps() else { continue };

            let formats = device
                .enum_formats()
                .unwrap_or_default()
                .iter()
                .map(|fmt| fmt.fourcc.str().unwrap_or("UNKNOWN").to_string())
                .collect();

            cameras.push(CameraInfo {
                index,
                name: caps.card.clone(),
                formats,
                can_capture: caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE),
            });
        }

        cameras.sort_by_key(|c| c.index);
        Ok(cameras)
    }

    /// Picks the first device that reports video capture, falling back to 0.
    pub fn detect_camera() -> Result<u32> {
        let cameras = Self::list_all_cameras()?;
        match cameras.iter().find(|c| c.can_capture) {
            Some(camera) => {
                tracing::info!("Selected camera: /dev/video{} ({})", camera.index, camera.name);
                Ok(camera.index)
            }
            None => {
                tracing::warn!("No capture device detected, falling back to /dev/video0");
                Ok(0)
            }
        }
    }

    fn open_session(&self) -> Result<CameraSession> {
        let index = if self.config.device_index == 999 {
            Self::detect_camera()?
        } else {
            self.config.device_index
        };

        tracing::info!("Opening camera device {}...", index);
        let device = Device::new(index as usize)
            .map_err(|e| FaceGateError::Camera(format!("Failed to open camera {}: {}", index, e)))?;

        let mut fmt = device.format()
            .map_err(|e| FaceGateError::Camera(format!("Failed to get format: {}", e)))?;
        fmt.width = self.config.width;
        fmt.height = self.config.height;
        if fmt.fourcc.repr != *b"GREY" && fmt.fourcc.repr != *b"YUYV" {
            fmt.fourcc = FourCC::new(b"MJPG");
        }

        // Not every device supports the requested mode; keep its defaults then.
        if let Err(e) = device.set_format(&fmt) {
            tracing::warn!("Could not set format {}x{}: {}. Using device defaults.", fmt.width, fmt.height, e);
        }

        let format = device.format()
            .map_err(|e| FaceGateError::Camera(format!("Failed to get final format: {}", e)))?;
        tracing::debug!(
            "Camera format: {}x{} {}",
            format.width,
            format.height,
            format.fourcc.str().unwrap_or("UNKNOWN")
        );

        let mut stream = Stream::with_buffers(&device, Type::VideoCapture, 4)
            .map_err(|e| FaceGateError::Camera(format!("Failed to create stream: {}", e)))?;

        for i in 0..self.config.warmup_frames {
            stream.next()
                .map_err(|e| FaceGateError::Camera(format!("Failed to capture warmup frame {}: {}", i, e)))?;
            std::thread::sleep(Duration::from_millis(self.config.warmup_delay_ms));
        }
        stream.set_timeout(Duration::from_millis(self.config.poll_timeout_ms));

        Ok(CameraSession {
            stream,
            format,
            _device: device,
            index,
        })
    }
}

impl FrameSource for Camera {
    fn open(&mut self) -> Result<()> {
        if self.session.is_some() {
            tracing::debug!("Camera already open");
            return Ok(());
        }
        self.session = Some(self.open_session()?);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::info!("Released camera device {}", session.index);
        }
    }

    fn is_open(&self) -> bool {
        self.session.is_some()
    }

    fn read_frame(&mut self) -> Result<Option<DynamicImage>> {
        let Some(session) = self.session.as_mut() else {
            return Ok(None);
        };

        let (buf, _meta) = match session.stream.next() {
            Ok(frame) => frame,
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => return Ok(None),
            Err(e) => return Err(FaceGateError::Camera(format!("Failed to capture: {}", e))),
        };

        decode_frame(&session.format.fourcc.repr, buf, session.format.width, session.format.height).map(Some)
    }
}

fn decode_frame(fourcc: &[u8; 4], data: &[u8], width: u32, height: u32) -> Result<DynamicImage> {
    match fourcc {
        b"GREY" => {
            let expected = (width * height) as usize;
            let pixels = data.get(..expected)
                .ok_or_else(|| FaceGateError::Camera("Short grayscale frame".into()))?;
            let buffer = ImageBuffer::<Luma<u8>, _>::from_raw(width, height, pixels.to_vec())
                .ok_or_else(|| FaceGateError::Camera("Failed to create grayscale image buffer".into()))?;
            Ok(DynamicImage::ImageLuma8(buffer))
        }
        b"MJPG" => Ok(image::load_from_memory_with_format(data, ImageFormat::Jpeg)?),
        b"YUYV" => yuyv_to_rgb(data, width, height),
        other => Err(FaceGateError::Camera(format!(
            "Unsupported pixel format {}",
            String::from_utf8_lossy(other)
        ))),
    }
}

fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Result<DynamicImage> {
    let expected = (width * height * 2) as usize;
    if data.len() < expected {
        return Err(FaceGateError::Camera("Short YUYV frame".into()));
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in data[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0] as f32, chunk[1] as f32 - 128.0, chunk[2] as f32, chunk[3] as f32 - 128.0);
        for y in [y0, y1] {
            rgb.push((y + 1.402 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y + 1.772 * u).clamp(0.0, 255.0) as u8);
        }
    }

    let buffer = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, rgb)
        .ok_or_else(|| FaceGateError::Camera("Failed to create RGB image buffer".into()))?;
    Ok(DynamicImage::ImageRgb8(buffer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_grey_frames() {
        let data = vec![7u8; 4 * 3];
        let image = decode_frame(b"GREY", &data, 4, 3).unwrap();
        assert_eq!((image.width(), image.height()), (4, 3));
        assert_eq!(image.to_luma8().get_pixel(3, 2)[0], 7);
    }

    #[test]
    fn yuyv_neutral_chroma_is_gray() {
        // Y=100 with U=V=128 carries no colour
        let data = [100u8, 128, 100, 128].repeat(2);
        let image = decode_frame(b"YUYV", &data, 2, 2).unwrap().to_rgb8();
        assert_eq!(image.get_pixel(1, 1).0, [100, 100, 100]);
    }

    #[test]
    fn short_frames_are_errors() {
        assert!(decode_frame(b"GREY", &[0u8; 5], 4, 3).is_err());
        assert!(decode_frame(b"YUYV", &[0u8; 5], 4, 3).is_err());
        assert!(decode_frame(b"H264", &[0u8; 5], 1, 1).is_err());
    }

    #[test]
    fn closed_camera_yields_no_frames() {
        let mut camera = Camera::new(&CameraConfig::default());
        assert!(!camera.is_open());
        assert!(camera.read_frame().unwrap().is_none());
        camera.close();
    }
}
