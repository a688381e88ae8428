//! Screen capture of the client window.
//!
//! Captures stay in memory; writing them out is the persistence layer's job, so a
//! failed capture never leaves a partial file behind.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::ExecutorError;
use crate::window::{Actuator, Rect, WindowHandle};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Bmp,
    Jpeg,
}

impl ImageFormat {
    /// Sniffs the format from magic bytes.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(ImageFormat::Png)
        } else if bytes.starts_with(b"BM") && bytes.len() > 14 {
            Some(ImageFormat::Bmp)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else {
            None
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Jpeg => "jpg",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }
}

#[derive(Clone, Debug)]
pub struct CapturedImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    pub region: Option<String>,
    pub captured_at: DateTime<Local>,
}

#[derive(Clone)]
pub struct ScreenCapture {
    actuator: Arc<dyn Actuator>,
    regions: HashMap<String, Rect>,
}

impl ScreenCapture {
    pub fn new(actuator: Arc<dyn Actuator>, regions: HashMap<String, Rect>) -> Self {
        Self { actuator, regions }
    }

    /// Whole window, or the named region configured under `window.regions`.
    pub async fn capture(&self, handle: &WindowHandle, region: Option<&str>) -> Result<CapturedImage, ExecutorError> {
        let rect = match region {
            Some(name) => Some(*self.regions.get(name).ok_or_else(|| ExecutorError::CaptureError {
                reason: format!("unknown region '{}'", name),
            })?),
            None => None,
        };

        let bytes = self
            .actuator
            .capture(handle.id, rect)
            .await
            .map_err(|e| ExecutorError::CaptureError { reason: e.to_string() })?;

        if bytes.is_empty() {
            return Err(ExecutorError::CaptureError {
                reason: "capture returned no data".to_string(),
            });
        }
        let format = ImageFormat::detect(&bytes).ok_or_else(|| ExecutorError::CaptureError {
            reason: format!("unrecognized image data ({} bytes)", bytes.len()),
        })?;

        debug!("[CAPTURE] {} bytes of {:?} from {}", bytes.len(), format, handle);
        Ok(CapturedImage {
            bytes,
            format,
            region: region.map(str::to_string),
            captured_at: Local::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::{ActuatorEvent, FakeActuator, WindowId};

    fn regions() -> HashMap<String, Rect> {
        let mut regions = HashMap::new();
        regions.insert(
            "holdings".to_string(),
            Rect {
                x: 200,
                y: 300,
                width: 800,
                height: 400,
            },
        );
        regions
    }

    #[test]
    fn test_detect_formats() {
        assert_eq!(ImageFormat::detect(b"\x89PNG\r\n\x1a\nrest"), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::detect(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::detect(b"BM0123456789abcdef"), Some(ImageFormat::Bmp));
        assert_eq!(ImageFormat::detect(b"BM"), None);
        assert_eq!(ImageFormat::detect(b"GIF89a"), None);
    }

    #[tokio::test]
    async fn test_capture_whole_window() {
        let fake = Arc::new(FakeActuator::with_window("下单"));
        let capture = ScreenCapture::new(fake.clone(), regions());

        let image = capture.capture(&FakeActuator::window(1, "下单"), None).await.unwrap();

        assert_eq!(image.format, ImageFormat::Png);
        assert_eq!(fake.events(), vec![ActuatorEvent::Capture(WindowId(1), None)]);
    }

    #[tokio::test]
    async fn test_capture_named_region() {
        let fake = Arc::new(FakeActuator::with_window("下单"));
        let capture = ScreenCapture::new(fake.clone(), regions());

        let image = capture
            .capture(&FakeActuator::window(1, "下单"), Some("holdings"))
            .await
            .unwrap();

        assert_eq!(image.region.as_deref(), Some("holdings"));
        assert!(matches!(fake.events()[0], ActuatorEvent::Capture(_, Some(Rect { x: 200, .. }))));
    }

    #[tokio::test]
    async fn test_capture_errors() {
        let fake = Arc::new(FakeActuator::with_window("下单"));
        let capture = ScreenCapture::new(fake.clone(), regions());
        let handle = FakeActuator::window(1, "下单");

        let err = capture.capture(&handle, Some("nope")).await.unwrap_err();
        assert!(matches!(err, ExecutorError::CaptureError { .. }));

        fake.set_screenshot(Vec::new());
        assert!(capture.capture(&handle, None).await.is_err());

        fake.set_screenshot(b"not an image".to_vec());
        assert!(capture.capture(&handle, None).await.is_err());

        fake.set_screenshot(crate::window::fake::FAKE_PNG.to_vec());
        fake.set_capture_fails(true);
        assert!(capture.capture(&handle, None).await.is_err());
    }
}
