//! Shared test doubles for vigil-eye integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use image::{ImageOutputFormat, Rgb, RgbImage};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};
use vigil_core::{BoundingBox, Detection, DetectionSettings, FrameSize};
use vigil_eye::{
    DetectionLoop, DetectionStore, ErrorState, Frame, FrameSource, ModelGateway, ObjectDetector,
    VisionError,
};

pub fn det(label: &str, score: f32) -> Detection {
    Detection::new(BoundingBox::new(10.0, 10.0, 20.0, 20.0), label, score)
}

/// Detector with a call counter, scripted results and an optional gate.
///
/// Scripted results are consumed one per call; once exhausted every call
/// returns `fallback`. With a gate, each call waits for one permit.
pub struct FakeDetector {
    script: Mutex<VecDeque<Result<Vec<Detection>, String>>>,
    fallback: Vec<Detection>,
    fail_load: bool,
    calls: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
    entered: Arc<Notify>,
}

impl FakeDetector {
    pub fn returning(fallback: Vec<Detection>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            fail_load: false,
            calls: AtomicUsize::new(0),
            gate: None,
            entered: Arc::new(Notify::new()),
        }
    }

    pub fn failing_load() -> Self {
        Self {
            fail_load: true,
            ..Self::returning(Vec::new())
        }
    }

    /// Hold every call until the returned semaphore gets a permit.
    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(gate.clone());
        (self, gate)
    }

    pub fn then(self, result: Result<Vec<Detection>, String>) -> Self {
        self.script.lock().push_back(result);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Resolves once a call has entered `detect`.
    pub fn entered(&self) -> Arc<Notify> {
        self.entered.clone()
    }
}

#[async_trait]
impl ObjectDetector for FakeDetector {
    fn name(&self) -> &str {
        "fake"
    }

    async fn load(&self) -> Result<(), VisionError> {
        if self.fail_load {
            Err(VisionError::ModelLoad("fake weights unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    async fn detect(&self, _frame: &Frame, _max: usize) -> Result<Vec<Detection>, VisionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();

        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| VisionError::Inference(e.to_string()))?;
            permit.forget();
        }

        let next = self.script.lock().pop_front();
        match next {
            Some(Ok(detections)) => Ok(detections),
            Some(Err(message)) => Err(VisionError::Inference(message)),
            None => Ok(self.fallback.clone()),
        }
    }
}

/// Frame source returning a fixed-size blank frame.
pub struct FixedFrameSource {
    size: RwLock<Option<FrameSize>>,
}

impl FixedFrameSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: RwLock::new(Some(FrameSize::new(width, height))),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            size: RwLock::new(None),
        }
    }
}

impl FrameSource for FixedFrameSource {
    fn dimensions(&self) -> Option<FrameSize> {
        *self.size.read()
    }

    fn current_frame(&self) -> Result<Frame, VisionError> {
        let size = self
            .dimensions()
            .ok_or_else(|| VisionError::Frame("no frame".to_string()))?;
        Ok(Frame::from_rgb(RgbImage::new(size.width, size.height)))
    }
}

/// Loop wired to `detector` with a fresh store, settings and error slot.
pub struct LoopHarness {
    pub detection_loop: DetectionLoop,
    pub gateway: Arc<ModelGateway>,
    pub store: Arc<DetectionStore>,
    pub settings: Arc<RwLock<DetectionSettings>>,
    pub errors: Arc<ErrorState>,
}

impl LoopHarness {
    pub async fn ready(detector: Arc<FakeDetector>, interval_ms: u64) -> Self {
        let harness = Self::unloaded(detector, interval_ms);
        harness.gateway.load().await.expect("fake detector loads");
        harness
    }

    pub fn unloaded(detector: Arc<FakeDetector>, interval_ms: u64) -> Self {
        let gateway = Arc::new(ModelGateway::new(detector));
        let store = Arc::new(DetectionStore::new());
        let settings = Arc::new(RwLock::new(DetectionSettings::default()));
        let errors = Arc::new(ErrorState::new());
        let detection_loop = DetectionLoop::new(
            gateway.clone(),
            store.clone(),
            settings.clone(),
            errors.clone(),
            std::time::Duration::from_millis(interval_ms),
        );
        Self {
            detection_loop,
            gateway,
            store,
            settings,
            errors,
        }
    }
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([40, 90, 200]));
    let mut bytes = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(image)
        .write_to(&mut bytes, ImageOutputFormat::Png)
        .expect("encode png");
    bytes.into_inner()
}
