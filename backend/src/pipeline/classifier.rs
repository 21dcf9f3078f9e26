use super::{DecodedImage, Prediction};
use crate::config::ModelConfig;
use foodlens_shared::{ErrorDetail, ErrorKind};
use image::imageops::FilterType;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tch::{CModule, Device, Kind, Tensor};

/// A single-label image classifier. The production implementation wraps a
/// TorchScript module; tests substitute fixed-output stubs.
pub trait Classifier: Send + Sync {
    fn classify(&self, image: &DecodedImage) -> Result<Prediction, ErrorDetail>;
    fn is_loaded(&self) -> bool;
}

type Loader<M> = Box<dyn Fn(&ModelConfig) -> Result<M, String> + Send + Sync>;

/// Owns the classifier module for the process lifetime. The module is loaded
/// at most once: the slot mutex serializes concurrent first calls, and a
/// filled slot turns `ensure_loaded` into a no-op. Loading happens eagerly at
/// startup and again lazily as a safety net if the eager load was skipped.
pub struct ModelManager<M = CModule> {
    config: ModelConfig,
    module: Mutex<Option<M>>,
    ready: AtomicBool,
    loader: Loader<M>,
}

impl ModelManager {
    pub fn new(config: ModelConfig) -> Self {
        Self::with_loader(config, |cfg: &ModelConfig| {
            let device = Device::cuda_if_available();
            let module = CModule::load_on_device(&cfg.weights, device)
                .map_err(|e| format!("failed to load {}: {e}", cfg.weights))?;
            log::info!("classifier loaded from {} on {:?}", cfg.weights, device);
            Ok(module)
        })
    }
}

impl<M: Send> ModelManager<M> {
    pub fn with_loader(
        config: ModelConfig,
        loader: impl Fn(&ModelConfig) -> Result<M, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            config,
            module: Mutex::new(None),
            ready: AtomicBool::new(false),
            loader: Box::new(loader),
        }
    }

    /// Idempotent load. Concurrent callers race for the mutex; exactly one
    /// performs the load and the rest observe the filled slot.
    pub fn ensure_loaded(&self) -> Result<(), ErrorDetail> {
        let mut slot = self.lock_slot();
        if slot.is_some() {
            return Ok(());
        }
        match (self.loader)(&self.config) {
            Ok(module) => {
                *slot = Some(module);
                self.ready.store(true, Ordering::Release);
                Ok(())
            }
            Err(message) => {
                log::error!("model load failed: {message}");
                Err(ErrorDetail::new(
                    ErrorKind::Inference,
                    "classification model failed to load",
                ))
            }
        }
    }

    /// Per-request safety net: a failed load is retried once before the
    /// request gives up.
    pub fn ensure_loaded_with_retry(&self) -> Result<(), ErrorDetail> {
        if let Err(first) = self.ensure_loaded() {
            log::warn!("retrying model load after failure: {}", first.message);
            return self.ensure_loaded();
        }
        Ok(())
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, Option<M>> {
        // A poisoned lock means a loader panicked; the slot is still usable.
        self.module
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ModelManager<CModule> {
    fn forward(&self, image: &DecodedImage) -> Result<Vec<f32>, ErrorDetail> {
        let input = self
            .preprocess(image)
            .map_err(|e| inference_error(format!("preprocessing failed: {e}")))?;

        let slot = self.lock_slot();
        let module = slot
            .as_ref()
            .ok_or_else(|| inference_error("model is not loaded".to_string()))?;

        // Forward pass only; gradients are never needed at serving time.
        let logits = tch::no_grad(|| module.forward_ts(&[input]))
            .map_err(|e| inference_error(format!("forward pass failed: {e}")))?;
        let probs = logits
            .f_softmax(-1, Kind::Float)
            .and_then(|t| t.f_view(-1))
            .map_err(|e| inference_error(format!("softmax failed: {e}")))?;

        let count = probs.size().first().copied().unwrap_or(0) as usize;
        let mut output = vec![0f32; count];
        probs.copy_data(&mut output, count);
        Ok(output)
    }

    fn preprocess(&self, image: &DecodedImage) -> Result<Tensor, tch::TchError> {
        let size = self.config.image_size;
        // The checkpoint's processor stretches to a square with bilinear
        // sampling, so Triangle matches it here.
        let resized = image::imageops::resize(&image.pixels, size, size, FilterType::Triangle);

        let plane = (size * size) as usize;
        let mut chw = vec![0f32; 3 * plane];
        for (x, y, pixel) in resized.enumerate_pixels() {
            let offset = (y * size + x) as usize;
            for channel in 0..3 {
                chw[channel * plane + offset] = (pixel[channel] as f32 / 255.0
                    - self.config.mean[channel])
                    / self.config.std[channel];
            }
        }

        Tensor::f_from_slice(&chw)?.f_view([1, 3, size as i64, size as i64])
    }
}

impl Classifier for ModelManager<CModule> {
    fn classify(&self, image: &DecodedImage) -> Result<Prediction, ErrorDetail> {
        let started = Instant::now();
        self.ensure_loaded_with_retry()?;

        let probs = self.forward(image)?;
        let (index, confidence) = probs
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .ok_or_else(|| inference_error("model produced an empty output".to_string()))?;

        let label = self
            .config
            .labels
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("class {index}"))
            .replace('_', " ");

        Ok(Prediction {
            label,
            confidence,
            duration: started.elapsed(),
        })
    }

    fn is_loaded(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

fn inference_error(message: String) -> ErrorDetail {
    log::error!("{message}");
    ErrorDetail::new(ErrorKind::Inference, "inference failed")
}
