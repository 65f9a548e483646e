//! OCR (Optical Character Recognition) module
//!
//! Uses PaddleOCR models via ONNX Runtime for text detection and recognition.

use anyhow::{Context, Result};
use image::RgbImage;
use ndarray::{Array2, Array3, Array4, Axis, Ix3, Ix4};
use ort::value::Tensor;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

use super::models::{ModelManager, OnnxSession};
use super::postprocess::{
    boxes_from_probability_map, ctc_greedy_decode, load_charset, DbPostprocessConfig,
};
use super::preprocess::{
    crop_quad, preprocess_for_detection, preprocess_for_recognition, rgb_to_f32, PreprocessConfig,
};
use super::{Detection, WordDetector};
use crate::config::OcrSettings;

/// OCR engine using PaddleOCR via ONNX Runtime.
///
/// Loading the models is expensive; build one engine per process and reuse
/// it for every document.
pub struct PaddleOcrEngine {
    detector: OnnxSession,
    recognizer: OnnxSession,
    charset: Vec<String>,
    preprocess: PreprocessConfig,
    postprocess: DbPostprocessConfig,
}

impl PaddleOcrEngine {
    /// Initialize OCR engine with model paths
    pub fn new(
        detection_model: &Path,
        recognition_model: &Path,
        dictionary: &Path,
        use_gpu: bool,
        preprocess: PreprocessConfig,
    ) -> Result<Self> {
        let load = |path: &Path| {
            if use_gpu {
                OnnxSession::new_with_gpu(path)
            } else {
                OnnxSession::new(path)
            }
        };

        let detector = load(detection_model)?;
        let recognizer = load(recognition_model)?;

        let dict = std::fs::read_to_string(dictionary)
            .with_context(|| format!("Failed to read character dictionary {:?}", dictionary))?;
        let charset = load_charset(&dict);
        info!("Loaded {} recognition symbols", charset.len());

        Ok(Self {
            detector,
            recognizer,
            charset,
            preprocess,
            postprocess: DbPostprocessConfig::default(),
        })
    }

    /// Build an engine from settings, downloading missing models
    pub fn from_settings(settings: &OcrSettings) -> Result<Self> {
        let manager = match &settings.models_dir {
            Some(dir) => ModelManager::with_dir(dir.clone())?,
            None => ModelManager::new()?,
        };

        let [det_path, rec_path, dict_path] = manager.ensure_required()?;

        let preprocess = PreprocessConfig {
            det_limit_side: settings.det_limit_side,
            rec_target_height: settings.rec_image_height,
            ..PreprocessConfig::default()
        };

        Self::new(&det_path, &rec_path, &dict_path, settings.use_gpu, preprocess)
    }

    /// Run the detection model, returning text boxes in page pixels
    fn detect_boxes(&mut self, image: &RgbImage) -> Result<Vec<[(f32, f32); 4]>> {
        let (tensor, scale) = preprocess_for_detection(image, &self.preprocess);
        let prob = run_single(&mut self.detector, tensor)?;

        // [1, 1, H, W] -> [H, W]
        let prob = prob
            .into_dimensionality::<Ix4>()
            .context("Unexpected detection output shape")?;
        let prob: Array2<f32> = prob
            .index_axis_move(Axis(0), 0)
            .index_axis_move(Axis(0), 0);

        let (width, height) = image.dimensions();
        Ok(boxes_from_probability_map(prob.view(), scale, width, height, &self.postprocess))
    }

    /// Recognize the text inside one box
    fn recognize(&mut self, crop: &Array3<f32>) -> Result<(String, f32)> {
        let tensor = preprocess_for_recognition(crop, &self.preprocess);
        let logits = run_single(&mut self.recognizer, tensor)?;

        // [1, T, C] -> [T, C]
        let logits = logits
            .into_dimensionality::<Ix3>()
            .context("Unexpected recognition output shape")?;
        let probs = logits.index_axis_move(Axis(0), 0);

        Ok(ctc_greedy_decode(probs.view(), &self.charset))
    }
}

impl WordDetector for PaddleOcrEngine {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        let start = Instant::now();

        let boxes = self.detect_boxes(image)?;
        let rgb = rgb_to_f32(image);

        let mut detections = Vec::with_capacity(boxes.len());
        for quad in boxes {
            let crop = crop_quad(&rgb, &quad);
            let (text, confidence) = self.recognize(&crop)?;
            detections.push(Detection { quad, text, confidence });
        }

        debug!(
            "OCR complete in {:?}: {} text regions",
            start.elapsed(),
            detections.len()
        );

        Ok(detections)
    }
}

/// Feed one tensor through a single-input model and copy out the first output
fn run_single(model: &mut OnnxSession, input: Array4<f32>) -> Result<ndarray::ArrayD<f32>> {
    let input = Tensor::from_array(input)?;
    let outputs = model.session_mut().run(ort::inputs![input])?;
    let output = outputs[0].try_extract_array::<f32>()?.to_owned();
    Ok(output)
}
