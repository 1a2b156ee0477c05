use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use newsdb_core::traits::Embedder;
use newsdb_core::{Error, Result};

/// XLM-R pad token id.
const PAD_ID: u32 = 1;

fn unavailable(e: impl std::fmt::Display) -> Error {
    Error::EmbeddingUnavailable(e.to_string())
}

pub fn select_device() -> Device {
    #[cfg(feature = "metal")]
    {
        if let Ok(dev) = Device::new_metal(0) {
            info!("embedding device: metal");
            return dev;
        }
    }
    info!("embedding device: cpu");
    Device::Cpu
}

/// Mean of the unmasked token states, L2-normalised. `hidden` is `[B, T, H]`,
/// `attention_mask` is `[B, T]`; returns `[B, H]`.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
    let hidden_dim = hidden.dim(2)?;
    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?;
    let mask_3d = mask.unsqueeze(2)?;
    let mask_broadcast = match mask_3d.broadcast_as(hidden.shape()) {
        Ok(m) => m,
        Err(_) => mask_3d.repeat((1, 1, hidden_dim))?,
    };
    let sum = (hidden * &mask_broadcast)?.sum(1)?;
    let lengths = mask.sum(1)?.unsqueeze(1)?.to_dtype(sum.dtype())?;
    let mean = sum.broadcast_div(&lengths)?;
    let eps_val = match hidden.dtype() {
        DType::F16 => 1e-6f32,
        _ => 1e-12f32,
    };
    let eps = Tensor::new(&[eps_val], hidden.device())?.to_dtype(hidden.dtype())?.unsqueeze(0)?;
    let norm = mean.sqr()?.sum_keepdim(1)?.sqrt()?.broadcast_add(&eps)?;
    mean.broadcast_div(&norm)
}

/// BGE-M3 dense embeddings computed locally with candle.
pub struct BgeM3Embedder {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    max_len: usize,
    model_version: String,
}

impl BgeM3Embedder {
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = select_device();
        info!(model_dir = %model_dir.display(), "loading BGE-M3");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| Error::InvalidConfig(format!("tokenizer {}: {e}", tokenizer_path.display())))?;

        let config_raw = std::fs::read_to_string(model_dir.join("config.json"))?;
        let config: XLMRobertaConfig = serde_json::from_str(&config_raw)?;
        let dim = serde_json::from_str::<serde_json::Value>(&config_raw)?
            .get("hidden_size")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(1024) as usize;

        let weights = load_weights(model_dir, &device)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb).map_err(|e| Error::InvalidConfig(format!("BGE-M3 weights: {e}")))?;
        info!(dim, "BGE-M3 loaded");

        Ok(Self { model, tokenizer, device, dim, max_len, model_version: format!("local:bge-m3:d{dim}") })
    }

    /// Token ids and mask for `texts`, truncated to `max_len` and padded to
    /// the longest entry.
    fn tokenize(&self, texts: &[String]) -> Result<(Tensor, Tensor)> {
        let mut rows = Vec::with_capacity(texts.len());
        for text in texts {
            let enc = self.tokenizer.encode(text.as_str(), true).map_err(unavailable)?;
            let mut ids = enc.get_ids().to_vec();
            let mut mask = enc.get_attention_mask().to_vec();
            ids.truncate(self.max_len);
            mask.truncate(self.max_len);
            rows.push((ids, mask));
        }
        let width = rows.iter().map(|(ids, _)| ids.len()).max().unwrap_or(1).max(1);
        let mut all_ids = Vec::with_capacity(rows.len() * width);
        let mut all_mask = Vec::with_capacity(rows.len() * width);
        for (mut ids, mut mask) in rows {
            ids.resize(width, PAD_ID);
            mask.resize(width, 0);
            all_ids.extend(ids);
            all_mask.extend(mask);
        }
        let input_ids = Tensor::from_vec(all_ids, (texts.len(), width), &self.device).map_err(unavailable)?;
        let attention_mask = Tensor::from_vec(all_mask, (texts.len(), width), &self.device).map_err(unavailable)?;
        Ok((input_ids, attention_mask))
    }
}

impl Embedder for BgeM3Embedder {
    fn model_version(&self) -> &str {
        &self.model_version
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        self.max_len
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let (input_ids, attention_mask) = self.tokenize(texts)?;
        let token_type_ids = input_ids.zeros_like().map_err(unavailable)?;
        let hidden = self
            .model
            .forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)
            .map_err(unavailable)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask).map_err(unavailable)?;
        let vectors: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu).and_then(|t| t.to_vec2()).map_err(unavailable)?;
        let elapsed = start.elapsed();
        if elapsed.as_millis() > 100 * texts.len() as u128 {
            warn!(batch = texts.len(), ms = elapsed.as_millis() as u64, "slow embedding batch");
        } else {
            debug!(batch = texts.len(), ms = elapsed.as_millis() as u64, "embedded batch");
        }
        Ok(vectors)
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        return candle_core::safetensors::load(&safetensors, device).map_err(|e| Error::InvalidConfig(format!("{}: {e}", safetensors.display())));
    }
    let pickle = model_dir.join("pytorch_model.bin");
    let weights = candle_core::pickle::read_all(&pickle).map_err(|e| Error::InvalidConfig(format!("{}: {e}", pickle.display())))?;
    Ok(weights.into_iter().collect())
}

/// Locates the model directory: explicit setting, then `APP_MODEL_DIR`,
/// `MODEL_DIR`, then `models/bge-m3` relative to the working directory.
pub fn resolve_model_dir(configured: Option<&Path>) -> Result<PathBuf> {
    let candidates = configured
        .map(Path::to_path_buf)
        .into_iter()
        .chain(std::env::var("APP_MODEL_DIR").ok().map(PathBuf::from))
        .chain(std::env::var("MODEL_DIR").ok().map(PathBuf::from))
        .chain([PathBuf::from("models/bge-m3"), PathBuf::from("../models/bge-m3")]);
    for dir in candidates {
        if dir.join("config.json").exists() {
            debug!(model_dir = %dir.display(), "using model directory");
            return Ok(dir);
        }
    }
    Err(Error::InvalidConfig(
        "could not locate the BGE-M3 model directory; set embedding.model_dir or APP_MODEL_DIR".into(),
    ))
}
