//! Local sentence embedder — runs a MiniLM-class BERT encoder via Candle.
//!
//! The model is a lazy singleton: nothing is downloaded or loaded until the
//! first `embed` call, and every later call shares the same weights.
//! Output is mean-pooled over tokens and L2-normalized, dimension
//! [`EMBEDDING_DIM`].

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use hf_hub::api::sync::Api;
use std::sync::Arc;
use tokenizers::Tokenizer;
use tokio::sync::Mutex;
use tracing::{debug, info};

use meshpilot_core::error::RetrievalError;

/// Dimension the encoder produces. The store's vector columns must match;
/// a mismatch is a fatal configuration error checked at service startup.
pub const EMBEDDING_DIM: usize = 384;

const MODEL_REPO: &str = "sentence-transformers/all-MiniLM-L6-v2";

struct EmbedderState {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

/// Lazy-loaded text-to-vector encoder.
///
/// Thread-safe: Candle CPU inference is single-threaded, so the loaded
/// state sits behind a mutex and calls serialize on it.
pub struct Embedder {
    inner: Arc<Mutex<Option<EmbedderState>>>,
}

impl Embedder {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
        }
    }

    /// Encode one string into a mean-pooled, L2-normalized vector.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        // Lazy load on first use.
        {
            let state = self.inner.lock().await;
            if state.is_none() {
                drop(state);
                info!(repo = MODEL_REPO, "Loading embedding model on first use");
                let loaded = tokio::task::spawn_blocking(EmbedderState::load)
                    .await
                    .map_err(|e| {
                        RetrievalError::Embedding(format!("model loading task failed: {e}"))
                    })??;
                let mut state = self.inner.lock().await;
                *state = Some(loaded);
            }
        }

        let text = text.to_string();
        let inner = self.inner.clone();
        let vector = tokio::task::spawn_blocking(move || {
            let mut guard = inner.blocking_lock();
            let state = guard.as_mut().expect("embedder must be loaded");
            state.encode(&text)
        })
        .await
        .map_err(|e| RetrievalError::Embedding(format!("embedding task panicked: {e}")))??;

        if vector.len() != EMBEDDING_DIM {
            return Err(RetrievalError::DimensionMismatch {
                expected: EMBEDDING_DIM,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }
}

impl Default for Embedder {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbedderState {
    fn load() -> Result<Self, RetrievalError> {
        let device = Device::Cpu;

        let api = Api::new()
            .map_err(|e| RetrievalError::Embedding(format!("HuggingFace Hub init failed: {e}")))?;
        let repo = api.model(MODEL_REPO.to_string());

        let config_path = repo
            .get("config.json")
            .map_err(|e| RetrievalError::Embedding(format!("config download failed: {e}")))?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .map_err(|e| RetrievalError::Embedding(format!("tokenizer download failed: {e}")))?;
        let weights_path = repo
            .get("model.safetensors")
            .map_err(|e| RetrievalError::Embedding(format!("weights download failed: {e}")))?;

        let config_text = std::fs::read_to_string(&config_path)
            .map_err(|e| RetrievalError::Embedding(format!("cannot read config: {e}")))?;
        let config: BertConfig = serde_json::from_str(&config_text)
            .map_err(|e| RetrievalError::Embedding(format!("cannot parse config: {e}")))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| RetrievalError::Embedding(format!("cannot load tokenizer: {e}")))?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)
                .map_err(|e| RetrievalError::Embedding(format!("cannot map weights: {e}")))?
        };
        let model = BertModel::load(vb, &config)
            .map_err(|e| RetrievalError::Embedding(format!("cannot load model: {e}")))?;

        info!("Embedding model loaded");
        Ok(Self {
            model,
            tokenizer,
            device,
        })
    }

    fn encode(&mut self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| RetrievalError::Embedding(format!("tokenization failed: {e}")))?;

        let ids = encoding.get_ids();
        let type_ids = encoding.get_type_ids();

        let input_ids = Tensor::new(ids, &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(map_candle)?;
        let token_type_ids = Tensor::new(type_ids, &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(map_candle)?;

        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, None)
            .map_err(map_candle)?;

        // Mean pool over the token dimension, then L2-normalize.
        let (_batch, n_tokens, _dim) = hidden.dims3().map_err(map_candle)?;
        let pooled = hidden
            .sum(1)
            .and_then(|t| t / (n_tokens as f64))
            .map_err(map_candle)?;
        let normalized = normalize_l2(&pooled).map_err(map_candle)?;

        let vector = normalized
            .squeeze(0)
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(map_candle)?;

        debug!(dim = vector.len(), "Text embedded");
        Ok(vector)
    }
}

fn normalize_l2(t: &Tensor) -> candle_core::Result<Tensor> {
    t.broadcast_div(&t.sqr()?.sum_keepdim(1)?.sqrt()?)
}

fn map_candle(e: candle_core::Error) -> RetrievalError {
    RetrievalError::Embedding(format!("candle error: {e}"))
}
