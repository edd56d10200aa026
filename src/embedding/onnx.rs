//! ONNX Runtime embedding backend for HuggingFace sentence models.
//!
//! Token embeddings are mean-pooled under the attention mask. Normalization
//! is left to `EmbeddingService`.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use hf_hub::api::sync::ApiBuilder;
use ort::inputs;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::info;

use crate::errors::Error;

use super::{EmbeddingBackend, EmbeddingModelType};

/// Maximum tokens fed to the model; longer texts are truncated.
const MAX_TOKENS: usize = 512;

const SUPPORTED_INPUTS: [&str; 3] = ["input_ids", "attention_mask", "token_type_ids"];

/// ONNX embedding backend.
///
/// `Session::run` needs exclusive access, so the session sits behind a
/// mutex; tokenization runs outside it.
pub struct OnnxBackend {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    requires_token_type_ids: bool,
    model_type: EmbeddingModelType,
}

impl OnnxBackend {
    /// Load model from the HuggingFace cache, downloading on first use.
    ///
    /// Uses the blocking `hf_hub` client; files land under `cache_dir` and
    /// are only fetched once.
    pub fn load(model_type: EmbeddingModelType, cache_dir: &Path) -> Result<Self, Error> {
        if model_type == EmbeddingModelType::Hashing {
            return Err(Error::Embedding(
                "The hashing model has no ONNX weights".to_string(),
            ));
        }

        let api = ApiBuilder::new()
            .with_cache_dir(cache_dir.to_path_buf())
            .build()?;
        let repo = api.model(model_type.model_id().to_string());

        let model_path = repo
            .get("onnx/model.onnx")
            .or_else(|_| repo.get("model.onnx"))?;
        let tokenizer_path = repo.get("tokenizer.json")?;

        info!(model = model_type.model_id(), "loaded embedding model files");
        Self::from_files(model_type, &model_path, &tokenizer_path)
    }

    /// Load model files that are already on disk.
    ///
    /// Looks for `onnx/model.onnx` or `model.onnx`, and `tokenizer.json`.
    pub fn from_dir(model_type: EmbeddingModelType, dir: &Path) -> Result<Self, Error> {
        let model_path = [dir.join("onnx/model.onnx"), dir.join("model.onnx")]
            .into_iter()
            .find(|p| p.exists())
            .ok_or_else(|| Error::FileNotFound(dir.join("model.onnx")))?;
        let tokenizer_path = dir.join("tokenizer.json");
        if !tokenizer_path.exists() {
            return Err(Error::FileNotFound(tokenizer_path));
        }
        Self::from_files(model_type, &model_path, &tokenizer_path)
    }

    fn from_files(
        model_type: EmbeddingModelType,
        model_path: &PathBuf,
        tokenizer_path: &PathBuf,
    ) -> Result<Self, Error> {
        let mut tokenizer = Tokenizer::from_file(tokenizer_path)?;
        tokenizer
            .with_padding(None)
            .with_truncation(Some(TruncationParams {
                max_length: MAX_TOKENS,
                ..Default::default()
            }))?;

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level1)
            .map_err(ort::Error::from)?
            .commit_from_file(model_path)?;

        if let Some(unsupported) = session
            .inputs()
            .iter()
            .map(|input| input.name())
            .find(|name| !SUPPORTED_INPUTS.contains(name))
        {
            return Err(Error::Embedding(format!(
                "Model {} requires unsupported input '{}'",
                model_type.model_id(),
                unsupported
            )));
        }

        let requires_token_type_ids = session
            .inputs()
            .iter()
            .any(|input| input.name() == "token_type_ids");

        Ok(OnnxBackend {
            session: Mutex::new(session),
            tokenizer,
            requires_token_type_ids,
            model_type,
        })
    }
}

impl EmbeddingBackend for OnnxBackend {
    fn model_name(&self) -> &str {
        self.model_type.model_id()
    }

    fn dimensions(&self) -> usize {
        self.model_type.dimensions()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, Error> {
        let dims = self.dimensions();
        let passage = passage_text(self.model_type, text);
        let encoding = self.tokenizer.encode(passage.as_ref(), true)?;
        let input_ids = encoding.get_ids();
        let attention_mask = encoding.get_attention_mask();

        if input_ids.is_empty() {
            return Err(Error::Embedding("Tokenizer produced no tokens".to_string()));
        }

        let seq_len = input_ids.len();

        let input_ids_vec: Vec<i64> = input_ids.iter().map(|&id| id as i64).collect();
        let attention_mask_vec: Vec<i64> = attention_mask.iter().map(|&m| m as i64).collect();

        let input_ids_tensor = Tensor::from_array(([1usize, seq_len], input_ids_vec))?;
        let attention_mask_tensor = Tensor::from_array(([1usize, seq_len], attention_mask_vec))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| Error::Lock(format!("ONNX session: {e}")))?;

        let outputs = if self.requires_token_type_ids {
            let token_type_ids_tensor =
                Tensor::from_array(([1usize, seq_len], vec![0i64; seq_len]))?;
            session.run(inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor
            ])?
        } else {
            session.run(inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor
            ])?
        };

        let (shape, data) = outputs
            .get("last_hidden_state")
            .or_else(|| outputs.get("token_embeddings"))
            .ok_or_else(|| {
                Error::Embedding(
                    "Output tensor 'last_hidden_state' or 'token_embeddings' not found".to_string(),
                )
            })?
            .try_extract_tensor::<f32>()?;

        if shape.len() != 3 || shape[0] != 1 {
            return Err(Error::Embedding(format!(
                "Expected output shape (1, seq_len, hidden), got {:?}",
                shape
            )));
        }

        let hidden_dim = shape[2] as usize;
        if hidden_dim != dims {
            return Err(Error::DimensionMismatch {
                expected: dims,
                actual: hidden_dim,
            });
        }

        Ok(mean_pool(data, attention_mask, hidden_dim, seq_len))
    }
}

/// Text as fed to the tokenizer; E5 input carries a "passage: " prefix.
fn passage_text(model_type: EmbeddingModelType, text: &str) -> Cow<'_, str> {
    match model_type {
        EmbeddingModelType::E5 => Cow::Owned(format!("passage: {text}")),
        _ => Cow::Borrowed(text),
    }
}

/// Average token vectors, weighting each by its attention mask value.
fn mean_pool(data: &[f32], attention_mask: &[u32], hidden_dim: usize, seq_len: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; hidden_dim];

    for (token_idx, chunk) in data.chunks(hidden_dim).take(seq_len).enumerate() {
        let mask_value = attention_mask.get(token_idx).copied().unwrap_or(0) as f32;
        for (pooled_value, value) in pooled.iter_mut().zip(chunk) {
            *pooled_value += value * mask_value;
        }
    }

    let mask_sum: f32 = attention_mask
        .iter()
        .take(seq_len)
        .map(|&m| m as f32)
        .sum::<f32>()
        .max(1e-9);

    for value in pooled.iter_mut() {
        *value /= mask_sum;
    }
    pooled
}
