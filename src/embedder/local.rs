//! Offline embedder running a sentence-transformers model through candle.
//!
//! Only built with the `local-model` feature. The model is downloaded from the
//! Hugging Face Hub on first load and cached by `hf-hub`.

use super::Embedder;
use crate::error::EmbedError;
use async_trait::async_trait;
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use hf_hub::{Repo, RepoType, api::sync::Api};
use std::sync::Arc;
use tokenizers::Tokenizer;

/// Default offline model.
pub const MINILM: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// A BERT-family model loaded in-process.
pub struct LocalEmbedder {
    model_id: String,
    model: Arc<LocalModel>,
}

struct LocalModel {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

fn load_err(what: &str, err: impl std::fmt::Display) -> EmbedError {
    EmbedError::Api(format!("{}: {}", what, err))
}

impl LocalEmbedder {
    /// Load a sentence-transformers model by Hub id.
    pub fn load(model_id: &str) -> Result<Self, EmbedError> {
        let device = Device::Cpu;

        let api = Api::new().map_err(|e| load_err("failed to create HF Hub API", e))?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));

        let config_path = repo
            .get("config.json")
            .map_err(|e| load_err("failed to get config.json", e))?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .map_err(|e| load_err("failed to get tokenizer.json", e))?;
        let weights_path = repo
            .get("model.safetensors")
            .map_err(|e| load_err("failed to get model weights", e))?;

        let raw_config = std::fs::read_to_string(&config_path)
            .map_err(|e| load_err("failed to read config", e))?;
        let config: BertConfig =
            serde_json::from_str(&raw_config).map_err(|e| load_err("failed to parse config", e))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| load_err("failed to load tokenizer", e))?;

        // SAFETY: the weights file is owned by the hf-hub cache and not modified while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, &device) }
            .map_err(|e| load_err("failed to map weights", e))?;
        let model = BertModel::load(vb, &config).map_err(|e| load_err("failed to load model", e))?;

        Ok(Self {
            model_id: model_id.to_string(),
            model: Arc::new(LocalModel {
                model,
                tokenizer,
                device,
            }),
        })
    }
}

impl LocalModel {
    /// Mean-pooled, normalized sentence embedding for one text.
    fn forward(&self, text: &str) -> candle_core::Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| candle_core::Error::Msg(format!("tokenization failed: {}", e)))?;

        let ids = encoding.get_ids();
        let len = ids.len();
        let input_ids = Tensor::from_vec(ids.to_vec(), (1, len), &self.device)?;
        let attention_mask =
            Tensor::from_vec(encoding.get_attention_mask().to_vec(), (1, len), &self.device)?;
        let token_type_ids = Tensor::zeros((1, len), candle_core::DType::U32, &self.device)?;

        let output = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;

        let mask = attention_mask
            .unsqueeze(2)?
            .to_dtype(output.dtype())?
            .broadcast_as(output.shape())?;
        let summed = (output * &mask)?.sum(1)?;
        let counts = mask.sum(1)?.clamp(1e-9, f64::MAX)?;
        let mean = (summed / counts)?;

        let norm = mean.sqr()?.sum_keepdim(1)?.sqrt()?;
        let normalized = mean.broadcast_div(&norm)?;

        normalized.squeeze(0)?.to_vec1::<f32>()
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn name(&self) -> &str {
        "local"
    }

    async fn embed(&self, text: &str, model_id: &str) -> Result<Vec<f32>, EmbedError> {
        if model_id != self.model_id {
            return Err(EmbedError::Api(format!(
                "local embedder loaded '{}', asked for '{}'",
                self.model_id, model_id
            )));
        }
        // Inference is CPU-bound; keep it off the async worker threads.
        let model = Arc::clone(&self.model);
        let text = text.to_string();
        tokio::task::spawn_blocking(move || model.forward(&text))
            .await
            .map_err(|e| EmbedError::Api(format!("local inference task failed: {}", e)))?
            .map_err(|e| EmbedError::Api(format!("local inference failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "downloads the model from the Hugging Face Hub"]
    async fn test_concurrent_embeds_agree() {
        let embedder = LocalEmbedder::load(MINILM).unwrap();
        let (a, b) = tokio::join!(
            embedder.embed("payroll run failed", MINILM),
            embedder.embed("payroll run failed", MINILM),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a, b);
        assert_eq!(a.len(), 384);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);

        let err = embedder.embed("x", "other-model").await.unwrap_err();
        assert!(matches!(err, EmbedError::Api(_)));
    }
}
