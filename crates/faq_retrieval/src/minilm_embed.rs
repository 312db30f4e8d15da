//! Sentence embeddings from a BERT-style encoder (all-MiniLM-L6-v2 by
//! default) running on candle, CPU only.
//!
//! Weights come from a `.safetensors` file. Shape hyperparameters are read
//! from a `config.json` sitting next to the weights when there is one, and
//! fall back to the all-MiniLM-L6-v2 values otherwise. Output vectors are
//! mean-pooled over tokens and L2-normalized, so cosine equals dot product.

use std::path::Path;

use anyhow::{Context, Result};
use candle_core::{DType, Device, Module, Tensor, D};
use candle_nn::{Linear, VarBuilder};
use serde::Deserialize;
use tracing::{debug, info};

use crate::embed::EmbeddingProvider;

#[derive(Debug, Clone, Deserialize)]
pub struct EncoderConfig {
    pub hidden_size: usize,
    pub intermediate_size: usize,
    pub num_attention_heads: usize,
    pub num_hidden_layers: usize,
    pub vocab_size: usize,
    pub max_position_embeddings: usize,
    pub type_vocab_size: usize,
    #[serde(default = "default_layer_norm_eps")]
    pub layer_norm_eps: f64,
}

fn default_layer_norm_eps() -> f64 {
    1e-12
}

impl EncoderConfig {
    pub fn all_minilm_l6_v2() -> Self {
        Self {
            hidden_size: 384,
            intermediate_size: 1536,
            num_attention_heads: 12,
            num_hidden_layers: 6,
            vocab_size: 30522,
            max_position_embeddings: 512,
            type_vocab_size: 2,
            layer_norm_eps: 1e-12,
        }
    }

    fn head_dim(&self) -> usize {
        self.hidden_size / self.num_attention_heads
    }

    /// Reads `config.json` beside the weights, or the MiniLM defaults.
    fn for_weights(model_path: &Path) -> Result<Self> {
        let path = model_path.with_file_name("config.json");
        if !path.exists() {
            return Ok(Self::all_minilm_l6_v2());
        }
        let file =
            std::fs::File::open(&path).with_context(|| format!("open {}", path.display()))?;
        serde_json::from_reader(file).with_context(|| format!("parse {}", path.display()))
    }
}

struct LayerNorm {
    weight: Tensor,
    bias: Tensor,
    eps: f64,
}

impl LayerNorm {
    fn load(vb: VarBuilder, size: usize, eps: f64) -> Result<Self> {
        Ok(Self {
            weight: vb.get(size, "weight")?,
            bias: vb.get(size, "bias")?,
            eps,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let mean = x.mean_keepdim(D::Minus1)?;
        let centered = x.broadcast_sub(&mean)?;
        let var = centered.sqr()?.mean_keepdim(D::Minus1)?;
        let normed = centered.broadcast_div(&(var + self.eps)?.sqrt()?)?;
        Ok(normed
            .broadcast_mul(&self.weight)?
            .broadcast_add(&self.bias)?)
    }
}

struct SelfAttention {
    query: Linear,
    key: Linear,
    value: Linear,
    output: Linear,
    norm: LayerNorm,
    heads: usize,
    head_dim: usize,
}

impl SelfAttention {
    fn load(vb: VarBuilder, config: &EncoderConfig) -> Result<Self> {
        let h = config.hidden_size;
        let vb = vb.pp("attention");
        let inner = vb.pp("self");

        Ok(Self {
            query: candle_nn::linear(h, h, inner.pp("query"))?,
            key: candle_nn::linear(h, h, inner.pp("key"))?,
            value: candle_nn::linear(h, h, inner.pp("value"))?,
            output: candle_nn::linear(h, h, vb.pp("output").pp("dense"))?,
            norm: LayerNorm::load(vb.pp("output").pp("LayerNorm"), h, config.layer_norm_eps)?,
            heads: config.num_attention_heads,
            head_dim: config.head_dim(),
        })
    }

    fn split_heads(&self, x: &Tensor, seq_len: usize) -> Result<Tensor> {
        Ok(x.reshape((1, seq_len, self.heads, self.head_dim))?
            .transpose(1, 2)?)
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let (_, seq_len, hidden) = x.dims3()?;

        let q = self.split_heads(&self.query.forward(x)?, seq_len)?;
        let k = self.split_heads(&self.key.forward(x)?, seq_len)?;
        let v = self.split_heads(&self.value.forward(x)?, seq_len)?;

        let scale = 1.0 / (self.head_dim as f64).sqrt();
        let weights = q.matmul(&k.t()?)?.affine(scale, 0.0)?;
        let weights = candle_nn::ops::softmax(&weights, D::Minus1)?;
        let context = weights
            .matmul(&v)?
            .transpose(1, 2)?
            .contiguous()?
            .reshape((1, seq_len, hidden))?;

        // residual, post-norm
        self.norm.forward(&(x + self.output.forward(&context)?)?)
    }
}

struct FeedForward {
    up: Linear,
    down: Linear,
    norm: LayerNorm,
}

impl FeedForward {
    fn load(vb: VarBuilder, config: &EncoderConfig) -> Result<Self> {
        Ok(Self {
            up: candle_nn::linear(
                config.hidden_size,
                config.intermediate_size,
                vb.pp("intermediate").pp("dense"),
            )?,
            down: candle_nn::linear(
                config.intermediate_size,
                config.hidden_size,
                vb.pp("output").pp("dense"),
            )?,
            norm: LayerNorm::load(
                vb.pp("output").pp("LayerNorm"),
                config.hidden_size,
                config.layer_norm_eps,
            )?,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let h = self.down.forward(&self.up.forward(x)?.gelu_erf()?)?;
        self.norm.forward(&(x + h)?)
    }
}

struct EncoderLayer {
    attention: SelfAttention,
    ffn: FeedForward,
}

struct Encoder {
    word_embeddings: Tensor,
    position_embeddings: Tensor,
    token_type_embeddings: Tensor,
    embedding_norm: LayerNorm,
    layers: Vec<EncoderLayer>,
    max_positions: usize,
}

impl Encoder {
    fn load(path: &Path, config: &EncoderConfig, device: &Device) -> Result<Self> {
        // SAFETY: the weights file is mapped read-only and must not be
        // modified while the encoder is alive.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[path], DType::F32, device)? };

        let emb = vb.pp("embeddings");
        let h = config.hidden_size;

        let layers = (0..config.num_hidden_layers)
            .map(|i| -> Result<EncoderLayer> {
                let layer_vb = vb.pp("encoder").pp("layer").pp(i.to_string());
                Ok(EncoderLayer {
                    attention: SelfAttention::load(layer_vb.clone(), config)?,
                    ffn: FeedForward::load(layer_vb, config)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            word_embeddings: emb
                .pp("word_embeddings")
                .get((config.vocab_size, h), "weight")?,
            position_embeddings: emb
                .pp("position_embeddings")
                .get((config.max_position_embeddings, h), "weight")?,
            token_type_embeddings: emb
                .pp("token_type_embeddings")
                .get((config.type_vocab_size, h), "weight")?,
            embedding_norm: LayerNorm::load(emb.pp("LayerNorm"), h, config.layer_norm_eps)?,
            layers,
            max_positions: config.max_position_embeddings,
        })
    }

    fn forward(&self, token_ids: &[u32]) -> Result<Vec<f32>> {
        let device = self.word_embeddings.device();
        let seq_len = token_ids.len();

        let ids = Tensor::new(token_ids, device)?;
        let positions: Vec<u32> = (0..seq_len as u32).collect();
        let positions = Tensor::new(positions.as_slice(), device)?;
        let token_types = Tensor::zeros(seq_len, DType::U32, device)?;

        let embedded = ((self.word_embeddings.index_select(&ids, 0)?
            + self.position_embeddings.index_select(&positions, 0)?)?
            + self.token_type_embeddings.index_select(&token_types, 0)?)?;

        let mut hidden = self.embedding_norm.forward(&embedded)?.unsqueeze(0)?;
        for layer in &self.layers {
            hidden = layer.ffn.forward(&layer.attention.forward(&hidden)?)?;
        }

        let pooled = hidden.mean(1)?.squeeze(0)?;
        let norm: f32 = pooled.sqr()?.sum_all()?.sqrt()?.to_scalar()?;
        let pooled = if norm > 0.0 {
            pooled.affine(1.0 / norm as f64, 0.0)?
        } else {
            pooled
        };

        Ok(pooled.to_vec1::<f32>()?)
    }
}

/// Pretrained sentence encoder. Load once at startup and share; `embed` takes
/// `&self` and keeps no per-call state.
pub struct MiniLmEmbeddingProvider {
    encoder: Encoder,
    tokenizer: tokenizers::Tokenizer,
}

impl MiniLmEmbeddingProvider {
    pub fn load(model_path: &Path, tokenizer_path: &Path) -> Result<Self> {
        let config = EncoderConfig::for_weights(model_path)?;
        let encoder = Encoder::load(model_path, &config, &Device::Cpu)
            .with_context(|| format!("load encoder weights {}", model_path.display()))?;

        let tokenizer = tokenizers::Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow::anyhow!("load tokenizer {}: {e}", tokenizer_path.display()))?;

        info!(
            model = %model_path.display(),
            hidden = config.hidden_size,
            layers = config.num_hidden_layers,
            "loaded sentence encoder"
        );

        Ok(Self { encoder, tokenizer })
    }
}

impl EmbeddingProvider for MiniLmEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("tokenize: {e}"))?;

        let mut ids = encoding.get_ids().to_vec();
        if ids.len() > self.encoder.max_positions {
            debug!(
                tokens = ids.len(),
                max = self.encoder.max_positions,
                "truncating encoder input"
            );
            ids.truncate(self.encoder.max_positions);
        }

        self.encoder.forward(&ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::cosine_similarity;
    use std::path::PathBuf;

    fn model_files() -> Option<(PathBuf, PathBuf)> {
        let base = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../models");
        let model = base.join("all-MiniLM-L6-v2.safetensors");
        let tokenizer = base.join("all-MiniLM-L6-v2-tokenizer.json");
        if model.exists() && tokenizer.exists() {
            Some((model, tokenizer))
        } else {
            eprintln!("Skipping: all-MiniLM-L6-v2 model or tokenizer not found");
            None
        }
    }

    #[test]
    fn default_config_has_consistent_head_dim() {
        let config = EncoderConfig::all_minilm_l6_v2();
        assert_eq!(config.head_dim() * config.num_attention_heads, config.hidden_size);
    }

    #[test]
    fn config_json_is_parsed_without_layer_norm_eps() {
        let json = r#"{
            "hidden_size": 384, "intermediate_size": 1536, "num_attention_heads": 12,
            "num_hidden_layers": 6, "vocab_size": 30522, "max_position_embeddings": 512,
            "type_vocab_size": 2, "model_type": "bert"
        }"#;
        let config: EncoderConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.head_dim(), 32);
        assert_eq!(config.layer_norm_eps, 1e-12);
    }

    #[test]
    fn embeddings_are_unit_length() {
        let Some((model, tokenizer)) = model_files() else {
            return;
        };
        let provider = MiniLmEmbeddingProvider::load(&model, &tokenizer).unwrap();
        let embedding = provider.embed("How do I reset my password?").unwrap();

        assert_eq!(embedding.len(), 384);
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01, "L2 norm should be ~1.0, got {norm}");
    }

    #[test]
    fn paraphrase_scores_above_unrelated_question() {
        let Some((model, tokenizer)) = model_files() else {
            return;
        };
        let provider = MiniLmEmbeddingProvider::load(&model, &tokenizer).unwrap();

        let reset = provider.embed("How do I reset my password?").unwrap();
        let paraphrase = provider.embed("How to reset password?").unwrap();
        let shipping = provider.embed("Do you ship internationally?").unwrap();

        assert!(cosine_similarity(&reset, &paraphrase) > cosine_similarity(&reset, &shipping));
    }
}
