//! Model loading utilities.
//!
//! This module provides functions for:
//! - Downloading base models from HuggingFace Hub
//! - Parsing Qwen3 `config.json`
//! - Creating a VarBuilder over SafeTensors weights
//! - Picking the best available device

use std::path::{Path, PathBuf};

use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use hf_hub::{api::sync::Api, Repo, RepoType};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Paths to downloaded model files.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    /// Path to config.json.
    pub config: PathBuf,
    /// Paths to weight files (SafeTensors).
    pub weights: Vec<PathBuf>,
    /// Path to tokenizer.json.
    pub tokenizer: PathBuf,
}

fn hub_repo(model_id: &str, revision: &str) -> Result<hf_hub::api::sync::ApiRepo> {
    let api = Api::new().map_err(|e| Error::ModelLoad(format!("Failed to create HF API: {e}")))?;
    Ok(api.repo(Repo::with_revision(
        model_id.to_string(),
        RepoType::Model,
        revision.to_string(),
    )))
}

/// Downloads model files from HuggingFace Hub.
///
/// # Arguments
///
/// * `model_id` - HuggingFace model ID (e.g., "Qwen/Qwen3-0.6B")
/// * `revision` - Git revision (branch, tag, or commit hash). Use "main" for latest.
pub fn download_model(model_id: &str, revision: &str) -> Result<ModelFiles> {
    let repo = hub_repo(model_id, revision)?;

    let config = repo
        .get("config.json")
        .map_err(|e| Error::ModelLoad(format!("Failed to download config.json: {e}")))?;
    let weights = download_weights(&repo)?;
    let tokenizer = repo
        .get("tokenizer.json")
        .map_err(|e| Error::ModelLoad(format!("Failed to download tokenizer.json: {e}")))?;

    Ok(ModelFiles {
        config,
        weights,
        tokenizer,
    })
}

/// Downloads only `config.json` for a model.
pub fn download_config(model_id: &str, revision: &str) -> Result<PathBuf> {
    hub_repo(model_id, revision)?
        .get("config.json")
        .map_err(|e| Error::ModelLoad(format!("Failed to download config.json for {model_id}: {e}")))
}

fn download_weights(repo: &hf_hub::api::sync::ApiRepo) -> Result<Vec<PathBuf>> {
    if let Ok(path) = repo.get("model.safetensors") {
        return Ok(vec![path]);
    }

    let index_path = repo.get("model.safetensors.index.json").map_err(|_| {
        Error::ModelLoad("No SafeTensors weights found (only SafeTensors is supported)".into())
    })?;
    let index: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&index_path)?)?;
    let weight_map = index["weight_map"]
        .as_object()
        .ok_or_else(|| Error::ModelLoad("Invalid safetensors index: missing weight_map".into()))?;

    let mut shards: Vec<&str> = weight_map.values().filter_map(|v| v.as_str()).collect();
    shards.sort_unstable();
    shards.dedup();

    shards
        .into_iter()
        .map(|name| {
            repo.get(name)
                .map_err(|e| Error::ModelLoad(format!("Failed to download {name}: {e}")))
        })
        .collect()
}

/// Creates a VarBuilder from SafeTensors files.
///
/// # Safety
///
/// Uses memory-mapped file access. This is safe as long as the files are not
/// modified while being read.
#[allow(unsafe_code)]
pub fn load_safetensors(
    paths: &[PathBuf],
    dtype: DType,
    device: &Device,
) -> Result<VarBuilder<'static>> {
    let vb = unsafe { VarBuilder::from_mmaped_safetensors(paths, dtype, device)? };
    Ok(vb)
}

/// Loads a Qwen3 configuration from config.json.
pub fn load_config(path: impl AsRef<Path>) -> Result<Qwen3Config> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::ModelLoad(format!("Failed to read {}: {e}", path.display())))?;
    serde_json::from_str(&content)
        .map_err(|e| Error::ModelLoad(format!("Failed to parse {}: {e}", path.display())))
}

/// Resolves the config for a model given as a local directory or a hub id.
pub fn resolve_config(model: &str) -> Result<Qwen3Config> {
    let local = Path::new(model).join("config.json");
    if local.is_file() {
        return load_config(local);
    }
    load_config(download_config(model, "main")?)
}

/// The best available device: CUDA when compiled in and present, else CPU.
pub fn best_device() -> Result<Device> {
    Ok(Device::cuda_if_available(0)?)
}

/// Qwen3 model configuration from HuggingFace config.json.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Qwen3Config {
    /// Vocabulary size.
    pub vocab_size: usize,
    /// Hidden dimension.
    pub hidden_size: usize,
    /// Intermediate dimension (MLP).
    pub intermediate_size: usize,
    /// Number of transformer layers.
    pub num_hidden_layers: usize,
    /// Number of attention heads.
    pub num_attention_heads: usize,
    /// Number of key-value heads (for GQA).
    pub num_key_value_heads: usize,
    /// Dimension per attention head.
    #[serde(default = "default_head_dim")]
    pub head_dim: usize,
    /// RMSNorm epsilon.
    #[serde(default = "default_rms_norm_eps")]
    pub rms_norm_eps: f64,
    /// RoPE theta.
    #[serde(default = "default_rope_theta")]
    pub rope_theta: f64,
    /// Maximum sequence length.
    #[serde(default = "default_max_position_embeddings")]
    pub max_position_embeddings: usize,
    /// Whether to tie word embeddings with lm_head.
    #[serde(default = "default_tie_word_embeddings")]
    pub tie_word_embeddings: bool,
}

fn default_head_dim() -> usize {
    128
}

fn default_rms_norm_eps() -> f64 {
    1e-6
}

fn default_rope_theta() -> f64 {
    1000000.0
}

fn default_max_position_embeddings() -> usize {
    40960
}

fn default_tie_word_embeddings() -> bool {
    true
}

impl Qwen3Config {
    /// Number of query heads sharing each KV head.
    pub fn num_kv_groups(&self) -> usize {
        self.num_attention_heads / self.num_key_value_heads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qwen3_config_defaults() {
        let json = r#"{
            "vocab_size": 1000,
            "hidden_size": 64,
            "intermediate_size": 128,
            "num_hidden_layers": 2,
            "num_attention_heads": 4,
            "num_key_value_heads": 2
        }"#;

        let config: Qwen3Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.head_dim, 128);
        assert!(config.tie_word_embeddings);
        assert_eq!(config.num_kv_groups(), 2);
    }

    #[test]
    fn test_resolve_config_from_local_dir() {
        let dir = tempfile::tempdir().unwrap();
        let json = r#"{
            "vocab_size": 32,
            "hidden_size": 16,
            "intermediate_size": 32,
            "num_hidden_layers": 1,
            "num_attention_heads": 2,
            "num_key_value_heads": 1,
            "head_dim": 8
        }"#;
        std::fs::write(dir.path().join("config.json"), json).unwrap();

        let config = resolve_config(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(config.vocab_size, 32);
        assert_eq!(config.head_dim, 8);
    }
}
