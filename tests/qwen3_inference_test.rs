//! End-to-end tests against the real Qwen/Qwen3-0.6B model.
//!
//! These tests are marked with `#[ignore]` since they require:
//! - Network access to HuggingFace Hub
//! - ~1.2GB disk space for model weights
//! - Several minutes to complete
//!
//! Run with: `cargo test --test qwen3_inference_test -- --ignored`

use std::collections::{BTreeMap, HashMap};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarMap;
use nano_fudge::{
    download_model, load_config, load_safetensors, DistributionBuilder, FilterParams,
    FudgeCheckpoint, FudgeClassifier, FudgeDecoder, GuidanceConfig, HfTokenizer,
    Qwen3ForCausalLM, TextTokenizer,
};

const MODEL_ID: &str = "Qwen/Qwen3-0.6B";
const REVISION: &str = "main";

fn load_base() -> anyhow::Result<(Qwen3ForCausalLM, HfTokenizer, nano_fudge::Qwen3Config)> {
    let files = download_model(MODEL_ID, REVISION)?;
    let config = load_config(&files.config)?;
    let vb = load_safetensors(&files.weights, DType::F32, &Device::Cpu)?;
    let model = Qwen3ForCausalLM::new(&config, vb)?;
    let tokenizer = HfTokenizer::from_file(&files.tokenizer)?;
    Ok((model, tokenizer, config))
}

#[test]
#[ignore = "requires model download"]
fn test_base_distribution_prefers_plausible_continuation() -> anyhow::Result<()> {
    let (model, tokenizer, _) = load_base()?;
    let tokens = tokenizer.encode("The capital of France is")?;
    let mut builder = DistributionBuilder::new(model);

    let dist = builder.next_token_distribution(&tokens, &FilterParams::default())?;
    let sum: f32 = dist.iter().sum();
    assert!((sum - 1.0).abs() < 1e-3);

    let paris = tokenizer.encode(" Paris")?;
    let best = nano_fudge::engine::distribution::top_k_indices(&dist, 5);
    assert!(best.contains(&(paris[0] as usize)), "top-5: {best:?}");
    Ok(())
}

#[test]
#[ignore = "requires model download"]
fn test_guided_generation_with_untrained_classifier() -> anyhow::Result<()> {
    let (model, tokenizer, config) = load_base()?;

    // A randomly initialized classifier over a small backbone still
    // exercises the full checkpoint and decoding path.
    let small = nano_fudge::Qwen3Config {
        hidden_size: 64,
        intermediate_size: 128,
        num_hidden_layers: 1,
        num_attention_heads: 4,
        num_key_value_heads: 2,
        head_dim: 16,
        ..config
    };
    let varmap = VarMap::new();
    let vb = candle_nn::VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    FudgeClassifier::new(&small, 2, vb)?;
    let tensors: HashMap<String, Tensor> = varmap
        .data()
        .lock()
        .unwrap()
        .iter()
        .map(|(name, var)| (name.clone(), var.as_tensor().clone()))
        .collect();

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("fudge.safetensors");
    FudgeCheckpoint {
        label_mapping: BTreeMap::from([("negative".into(), 0), ("positive".into(), 1)]),
        num_labels: 2,
        base_model_name: MODEL_ID.to_string(),
        base_model_config: Some(small),
        tensors,
    }
    .save(&path)?;

    let mut decoder =
        FudgeDecoder::from_checkpoint(model, tokenizer, &path, "positive", Some(Device::Cpu))?;
    let guidance = GuidanceConfig::default()
        .max_length(8)
        .fudge_top_k(16)
        .seed(42);
    let output = decoder.generate_with_details("The weather today is", &guidance)?;

    assert!(output.generated_ids().len() <= 8);
    assert!(output.text.starts_with("The weather today is"));
    println!("{}", output.text);
    Ok(())
}
