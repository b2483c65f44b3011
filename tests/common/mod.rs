//! Test doubles for the decoder's collaborators.

#![allow(dead_code)]

use candle_core::{DType, Device, Result, Tensor};
use candle_nn::{VarBuilder, VarMap};
use nano_fudge::{
    Error, LanguageModel, Qwen3Config, SequenceClassifier, TextTokenizer,
};

pub const VOCAB: [&str; 10] = [
    "<eos>", "the", "weather", "today", "is", "sunny", "rainy", "cold", "warm", "nice",
];
pub const EOS: u32 = 0;

pub type LogitsFn = Box<dyn Fn(&[u32]) -> Vec<f32>>;
pub type ScoreFn = Box<dyn Fn(&[u32]) -> f32>;

/// Base model whose logits are a function of the whole prefix.
pub struct ScriptedModel {
    logits: LogitsFn,
    device: Device,
    pub calls: usize,
}

impl ScriptedModel {
    pub fn new(logits: impl Fn(&[u32]) -> Vec<f32> + 'static) -> Self {
        Self {
            logits: Box::new(logits),
            device: Device::Cpu,
            calls: 0,
        }
    }

    /// Prefers `1 + last % 9`, never EOS.
    pub fn chain() -> Self {
        Self::new(|tokens| {
            let last = *tokens.last().unwrap();
            let preferred = 1 + (last as usize % (VOCAB.len() - 1));
            let mut logits = vec![0.0f32; VOCAB.len()];
            logits[EOS as usize] = -5.0;
            logits[preferred] = 3.0;
            logits
        })
    }

    /// Fixed logits regardless of input.
    pub fn constant(logits: Vec<f32>) -> Self {
        Self::new(move |_| logits.clone())
    }
}

impl LanguageModel for ScriptedModel {
    fn forward_last(&mut self, input_ids: &Tensor) -> Result<Tensor> {
        self.calls += 1;
        let rows = input_ids.to_vec2::<u32>()?;
        let logits = (self.logits)(&rows[0]);
        Tensor::new(logits.as_slice(), &self.device)?.unsqueeze(0)
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

/// Classifier whose on-track score is a function of each row.
pub struct ScriptedClassifier {
    score: ScoreFn,
    num_labels: usize,
    pub max_batch_rows: usize,
    pub rows_scored: usize,
}

impl ScriptedClassifier {
    pub fn new(score: impl Fn(&[u32]) -> f32 + 'static) -> Self {
        Self {
            score: Box::new(score),
            num_labels: 2,
            max_batch_rows: 0,
            rows_scored: 0,
        }
    }

    /// Scores a row by the id of its last token: higher ids are "on track".
    pub fn prefers_high_ids() -> Self {
        Self::new(|row| *row.last().unwrap() as f32)
    }

    pub fn with_num_labels(mut self, num_labels: usize) -> Self {
        self.num_labels = num_labels;
        self
    }
}

impl SequenceClassifier for ScriptedClassifier {
    fn class_logits(&mut self, input_ids: &Tensor) -> Result<Tensor> {
        let rows = input_ids.to_vec2::<u32>()?;
        self.max_batch_rows = self.max_batch_rows.max(rows.len());
        self.rows_scored += rows.len();

        let mut out = Vec::with_capacity(rows.len() * self.num_labels);
        for row in &rows {
            let mut logits = vec![0.0f32; self.num_labels];
            if self.num_labels > 1 {
                logits[1] = (self.score)(row);
            }
            out.extend(logits);
        }
        Tensor::from_vec(out, (rows.len(), self.num_labels), &Device::Cpu)
    }

    fn num_labels(&self) -> usize {
        self.num_labels
    }
}

/// Whitespace tokenizer over [`VOCAB`].
#[derive(Debug, Clone, Default)]
pub struct WordTokenizer;

impl TextTokenizer for WordTokenizer {
    fn encode(&self, text: &str) -> nano_fudge::Result<Vec<u32>> {
        text.split_whitespace()
            .map(|word| {
                let lower = word.to_lowercase();
                VOCAB
                    .iter()
                    .position(|v| *v == lower)
                    .map(|i| i as u32)
                    .ok_or_else(|| Error::Tokenization(format!("unknown word {word:?}")))
            })
            .collect()
    }

    fn decode(&self, ids: &[u32]) -> nano_fudge::Result<String> {
        let words: Vec<&str> = ids
            .iter()
            .filter(|&&id| id != EOS)
            .map(|&id| VOCAB[id as usize])
            .collect();
        Ok(words.join(" "))
    }

    fn eos_token_id(&self) -> Option<u32> {
        Some(EOS)
    }
}

/// A Qwen3 config small enough to run with random weights.
pub fn tiny_qwen3_config() -> Qwen3Config {
    serde_json::from_str(
        r#"{
            "vocab_size": 10,
            "hidden_size": 16,
            "intermediate_size": 32,
            "num_hidden_layers": 2,
            "num_attention_heads": 4,
            "num_key_value_heads": 2,
            "head_dim": 4,
            "max_position_embeddings": 64
        }"#,
    )
    .unwrap()
}

/// A randomly initialized VarBuilder and its backing map.
pub fn random_var_builder() -> (VarMap, VarBuilder<'static>) {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    (varmap, vb)
}
