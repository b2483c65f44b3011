//! Qwen3 model implementation.
//!
//! Full-sequence forward passes only: every call re-encodes the whole input,
//! so there is no KV cache to keep in sync between the base model and the
//! hypothetical continuations scored by the classifier.
//!
//! ## Architecture
//!
//! ```text
//! Input Token IDs [batch, seq_len]
//!       │
//!       ▼
//! ┌───────────────┐
//! │  Embedding    │  vocab_size → hidden_size
//! └───────────────┘
//!       │
//!       ▼
//! ┌───────────────┐
//! │ DecoderLayer  │ × num_hidden_layers   (RMSNorm → GQA+RoPE → RMSNorm → SwiGLU)
//! └───────────────┘
//!       │
//!       ▼
//! ┌───────────────┐
//! │   RMSNorm     │
//! └───────────────┘
//!       │
//!       ▼
//! Hidden states [batch, seq_len, hidden_size]
//! ```

use candle_core::{DType, Device, Module, Result, Tensor};
use candle_nn::{embedding, linear_no_bias, rms_norm, Embedding, Linear, RmsNorm, VarBuilder};

use super::loader::Qwen3Config;
use super::LanguageModel;

/// Precomputed RoPE tables, `[max_seq_len, head_dim / 2]`.
#[derive(Debug, Clone)]
struct RotaryEmbedding {
    cos: Tensor,
    sin: Tensor,
}

impl RotaryEmbedding {
    fn new(config: &Qwen3Config, dtype: DType, device: &Device) -> Result<Self> {
        let dim = config.head_dim;
        let max_len = config.max_position_embeddings;
        let inv_freq: Vec<f32> = (0..dim)
            .step_by(2)
            .map(|i| 1.0 / config.rope_theta.powf(i as f64 / dim as f64) as f32)
            .collect();
        let inv_freq = Tensor::from_vec(inv_freq, (1, dim / 2), device)?;
        let positions = Tensor::arange(0u32, max_len as u32, device)?
            .to_dtype(DType::F32)?
            .reshape((max_len, 1))?;
        let freqs = positions.matmul(&inv_freq)?;

        Ok(Self {
            cos: freqs.cos()?.to_dtype(dtype)?,
            sin: freqs.sin()?.to_dtype(dtype)?,
        })
    }

    /// Rotates `[batch, heads, seq_len, head_dim]` starting at position 0.
    fn apply(&self, x: &Tensor) -> Result<Tensor> {
        let seq_len = x.dim(2)?;
        let cos = self.cos.narrow(0, 0, seq_len)?;
        let sin = self.sin.narrow(0, 0, seq_len)?;
        candle_nn::rotary_emb::rope(&x.contiguous()?, &cos, &sin)
    }
}

#[derive(Debug, Clone)]
struct Attention {
    q_proj: Linear,
    k_proj: Linear,
    v_proj: Linear,
    o_proj: Linear,
    q_norm: RmsNorm,
    k_norm: RmsNorm,
    num_heads: usize,
    num_kv_heads: usize,
    head_dim: usize,
}

impl Attention {
    fn new(config: &Qwen3Config, vb: VarBuilder) -> Result<Self> {
        let hidden = config.hidden_size;
        let head_dim = config.head_dim;
        let num_heads = config.num_attention_heads;
        let num_kv_heads = config.num_key_value_heads;

        Ok(Self {
            q_proj: linear_no_bias(hidden, num_heads * head_dim, vb.pp("q_proj"))?,
            k_proj: linear_no_bias(hidden, num_kv_heads * head_dim, vb.pp("k_proj"))?,
            v_proj: linear_no_bias(hidden, num_kv_heads * head_dim, vb.pp("v_proj"))?,
            o_proj: linear_no_bias(num_heads * head_dim, hidden, vb.pp("o_proj"))?,
            q_norm: rms_norm(head_dim, config.rms_norm_eps, vb.pp("q_norm"))?,
            k_norm: rms_norm(head_dim, config.rms_norm_eps, vb.pp("k_norm"))?,
            num_heads,
            num_kv_heads,
            head_dim,
        })
    }

    fn forward(&self, x: &Tensor, rope: &RotaryEmbedding, mask: &Tensor) -> Result<Tensor> {
        let (batch, seq_len, _) = x.dims3()?;

        // Per-head RMSNorm happens before heads are moved to dim 1.
        let q = self
            .q_proj
            .forward(x)?
            .reshape((batch, seq_len, self.num_heads, self.head_dim))?;
        let q = self.q_norm.forward(&q)?.transpose(1, 2)?;
        let k = self
            .k_proj
            .forward(x)?
            .reshape((batch, seq_len, self.num_kv_heads, self.head_dim))?;
        let k = self.k_norm.forward(&k)?.transpose(1, 2)?;
        let v = self
            .v_proj
            .forward(x)?
            .reshape((batch, seq_len, self.num_kv_heads, self.head_dim))?
            .transpose(1, 2)?;

        let q = rope.apply(&q)?;
        let k = self.repeat_kv(rope.apply(&k)?)?.contiguous()?;
        let v = self.repeat_kv(v)?.contiguous()?;

        let scale = 1.0 / (self.head_dim as f64).sqrt();
        let scores = (q.matmul(&k.t()?)? * scale)?.broadcast_add(mask)?;
        let probs = candle_nn::ops::softmax_last_dim(&scores)?;

        let out = probs
            .matmul(&v)?
            .transpose(1, 2)?
            .reshape((batch, seq_len, self.num_heads * self.head_dim))?;
        self.o_proj.forward(&out)
    }

    /// `[batch, kv_heads, seq, dim]` → `[batch, heads, seq, dim]`.
    fn repeat_kv(&self, x: Tensor) -> Result<Tensor> {
        let n_rep = self.num_heads / self.num_kv_heads;
        if n_rep == 1 {
            return Ok(x);
        }
        let (batch, kv_heads, seq_len, head_dim) = x.dims4()?;
        x.unsqueeze(2)?
            .expand((batch, kv_heads, n_rep, seq_len, head_dim))?
            .reshape((batch, kv_heads * n_rep, seq_len, head_dim))
    }
}

#[derive(Debug, Clone)]
struct Mlp {
    gate_proj: Linear,
    up_proj: Linear,
    down_proj: Linear,
}

impl Mlp {
    fn new(config: &Qwen3Config, vb: VarBuilder) -> Result<Self> {
        let (hidden, inter) = (config.hidden_size, config.intermediate_size);
        Ok(Self {
            gate_proj: linear_no_bias(hidden, inter, vb.pp("gate_proj"))?,
            up_proj: linear_no_bias(hidden, inter, vb.pp("up_proj"))?,
            down_proj: linear_no_bias(inter, hidden, vb.pp("down_proj"))?,
        })
    }
}

impl Module for Mlp {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let gate = self.gate_proj.forward(x)?.silu()?;
        let up = self.up_proj.forward(x)?;
        self.down_proj.forward(&(gate * up)?)
    }
}

#[derive(Debug, Clone)]
struct DecoderLayer {
    input_layernorm: RmsNorm,
    self_attn: Attention,
    post_attention_layernorm: RmsNorm,
    mlp: Mlp,
}

impl DecoderLayer {
    fn new(config: &Qwen3Config, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            input_layernorm: rms_norm(
                config.hidden_size,
                config.rms_norm_eps,
                vb.pp("input_layernorm"),
            )?,
            self_attn: Attention::new(config, vb.pp("self_attn"))?,
            post_attention_layernorm: rms_norm(
                config.hidden_size,
                config.rms_norm_eps,
                vb.pp("post_attention_layernorm"),
            )?,
            mlp: Mlp::new(config, vb.pp("mlp"))?,
        })
    }

    fn forward(&self, x: &Tensor, rope: &RotaryEmbedding, mask: &Tensor) -> Result<Tensor> {
        let h = self.input_layernorm.forward(x)?;
        let x = (x + self.self_attn.forward(&h, rope, mask)?)?;
        let h = self.post_attention_layernorm.forward(&x)?;
        x + self.mlp.forward(&h)?
    }
}

/// Qwen3 transformer backbone (without any output head).
#[derive(Debug, Clone)]
pub struct Qwen3Model {
    embed_tokens: Embedding,
    layers: Vec<DecoderLayer>,
    norm: RmsNorm,
    rotary: RotaryEmbedding,
    device: Device,
    dtype: DType,
}

impl Qwen3Model {
    /// Builds the backbone. `vb` must point at the `model.` prefix.
    pub fn new(config: &Qwen3Config, vb: VarBuilder) -> Result<Self> {
        let embed_tokens = embedding(config.vocab_size, config.hidden_size, vb.pp("embed_tokens"))?;
        let layers = (0..config.num_hidden_layers)
            .map(|i| DecoderLayer::new(config, vb.pp(format!("layers.{i}"))))
            .collect::<Result<Vec<_>>>()?;
        let norm = rms_norm(config.hidden_size, config.rms_norm_eps, vb.pp("norm"))?;
        let rotary = RotaryEmbedding::new(config, vb.dtype(), vb.device())?;

        Ok(Self {
            embed_tokens,
            layers,
            norm,
            rotary,
            device: vb.device().clone(),
            dtype: vb.dtype(),
        })
    }

    /// Hidden states `[batch, seq_len, hidden_size]` for `[batch, seq_len]` ids.
    pub fn forward(&self, input_ids: &Tensor) -> Result<Tensor> {
        let (_, seq_len) = input_ids.dims2()?;
        let mask = causal_mask(seq_len, self.dtype, &self.device)?;

        let mut hidden = self.embed_tokens.forward(input_ids)?;
        for layer in &self.layers {
            hidden = layer.forward(&hidden, &self.rotary, &mask)?;
        }
        self.norm.forward(&hidden)
    }

    /// Returns the device.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Returns the embedding layer.
    pub fn embed_tokens(&self) -> &Embedding {
        &self.embed_tokens
    }
}

/// `[1, 1, seq_len, seq_len]` additive mask hiding future positions.
fn causal_mask(seq_len: usize, dtype: DType, device: &Device) -> Result<Tensor> {
    let mask: Vec<f32> = (0..seq_len)
        .flat_map(|q| (0..seq_len).map(move |k| if k > q { f32::NEG_INFINITY } else { 0.0 }))
        .collect();
    Tensor::from_vec(mask, (1, 1, seq_len, seq_len), device)?.to_dtype(dtype)
}

/// Qwen3 with a language-model head, used as the base model.
#[derive(Debug, Clone)]
pub struct Qwen3ForCausalLM {
    model: Qwen3Model,
    lm_head: Linear,
}

impl Qwen3ForCausalLM {
    /// Creates the model from a VarBuilder over a HuggingFace checkpoint.
    pub fn new(config: &Qwen3Config, vb: VarBuilder) -> Result<Self> {
        let model = Qwen3Model::new(config, vb.pp("model"))?;
        let lm_head = if config.tie_word_embeddings {
            Linear::new(model.embed_tokens().embeddings().clone(), None)
        } else {
            linear_no_bias(config.hidden_size, config.vocab_size, vb.pp("lm_head"))?
        };
        Ok(Self { model, lm_head })
    }

    /// Logits for the last position, `[batch, vocab_size]`.
    pub fn forward(&self, input_ids: &Tensor) -> Result<Tensor> {
        let hidden = self.model.forward(input_ids)?;
        let seq_len = hidden.dim(1)?;
        let last = hidden.narrow(1, seq_len - 1, 1)?.squeeze(1)?;
        self.lm_head.forward(&last)
    }
}

impl LanguageModel for Qwen3ForCausalLM {
    fn forward_last(&mut self, input_ids: &Tensor) -> Result<Tensor> {
        self.forward(input_ids)
    }

    fn device(&self) -> &Device {
        self.model.device()
    }
}
