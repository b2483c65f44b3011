//! Text ↔ token id conversion.

use std::path::Path;

use tokenizers::Tokenizer;

use crate::error::{Error, Result};

/// End-of-sequence tokens tried, in order, when none is given explicitly.
const EOS_CANDIDATES: [&str; 4] = ["<|endoftext|>", "</s>", "<|im_end|>", "<eos>"];

/// Tokenizer interface needed by the guided decoder.
pub trait TextTokenizer {
    /// Encodes text into token ids.
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Decodes token ids into text with special tokens stripped.
    fn decode(&self, ids: &[u32]) -> Result<String>;

    /// The end-of-sequence token id, if the vocabulary has one.
    fn eos_token_id(&self) -> Option<u32>;
}

/// [`TextTokenizer`] backed by a HuggingFace `tokenizer.json`.
#[derive(Debug, Clone)]
pub struct HfTokenizer {
    inner: Tokenizer,
    eos_token_id: Option<u32>,
}

impl HfTokenizer {
    /// Wraps a tokenizer, looking up a conventional EOS token.
    pub fn new(inner: Tokenizer) -> Self {
        let eos_token_id = EOS_CANDIDATES
            .iter()
            .find_map(|token| inner.token_to_id(token));
        Self {
            inner,
            eos_token_id,
        }
    }

    /// Loads `tokenizer.json` from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let inner = Tokenizer::from_file(path).map_err(|e| Error::Tokenization(e.to_string()))?;
        Ok(Self::new(inner))
    }

    /// Overrides the end-of-sequence token.
    pub fn with_eos_token_id(mut self, eos_token_id: u32) -> Self {
        self.eos_token_id = Some(eos_token_id);
        self
    }
}

impl TextTokenizer for HfTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| Error::Tokenization(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        self.inner
            .decode(ids, true)
            .map_err(|e| Error::Tokenization(e.to_string()))
    }

    fn eos_token_id(&self) -> Option<u32> {
        self.eos_token_id
    }
}
