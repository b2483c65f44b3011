//! Auxiliary classifier checkpoints.
//!
//! A checkpoint is a single `.safetensors` file. The tensors are the
//! classifier's parameters; the header metadata carries everything needed to
//! rebuild it:
//!
//! | key                 | value                                   |
//! |---------------------|-----------------------------------------|
//! | `label_mapping`     | JSON object, class name → index         |
//! | `num_labels`        | decimal integer                         |
//! | `base_model_name`   | HF model id or local model directory    |
//! | `base_model_config` | optional JSON Qwen3 config              |

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use safetensors::SafeTensors;

use crate::error::{Error, Result};
use crate::labels::LabelMapping;
use crate::model::loader::{resolve_config, Qwen3Config};
use crate::model::FudgeClassifier;

const LABEL_MAPPING_KEY: &str = "label_mapping";
const NUM_LABELS_KEY: &str = "num_labels";
const BASE_MODEL_NAME_KEY: &str = "base_model_name";
const BASE_MODEL_CONFIG_KEY: &str = "base_model_config";

/// A trained auxiliary classifier plus its label metadata.
#[derive(Debug, Clone)]
pub struct FudgeCheckpoint {
    /// Class name → index.
    pub label_mapping: BTreeMap<String, usize>,
    /// Total number of classes.
    pub num_labels: usize,
    /// Identifier of the backbone the classifier was trained from.
    pub base_model_name: String,
    /// Backbone config, when embedded for offline loading.
    pub base_model_config: Option<Qwen3Config>,
    /// Classifier parameters by name.
    pub tensors: HashMap<String, Tensor>,
}

impl FudgeCheckpoint {
    /// Writes the checkpoint to a single safetensors file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut metadata = HashMap::new();
        metadata.insert(
            LABEL_MAPPING_KEY.to_string(),
            serde_json::to_string(&self.label_mapping)?,
        );
        metadata.insert(NUM_LABELS_KEY.to_string(), self.num_labels.to_string());
        metadata.insert(BASE_MODEL_NAME_KEY.to_string(), self.base_model_name.clone());
        if let Some(config) = &self.base_model_config {
            metadata.insert(BASE_MODEL_CONFIG_KEY.to_string(), serde_json::to_string(config)?);
        }

        safetensors::serialize_to_file(
            self.tensors.iter().map(|(name, tensor)| (name.as_str(), tensor)),
            &Some(metadata),
            path.as_ref(),
        )?;
        Ok(())
    }

    /// Reads a checkpoint, placing tensors on `device`.
    pub fn load(path: impl AsRef<Path>, device: &Device) -> Result<Self> {
        let path = path.as_ref();
        let buffer = std::fs::read(path)?;

        let (_, header) = SafeTensors::read_metadata(&buffer)?;
        let metadata = header.metadata().as_ref().ok_or_else(|| {
            Error::Checkpoint(format!("{} has no header metadata", path.display()))
        })?;
        let field = |key: &str| {
            metadata
                .get(key)
                .ok_or_else(|| Error::Checkpoint(format!("missing metadata field {key:?}")))
        };

        let label_mapping: BTreeMap<String, usize> =
            serde_json::from_str(field(LABEL_MAPPING_KEY)?)?;
        let num_labels = field(NUM_LABELS_KEY)?.parse::<usize>().map_err(|e| {
            Error::Checkpoint(format!("invalid {NUM_LABELS_KEY}: {e}"))
        })?;
        let base_model_name = field(BASE_MODEL_NAME_KEY)?.clone();
        let base_model_config = metadata
            .get(BASE_MODEL_CONFIG_KEY)
            .map(|json| serde_json::from_str(json))
            .transpose()?;

        let tensors = candle_core::safetensors::load_buffer(&buffer, device)?;

        Ok(Self {
            label_mapping,
            num_labels,
            base_model_name,
            base_model_config,
            tensors,
        })
    }

    /// The validated label mapping.
    pub fn labels(&self) -> Result<LabelMapping> {
        LabelMapping::new(self.label_mapping.clone(), self.num_labels)
    }

    /// The backbone config: embedded if present, otherwise resolved from
    /// `base_model_name` (local directory or HF Hub).
    pub fn backbone_config(&self) -> Result<Qwen3Config> {
        match &self.base_model_config {
            Some(config) => Ok(config.clone()),
            None => resolve_config(&self.base_model_name),
        }
    }

    /// Rebuilds the classifier from the stored parameters.
    pub fn build_classifier(&self, dtype: DType, device: &Device) -> Result<FudgeClassifier> {
        let config = self.backbone_config()?;
        let vb = VarBuilder::from_tensors(self.tensors.clone(), dtype, device);
        FudgeClassifier::new(&config, self.num_labels, vb)
            .map_err(|e| Error::Checkpoint(format!("failed to rebuild classifier: {e}")))
    }
}
