use std::path::PathBuf;

use anyhow::Context;
use candle_core::{DType, Device};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use nano_fudge::{
    best_device, download_model, load_config, load_safetensors, FudgeDecoder, GuidanceConfig,
    HfTokenizer, Qwen3ForCausalLM, TargetClass,
};

#[derive(Parser, Debug)]
#[command(name = "nano-fudge")]
#[command(about = "Classifier-guided text generation")]
struct Args {
    /// Base model HuggingFace ID
    #[arg(short, long, default_value = "Qwen/Qwen3-0.6B")]
    model: String,

    /// Base model revision
    #[arg(long, default_value = "main")]
    revision: String,

    /// Classifier checkpoint (.safetensors)
    #[arg(short, long)]
    checkpoint: PathBuf,

    /// Target class name or index
    #[arg(short, long, required_unless_present = "list_classes")]
    target: Option<String>,

    /// Input prompt
    #[arg(short, long, default_value = "The weather today is")]
    prompt: String,

    /// JSON file with generation options; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum new tokens
    #[arg(long)]
    max_length: Option<usize>,

    /// Base model temperature
    #[arg(long)]
    temperature: Option<f32>,

    /// Classifier score temperature
    #[arg(long)]
    fudge_temperature: Option<f32>,

    /// Final top-k over fused weights (0 disables)
    #[arg(long)]
    base_top_k: Option<usize>,

    /// Nucleus threshold applied before candidate selection
    #[arg(long)]
    base_top_p: Option<f32>,

    /// Candidates scored by the classifier per step
    #[arg(long)]
    fudge_top_k: Option<usize>,

    /// Weight of the classifier distribution in [0, 1]
    #[arg(long)]
    lambda_weight: Option<f32>,

    /// Sampler seed
    #[arg(long)]
    seed: Option<u64>,

    /// End-of-sequence token id, when the tokenizer's default is wrong
    #[arg(long)]
    eos_token_id: Option<u32>,

    /// Force CPU even when a GPU is available
    #[arg(long)]
    cpu: bool,

    /// Print the checkpoint's classes and exit
    #[arg(long)]
    list_classes: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn guidance_config(&self) -> anyhow::Result<GuidanceConfig> {
        let mut config = match &self.config {
            Some(path) => GuidanceConfig::from_json_file(path)
                .with_context(|| format!("reading {}", path.display()))?,
            None => GuidanceConfig::default(),
        };
        if let Some(v) = self.max_length {
            config.max_length = v;
        }
        if let Some(v) = self.temperature {
            config.temperature = v;
        }
        if let Some(v) = self.fudge_temperature {
            config.fudge_temperature = v;
        }
        if let Some(v) = self.base_top_k {
            config.base_top_k = (v > 0).then_some(v);
        }
        if let Some(v) = self.base_top_p {
            config.base_top_p = Some(v);
        }
        if let Some(v) = self.fudge_top_k {
            config.fudge_top_k = v;
        }
        if let Some(v) = self.lambda_weight {
            config.lambda_weight = v;
        }
        if let Some(v) = self.seed {
            config.seed = Some(v);
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = args.guidance_config()?;
    let device = if args.cpu { Device::Cpu } else { best_device()? };

    if args.list_classes {
        let checkpoint = nano_fudge::FudgeCheckpoint::load(&args.checkpoint, &Device::Cpu)?;
        for (index, name) in checkpoint.labels()?.names().iter().enumerate() {
            println!("{index}\t{name}");
        }
        return Ok(());
    }
    let target = TargetClass::parse(
        args.target
            .as_deref()
            .context("--target is required unless --list-classes is given")?,
    );

    tracing::info!(model = %args.model, revision = %args.revision, "downloading base model");
    let files = download_model(&args.model, &args.revision)?;
    let model_config = load_config(&files.config)?;
    let vb = load_safetensors(&files.weights, DType::F32, &device)?;
    let model = Qwen3ForCausalLM::new(&model_config, vb)?;
    let mut tokenizer = HfTokenizer::from_file(&files.tokenizer)?;
    if let Some(id) = args.eos_token_id {
        tokenizer = tokenizer.with_eos_token_id(id);
    }

    let mut decoder = FudgeDecoder::from_checkpoint(
        model,
        tokenizer,
        &args.checkpoint,
        target.clone(),
        Some(device),
    )?;
    tracing::info!(class = %target, prompt = %args.prompt, "generating");

    let text = decoder.generate(&args.prompt, &config)?;
    println!("{text}");
    Ok(())
}
