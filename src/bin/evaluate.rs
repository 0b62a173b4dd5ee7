//! Stance-model evaluation CLI.
//!
//! Runs a fine-tuned checkpoint over the test split of the debate-speech
//! dataset and prints the accuracy.
//!
//! # Output
//!
//! A single line on stdout on success:
//!
//! ```text
//! test_accuracy: 0.7834
//! ```
//!
//! Exit code 0 on success, non-zero on error.

use clap::Parser;
use stance_fusion_rs::config::EvalConfig;
use stance_fusion_rs::eval::evaluate_checkpoint;

#[derive(Parser, Debug)]
#[command(
    name = "evaluate",
    about = "Evaluate a stance-classification checkpoint",
    long_about = "Run a single evaluation pass over the test split.\n\
                  The config file selects the model (text, audio, or multimodal)\n\
                  and the dataset location; the checkpoint supplies the weights."
)]
struct Args {
    /// Path of the checkpoint file (safetensors).
    checkpoint_path: std::path::PathBuf,

    /// Path of the model's configuration file (YAML).
    cfg_path: std::path::PathBuf,

    /// Device name, "cuda" or "cpu".
    #[arg(long, short = 'd', default_value = "cuda")]
    device: String,
}

fn parse_device(name: &str) -> anyhow::Result<candle_core::Device> {
    match name {
        "cpu" => Ok(candle_core::Device::Cpu),
        "cuda" => Ok(candle_core::Device::new_cuda(0)?),
        other => match other.strip_prefix("cuda:") {
            Some(ordinal) => Ok(candle_core::Device::new_cuda(ordinal.parse()?)?),
            None => anyhow::bail!("unknown device '{other}'. Use cpu, cuda, or cuda:N"),
        },
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let cfg = EvalConfig::from_yaml_file(&args.cfg_path)
        .map_err(|e| anyhow::anyhow!("failed to load config: {e}"))?;
    let device = parse_device(&args.device)?;

    tracing::info!(device = %args.device, checkpoint = %args.checkpoint_path.display(), "starting evaluation");

    let summary = evaluate_checkpoint(&args.checkpoint_path, &cfg, &device)
        .map_err(|e| anyhow::anyhow!("evaluation failed: {e}"))?;

    println!("test_accuracy: {}", summary.accuracy());

    Ok(())
}
