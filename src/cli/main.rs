//! Menu banner CLI
//!
//! Subcommands: `banner` renders an advertising banner, `copy` writes SNS
//! captions, `evaluate` scores captions (optionally per persona), `weights`
//! manages the model cache and `providers` prints accelerator diagnostics.

use super::config::CliConfigBuilder;
use crate::cache::{format_size, ModelCache};
use crate::copywriter::{
    evaluate_copy, evaluate_personas, generate_copy, CopyRequest, CopyResult, OpenAiChat, Persona,
};
use crate::download::WeightDownloader;
use crate::processor::BannerPipeline;
use crate::services::ImageIOService;
use crate::types::{BannerRequest, OverlayPosition};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

/// Advertising banner and SNS copy generator for menu items
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "menu-banner")]
pub struct Cli {
    /// Verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit JSON log lines (needs the `tracing-json` feature)
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate a banner from a product photo
    Banner(BannerArgs),
    /// Write captions, a one-liner and hashtags
    Copy(CopyArgs),
    /// Score captions, overall or per persona
    Evaluate(EvaluateArgs),
    /// Manage cached model weights
    Weights(WeightsArgs),
    /// Show execution provider diagnostics
    Providers,
}

#[derive(Args, Debug, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct BannerArgs {
    /// Product image
    #[arg(value_name = "IMAGE")]
    pub input: PathBuf,

    /// Menu name, e.g. "아메리카노"
    #[arg(long)]
    pub menu: String,

    /// Scene context, e.g. "비 오는 아침"
    #[arg(long, default_value = "")]
    pub context: String,

    /// Tone: 따뜻함, 유머, 프리미엄, 담백 (or free text)
    #[arg(long, default_value = "담백")]
    pub tone: String,

    /// Channel: 피드 or 스토리
    #[arg(long, default_value = "피드")]
    pub channel: String,

    /// Overlay text; defaults to "<menu> - 오늘의 추천 메뉴"
    #[arg(long)]
    pub text: Option<String>,

    /// Overlay anchor: auto, top_left, top_right, bottom_left, bottom_right
    #[arg(long, default_value = "auto")]
    pub position: OverlayPosition,

    /// Overlay styling description, e.g. "bold white brush lettering" (gemini backend only)
    #[arg(long)]
    pub style: Option<String>,

    /// Optional person reference image (remote backend only)
    #[arg(long)]
    pub person: Option<PathBuf>,

    /// Optional background reference image (remote backend only)
    #[arg(long)]
    pub background: Option<PathBuf>,

    /// Output PNG path ("-" for stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print `{"image_base64": ...}` instead of writing a file
    #[arg(long)]
    pub base64: bool,

    /// Extraction method: rembg or sam
    #[arg(long)]
    pub method: Option<String>,

    /// Synthesis strategy: inpaint or txt2img
    #[arg(long)]
    pub strategy: Option<String>,

    /// Synthesis backend: diffusion or gemini
    #[arg(long)]
    pub backend: Option<String>,

    /// Use the higher-capacity checkpoint
    #[arg(long)]
    pub large: bool,

    /// Inference steps (1-150)
    #[arg(long)]
    pub steps: Option<u32>,

    /// Upscaler: lanczos or realesrgan
    #[arg(long)]
    pub upscaler: Option<String>,

    /// Compose the prompt in English instead of translating it
    #[arg(long)]
    pub no_translate: bool,

    /// Execution provider: auto, cpu, cuda, coreml
    #[arg(short = 'e', long)]
    pub execution_provider: Option<String>,

    /// Intra-op threads (0 = auto)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Overlay font file
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// Write intermediate images under this directory
    #[arg(long)]
    pub debug_dir: Option<PathBuf>,

    /// Per-stage deadline in seconds
    #[arg(long)]
    pub stage_timeout: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct CopyArgs {
    #[arg(long)]
    pub menu: String,
    #[arg(long, default_value = "")]
    pub context: String,
    #[arg(long, default_value = "따뜻함")]
    pub tone: String,
    #[arg(long, default_value = "피드")]
    pub channel: String,
    /// Words the copy must contain (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub required: Vec<String>,
    /// Words the copy must avoid (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub banned: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct EvaluateArgs {
    #[arg(long)]
    pub caption: String,
    #[arg(long, default_value = "")]
    pub one_liner: String,
    /// Hashtags (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub hashtags: Vec<String>,
    /// JSON file with `[{"id", "name", "description"}]` to score per persona
    #[arg(long)]
    pub personas: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct WeightsArgs {
    /// Download the default matting and super-resolution weights
    #[arg(long)]
    pub download: bool,
    /// List cached weights
    #[arg(long)]
    pub list: bool,
    /// Clear cached weights (all, or only the named entry)
    #[arg(long, value_name = "NAME", num_args = 0..=1, default_missing_value = "")]
    pub clear: Option<String>,
    /// Show the cache directory
    #[arg(long)]
    pub show_dir: bool,
    /// Use a custom cache directory
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,
}

/// CLI entry point
///
/// # Errors
/// Any failure of the selected subcommand.
pub async fn main() -> Result<()> {
    let cli = Cli::parse();
    crate::tracing_config::init_cli_tracing(cli.verbose, cli.json_logs)
        .context("Failed to initialize tracing")?;

    let outcome = match &cli.command {
        Command::Banner(args) => run_banner(args).await,
        Command::Copy(args) => run_copy(args).await,
        Command::Evaluate(args) => run_evaluate(args).await,
        Command::Weights(args) => run_weights(args).await,
        Command::Providers => {
            show_provider_diagnostics();
            Ok(())
        },
    };
    if let Err(e) = &outcome {
        crate::tracing_config::events::error_with_context(e.as_ref(), "command failed");
    }
    outcome
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed_precise}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

async fn read_optional(path: Option<&PathBuf>) -> Result<Option<Vec<u8>>> {
    match path {
        Some(path) => Ok(Some(
            ImageIOService::read_bytes_async(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?,
        )),
        None => Ok(None),
    }
}

async fn run_banner(args: &BannerArgs) -> Result<()> {
    let config = CliConfigBuilder::from_banner_args(args).context("Invalid configuration")?;
    let product = ImageIOService::read_bytes_async(&args.input)
        .await
        .with_context(|| format!("Failed to read {}", args.input.display()))?;

    let mut builder = BannerRequest::builder(product)
        .menu(args.menu.as_str())
        .context(args.context.as_str())
        .tone(&args.tone)
        .channel(&args.channel)
        .position(args.position);
    if let Some(text) = &args.text {
        builder = builder.text_overlay(text.as_str());
    }
    if let Some(style) = &args.style {
        builder = builder.overlay_style(style.as_str());
    }
    if let Some(person) = read_optional(args.person.as_ref()).await? {
        builder = builder.person(person);
    }
    if let Some(background) = read_optional(args.background.as_ref()).await? {
        builder = builder.background(background);
    }
    let request = builder.build()?;

    let pipeline = BannerPipeline::new(config).context("Failed to create banner pipeline")?;
    let pb = spinner(&format!("Generating banner for {}", args.menu));
    let result = pipeline.generate(&request).await;
    pb.finish_and_clear();
    let result = result.context("Banner generation failed")?;

    tracing::info!(
        width = result.dimensions.0,
        height = result.dimensions.1,
        total_ms = result.timings.total_ms,
        "Banner ready"
    );

    if args.base64 {
        println!("{}", result.to_json());
        return Ok(());
    }

    let output = args.output.clone().unwrap_or_else(|| {
        let stem = args
            .input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("banner");
        args.input.with_file_name(format!("{}_banner.png", stem))
    });
    if output.as_os_str() == "-" {
        std::io::stdout()
            .write_all(&result.png)
            .context("Failed to write to stdout")?;
    } else {
        ImageIOService::write_bytes(&output, &result.png)?;
        println!("✅ Banner written to {}", output.display());
    }
    Ok(())
}

fn chat_model() -> Result<OpenAiChat> {
    let config = crate::config::PipelineConfig::from_env().context("Invalid environment")?;
    let client = reqwest::Client::builder()
        .timeout(config.endpoints.request_timeout)
        .build()
        .context("Failed to build HTTP client")?;
    Ok(OpenAiChat::new(client, &config.endpoints)?)
}

async fn run_copy(args: &CopyArgs) -> Result<()> {
    let model = chat_model()?;
    let request = CopyRequest {
        menu: args.menu.clone(),
        context: args.context.clone(),
        tone: args.tone.clone(),
        channel: args.channel.clone(),
        required_words: args.required.clone(),
        banned_words: args.banned.clone(),
    };
    let pb = spinner("Writing copy");
    let result = generate_copy(&model, &request).await;
    pb.finish_and_clear();
    let result = result.context("Copy generation failed")?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn run_evaluate(args: &EvaluateArgs) -> Result<()> {
    let model = chat_model()?;
    let pb = spinner("Evaluating copy");

    let output = if let Some(path) = &args.personas {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let personas: Vec<Persona> =
            serde_json::from_str(&raw).context("Personas file is not a JSON persona list")?;
        let copy = CopyResult {
            captions: vec![args.caption.clone()],
            one_liner: args.one_liner.clone(),
            hashtags: args.hashtags.clone(),
        };
        let result = evaluate_personas(&model, &copy, &personas).await;
        pb.finish_and_clear();
        serde_json::to_string_pretty(&result.context("Persona evaluation failed")?)?
    } else {
        let result = evaluate_copy(&model, &args.caption, &args.one_liner, &args.hashtags).await;
        pb.finish_and_clear();
        serde_json::to_string_pretty(&result.context("Evaluation failed")?)?
    };

    println!("{}", output);
    Ok(())
}

async fn run_weights(args: &WeightsArgs) -> Result<()> {
    let cache = match &args.cache_dir {
        Some(dir) => ModelCache::with_custom_cache_dir(dir)
            .context("Failed to create cache with custom directory")?,
        None => ModelCache::new().context("Failed to create model cache")?,
    };

    if args.show_dir {
        println!("📁 Cache directory: {}", cache.get_current_cache_dir().display());
    }

    if let Some(name) = &args.clear {
        if name.is_empty() {
            let removed = cache.clear_all()?;
            if removed.is_empty() {
                println!("💡 Cache was already empty");
            } else {
                println!("✅ Removed {} weight set(s): {}", removed.len(), removed.join(", "));
            }
        } else if cache.clear_specific(name)? {
            println!("✅ Removed {}", name);
        } else {
            println!("⚠️  '{}' is not cached", name);
        }
    }

    if args.download {
        let weights = crate::config::WeightConfig::default();
        let downloader = WeightDownloader::with_cache(cache.clone())?.with_progress(true);
        for spec in [&weights.matting, &weights.super_resolution] {
            let path = downloader
                .ensure(spec)
                .await
                .with_context(|| format!("Failed to provision {}", spec.name))?;
            println!("✅ {} → {}", spec.name, path.display());
        }
    }

    if args.list {
        let cached = cache.scan_cached_weights()?;
        if cached.is_empty() {
            println!("No cached weights. Run `menu-banner weights --download`.");
        }
        for entry in cached {
            println!(
                "📦 {} ({}) {}",
                entry.name,
                format_size(entry.size_bytes),
                entry.path.display()
            );
        }
    }
    Ok(())
}

fn show_provider_diagnostics() {
    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(1);
    println!("💻 System: {cpu_count} CPU cores detected");

    #[cfg(feature = "onnx")]
    {
        println!("\n🚀 Execution Providers:");
        for (name, available, description) in crate::backends::onnx::list_providers() {
            let status = if available { "✅ Available" } else { "❌ Not Available" };
            println!("  • {}: {} - {}", name, status, description);
        }
    }
    #[cfg(not(feature = "onnx"))]
    println!("\nBuilt without the `onnx` feature: only remote backends and Lanczos upscaling.");
}
