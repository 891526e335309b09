//! Conversion of CLI arguments into a pipeline configuration

use crate::cli::main_impl::BannerArgs;
use crate::config::{ModelSize, PipelineConfig};
use anyhow::{Context, Result};
use std::time::Duration;

/// Convert CLI arguments to a `PipelineConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Environment defaults overlaid with explicit flags
    pub(crate) fn from_banner_args(args: &BannerArgs) -> Result<PipelineConfig> {
        let base = PipelineConfig::from_env().context("Invalid environment configuration")?;
        Self::apply(base, args)
    }

    fn apply(mut config: PipelineConfig, args: &BannerArgs) -> Result<PipelineConfig> {
        if let Some(method) = &args.method {
            config.extraction_method = method.parse().context("Invalid --method")?;
        }
        if let Some(strategy) = &args.strategy {
            config.synthesis_strategy = strategy.parse().context("Invalid --strategy")?;
        }
        if let Some(backend) = &args.backend {
            config.synthesis_backend = backend.parse().context("Invalid --backend")?;
        }
        if let Some(upscaler) = &args.upscaler {
            config.upscale_backend = upscaler.parse().context("Invalid --upscaler")?;
        }
        if let Some(provider) = &args.execution_provider {
            config.execution_provider = provider
                .parse()
                .context("Invalid --execution-provider")?;
        }
        if args.large {
            config.model_size = ModelSize::Large;
        }
        if args.steps.is_some() {
            config.inference_steps = args.steps;
        }
        if args.no_translate {
            config.translate_prompt = false;
        }
        config.intra_threads = args.threads;
        if let Some(font) = &args.font {
            config.font_path = Some(font.clone());
        }
        if let Some(dir) = &args.debug_dir {
            config.debug_dir = Some(dir.clone());
        }
        if let Some(secs) = args.stage_timeout {
            config.stage_timeout = Some(Duration::from_secs(secs));
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}
