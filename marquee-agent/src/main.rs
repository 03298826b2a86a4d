//! Marquee Agent
//!
//! Runs one recommendation query through the pipeline and prints the JSON
//! payload (`response_text` + `entities`) on stdout. Logs go to stderr.
//!
//! Usage:
//!   marquee-agent --query "action movies playing this weekend" --with-satellites

mod generator;
mod http;
mod search;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use marquee::{
    run_pipeline, CatalogKind, ChatMessage, MarqueeConfig, PipelineMode, PipelineState,
    SearchProvider, TracingEventSink,
};
use serde::Deserialize;
use tracing::{info, warn};

use generator::{ChatCompletionsGenerator, LlmSettings};
use search::{HttpSearchProvider, SearchSettings};

/// Agent CLI arguments
#[derive(Parser, Debug)]
#[command(name = "marquee-agent")]
#[command(about = "Marquee Agent - structured recommendations from an LLM")]
struct Args {
    /// The user query
    #[arg(long, env = "MARQUEE_QUERY")]
    query: String,

    /// Path to configuration file (TOML, or JSON by extension)
    #[arg(long, env = "MARQUEE_CONFIG_PATH")]
    config_path: Option<String>,

    /// Catalog kind: movies or rentals
    #[arg(long, env = "MARQUEE_CATALOG")]
    catalog: Option<String>,

    /// Run the satellite search stage (theaters for movies)
    #[arg(long, env = "MARQUEE_WITH_SATELLITES", default_value = "false")]
    with_satellites: bool,

    /// JSON file with prior turns: [{"sender": "user", "content": ".."}, ..]
    #[arg(long, env = "MARQUEE_HISTORY_PATH")]
    history_path: Option<String>,

    /// LLM Provider (openai, openrouter, google, local)
    #[arg(long, env = "MARQUEE_LLM_PROVIDER")]
    llm_provider: Option<String>,

    /// LLM Model
    #[arg(long, env = "MARQUEE_LLM_MODEL")]
    llm_model: Option<String>,

    /// LLM Base URL
    #[arg(long, env = "MARQUEE_LLM_BASE_URL")]
    llm_base_url: Option<String>,

    /// LLM API key
    #[arg(long, env = "MARQUEE_LLM_API_KEY")]
    llm_api_key: Option<String>,

    /// LLM Max Tokens
    #[arg(long, env = "MARQUEE_LLM_MAX_TOKENS")]
    llm_max_tokens: Option<u32>,

    /// Satellite search endpoint
    #[arg(long, env = "MARQUEE_SEARCH_ENDPOINT")]
    search_endpoint: Option<String>,

    /// Pretty-print the JSON payload
    #[arg(long, default_value = "false")]
    pretty: bool,
}

/// Configuration file layout: the core sections plus adapter settings
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AgentConfig {
    #[serde(flatten)]
    core: MarqueeConfig,
    llm: LlmSettings,
    search: Option<SearchSettings>,
}

impl Args {
    /// Build the effective configuration. Priority: CLI/env flags > config
    /// file > defaults. `MARQUEE_API_*` overrides apply on top of the file.
    fn resolve_config(&self) -> anyhow::Result<AgentConfig> {
        let mut config = match &self.config_path {
            Some(path) => {
                let config = load_agent_config(path)?;
                info!("Using configuration: {}", path);
                config
            }
            None => AgentConfig::default(),
        };
        config.core.apply_env();

        if let Some(catalog) = &self.catalog {
            config.core.catalog.kind = parse_catalog(catalog)?;
        }

        let llm = &mut config.llm;
        if let Some(provider) = &self.llm_provider {
            llm.provider = provider.clone();
        }
        if let Some(model) = &self.llm_model {
            llm.model = model.clone();
        }
        if self.llm_base_url.is_some() {
            llm.base_url = self.llm_base_url.clone();
        }
        if self.llm_api_key.is_some() {
            llm.api_key = self.llm_api_key.clone();
        }
        if self.llm_max_tokens.is_some() {
            llm.max_tokens = self.llm_max_tokens;
        }
        llm.resolve_api_key();

        if let Some(endpoint) = &self.search_endpoint {
            config.search.get_or_insert_with(SearchSettings::default).endpoint = endpoint.clone();
        }
        if let Some(search) = config.search.as_mut() {
            search.resolve_api_key();
        }

        config
            .core
            .validate()
            .context("Invalid configuration")?;
        Ok(config)
    }

    fn mode(&self) -> PipelineMode {
        if self.with_satellites {
            PipelineMode::PrimaryWithSatellites
        } else {
            PipelineMode::PrimaryOnly
        }
    }
}

fn parse_catalog(value: &str) -> anyhow::Result<CatalogKind> {
    match value.trim().to_lowercase().as_str() {
        "movies" | "movie" => Ok(CatalogKind::Movies),
        "rentals" | "rental" | "listings" => Ok(CatalogKind::Rentals),
        other => Err(anyhow::anyhow!(
            "Unknown catalog '{}', expected 'movies' or 'rentals'",
            other
        )),
    }
}

/// Find a config file relative to the current directory or its parent.
fn locate(config_path: &str) -> anyhow::Result<PathBuf> {
    let path = Path::new(config_path);
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    let parent_path = Path::new("..").join(config_path);
    if parent_path.exists() {
        return Ok(parent_path);
    }
    Err(anyhow::anyhow!(
        "Config file not found: '{}' (also tried '../{}')",
        config_path,
        config_path
    ))
}

/// Load agent configuration from a TOML or JSON file
fn load_agent_config(config_path: &str) -> anyhow::Result<AgentConfig> {
    let path = locate(config_path)?;
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_str(&content).context("Failed to parse agent config")
    } else {
        toml::from_str(&content).context("Failed to parse agent config")
    }
}

fn load_history(path: Option<&str>) -> anyhow::Result<Vec<ChatMessage>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read history file '{}'", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid history file '{}'", path))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("marquee=info".parse()?)
                .add_directive("marquee_agent=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let args = Args::parse();
    let config = args.resolve_config()?;
    let history = load_history(args.history_path.as_deref())?;
    let mode = args.mode();

    let generator = ChatCompletionsGenerator::new(config.llm, config.core.catalog.kind)?;
    let search = config.search.map(HttpSearchProvider::new);
    if mode == PipelineMode::PrimaryWithSatellites && search.is_none() {
        warn!("--with-satellites given but no search endpoint is configured");
    }

    let response = run_pipeline(
        &generator,
        search.as_ref().map(|s| s as &dyn SearchProvider),
        config.core,
        &TracingEventSink,
        &args.query,
        mode,
        &history,
    );
    if let PipelineState::Failed(stage) = response.state {
        warn!(stage = stage.as_str(), "Pipeline did not complete");
    }

    let payload = if args.pretty {
        serde_json::to_string_pretty(&response)?
    } else {
        serde_json::to_string(&response)?
    };
    println!("{}", payload);
    Ok(())
}
