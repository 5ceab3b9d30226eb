use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use nyay_core::{
    validate_query, AgentConfig, AgentContext, AgentRunResult, DomainWhitelist, Error,
    Explainer, ExplainerConfig, Explanation, LegalAgent, PageContent, ProgressEvent, Provider,
    RetrievalOracle, SourceDigest, ToolDispatcher, TrustedWebOracle, WebHit,
};
use nyay_providers::{OpenAIEmbedder, OpenAIProvider};
use nyay_tools::{LocalRetriever, SectionIndex, TrustedWeb};

mod config;

use config::Config;

/// Log level for tracing output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Most verbose: request bodies and per-section scores
    Trace,
    /// Verbose: iterations, tool arguments, token usage
    Debug,
    /// Standard: tool dispatch and run outcomes
    Info,
    /// Quiet: only warnings and errors
    Warn,
    /// Minimal: only errors
    Error,
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    fn from_config(value: &str) -> Option<Self> {
        <LogLevel as ValueEnum>::from_str(value.trim(), true).ok()
    }
}

#[derive(Parser)]
#[command(name = "nyay")]
#[command(author, version, about = "Nyay Sathi: answers to Indian legal questions, grounded in statute", long_about = None)]
pub struct Cli {
    /// Explicit configuration file (merged over ~/.config/nyay/config.toml and ./nyay.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Model to use (overrides config)
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Section index to search (overrides retrieval.index_path)
    #[arg(long, global = true)]
    pub index: Option<PathBuf>,

    /// Never consult the web, whatever the config says
    #[arg(long, global = true)]
    pub no_web: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_enum, global = true)]
    pub log_level: Option<LogLevel>,

    /// Enable debug logging (shorthand for --log-level debug)
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Write logs to file (JSON-lines format) instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a legal question and print the final answer
    Ask {
        query: String,
        /// Print the full run result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Ask a legal question and print progress as it happens
    Stream {
        query: String,
        /// Print one JSON event per line
        #[arg(long)]
        json: bool,
    },
    /// Single-shot explanation routed by retrieval confidence (no tool loop)
    Explain {
        query: String,
        #[arg(long)]
        json: bool,
    },
    /// Search the section index without calling the LLM
    Search {
        query: String,
        /// Number of sections to show
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Show current configuration
    Config {
        /// Print the effective configuration as TOML
        #[arg(long)]
        toml: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    apply_overrides(&cli, &mut config);

    // --debug > --log-level > config > warn
    let log_level = if cli.debug {
        LogLevel::Debug
    } else {
        cli.log_level
            .or_else(|| config.log_level.as_deref().and_then(LogLevel::from_config))
            .unwrap_or(LogLevel::Warn)
    };
    init_logging(log_level, cli.log_file.as_ref())?;

    match &cli.command {
        Commands::Ask { query, json } => ask(&config, query, *json).await,
        Commands::Stream { query, json } => stream(&config, query, *json).await,
        Commands::Explain { query, json } => explain(&config, query, *json).await,
        Commands::Search { query, k } => search(&config, query, *k).await,
        Commands::Config { toml } => show_config(&config, *toml),
    }
}

fn apply_overrides(cli: &Cli, config: &mut Config) {
    if let Some(model) = &cli.model {
        config.llm.model = model.clone();
    }
    if let Some(index) = &cli.index {
        config.retrieval.index_path = Some(index.display().to_string());
    }
    if cli.no_web {
        config.web.enabled = false;
    }
}

fn init_logging(level: LogLevel, log_file: Option<&PathBuf>) -> Result<()> {
    let filter = EnvFilter::new(level.as_filter());

    if let Some(log_path) = log_file {
        let file = std::fs::File::create(log_path)
            .with_context(|| format!("Failed to create log file: {:?}", log_path))?;
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::sync::Mutex::new(file)))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

/// Web oracle used when web access is switched off: finds nothing, reads nothing.
struct OfflineWeb;

#[async_trait]
impl TrustedWebOracle for OfflineWeb {
    async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<WebHit>, Error> {
        Ok(Vec::new())
    }

    async fn read(&self, url: &str) -> Result<Option<PageContent>, Error> {
        tracing::warn!(url = %url, "Web access is disabled");
        Ok(None)
    }
}

fn build_retriever(config: &Config) -> Result<Arc<LocalRetriever>> {
    let path = config.index_path().context(
        "No section index configured. Set retrieval.index_path, NYAY_RETRIEVAL__INDEX_PATH or pass --index",
    )?;
    let index = SectionIndex::load(&path)
        .with_context(|| format!("Failed to load section index from {}", path.display()))?;

    let mut embedder = OpenAIEmbedder::new(&config.embedding.base_url).with_model(&config.embedding.model);
    if let Some(key) = &config.embedding.api_key {
        embedder = embedder.with_api_key(key);
    }

    Ok(Arc::new(LocalRetriever::new(Arc::new(embedder), Arc::new(index))))
}

fn build_web(config: &Config) -> Arc<dyn TrustedWebOracle> {
    if !config.web.enabled {
        return Arc::new(OfflineWeb);
    }
    let whitelist = DomainWhitelist::default().with_extra_domains(config.web.extra_domains.iter().cloned());
    Arc::new(TrustedWeb::with_timeout(
        whitelist,
        Duration::from_secs(config.web.timeout_secs),
    ))
}

/// Without a key the agent still runs, but reports the missing credentials
/// as its answer instead of calling any oracle.
fn build_provider(config: &Config) -> Option<Arc<dyn Provider>> {
    let key = config.llm_api_key()?;
    let provider = OpenAIProvider::new(key)
        .with_base_url(&config.llm.base_url)
        .with_default_model(&config.llm.model);
    Some(Arc::new(provider))
}

fn build_context(config: &Config) -> Result<Arc<AgentContext>> {
    let dispatcher = ToolDispatcher::new(build_retriever(config)?, build_web(config))
        .with_retrieval_k(config.retrieval.top_k)
        .with_web_max_results(config.web.max_results);

    Ok(Arc::new(AgentContext::new(
        build_provider(config),
        Arc::new(dispatcher),
    )))
}

fn agent_config(config: &Config) -> AgentConfig {
    AgentConfig::new()
        .with_max_iterations(config.agent.max_iterations)
        .with_temperature(config.llm.temperature)
        .with_max_tokens(config.llm.max_tokens)
        .with_model(&config.llm.model)
}

fn explainer_config(config: &Config) -> ExplainerConfig {
    ExplainerConfig {
        confidence_threshold: config.retrieval.confidence_threshold,
        top_k: config.retrieval.top_k,
        web_supplement: config.web.enabled && config.web.supplement_explanations,
        model: Some(config.llm.model.clone()),
        ..ExplainerConfig::default()
    }
}

fn validated(query: &str) -> Result<String> {
    validate_query(query).map_err(|e| anyhow::anyhow!("Invalid query: {}", e))
}

async fn ask(config: &Config, query: &str, json: bool) -> Result<()> {
    let query = validated(query)?;
    let agent = LegalAgent::new(build_context(config)?, agent_config(config));

    let result = agent.run(&query).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", format_run_result(&result));
    }

    if result.mode == nyay_core::AnswerMode::Error {
        anyhow::bail!("Agent run failed: {}", result.answer);
    }
    Ok(())
}

async fn stream(config: &Config, query: &str, json: bool) -> Result<()> {
    let query = validated(query)?;
    let agent = LegalAgent::new(build_context(config)?, agent_config(config));

    let mut events = agent.run_streaming(query);
    let mut failure = None;
    while let Some(event) = events.next().await {
        if json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            println!("{}", format_event(&event));
        }
        if let ProgressEvent::Error { message } = &event {
            failure = Some(message.clone());
        }
    }

    match failure {
        Some(message) => anyhow::bail!("Agent run failed: {}", message),
        None => Ok(()),
    }
}

async fn explain(config: &Config, query: &str, json: bool) -> Result<()> {
    let query = validated(query)?;
    let explainer = Explainer::new(build_context(config)?, explainer_config(config));

    let explanation = explainer.explain(&query).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&explanation)?);
    } else {
        print!("{}", format_explanation(&explanation));
    }
    Ok(())
}

async fn search(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    let query = validated(query)?;
    let retriever = build_retriever(config)?;
    print!("{}", format_search(retriever.as_ref(), &query, k.unwrap_or(config.retrieval.top_k)).await?);
    Ok(())
}

async fn format_search(retriever: &dyn RetrievalOracle, query: &str, k: usize) -> Result<String> {
    if retriever.is_empty() {
        return Ok("The section index is empty.\n".to_string());
    }

    let hits = retriever.search(query, k).await.context("Retrieval failed")?;

    let mut out = format!("Searched {} sections.\n\n", retriever.len());
    if hits.is_empty() {
        out.push_str("No matching sections.\n");
        return Ok(out);
    }
    for (i, hit) in hits.iter().enumerate() {
        out.push_str(&format!(
            "[{}] {} - Section {} (score {:.3})\n",
            i + 1,
            hit.act_name,
            hit.section_number,
            hit.score
        ));
        out.push_str(&format!("    {}\n\n", nyay_core::text::ellipsize(&hit.text, 200)));
    }
    Ok(out)
}

fn show_config(config: &Config, as_toml: bool) -> Result<()> {
    if as_toml {
        print!("{}", config.to_redacted_toml()?);
        return Ok(());
    }

    println!("Configuration sources:");
    if let Some(path) = Config::config_path() {
        let found = if path.exists() { "FOUND" } else { "     " };
        println!("  [{}] Global:  {}", found, path.display());
    }
    let project = PathBuf::from("nyay.toml");
    let found = if project.exists() { "FOUND" } else { "     " };
    println!("  [{}] Project: {}", found, project.display());

    println!("\nLLM:");
    println!("  Base URL: {}", config.llm.base_url);
    println!("  Model: {}", config.llm.model);
    println!("  API key: {}", mask_key(config.llm_api_key()));
    println!("  Temperature: {}", config.llm.temperature);
    println!("  Max tokens: {}", config.llm.max_tokens);

    println!("\nEmbedding:");
    println!("  Base URL: {}", config.embedding.base_url);
    println!("  Model: {}", config.embedding.model);

    println!("\nRetrieval:");
    match config.index_path() {
        Some(path) => println!("  Index: {}", path.display()),
        None => println!("  Index: (not configured)"),
    }
    println!("  Top K: {}", config.retrieval.top_k);
    println!("  Confidence threshold: {:.2}", config.retrieval.confidence_threshold);

    println!("\nWeb:");
    println!("  Enabled: {}", config.web.enabled);
    println!("  Timeout: {}s", config.web.timeout_secs);
    println!("  Max results: {}", config.web.max_results);
    if !config.web.extra_domains.is_empty() {
        println!("  Extra domains: {}", config.web.extra_domains.join(", "));
    }

    println!("\nAgent:");
    println!("  Max iterations: {}", config.agent.max_iterations);
    Ok(())
}

fn mask_key(key: Option<&str>) -> String {
    match key {
        None => "(not set)".to_string(),
        Some(k) if k.chars().count() <= 8 => "****".to_string(),
        Some(k) => {
            let head: String = k.chars().take(4).collect();
            format!("{}****", head)
        }
    }
}

fn format_sources(sources: &SourceDigest) -> String {
    let mut out = String::new();
    if sources.is_empty() {
        return out;
    }

    out.push_str("\nSources:\n");
    for source in &sources.local {
        out.push_str(&format!(
            "  📚 {} - Section {} (score {:.2})\n",
            source.act, source.section, source.score
        ));
    }
    for source in &sources.web {
        out.push_str(&format!("  🌐 {} ({})\n     {}\n", source.title, source.domain, source.url));
    }
    out
}

fn format_run_result(result: &AgentRunResult) -> String {
    let mut out = format!("{}\n", result.answer.trim_end());
    out.push_str(&format_sources(&result.sources()));
    out.push_str(&format!(
        "\nMode: {} (confidence {}) | tools: {} | tokens: {} in / {} out\n",
        result.mode,
        result.confidence(),
        result.tool_calls(),
        result.tokens_in,
        result.tokens_out
    ));
    out
}

fn format_explanation(explanation: &Explanation) -> String {
    let mut out = format!("{}\n", explanation.explanation.trim_end());
    out.push_str(&format_sources(&explanation.sources));
    out.push_str(&format!(
        "\nMode: {} | top score: {:.2} | tokens: {} in / {} out\n",
        explanation.mode, explanation.top_score, explanation.tokens_in, explanation.tokens_out
    ));
    out
}

/// One human-readable line (or block) per progress event.
fn format_event(event: &ProgressEvent) -> String {
    match event {
        ProgressEvent::Status { message, icon, detail } => match detail {
            Some(detail) => format!("{} {}: {}", icon, message, detail),
            None => format!("{} {}", icon, message),
        },
        ProgressEvent::ToolStart { icon, message, query, .. } => {
            format!("{} {}: {}", icon, message, query)
        }
        ProgressEvent::ToolResult { display_name, icon, message, .. } => {
            format!("  {} {}: {}", icon, display_name, message)
        }
        ProgressEvent::Thinking { message, icon } => format!("{} {}", icon, message),
        ProgressEvent::Sources { local, web } => format_sources(&SourceDigest {
            local: local.clone(),
            web: web.clone(),
        })
        .trim_end()
        .to_string(),
        ProgressEvent::Answer {
            text,
            mode,
            confidence,
            tokens_in,
            tokens_out,
        } => format!(
            "\n{}\n\nMode: {} (confidence {}) | tokens: {} in / {} out",
            text.trim_end(),
            mode,
            confidence,
            tokens_in,
            tokens_out
        ),
        ProgressEvent::Error { message } => format!("❌ {}", message),
    }
}
