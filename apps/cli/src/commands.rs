//! CLI command definitions, routing, and tracing setup.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use heirdesk_completion::{Credential, GeminiBackend, Rotator};
use heirdesk_core::{
    AcquisitionOutcome, Answer, Extractor, Pipeline, PipelineConfig, RefreshProgress, Registry,
    refresh_all,
};
use heirdesk_discovery::DuckDuckGoSearch;
use heirdesk_fetcher::HttpFetcher;
use heirdesk_shared::{
    AppConfig, BatchConfig, CompletionConfig, Entity, FetchConfig, FieldKey, Provenance,
    SearchConfig, expand_home, init_config, load_api_keys, load_config,
};
use heirdesk_storage::{RecordStore, Storage};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// heirdesk: inheritance procedure facts for registered banks.
#[derive(Parser)]
#[command(
    name = "heirdesk",
    version,
    about = "Look up and refresh bank inheritance procedure facts.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Answer a question about a bank's inheritance procedure.
    Ask {
        /// Free-text query, e.g. "三井住友銀行の相続手続き".
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Print only this fact (e.g. contact_phone, freeze_method).
        #[arg(short, long)]
        field: Option<FieldKey>,
    },

    /// Re-acquire facts for every registered bank.
    Refresh {
        /// Parallel acquisitions (overrides [batch] concurrency).
        #[arg(short, long)]
        concurrency: Option<usize>,
    },

    /// List registered banks.
    List,

    /// Show the stored record for one bank without acquiring.
    Show {
        /// Registered name.
        name: String,

        /// Print only this fact.
        #[arg(short, long)]
        field: Option<FieldKey>,
    },

    /// Overwrite the registry with the built-in seed list.
    Reset,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "heirdesk=info",
        1 => "heirdesk=debug",
        _ => "heirdesk=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Ask { query, field } => cmd_ask(&query.join(" "), field).await,
        Command::Refresh { concurrency } => cmd_refresh(concurrency).await,
        Command::List => cmd_list().await,
        Command::Show { name, field } => cmd_show(&name, field).await,
        Command::Reset => cmd_reset().await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Open the configured database and load (or seed) the registry.
async fn open_registry(config: &AppConfig) -> Result<Arc<Registry>> {
    let path = expand_home(&config.defaults.database_path)?;
    let store: Arc<dyn RecordStore> = Arc::new(Storage::open(&path).await?);
    Ok(Arc::new(Registry::bootstrap(store).await?))
}

/// Load the registry without write access, seeding through
/// [`open_registry`] when no populated database exists yet.
async fn open_registry_readonly(config: &AppConfig) -> Result<Arc<Registry>> {
    let path = expand_home(&config.defaults.database_path)?;
    if path.is_file() {
        let store: Arc<dyn RecordStore> = Arc::new(Storage::open_readonly(&path).await?);
        let registry = Registry::load(store).await?;
        if !registry.snapshot().await.is_empty() {
            return Ok(Arc::new(registry));
        }
    }
    open_registry(config).await
}

/// Build the acquisition pipeline from config and the API key variable.
///
/// Without `require_keys`, missing keys leave the rotator empty: cached
/// answers still work and every extraction fails as exhausted.
fn build_pipeline(
    config: &AppConfig,
    registry: Arc<Registry>,
    require_keys: bool,
) -> Result<Pipeline> {
    let keys = match load_api_keys(config) {
        Ok(keys) => keys,
        Err(e) if !require_keys => {
            warn!(error = %e, "no completion API keys; only cached answers will succeed");
            Vec::new()
        }
        Err(e) => return Err(e.into()),
    };
    let credentials = Credential::from_keys(keys);
    let completion = CompletionConfig::from(config);
    let max_source_chars = completion.max_source_chars;
    let models = completion.models.clone();

    let rotator = Rotator::new(
        Arc::new(GeminiBackend::new(&completion)?),
        credentials,
        models,
    );
    let fetcher = HttpFetcher::new(&FetchConfig::from(config))?;
    let search = DuckDuckGoSearch::new(&SearchConfig::from(config))?;

    Ok(Pipeline::new(
        PipelineConfig::from(config),
        registry,
        Arc::new(fetcher),
        Arc::new(search),
        Extractor::new(rotator, max_source_chars),
    ))
}

/// Token cancelled on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after current stage");
            child.cancel();
        }
    });
    token
}

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    spinner
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_entity(entity: &Entity, provenance: Option<Provenance>, field: Option<FieldKey>) {
    if let Some(key) = field {
        println!("{}: {}", key.label(), entity.fields.get(key));
        return;
    }

    println!();
    println!("  {}", entity.name);
    for (key, value) in entity.fields.iter() {
        println!("  {:<28} {value}", key.label());
    }
    println!("  {:<28} {}", "Notes", entity.summary);
    println!();
    if let Some(url) = &entity.source_url {
        println!("  Source:       {url}");
    }
    if let Some(provenance) = provenance {
        println!("  Provenance:   {provenance}");
    }
    println!("  Last updated: {}", entity.last_updated.display());
    println!();
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_ask(query: &str, field: Option<FieldKey>) -> Result<()> {
    let config = load_config()?;
    let registry = open_registry(&config).await?;
    let pipeline = build_pipeline(&config, registry, false)?;
    let cancel = cancel_on_ctrl_c();

    info!(query, "answering query");
    let progress = spinner("Looking up…");
    let answer = pipeline.answer(query, &cancel).await;
    progress.finish_and_clear();

    match answer? {
        Answer::Ambiguous {
            normalized,
            candidates,
        } => {
            println!("\"{normalized}\" matches several banks. Ask again with one of:");
            for candidate in candidates {
                println!("  - {}", candidate.name);
            }
            Ok(())
        }
        Answer::Outcome(AcquisitionOutcome::Done { entity, provenance }) => {
            print_entity(&entity, Some(provenance), field);
            Ok(())
        }
        Answer::Outcome(AcquisitionOutcome::Failed {
            entity,
            error,
            causes,
        }) => {
            for cause in &causes {
                eprintln!("  - {cause}");
            }
            Err(eyre!("could not acquire facts for {entity}: {error}"))
        }
    }
}

async fn cmd_refresh(concurrency: Option<usize>) -> Result<()> {
    let config = load_config()?;
    let registry = open_registry(&config).await?;
    let pipeline = Arc::new(build_pipeline(&config, registry, true)?);

    let mut batch = BatchConfig::from(&config);
    if let Some(n) = concurrency {
        batch.concurrency = n.max(1);
    }

    let progress = Arc::new(CliRefreshProgress::new());
    let report = refresh_all(pipeline, &batch, progress.clone(), cancel_on_ctrl_c()).await;
    progress.bar.finish_and_clear();
    let report = report?;

    println!();
    println!(
        "  Refresh {}",
        if report.cancelled { "interrupted" } else { "complete" }
    );
    println!("  Processed:   {}", report.processed);
    println!("  Live:        {}", report.live);
    println!("  Fallback:    {}", report.fallback);
    println!("  Failed:      {}", report.failed);
    println!("  Checkpoints: {}", report.checkpoints);
    println!();
    Ok(())
}

async fn cmd_list() -> Result<()> {
    let config = load_config()?;
    let registry = open_registry_readonly(&config).await?;

    let entities = registry.snapshot().await;
    println!(
        "{:<24} {:<16} {:<22} {}",
        "NAME", "PROVENANCE", "LAST UPDATED", "PHONE"
    );
    for entity in &entities {
        println!(
            "{:<24} {:<16} {:<22} {}",
            entity.name,
            entity.provenance.map(|p| p.as_str()).unwrap_or("-"),
            entity.last_updated.display(),
            entity.fields.get(FieldKey::ContactPhone),
        );
    }
    Ok(())
}

async fn cmd_show(name: &str, field: Option<FieldKey>) -> Result<()> {
    let config = load_config()?;
    let registry = open_registry_readonly(&config).await?;

    let entity = registry
        .get(name)
        .await
        .ok_or_else(|| eyre!("'{name}' is not registered (see `heirdesk list`)"))?;
    print_entity(&entity, entity.provenance, field);
    Ok(())
}

async fn cmd_reset() -> Result<()> {
    let config = load_config()?;
    let registry = open_registry(&config).await?;
    registry.reset().await?;
    println!(
        "Registry reset to {} seeded banks.",
        registry.snapshot().await.len()
    );
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Refresh progress bar.
struct CliRefreshProgress {
    bar: ProgressBar,
}

impl CliRefreshProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{bar:30.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Self { bar }
    }
}

impl RefreshProgress for CliRefreshProgress {
    fn started(&self, total: usize) {
        self.bar.set_length(total as u64);
    }

    fn entity_done(&self, name: &str, provenance: Provenance, processed: usize, _total: usize) {
        self.bar.set_position(processed as u64);
        self.bar.set_message(format!("{name} ({provenance})"));
    }

    fn checkpoint(&self, processed: usize) {
        tracing::debug!(processed, "checkpoint saved");
    }
}
