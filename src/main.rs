use fshdkb::cli::{Cli, Commands, ConfigAction};
use fshdkb::config::{Config, StoreBackend};
use fshdkb::embedding::{model_dimension, EmbeddingProvider, LazyProvider};
use fshdkb::error::{KbError, Result};
use fshdkb::expansion::QueryExpander;
use fshdkb::ingest::Ingestor;
use fshdkb::retrieval::{SearchEngine, SearchRequest, SearchResponse};
use fshdkb::server::{self, AppState};
use fshdkb::store::{ChromaStore, CollectionStats, LocalStore, VectorStore, STATS_SAMPLE};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Logs go to stderr; stdout carries only JSON
    init_logging(cli.verbose);

    match cli.command {
        Commands::Ask { question, expand } => {
            cmd_search(cli.config, |config| {
                let mut request = SearchRequest::new(question, &config.search);
                request.expand = expand;
                Ok(request)
            });
        }
        Commands::Multi { payload } => {
            cmd_search(cli.config, |config| {
                let payload = parse_payload(&payload)?;
                Ok(SearchRequest::from_payload(&payload, &config.search))
            });
        }
        Commands::Serve { host, port } => {
            cmd_serve(cli.config, host, port)?;
        }
        Commands::Ingest { root, fresh } => {
            cmd_ingest(cli.config, &root, fresh)?;
        }
        Commands::Stats => {
            cmd_stats(cli.config)?;
        }
        Commands::Expand {
            question,
            max_queries,
        } => {
            cmd_expand(cli.config, &question, max_queries)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "fshdkb=debug" } else { "fshdkb=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    Config::load_or_default(config_path.as_deref())
}

fn build_embedder(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    Ok(Arc::new(LazyProvider::fastembed(&config.embedding.model)?))
}

fn build_store(config: &Config) -> Result<Arc<dyn VectorStore>> {
    match config.store.backend {
        StoreBackend::Chroma => Ok(Arc::new(ChromaStore::from_config(&config.chroma)?)),
        StoreBackend::Local => {
            let dimension = model_dimension(&config.embedding.model)?;
            let store = LocalStore::open(&config.local_db_path()?, dimension, &config.index)?;
            Ok(Arc::new(store))
        }
    }
}

fn build_engine(config: &Config) -> Result<Arc<SearchEngine>> {
    let engine = SearchEngine::from_config(config, build_embedder(config)?, build_store(config)?)?;
    Ok(Arc::new(engine))
}

/// `{...}` inline JSON or `@path` to a JSON file; blank means `{}`
fn parse_payload(arg: &str) -> Result<serde_json::Value> {
    let arg = arg.trim();
    if arg.is_empty() {
        return Ok(serde_json::json!({}));
    }

    let (content, context) = match arg.strip_prefix('@') {
        Some(path) => {
            let path = path.trim();
            let content = std::fs::read_to_string(path).map_err(|e| KbError::Io {
                source: e,
                context: format!("Failed to read payload file: {}", path),
            })?;
            (content, format!("Invalid JSON in {}", path))
        }
        None => (arg.to_string(), "Invalid JSON payload".to_string()),
    };

    serde_json::from_str(&content).map_err(|e| KbError::Json { source: e, context })
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string(value).map_err(|e| KbError::Json {
        source: e,
        context: "Failed to serialize output".to_string(),
    })?;
    println!("{}", json);
    Ok(())
}

/// Run one search under `search.timeout_secs` and print the response; any
/// failure prints the error response and exits with status 1
fn cmd_search<F>(config_path: Option<PathBuf>, build_request: F)
where
    F: FnOnce(&Config) -> Result<SearchRequest>,
{
    let outcome = load_config(config_path).and_then(|config| {
        let request = build_request(&config)?;
        let engine = build_engine(&config)?;
        engine.search_within(request, Duration::from_secs(config.search.timeout_secs))
    });

    let (response, code) = match outcome {
        Ok(response) => (response, 0),
        Err(e) => {
            tracing::error!("Search failed: {}", e);
            (SearchResponse::error(e.to_string()), 1)
        }
    };

    if let Err(e) = print_json(&response) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
    std::process::exit(code);
}

fn cmd_serve(config_path: Option<PathBuf>, host: Option<String>, port: Option<u16>) -> Result<()> {
    let config = load_config(config_path)?;
    let addr = format!(
        "{}:{}",
        host.unwrap_or_else(|| config.service.host.clone()),
        port.unwrap_or(config.service.port)
    );

    // Built outside the runtime: the Chroma client is blocking and must also
    // be dropped outside it
    let engine = build_engine(&config)?;

    let rt = tokio::runtime::Runtime::new().map_err(|e| KbError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })?;

    rt.block_on(server::serve(
        AppState::new(engine.clone()),
        &addr,
        async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutting down");
        },
    ))
}

fn cmd_ingest(config_path: Option<PathBuf>, root: &Path, fresh: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let store = build_store(&config)?;
    let ingestor = Ingestor::new(
        build_embedder(&config)?,
        store.clone(),
        config.ingest.clone(),
        config.embedding.batch_size,
    );

    let report = ingestor.run(root, fresh)?;
    print_json(&report)?;

    match CollectionStats::collect(store.as_ref(), STATS_SAMPLE) {
        Ok(stats) => print_json(&stats)?,
        Err(e) => tracing::warn!("Final statistics unavailable: {}", e),
    }
    Ok(())
}

fn cmd_stats(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let store = build_store(&config)?;
    let stats = CollectionStats::collect(store.as_ref(), STATS_SAMPLE)?;
    print_json(&stats)
}

fn cmd_expand(config_path: Option<PathBuf>, question: &str, max_queries: Option<usize>) -> Result<()> {
    let config = load_config(config_path)?;
    let expander = match &config.search.expansions_file {
        Some(path) => QueryExpander::from_file(path)?,
        None => QueryExpander::builtin(),
    };
    let queries = expander.expand(question, max_queries.unwrap_or(config.search.max_queries));
    print_json(&queries)
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
            println!("  Store backend: {:?}", config.store.backend);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| KbError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
            println!("  Set CHROMA_API_KEY and CHROMA_TENANT_ID, or switch store.backend to \"local\"");
        }
    }

    Ok(())
}
