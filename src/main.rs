use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mnemo::backend::{MemoryBackend, SqliteBackend, VectorBackend};
use mnemo::cli::{Cli, CollectionAction, Commands, ConfigAction};
use mnemo::config::Config;
use mnemo::document::Document;
use mnemo::embedding::{EmbeddingProvider, FastEmbedProvider, HashingProvider};
use mnemo::error::{MnemoError, Result};
use mnemo::generation::{GenerationBackend, OpenAiCompatBackend};
use mnemo::rag::{RagEngine, RagRequest};
use mnemo::retrieval::{RetrievalEngine, RetrievalRequest, Strategy};
use mnemo::store::VectorStoreManager;

/// File extensions picked up when ingesting a directory
const INGEST_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "rst"];

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Collection { action } => {
            cmd_collection(cli.config, action).await?;
        }
        Commands::Ingest {
            collection,
            paths,
            no_chunk,
            json,
        } => {
            cmd_ingest(cli.config, &collection, &paths, no_chunk, json).await?;
        }
        Commands::Query {
            collection,
            query,
            strategy,
            limit,
            threshold,
            rerank,
            diversify,
            json,
        } => {
            cmd_query(
                cli.config, &collection, &query, strategy, limit, threshold, rerank, diversify,
                json,
            )
            .await?;
        }
        Commands::Ask {
            collection,
            question,
            strategy,
            limit,
            offline,
            no_history,
            sources,
            json,
        } => {
            cmd_ask(
                cli.config, &collection, &question, strategy, limit, offline, no_history,
                sources, json,
            )
            .await?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_filter = if verbose { "mnemo=debug" } else { "mnemo=info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt().with_env_filter(filter).with_target(false).init();
}

/// Store manager and retrieval engine wired up from one configuration
struct Engines {
    store: Arc<VectorStoreManager>,
    retrieval: Arc<RetrievalEngine>,
}

fn build_engines(config: &Config) -> Result<Engines> {
    let backend = build_backend(config)?;
    let store = Arc::new(VectorStoreManager::with_options(
        backend,
        config.store_options(),
    ));
    let retrieval = Arc::new(
        RetrievalEngine::new(Arc::clone(&store))
            .with_cache_capacity(config.retrieval.cache_capacity)
            .with_tables(config.expansion_tables())
            .with_refinement(
                config.retrieval.rerank_boost,
                config.retrieval.diversify_threshold,
            ),
    );
    Ok(Engines { store, retrieval })
}

fn build_backend(config: &Config) -> Result<Arc<dyn VectorBackend>> {
    match config.storage.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryBackend::new())),
        _ => {
            let data_dir = expand_path(&config.storage.data_dir)?;
            let backend = SqliteBackend::with_compression_threshold(
                &data_dir.join("mnemo.db"),
                config.storage.compression_threshold,
            )?;
            Ok(Arc::new(backend))
        }
    }
}

fn build_provider(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.embedding.provider.as_str() {
        "fastembed" => Ok(Arc::new(FastEmbedProvider::new(&config.embedding.model)?)),
        _ => Ok(Arc::new(HashingProvider::new(config.embedding.dimensions)?)),
    }
}

fn build_generation(config: &Config) -> Result<Option<Arc<dyn GenerationBackend>>> {
    if !config.generation.enabled {
        return Ok(None);
    }

    let backend = OpenAiCompatBackend::new(&config.generation.base_url, &config.generation.model);
    let backend = if config.generation.api_key_env.is_empty() {
        backend
    } else {
        backend.with_api_key_from_env(&config.generation.api_key_env)?
    };

    Ok(Some(Arc::new(backend)))
}

async fn cmd_collection(config_path: Option<PathBuf>, action: CollectionAction) -> Result<()> {
    let config = load_config(config_path)?;
    let engines = build_engines(&config)?;

    match action {
        CollectionAction::Create { name } => {
            let provider = build_provider(&config)?;
            let dimensions = provider.dimensions();
            let model = provider.model_name().to_string();

            if engines.store.create_collection(&name, provider).await? {
                println!("✓ Created collection '{}'", name);
                println!("  Model: {} ({} dimensions)", model, dimensions);
            } else {
                println!("Collection '{}' already exists", name);
            }
        }
        CollectionAction::List { json } => {
            let collections = engines.store.list_collections().await;
            if json {
                println!("{}", to_json(&collections)?);
                return Ok(());
            }

            if collections.is_empty() {
                println!("No collections. Create one with 'mnemo collection create <name>'.");
                return Ok(());
            }

            println!("Collections: {} total\n", collections.len());
            for info in collections {
                println!(
                    "  {} - {} documents, {} ({} dims), created {}",
                    info.name,
                    info.document_count,
                    info.embedding_model,
                    info.dimensions,
                    info.created_at.format("%Y-%m-%d %H:%M:%S"),
                );
            }
        }
        CollectionAction::Stats { name, json } => {
            match engines.store.get_collection_stats(&name).await {
                Some(info) => {
                    if json {
                        println!("{}", to_json(&info)?);
                    } else {
                        println!("Collection: {}", info.name);
                        println!("  Documents:  {}", info.document_count);
                        println!("  Model:      {}", info.embedding_model);
                        println!("  Dimensions: {}", info.dimensions);
                        println!("  Created:    {}", info.created_at.format("%Y-%m-%d %H:%M:%S"));
                        println!("  Updated:    {}", info.updated_at.format("%Y-%m-%d %H:%M:%S"));
                    }
                }
                None => println!("Collection '{}' not found", name),
            }
        }
        CollectionAction::Delete { name, yes } => {
            if !yes && !confirm(&format!("Delete collection '{}' and all its documents?", name))? {
                println!("Aborted");
                return Ok(());
            }

            if engines.store.delete_collection(&name).await {
                engines.retrieval.invalidate_collection(&name).await;
                println!("✓ Deleted collection '{}'", name);
            } else {
                println!("Collection '{}' not found", name);
            }
        }
    }

    Ok(())
}

async fn cmd_ingest(
    config_path: Option<PathBuf>,
    collection: &str,
    paths: &[PathBuf],
    no_chunk: bool,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let engines = build_engines(&config)?;

    if !open_collection(&engines, &config, collection).await? {
        return Ok(());
    }

    let files = collect_files(paths)?;
    if files.is_empty() {
        println!("No ingestable files found (looked for: {})", INGEST_EXTENSIONS.join(", "));
        return Ok(());
    }

    let mut documents = Vec::with_capacity(files.len());
    for file in &files {
        documents.push(document_from_file(file)?);
    }

    let engine = RagEngine::new(
        Arc::clone(&engines.store),
        Arc::clone(&engines.retrieval),
    )
    .with_options(config.rag_options());

    let report = engine
        .index_documents(collection, documents, !no_chunk)
        .await?;

    if json {
        println!("{}", to_json(&report)?);
        return Ok(());
    }

    println!(
        "✓ Ingested {} files ({} chunks) into '{}' in {}ms",
        report.documents_in, report.chunks_created, collection, report.ingest.duration_ms
    );
    println!(
        "  processed: {}, failed: {} ({:.1} docs/sec)",
        report.ingest.processed, report.ingest.failed, report.ingest.docs_per_sec
    );
    for error in &report.ingest.errors {
        println!("  ⚠ {}", error);
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_query(
    config_path: Option<PathBuf>,
    collection: &str,
    query: &str,
    strategy: Option<String>,
    limit: Option<usize>,
    threshold: Option<f32>,
    rerank: bool,
    diversify: bool,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let engines = build_engines(&config)?;

    if !open_collection(&engines, &config, collection).await? {
        return Ok(());
    }

    let Some(strategy) = resolve_strategy(&config, strategy) else {
        return Ok(());
    };

    let request = RetrievalRequest::new(collection, query)
        .with_strategy(strategy.clone())
        .with_limit(limit.unwrap_or(config.retrieval.limit))
        .with_threshold(threshold.unwrap_or(config.retrieval.score_threshold))
        .with_post_processing(rerank, diversify);
    let results = engines.retrieval.retrieve(&request).await;

    if json {
        println!("{}", to_json(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results for '{}' in '{}'", query, collection);
        return Ok(());
    }

    println!(
        "✓ {} results for '{}' (strategy: {})\n",
        results.len(),
        query,
        strategy.label()
    );
    for result in &results {
        println!(
            "{}. [{:.3}] {}",
            result.rank, result.score, result.document.id
        );
        println!("   {}", preview(&result.document.content, 160));
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_ask(
    config_path: Option<PathBuf>,
    collection: &str,
    question: &str,
    strategy: Option<String>,
    limit: Option<usize>,
    offline: bool,
    no_history: bool,
    sources: bool,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let engines = build_engines(&config)?;

    if !open_collection(&engines, &config, collection).await? {
        return Ok(());
    }

    let Some(strategy) = resolve_strategy(&config, strategy) else {
        return Ok(());
    };

    let mut options = config.rag_options();
    if no_history {
        options.use_history = false;
    }
    let mut engine = RagEngine::new(
        Arc::clone(&engines.store),
        Arc::clone(&engines.retrieval),
    )
    .with_options(options);
    if !offline {
        if let Some(generation) = build_generation(&config)? {
            engine = engine.with_generation(generation);
        }
    }

    let request = RagRequest::new(collection, question)
        .with_strategy(strategy)
        .with_limit(limit.unwrap_or(config.retrieval.limit))
        .with_threshold(config.retrieval.score_threshold);
    let response = engine.query(&request).await;

    if json {
        println!("{}", to_json(&response)?);
        return Ok(());
    }

    let via = match (&response.metadata.model, response.metadata.generation_used) {
        (Some(model), true) => format!(", model: {}", model),
        _ => ", extractive".to_string(),
    };
    println!(
        "✓ Answer (confidence: {:.2}, {} sources, {}ms{})\n",
        response.confidence,
        response.sources.len(),
        response.elapsed_ms,
        via
    );
    println!("{}", response.answer);

    if sources && !response.sources.is_empty() {
        println!("\nSources:");
        for source in &response.sources {
            println!(
                "  {}. [{:.3}] {}",
                source.rank, source.score, source.document.id
            );
        }
    }

    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            println!("{}", to_json(&config)?);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
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

            let config = Config::default();
            config.save(&path)?;

            println!("✓ Configuration initialized at: {}", path.display());
            println!("  Backend:   {}", config.storage.backend);
            println!("  Embedding: {}", config.embedding.provider);
            println!("  Strategy:  {}", config.retrieval.strategy);
        }
    }

    Ok(())
}

/// Bind the configured provider to an existing collection; prints a
/// hint and returns false when the collection is missing
async fn open_collection(engines: &Engines, config: &Config, collection: &str) -> Result<bool> {
    let provider = build_provider(config)?;
    let opened = engines.store.open_collection(collection, provider).await?;
    if !opened {
        println!(
            "Collection '{}' not found. Create it with 'mnemo collection create {}'.",
            collection, collection
        );
    }
    Ok(opened)
}

fn resolve_strategy(config: &Config, requested: Option<String>) -> Option<Strategy> {
    match requested {
        None => Some(config.default_strategy()),
        Some(name) => match Strategy::from_name(&name) {
            Some(strategy) => Some(strategy),
            None => {
                println!(
                    "Unknown strategy '{}'. Valid strategies: semantic, hybrid, mmr, contextual, multi-query",
                    name
                );
                None
            }
        },
    }
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'mnemo config init' to create one."
        );
        return Ok(Config::default());
    }

    Config::load(&path)
}

fn collect_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let entries = std::fs::read_dir(path).map_err(|e| MnemoError::Io {
                source: e,
                context: format!("Failed to read directory: {:?}", path),
            })?;
            for entry in entries {
                let entry = entry.map_err(|e| MnemoError::Io {
                    source: e,
                    context: format!("Failed to read directory entry in {:?}", path),
                })?;
                let candidate = entry.path();
                if candidate.is_file() && has_ingest_extension(&candidate) {
                    files.push(candidate);
                }
            }
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            println!("⚠ Skipping missing path: {}", path.display());
        }
    }
    files.sort();
    Ok(files)
}

fn has_ingest_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| INGEST_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn document_from_file(path: &Path) -> Result<Document> {
    let content = std::fs::read_to_string(path).map_err(|e| MnemoError::Io {
        source: e,
        context: format!("Failed to read file: {:?}", path),
    })?;

    let id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document")
        .to_string();
    Ok(Document::with_id(id, content).with_source(path.display().to_string()))
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    std::io::stdout().flush().map_err(|e| MnemoError::Io {
        source: e,
        context: "Failed to flush stdout".to_string(),
    })?;

    let mut answer = String::new();
    std::io::stdin()
        .read_line(&mut answer)
        .map_err(|e| MnemoError::Io {
            source: e,
            context: "Failed to read confirmation".to_string(),
        })?;
    let answer = answer.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}

fn preview(content: &str, max_chars: usize) -> String {
    let flattened = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.chars().count() <= max_chars {
        flattened
    } else {
        let cut: String = flattened.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| MnemoError::Json {
        source: e,
        context: "Failed to serialize output".to_string(),
    })
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| MnemoError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| MnemoError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}
