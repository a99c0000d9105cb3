use anyhow::Context;
use inkrag::cli::{Cli, Commands, ConfigAction};
use inkrag::config::RagConfig;
use inkrag::error::{RagError, Result};
use inkrag::index::InMemoryVectorStore;
use inkrag::retrieval::{IndexStatus, IngestReport, RetrievalEngine};
use inkrag::MarkdownChunker;
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Index { project, json } => {
            cmd_index(cli.config, &project, json)?;
        }
        Commands::Query {
            project,
            query,
            limit,
            vector_only,
            json,
        } => {
            cmd_query(cli.config, &project, &query, limit, vector_only, json)?;
        }
        Commands::Context {
            project,
            query,
            limit,
            context_window,
            json,
        } => {
            cmd_context(cli.config, &project, &query, limit, context_window, json)?;
        }
        Commands::Status {
            project,
            files,
            json,
        } => {
            cmd_status(cli.config, &project, &files, json)?;
        }
        Commands::Chunk { file, json } => {
            cmd_chunk(cli.config, &file, json)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "inkrag=debug" } else { "inkrag=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_index(config_path: Option<PathBuf>, project: &Path, json: bool) -> Result<()> {
    let (engine, report) = open_project(config_path, project)?;
    let summary = report.summary();

    if json {
        println!("{}", to_json(&summary)?);
        return Ok(());
    }

    println!("✓ Indexed {}", engine.project_root().display());
    println!("  Files:  {}", summary.files_indexed);
    println!("  Chunks: {}", summary.chunks_indexed);
    if !summary.failures.is_empty() {
        println!("\nSkipped {} files:", summary.failures.len());
        for (path, reason) in &summary.failures {
            println!("  {} - {}", path, reason);
        }
    }

    Ok(())
}

fn cmd_query(
    config_path: Option<PathBuf>,
    project: &Path,
    query: &str,
    limit: usize,
    vector_only: bool,
    json: bool,
) -> Result<()> {
    let (engine, _) = open_project(config_path, project)?;
    let results = engine.query_with_metadata(query, limit, !vector_only)?;

    if json {
        println!("{}", to_json(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results for: {}", query);
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        let heading = if result.metadata.heading_path.is_empty() {
            "Root".to_string()
        } else {
            result.metadata.heading_path.join(" > ")
        };
        println!(
            "{}. [{:.3}] {} ({}, lines {}-{})",
            rank + 1,
            result.score,
            result.source(),
            heading,
            result.metadata.start_line + 1,
            result.metadata.end_line
        );
        println!("   {}", result.preview(160).replace('\n', " "));
    }

    Ok(())
}

fn cmd_context(
    config_path: Option<PathBuf>,
    project: &Path,
    query: &str,
    limit: usize,
    context_window: Option<usize>,
    json: bool,
) -> Result<()> {
    let (engine, _) = open_project(config_path, project)?;
    let (texts, stats) = engine.get_optimized_context(query, limit, context_window)?;

    if json {
        let output = serde_json::json!({ "chunks": texts, "stats": stats });
        println!("{}", to_json(&output)?);
        return Ok(());
    }

    for text in &texts {
        println!("{}\n", text);
    }
    eprintln!(
        "{}: {} of {} tokens used (limit {}), {} chunks dropped",
        stats.status.as_str(),
        stats.used_tokens,
        stats.total_tokens,
        stats.max_allowed,
        stats.dropped_chunks
    );

    Ok(())
}

fn cmd_status(
    config_path: Option<PathBuf>,
    project: &Path,
    files: &[PathBuf],
    json: bool,
) -> Result<()> {
    let (engine, _) = open_project(config_path, project)?;

    let statuses: Vec<(String, Option<IndexStatus>)> = files
        .iter()
        .map(|file| {
            let path = engine.project_root().join(file);
            let path = path.to_string_lossy().into_owned();
            let status = engine.get_file_index_status(&path);
            (file.display().to_string(), status)
        })
        .collect();

    if json {
        let output: serde_json::Map<String, serde_json::Value> = statuses
            .iter()
            .map(|(file, status)| {
                let value = status
                    .map(|s| serde_json::Value::from(s.as_str()))
                    .unwrap_or(serde_json::Value::Null);
                (file.clone(), value)
            })
            .collect();
        println!("{}", to_json(&output)?);
        return Ok(());
    }

    for (file, status) in &statuses {
        let label = status.map(|s| s.as_str()).unwrap_or("not a document");
        println!("{:<14} {}", label, file);
    }

    Ok(())
}

fn cmd_chunk(config_path: Option<PathBuf>, file: &Path, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let file = expand_path(file)?;
    let content = std::fs::read_to_string(&file)
        .with_context(|| format!("Failed to read document {}", file.display()))?;

    let chunker = MarkdownChunker::new(config.chunking);
    let chunks = chunker.chunk(&content, &file.to_string_lossy());

    if json {
        println!("{}", to_json(&chunks)?);
        return Ok(());
    }

    for chunk in &chunks {
        println!(
            "#{} {} lines {}-{} ~{} tokens [{}]",
            chunk.metadata.chunk_index,
            chunk.metadata.content_type,
            chunk.metadata.start_line + 1,
            chunk.metadata.end_line,
            chunk.tokens(),
            chunk.metadata.heading_path.join(" > ")
        );
    }

    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let toml = toml::to_string_pretty(&config)?;
            println!("{}", toml);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => RagConfig::default_path()?,
            };
            let config = RagConfig::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => RagConfig::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            RagConfig::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
        ConfigAction::Path => {
            println!("{}", RagConfig::default_path()?.display());
        }
    }

    Ok(())
}

/// Build an in-memory engine for `project` and index it
fn open_project(
    config_path: Option<PathBuf>,
    project: &Path,
) -> Result<(RetrievalEngine, IngestReport)> {
    let config = load_config(config_path)?;
    let project = expand_path(project)?;

    let mut engine = RetrievalEngine::new(project, config, Box::new(InMemoryVectorStore::new()))?;
    let report = engine.index_project(None)?;

    for failure in &report.failures {
        tracing::warn!("Skipped {}: {}", failure.path.display(), failure.error);
    }

    Ok((engine, report))
}

fn load_config(config_path: Option<PathBuf>) -> Result<RagConfig> {
    if config_path.is_none() {
        let default_path = RagConfig::default_path()?;
        if !default_path.exists() {
            tracing::debug!(
                "Config file not found, using defaults. Run 'inkrag config init' to create one."
            );
        }
    }

    RagConfig::load_or_default(config_path.as_deref())
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| RagError::Json {
        source: e,
        context: "Failed to serialize output".to_string(),
    })
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| RagError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| RagError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}
