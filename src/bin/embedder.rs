use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uml_embed::{
    Cli, DataLoader, DatasetId, EmbeddingTechnique, PooledRecord, PoolingTechnique,
};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    // Validate every technique name before any expensive work starts.
    let dataset: DatasetId = cli.dataset.parse().context("invalid --dataset")?;
    let technique: EmbeddingTechnique = cli.technique.parse().context("invalid --technique")?;
    let pooling = cli
        .pooling
        .as_deref()
        .map(str::parse::<PoolingTechnique>)
        .transpose()
        .context("invalid --pooling")?;

    let config = cli.build_config();
    let cache_root = dataset.cache_root(&cli.embeddings_root);
    let mut loader = match &cli.input {
        Some(path) => DataLoader::from_file(path, cache_root, config)
            .with_context(|| format!("failed to load {:?}", path))?,
        None => DataLoader::open(dataset, &cli.data_dir, &cli.embeddings_root, config)
            .with_context(|| format!("failed to load dataset {dataset}"))?,
    };

    let table = loader
        .embedding(&technique)
        .with_context(|| format!("failed to embed names with {technique}"))?;
    let stats = loader.stats();
    info!(
        technique = %technique,
        records = table.len(),
        dimension = ?table.dimension(),
        builds = stats.builds,
        cache_hits = stats.cache_hits,
        "embedding complete"
    );

    let Some(pooling) = pooling else {
        if cli.output.is_some() {
            warn!("--output is only written when --pooling is set; nothing written");
        }
        return Ok(());
    };

    let pooled = DataLoader::apply_pooling(pooling, &table)
        .with_context(|| format!("failed to apply {pooling} pooling"))?;
    if let Some(path) = &cli.output {
        let written = write_records(path, &pooled.records)?;
        info!(path = %path.display(), records = written, "wrote pooled records");
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn write_records(path: &Path, records: &[PooledRecord]) -> Result<usize> {
    let output = File::create(path).with_context(|| format!("failed to create {:?}", path))?;
    let mut writer = BufWriter::new(output);
    let mut written = 0usize;
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}
