use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use wikiqa::controls::{DatabaseArgs, DatasetArgs, LogArgs, ModelArgs};
use wikiqa::embedder::onnx::OnnxEmbedder;
use wikiqa::{Chunker, DatasetFetcher, Loader, PgVectorStore, EMBEDDING_DIMENSIONS};

#[derive(Parser, Debug)]
#[command(
    name = "wikiqa-load",
    about = "Download a Wikipedia parquet shard, chunk and embed its articles, and store them in pgvector"
)]
struct LoadCli {
    #[command(flatten)]
    database: DatabaseArgs,

    #[command(flatten)]
    dataset: DatasetArgs,

    #[command(flatten)]
    models: ModelArgs,

    #[command(flatten)]
    log: LogArgs,

    /// Empty the chunk table before ingesting
    #[arg(long, default_value_t = false)]
    truncate: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = LoadCli::parse();
    cli.log.init_tracing();

    let embedder = OnnxEmbedder::load(
        &cli.models.embedding_spec(),
        cli.models.model_cache.as_deref(),
        EMBEDDING_DIMENSIONS,
    )
    .context("failed to load embedding model")?;

    let table = cli.database.table_name()?;
    let mut store = PgVectorStore::connect(&cli.database.pg_config(), table, EMBEDDING_DIMENSIONS)
        .await
        .with_context(|| format!("failed to connect to database {}", cli.database.dbname))?;
    let outcome = ingest(&cli, &embedder, &mut store).await;
    store.close().await;
    let (report, total) = outcome?;

    info!(
        files = report.files,
        documents = report.documents,
        chunks = report.chunks,
        "ingestion finished"
    );
    println!("\nNumber of vector records in table: {total}\n");
    Ok(())
}

async fn ingest(
    cli: &LoadCli,
    embedder: &OnnxEmbedder,
    store: &mut PgVectorStore,
) -> Result<(wikiqa::LoadReport, i64)> {
    store
        .prepare()
        .await
        .context("failed to prepare chunk table")?;
    if cli.truncate {
        store.truncate().await.context("failed to truncate chunk table")?;
    }

    if !cli.dataset.skip_download {
        let fetcher = DatasetFetcher::new(cli.dataset.catalog_url.clone(), cli.dataset.fetch_limits())?;
        let fetched = fetcher
            .fetch_into(&cli.dataset.dataset_dir)
            .await
            .context("failed to download dataset")?;
        info!(
            downloaded = fetched.downloaded.len(),
            present = fetched.skipped.len(),
            "dataset directory ready"
        );
    }

    let chunker = Chunker::default();
    let loader = Loader::new(&chunker, embedder, cli.dataset.load_limits());
    let report = loader
        .load_dir(&cli.dataset.dataset_dir, store)
        .await
        .with_context(|| format!("failed to ingest {:?}", cli.dataset.dataset_dir))?;
    let total = store.count().await.context("failed to count stored chunks")?;
    Ok((report, total))
}
