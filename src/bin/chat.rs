use std::io;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use wikiqa::answerer::onnx::OnnxAnswerer;
use wikiqa::controls::{AnswerArgs, DatabaseArgs, LogArgs, ModelArgs};
use wikiqa::embedder::onnx::OnnxEmbedder;
use wikiqa::{ChatSession, PgVectorStore, QaContext, EMBEDDING_DIMENSIONS};

#[derive(Parser, Debug)]
#[command(
    name = "wikiqa-chat",
    about = "This is a Q & A chatbot. You can ask questions about various topics and receive an answer."
)]
struct ChatCli {
    #[command(flatten)]
    database: DatabaseArgs,

    #[command(flatten)]
    models: ModelArgs,

    #[command(flatten)]
    answer: AnswerArgs,

    #[command(flatten)]
    log: LogArgs,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = ChatCli::parse();
    cli.log.init_tracing();

    let cache = cli.models.model_cache.as_deref();
    let embedder = OnnxEmbedder::load(&cli.models.embedding_spec(), cache, EMBEDDING_DIMENSIONS)
        .context("failed to load embedding model")?;
    let answerer = OnnxAnswerer::load(&cli.models.qa_spec(), cache, cli.answer.answer_config())
        .context("failed to load question-answering model")?;

    let table = cli.database.table_name()?;
    let store = PgVectorStore::connect(&cli.database.pg_config(), table, EMBEDDING_DIMENSIONS)
        .await
        .with_context(|| format!("failed to connect to database {}", cli.database.dbname))?;

    let ctx = QaContext {
        embedder: &embedder,
        retriever: &store,
        answerer: &answerer,
    };
    let stdin = io::stdin();
    let session = ChatSession::new(ctx, stdin.lock(), io::stdout());
    let outcome = session.run().await;
    store.close().await;

    let summary = outcome.context("chat session i/o failed")?;
    info!(
        answered = summary.answered,
        rejected = summary.rejected,
        failed = summary.failed,
        "session ended"
    );
    Ok(())
}
