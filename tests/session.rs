mod common;

use common::{record, BagOfWordsEmbedder, BrokenAnswerer, MemoryStore, OverlapAnswerer};
use pretty_assertions::assert_eq;
use wikiqa::{Answerer, ChatSession, ChunkSink, QaContext, SessionState, SessionSummary};

const PROMPT: &str = "Please ask a question: ";
const FAREWELL: &str = "Thanks for chatting with me. Goodbye!";

async fn seeded_store(rows: &[(&str, &str)]) -> MemoryStore {
    let seed = BagOfWordsEmbedder::default();
    let records: Vec<_> = rows
        .iter()
        .map(|(title, content)| record(&seed, title, content))
        .collect();
    let mut store = MemoryStore::default();
    store.write_batch(&records).await.expect("write");
    store.commit().await.expect("commit");
    store
}

async fn chat(
    embedder: &BagOfWordsEmbedder,
    store: &MemoryStore,
    answerer: &dyn Answerer,
    input: &str,
) -> (SessionSummary, String) {
    let ctx = QaContext {
        embedder,
        retriever: store,
        answerer,
    };
    let mut output = Vec::new();
    let summary = ChatSession::new(ctx, input.as_bytes(), &mut output)
        .run()
        .await
        .expect("session i/o");
    (summary, String::from_utf8(output).expect("utf8 output"))
}

#[tokio::test(flavor = "current_thread")]
async fn quit_ends_without_touching_models_or_store() {
    let embedder = BagOfWordsEmbedder::default();
    let store = seeded_store(&[("Sky", "the sky is blue.")]).await;
    let answerer = OverlapAnswerer::default();

    let (summary, output) = chat(&embedder, &store, &answerer, "quit\n").await;

    assert_eq!(summary, SessionSummary::default());
    assert_eq!(embedder.calls(), 0);
    assert_eq!(store.lookups(), 0);
    assert_eq!(answerer.calls(), 0);
    assert!(output.starts_with("Greetings! I am a cool new chatbot. "));
    assert_eq!(output.matches(PROMPT).count(), 1);
    assert!(output.trim_end().ends_with(FAREWELL));
}

#[tokio::test(flavor = "current_thread")]
async fn long_question_is_rejected_and_reprompted() {
    let embedder = BagOfWordsEmbedder::default();
    let store = seeded_store(&[("Sky", "the sky is blue.")]).await;
    let answerer = OverlapAnswerer::default();
    let input = format!("{}\nquit\n", vec!["why"; 64].join(" "));

    let (summary, output) = chat(&embedder, &store, &answerer, &input).await;

    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.answered, 0);
    assert_eq!(embedder.calls(), 0);
    assert_eq!(store.lookups(), 0);
    assert!(output.contains("Sorry, your question must be less than 64 words (got 64)."));
    assert_eq!(output.matches(PROMPT).count(), 2);
}

#[tokio::test(flavor = "current_thread")]
async fn answers_are_printed_capitalized() {
    let embedder = BagOfWordsEmbedder::default();
    let store = seeded_store(&[("Sky", "the sky is blue. grass is green.")]).await;
    let answerer = OverlapAnswerer::default();

    let (summary, output) =
        chat(&embedder, &store, &answerer, "What color is the sky?\nquit\n").await;

    assert_eq!(
        summary,
        SessionSummary {
            answered: 1,
            rejected: 0,
            failed: 0
        }
    );
    assert_eq!(embedder.calls(), 1);
    assert_eq!(store.lookups(), 1);
    assert!(output.contains("\nBlue\n"), "output was {output:?}");
    assert_eq!(output.matches(PROMPT).count(), 2);
}

#[tokio::test(flavor = "current_thread")]
async fn model_failure_reprompts() {
    let embedder = BagOfWordsEmbedder::default();
    let store = seeded_store(&[("Sky", "the sky is blue.")]).await;

    let (summary, output) = chat(
        &embedder,
        &store,
        &BrokenAnswerer,
        "What color is the sky?\nquit\n",
    )
    .await;

    assert_eq!(summary.failed, 1);
    assert!(output.contains("Sorry, I could not answer that: inference failed: session poisoned"));
    assert_eq!(output.matches(PROMPT).count(), 2);
    assert!(output.trim_end().ends_with(FAREWELL));
}

#[tokio::test(flavor = "current_thread")]
async fn empty_store_reprompts() {
    let embedder = BagOfWordsEmbedder::default();
    let store = MemoryStore::default();
    let answerer = OverlapAnswerer::default();

    let (summary, output) =
        chat(&embedder, &store, &answerer, "What color is the sky?\nquit\n").await;

    assert_eq!(summary.failed, 1);
    assert_eq!(answerer.calls(), 0);
    assert!(output.contains("no chunks stored"));
    assert_eq!(output.matches(PROMPT).count(), 2);
}

#[tokio::test(flavor = "current_thread")]
async fn closed_connection_ends_the_session() {
    let embedder = BagOfWordsEmbedder::default();
    let mut store = seeded_store(&[("Sky", "the sky is blue.")]).await;
    store.closed = true;
    let answerer = OverlapAnswerer::default();

    let (summary, output) = chat(
        &embedder,
        &store,
        &answerer,
        "What color is the sky?\nWhat color is grass?\nquit\n",
    )
    .await;

    assert_eq!(summary.failed, 1);
    assert_eq!(store.lookups(), 1);
    assert_eq!(answerer.calls(), 0);
    assert!(output.contains("Sorry, something went wrong: database connection closed"));
    assert_eq!(output.matches(PROMPT).count(), 1);
    assert!(output.trim_end().ends_with(FAREWELL));
}

#[tokio::test(flavor = "current_thread")]
async fn end_of_input_says_goodbye() {
    let embedder = BagOfWordsEmbedder::default();
    let store = MemoryStore::default();
    let answerer = OverlapAnswerer::default();

    let (summary, output) = chat(&embedder, &store, &answerer, "").await;

    assert_eq!(summary, SessionSummary::default());
    assert!(output.trim_end().ends_with(FAREWELL));
}

#[tokio::test(flavor = "current_thread")]
async fn step_walks_through_each_state() {
    let embedder = BagOfWordsEmbedder::default();
    let store = seeded_store(&[("Sky", "the sky is blue.")]).await;
    let answerer = OverlapAnswerer::default();
    let ctx = QaContext {
        embedder: &embedder,
        retriever: &store,
        answerer: &answerer,
    };
    let mut output = Vec::new();
    let mut session = ChatSession::new(ctx, "what is the sky\n".as_bytes(), &mut output);

    assert_eq!(session.state(), &SessionState::AwaitingInput);
    session.step().await.expect("read");
    assert_eq!(
        session.state(),
        &SessionState::Validating("what is the sky".to_string())
    );
    session.step().await.expect("validate");
    assert_eq!(
        session.state(),
        &SessionState::Processing("what is the sky".to_string())
    );
    session.step().await.expect("answer");
    assert_eq!(session.state(), &SessionState::AwaitingInput);
    session.step().await.expect("eof");
    assert_eq!(session.state(), &SessionState::Terminated);
}

#[tokio::test(flavor = "current_thread")]
async fn printed_answer_is_lowercased_after_first_letter() {
    let embedder = BagOfWordsEmbedder::default();
    let store = seeded_store(&[("France", "the capital is PARIS.")]).await;
    let answerer = OverlapAnswerer::default();

    let (summary, output) =
        chat(&embedder, &store, &answerer, "what is the capital\nquit\n").await;

    assert_eq!(summary.answered, 1);
    assert!(output.contains("\nParis\n"), "output was {output:?}");
    assert!(!output.contains("PARIS"));
}

#[tokio::test(flavor = "current_thread")]
async fn blank_line_is_rejected_and_reprompted() {
    let embedder = BagOfWordsEmbedder::default();
    let store = seeded_store(&[("Sky", "the sky is blue.")]).await;
    let answerer = OverlapAnswerer::default();

    let (summary, output) = chat(&embedder, &store, &answerer, "   \nquit\n").await;

    assert_eq!(summary.rejected, 1);
    assert_eq!(embedder.calls(), 0);
    assert_eq!(store.lookups(), 0);
    assert!(output.contains("Sorry, please type a question."));
    assert_eq!(output.matches(PROMPT).count(), 2);
}
