//! Interactive question loop: validate, retrieve the nearest chunk, extract an answer.

use std::io::{self, BufRead, Write};

use tracing::{debug, error, warn};

use crate::answerer::{capitalize, Answer, Answerer};
use crate::embedder::Embedder;
use crate::error::{RetrievalError, TurnError, ValidationError};
use crate::vector_store::ChunkRetriever;

/// Questions must stay below this many whitespace-separated words.
pub const MAX_QUESTION_WORDS: usize = 64;
/// Input that ends the session.
pub const QUIT_COMMAND: &str = "quit";

const GREETING: &str = "Greetings! I am a cool new chatbot. ";
const PROMPT: &str = "You can type 'quit' at anytime to stop.\nPlease ask a question: ";
const FAREWELL: &str =
    "\n=====================================\n\nThanks for chatting with me. Goodbye!";

/// Long-lived collaborators shared by every turn.
#[derive(Clone, Copy)]
pub struct QaContext<'a> {
    /// Embeds questions; must match the embedder used at ingestion.
    pub embedder: &'a dyn Embedder,
    /// Nearest-chunk lookup.
    pub retriever: &'a dyn ChunkRetriever,
    /// Extractive QA over the retrieved chunk.
    pub answerer: &'a dyn Answerer,
}

/// Rejects blank questions and questions with too many words.
pub fn validate_question(input: &str) -> Result<(), ValidationError> {
    let words = input.split_whitespace().count();
    // blank lines are rejected too; there is nothing to embed
    if words == 0 {
        return Err(ValidationError::Empty);
    }
    if words >= MAX_QUESTION_WORDS {
        return Err(ValidationError::TooLong {
            words,
            limit: MAX_QUESTION_WORDS,
        });
    }
    Ok(())
}

/// Answers one question from the single nearest chunk.
pub async fn answer_question(ctx: &QaContext<'_>, question: &str) -> Result<Answer, TurnError> {
    validate_question(question)?;
    let query = ctx.embedder.embed(question)?;
    let best = ctx
        .retriever
        .nearest(&query, 1)
        .await?
        .into_iter()
        .next()
        .ok_or(RetrievalError::NoChunks)?;
    debug!(chunk = best.id, distance = best.distance, title = %best.title, "retrieved context");
    Ok(ctx.answerer.answer(question, &best.content)?)
}

/// Where the chat loop currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the next line of input.
    AwaitingInput,
    /// Checking a line before doing any work.
    Validating(String),
    /// Running retrieval and answering.
    Processing(String),
    /// Loop has ended.
    Terminated,
}

/// Counters reported when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Questions answered.
    pub answered: usize,
    /// Inputs rejected by validation.
    pub rejected: usize,
    /// Turns that failed after validation.
    pub failed: usize,
}

/// Line-oriented chat loop over arbitrary reader/writer pairs.
pub struct ChatSession<'a, R, W> {
    ctx: QaContext<'a>,
    input: R,
    output: W,
    state: SessionState,
    greeted: bool,
    summary: SessionSummary,
}

impl<'a, R: BufRead, W: Write> ChatSession<'a, R, W> {
    /// Builds a session waiting for its first question.
    pub fn new(ctx: QaContext<'a>, input: R, output: W) -> Self {
        Self {
            ctx,
            input,
            output,
            state: SessionState::AwaitingInput,
            greeted: false,
            summary: SessionSummary::default(),
        }
    }

    /// Current state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Runs until `quit`, end of input, or a fatal error, then prints the farewell.
    pub async fn run(mut self) -> io::Result<SessionSummary> {
        while self.state != SessionState::Terminated {
            self.step().await?;
        }
        writeln!(self.output, "{FAREWELL}")?;
        self.output.flush()?;
        Ok(self.summary)
    }

    /// Performs one state transition.
    pub async fn step(&mut self) -> io::Result<()> {
        let state = std::mem::replace(&mut self.state, SessionState::Terminated);
        self.state = match state {
            SessionState::AwaitingInput => match self.read_question()? {
                None => SessionState::Terminated,
                Some(line) if line == QUIT_COMMAND => SessionState::Terminated,
                Some(line) => SessionState::Validating(line),
            },
            SessionState::Validating(line) => match validate_question(&line) {
                Ok(()) => SessionState::Processing(line),
                Err(err) => {
                    self.summary.rejected += 1;
                    writeln!(self.output, "Sorry, {err}.")?;
                    SessionState::AwaitingInput
                }
            },
            SessionState::Processing(question) => {
                match answer_question(&self.ctx, &question).await {
                    Ok(answer) => {
                        self.summary.answered += 1;
                        writeln!(self.output, "\n{}\n", capitalize(&answer.text))?;
                        SessionState::AwaitingInput
                    }
                    Err(err) if err.is_fatal() => {
                        self.summary.failed += 1;
                        error!(error = %err, "ending session");
                        writeln!(self.output, "\nSorry, something went wrong: {err}")?;
                        SessionState::Terminated
                    }
                    Err(err) => {
                        self.summary.failed += 1;
                        warn!(error = %err, "turn failed");
                        writeln!(self.output, "\nSorry, I could not answer that: {err}\n")?;
                        SessionState::AwaitingInput
                    }
                }
            }
            SessionState::Terminated => SessionState::Terminated,
        };
        Ok(())
    }

    fn read_question(&mut self) -> io::Result<Option<String>> {
        if !self.greeted {
            write!(self.output, "{GREETING}")?;
            self.greeted = true;
        }
        write!(self.output, "{PROMPT}")?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }
}
