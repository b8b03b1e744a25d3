//! Retrieval-augmented chat turns.
//!
//! A turn retrieves the chunks nearest to the user's input, joins them into
//! a context block, asks the language model for a reply, and records both
//! sides of the exchange in the history.
//!
//! Retrieval failures do not end the conversation: the turn proceeds with
//! an empty context and the failure is logged at `warn`.

use anyhow::Result;
use std::io::{BufRead, Write};
use tracing::{info, warn};

use crate::config::Config;
use crate::index::VectorIndex;
use crate::ingest::load_or_ingest;
use crate::llm::{create_model, respond, LanguageModel, Message};

/// Run one chat turn and return the reply with the updated history.
pub fn rag_chatbot(
    llm: &dyn LanguageModel,
    index: &VectorIndex,
    user_input: &str,
    mut history: Vec<Message>,
    num_chunks: usize,
    system_prompt: &str,
) -> (String, Vec<Message>) {
    let context = match index.retrieve_chunks(user_input, num_chunks) {
        Ok(chunks) => chunks.join("\n"),
        Err(e) => {
            warn!(error = %e, "retrieval failed; answering without context");
            String::new()
        }
    };

    let reply = respond(llm, &history, &context, user_input, system_prompt);

    history.push(Message::user(user_input));
    history.push(Message::assistant(reply.clone()));
    (reply, history)
}

/// A conversation bound to one index and one model.
pub struct ChatSession<'a> {
    llm: &'a dyn LanguageModel,
    index: &'a VectorIndex,
    num_chunks: usize,
    system_prompt: String,
    history: Vec<Message>,
}

impl<'a> ChatSession<'a> {
    pub fn new(
        llm: &'a dyn LanguageModel,
        index: &'a VectorIndex,
        num_chunks: usize,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            index,
            num_chunks,
            system_prompt: system_prompt.into(),
            history: Vec::new(),
        }
    }

    /// Send `input` and return the assistant's reply.
    pub fn send(&mut self, input: &str) -> String {
        let history = std::mem::take(&mut self.history);
        let (reply, history) = rag_chatbot(
            self.llm,
            self.index,
            input,
            history,
            self.num_chunks,
            &self.system_prompt,
        );
        self.history = history;
        reply
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }
}

/// Run the chat command: load the index (ingesting on first run) and talk
/// over stdin/stdout until `exit` or end of input.
pub fn run_chat(config: &Config) -> Result<()> {
    let index = VectorIndex::from_config(config)?;
    if let Some(report) = load_or_ingest(&index, config)? {
        info!(
            files = report.files_ingested,
            chunks = report.chunks_added,
            "built index from data folder"
        );
    }
    let llm = create_model(&config.llm)?;

    let mut session = ChatSession::new(
        llm.as_ref(),
        &index,
        config.retrieval.num_chunks,
        config.llm.system_prompt.clone(),
    );

    println!();
    println!("# INITIALIZED CHATBOT #");
    let stdin = std::io::stdin();
    chat_loop(&mut session, stdin.lock(), std::io::stdout().lock())
}

/// Read lines from `input`, reply to each on `output`. A line reading
/// `exit` (any case) ends the loop.
pub fn chat_loop<R: BufRead, W: Write>(
    session: &mut ChatSession<'_>,
    mut input: R,
    mut output: W,
) -> Result<()> {
    let mut line = String::new();
    loop {
        write!(output, "You: ")?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        let user_input = line.trim();
        if user_input.eq_ignore_ascii_case("exit") {
            break;
        }
        if user_input.is_empty() {
            continue;
        }

        let reply = session.send(user_input);
        writeln!(output, "AI: {}", reply)?;
    }
    Ok(())
}
