//! Interactive console: a read-eval loop over one conversation thread.

use std::io::Write;

use dbagent_db::format_results;
use dbagent_llm::CostTrackingMiddleware;
use dbagent_types::ConversationState;
use dbagent_workflow::WorkflowEngine;
use tokio::io::{AsyncBufReadExt, BufReader};

const RULE: &str = "======================================================================";
const GOODBYE: &str = "Goodbye! Thanks for using the Database Agent.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Quit,
    Help,
    Stats,
    New,
}

impl Command {
    fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "quit" | "exit" => Some(Command::Quit),
            "help" => Some(Command::Help),
            "stats" => Some(Command::Stats),
            "new" => Some(Command::New),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Session statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub queries_processed: u64,
    pub successful_queries: u64,
    pub clarifications_requested: u64,
}

impl SessionStats {
    pub fn record(&mut self, state: &ConversationState) {
        if state.needs_clarification {
            self.clarifications_requested += 1;
        } else if state.execution_result.as_ref().is_some_and(|r| r.success) {
            self.successful_queries += 1;
        }
    }

    pub fn success_rate(&self) -> Option<f64> {
        (self.queries_processed > 0)
            .then(|| self.successful_queries as f64 / self.queries_processed as f64 * 100.0)
    }

    pub fn render(&self, thread_id: &str, tokens: Option<&CostTrackingMiddleware>) -> String {
        let mut lines = vec![
            "Session Statistics:".to_string(),
            format!("  Queries processed: {}", self.queries_processed),
            format!("  Successful queries: {}", self.successful_queries),
            format!("  Clarifications requested: {}", self.clarifications_requested),
        ];
        if let Some(rate) = self.success_rate() {
            lines.push(format!("  Success rate: {rate:.1}%"));
        }
        lines.push(format!("  Current thread: {thread_id}"));
        if let Some(t) = tokens {
            lines.push(format!(
                "  Tokens used: {} in / {} out ({} requests)",
                t.total_input_tokens(),
                t.total_output_tokens(),
                t.requests()
            ));
        }
        lines.join("\n")
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

pub fn welcome() -> String {
    [
        RULE,
        "      AI Database Agent - Interactive Console",
        RULE,
        "Ask me anything about your database in natural language!",
        "",
        "Examples:",
        "  - 'Show me all users who have placed orders'",
        "  - 'How many products do we have?'",
        "  - 'Update user email where name is John'",
        "  - 'Delete old orders from last year'",
        "",
        "Commands:",
        "  - 'help'  - Show this help",
        "  - 'stats' - Show session statistics",
        "  - 'new'   - Start a new conversation thread",
        "  - 'quit' or 'exit' - Exit the console",
        "",
        "Note: If I need clarification, I'll ask follow-up questions.",
        RULE,
    ]
    .join("\n")
}

/// What the user sees once a run or resume finishes.
pub fn render_outcome(state: &ConversationState) -> String {
    if state.needs_clarification {
        let bar = ">".repeat(50);
        let mut lines = vec![bar.clone(), "I need more information to proceed.".to_string()];
        if let Some(message) = state.last_agent_message() {
            lines.push(format!("Agent: {}", message.content));
        }
        lines.push(bar);
        return lines.join("\n");
    }

    match &state.execution_result {
        Some(result) if result.success => {
            let mut out = String::from("Query completed successfully!\n");
            if let Some(query) = &state.generated_query {
                out.push_str(&format!("SQL: {}\n\n", query.query_text));
            }
            out.push_str(&format_results(result));
            out
        }
        Some(result) => format!(
            "Query failed: {}",
            result.error.as_deref().unwrap_or("Unknown error")
        ),
        None => "Query failed: Unknown error".to_string(),
    }
}

pub fn new_thread_id() -> String {
    format!("thread_{}", chrono::Local::now().format("%H%M%S"))
}

// ---------------------------------------------------------------------------
// Console
// ---------------------------------------------------------------------------

pub struct Console {
    engine: WorkflowEngine,
    tokens: Option<CostTrackingMiddleware>,
    thread_id: String,
    awaiting_clarification: bool,
    stats: SessionStats,
}

impl Console {
    pub fn new(engine: WorkflowEngine, tokens: Option<CostTrackingMiddleware>) -> Self {
        Self {
            engine,
            tokens,
            thread_id: "main".to_string(),
            awaiting_clarification: false,
            stats: SessionStats::default(),
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        println!("{}\n", welcome());
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            let prompt = if self.awaiting_clarification {
                "Your clarification: "
            } else {
                "You: "
            };
            print!("{prompt}");
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                println!("\n{GOODBYE}");
                return Ok(());
            };
            let input = line.trim();
            if input.is_empty() {
                continue;
            }

            match Command::parse(input) {
                Some(Command::Quit) => {
                    println!("\n{GOODBYE}");
                    return Ok(());
                }
                Some(Command::Help) => println!("{}\n", welcome()),
                Some(Command::Stats) => {
                    println!("\n{}\n", self.stats.render(&self.thread_id, self.tokens.as_ref()))
                }
                Some(Command::New) => {
                    self.thread_id = new_thread_id();
                    self.awaiting_clarification = false;
                    println!("\nStarted new conversation thread: {}", self.thread_id);
                    println!("Previous conversation context has been cleared.\n");
                }
                None => self.handle(input).await,
            }
        }
    }

    async fn handle(&mut self, input: &str) {
        let outcome = if self.awaiting_clarification {
            println!("\nProcessing your clarification...");
            self.engine.resume(input, &self.thread_id).await
        } else {
            self.stats.queries_processed += 1;
            self.engine.run(input, &self.thread_id).await
        };

        match outcome {
            Ok(state) => {
                self.awaiting_clarification = state.needs_clarification;
                self.stats.record(&state);
                println!("\n{}\n", render_outcome(&state));
            }
            Err(e) => {
                tracing::error!(thread_id = %self.thread_id, error = %e, "Query processing failed");
                self.awaiting_clarification = false;
                println!("\nError processing query: {e}\n");
            }
        }
    }
}
