//! Line-oriented operator console
//!
//! The operator types order numbers (optionally followed by tags), emails or
//! `stage` while the watcher runs. When a job is ready and no destination is
//! assigned, the orchestrator asks through [`ConsolePrompt`] and the next
//! destination line answers it.

use crate::core::assignment::{OrderAssignment, SetOrderOutcome};
use crate::core::orchestrator::{DestinationChoice, DestinationChooser};
use crate::domain::{parse_tags, Job};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::oneshot;

const HELP: &str = "\
Commands:
  <order>[tags]      assign an order, e.g. 136720 or #136720s
  order <query>      assign by order number, email or free text
  stage              send new jobs to the staging area
  tags <t1,t2>       replace the pending tags of the current order
  apply              apply pending tags now
  status             show the current destination
  q                  quit";

/// One parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Order(String),
    Stage,
    Tags(Vec<String>),
    Apply,
    Status,
    Help,
    Quit,
    Empty,
}

impl ConsoleCommand {
    /// Parse a line; anything unrecognised is an order query
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match word.to_lowercase().as_str() {
            "" => ConsoleCommand::Empty,
            "q" | "quit" | "exit" => ConsoleCommand::Quit,
            "stage" | "staging" => ConsoleCommand::Stage,
            "status" => ConsoleCommand::Status,
            "help" | "?" => ConsoleCommand::Help,
            "apply" => ConsoleCommand::Apply,
            "tags" => ConsoleCommand::Tags(parse_tags(rest)),
            "order" if !rest.is_empty() => ConsoleCommand::Order(rest.to_string()),
            _ => ConsoleCommand::Order(line.to_string()),
        }
    }
}

/// The orchestrator's side of the console
///
/// At most one question is outstanding at a time.
#[derive(Default)]
pub struct ConsolePrompt {
    pending: Mutex<Option<oneshot::Sender<DestinationChoice>>>,
    closed: AtomicBool,
}

impl ConsolePrompt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the orchestrator is waiting for an answer
    pub fn is_waiting(&self) -> bool {
        match self.pending.lock() {
            Ok(slot) => slot.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        }
    }

    /// Answer the outstanding question; false when nobody was asking
    pub fn answer(&self, choice: DestinationChoice) -> bool {
        let sender = match self.pending.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            Some(tx) => tx.send(choice).is_ok(),
            None => false,
        }
    }

    /// No more answers will come; pending and future questions get `None`
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let sender = match self.pending.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(sender);
    }
}

#[async_trait]
impl DestinationChooser for ConsolePrompt {
    async fn choose_destination(&self, job: &Job) -> Option<DestinationChoice> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }

        let (tx, rx) = oneshot::channel();
        match self.pending.lock() {
            Ok(mut slot) => *slot = Some(tx),
            Err(poisoned) => *poisoned.into_inner() = Some(tx),
        }

        println!();
        println!("Job {} is ready but has no destination.", job.key);
        println!("Type an order number, email or 'stage':");
        rx.await.ok()
    }
}

/// The operator's side of the console
pub struct OperatorConsole {
    assignment: Arc<OrderAssignment>,
    prompt: Arc<ConsolePrompt>,
}

impl OperatorConsole {
    pub fn new(assignment: Arc<OrderAssignment>, prompt: Arc<ConsolePrompt>) -> Self {
        Self { assignment, prompt }
    }

    /// Read commands until EOF or `q`
    ///
    /// The prompt is closed on return so a waiting job is deferred instead
    /// of blocking forever.
    pub async fn run<R>(&self, reader: R)
    where
        R: AsyncBufRead + Unpin,
    {
        println!("{HELP}");
        let mut lines = reader.lines();

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Console input failed");
                    break;
                }
            };

            match self.handle_line(&line).await {
                Some(reply) if !reply.is_empty() => println!("{reply}"),
                Some(_) => {}
                None => break,
            }
        }

        self.prompt.close();
    }

    /// Execute one line; `None` means quit
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let reply = match ConsoleCommand::parse(line) {
            ConsoleCommand::Quit => return None,
            ConsoleCommand::Empty => String::new(),
            ConsoleCommand::Help => HELP.to_string(),
            ConsoleCommand::Status => format!("Destination: {}", self.assignment.snapshot()),
            ConsoleCommand::Stage => {
                if self.prompt.answer(DestinationChoice::Staging) {
                    "Sending the waiting job to staging".to_string()
                } else {
                    self.assignment.set_staging().await;
                    "Destination: staging".to_string()
                }
            }
            ConsoleCommand::Order(query) => {
                if self.prompt.answer(DestinationChoice::Query(query.clone())) {
                    format!("Looking up '{query}' for the waiting job")
                } else {
                    self.assign_order(&query).await
                }
            }
            ConsoleCommand::Tags(tags) => {
                if self.assignment.set_pending_tags(tags) {
                    format!("Destination: {}", self.assignment.snapshot())
                } else {
                    "Tags need an assigned order".to_string()
                }
            }
            ConsoleCommand::Apply => match self.assignment.apply_pending_tags().await {
                Ok(0) => "No pending tags".to_string(),
                Ok(n) => format!("Applied {n} tag(s)"),
                Err(e) => format!("Could not apply tags: {e}"),
            },
        };
        Some(reply)
    }

    async fn assign_order(&self, query: &str) -> String {
        match self.assignment.set_order(query).await {
            Ok(SetOrderOutcome::Assigned(order)) => {
                let mut reply = format!(
                    "Destination: order #{} ({})",
                    order.order_number, order.customer.email
                );
                if let Some(path) = &order.order_path {
                    reply.push_str(&format!("\n  folder: {path}"));
                }
                if !order.pending_tags.is_empty() {
                    reply.push_str(&format!("\n  pending tags: {}", order.pending_tags.join(", ")));
                }
                reply
            }
            Ok(SetOrderOutcome::NotFound) => format!("No order matches '{query}'"),
            Err(e) => format!("Order lookup failed: {e}"),
        }
    }
}
