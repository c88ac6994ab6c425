#[cfg(test)]
#[path = "app_test.rs"]
mod tests;

use std::io::{self, Write};
use std::sync::Arc;

use eyre::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::app::session::Session;
use crate::backend::ArcBackend;
use crate::models::{Delivery, Event, Page, Role, SendRejected, SessionContext, TranscriptEntry};
use crate::storage::ArcStore;

const HELP: &str = r#"Commands:
  /new     start a new conversation
  /delete  delete the current conversation
  /help    show this help
  /quit    leave (end of input also quits)"#;

/// Line oriented chat surface on stdin/stdout.
pub struct App {
    session: Session,
    events: mpsc::UnboundedReceiver<Event>,
    cancel_token: CancellationToken,
    page: Page,
}

impl App {
    pub fn new(
        context: SessionContext,
        store: ArcStore,
        backend: ArcBackend,
        history_limit: usize,
        cancel_token: CancellationToken,
    ) -> App {
        let (event_tx, events) = mpsc::unbounded_channel::<Event>();
        let page = context.page();
        App {
            session: Session::new(context, store, backend, Arc::new(event_tx))
                .with_history_limit(history_limit),
            events,
            cancel_token,
            page,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();

        self.session.mount().await;
        self.render(&mut stdout)?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    log::debug!("Chat surface cancelled");
                    break;
                }

                _ = self.session.settle(), if self.session.is_sending() => {}

                line = lines.next_line() => {
                    match line.wrap_err("reading input")? {
                        Some(line) => {
                            if self.handle_line(line.trim(), &mut stdout).await? {
                                break;
                            }
                        }
                        None => {
                            // Let the last exchange land before leaving.
                            self.session.settle().await;
                            self.render(&mut stdout)?;
                            break;
                        }
                    }
                }
            }
            self.render(&mut stdout)?;
        }

        self.cancel_token.cancel();
        Ok(())
    }

    /// Returns `true` when the user asked to quit.
    async fn handle_line(&mut self, line: &str, out: &mut impl Write) -> Result<bool> {
        let rejected = match line {
            "" => None,
            "/quit" | "/exit" => return Ok(true),
            "/help" => {
                writeln!(out, "{}", HELP)?;
                None
            }
            "/new" => self.session.start_new_conversation().await.err(),
            "/delete" => self.session.delete_conversation().await.err(),
            text => self.session.send(text).await.err(),
        };

        match rejected {
            Some(SendRejected::Busy) => {
                writeln!(out, "Still waiting for the assistant, try again in a moment.")?
            }
            Some(err) => log::debug!("Input rejected: {}", err),
            None => {}
        }
        Ok(false)
    }

    fn render(&mut self, out: &mut impl Write) -> Result<()> {
        while let Ok(event) = self.events.try_recv() {
            render_event(&event, self.page, out)?;
        }
        if !self.session.is_sending() {
            write!(out, "you> ")?;
        }
        out.flush()?;
        Ok(())
    }
}

pub(crate) fn render_event(event: &Event, page: Page, out: &mut impl Write) -> Result<()> {
    match event {
        Event::HistoryLoaded(entries) => {
            if entries.is_empty() {
                writeln!(out, "assistant> {}", page.greeting())?;
            }
            for entry in entries {
                render_entry(entry, out)?;
            }
        }

        // The user already sees what they typed.
        Event::EntryAppended(entry) if entry.role() == Role::User => {}
        Event::EntryAppended(entry) => render_entry(entry, out)?,

        Event::EntryUpdated(entry) => {
            if entry.role() == Role::User && *entry.delivery() == Delivery::Local {
                writeln!(out, "(your last message could not be saved)")?;
            }
        }

        Event::TranscriptCleared => {
            writeln!(out, "---")?;
            writeln!(out, "assistant> {}", page.greeting())?;
        }

        Event::SendingChanged(true) => writeln!(out, "assistant is typing...")?,
        Event::SendingChanged(false) => {}

        Event::ConversationChanged(id) => {
            log::debug!("Conversation changed: {:?}", id);
        }

        Event::Notice(notice) => {
            writeln!(out, "[{}] {}", notice.kind().label(), notice.message())?;
        }
    }
    Ok(())
}

fn render_entry(entry: &TranscriptEntry, out: &mut impl Write) -> io::Result<()> {
    let speaker = match entry.role() {
        Role::User => "you",
        Role::Assistant => "assistant",
    };
    writeln!(out, "{}> {}", speaker, entry.content())
}
