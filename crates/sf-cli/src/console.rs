use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;
use sf_core::{
    Attachment, Contact, InboundEvent, InboundPayload, MessageRef, OutputOptions, ScenarioError,
};
use sf_runtime::{Engine, Transport, TRANSPORT_MESSAGE_GONE};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error_map::map_console_io;

pub(crate) const HELP_LINES: [&str; 5] = [
    "/press N               press button N of the latest keyboard",
    "/contact PHONE [NAME]  share a contact",
    "/doc NAME [CAPTION]    upload a document",
    "/quit                  leave",
    "anything else          send as text",
];

/// Prints outbound messages as numbered lines. Buttons of the most recent
/// keyboard per session can be pressed with `/press N`.
pub(crate) struct ConsoleTransport {
    out: Mutex<Box<dyn Write + Send>>,
    state: Mutex<ConsoleState>,
}

#[derive(Default)]
struct ConsoleState {
    next_id: u64,
    live: BTreeSet<MessageRef>,
    keyboards: BTreeMap<String, (MessageRef, Vec<String>)>,
}

impl ConsoleTransport {
    pub(crate) fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
            state: Mutex::new(ConsoleState::default()),
        }
    }

    pub(crate) fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    pub(crate) fn notice(&self, text: &str) -> Result<(), ScenarioError> {
        self.write_lines(&[format!("! {}", text)])
    }

    /// Callback id and message of button `number` (1-based) in the session's
    /// latest keyboard.
    pub(crate) fn button(&self, session_id: &str, number: usize) -> Option<(MessageRef, String)> {
        let state = self.lock_state();
        let (message, ids) = state.keyboards.get(session_id)?;
        let id = ids.get(number.checked_sub(1)?)?;
        Some((message.clone(), id.clone()))
    }

    fn render(&self, session_id: &str, message: &MessageRef, header: String, options: &OutputOptions) -> Vec<String> {
        let mut lines = vec![header];
        let mut ids = Vec::new();
        for row in &options.buttons {
            for button in row {
                match (&button.url, &button.callback_id) {
                    (Some(url), _) => lines.push(format!("    ({}) {}", button.text, url)),
                    (None, Some(id)) => {
                        ids.push(id.clone());
                        lines.push(format!("    [{}] {}", ids.len(), button.text));
                    }
                    (None, None) => lines.push(format!("    ({})", button.text)),
                }
            }
        }
        for attachment in &options.attachments {
            lines.push(format!(
                "    <{} {}>",
                attachment.kind,
                attachment.file_name.as_deref().unwrap_or(&attachment.file_id)
            ));
        }
        if !ids.is_empty() {
            self.lock_state()
                .keyboards
                .insert(session_id.to_string(), (message.clone(), ids));
        }
        lines
    }

    fn write_lines(&self, lines: &[String]) -> Result<(), ScenarioError> {
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        for line in lines {
            writeln!(out, "{}", line).map_err(console_send_error)?;
        }
        out.flush().map_err(console_send_error)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ConsoleState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_live(&self, message: &MessageRef) -> Result<(), ScenarioError> {
        if self.lock_state().live.contains(message) {
            return Ok(());
        }
        Err(ScenarioError::transport(
            TRANSPORT_MESSAGE_GONE,
            format!("Message #{} is gone.", message),
        ))
    }
}

fn console_send_error(error: std::io::Error) -> ScenarioError {
    ScenarioError::transport("TRANSPORT_CONSOLE", error.to_string())
}

#[async_trait]
impl Transport for ConsoleTransport {
    async fn send(
        &self,
        session_id: &str,
        text: &str,
        options: &OutputOptions,
    ) -> Result<MessageRef, ScenarioError> {
        let message = {
            let mut state = self.lock_state();
            state.next_id += 1;
            let message = MessageRef::new(state.next_id.to_string());
            state.live.insert(message.clone());
            message
        };
        let lines = self.render(session_id, &message, format!("#{} {}", message, text), options);
        self.write_lines(&lines)?;
        Ok(message)
    }

    async fn edit(
        &self,
        session_id: &str,
        message: &MessageRef,
        text: &str,
        options: &OutputOptions,
    ) -> Result<(), ScenarioError> {
        self.ensure_live(message)?;
        let lines = self.render(session_id, message, format!("#{} (edited) {}", message, text), options);
        self.write_lines(&lines)
    }

    async fn delete(&self, session_id: &str, message: &MessageRef) -> Result<(), ScenarioError> {
        self.ensure_live(message)?;
        {
            let mut state = self.lock_state();
            state.live.remove(message);
            let pressed_gone = state
                .keyboards
                .get(session_id)
                .is_some_and(|(keyboard, _)| keyboard == message);
            if pressed_gone {
                state.keyboards.remove(session_id);
            }
        }
        self.write_lines(&[format!("#{} (deleted)", message)])
    }
}

#[derive(Debug, PartialEq)]
pub(crate) enum ConsoleInput {
    Event(InboundEvent),
    Help,
    Quit,
    Skip,
    Invalid(String),
}

pub(crate) fn parse_line(transport: &ConsoleTransport, session_id: &str, line: &str) -> ConsoleInput {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ConsoleInput::Skip;
    }
    let mut words = trimmed.split_whitespace();
    let head = words.next().unwrap_or_default();
    let rest: Vec<&str> = words.collect();

    match head {
        "/quit" => ConsoleInput::Quit,
        "/help" => ConsoleInput::Help,
        "/press" => {
            let Some(number) = rest.first().and_then(|raw| raw.parse::<usize>().ok()) else {
                return ConsoleInput::Invalid("usage: /press N".to_string());
            };
            match transport.button(session_id, number) {
                Some((message, callback_id)) => ConsoleInput::Event(InboundEvent {
                    session_id: session_id.to_string(),
                    payload: InboundPayload::Callback {
                        data: callback_id,
                        message_ref: Some(message),
                    },
                }),
                None => ConsoleInput::Invalid(format!("no button {}", number)),
            }
        }
        "/contact" => {
            let Some(phone) = rest.first() else {
                return ConsoleInput::Invalid("usage: /contact PHONE [NAME]".to_string());
            };
            ConsoleInput::Event(InboundEvent::contact(
                session_id,
                Contact {
                    phone: (*phone).to_string(),
                    first_name: rest.get(1).map(|name| (*name).to_string()).unwrap_or_default(),
                    last_name: rest.get(2..).map(|names| names.join(" ")).unwrap_or_default(),
                },
            ))
        }
        "/doc" => {
            let Some(name) = rest.first() else {
                return ConsoleInput::Invalid("usage: /doc NAME [CAPTION]".to_string());
            };
            let caption = (rest.len() > 1).then(|| rest[1..].join(" "));
            ConsoleInput::Event(InboundEvent::document(
                session_id,
                Attachment {
                    kind: "document".to_string(),
                    file_id: format!("console:{}", name),
                    file_name: Some((*name).to_string()),
                },
                caption,
            ))
        }
        _ => ConsoleInput::Event(InboundEvent::text(session_id, trimmed)),
    }
}

/// Starts the session, then feeds each input line to the engine until
/// `/quit` or end of input. Dispatch errors are shown and the loop goes on.
pub(crate) async fn run_console<R>(
    engine: &Engine,
    transport: &ConsoleTransport,
    session_id: &str,
    reader: R,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    if let Err(error) = engine.start_session(session_id).await {
        transport.notice(&error.to_string())?;
    }
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await.map_err(map_console_io)? {
        let event = match parse_line(transport, session_id, &line) {
            ConsoleInput::Quit => break,
            ConsoleInput::Skip => continue,
            ConsoleInput::Help => {
                let help: Vec<String> = HELP_LINES.iter().map(|line| line.to_string()).collect();
                transport.write_lines(&help)?;
                continue;
            }
            ConsoleInput::Invalid(reason) => {
                transport.notice(&reason)?;
                continue;
            }
            ConsoleInput::Event(event) => event,
        };
        if let Err(error) = engine.handle_event(event).await {
            transport.notice(&error.to_string())?;
        }
    }
    Ok(())
}
