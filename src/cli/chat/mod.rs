pub mod conversation_state;
pub mod persona;
pub mod prompt;
pub mod renderer;
pub mod session;
pub mod terminal;

use std::future::Future;
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use color_print::{cformat, cwrite, cwriteln};
use eyre::Result;
use prompt::generate_prompt;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use self::conversation_state::Role;
use self::persona::PromptTemplate;
use self::renderer::{ChannelSink, Frame, FrameSink, Renderer};
use self::session::{ChatSession, Exchange};
use self::terminal::TerminalSink;
use crate::backend::BackendFactory;
use crate::config::Settings;

const WELCOME_TEXT: &str = "
Welcome to your personal CRM assistant! I'm here to help you with various Customer Relationship Management tasks.
Feel free to ask about creating marketing campaigns, integrating email services, generating reports, and more.

What can I help you with today?

/help         Show the help dialogue
/quit         Quit the application
";

const HELP_TEXT: &str = "
CRM Assistant

/clear        Clear the conversation
/history      Show the conversation so far
/help         Show this help dialogue
/quit         Quit the application

Press Ctrl-C while a reply is on its way to stop it.
";

pub struct ChatContext {
    output: Box<dyn Write>,
    input: Option<String>,
    interactive: bool,
    backend_label: String,
    session: Arc<ChatSession>,
}

impl ChatContext {
    pub fn new(
        output: Box<dyn Write>,
        input: Option<String>,
        interactive: bool,
        settings: Settings,
    ) -> Self {
        let backend_label = settings.backend.describe();
        let factory: Arc<dyn BackendFactory> = Arc::new(settings.backend);
        let session = ChatSession::new(
            factory,
            PromptTemplate::crm(),
            Renderer::new(settings.delay),
            settings.deadline,
        );

        Self {
            output,
            input,
            interactive,
            backend_label,
            session: Arc::new(session),
        }
    }

    pub async fn run(&mut self) -> Result<ExitCode> {
        // Handle non-interactive mode (single query)
        if let Some(input) = self.input.take() {
            let exchange = self.process_chat_input(&input).await?;
            return Ok(match exchange {
                Exchange::Replied(_) => ExitCode::SUCCESS,
                Exchange::Failed(_) | Exchange::Stopped => ExitCode::FAILURE,
            });
        }

        if self.interactive {
            self.print_welcome()?;
            self.run_interactive().await?;
        }

        Ok(ExitCode::SUCCESS)
    }

    fn print_welcome(&mut self) -> Result<()> {
        cwriteln!(self.output, "<bold>CRM Assistant</bold>")?;
        cwriteln!(self.output, "<dim>Serri's own CRM Chatbot · {}</dim>", self.backend_label)?;
        writeln!(self.output, "{}", WELCOME_TEXT)?;
        Ok(())
    }

    async fn run_interactive(&mut self) -> Result<()> {
        let mut rl = prompt::rl()?;
        let history = prompt::history_path();
        if let Some(path) = &history {
            if rl.load_history(path).is_err() {
                debug!("no readline history at {}", path.display());
            }
        }

        loop {
            let prompt_text = generate_prompt(None);
            let readline = rl.readline(&prompt_text);

            match readline {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }

                    rl.add_history_entry(line.as_str());

                    if line.trim() == "/quit" {
                        break;
                    }

                    if let Err(e) = self.handle_input(&line).await {
                        error!("failed to handle input: {:?}", e);
                        writeln!(self.output, "Error: {}", e)?;
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(e) => {
                    writeln!(self.output, "Error: {}", e)?;
                    break;
                }
            }
        }

        if let Some(path) = &history {
            if let Err(e) = rl.save_history(path) {
                warn!("failed to save readline history to {}: {}", path.display(), e);
            }
        }

        Ok(())
    }

    async fn handle_input(&mut self, input: &str) -> Result<()> {
        match input.trim() {
            "/help" => {
                writeln!(self.output, "{}", HELP_TEXT)?;
            }
            "/clear" => {
                self.session.clear();
                writeln!(self.output, "Conversation cleared.")?;
            }
            "/history" => {
                self.print_history()?;
            }
            _ => {
                self.process_chat_input(input).await?;
            }
        }

        Ok(())
    }

    fn print_history(&mut self) -> Result<()> {
        let turns = self.session.transcript();
        if turns.is_empty() {
            writeln!(self.output, "No messages yet.")?;
            return Ok(());
        }

        for turn in turns {
            let label = match turn.role {
                Role::User => cformat!("<green><bold>{}</bold></green>", turn.role),
                Role::Assistant => cformat!("<cyan><bold>{}</bold></cyan>", turn.role),
                Role::Error => cformat!("<red><bold>{}</bold></red>", turn.role),
            };
            cwriteln!(
                self.output,
                "<dim>[{}]</dim> {}: {}",
                turn.at.format("%H:%M:%S"),
                label,
                turn.content
            )?;
        }

        Ok(())
    }

    /// Runs one exchange on its own task, painting frames as they arrive.
    async fn process_chat_input(&mut self, input: &str) -> Result<Exchange> {
        cwrite!(self.output, "<cyan><bold>assistant</bold></cyan> ")?;
        self.output.flush()?;

        let (mut sink, mut frames) = ChannelSink::new();
        let session = Arc::clone(&self.session);
        let text = input.to_string();
        let exchange = tokio::spawn(async move { session.submit(&text, &mut sink).await });

        let mut terminal = TerminalSink::new(&mut self.output);
        let stop_session = Arc::clone(&self.session);
        paint_frames(&mut frames, &mut terminal, tokio::signal::ctrl_c(), || {
            stop_session.stop()
        })
        .await?;

        let exchange = exchange.await??;
        match &exchange {
            Exchange::Replied(_) => {}
            Exchange::Failed(err) => {
                cwriteln!(self.output, "<red>Error:</red> {}", err)?;
            }
            Exchange::Stopped => {
                cwriteln!(self.output, "<dim>(stopped)</dim>")?;
            }
        }

        Ok(exchange)
    }
}

/// Shows frames until the exchange drops its sender, calling `on_stop` the
/// first time `stop_signal` fires.
async fn paint_frames<S, F>(
    frames: &mut mpsc::UnboundedReceiver<Frame>,
    sink: &mut S,
    stop_signal: F,
    mut on_stop: impl FnMut(),
) -> io::Result<()>
where
    S: FrameSink + ?Sized,
    F: Future<Output = io::Result<()>>,
{
    tokio::pin!(stop_signal);
    let mut stopped = false;
    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(frame) => sink.show(&frame)?,
                None => return Ok(()),
            },
            signal = &mut stop_signal, if !stopped => {
                stopped = true;
                match signal {
                    Ok(()) => {
                        debug!("stop requested");
                        on_stop();
                    }
                    Err(e) => warn!("failed to listen for Ctrl-C: {}", e),
                }
            }
        }
    }
}
