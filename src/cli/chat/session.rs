use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::conversation_state::{ConversationState, Role, Turn};
use super::persona::{PromptError, PromptTemplate};
use super::renderer::{FrameSink, RenderOutcome, Renderer};
use crate::backend::{collect_reply, BackendError, BackendFactory, ModelBackend};

/// Where a session is within one submit/reply exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    AwaitingBackend,
    Streaming,
}

/// How a submitted message ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exchange {
    /// The reply was rendered and stored.
    Replied(String),
    /// The backend failed; an error turn was stored instead of a reply.
    Failed(BackendError),
    /// Stopped before the reply was fully shown; nothing was stored for it.
    Stopped,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a reply is still in progress")]
    Busy,

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error("failed to display reply: {0}")]
    Display(#[from] io::Error),
}

struct Transcript {
    conversation: ConversationState,
    /// Bumped on every clear so an exchange from before it cannot write after it.
    epoch: u64,
}

/// State of one interactive chat session.
///
/// Created when the session starts and dropped when it ends. Only one
/// exchange runs at a time; [`ChatSession::submit`] rejects the rest.
pub struct ChatSession {
    factory: Arc<dyn BackendFactory>,
    template: PromptTemplate,
    renderer: Renderer,
    deadline: Duration,
    transcript: Mutex<Transcript>,
    backend: Mutex<Option<Arc<dyn ModelBackend>>>,
    state: Mutex<ExchangeState>,
    cancel: Mutex<CancellationToken>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Puts the session back to idle however the exchange ends.
struct ExchangeGuard<'a> {
    state: &'a Mutex<ExchangeState>,
}

impl ExchangeGuard<'_> {
    fn set(&self, next: ExchangeState) {
        *lock(self.state) = next;
    }
}

impl Drop for ExchangeGuard<'_> {
    fn drop(&mut self) {
        self.set(ExchangeState::Idle);
    }
}

impl ChatSession {
    pub fn new(
        factory: Arc<dyn BackendFactory>,
        template: PromptTemplate,
        renderer: Renderer,
        deadline: Duration,
    ) -> Self {
        info!(deadline_secs = deadline.as_secs(), "Starting chat session");
        Self {
            factory,
            template,
            renderer,
            deadline,
            transcript: Mutex::new(Transcript {
                conversation: ConversationState::new(),
                epoch: 0,
            }),
            backend: Mutex::new(None),
            state: Mutex::new(ExchangeState::Idle),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn state(&self) -> ExchangeState {
        *lock(&self.state)
    }

    /// Snapshot of the transcript in arrival order.
    pub fn transcript(&self) -> Vec<Turn> {
        lock(&self.transcript).conversation.all().to_vec()
    }

    /// Sends `text` to the backend and types the reply out on `sink`.
    pub async fn submit<S: FrameSink + ?Sized>(
        &self,
        text: &str,
        sink: &mut S,
    ) -> Result<Exchange, SessionError> {
        let prompt = self.template.render(text)?;
        let (guard, cancel, epoch) = self.begin(text)?;

        let reply = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Exchange stopped while awaiting the backend");
                return Ok(Exchange::Stopped);
            }
            reply = self.generate(&prompt) => reply,
        };

        let reply = match reply {
            Ok(reply) => reply,
            Err(err) => {
                warn!(%err, "Backend call failed");
                self.record(epoch, Turn::new(Role::Error, format!("Error: {}", err)));
                return Ok(Exchange::Failed(err));
            }
        };

        guard.set(ExchangeState::Streaming);
        match self.renderer.render(&reply, sink, &cancel).await? {
            RenderOutcome::Completed(_) => {
                self.record(epoch, Turn::new(Role::Assistant, reply.clone()));
                Ok(Exchange::Replied(reply))
            }
            RenderOutcome::Aborted(shown) => {
                info!(shown = shown.len(), total = reply.len(), "Exchange stopped while streaming");
                Ok(Exchange::Stopped)
            }
        }
    }

    /// Cancels the exchange in flight, if any.
    pub fn stop(&self) {
        lock(&self.cancel).cancel();
    }

    /// Empties the transcript and drops the backend connection so the next
    /// message starts from scratch.
    pub fn clear(&self) {
        info!(state = ?self.state(), "Clearing conversation");
        self.stop();
        {
            let mut transcript = lock(&self.transcript);
            if !transcript.conversation.is_empty() {
                debug!(turns = transcript.conversation.len(), "dropping turns");
            }
            transcript.conversation.clear();
            transcript.epoch += 1;
        }
        lock(&self.backend).take();
    }

    /// Claims the session for one exchange and stores the user turn.
    fn begin(
        &self,
        text: &str,
    ) -> Result<(ExchangeGuard<'_>, CancellationToken, u64), SessionError> {
        let cancel = CancellationToken::new();
        {
            let mut state = lock(&self.state);
            if *state != ExchangeState::Idle {
                debug!(state = ?*state, "rejecting submission");
                return Err(SessionError::Busy);
            }
            // Installed before the state leaves Idle.
            *lock(&self.cancel) = cancel.clone();
            *state = ExchangeState::AwaitingBackend;
        }
        let guard = ExchangeGuard { state: &self.state };

        let mut transcript = lock(&self.transcript);
        transcript.conversation.add_user_message(text);
        Ok((guard, cancel, transcript.epoch))
    }

    fn record(&self, epoch: u64, turn: Turn) {
        let mut transcript = lock(&self.transcript);
        if transcript.epoch == epoch {
            transcript.conversation.append(turn);
        } else {
            debug!("conversation cleared mid-exchange, dropping {} turn", turn.role);
        }
    }

    fn connect(&self) -> Result<Arc<dyn ModelBackend>, BackendError> {
        let mut backend = lock(&self.backend);
        if let Some(backend) = backend.as_ref() {
            return Ok(Arc::clone(backend));
        }
        let connected = self.factory.connect()?;
        *backend = Some(Arc::clone(&connected));
        Ok(connected)
    }

    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        let backend = self.connect()?;
        debug!(backend = backend.name(), "awaiting backend reply");
        match tokio::time::timeout(self.deadline, collect_reply(backend.as_ref(), prompt)).await {
            Ok(reply) => reply,
            Err(_) => Err(BackendError::Timeout(self.deadline)),
        }
    }
}
