//! Artifact-scoped conversation state.
//!
//! A [`ConversationSession`] owns the visible transcript for one UI context
//! and the live [`ChatSession`] behind it. The chat is seeded from the active
//! artifact and created on the first message. Loading an artifact with a
//! different title discards it, so the next message starts a fresh chat
//! seeded from the new artifact.

use crate::{
    chat::ChatSession,
    opentelemetry::{OperationSpan, WorkbenchOperation},
    Artifact, StreamError,
};
use forge_sdk::{LanguageModel, LanguageModelResult};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::{pin::pin, sync::Arc};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use tracing_futures::Instrument;
use uuid::Uuid;

/// Shown in the context seed when no artifact is loaded.
pub const NO_ACTIVE_ARTIFACT: &str = "No data shape is currently loaded.";
/// Text of the assistant turn appended when a reply stream fails.
pub const STREAM_FAILURE_NOTICE: &str =
    "The connection to the assistant was interrupted. Please send your message again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One visible message in the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: String,
    pub role: TurnRole,
    pub text: String,
}

impl ConversationTurn {
    fn new(role: TurnRole, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No chat exists yet. One is created on the next message.
    Uninitialized,
    Active,
}

/// What the context seed is built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ArtifactContext {
    title: Option<String>,
    prompt: Option<String>,
}

impl ArtifactContext {
    fn from_artifact(artifact: Option<&Artifact>) -> Self {
        artifact.map_or_else(Self::default, |artifact| Self {
            title: Some(artifact.title.clone()),
            prompt: Some(artifact.prompt.clone()),
        })
    }

    fn seed(&self) -> String {
        match (&self.title, &self.prompt) {
            (Some(title), Some(prompt)) => format!(
                "You are a data-architecture assistant helping the user work with the \
                 \"{title}\" data shape.\n\
                 Its JSON prompt is:\n{prompt}\n\n\
                 Answer questions about its fields, types and usage. Keep answers concise and \
                 use markdown."
            ),
            _ => format!(
                "You are a data-architecture assistant. {NO_ACTIVE_ARTIFACT} \
                 Help the user reason about data shapes in general and keep answers concise."
            ),
        }
    }
}

/// Transcript and chat lifecycle for one UI context.
pub struct ConversationSession {
    model: Arc<dyn LanguageModel + Send + Sync>,
    context: ArtifactContext,
    chat: Option<ChatSession>,
    generation: u64,
    turns: Vec<ConversationTurn>,
    observer: watch::Sender<Vec<ConversationTurn>>,
}

impl ConversationSession {
    pub fn new(model: Arc<dyn LanguageModel + Send + Sync>, artifact: Option<&Artifact>) -> Self {
        let (observer, _) = watch::channel(Vec::new());
        Self {
            model,
            context: ArtifactContext::from_artifact(artifact),
            chat: None,
            generation: 0,
            turns: Vec::new(),
            observer,
        }
    }

    pub fn state(&self) -> SessionState {
        if self.chat.is_some() {
            SessionState::Active
        } else {
            SessionState::Uninitialized
        }
    }

    /// Number of chats started so far. Each one gets the next generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Seed of the live chat, or the seed the next chat would get.
    pub fn context_seed(&self) -> String {
        self.chat.as_ref().map_or_else(
            || self.context.seed(),
            |chat| chat.system_context().to_string(),
        )
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Watch the transcript. A new value is published for every appended
    /// turn and every streamed fragment.
    pub fn subscribe(&self) -> watch::Receiver<Vec<ConversationTurn>> {
        self.observer.subscribe()
    }

    /// Point the session at a different artifact.
    ///
    /// A change of title resets the session and returns the discarded
    /// transcript. The same title keeps the live chat and returns `None`.
    pub fn set_artifact(&mut self, artifact: Option<&Artifact>) -> Option<Vec<ConversationTurn>> {
        let context = ArtifactContext::from_artifact(artifact);
        if context.title == self.context.title {
            return None;
        }

        info!(
            from = ?self.context.title,
            to = ?context.title,
            "active artifact changed, resetting conversation"
        );
        self.context = context;
        Some(self.reset())
    }

    /// Drop the live chat and clear the transcript, returning it.
    pub fn reset(&mut self) -> Vec<ConversationTurn> {
        self.chat = None;
        let previous = std::mem::take(&mut self.turns);
        self.observer.send_replace(Vec::new());
        previous
    }

    /// Send a user message and fold the streamed reply into the transcript.
    ///
    /// Blank messages are ignored. A reply that fails part way keeps the
    /// fragments already shown and ends with a [`STREAM_FAILURE_NOTICE`] turn.
    pub async fn send(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        push_turn(
            &mut self.turns,
            &self.observer,
            ConversationTurn::new(TurnRole::User, text),
        );

        if self.chat.is_none() {
            self.generation += 1;
            debug!(generation = self.generation, "starting chat");
            self.chat = Some(ChatSession::new(Arc::clone(&self.model), self.context.seed()));
        }
        let Some(chat) = self.chat.as_mut() else {
            return;
        };

        let mut span = OperationSpan::new(
            WorkbenchOperation::ChatTurn,
            self.context.title.as_deref().unwrap_or("none"),
        );
        let outcome = fold_reply(chat.send_stream(text), &mut self.turns, &self.observer)
            .instrument(span.span())
            .await;

        if let Err(error) = outcome {
            span.on_error(&error);
            warn!(generation = self.generation, error = %error, "chat reply failed");
            push_turn(
                &mut self.turns,
                &self.observer,
                ConversationTurn::new(TurnRole::Assistant, STREAM_FAILURE_NOTICE),
            );
        }
        span.on_end();
    }
}

fn push_turn(
    turns: &mut Vec<ConversationTurn>,
    observer: &watch::Sender<Vec<ConversationTurn>>,
    turn: ConversationTurn,
) {
    turns.push(turn);
    observer.send_replace(turns.clone());
}

/// Append the reply's fragments to one assistant turn, created on the first
/// fragment. A reply with no fragments still leaves an empty assistant turn.
async fn fold_reply<S>(
    fragments: S,
    turns: &mut Vec<ConversationTurn>,
    observer: &watch::Sender<Vec<ConversationTurn>>,
) -> Result<(), StreamError>
where
    S: Stream<Item = LanguageModelResult<String>>,
{
    let mut fragments = pin!(fragments);
    let mut reply_index = None;

    while let Some(fragment) = fragments.next().await {
        let fragment = fragment?;
        match reply_index {
            Some(index) => {
                let reply: &mut ConversationTurn = &mut turns[index];
                reply.text.push_str(&fragment);
                observer.send_replace(turns.clone());
            }
            None => {
                push_turn(
                    turns,
                    observer,
                    ConversationTurn::new(TurnRole::Assistant, fragment),
                );
                reply_index = Some(turns.len() - 1);
            }
        }
    }

    if reply_index.is_none() {
        push_turn(
            turns,
            observer,
            ConversationTurn::new(TurnRole::Assistant, ""),
        );
    }
    Ok(())
}
