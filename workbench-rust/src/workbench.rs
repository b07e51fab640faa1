use crate::{
    Artifact, ArtifactSynthesizer, AuditWorkbench, ConversationSession, FeedPoller,
    SchemaAuditor, WorkbenchConfig,
};
use forge_sdk::{
    google::{GoogleModel, GoogleModelOptions},
    LanguageModel,
};
use std::{sync::Arc, time::Duration};
use tracing::info;

/// Entry point wiring every component to its configured model.
#[derive(Clone)]
pub struct Workbench {
    synthesizer: ArtifactSynthesizer,
    auditor: SchemaAuditor,
    chat_model: Arc<dyn LanguageModel + Send + Sync>,
    feed_model: Arc<dyn LanguageModel + Send + Sync>,
    poll_period: Duration,
}

impl Workbench {
    /// Build Gemini models from `config`.
    pub fn from_config(config: &WorkbenchConfig) -> Self {
        let model = |model_id: &str| -> Arc<dyn LanguageModel + Send + Sync> {
            Arc::new(GoogleModel::new(
                model_id,
                GoogleModelOptions {
                    api_key: config.api_key.clone(),
                    base_url: config.base_url.clone(),
                    headers: None,
                    client: None,
                },
            ))
        };
        info!(
            research = %config.research_model,
            synthesis = %config.synthesis_model,
            chat = %config.chat_model,
            feed = %config.feed_model,
            "workbench configured"
        );

        let synthesis_model = model(&config.synthesis_model);
        Self {
            synthesizer: ArtifactSynthesizer::with_models(
                model(&config.research_model),
                Arc::clone(&synthesis_model),
            ),
            auditor: SchemaAuditor::new(synthesis_model),
            chat_model: model(&config.chat_model),
            feed_model: model(&config.feed_model),
            poll_period: config.poll_period,
        }
    }

    /// Use one model for everything.
    pub fn with_model(model: Arc<dyn LanguageModel + Send + Sync>, poll_period: Duration) -> Self {
        Self {
            synthesizer: ArtifactSynthesizer::new(Arc::clone(&model)),
            auditor: SchemaAuditor::new(Arc::clone(&model)),
            chat_model: Arc::clone(&model),
            feed_model: model,
            poll_period,
        }
    }

    pub fn synthesizer(&self) -> &ArtifactSynthesizer {
        &self.synthesizer
    }

    pub fn auditor(&self) -> &SchemaAuditor {
        &self.auditor
    }

    pub fn audit(&self, artifact: &Artifact) -> AuditWorkbench {
        AuditWorkbench::new(self.auditor.clone(), artifact)
    }

    pub fn conversation(&self, artifact: Option<&Artifact>) -> ConversationSession {
        ConversationSession::new(Arc::clone(&self.chat_model), artifact)
    }

    /// A new, idle poller. It needs a Tokio runtime once a subject is set.
    pub fn feed_poller(&self) -> FeedPoller {
        FeedPoller::new(Arc::clone(&self.feed_model), self.poll_period)
    }
}
