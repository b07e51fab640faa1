//! Orchestration core of the Shape Forge workbench.
//!
//! - [`ArtifactSynthesizer`] researches a data shape with grounded search and
//!   synthesizes a reusable [`Artifact`] from the findings.
//! - [`SchemaAuditor`] validates payloads against schemas and derives schemas
//!   from payloads.
//! - [`ConversationSession`] streams an artifact-scoped chat into a
//!   transcript.
//! - [`FeedPoller`] keeps a grounded market snapshot fresh for one subject.
mod artifact;
mod auditor;
mod chat;
mod config;
mod conversation;
mod errors;
mod market;
mod opentelemetry;
mod poller;
mod sanitizer;
mod synthesizer;
mod workbench;

pub use artifact::{
    sources_from_citations, synthesis_response_schema, Artifact, SavedArtifact, Source,
    MAX_SOURCES, MAX_VARIATIONS, PLACEHOLDER_URI,
};
pub use auditor::{
    AuditWorkbench, SchemaAuditor, EMPTY_REPORT_FALLBACK, VALIDATION_FAILURE_REPORT,
};
pub use chat::ChatSession;
pub use config::{WorkbenchConfig, DEFAULT_MODEL};
pub use conversation::{
    ConversationSession, ConversationTurn, SessionState, TurnRole, NO_ACTIVE_ARTIFACT,
    STREAM_FAILURE_NOTICE,
};
pub use errors::*;
pub use market::{fetch_snapshot, parse_snapshot, MarketSnapshot, PricePoint, HISTORY_POINTS};
pub use poller::{FeedPhase, FeedPoller, FeedStatus, DEFAULT_POLL_PERIOD};
pub use sanitizer::{parse_object, sanitize};
pub use synthesizer::ArtifactSynthesizer;
pub use workbench::Workbench;
