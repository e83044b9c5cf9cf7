//! # feed-splice
//!
//! Incremental merge engine for a bracket-markup social feed that lives
//! inside a chat transcript. A generation collaborator produces fragments of
//! markup; this crate parses them, merges them into the feed state already
//! persisted in the transcript, and writes the canonical form back:
//!
//! ```text
//!               ┌────────────┐   ┌─────────┐   ┌─────────┐
//!  generator ──►│   parser   ├──►│  merge  ├──►│serialize├──► managed block
//!               └────────────┘   └────▲────┘   └─────────┘
//!                                     │
//!                   existing block ───┘
//! ```
//!
//! The serialized text between the block sentinels is the only durable state;
//! anything the merge drops is gone on the next cycle. `orchestrator` drives
//! the whole cycle as a guarded state machine; the other modules are pure and
//! synchronous.

pub mod cli;
pub mod error;
pub mod generation;
pub mod grammar;
pub mod merge;
pub mod model;
pub mod orchestrator;
pub mod parser;
pub mod serializer;
pub mod settings;

pub use error::FeedError;
pub use merge::{merge, MergeConfig};
pub use model::FeedSet;
pub use orchestrator::{
    ChatHost, ContentGenerator, CycleOutcome, CyclePhase, FeedOrchestrator, OrchestratorConfig,
};
pub use parser::parse;
pub use serializer::serialize;
pub use settings::FeedSettings;
