//! Conversational booking agent.
//!
//! Inbound text flows through [`pipeline::TurnPipeline`]: fragments are
//! debounced, the phone's conversation is locked, and the
//! [`orchestrator::Orchestrator`] interprets the turn against the booking
//! flow. Automation stops for good once a conversation is handed to a human.
//!
//! The classifier only translates text into intents and facts. Slots, dates
//! and bookings are always decided by the scheduling code and the store.

pub mod audit;
pub mod availability;
pub mod classifier;
pub mod debounce;
pub mod guardrails;
pub mod orchestrator;
pub mod pipeline;
pub mod replies;

pub use audit::TracingAuditSink;
pub use availability::{AvailabilityService, DayAvailability};
pub use classifier::{Classification, ExtractedFacts, KeywordClassifier, TurnClassifier, TurnIntent};
pub use debounce::{Debouncer, Submission};
pub use guardrails::{GuardrailDecision, GuardrailPolicy, HandoffTrigger};
pub use orchestrator::{Orchestrator, OrchestratorSettings, TurnContext, TurnResult};
pub use pipeline::{InboundMessage, InboundStatus, PipelineSettings, PipelineStores, TurnPipeline};
