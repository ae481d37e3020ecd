pub mod engine;
pub mod states;

pub use engine::{BookingFlow, FlowDefinition, FlowEngine, FlowTransitionError};
pub use states::{ConversationStep, FlowAction, FlowContext, FlowEvent, TransitionOutcome};
