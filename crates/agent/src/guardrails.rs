use crate::classifier::TurnIntent;

/// Why automation stops for a conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandoffTrigger {
    ExplicitRequest,
    AbusiveLanguage,
    RepeatedFailures,
}

impl HandoffTrigger {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::ExplicitRequest => "patient_requested_human",
            Self::AbusiveLanguage => "abusive_language",
            Self::RepeatedFailures => "repeated_failed_attempts",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Continue,
    Handoff { trigger: HandoffTrigger, user_message: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub max_failed_attempts: u32,
    pub handoff_on_abuse: bool,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self { max_failed_attempts: 3, handoff_on_abuse: true }
    }
}

impl GuardrailPolicy {
    pub fn new(max_failed_attempts: u32) -> Self {
        Self { max_failed_attempts, ..Self::default() }
    }

    /// Checked before the turn is interpreted.
    pub fn evaluate(&self, intent: TurnIntent) -> GuardrailDecision {
        match intent {
            TurnIntent::RequestHuman => self.handoff(HandoffTrigger::ExplicitRequest),
            TurnIntent::Abusive if self.handoff_on_abuse => self.handoff(HandoffTrigger::AbusiveLanguage),
            _ => GuardrailDecision::Continue,
        }
    }

    pub fn handoff(&self, trigger: HandoffTrigger) -> GuardrailDecision {
        let user_message = match trigger {
            HandoffTrigger::ExplicitRequest => {
                "De acuerdo, te paso con una persona del equipo. Te escribirá en breve."
            }
            HandoffTrigger::AbusiveLanguage => {
                "Vamos a continuar esta conversación con una persona del equipo."
            }
            HandoffTrigger::RepeatedFailures => {
                "Parece que no consigo entenderte. Una persona del equipo seguirá la conversación contigo."
            }
        };
        GuardrailDecision::Handoff { trigger, user_message: user_message.to_owned() }
    }
}

#[cfg(test)]
mod tests {
    use super::{GuardrailDecision, GuardrailPolicy, HandoffTrigger};
    use crate::classifier::TurnIntent;

    #[test]
    fn explicit_request_hands_off() {
        let decision = GuardrailPolicy::default().evaluate(TurnIntent::RequestHuman);
        let GuardrailDecision::Handoff { trigger, user_message } = decision else {
            panic!("expected handoff");
        };
        assert_eq!(trigger.reason_code(), "patient_requested_human");
        assert!(user_message.contains("persona del equipo"));
    }

    #[test]
    fn abuse_handoff_can_be_disabled() {
        let policy = GuardrailPolicy { handoff_on_abuse: false, ..GuardrailPolicy::default() };
        assert_eq!(policy.evaluate(TurnIntent::Abusive), GuardrailDecision::Continue);
        assert!(matches!(
            GuardrailPolicy::default().evaluate(TurnIntent::Abusive),
            GuardrailDecision::Handoff { trigger: HandoffTrigger::AbusiveLanguage, .. }
        ));
    }

    #[test]
    fn other_intents_continue() {
        let policy = GuardrailPolicy::new(3);
        for intent in [TurnIntent::Affirm, TurnIntent::ProvideInfo, TurnIntent::Unknown] {
            assert_eq!(policy.evaluate(intent), GuardrailDecision::Continue);
        }
        assert!(matches!(
            policy.handoff(HandoffTrigger::RepeatedFailures),
            GuardrailDecision::Handoff { trigger: HandoffTrigger::RepeatedFailures, .. }
        ));
    }
}
