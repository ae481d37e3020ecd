use async_trait::async_trait;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use clinibook_core::dates::{normalize, DateResolver};
use clinibook_core::domain::treatment::TreatmentCatalog;
use clinibook_core::flows::ConversationStep;
use clinibook_gateway::TransportError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnIntent {
    Greeting,
    ProvideInfo,
    Affirm,
    Deny,
    NewBooking,
    CancelBooking,
    Restart,
    RequestHuman,
    Abusive,
    Unknown,
}

impl TurnIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::ProvideInfo => "provide_info",
            Self::Affirm => "affirm",
            Self::Deny => "deny",
            Self::NewBooking => "new_booking",
            Self::CancelBooking => "cancel_booking",
            Self::Restart => "restart",
            Self::RequestHuman => "request_human",
            Self::Abusive => "abusive",
            Self::Unknown => "unknown",
        }
    }
}

/// Slot-filling facts found in one turn. Dates stay as text: resolving them
/// needs the clinic's "today", which the orchestrator owns.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFacts {
    pub name: Option<String>,
    pub treatment: Option<String>,
    pub time: Option<NaiveTime>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub intent: TurnIntent,
    pub facts: ExtractedFacts,
}

/// Turns free text into an intent plus facts. Implementations may call out
/// to an external model, hence the transport error.
#[async_trait]
pub trait TurnClassifier: Send + Sync {
    async fn classify(&self, text: &str, step: ConversationStep) -> Result<Classification, TransportError>;
}

const ABUSIVE: &[&str] =
    &["idiota", "imbecil", "estupido", "gilipollas", "mierda", "joder", "cabron", "idiot", "stupid", "fuck", "shit"];
const HUMAN_PHRASES: &[&str] = &[
    "hablar con una persona",
    "hablar con alguien",
    "con una persona",
    "persona real",
    "un humano",
    "recepcion",
    "agente",
    "operador",
    "human",
    "real person",
    "operator",
];
const RESTART_PHRASES: &[&str] =
    &["empezar de nuevo", "volver a empezar", "reiniciar", "desde el principio", "start over", "restart", "reset"];
const CANCEL_WORDS: &[&str] = &["cancelar", "cancela", "cancelarla", "anular", "anula", "anularla", "cancel"];
const NEW_BOOKING_PHRASES: &[&str] =
    &["otra cita", "nueva cita", "otra reserva", "pedir otra", "another appointment", "new appointment", "book another"];
const AFFIRM_WORDS: &[&str] = &[
    "si", "vale", "ok", "okay", "confirmo", "confirmar", "confirmado", "correcto", "perfecto", "genial", "claro",
    "adelante", "yes", "yep", "sure", "confirm",
];
const AFFIRM_PHRASES: &[&str] = &["de acuerdo", "me parece bien", "sounds good"];
const DENY_WORDS: &[&str] = &["no", "nop", "nope", "tampoco", "cambiar", "cambiarla"];
const DENY_PHRASES: &[&str] = &["mejor otro", "otro dia", "otra fecha", "otra hora"];
const GREETING_WORDS: &[&str] = &["hola", "buenas", "buenos", "hello", "hi", "hey", "saludos"];
const NAME_STOP_WORDS: &[&str] = &["y", "and", "quiero", "queria", "quisiera", "para", "i", "want", "de", "del"];
const NAME_MARKERS: &[&[&str]] = &[&["me", "llamo"], &["mi", "nombre", "es"], &["soy"], &["my", "name", "is"], &["i", "am"], &["im"]];

/// Deterministic keyword classifier. Spanish first, with the common English
/// phrasings.
#[derive(Clone, Debug, Default)]
pub struct KeywordClassifier {
    catalog: TreatmentCatalog,
    resolver: DateResolver,
}

impl KeywordClassifier {
    pub fn new(catalog: TreatmentCatalog) -> Self {
        Self { catalog, resolver: DateResolver::new() }
    }

    pub fn classify_text(&self, text: &str) -> Classification {
        let normalized = normalize(text);
        let padded = format!(" {normalized} ");
        let tokens = normalized.split_whitespace().collect::<Vec<_>>();

        let facts = ExtractedFacts {
            name: extract_name(text, &tokens),
            treatment: self.catalog.match_text(text).map(|treatment| treatment.key.clone()),
            time: self.resolver.resolve_time(text),
        };

        let has_word = |words: &[&str]| tokens.iter().any(|token| words.contains(token));
        let has_phrase = |phrases: &[&str]| phrases.iter().any(|phrase| padded.contains(&format!(" {phrase} ")));

        let intent = if has_word(ABUSIVE) {
            TurnIntent::Abusive
        } else if has_phrase(HUMAN_PHRASES) {
            TurnIntent::RequestHuman
        } else if has_phrase(RESTART_PHRASES) {
            TurnIntent::Restart
        } else if has_word(CANCEL_WORDS) {
            TurnIntent::CancelBooking
        } else if has_phrase(NEW_BOOKING_PHRASES) {
            TurnIntent::NewBooking
        } else if has_word(DENY_WORDS) || has_phrase(DENY_PHRASES) {
            TurnIntent::Deny
        } else if has_word(AFFIRM_WORDS) || has_phrase(AFFIRM_PHRASES) {
            TurnIntent::Affirm
        } else if facts != ExtractedFacts::default() {
            TurnIntent::ProvideInfo
        } else if has_word(GREETING_WORDS) {
            TurnIntent::Greeting
        } else {
            TurnIntent::Unknown
        };

        Classification { intent, facts }
    }
}

#[async_trait]
impl TurnClassifier for KeywordClassifier {
    async fn classify(&self, text: &str, _step: ConversationStep) -> Result<Classification, TransportError> {
        Ok(self.classify_text(text))
    }
}

/// Name introduced with a marker ("me llamo", "soy", "my name is"). The
/// original casing of the reply is kept.
fn extract_name(original: &str, tokens: &[&str]) -> Option<String> {
    for marker in NAME_MARKERS {
        let Some(start) = tokens.windows(marker.len()).position(|window| window == *marker) else {
            continue;
        };
        let taken = tokens.len().saturating_sub(start + marker.len()).min(3);
        if taken == 0 {
            continue;
        }

        // Map normalized positions back onto the original words, splitting
        // exactly where `normalize` does.
        let words = original
            .split(|ch: char| !(ch.is_alphanumeric() || matches!(ch, '/' | '-' | ':' | '.')))
            .map(|word| word.trim_matches(|ch| matches!(ch, '.' | '-' | ':' | '/')))
            .filter(|word| !word.is_empty())
            .collect::<Vec<_>>();
        if words.len() != tokens.len() {
            let fallback = tokens[start + marker.len()..start + marker.len() + taken]
                .iter()
                .take_while(|token| !NAME_STOP_WORDS.contains(*token))
                .copied()
                .collect::<Vec<_>>()
                .join(" ");
            if fallback.is_empty() {
                return None;
            }
            return Some(capitalize_words(&fallback));
        }
        let name = words[start + marker.len()..start + marker.len() + taken]
            .iter()
            .take_while(|word| !NAME_STOP_WORDS.contains(&normalize(word).as_str()))
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        if !name.is_empty() {
            return Some(capitalize_words(&name));
        }
    }
    None
}

pub(crate) fn capitalize_words(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
