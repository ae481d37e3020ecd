use serde::{Deserialize, Serialize};

use crate::dates::normalize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Treatment {
    pub key: String,
    pub label: String,
    pub duration_minutes: u32,
    pub aliases: Vec<String>,
}

impl Treatment {
    fn new(key: &str, label: &str, duration_minutes: u32, aliases: &[&str]) -> Self {
        Self {
            key: key.to_owned(),
            label: label.to_owned(),
            duration_minutes,
            aliases: aliases.iter().map(|alias| (*alias).to_owned()).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreatmentCatalog {
    treatments: Vec<Treatment>,
}

impl Default for TreatmentCatalog {
    fn default() -> Self {
        Self {
            treatments: vec![
                Treatment::new("revision", "Revisión", 20, &["revision", "chequeo", "consulta", "control", "checkup", "check-up"]),
                Treatment::new("limpieza", "Limpieza dental", 45, &["limpieza", "limpiar", "higiene", "cleaning"]),
                Treatment::new("empaste", "Empaste", 45, &["empaste", "caries", "filling", "cavity"]),
                Treatment::new("endodoncia", "Endodoncia", 60, &["endodoncia", "nervio", "root canal"]),
                Treatment::new("ortodoncia", "Ortodoncia", 60, &["ortodoncia", "brackets", "braces", "aparato", "invisalign"]),
            ],
        }
    }
}

impl TreatmentCatalog {
    pub fn new(treatments: Vec<Treatment>) -> Self {
        Self { treatments }
    }

    pub fn all(&self) -> &[Treatment] {
        &self.treatments
    }

    pub fn find(&self, key: &str) -> Option<&Treatment> {
        self.treatments.iter().find(|treatment| treatment.key == key)
    }

    /// Treatment mentioned in free text. Mentions of two different
    /// treatments are ambiguous and match nothing.
    pub fn match_text(&self, text: &str) -> Option<&Treatment> {
        let haystack = format!(" {} ", normalize(text));
        let mut matches = self.treatments.iter().filter(|treatment| {
            std::iter::once(&treatment.key)
                .chain(treatment.aliases.iter())
                .any(|alias| haystack.contains(&format!(" {} ", normalize(alias))))
        });

        match (matches.next(), matches.next()) {
            (Some(treatment), None) => Some(treatment),
            _ => None,
        }
    }

    pub fn labels(&self) -> Vec<&str> {
        self.treatments.iter().map(|treatment| treatment.label.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::TreatmentCatalog;

    #[test]
    fn default_catalog_durations() {
        let catalog = TreatmentCatalog::default();
        let durations = catalog
            .all()
            .iter()
            .map(|treatment| (treatment.key.as_str(), treatment.duration_minutes))
            .collect::<Vec<_>>();

        assert_eq!(
            durations,
            vec![("revision", 20), ("limpieza", 45), ("empaste", 45), ("endodoncia", 60), ("ortodoncia", 60)]
        );
    }

    #[test]
    fn free_text_matches_aliases_without_accents() {
        let catalog = TreatmentCatalog::default();

        assert_eq!(catalog.match_text("Quería una REVISIÓN").map(|t| t.key.as_str()), Some("revision"));
        assert_eq!(catalog.match_text("me duele el nervio").map(|t| t.key.as_str()), Some("endodoncia"));
        assert_eq!(catalog.match_text("I need a root canal").map(|t| t.key.as_str()), Some("endodoncia"));
        assert!(catalog.match_text("limpieza y brackets").is_none());
        assert!(catalog.match_text("hola").is_none());
    }
}
