use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use unicode_segmentation::UnicodeSegmentation;

pub const MAX_ENTITIES: usize = 50;

const STOP_WORDS: [&str; 10] = ["de", "la", "el", "en", "con", "por", "para", "del", "las", "los"];
const DEADLINE_TERMS: [&str; 6] = [
    "plazo",
    "término",
    "vence",
    "caduca",
    "prescribe",
    "fecha límite",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Dates,
    Laws,
    Articles,
    Money,
    CaseNumbers,
    Persons,
    Organizations,
    Locations,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegalEntity {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: EntityType,
    /// Byte offsets into the source text.
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportantDate {
    pub date: String,
    pub sentence: String,
    pub is_deadline: bool,
}

const DATE_PATTERN: &str =
    r"(?i)\b(\d{1,2}[-/]\d{1,2}[-/]\d{2,4}|\d{1,2}\s+de\s+[a-záéíóúüñ]+\s+de\s+\d{2,4})\b";

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(DATE_PATTERN).unwrap());

static PATTERNS: LazyLock<Vec<(EntityType, Regex)>> = LazyLock::new(|| {
    [
        (EntityType::Dates, DATE_PATTERN),
        (
            EntityType::Laws,
            r"(?i)\b(Ley|Decreto|Resolución|Acuerdo|Código)\s+N[°oº]?\s*[\d\-]+(?:[-/]\d+)?\b",
        ),
        (
            EntityType::Articles,
            r"(?i)\bart[íi]culos?\s+\d+(?:\s*[a-z])?(?:\s*al?\s*\d+)?",
        ),
        (
            EntityType::Money,
            r"(?i)(?:\bB/\.|\bUSD|\bUS\$|\$|\bbalboas?)\s*[\d,]+(?:\.\d{2})?",
        ),
        (
            EntityType::CaseNumbers,
            r"(?i)\b(?:Expediente|Caso|N[°oº])\s*[\w\-/]+",
        ),
        (
            EntityType::Persons,
            r"\b[A-ZÁÉÍÓÚÜÑ][a-záéíóúüñ]+(?:\s+[A-ZÁÉÍÓÚÜÑ][a-záéíóúüñ]+){1,3}\b",
        ),
        (
            EntityType::Organizations,
            r"(?i)\b(?:Ministerio|Tribunal|Corte|Juzgado|Registro|Autoridad|Superintendencia|Dirección)\s+[A-ZÁÉÍÓÚÜÑ][a-záéíóúüñ\s]+",
        ),
        (
            EntityType::Locations,
            r"(?i)\b(?:Panamá|Chiriquí|Veraguas|Herrera|Los Santos|Coclé|Colón|Darién|San Miguelito|Penonome|Santiago|David|Las Tablas)\b",
        ),
    ]
    .into_iter()
    .map(|(kind, pattern)| (kind, Regex::new(pattern).unwrap()))
    .collect()
});

/// Pattern-based extraction of dates, laws, articles, amounts, case numbers,
/// names, institutions and places from Spanish legal text.
pub fn extract_legal_entities(text: &str) -> Vec<LegalEntity> {
    let mut entities: Vec<LegalEntity> = Vec::new();

    for (kind, pattern) in PATTERNS.iter() {
        for m in pattern.find_iter(text) {
            let cleaned = m.as_str().trim();
            let duplicate = entities
                .iter()
                .any(|e| e.kind == *kind && e.text == cleaned);
            if duplicate || cleaned.chars().count() <= 2 {
                continue;
            }
            if STOP_WORDS.contains(&cleaned.to_lowercase().as_str()) {
                continue;
            }

            entities.push(LegalEntity {
                text: cleaned.to_string(),
                kind: *kind,
                start: m.start(),
                end: m.end(),
            });
        }
    }

    entities.truncate(MAX_ENTITIES);
    entities
}

/// First date mentioned in each sentence, flagged when the sentence talks
/// about a legal term running out.
pub fn find_important_dates(text: &str) -> Vec<ImportantDate> {
    text.unicode_sentences()
        .filter_map(|sentence| {
            let date = DATE_RE.find(sentence)?;
            let lower = sentence.to_lowercase();
            Some(ImportantDate {
                date: date.as_str().to_string(),
                sentence: sentence.trim().to_string(),
                is_deadline: DEADLINE_TERMS.iter().any(|term| lower.contains(term)),
            })
        })
        .collect()
}
