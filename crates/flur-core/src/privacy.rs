//! PII redaction for text extracted from council documents.
//!
//! Two passes over the input: deterministic patterns for e-mail addresses,
//! German phone numbers and street addresses, then person names from the
//! NER backend. Names of public office holders acting in their role are
//! kept. Every accepted span is replaced by a `[TYPE]` tag.
//!
//! The engine is fail-closed: a recognizer error is returned to the caller,
//! which must discard the text instead of storing it.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::AppError;
use crate::traits::{EntityRecognizer, RecognizedEntity};

/// Public roles whose holders are named in an official capacity.
const ROLE_WHITELIST: &[&str] = &[
    "Bürgermeister",
    "Oberbürgermeister",
    "Ortsbürgermeister",
    "Gemeinderat",
    "Stadtrat",
    "Ausschuss",
    "Kreistag",
    "Verbandsgemeinde",
    "Stadt",
    "Gemeinde",
    "Kreis",
    "Landrat",
    "Beigeordneter",
    "Dezernent",
    "Ratsherr",
    "Ratsfrau",
    "Schriftführer",
    "Schriftführerin",
    "Protokollant",
    "Protokollantin",
    "Kämmerer",
    "Kämmerin",
    "Bauamtsleiter",
    "Bauamtsleiterin",
    "Vorsitzender",
    "Vorsitzende",
    "Fraktionsvorsitzender",
    "Fachbereichsleiter",
    "Fachbereichsleiterin",
    "Bauverwaltung",
    "Architekt",
    "Planer",
    "Ingenieur",
];

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Z|a-z]{2,}\b").expect("valid regex")
});

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\+49|0)[1-9][0-9 \-/()]{5,}\d").expect("valid regex"));

static ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\b[A-ZÄÖÜ][a-zäöüß]+(?:straße|weg|gasse|platz|allee|ring|damm|ufer|chaussee)",
        r"\s+\d+[a-zA-Z]?",
        r"(?:\s*,\s*\d{5}\s+[A-ZÄÖÜ][a-zäöüß]+)?",
    ))
    .expect("valid regex")
});

static REDACTION_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[(?:PER|EMAIL|PHONE|ADDRESS)\]$").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum EntityType {
    #[serde(rename = "PER")]
    Person,
    #[serde(rename = "EMAIL")]
    Email,
    #[serde(rename = "PHONE")]
    Phone,
    #[serde(rename = "ADDRESS")]
    Address,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "PER",
            EntityType::Email => "EMAIL",
            EntityType::Phone => "PHONE",
            EntityType::Address => "ADDRESS",
        }
    }

    fn tag(&self) -> String {
        format!("[{}]", self.as_str())
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A span that was replaced. Offsets are character offsets into the input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RedactedEntity {
    pub entity_type: EntityType,
    pub start_char: usize,
    pub end_char: usize,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RedactionResult {
    pub sanitized_text: String,
    pub redaction_count: usize,
    /// Sorted by `start_char`, ascending.
    pub redacted_entities: Vec<RedactedEntity>,
}

impl RedactionResult {
    fn empty() -> Self {
        Self {
            sanitized_text: String::new(),
            redaction_count: 0,
            redacted_entities: Vec::new(),
        }
    }
}

/// Accepted span in byte offsets, converted to characters on output.
#[derive(Debug, Clone, Copy)]
struct Span {
    entity_type: EntityType,
    start: usize,
    end: usize,
    confidence: f64,
}

impl Span {
    fn overlaps(&self, start: usize, end: usize) -> bool {
        self.start < end && self.end > start
    }
}

#[derive(Clone)]
pub struct PrivacyEngine<R> {
    recognizer: R,
}

impl<R: EntityRecognizer> PrivacyEngine<R> {
    /// `recognizer` must already be verified as usable.
    pub fn new(recognizer: R) -> Self {
        Self { recognizer }
    }

    /// Redact persons, e-mail addresses, phone numbers and street addresses.
    pub async fn clean_text(&self, text: &str) -> Result<RedactionResult, AppError> {
        if text.is_empty() {
            return Ok(RedactionResult::empty());
        }

        let mut spans = pattern_spans(text);

        let recognized = self.recognizer.recognize(text).await.map_err(|e| match e {
            AppError::PrivacyError(_) => e,
            other => AppError::PrivacyError(format!("entity recognition failed: {other}")),
        })?;

        let offsets = CharOffsets::new(text);
        for entity in recognized.iter().filter(|e| e.label == "PER") {
            let (Some(start), Some(end)) = (
                offsets.to_byte(entity.start_char),
                offsets.to_byte(entity.end_char),
            ) else {
                tracing::warn!(
                    start = entity.start_char,
                    end = entity.end_char,
                    "Entity offsets outside of text"
                );
                continue;
            };
            if start >= end {
                continue;
            }

            let surface = &text[start..end];
            if REDACTION_TAG_RE.is_match(surface.trim()) || contains_role(surface) {
                continue;
            }
            if preceding_token(&text[..start]).is_some_and(contains_role) {
                continue;
            }
            if spans.iter().any(|s| s.overlaps(start, end)) {
                continue;
            }

            spans.push(Span {
                entity_type: EntityType::Person,
                start,
                end,
                confidence: person_confidence(entity),
            });
        }

        // Apply from the back so earlier offsets stay valid.
        spans.sort_by(|a, b| b.start.cmp(&a.start));
        let mut sanitized = text.to_string();
        for span in &spans {
            sanitized.replace_range(span.start..span.end, &span.entity_type.tag());
        }

        let mut redacted_entities: Vec<RedactedEntity> = spans
            .iter()
            .map(|s| RedactedEntity {
                entity_type: s.entity_type,
                start_char: offsets.to_char(s.start),
                end_char: offsets.to_char(s.end),
                confidence: s.confidence,
            })
            .collect();
        redacted_entities.sort_by_key(|e| e.start_char);

        Ok(RedactionResult {
            sanitized_text: sanitized,
            redaction_count: redacted_entities.len(),
            redacted_entities,
        })
    }
}

fn pattern_spans(text: &str) -> Vec<Span> {
    let mut spans: Vec<Span> = Vec::new();
    for (entity_type, re) in [
        (EntityType::Email, &*EMAIL_RE),
        (EntityType::Phone, &*PHONE_RE),
        (EntityType::Address, &*ADDRESS_RE),
    ] {
        for m in re.find_iter(text) {
            if spans.iter().any(|s| s.overlaps(m.start(), m.end())) {
                continue;
            }
            spans.push(Span {
                entity_type,
                start: m.start(),
                end: m.end(),
                confidence: 1.0,
            });
        }
    }
    spans
}

fn contains_role(s: &str) -> bool {
    let lower = s.to_lowercase();
    ROLE_WHITELIST
        .iter()
        .any(|role| lower.contains(&role.to_lowercase()))
}

/// The word right before an entity, without surrounding punctuation.
fn preceding_token(before: &str) -> Option<&str> {
    let word = before.split_whitespace().next_back()?;
    let word = word.trim_matches(|c: char| !c.is_alphanumeric());
    (!word.is_empty()).then_some(word)
}

/// Confidence from the token-level signal: the model score when present,
/// otherwise 0.85 for tokens inside an entity and 0.5 for the rest.
fn person_confidence(entity: &RecognizedEntity) -> f64 {
    let best = entity
        .tokens
        .iter()
        .map(|t| match t.score {
            Some(score) => score.clamp(0.0, 1.0),
            None if t.iob != "O" => 0.85,
            None => 0.5,
        })
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
        .unwrap_or(0.85);
    (best * 100.0).round() / 100.0
}

/// Character ↔ byte offset mapping for one input string.
struct CharOffsets {
    /// Byte offset of every char boundary, including the end of the string.
    boundaries: Vec<usize>,
}

impl CharOffsets {
    fn new(text: &str) -> Self {
        let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        boundaries.push(text.len());
        Self { boundaries }
    }

    fn to_byte(&self, char_idx: usize) -> Option<usize> {
        self.boundaries.get(char_idx).copied()
    }

    fn to_char(&self, byte_idx: usize) -> usize {
        self.boundaries
            .binary_search(&byte_idx)
            .unwrap_or_else(|insert_at| insert_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FailingRecognizer, StaticRecognizer, person_at};

    fn engine(recognizer: StaticRecognizer) -> PrivacyEngine<StaticRecognizer> {
        PrivacyEngine::new(recognizer)
    }

    #[tokio::test]
    async fn redacts_person_after_salutation() {
        let text = "Herr Max Mustermann hat den Antrag gestellt.";
        let recognizer = StaticRecognizer::new(vec![person_at(text, "Max Mustermann")]);

        let result = engine(recognizer).clean_text(text).await.unwrap();

        assert_eq!(result.sanitized_text, "Herr [PER] hat den Antrag gestellt.");
        assert_eq!(result.redaction_count, 1);
        let entity = &result.redacted_entities[0];
        assert_eq!(entity.entity_type, EntityType::Person);
        assert_eq!((entity.start_char, entity.end_char), (5, 19));
        assert_eq!(entity.confidence, 0.85);
    }

    #[tokio::test]
    async fn keeps_names_in_public_role_context() {
        let text = "Bürgermeister Müller eröffnete die Sitzung.";
        let recognizer = StaticRecognizer::new(vec![person_at(text, "Müller")]);

        let result = engine(recognizer).clean_text(text).await.unwrap();

        assert_eq!(result.sanitized_text, text);
        assert_eq!(result.redaction_count, 0);
    }

    #[tokio::test]
    async fn keeps_entities_containing_a_role() {
        let text = "Protokoll: Ratsfrau Schmidt, Herr Weber.";
        let recognizer = StaticRecognizer::new(vec![
            person_at(text, "Ratsfrau Schmidt"),
            person_at(text, "Weber"),
        ]);

        let result = engine(recognizer).clean_text(text).await.unwrap();

        assert_eq!(result.sanitized_text, "Protokoll: Ratsfrau Schmidt, Herr [PER].");
        assert_eq!(result.redaction_count, 1);
    }

    #[tokio::test]
    async fn redacts_phone_and_email_with_full_confidence() {
        let text = "Kontaktieren Sie uns unter 089/1234567 oder per Mail an info@stadt.de.";

        let result = engine(StaticRecognizer::empty())
            .clean_text(text)
            .await
            .unwrap();

        assert_eq!(
            result.sanitized_text,
            "Kontaktieren Sie uns unter [PHONE] oder per Mail an [EMAIL]."
        );
        assert_eq!(result.redaction_count, 2);
        assert_eq!(result.redacted_entities[0].entity_type, EntityType::Phone);
        assert_eq!(result.redacted_entities[1].entity_type, EntityType::Email);
        assert!(result.redacted_entities.iter().all(|e| e.confidence == 1.0));
    }

    #[tokio::test]
    async fn redacts_street_address() {
        let text = "Die Anlage liegt an der Hauptstraße 12a, 55116 Mainz im Außenbereich.";

        let result = engine(StaticRecognizer::empty())
            .clean_text(text)
            .await
            .unwrap();

        assert_eq!(
            result.sanitized_text,
            "Die Anlage liegt an der [ADDRESS] im Außenbereich."
        );
    }

    #[tokio::test]
    async fn person_overlapping_a_pattern_match_is_dropped() {
        let text = "Schreiben an max.mustermann@example.org heute.";
        let recognizer = StaticRecognizer::new(vec![person_at(text, "max.mustermann")]);

        let result = engine(recognizer).clean_text(text).await.unwrap();

        assert_eq!(result.sanitized_text, "Schreiben an [EMAIL] heute.");
        assert_eq!(result.redaction_count, 1);
    }

    #[tokio::test]
    async fn character_offsets_survive_multibyte_text() {
        let text = "Über Straßenbau sprach Frau Jürgens am Dienstag.";
        let recognizer = StaticRecognizer::new(vec![person_at(text, "Jürgens")]);

        let result = engine(recognizer).clean_text(text).await.unwrap();

        assert_eq!(
            result.sanitized_text,
            "Über Straßenbau sprach Frau [PER] am Dienstag."
        );
        let entity = &result.redacted_entities[0];
        let redacted: String = text
            .chars()
            .skip(entity.start_char)
            .take(entity.end_char - entity.start_char)
            .collect();
        assert_eq!(redacted, "Jürgens");
    }

    #[tokio::test]
    async fn sanitized_text_is_stable() {
        let text = "Herr Max Mustermann (max@example.org, 0611 123456) wohnt Lindenweg 3.";
        let recognizer = StaticRecognizer::new(vec![person_at(text, "Max Mustermann")]);
        let first = engine(recognizer).clean_text(text).await.unwrap();
        assert_eq!(first.redaction_count, 4);

        // A model that tags the placeholder itself must not count again.
        let again = StaticRecognizer::new(vec![person_at(&first.sanitized_text, "[PER]")]);
        let second = engine(again).clean_text(&first.sanitized_text).await.unwrap();

        assert_eq!(second.redaction_count, 0);
        assert_eq!(second.sanitized_text, first.sanitized_text);
    }

    #[tokio::test]
    async fn empty_input_skips_the_model() {
        let recognizer = FailingRecognizer;
        let result = PrivacyEngine::new(recognizer).clean_text("").await.unwrap();

        assert_eq!(result.sanitized_text, "");
        assert_eq!(result.redaction_count, 0);
    }

    #[tokio::test]
    async fn recognizer_failure_is_a_privacy_error() {
        let err = PrivacyEngine::new(FailingRecognizer)
            .clean_text("Herr Max Mustermann")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::PrivacyError(_)));
        assert!(err.is_fail_closed());
    }

    #[tokio::test]
    async fn non_person_labels_are_ignored() {
        let text = "Sitzung in Mainz.";
        let mut loc = person_at(text, "Mainz");
        loc.label = "LOC".into();

        let result = engine(StaticRecognizer::new(vec![loc]))
            .clean_text(text)
            .await
            .unwrap();

        assert_eq!(result.redaction_count, 0);
    }

    #[test]
    fn confidence_prefers_model_scores() {
        let mut entity = person_at("Max", "Max");
        entity.tokens[0].score = Some(0.973);
        assert_eq!(person_confidence(&entity), 0.97);

        entity.tokens[0].score = None;
        entity.tokens[0].iob = "O".into();
        assert_eq!(person_confidence(&entity), 0.5);
    }

    #[test]
    fn preceding_token_strips_punctuation() {
        assert_eq!(preceding_token("Es sprach (Bürgermeister "), Some("Bürgermeister"));
        assert_eq!(preceding_token("   "), None);
        assert_eq!(preceding_token(""), None);
    }
}
