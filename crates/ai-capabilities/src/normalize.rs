//! Canonical result types and the raw host shapes they are normalised from.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CapabilityError, Result};

/// Most likely language of a text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedLanguage {
    /// Lower-cased BCP 47 tag.
    pub language: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_language: Option<String>,
    pub target_language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_source_language: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSummary {
    Text(String),
    Object { text: String },
}

#[derive(Debug, Deserialize)]
struct RawCandidate {
    #[serde(alias = "detectedLanguage")]
    language: String,
    #[serde(default)]
    confidence: f64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDetection {
    Ranked {
        languages: Vec<RawCandidate>,
    },
    Single {
        #[serde(rename = "detectedLanguage", alias = "detected_language")]
        detected_language: String,
        #[serde(default)]
        confidence: f64,
    },
    List(Vec<RawCandidate>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTranslation {
    Text(String),
    Object {
        #[serde(default)]
        text: Option<String>,
        #[serde(default, rename = "translatedText", alias = "translated_text")]
        translated_text: Option<String>,
        #[serde(
            default,
            rename = "detectedSourceLanguage",
            alias = "detected_source_language"
        )]
        detected_source_language: Option<String>,
    },
}

fn unrecognized(kind: &'static str, raw: &Value) -> CapabilityError {
    CapabilityError::UnrecognizedShape {
        kind,
        raw: raw.to_string(),
    }
}

pub fn normalize_summary(raw: Value) -> Result<String> {
    match serde_json::from_value::<RawSummary>(raw.clone()) {
        Ok(RawSummary::Text(text)) | Ok(RawSummary::Object { text }) => Ok(text),
        Err(_) => Err(unrecognized("summary", &raw)),
    }
}

/// Picks the highest-confidence candidate and lower-cases its tag.
pub fn normalize_detection(raw: Value) -> Result<DetectedLanguage> {
    let candidates = match serde_json::from_value::<RawDetection>(raw.clone()) {
        Ok(RawDetection::Ranked { languages }) | Ok(RawDetection::List(languages)) => languages,
        Ok(RawDetection::Single {
            detected_language,
            confidence,
        }) => vec![RawCandidate {
            language: detected_language,
            confidence,
        }],
        Err(_) => return Err(unrecognized("language detection", &raw)),
    };

    candidates
        .into_iter()
        .filter(|candidate| !candidate.language.trim().is_empty())
        .fold(None::<RawCandidate>, |best, candidate| match best {
            Some(best) if best.confidence >= candidate.confidence => Some(best),
            _ => Some(candidate),
        })
        .map(|best| DetectedLanguage {
            language: best.language.trim().to_lowercase(),
            confidence: best.confidence,
        })
        .ok_or_else(|| unrecognized("language detection", &raw))
}

pub fn normalize_translation(
    raw: Value,
    source_language: Option<String>,
    target_language: String,
) -> Result<Translation> {
    let (text, detected_source_language) =
        match serde_json::from_value::<RawTranslation>(raw.clone()) {
            Ok(RawTranslation::Text(text)) => (text, None),
            Ok(RawTranslation::Object {
                text,
                translated_text,
                detected_source_language,
            }) => match translated_text.or(text) {
                Some(text) => (text, detected_source_language),
                None => return Err(unrecognized("translation", &raw)),
            },
            Err(_) => return Err(unrecognized("translation", &raw)),
        };

    Ok(Translation {
        text,
        source_language,
        target_language,
        detected_source_language: detected_source_language.map(|tag| tag.to_lowercase()),
    })
}
