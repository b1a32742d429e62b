//! Language gate for the processing pipeline.
//!
//! Wraps a `lingua` detector. The index is English-only, but pages whose
//! text still shows meaningful English confidence are let through with
//! their detected code so borderline bilingual content is not thrown away.

use crate::telemetry;
use lingua::{Language, LanguageDetectorBuilder};
use std::time::Instant;
use thiserror::Error;
use tracing::debug;

const MIN_TEXT_LENGTH: usize = 20;
const ENGLISH_CONFIDENCE_FLOOR: f64 = 0.33;

#[derive(Debug, Error, PartialEq)]
pub enum LanguageError {
    #[error("language detection failed")]
    DetectionFailed,
    #[error("not an english page, skipping")]
    NotEnglish { code: String },
}

pub struct LanguageDetector {
    detector: lingua::LanguageDetector,
}

impl LanguageDetector {
    /// Build a detector covering every supported language with preloaded
    /// models. Expensive; construct once at startup and share.
    pub fn new() -> Self {
        Self::with_detector(
            LanguageDetectorBuilder::from_all_languages()
                .with_preloaded_language_models()
                .build(),
        )
    }

    /// Wrap an existing detector. Tests use this with a reduced language set
    /// to keep model loading cheap.
    pub fn with_detector(detector: lingua::LanguageDetector) -> Self {
        Self { detector }
    }

    /// Classify `text`, returning its ISO 639-1 code.
    ///
    /// Texts shorter than 20 bytes are "unknown" without running the models.
    /// Non-English text is an error unless the English confidence clears the
    /// floor, in which case the detected code is returned normally.
    pub fn detect(&self, text: &str) -> Result<String, LanguageError> {
        if text.len() < MIN_TEXT_LENGTH {
            return Ok("unknown".to_string());
        }

        let started = Instant::now();
        let detected = self.detector.detect_language_of(text);
        metrics::histogram!(telemetry::LANGUAGE_DETECTION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        let Some(language) = detected else {
            metrics::counter!(telemetry::LANGUAGE_DETECTION_FAILURES).increment(1);
            return Err(LanguageError::DetectionFailed);
        };

        if language == Language::English {
            return Ok("en".to_string());
        }

        let english_confidence = self
            .detector
            .compute_language_confidence(text, Language::English);
        let code = language.iso_code_639_1().to_string();

        debug!(
            detected = %language,
            english_confidence,
            "language detection result"
        );

        if english_confidence > ENGLISH_CONFIDENCE_FLOOR {
            Ok(code)
        } else {
            Err(LanguageError::NotEnglish { code })
        }
    }
}

impl Default for LanguageDetector {
    fn default() -> Self {
        Self::new()
    }
}
