//! Keyword-based spam scoring.
//!
//! An Aho-Corasick matcher over a weighted phrase list. Long legitimate
//! pages that happen to mention a spam phrase once should not be blocked,
//! so scores on texts past 5,000 characters are diluted proportionally.

use crate::telemetry;
use aho_corasick::AhoCorasick;
use std::time::Instant;
use tracing::info;

/// Length above which the score is rescaled by `5000 / length`.
const DILUTION_LENGTH: usize = 5000;

/// Built-in phrase table. Phrases without an explicit weight score 1;
/// the heavier entries are the unambiguous ones.
const DEFAULT_SPAM_PHRASES: &[(&str, u32)] = &[
    ("viagra", 3),
    ("cialis", 3),
    ("casino bonus", 3),
    ("online casino", 2),
    ("free spins", 2),
    ("payday loan", 2),
    ("make money fast", 3),
    ("work from home and earn", 2),
    ("get rich quick", 3),
    ("guaranteed income", 2),
    ("no credit check", 2),
    ("miracle cure", 2),
    ("weight loss pills", 2),
    ("male enhancement", 3),
    ("hot singles", 3),
    ("click here to claim", 2),
    ("limited time offer", 1),
    ("act now", 1),
    ("100% free", 1),
    ("risk free", 1),
    ("double your", 1),
    ("earn extra cash", 1),
    ("winner winner", 1),
    ("you have been selected", 2),
    ("claim your prize", 2),
    ("wire transfer", 1),
    ("crypto giveaway", 3),
    ("investment opportunity", 1),
    ("cheap meds", 2),
    ("replica watches", 2),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpamVerdict {
    pub score: u32,
    pub is_high_spam: bool,
}

pub struct SpamScorer {
    matcher: AhoCorasick,
    weights: Vec<u32>,
    block_threshold: u32,
}

impl SpamScorer {
    pub fn new(block_threshold: u32) -> Self {
        Self::with_phrases(DEFAULT_SPAM_PHRASES, block_threshold)
    }

    /// Build a scorer from lowercase phrases and per-phrase weights.
    pub fn with_phrases(phrases: &[(&str, u32)], block_threshold: u32) -> Self {
        let patterns: Vec<String> = phrases
            .iter()
            .map(|(phrase, _)| phrase.to_lowercase())
            .collect();
        let weights = phrases.iter().map(|&(_, weight)| weight).collect();

        info!(
            phrase_count = patterns.len(),
            block_threshold, "initializing spam scorer"
        );

        Self {
            // The phrase table is plain literals; construction cannot fail.
            matcher: AhoCorasick::new(&patterns).expect("spam phrase patterns"),
            weights,
            block_threshold,
        }
    }

    /// Score `text` and decide whether it crosses the block threshold.
    pub fn detect(&self, text: &str) -> SpamVerdict {
        if text.is_empty() {
            return SpamVerdict {
                score: 0,
                is_high_spam: false,
            };
        }

        let started = Instant::now();
        let lowered = text.to_lowercase();

        let mut matches = 0usize;
        let mut score: u64 = 0;
        for hit in self.matcher.find_iter(&lowered) {
            matches += 1;
            score += u64::from(self.weights[hit.pattern().as_usize()]);
        }

        // Dilute matches buried in long legitimate content. Integer
        // truncation can drive the score to zero; that is intended.
        let length = text.chars().count();
        if length > DILUTION_LENGTH && matches > 0 {
            score = score * DILUTION_LENGTH as u64 / length as u64;
        }

        metrics::histogram!(telemetry::SPAM_SCORE).record(score as f64);
        tracing::debug!(
            score,
            matches,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "spam detection result"
        );

        let score = score.min(u64::from(u32::MAX)) as u32;
        SpamVerdict {
            score,
            is_high_spam: score >= self.block_threshold,
        }
    }
}
