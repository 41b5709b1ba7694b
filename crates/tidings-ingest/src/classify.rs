// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in keyword classifier.
//!
//! Deterministic by construction: fixed keyword tables, first matching
//! intent wins, sentiment by counting polarity words. Richer NLU backends
//! replace this behind the `MessageClassifier` trait.

use tidings_core::{Classification, MessageClassifier};

const PURCHASE_WORDS: &[&str] = &[
    "price", "pricing", "cost", "how much", "buy", "order", "purchase", "quote", "plan",
];
const COMPLAINT_WORDS: &[&str] = &[
    "complaint", "refund", "broken", "not working", "problem", "cancel", "disappointed",
];
const GREETING_WORDS: &[&str] = &["hello", "hi ", "hey", "good morning", "good afternoon"];
const QUESTION_WORDS: &[&str] = &["how ", "what ", "when ", "where ", "why ", "can you", "do you"];

const POSITIVE_WORDS: &[&str] = &["thanks", "thank you", "great", "love", "perfect", "awesome"];
const NEGATIVE_WORDS: &[&str] = &[
    "bad", "terrible", "awful", "broken", "refund", "disappointed", "worst", "not working",
];

/// Keyword-table classifier shipped with the engine.
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_in<'a>(text: &str, table: &[&'a str]) -> Vec<&'a str> {
    table.iter().copied().filter(|w| text.contains(w)).collect()
}

impl MessageClassifier for KeywordClassifier {
    fn classify(&self, text: &str) -> Classification {
        let lowered = text.to_lowercase();
        // Pad so suffix-sensitive entries like "hi " match at end of text.
        let padded = format!("{lowered} ");

        let purchase = matches_in(&padded, PURCHASE_WORDS);
        let complaint = matches_in(&padded, COMPLAINT_WORDS);
        let greeting = matches_in(&padded, GREETING_WORDS);

        let intent = if !purchase.is_empty() {
            "purchase_intent"
        } else if !complaint.is_empty() {
            "complaint"
        } else if padded.contains('?') || !matches_in(&padded, QUESTION_WORDS).is_empty() {
            "question"
        } else if !greeting.is_empty() {
            "greeting"
        } else {
            "other"
        };

        let positive = matches_in(&padded, POSITIVE_WORDS).len();
        let negative = matches_in(&padded, NEGATIVE_WORDS).len();
        let sentiment = if positive > negative {
            "positive"
        } else if negative > positive {
            "negative"
        } else {
            "neutral"
        };

        let mut keywords: Vec<String> = purchase
            .into_iter()
            .chain(complaint)
            .chain(greeting)
            .map(|w| w.trim().to_string())
            .collect();
        keywords.dedup();

        Classification {
            intent: intent.to_string(),
            sentiment: sentiment.to_string(),
            keywords,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purchase_intent_wins_over_question() {
        let c = KeywordClassifier.classify("How much does the premium plan cost?");
        assert_eq!(c.intent, "purchase_intent");
        assert!(c.keywords.contains(&"how much".to_string()));
    }

    #[test]
    fn complaints_read_negative() {
        let c = KeywordClassifier.classify("This is broken, I want a refund");
        assert_eq!(c.intent, "complaint");
        assert_eq!(c.sentiment, "negative");
    }

    #[test]
    fn greetings_and_thanks() {
        let c = KeywordClassifier.classify("Hi");
        assert_eq!(c.intent, "greeting");
        let c = KeywordClassifier.classify("thanks, great service");
        assert_eq!(c.sentiment, "positive");
    }

    #[test]
    fn question_mark_implies_question() {
        let c = KeywordClassifier.classify("Is the store open today?");
        assert_eq!(c.intent, "question");
    }

    #[test]
    fn classification_is_deterministic() {
        let a = KeywordClassifier.classify("How much for the blue one?");
        let b = KeywordClassifier.classify("How much for the blue one?");
        assert_eq!(a, b);
    }
}
