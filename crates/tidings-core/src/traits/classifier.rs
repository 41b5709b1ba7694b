// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pluggable message classification capability.

use crate::types::Classification;

/// Classifies message text into intent, sentiment, and keyword tags.
///
/// Implementations must be deterministic: the same text always yields the
/// same classification. The engine ships a keyword-based implementation;
/// richer NLU backends plug in behind this trait.
pub trait MessageClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Classification;
}
