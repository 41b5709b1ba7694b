// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Remote address normalization and filtering.
//!
//! Only individual one-to-one chat addresses are accepted. Group and
//! broadcast threads are rejected here, under both the webhook and the
//! reconciliation paths, so nothing downstream ever sees them.

const INDIVIDUAL_SUFFIX: &str = "@s.whatsapp.net";

/// Normalize a raw remote address to its canonical individual-chat form.
///
/// Strips the per-device suffix (`5511999:12@...` becomes `5511999@...`)
/// and returns `None` for groups (`@g.us`), broadcast addresses, channels,
/// and anything else that is not an individual chat.
pub fn normalize_remote_jid(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let (user, domain) = raw.split_once('@')?;
    if domain != INDIVIDUAL_SUFFIX.trim_start_matches('@') {
        return None;
    }

    // Device-qualified addresses carry a `:device` suffix on the user part.
    let user = user.split(':').next().unwrap_or(user);
    if user.is_empty() {
        return None;
    }

    Some(format!("{user}@{domain}"))
}
