// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ad-click attribution extraction from raw message payloads.
//!
//! The gateway buries attribution metadata (Meta click-to-WhatsApp ads) at
//! unpredictable depths, usually inside `contextInfo.externalAdReply` but
//! not reliably so. The extractor walks the whole object graph iteratively
//! and captures the first non-empty value per field, so traversal order
//! never changes the result.

use std::collections::HashSet;

use serde_json::Value;
use tidings_core::AttributionFacts;

/// Keys are matched after lowercasing and stripping `_`/`-`, so
/// `ctwaClid`, `ctwa_clid`, and `CTWA-CLID` all hit the same field.
fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Extract attribution facts from a raw message payload.
///
/// Iterative work-stack traversal with a visited set, so depth is bounded
/// and re-reachable nodes are inspected once.
pub fn extract(payload: &Value) -> AttributionFacts {
    let mut facts = AttributionFacts::default();
    let mut stack: Vec<&Value> = vec![payload];
    let mut visited: HashSet<*const Value> = HashSet::new();

    while let Some(node) = stack.pop() {
        if !visited.insert(node as *const Value) {
            continue;
        }
        match node {
            Value::Object(map) => {
                for (key, value) in map {
                    capture(&mut facts, &normalize_key(key), value);
                    if value.is_object() || value.is_array() {
                        stack.push(value);
                    }
                }
            }
            Value::Array(items) => {
                for item in items {
                    if item.is_object() || item.is_array() {
                        stack.push(item);
                    }
                }
            }
            _ => {}
        }
    }
    facts
}

fn capture(facts: &mut AttributionFacts, key: &str, value: &Value) {
    match key {
        "ctwaclid" | "adclickid" => {
            if facts.ad_click_id.is_none() {
                if let Some(s) = non_empty_str(value) {
                    facts.ad_click_id = Some(s.to_string());
                }
            }
        }
        "showadattribution" => {
            if facts.show_attribution.is_none() {
                if let Some(b) = value.as_bool() {
                    facts.show_attribution = Some(b);
                }
            }
        }
        "sourcetype" => {
            if facts.source_type.is_none() {
                if let Some(s) = non_empty_str(value) {
                    facts.source_type = Some(s.to_string());
                }
            }
        }
        "sourceid" => {
            if facts.source_id.is_none() {
                if let Some(s) = non_empty_str(value) {
                    facts.source_id = Some(s.to_string());
                }
            }
        }
        _ => {}
    }
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_payload_yields_empty_facts() {
        assert!(extract(&json!({})).is_empty());
        assert!(extract(&json!({"message": {"conversation": "hi"}})).is_empty());
    }

    #[test]
    fn captures_from_external_ad_reply() {
        let payload = json!({
            "message": {
                "extendedTextMessage": {
                    "text": "I saw your ad",
                    "contextInfo": {
                        "externalAdReply": {
                            "ctwaClid": "abc123",
                            "showAdAttribution": true,
                            "sourceType": "ad",
                            "sourceId": "120212345"
                        }
                    }
                }
            }
        });
        let facts = extract(&payload);
        assert_eq!(facts.ad_click_id.as_deref(), Some("abc123"));
        assert_eq!(facts.show_attribution, Some(true));
        assert_eq!(facts.source_type.as_deref(), Some("ad"));
        assert_eq!(facts.source_id.as_deref(), Some("120212345"));
        assert!(facts.is_meta_ads());
    }

    #[test]
    fn deeply_nested_click_id_is_found() {
        let payload = json!({
            "unrelated": {"a": [1, 2, 3]},
            "level1": {
                "level2": {
                    "level3": {"ctwa_clid": "abc123"}
                }
            }
        });
        let facts = extract(&payload);
        assert_eq!(facts.ad_click_id.as_deref(), Some("abc123"));
        assert!(facts.is_meta_ads());
    }

    #[test]
    fn key_case_variants_normalize() {
        let facts = extract(&json!({"CTWA-CLID": "x"}));
        assert_eq!(facts.ad_click_id.as_deref(), Some("x"));
        let facts = extract(&json!({"show_ad_attribution": false}));
        assert_eq!(facts.show_attribution, Some(false));
        assert!(!facts.is_meta_ads());
    }

    #[test]
    fn empty_strings_do_not_capture() {
        let payload = json!({"ctwaClid": "", "inner": {"ctwaClid": "real"}});
        let facts = extract(&payload);
        assert_eq!(facts.ad_click_id.as_deref(), Some("real"));
    }

    #[test]
    fn repeated_subtrees_do_not_loop() {
        // serde_json values cannot form true cycles; a shared subtree
        // appearing under many keys is the practical equivalent. The
        // visited set bounds the walk either way.
        let shared = json!({"sourceType": "post"});
        let mut wide = serde_json::Map::new();
        for i in 0..200 {
            wide.insert(format!("k{i}"), shared.clone());
        }
        wide.insert("deep".to_string(), json!({"ctwaClid": "abc123"}));
        let facts = extract(&Value::Object(wide));
        assert_eq!(facts.ad_click_id.as_deref(), Some("abc123"));
        assert_eq!(facts.source_type.as_deref(), Some("post"));
        assert!(facts.is_meta_ads());
    }
}
