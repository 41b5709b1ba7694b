// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Audio media retrieval pipeline.
//!
//! Fetches the binary payload through the provider, decodes it, and uploads
//! it to durable object storage under
//! `{namespace}/{instance}/audio/{external_id}.{ext}`.
//!
//! Every failure here is swallowed: the message is always created, with or
//! without a media URL.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;
use tidings_core::{ObjectStore, ProviderClient};
use tracing::warn;

/// Mime type to file extension. Unrecognized audio defaults to ogg, the
/// container the gateway uses for voice notes.
const EXTENSIONS: &[(&str, &str)] = &[
    ("audio/ogg", "ogg"),
    ("audio/mpeg", "mp3"),
    ("audio/mp3", "mp3"),
    ("audio/mp4", "m4a"),
    ("audio/aac", "aac"),
    ("audio/wav", "wav"),
    ("audio/x-wav", "wav"),
    ("audio/webm", "webm"),
    ("audio/amr", "amr"),
];

pub(crate) fn extension_for_mime(mime: &str) -> &'static str {
    let base = mime.split(';').next().unwrap_or(mime).trim();
    EXTENSIONS
        .iter()
        .find(|(m, _)| *m == base)
        .map(|(_, ext)| *ext)
        .unwrap_or("ogg")
}

/// Decode a media body that is either raw base64 or a data URL
/// (`data:audio/ogg;base64,....`).
pub(crate) fn decode_media_body(body: &str) -> Option<Vec<u8>> {
    let encoded = match body.strip_prefix("data:") {
        Some(rest) => rest.split_once("base64,").map(|(_, b)| b)?,
        None => body,
    };
    BASE64.decode(encoded.trim()).ok()
}

/// Mime type the payload reports for its audio sub-object.
pub(crate) fn audio_mime(item: &Value) -> Option<&str> {
    item.get("message")
        .and_then(|m| m.get("audioMessage"))
        .and_then(|a| a.get("mimetype"))
        .and_then(Value::as_str)
}

/// Fetch, decode, and upload an audio payload. Returns the durable URL,
/// or `None` on any failure.
pub async fn retrieve_audio(
    provider: &dyn ProviderClient,
    store: &dyn ObjectStore,
    namespace: &str,
    instance: &str,
    external_id: &str,
    item: &Value,
) -> Option<String> {
    let body = match provider.download_media(instance, item).await {
        Ok(body) => body,
        Err(e) => {
            warn!(instance, external_id, error = %e, "audio download failed");
            return None;
        }
    };

    let Some(bytes) = decode_media_body(&body) else {
        warn!(instance, external_id, "audio payload is not valid base64");
        return None;
    };

    let mime = audio_mime(item).unwrap_or("audio/ogg");
    let ext = extension_for_mime(mime);
    let path = format!("{namespace}/{instance}/audio/{external_id}.{ext}");

    match store.upload(&path, bytes, mime).await {
        Ok(url) => Some(url),
        Err(e) => {
            warn!(instance, external_id, error = %e, "audio upload failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tidings_test_utils::{MemoryObjectStore, MockProviderClient};

    fn audio_item() -> Value {
        json!({
            "key": {"remoteJid": "555@s.whatsapp.net", "id": "MSG-AUDIO"},
            "message": {"audioMessage": {"mimetype": "audio/ogg; codecs=opus", "seconds": 7}}
        })
    }

    #[test]
    fn extension_table_defaults_to_ogg() {
        assert_eq!(extension_for_mime("audio/mpeg"), "mp3");
        assert_eq!(extension_for_mime("audio/ogg; codecs=opus"), "ogg");
        assert_eq!(extension_for_mime("audio/x-unheard-of"), "ogg");
    }

    #[test]
    fn decodes_raw_base64_and_data_urls() {
        let raw = BASE64.encode(b"voice");
        assert_eq!(decode_media_body(&raw).unwrap(), b"voice");

        let data_url = format!("data:audio/ogg;base64,{raw}");
        assert_eq!(decode_media_body(&data_url).unwrap(), b"voice");

        assert!(decode_media_body("data:audio/ogg;notbase64").is_none());
        assert!(decode_media_body("!!!").is_none());
    }

    #[tokio::test]
    async fn uploads_under_namespaced_path() {
        let provider = MockProviderClient::new().with_media_body(&BASE64.encode(b"voice"));
        let store = MemoryObjectStore::new();

        let url = retrieve_audio(&provider, &store, "tidings", "crm", "MSG-AUDIO", &audio_item())
            .await
            .unwrap();
        assert_eq!(url, "https://cdn.test/tidings/crm/audio/MSG-AUDIO.ogg");

        let uploads = store.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].0, "tidings/crm/audio/MSG-AUDIO.ogg");
        assert_eq!(uploads[0].2, "audio/ogg; codecs=opus");
    }

    #[tokio::test]
    async fn failures_yield_none_not_errors() {
        // Download failure.
        let provider = MockProviderClient::new();
        let store = MemoryObjectStore::new();
        assert!(
            retrieve_audio(&provider, &store, "t", "crm", "M", &audio_item())
                .await
                .is_none()
        );

        // Upload failure.
        let provider = MockProviderClient::new().with_media_body(&BASE64.encode(b"voice"));
        let store = MemoryObjectStore::failing();
        assert!(
            retrieve_audio(&provider, &store, "t", "crm", "M", &audio_item())
                .await
                .is_none()
        );
        assert_eq!(store.upload_count(), 0);
    }
}
