// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock collaborators shared by the workspace's test suites.
//!
//! These are deliberately simple: scripted return values plus call counters,
//! so tests can assert not just on results but on how many provider calls a
//! code path made.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tidings_core::{
    Classification, Conversation, EngineHook, Instance, Message, MessageClassifier, ObjectStore,
    ProviderClient, RemoteChat, TidingsError,
};

/// Scripted [`ProviderClient`] with per-method call counters.
#[derive(Default)]
pub struct MockProviderClient {
    /// Chats returned by `list_chats`, in order.
    pub chats: Mutex<Vec<RemoteChat>>,
    /// Raw message payloads returned by `list_messages`, keyed by remote jid.
    pub messages: Mutex<HashMap<String, Vec<Value>>>,
    /// QR credential returned by `connect_instance`.
    pub qr_code: Mutex<Option<String>>,
    /// State string returned by `connection_state`.
    pub state: Mutex<String>,
    /// Avatar URLs keyed by remote jid.
    pub avatars: Mutex<HashMap<String, String>>,
    /// Base64 (or data-URL) body returned by `download_media`.
    pub media_body: Mutex<Option<String>>,

    pub list_chats_calls: AtomicUsize,
    pub list_messages_calls: AtomicUsize,
    pub profile_picture_calls: AtomicUsize,
    pub download_media_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
}

impl MockProviderClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chats(self, chats: Vec<RemoteChat>) -> Self {
        *self.chats.lock().unwrap() = chats;
        self
    }

    pub fn with_messages(self, remote_jid: &str, messages: Vec<Value>) -> Self {
        self.messages
            .lock()
            .unwrap()
            .insert(remote_jid.to_string(), messages);
        self
    }

    pub fn with_media_body(self, body: &str) -> Self {
        *self.media_body.lock().unwrap() = Some(body.to_string());
        self
    }
}

#[async_trait]
impl ProviderClient for MockProviderClient {
    async fn connect_instance(&self, _instance: &str) -> Result<Option<String>, TidingsError> {
        Ok(self.qr_code.lock().unwrap().clone())
    }

    async fn connection_state(&self, _instance: &str) -> Result<String, TidingsError> {
        Ok(self.state.lock().unwrap().clone())
    }

    async fn logout_instance(&self, _instance: &str) -> Result<(), TidingsError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_chats(
        &self,
        _instance: &str,
        limit: u32,
    ) -> Result<Vec<RemoteChat>, TidingsError> {
        self.list_chats_calls.fetch_add(1, Ordering::SeqCst);
        let chats = self.chats.lock().unwrap();
        Ok(chats.iter().take(limit as usize).cloned().collect())
    }

    async fn list_messages(
        &self,
        _instance: &str,
        remote_jid: &str,
        limit: u32,
    ) -> Result<Vec<Value>, TidingsError> {
        self.list_messages_calls.fetch_add(1, Ordering::SeqCst);
        let messages = self.messages.lock().unwrap();
        Ok(messages
            .get(remote_jid)
            .map(|m| m.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn profile_picture_url(
        &self,
        _instance: &str,
        remote_jid: &str,
    ) -> Result<Option<String>, TidingsError> {
        self.profile_picture_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.avatars.lock().unwrap().get(remote_jid).cloned())
    }

    async fn download_media(
        &self,
        _instance: &str,
        _message: &Value,
    ) -> Result<String, TidingsError> {
        self.download_media_calls.fetch_add(1, Ordering::SeqCst);
        self.media_body
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| TidingsError::Provider {
                message: "no media scripted".to_string(),
                source: None,
            })
    }
}

/// In-memory [`ObjectStore`] with an optional scripted failure mode.
#[derive(Default)]
pub struct MemoryObjectStore {
    pub uploads: Mutex<Vec<(String, Vec<u8>, String)>>,
    pub fail: bool,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects every upload, for degraded-path tests.
    pub fn failing() -> Self {
        Self {
            uploads: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, TidingsError> {
        if self.fail {
            return Err(TidingsError::ObjectStore {
                message: "store unreachable".to_string(),
                source: None,
            });
        }
        self.uploads
            .lock()
            .unwrap()
            .push((path.to_string(), bytes, content_type.to_string()));
        Ok(format!("https://cdn.test/{path}"))
    }
}

/// Classifier that tags everything identically, for plumbing tests.
pub struct FixedClassifier;

impl MessageClassifier for FixedClassifier {
    fn classify(&self, _text: &str) -> Classification {
        Classification {
            intent: "other".to_string(),
            sentiment: "neutral".to_string(),
            keywords: Vec::new(),
        }
    }
}

/// Hook that records every invocation for later assertions.
#[derive(Default)]
pub struct RecordingHook {
    pub created: Mutex<Vec<(String, String)>>,
    pub connected: Mutex<Vec<String>>,
}

impl RecordingHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

#[async_trait]
impl EngineHook for RecordingHook {
    async fn on_message_created(&self, conversation: &Conversation, message: &Message) {
        self.created
            .lock()
            .unwrap()
            .push((conversation.id.clone(), message.external_id.clone()));
    }

    async fn on_instance_connected(&self, instance: &Instance) {
        self.connected.lock().unwrap().push(instance.name.clone());
    }
}
