// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers.
//!
//! The webhook handler answers 200 no matter what happens inside: the
//! provider retries on failure, and a retry storm only amplifies
//! duplicate deliveries the engine then has to absorb.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tidings_core::{Conversation, Instance, InstanceStatus, Message, TidingsError, now_unix};
use tidings_storage::queries::{conversations, instances, messages};
use tracing::{info, warn};

use crate::server::GatewayState;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn internal_error(e: impl std::fmt::Display) -> Response {
    warn!(error = %e, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
        .into_response()
}

fn not_found(what: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("{what} not found"),
        }),
    )
        .into_response()
}

fn unknown_instance(name: &str) -> Response {
    let e = TidingsError::UnknownInstance {
        name: name.to_string(),
    };
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn get_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: String,
}

/// Provider webhook ingress. Always 200.
pub async fn post_webhook(
    State(state): State<GatewayState>,
    Json(payload): Json<Value>,
) -> Json<WebhookResponse> {
    let outcome = tidings_ingest::handle_event(&state.ctx, payload).await;
    Json(WebhookResponse {
        status: format!("{outcome:?}").to_lowercase(),
    })
}

#[derive(Debug, Deserialize)]
pub struct CreateInstanceRequest {
    pub name: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InstanceResponse {
    #[serde(flatten)]
    pub instance: Instance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,
}

/// Create an instance and provision its remote session.
pub async fn post_instance(
    State(state): State<GatewayState>,
    Json(request): Json<CreateInstanceRequest>,
) -> Response {
    let now = now_unix();
    if let Ok(Some(_)) = instances::get_instance_by_name(&state.ctx.db, &request.name).await {
        return (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: format!("instance {} already exists", request.name),
            }),
        )
            .into_response();
    }

    let instance = Instance {
        id: uuid::Uuid::new_v4().to_string(),
        name: request.name.clone(),
        tenant_id: request.tenant_id,
        status: InstanceStatus::Connecting,
        qr_code: None,
        last_activity_at: None,
        last_webhook_at: None,
        last_webhook_event: None,
        last_error: None,
        created_at: now,
        updated_at: now,
    };
    if let Err(e) = instances::create_instance(&state.ctx.db, &instance).await {
        return internal_error(e);
    }

    // Provision the remote session. A missing QR is not a failure: the
    // gateway may deliver it shortly via webhook instead.
    let qr = match state.ctx.provider.connect_instance(&request.name).await {
        Ok(qr) => qr,
        Err(e) => {
            warn!(instance = %request.name, error = %e, "remote provisioning failed");
            if let Err(e) =
                instances::mark_error(&state.ctx.db, &instance.id, &e.to_string(), now).await
            {
                return internal_error(e);
            }
            None
        }
    };
    if let Some(qr) = &qr {
        if let Err(e) = instances::record_signal(
            &state.ctx.db,
            &instance.id,
            InstanceStatus::Connecting,
            Some(qr.clone()),
            "qr-issued",
            None,
            now,
        )
        .await
        {
            return internal_error(e);
        }
    }

    match instances::get_instance_by_name(&state.ctx.db, &request.name).await {
        Ok(Some(instance)) => {
            info!(instance = %instance.name, "instance created");
            (
                StatusCode::CREATED,
                Json(InstanceResponse { instance, qr_code: qr }),
            )
                .into_response()
        }
        Ok(None) => unknown_instance(&request.name),
        Err(e) => internal_error(e),
    }
}

pub async fn list_instances(State(state): State<GatewayState>) -> Response {
    match instances::list_instances(&state.ctx.db).await {
        Ok(list) => Json(list).into_response(),
        Err(e) => internal_error(e),
    }
}

pub async fn get_instance(
    State(state): State<GatewayState>,
    Path(name): Path<String>,
) -> Response {
    match instances::get_instance_by_name(&state.ctx.db, &name).await {
        Ok(Some(instance)) => Json(instance).into_response(),
        Ok(None) => unknown_instance(&name),
        Err(e) => internal_error(e),
    }
}

/// Explicit reconnect: the only path out of `error`.
pub async fn post_reconnect(
    State(state): State<GatewayState>,
    Path(name): Path<String>,
) -> Response {
    let instance = match instances::get_instance_by_name(&state.ctx.db, &name).await {
        Ok(Some(instance)) => instance,
        Ok(None) => return unknown_instance(&name),
        Err(e) => return internal_error(e),
    };

    // A session that is already live on the gateway only needs the local
    // record realigned; a fresh pairing would drop it.
    match state.ctx.provider.connection_state(&name).await {
        Ok(remote_state) if remote_state == "open" => {
            if let Err(e) = instances::record_signal(
                &state.ctx.db,
                &instance.id,
                InstanceStatus::Connected,
                None,
                "reconnect",
                None,
                now_unix(),
            )
            .await
            {
                return internal_error(e);
            }
            return match instances::get_instance_by_name(&state.ctx.db, &name).await {
                Ok(Some(instance)) => {
                    Json(InstanceResponse { instance, qr_code: None }).into_response()
                }
                Ok(None) => unknown_instance(&name),
                Err(e) => internal_error(e),
            };
        }
        Ok(_) => {}
        Err(e) => {
            warn!(instance = %name, error = %e, "state probe failed, reconnecting anyway");
        }
    }

    let qr = match state.ctx.provider.connect_instance(&name).await {
        Ok(qr) => qr,
        Err(e) => return internal_error(e),
    };
    if let Err(e) = instances::record_signal(
        &state.ctx.db,
        &instance.id,
        InstanceStatus::Connecting,
        qr.clone(),
        "reconnect",
        None,
        now_unix(),
    )
    .await
    {
        return internal_error(e);
    }

    match instances::get_instance_by_name(&state.ctx.db, &name).await {
        Ok(Some(instance)) => {
            Json(InstanceResponse { instance, qr_code: qr }).into_response()
        }
        Ok(None) => unknown_instance(&name),
        Err(e) => internal_error(e),
    }
}

/// Tenant-initiated disconnect: remote logout plus local delete.
pub async fn delete_instance(
    State(state): State<GatewayState>,
    Path(name): Path<String>,
) -> Response {
    match instances::get_instance_by_name(&state.ctx.db, &name).await {
        Ok(Some(_)) => {}
        Ok(None) => return unknown_instance(&name),
        Err(e) => return internal_error(e),
    }

    // Remote teardown is best-effort: the local record goes either way.
    if let Err(e) = state.ctx.provider.logout_instance(&name).await {
        warn!(instance = %name, error = %e, "remote logout failed");
    }
    match instances::delete_instance_by_name(&state.ctx.db, &name).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => internal_error(e),
    }
}

/// Fire-and-forget reconciliation trigger.
pub async fn post_sync_now(
    State(state): State<GatewayState>,
    Path(name): Path<String>,
) -> Response {
    let instance = match instances::get_instance_by_name(&state.ctx.db, &name).await {
        Ok(Some(instance)) => instance,
        Ok(None) => return unknown_instance(&name),
        Err(e) => return internal_error(e),
    };

    let sync = state.sync.clone();
    tokio::spawn(async move {
        sync.sync_instance(&instance).await;
    });
    StatusCode::ACCEPTED.into_response()
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<Conversation>,
}

/// List conversations for an instance, most recently active first.
///
/// A first request against an instance with zero local data triggers an
/// initial backfill before answering, so a fresh dashboard is not empty.
pub async fn list_conversations(
    State(state): State<GatewayState>,
    Path(name): Path<String>,
    Query(query): Query<ListQuery>,
) -> Response {
    let instance = match instances::get_instance_by_name(&state.ctx.db, &name).await {
        Ok(Some(instance)) => instance,
        Ok(None) => return unknown_instance(&name),
        Err(e) => return internal_error(e),
    };

    match conversations::count_for_instance(&state.ctx.db, &instance.id).await {
        Ok(0) => {
            state.sync.sync_instance(&instance).await;
        }
        Ok(_) => {}
        Err(e) => return internal_error(e),
    }

    match conversations::list_for_instance(&state.ctx.db, &instance.id, query.limit).await {
        Ok(conversations) => Json(ConversationListResponse { conversations }).into_response(),
        Err(e) => internal_error(e),
    }
}

#[derive(Debug, Serialize)]
pub struct MessageListResponse {
    pub messages: Vec<Message>,
}

/// List a conversation's messages in chronological order.
pub async fn list_messages(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Response {
    match conversations::get_conversation(&state.ctx.db, &id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found("conversation"),
        Err(e) => return internal_error(e),
    }
    match messages::list_for_conversation(&state.ctx.db, &id, query.limit).await {
        Ok(messages) => Json(MessageListResponse { messages }).into_response(),
        Err(e) => internal_error(e),
    }
}

pub async fn post_mark_read(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Response {
    match conversations::get_conversation(&state.ctx.db, &id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found("conversation"),
        Err(e) => return internal_error(e),
    }
    match conversations::mark_read(&state.ctx.db, &id, now_unix()).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => internal_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct PinRequest {
    pub pinned: bool,
}

pub async fn post_set_pinned(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(request): Json<PinRequest>,
) -> Response {
    match conversations::get_conversation(&state.ctx.db, &id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found("conversation"),
        Err(e) => return internal_error(e),
    }
    match conversations::set_pinned(&state.ctx.db, &id, request.pinned, now_unix()).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => internal_error(e),
    }
}
