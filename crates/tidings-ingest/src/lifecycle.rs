// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Instance connection state machine.
//!
//! Transitions: `connecting -> connected`, `connecting -> disconnected`,
//! `connected -> disconnected`, any `-> error`. Nothing leaves `error`
//! without an explicit reconnect request; signals arriving while an
//! instance sits in `error` are logged but change nothing.
//!
//! This module is the only writer of `instances.status`.

use tidings_core::{ConnectionSignal, Instance, InstanceStatus, TidingsError};
use tidings_storage::Database;
use tidings_storage::queries::instances;
use tracing::{debug, info};

fn event_label(signal: &ConnectionSignal) -> &'static str {
    match signal {
        ConnectionSignal::QrIssued(_) => "qr-issued",
        ConnectionSignal::Opened => "opened",
        ConnectionSignal::Closed => "closed",
        ConnectionSignal::Refused => "refused",
    }
}

/// Apply one connection signal to an instance.
///
/// Every signal appends one event-log entry with the raw payload snapshot
/// and refreshes the last-webhook bookkeeping. `opened` clears the QR
/// credential in the same transaction that sets `connected`.
///
/// Returns the instance's status after the signal.
pub async fn apply_connection_signal(
    db: &Database,
    instance: &Instance,
    signal: &ConnectionSignal,
    payload: Option<String>,
    now: i64,
) -> Result<InstanceStatus, TidingsError> {
    let label = event_label(signal);

    if instance.status == InstanceStatus::Error {
        // Error is terminal until an explicit reconnect. Absorb the
        // signal into the event log only.
        debug!(instance = %instance.name, signal = label, "signal absorbed in error state");
        instances::append_event(db, &instance.id, label, payload, now).await?;
        return Ok(InstanceStatus::Error);
    }

    let (status, qr_code) = match signal {
        ConnectionSignal::QrIssued(qr) => (InstanceStatus::Connecting, Some(qr.clone())),
        ConnectionSignal::Opened => (InstanceStatus::Connected, None),
        ConnectionSignal::Closed | ConnectionSignal::Refused => {
            (InstanceStatus::Disconnected, None)
        }
    };

    instances::record_signal(db, &instance.id, status, qr_code, label, payload, now).await?;
    info!(instance = %instance.name, signal = label, status = %status, "connection signal applied");
    Ok(status)
}
