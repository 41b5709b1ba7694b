// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-instance sync lease.
//!
//! At most one reconciliation pass runs per instance at a time. The lease
//! carries a TTL so a crashed or wedged pass cannot block future syncs
//! forever, and releases through an RAII guard on the happy path.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

struct Lease {
    held_at: Instant,
    generation: u64,
}

/// Registry of in-flight sync leases, keyed by instance id.
#[derive(Clone)]
pub struct SyncLeases {
    inner: Arc<DashMap<String, Lease>>,
    next_generation: Arc<AtomicU64>,
    ttl: Duration,
}

impl SyncLeases {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            next_generation: Arc::new(AtomicU64::new(0)),
            ttl,
        }
    }

    /// Try to acquire the lease for an instance.
    ///
    /// Returns `None` when a non-expired lease is already held. An expired
    /// lease is treated as abandoned and taken over; the generation token
    /// keeps the abandoned guard from releasing the new holder's lease if
    /// it turns out to still be alive.
    pub fn try_acquire(&self, instance_id: &str) -> Option<LeaseGuard> {
        let now = Instant::now();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let mut acquired = false;
        let entry = self
            .inner
            .entry(instance_id.to_string())
            .and_modify(|lease| {
                if now.duration_since(lease.held_at) >= self.ttl {
                    *lease = Lease {
                        held_at: now,
                        generation,
                    };
                    acquired = true;
                }
            })
            .or_insert_with(|| {
                acquired = true;
                Lease {
                    held_at: now,
                    generation,
                }
            });
        drop(entry);

        if acquired {
            Some(LeaseGuard {
                leases: self.inner.clone(),
                instance_id: instance_id.to_string(),
                generation,
            })
        } else {
            None
        }
    }
}

/// Releases the lease on drop, but only while it is still the holder.
pub struct LeaseGuard {
    leases: Arc<DashMap<String, Lease>>,
    instance_id: String,
    generation: u64,
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        self.leases
            .remove_if(&self.instance_id, |_, lease| {
                lease.generation == self.generation
            });
    }
}
