// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Evolution-style WhatsApp gateway client and the HTTP object store.

pub mod client;
pub mod object_store;

pub use client::EvolutionClient;
pub use object_store::HttpObjectStore;
