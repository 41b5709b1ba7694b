// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP ingress: the provider webhook endpoint and the operational REST
//! API the dashboard consumes.

pub mod handlers;
pub mod server;

pub use server::{GatewayState, ServerConfig, router, start_server};
