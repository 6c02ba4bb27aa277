// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! mesh-a2a
//!
//! Authenticated agent-to-agent HTTP client: resolves a target URN to a
//! route under a base URL, attaches auth/delegation headers, and executes
//! the call through a circuit breaker wrapping a generic retry loop.

mod client;
mod types;

pub use client::{A2aClient, A2aConfig};
pub use types::A2aResponse;
