// SPDX-License-Identifier: MIT OR Apache-2.0
//! Response shape and response-body decoding for the A2A client.

use reqwest::header::HeaderMap;
use serde_json::Value;

/// A successful A2A call result: status, headers, and a decoded body.
///
/// `data` is JSON-decoded when the response's `Content-Type` is
/// `application/json`; otherwise it is the raw body as a JSON string value.
#[derive(Debug, Clone)]
pub struct A2aResponse {
    /// HTTP status code of the response.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Decoded body: parsed JSON, or the raw text wrapped in a JSON string.
    pub data: Value,
}
