//! Trace-context propagation across thread and broker boundaries.
//!
//! Contexts travel as W3C-style `traceparent` headers inside message
//! envelopes and HTTP requests. Spans themselves are `tracing` spans with the
//! trace id recorded as a field, which keeps cross-service correlation
//! greppable in log output without an exporter in the request path.

use std::collections::HashMap;

use rand::RngCore;
use tracing::Span;

/// Header key used on both HTTP requests and broker envelopes.
pub const TRACEPARENT_HEADER: &str = "traceparent";

const SUPPORTED_VERSION: &str = "00";

/// A propagated span context: 128-bit trace id, 64-bit span id, flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    /// 32 lowercase hex chars.
    pub trace_id: String,
    /// 16 lowercase hex chars.
    pub span_id: String,
    /// Trace flags (bit 0 = sampled).
    pub flags: u8,
}

impl TraceContext {
    /// Start a brand-new sampled trace.
    pub fn new_root() -> Self {
        let mut rng = rand::thread_rng();
        let mut trace = [0u8; 16];
        let mut span = [0u8; 8];
        rng.fill_bytes(&mut trace);
        rng.fill_bytes(&mut span);
        Self {
            trace_id: hex::encode(trace),
            span_id: hex::encode(span),
            flags: 0x01,
        }
    }

    /// New span id under the same trace.
    pub fn child(&self) -> Self {
        let mut span = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut span);
        Self {
            trace_id: self.trace_id.clone(),
            span_id: hex::encode(span),
            flags: self.flags,
        }
    }

    /// Format as a `traceparent` header value.
    pub fn to_traceparent(&self) -> String {
        format!(
            "{}-{}-{}-{:02x}",
            SUPPORTED_VERSION, self.trace_id, self.span_id, self.flags
        )
    }

    /// Parse a `traceparent` header value. Returns `None` for anything that
    /// does not match `00-<32 hex>-<16 hex>-<2 hex>` or uses the all-zero ids.
    pub fn parse(header: &str) -> Option<Self> {
        let mut parts = header.trim().split('-');
        let version = parts.next()?;
        let trace_id = parts.next()?;
        let span_id = parts.next()?;
        let flags = parts.next()?;
        if parts.next().is_some() {
            return None;
        }
        if version != SUPPORTED_VERSION {
            return None;
        }
        if trace_id.len() != 32 || !is_lower_hex(trace_id) || trace_id.bytes().all(|b| b == b'0') {
            return None;
        }
        if span_id.len() != 16 || !is_lower_hex(span_id) || span_id.bytes().all(|b| b == b'0') {
            return None;
        }
        let flags = u8::from_str_radix(flags, 16).ok()?;
        Some(Self {
            trace_id: trace_id.to_string(),
            span_id: span_id.to_string(),
            flags,
        })
    }

    /// Write this context into a header map.
    pub fn inject(&self, headers: &mut HashMap<String, String>) {
        headers.insert(TRACEPARENT_HEADER.to_string(), self.to_traceparent());
    }

    /// Read a context out of a header map, if present and well-formed.
    pub fn extract(headers: &HashMap<String, String>) -> Option<Self> {
        headers.get(TRACEPARENT_HEADER).and_then(|v| Self::parse(v))
    }

    /// Headers containing only this context.
    pub fn to_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        self.inject(&mut headers);
        headers
    }
}

fn is_lower_hex(s: &str) -> bool {
    s.bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

// ── Span helpers ────────────────────────────────────────────────────

/// Span for handling one message pulled off a topic.
pub fn consumer_span(topic: &str, message_id: &str, ctx: Option<&TraceContext>) -> Span {
    match ctx {
        Some(ctx) => tracing::info_span!(
            "consume",
            topic = %topic,
            message_id = %message_id,
            trace_id = %ctx.trace_id,
            parent_span_id = %ctx.span_id,
        ),
        None => tracing::info_span!("consume", topic = %topic, message_id = %message_id),
    }
}

/// Span wrapping a publish to a topic.
pub fn producer_span(topic: &str, ctx: &TraceContext) -> Span {
    tracing::info_span!("publish", topic = %topic, trace_id = %ctx.trace_id)
}

/// Span for serving one HTTP request.
pub fn server_span(method: &str, path: &str, ctx: Option<&TraceContext>) -> Span {
    match ctx {
        Some(ctx) => tracing::info_span!(
            "http",
            method = %method,
            path = %path,
            trace_id = %ctx.trace_id,
            parent_span_id = %ctx.span_id,
        ),
        None => tracing::info_span!("http", method = %method, path = %path),
    }
}

/// Span for an outbound call to a backing system (store, LLM, broker).
pub fn client_span(system: &str, operation: &str) -> Span {
    tracing::debug_span!("client", system = %system, operation = %operation)
}
