//! Request submission: create state, publish query message, serve status.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, Instrument};
use uuid::Uuid;

use pulse_broker::{BrokerError, MessagePublisher};
use pulse_core::message::Envelope;
use pulse_core::request::{ProcessedRequest, QueryRequest, RequestResponse, RequestStatus};
use pulse_core::telemetry::{self, TraceContext};
use pulse_store::{StateStore, StoreError};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("state store error: {0}")]
    State(#[from] StoreError),

    #[error("publish error: {0}")]
    Publish(#[from] BrokerError),

    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

pub struct RequestSubmissionService {
    state: Arc<dyn StateStore>,
    publisher: Arc<dyn MessagePublisher>,
    query_topic: String,
}

impl RequestSubmissionService {
    pub fn new(
        state: Arc<dyn StateStore>,
        publisher: Arc<dyn MessagePublisher>,
        query_topic: impl Into<String>,
    ) -> Self {
        Self {
            state,
            publisher,
            query_topic: query_topic.into(),
        }
    }

    /// Accept a query: create the state record at the Gateway stage, then
    /// publish the query message carrying the caller's trace context.
    pub async fn submit_request(
        &self,
        request: QueryRequest,
        parent: Option<&TraceContext>,
    ) -> Result<RequestResponse, GatewayError> {
        let request_id = Uuid::new_v4().to_string();

        let record = ProcessedRequest::new(request_id.clone(), request.clone());
        self.state.create(&request_id, &record).await?;

        let ctx = parent
            .map(TraceContext::child)
            .unwrap_or_else(TraceContext::new_root);
        let envelope = Envelope::Query {
            request_id: request_id.clone(),
            telemetry_headers: ctx.to_headers(),
            query_request: request,
        };
        let payload = envelope.encode()?;

        let span = telemetry::producer_span(&self.query_topic, &ctx);
        self.publisher
            .publish(&self.query_topic, &payload)
            .instrument(span)
            .await?;

        info!(request_id = %request_id, "request submitted");
        Ok(RequestResponse {
            request_id,
            status: RequestStatus::Accepted,
        })
    }

    /// `None` when the request is unknown or has expired.
    pub async fn get_request_status(
        &self,
        request_id: &str,
    ) -> Result<Option<ProcessedRequest>, GatewayError> {
        Ok(self.state.get(request_id).await?)
    }
}
