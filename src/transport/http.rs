//! HTTP routes for listing topics and publishing.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError, get, post, web};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::broker::Broker;
use crate::transport::message::{ErrorResponse, PublishRequest, PublishResponse, TopicsResponse};
use crate::transport::websocket;
use crate::utils::error::BrokerError;

/// Errors returned by the HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("could not read request body: {0}")]
    BadRequest(String),

    #[error("could not upgrade connection: {0}")]
    Upgrade(String),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Upgrade(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Broker(err) if err.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Broker(BrokerError::Backlogged { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Broker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}

/// Register all HTTP and WebSocket routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(list_topics)
        .service(publish)
        .service(websocket::subscribe);
}

/// GET /topics
#[get("/topics")]
pub async fn list_topics(broker: web::Data<Broker>) -> Result<HttpResponse, ApiError> {
    let topics = broker.list_topics()?;
    Ok(HttpResponse::Ok().json(TopicsResponse { topics }))
}

/// POST /topics/{topic} with `{"body": "<payload>"}`
#[post("/topics/{topic}")]
pub async fn publish(
    broker: web::Data<Broker>,
    path: web::Path<String>,
    payload: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let topic = path.into_inner();

    let request: PublishRequest = serde_json::from_slice(&payload).map_err(|err| {
        warn!(topic = %topic, error = %err, "rejected publish request");
        ApiError::BadRequest(err.to_string())
    })?;

    let receipt = broker.publish(&topic, request.body).inspect_err(|err| {
        error!(topic = %topic, error = %err, "could not publish message");
    })?;
    info!(topic = %topic, offset = receipt.offset, "accepted publish");

    Ok(HttpResponse::Ok().json(PublishResponse::from(receipt)))
}
