//! Websocket subscribe endpoint.
//!
//! `GET /topics/{topic}/subscribe` upgrades the connection and runs one
//! broker subscriber loop for it. A second task watches the inbound half of
//! the socket: it answers pings and cancels the loop once the peer closes.

use actix_web::{HttpRequest, HttpResponse, get, web};
use actix_ws::{CloseCode, CloseReason, Message, MessageStream, Session};
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::broker::{Broker, Delivery, DeliverySink, SubscriptionEnd};
use crate::transport::http::ApiError;
use crate::utils::error::{BrokerError, TransportError};

/// Pushes deliveries as JSON text frames over an upgraded connection.
pub struct SessionSink {
    session: Session,
}

impl SessionSink {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

impl DeliverySink for SessionSink {
    async fn deliver(&mut self, delivery: &Delivery) -> Result<(), TransportError> {
        let frame = serde_json::to_string(delivery)?;
        self.session
            .text(frame)
            .await
            .map_err(|_| TransportError::Closed)
    }
}

/// GET /topics/{topic}/subscribe
#[get("/topics/{topic}/subscribe")]
pub async fn subscribe(
    req: HttpRequest,
    stream: web::Payload,
    path: web::Path<String>,
    broker: web::Data<Broker>,
) -> Result<HttpResponse, ApiError> {
    let topic = path.into_inner();
    if topic.is_empty() {
        return Err(BrokerError::InvalidTopic(topic).into());
    }

    let (response, session, msg_stream) = actix_ws::handle(&req, stream).map_err(|err| {
        warn!(topic = %topic, error = %err, "could not upgrade connection");
        ApiError::Upgrade(err.to_string())
    })?;

    let subscriber_id = format!("sub-{}", Uuid::new_v4());
    let span = info_span!("subscriber", id = %subscriber_id, topic = %topic);

    actix_web::rt::spawn(
        async move {
            let cancel = CancellationToken::new();
            let watcher = actix_web::rt::spawn(
                watch_connection(session.clone(), msg_stream, cancel.clone()).in_current_span(),
            );

            let mut sink = SessionSink::new(session.clone());
            let end = broker.subscribe(&topic, &mut sink, &cancel).await;
            cancel.cancel();
            watcher.abort();

            match end {
                Ok(SubscriptionEnd::Cancelled) => info!("subscriber disconnected"),
                Ok(SubscriptionEnd::QueueClosed) => {
                    info!("delivery queue closed");
                    close(session, CloseCode::Away).await;
                }
                Err(err) => {
                    warn!(error = %err, "subscriber loop ended");
                    close(session, CloseCode::Error).await;
                }
            }
        }
        .instrument(span),
    );

    Ok(response)
}

async fn watch_connection(
    mut session: Session,
    mut msg_stream: MessageStream,
    cancel: CancellationToken,
) {
    while let Some(frame) = msg_stream.next().await {
        match frame {
            Ok(Message::Ping(bytes)) => {
                if session.pong(&bytes).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(reason)) => {
                debug!(?reason, "peer closed connection");
                let _ = session.close(reason).await;
                break;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "websocket protocol error");
                break;
            }
        }
    }
    cancel.cancel();
}

async fn close(session: Session, code: CloseCode) {
    let _ = session
        .close(Some(CloseReason {
            code,
            description: None,
        }))
        .await;
}
