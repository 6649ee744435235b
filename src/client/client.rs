//! HTTP and websocket client for the broker.
//!
//! `QueueClient` lists topics, publishes, and runs subscriptions whose
//! callback may fail. With dead-lettering enabled a failed callback
//! republishes the original body to `<topic>.deadletter`. That republish is
//! best-effort: its failure is logged and the subscription carries on.

use std::error::Error as StdError;
use std::future::Future;

use futures_util::{SinkExt, StreamExt};
use reqwest::StatusCode;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tungstenite::protocol::Message as WsMessage;
use url::Url;

use crate::broker::{Delivery, dead_letter_topic};
use crate::transport::message::{PublishRequest, PublishResponse, TopicsResponse};
use crate::utils::error::ClientError;

/// Error type a subscription callback may return.
pub type CallbackError = Box<dyn StdError + Send + Sync>;

#[derive(Debug, Clone)]
pub struct QueueClient {
    base: Url,
    dead_letter: bool,
    http: reqwest::Client,
}

/// Running subscription started by [`QueueClient::subscribe`].
#[derive(Debug)]
pub struct SubscriptionHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    /// Closes the connection and stops delivering to the callback.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// True once the connection has closed and the reader task has returned.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the subscription task to end.
    pub async fn join(self) {
        if let Err(err) = self.task.await {
            error!(error = %err, "subscription task failed");
        }
    }
}

impl QueueClient {
    /// `addr` is `host:port`, without a scheme.
    pub fn new(addr: &str, dead_letter: bool) -> Result<Self, ClientError> {
        let base = Url::parse(&format!("http://{addr}/"))?;
        Ok(Self {
            base,
            dead_letter,
            http: reqwest::Client::new(),
        })
    }

    pub fn dead_letter_enabled(&self) -> bool {
        self.dead_letter
    }

    pub(crate) fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.clear().extend(segments);
        }
        url
    }

    pub async fn topics(&self) -> Result<Vec<String>, ClientError> {
        let resp = self.http.get(self.url(&["topics"])).send().await?;
        let body = expect_ok(resp).await.inspect_err(|err| {
            error!(error = %err, "could not get topics");
        })?;
        let response: TopicsResponse = serde_json::from_str(&body)?;
        Ok(response.topics)
    }

    pub async fn publish(&self, topic: &str, body: &str) -> Result<PublishResponse, ClientError> {
        let request = PublishRequest {
            body: body.to_string(),
        };
        let resp = self
            .http
            .post(self.url(&["topics", topic]))
            .json(&request)
            .send()
            .await?;
        let body = expect_ok(resp).await.inspect_err(|err| {
            error!(topic = %topic, error = %err, "could not publish message");
        })?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Attaches to `topic` and feeds every delivered frame to `callback`.
    ///
    /// Returns once the websocket is connected. Deliveries are processed one
    /// at a time on a background task until the handle is cancelled or the
    /// server closes the stream.
    pub async fn subscribe<F, Fut>(
        &self,
        topic: &str,
        mut callback: F,
    ) -> Result<SubscriptionHandle, ClientError>
    where
        F: FnMut(Delivery) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), CallbackError>> + Send + 'static,
    {
        let mut url = self.url(&["topics", topic, "subscribe"]);
        // http -> ws is always a valid scheme change
        let _ = url.set_scheme("ws");

        let (ws_stream, _response) = connect_async(url.as_str()).await.inspect_err(|err| {
            error!(topic = %topic, error = %err, "could not subscribe");
        })?;
        info!(topic = %topic, "subscribed");

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let client = self.clone();
        let topic = topic.to_string();

        let task = tokio::spawn(async move {
            let (mut ws_sender, mut ws_receiver) = ws_stream.split();

            loop {
                let frame = tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        let _ = ws_sender.send(WsMessage::Close(None)).await;
                        break;
                    }
                    frame = ws_receiver.next() => frame,
                };

                let text = match frame {
                    Some(Ok(WsMessage::Text(text))) => text,
                    Some(Ok(WsMessage::Ping(bytes))) => {
                        let _ = ws_sender.send(WsMessage::Pong(bytes)).await;
                        continue;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        debug!(topic = %topic, "server closed subscription");
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        error!(topic = %topic, error = %err, "could not read message");
                        break;
                    }
                };

                let delivery: Delivery = match serde_json::from_str(text.as_str()) {
                    Ok(delivery) => delivery,
                    Err(err) => {
                        warn!(topic = %topic, error = %err, "skipping undecodable frame");
                        continue;
                    }
                };

                let value = delivery.value.clone();
                if let Err(err) = callback(delivery).await {
                    error!(topic = %topic, error = %err, "could not process message");
                    if client.dead_letter {
                        client.relay_dead_letter(&topic, &value).await;
                    }
                }
            }
        });

        Ok(SubscriptionHandle { cancel, task })
    }

    async fn relay_dead_letter(&self, topic: &str, value: &str) {
        let target = dead_letter_topic(topic);
        match self.publish(&target, value).await {
            Ok(resp) => {
                debug!(topic = %target, message_id = %resp.message_id, "dead-lettered message")
            }
            Err(err) => {
                error!(
                    topic = %target,
                    error = %err,
                    "could not publish message to dead letter queue"
                )
            }
        }
    }
}

async fn expect_ok(resp: reqwest::Response) -> Result<String, ClientError> {
    let status = resp.status();
    let body = resp.text().await?;
    if status != StatusCode::OK {
        return Err(ClientError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}
