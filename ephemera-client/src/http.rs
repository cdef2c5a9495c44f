//! [`RemoteStore`] backed by the Ephemera HTTP API.

use async_trait::async_trait;
use chrono::SecondsFormat;
use futures_util::StreamExt;
use metrics::counter;
use reqwest::{Client, RequestBuilder, Response, header::ACCEPT};
use serde::de::DeserializeOwned;
use shared::models::{
    ChangeEvent, CreateMessageRequest, DeletedCount, ErrorResponse, ListMessagesResponse, Message,
    OnlineResponse, RegisterUserRequest, Timestamp, User,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::{
    error::{ClientError, ClientResult},
    remote::{ChannelStatus, FeedChannel, FeedSignal, RemoteStore},
    sse::{SseDecoder, SseFrame},
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const FEED_BUFFER: usize = 256;

#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: Client,
    api_base: Url,
}

impl HttpRemoteStore {
    /// Creates a store talking to the server rooted at `server_url`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built or the URL cannot
    /// be extended with the API prefix.
    pub fn new(server_url: &Url) -> ClientResult<Self> {
        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Self::with_client(client, server_url)
    }

    /// Uses a preconfigured client.
    ///
    /// # Errors
    /// Returns an error if the URL cannot be extended with the API prefix.
    pub fn with_client(client: Client, server_url: &Url) -> ClientResult<Self> {
        let mut root = server_url.clone();
        if !root.path().ends_with('/') {
            let path = format!("{}/", root.path());
            root.set_path(&path);
        }
        let api_base = root.join("api/")?;
        Ok(Self { client, api_base })
    }

    fn endpoint(&self, path: &str) -> ClientResult<Url> {
        Ok(self.api_base.join(path)?)
    }

    /// Registers `username`, or touches the existing identity with that name.
    ///
    /// # Errors
    /// Returns an error if the request fails or the server rejects the name.
    pub async fn register_user(&self, username: &str) -> ClientResult<User> {
        let request = self
            .client
            .post(self.endpoint("users")?)
            .json(&RegisterUserRequest {
                username: username.to_string(),
            });
        send_json(request).await
    }
}

fn rfc3339(at: Timestamp) -> String {
    at.0.to_rfc3339_opts(SecondsFormat::Millis, true)
}

async fn send(request: RequestBuilder) -> ClientResult<Response> {
    let response = request.timeout(REQUEST_TIMEOUT).send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.bytes().await.unwrap_or_default();
    let problem = serde_json::from_slice::<ErrorResponse>(&body).unwrap_or_else(|_| {
        ErrorResponse::new(String::from_utf8_lossy(&body).trim().to_string())
    });
    Err(ClientError::Status { status, problem })
}

async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> ClientResult<T> {
    let response = send(request).await?;
    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn fetch_all(&self) -> ClientResult<Vec<Message>> {
        let list: ListMessagesResponse =
            send_json(self.client.get(self.endpoint("messages")?)).await?;
        Ok(list.messages)
    }

    async fn insert(&self, request: &CreateMessageRequest) -> ClientResult<Message> {
        send_json(self.client.post(self.endpoint("messages")?).json(request)).await
    }

    async fn delete_expired(&self, now: Timestamp) -> ClientResult<u64> {
        let request = self
            .client
            .delete(self.endpoint("messages/expired")?)
            .query(&[("before", rfc3339(now))]);
        let deleted: DeletedCount = send_json(request).await?;
        Ok(deleted.deleted)
    }

    async fn delete_inactive_users(&self, cutoff: Timestamp) -> ClientResult<u64> {
        let request = self
            .client
            .delete(self.endpoint("users/inactive")?)
            .query(&[("before", rfc3339(cutoff))]);
        let deleted: DeletedCount = send_json(request).await?;
        Ok(deleted.deleted)
    }

    async fn touch_presence(&self, user_id: Uuid) -> ClientResult<()> {
        send(
            self.client
                .post(self.endpoint(&format!("users/{user_id}/heartbeat"))?),
        )
        .await?;
        Ok(())
    }

    async fn online_count(&self, since: Timestamp) -> ClientResult<u64> {
        let request = self
            .client
            .get(self.endpoint("users/online")?)
            .query(&[("since", rfc3339(since))]);
        let online: OnlineResponse = send_json(request).await?;
        Ok(online.online)
    }

    async fn subscribe(&self) -> ClientResult<FeedChannel> {
        let url = self.endpoint("stream/messages")?;
        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        let teardown = CancellationToken::new();

        tokio::spawn(run_feed(
            self.client.clone(),
            url,
            tx,
            teardown.clone(),
        ));

        Ok(FeedChannel::new(rx, teardown))
    }
}

async fn run_feed(
    client: Client,
    url: Url,
    tx: mpsc::Sender<FeedSignal>,
    teardown: CancellationToken,
) {
    if tx
        .send(FeedSignal::Status(ChannelStatus::Connecting))
        .await
        .is_err()
    {
        return;
    }

    let request = client
        .get(url)
        .header(ACCEPT, "text/event-stream")
        .send();
    let response = tokio::select! {
        () = teardown.cancelled() => return,
        response = request => response,
    };

    let response = match response {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
            warn!(status = %response.status(), "change feed rejected");
            let _ = tx.send(FeedSignal::Status(ChannelStatus::ChannelError)).await;
            return;
        }
        Err(err) => {
            warn!(error = %err, "change feed connection failed");
            let _ = tx.send(FeedSignal::Status(ChannelStatus::ChannelError)).await;
            return;
        }
    };

    let mut stream = response.bytes_stream();
    let mut decoder = SseDecoder::new();

    loop {
        let chunk = tokio::select! {
            () = teardown.cancelled() => return,
            chunk = stream.next() => chunk,
        };

        let bytes = match chunk {
            Some(Ok(bytes)) => bytes,
            Some(Err(err)) => {
                warn!(error = %err, "change feed chunk error");
                let _ = tx.send(FeedSignal::Status(ChannelStatus::ChannelError)).await;
                return;
            }
            None => {
                debug!("change feed ended by server");
                let _ = tx.send(FeedSignal::Status(ChannelStatus::Closed)).await;
                return;
            }
        };

        for frame in decoder.push(&bytes) {
            if let Some(signal) = signal_for(&frame)
                && tx.send(signal).await.is_err()
            {
                return;
            }
        }
    }
}

/// Validates a decoded SSE frame into a feed signal. Malformed frames are dropped.
fn signal_for(frame: &SseFrame) -> Option<FeedSignal> {
    match ChangeEvent::decode(&frame.event, &frame.data) {
        Ok(ChangeEvent::Subscribed) => Some(FeedSignal::Status(ChannelStatus::Subscribed)),
        Ok(ChangeEvent::Insert(message)) => Some(FeedSignal::Insert(message)),
        Ok(ChangeEvent::Delete(deleted)) => Some(FeedSignal::Delete(deleted.id)),
        Ok(ChangeEvent::Ping) => Some(FeedSignal::Alive),
        Err(err) => {
            counter!("ephemera_feed_events_dropped_total").increment(1);
            warn!(event = %frame.event, error = %err, "dropping malformed change event");
            None
        }
    }
}
