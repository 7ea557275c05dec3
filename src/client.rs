use std::sync::Arc;
use std::time::Duration;

use crate::anonymous_id::AnonymousIdStore;
use crate::api::{ApiConfig, ApiTransport};
use crate::context::EvaluationContext;
use crate::events::{Event, EventBody, EventDispatcher, EventType, IdentifyBody, TrackBody};
use crate::flag_store::FlagStore;
use crate::flags::FlagCheckResult;
use crate::listeners::ListenerHandle;
use crate::websocket::{WebSocketChannel, WebSocketConfig};
use crate::{ClientConfig, Result};

/// A client for the Schematic API.
///
/// In order to create a client instance, first create [`ClientConfig`].
///
/// # Modes
///
/// In the default REST-only mode, [`Client::set_context`] stores the evaluation context
/// locally and [`Client::check_flag`] issues a one-shot HTTP check per call. With
/// [`ClientConfig::use_websocket`], `set_context` instead sends the context over a
/// persistent WebSocket and awaits the first flag snapshot; flag reads are then
/// synchronous cache lookups kept fresh by server pushes.
///
/// Analytics calls ([`Client::identify`], [`Client::track`]) always go through the event
/// queue and REST transport, independent of the WebSocket channel.
///
/// Multiple client instances are fully independent and share no state (apart from an
/// explicitly shared [`StoragePersister`](crate::StoragePersister)).
///
/// # Examples
/// ```no_run
/// # use schematic::{Client, ClientConfig, EvaluationContext};
/// # async fn example() -> schematic::Result<()> {
/// let client = ClientConfig::from_api_key("api-key")
///     .use_websocket(true)
///     .to_client();
/// client
///     .set_context(EvaluationContext::new().with_user(
///         [("id".to_owned(), "user_123".to_owned())].into_iter().collect(),
///     ))
///     .await?;
/// let enabled = client.flag_value_or("new-billing-page", false);
/// # Ok(())
/// # }
/// ```
pub struct Client {
    api_key: String,
    store: Arc<FlagStore>,
    transport: Arc<ApiTransport>,
    dispatcher: EventDispatcher,
    anonymous_ids: AnonymousIdStore,
    /// `Some` only in WebSocket mode; at most one connection exists behind it.
    channel: Option<WebSocketChannel>,
    set_context_timeout: Option<Duration>,
}

impl Client {
    /// Create a new `Client` using the specified configuration.
    ///
    /// ```
    /// # use schematic::{Client, ClientConfig};
    /// let client = Client::new(ClientConfig::from_api_key("api-key"));
    /// ```
    pub fn new(config: ClientConfig) -> Client {
        let store = Arc::new(FlagStore::new());
        let transport = Arc::new(ApiTransport::new(ApiConfig {
            api_url: config.api_url,
            events_url: config.events_url,
            api_key: config.api_key.clone(),
            additional_headers: config.additional_headers.clone(),
        }));
        let channel = config.use_websocket.then(|| {
            WebSocketChannel::new(
                WebSocketConfig {
                    url: config.websocket_url,
                    api_key: config.api_key.clone(),
                    additional_headers: config.additional_headers,
                },
                Arc::clone(&store),
            )
        });

        Client {
            api_key: config.api_key,
            store,
            dispatcher: EventDispatcher::new(Arc::clone(&transport)),
            transport,
            anonymous_ids: AnonymousIdStore::new(config.storage),
            channel,
            set_context_timeout: config.set_context_timeout,
        }
    }

    /// Set the evaluation context used for flag lookups.
    ///
    /// In REST-only mode this stores the context and returns immediately; flag checks
    /// carry it explicitly per call. In WebSocket mode the context is sent to the server
    /// and this call resolves once the first flag snapshot for it has been cached;
    /// setting a context structurally equal to the current one (regardless of key order
    /// within a group) resolves immediately without a round trip.
    ///
    /// # Errors
    ///
    /// WebSocket mode only:
    /// - [`Error::Timeout`](crate::Error::Timeout) if no snapshot arrives within
    ///   [`ClientConfig::set_context_timeout`].
    /// - [`Error::Superseded`](crate::Error::Superseded) if a newer `set_context` call
    ///   replaced this one before its snapshot arrived.
    /// - [`Error::ConnectionClosed`](crate::Error::ConnectionClosed) or
    ///   [`Error::WebSocket`](crate::Error::WebSocket) on connection failure.
    pub async fn set_context(&self, context: EvaluationContext) -> Result<()> {
        let key = context.canonical_key();
        match &self.channel {
            None => {
                self.store.set_current_context(context, key);
                Ok(())
            }
            Some(channel) => {
                if self.store.context_key().as_deref() == Some(key.as_str()) {
                    log::debug!(target: "schematic", "context unchanged, skipping round trip");
                    return Ok(());
                }
                channel
                    .send_context(context, key, self.set_context_timeout)
                    .await
            }
        }
    }

    /// Evaluate one flag, returning `fallback` on any failure.
    ///
    /// WebSocket mode reads the cached value for the current context synchronously; REST
    /// mode issues a one-shot check carrying the current context. Never returns an error:
    /// network failures and missing values degrade to `fallback`.
    pub async fn check_flag(&self, flag: &str, fallback: bool) -> bool {
        if self.channel.is_some() {
            return self.store.flag_value(flag).unwrap_or(fallback);
        }

        let context = self.store.current_context().unwrap_or_default();
        match self.transport.check_flag(flag, &context).await {
            Ok(result) => result.value,
            Err(err) => {
                log::warn!(target: "schematic", "flag check failed, using fallback: {err}");
                fallback
            }
        }
    }

    /// Evaluate all flags against the current context via a one-shot REST check.
    /// Returns an empty list on failure rather than an error.
    pub async fn check_flags(&self) -> Vec<FlagCheckResult> {
        let context = self.store.current_context().unwrap_or_default();
        match self.transport.check_flags(&context).await {
            Ok(flags) => flags,
            Err(err) => {
                log::warn!(target: "schematic", "flags check failed: {err}");
                Vec::new()
            }
        }
    }

    /// Synchronous read of the cached value for `flag` under the current context.
    /// `None` if no snapshot has been received for that context/flag combination yet.
    pub fn flag_value(&self, flag: &str) -> Option<bool> {
        self.store.flag_value(flag)
    }

    /// Like [`Client::flag_value`], but returns `fallback` when no cached value exists,
    /// such as on the very first synchronous read before any data has arrived.
    pub fn flag_value_or(&self, flag: &str, fallback: bool) -> bool {
        self.store.flag_value(flag).unwrap_or(fallback)
    }

    /// Full cached check result for `flag` (including metered-feature metadata) under the
    /// current context.
    pub fn flag_check(&self, flag: &str) -> Option<FlagCheckResult> {
        self.store.flag_check(flag)
    }

    /// Whether the client is between a context send and its first snapshot. Consumers
    /// use this to render loading states.
    pub fn is_pending(&self) -> bool {
        self.store.is_pending()
    }

    /// Register a callback invoked whenever the cached value for `flag` under the
    /// current context changes (new snapshot or context switch). Multiple listeners per
    /// flag are supported; each handle removes only its own listener.
    pub fn on_flag_value(
        &self,
        flag: &str,
        callback: impl Fn(bool) + Send + Sync + 'static,
    ) -> ListenerHandle {
        self.store.on_flag_value(flag, callback)
    }

    /// Like [`Client::on_flag_value`], but the callback receives the full
    /// [`FlagCheckResult`], for metered/usage-aware consumers.
    pub fn on_flag_check(
        &self,
        flag: &str,
        callback: impl Fn(FlagCheckResult) + Send + Sync + 'static,
    ) -> ListenerHandle {
        self.store.on_flag_check(flag, callback)
    }

    /// Register a callback invoked when [`Client::is_pending`] transitions.
    pub fn on_pending_change(
        &self,
        callback: impl Fn(bool) + Send + Sync + 'static,
    ) -> ListenerHandle {
        self.store.on_pending_change(callback)
    }

    /// Record an identify event associating the anonymous tracker with known user (and
    /// optionally company) keys. Fire-and-forget; delivery failures are logged.
    ///
    /// Must be called from within a tokio runtime.
    pub fn identify(&self, body: IdentifyBody) {
        self.dispatch(EventType::Identify, EventBody::Identify(body));
    }

    /// Record a named usage event. The company/user key groups default to the current
    /// context when left unset. Fire-and-forget; delivery failures are logged.
    ///
    /// Must be called from within a tokio runtime.
    pub fn track(&self, mut body: TrackBody) {
        if body.company.is_none() || body.user.is_none() {
            let context = self.store.current_context().unwrap_or_default();
            if body.company.is_none() {
                body.company = context.company;
            }
            if body.user.is_none() {
                body.user = context.user;
            }
        }
        self.dispatch(EventType::Track, EventBody::Track(body));
    }

    /// Stop sending events immediately; they queue up until [`Client::resume_events`] or
    /// [`Client::flush_events`]. The analogue of the hosting page being backgrounded.
    pub fn pause_events(&self) {
        self.dispatcher.pause();
    }

    /// Resume immediate event delivery and drain anything queued while paused.
    pub fn resume_events(&self) {
        self.dispatcher.resume();
    }

    /// Drain queued events in FIFO order, one request per event, best-effort.
    pub async fn flush_events(&self) {
        self.dispatcher.flush().await;
    }

    /// Release resources: closes the WebSocket connection (if open) and flushes queued
    /// events. Safe to call more than once.
    pub async fn cleanup(&self) {
        if let Some(channel) = &self.channel {
            channel.close().await;
        }
        self.dispatcher.flush().await;
    }

    fn dispatch(&self, event_type: EventType, body: EventBody) {
        let event = Event::new(
            self.api_key.clone(),
            event_type,
            body,
            self.anonymous_ids.anonymous_id(),
        );
        self.dispatcher.dispatch(event);
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::context::EvaluationContext;

    fn user_context(id: &str) -> EvaluationContext {
        EvaluationContext::new()
            .with_user([("id".to_owned(), id.to_owned())].into_iter().collect())
    }

    #[tokio::test]
    async fn rest_mode_set_context_is_local_only() {
        // No server at all: set_context must not perform any I/O.
        let client = ClientConfig::from_api_key("api-key")
            .api_url("http://127.0.0.1:9")
            .events_url("http://127.0.0.1:9")
            .to_client();

        client.set_context(user_context("user_1")).await.unwrap();
        assert_eq!(
            client.store.context_key(),
            Some(user_context("user_1").canonical_key())
        );
        assert!(!client.is_pending());
    }

    #[tokio::test]
    async fn check_flag_returns_fallback_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/flags/f1/check"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = ClientConfig::from_api_key("api-key")
            .api_url(server.uri())
            .events_url(server.uri())
            .to_client();
        client.set_context(user_context("user_1")).await.unwrap();

        assert!(client.check_flag("f1", true).await);
        assert!(!client.check_flag("f1", false).await);
    }

    #[tokio::test]
    async fn check_flag_uses_server_value_when_available() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/flags/f1/check"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"data":{"flag":"f1","value":true,"reason":"rule"}}"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        let client = ClientConfig::from_api_key("api-key")
            .api_url(server.uri())
            .events_url(server.uri())
            .to_client();

        assert!(client.check_flag("f1", false).await);
    }

    #[tokio::test]
    async fn check_flags_degrades_to_empty_on_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/flags/check"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = ClientConfig::from_api_key("api-key")
            .api_url(server.uri())
            .events_url(server.uri())
            .to_client();

        assert!(client.check_flags().await.is_empty());
    }

    #[test]
    fn flag_value_or_returns_fallback_before_any_snapshot() {
        let client = ClientConfig::from_api_key("api-key").to_client();

        assert_eq!(client.flag_value("unknown"), None);
        assert!(client.flag_value_or("unknown", true));
        assert!(!client.flag_value_or("unknown", false));
    }

    #[tokio::test]
    async fn track_fills_missing_key_groups_from_current_context() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/e"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = ClientConfig::from_api_key("api-key")
            .api_url(server.uri())
            .events_url(server.uri())
            .to_client();
        client
            .set_context(
                user_context("user_1").with_company(
                    [("id".to_owned(), "comp_1".to_owned())].into_iter().collect(),
                ),
            )
            .await
            .unwrap();

        client.pause_events();
        client.track(TrackBody {
            event: "query".to_owned(),
            ..TrackBody::default()
        });
        client.flush_events().await;

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["body"]["event"], "query");
        assert_eq!(body["body"]["user"]["id"], "user_1");
        assert_eq!(body["body"]["company"]["id"], "comp_1");
        assert_eq!(body["apiKey"], "api-key");
    }

    #[tokio::test]
    async fn events_share_the_anonymous_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/e"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = ClientConfig::from_api_key("api-key")
            .api_url(server.uri())
            .events_url(server.uri())
            .to_client();

        client.pause_events();
        client.identify(IdentifyBody {
            keys: [("id".to_owned(), "user_1".to_owned())].into_iter().collect(),
            ..IdentifyBody::default()
        });
        client.track(TrackBody {
            event: "query".to_owned(),
            ..TrackBody::default()
        });
        client.flush_events().await;

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
        let first: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let second: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
        assert_eq!(first["trackerUserId"], second["trackerUserId"]);
        assert_ne!(first["trackerEventId"], second["trackerEventId"]);
    }

    #[tokio::test]
    async fn cleanup_flushes_queued_events() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/e"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = ClientConfig::from_api_key("api-key")
            .api_url(server.uri())
            .events_url(server.uri())
            .to_client();

        client.pause_events();
        client.track(TrackBody {
            event: "query".to_owned(),
            ..TrackBody::default()
        });
        client.cleanup().await;
        // Safe to call again.
        client.cleanup().await;

        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }
}
