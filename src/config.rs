use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::anonymous_id::{MemoryStoragePersister, StoragePersister};
use crate::api;
use crate::Client;

/// Configuration for [`Client`].
///
/// # Examples
/// ```
/// # use schematic::ClientConfig;
/// let client = ClientConfig::from_api_key("api-key")
///     .use_websocket(true)
///     .to_client();
/// ```
pub struct ClientConfig {
    pub(crate) api_key: String,
    pub(crate) api_url: String,
    pub(crate) events_url: String,
    pub(crate) websocket_url: String,
    pub(crate) use_websocket: bool,
    pub(crate) additional_headers: HashMap<String, String>,
    pub(crate) storage: Option<Arc<dyn StoragePersister>>,
    pub(crate) set_context_timeout: Option<Duration>,
}

impl ClientConfig {
    /// Default base URL for flag check API calls.
    pub const DEFAULT_API_URL: &'static str = api::DEFAULT_API_URL;
    /// Default base URL for event ingestion.
    pub const DEFAULT_EVENTS_URL: &'static str = api::DEFAULT_EVENTS_URL;
    /// Default WebSocket URL for flag bootstrapping.
    pub const DEFAULT_WEBSOCKET_URL: &'static str = api::DEFAULT_WEBSOCKET_URL;
    /// Default timeout for [`Client::set_context`] in WebSocket mode.
    pub const DEFAULT_SET_CONTEXT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Create a default Schematic configuration using the specified API key.
    ///
    /// ```
    /// # use schematic::ClientConfig;
    /// ClientConfig::from_api_key("api-key");
    /// ```
    pub fn from_api_key(api_key: impl Into<String>) -> ClientConfig {
        ClientConfig {
            api_key: api_key.into(),
            api_url: ClientConfig::DEFAULT_API_URL.to_owned(),
            events_url: ClientConfig::DEFAULT_EVENTS_URL.to_owned(),
            websocket_url: ClientConfig::DEFAULT_WEBSOCKET_URL.to_owned(),
            use_websocket: false,
            additional_headers: HashMap::new(),
            storage: Some(Arc::new(MemoryStoragePersister::new())),
            set_context_timeout: Some(ClientConfig::DEFAULT_SET_CONTEXT_TIMEOUT),
        }
    }

    /// Override base URL for flag check API calls. Clients should use the default setting
    /// in most cases.
    pub fn api_url(mut self, api_url: impl Into<String>) -> ClientConfig {
        self.api_url = api_url.into();
        self
    }

    /// Override base URL for event ingestion.
    pub fn events_url(mut self, events_url: impl Into<String>) -> ClientConfig {
        self.events_url = events_url.into();
        self
    }

    /// Override the WebSocket URL for flag bootstrapping.
    pub fn websocket_url(mut self, websocket_url: impl Into<String>) -> ClientConfig {
        self.websocket_url = websocket_url.into();
        self
    }

    /// Use the persistent WebSocket channel for flag values instead of per-call REST
    /// checks. Defaults to `false`.
    pub fn use_websocket(mut self, use_websocket: bool) -> ClientConfig {
        self.use_websocket = use_websocket;
        self
    }

    /// Add a header to every API call (and the WebSocket handshake).
    pub fn additional_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> ClientConfig {
        self.additional_headers.insert(name.into(), value.into());
        self
    }

    /// Set the storage backend used to persist the anonymous tracker id. Defaults to an
    /// in-process [`MemoryStoragePersister`].
    pub fn storage(mut self, storage: impl StoragePersister + 'static) -> ClientConfig {
        self.storage = Some(Arc::new(storage));
        self
    }

    /// Run without persistent storage; a fresh anonymous id is generated per event.
    pub fn without_storage(mut self) -> ClientConfig {
        self.storage = None;
        self
    }

    /// Set how long [`Client::set_context`] waits for the first flag snapshot before
    /// failing with [`Error::Timeout`](crate::Error::Timeout). `None` waits forever.
    ///
    /// Defaults to [`ClientConfig::DEFAULT_SET_CONTEXT_TIMEOUT`].
    pub fn set_context_timeout(mut self, timeout: Option<Duration>) -> ClientConfig {
        self.set_context_timeout = timeout;
        self
    }

    /// Create a new [`Client`] using the specified configuration.
    ///
    /// ```
    /// # use schematic::{Client, ClientConfig};
    /// let client: Client = ClientConfig::from_api_key("api-key").to_client();
    /// ```
    pub fn to_client(self) -> Client {
        Client::new(self)
    }
}
