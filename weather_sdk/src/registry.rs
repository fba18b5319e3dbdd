//! Registry enforcing one live client per API key.

use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::client::{Mode, WeatherClient, WeatherClientBuilder};
use crate::clock::Clock;
use crate::config::ClientConfig;
use crate::error::SdkError;
use crate::fetcher::Fetcher;

pub(crate) type ClientMap = DashMap<String, Arc<WeatherClient>>;

type FetcherFactory = dyn Fn(&str) -> Arc<dyn Fetcher> + Send + Sync;

/// Map from trimmed API key to its live [`WeatherClient`].
///
/// Owned by the application and passed where needed; separate registries
/// share nothing. A key keeps the mode it was first created with until its
/// client is closed.
pub struct ClientRegistry {
    clients: Arc<ClientMap>,
    config: ClientConfig,
    clock: Option<Arc<dyn Clock>>,
    fetcher_factory: Option<Arc<FetcherFactory>>,
}

impl ClientRegistry {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            clients: Arc::new(DashMap::new()),
            config,
            clock: None,
            fetcher_factory: None,
        }
    }

    /// Registry configured from the environment, see [`ClientConfig::from_env`].
    pub fn from_env() -> Self {
        Self::new(ClientConfig::from_env())
    }

    /// Clock handed to every client this registry builds.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds each client's fetcher from its API key instead of the default
    /// HTTP client.
    pub fn with_fetcher_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&str) -> Arc<dyn Fetcher> + Send + Sync + 'static,
    {
        self.fetcher_factory = Some(Arc::new(factory));
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the client for `api_key`, creating it on first use.
    ///
    /// Fails with [`SdkError::ModeConflict`] if the key already has a live
    /// client in a different mode. A client that is closing is replaced.
    /// Creation happens under the key's entry lock, so concurrent first calls
    /// build exactly one client.
    pub fn get_or_create(&self, api_key: &str, mode: Mode) -> Result<Arc<WeatherClient>, SdkError> {
        let key = api_key.trim();
        if key.is_empty() {
            return Err(SdkError::InvalidInput("API key must not be empty".to_string()));
        }

        match self.clients.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let existing = entry.get();
                if existing.is_closed() {
                    // Closing but not yet unregistered; its own unregister
                    // is pointer-guarded and leaves the replacement alone.
                    let client = Arc::new(self.builder(key, mode).build()?);
                    entry.insert(Arc::clone(&client));
                    tracing::debug!("Replaced closing weather client ({} mode)", mode);
                    return Ok(client);
                }
                if existing.mode() != mode {
                    return Err(SdkError::ModeConflict {
                        existing: existing.mode(),
                        requested: mode,
                    });
                }
                Ok(Arc::clone(existing))
            }
            Entry::Vacant(entry) => {
                let client = Arc::new(self.builder(key, mode).build()?);
                entry.insert(Arc::clone(&client));
                tracing::debug!("Registered weather client ({} mode)", mode);
                Ok(client)
            }
        }
    }

    fn builder(&self, key: &str, mode: Mode) -> WeatherClientBuilder {
        let mut builder = WeatherClient::builder(key, mode)
            .api_url(&self.config.api_url)
            .update_interval(self.config.update_interval)
            .registered_in(Arc::downgrade(&self.clients));
        if let Some(clock) = &self.clock {
            builder = builder.clock(Arc::clone(clock));
        }
        if let Some(factory) = &self.fetcher_factory {
            builder = builder.fetcher(factory(key));
        }
        builder
    }

    /// Live client for `api_key`, if any.
    pub fn get(&self, api_key: &str) -> Option<Arc<WeatherClient>> {
        self.clients
            .get(api_key.trim())
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Unregisters `api_key` without closing its client, so the next
    /// [`get_or_create`](Self::get_or_create) builds a fresh one.
    pub fn remove(&self, api_key: &str) -> Option<Arc<WeatherClient>> {
        self.clients
            .remove(api_key.trim())
            .map(|(_, client)| client)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Closes every live client. Each close unregisters itself.
    pub async fn close_all(&self) {
        let clients: Vec<Arc<WeatherClient>> = self
            .clients
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for client in clients {
            client.close().await;
        }
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("clients", &self.clients.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Removes `key` only while it still maps to `client`, so closing a stale
/// client never unregisters its replacement.
pub(crate) fn unregister(clients: &ClientMap, key: &str, client: &WeatherClient) {
    let removed = clients.remove_if(key, |_, registered| {
        std::ptr::eq(Arc::as_ptr(registered), client)
    });
    if removed.is_some() {
        tracing::debug!("Unregistered weather client ({} mode)", client.mode());
    }
}
