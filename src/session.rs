//! Monitor session: one configuration, one HTTP client, and the three
//! synchronization components built on top of them.

use std::sync::Arc;

use tracing::info;

use crate::client::{SnapshotClient, WafApi};
use crate::config::SyncConfig;
use crate::error::Result;
use crate::mutation::MutationSynchronizer;
use crate::poller::StatsPoller;
use crate::stream::{StreamConfig, StreamConsumer, WebSocketConnector};

/// Owns every synchronization component for one dashboard
pub struct Monitor {
    config: SyncConfig,
    client: Arc<SnapshotClient>,
    mutations: MutationSynchronizer,
    stream: Option<StreamConsumer>,
    poller: Option<StatsPoller>,
}

impl Monitor {
    /// Build a session. Nothing is activated yet.
    pub fn new(config: SyncConfig) -> Result<Self> {
        config.validate()?;
        let client = Arc::new(SnapshotClient::from_config(&config)?);
        let mutations = MutationSynchronizer::new(client.clone() as Arc<dyn WafApi>);
        Ok(Self {
            config,
            client,
            mutations,
            stream: None,
            poller: None,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn client(&self) -> &SnapshotClient {
        &self.client
    }

    pub fn mutations(&self) -> &MutationSynchronizer {
        &self.mutations
    }

    pub fn stream(&self) -> Option<&StreamConsumer> {
        self.stream.as_ref()
    }

    pub fn poller(&self) -> Option<&StatsPoller> {
        self.poller.as_ref()
    }

    /// Activate the live feed consumer if it is not running
    pub fn start_stream(&mut self) -> Result<&StreamConsumer> {
        let stream = match self.stream.take() {
            Some(stream) => stream,
            None => {
                let stream_config = StreamConfig::from_config(&self.config)?;
                let connector =
                    WebSocketConnector::new().with_connect_timeout(self.config.connect_timeout());
                StreamConsumer::activate_with(stream_config, Arc::new(connector))
            }
        };
        Ok(&*self.stream.insert(stream))
    }

    /// Activate the stats poller if it is not running.
    ///
    /// A failed first fetch is returned as the error, but the poller is kept
    /// and keeps refreshing; [`Monitor::poller`] reaches it.
    pub async fn start_poller(&mut self) -> Result<&StatsPoller> {
        let mut initial_error = None;
        let poller = match self.poller.take() {
            Some(poller) => poller,
            None => {
                let api = self.client.clone() as Arc<dyn WafApi>;
                let mut poller = StatsPoller::activate(api, self.config.poll_interval()).await?;
                initial_error = poller.take_initial_error();
                poller
            }
        };
        let poller = self.poller.insert(poller);
        match initial_error {
            Some(e) => Err(e),
            None => Ok(&*poller),
        }
    }

    pub async fn stop_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.deactivate().await;
        }
    }

    pub async fn stop_poller(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.deactivate().await;
        }
    }

    /// Deactivate everything
    pub async fn shutdown(mut self) {
        self.stop_stream().await;
        self.stop_poller().await;
        info!("monitor session closed");
    }
}
