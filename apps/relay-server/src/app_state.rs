use std::net::SocketAddr;
use std::sync::Arc;

use crate::{metrics, relay::Relay};

#[derive(Clone)]
pub(crate) struct AppState {
    relay: Arc<Relay>,
    metrics: Arc<metrics::Metrics>,
    endpoints: Arc<Vec<String>>,
    endpoints_meta: Arc<Vec<serde_json::Value>>,
    addr: SocketAddr,
}

impl AppState {
    pub fn new(
        relay: Arc<Relay>,
        metrics: Arc<metrics::Metrics>,
        endpoints: Arc<Vec<String>>,
        endpoints_meta: Arc<Vec<serde_json::Value>>,
        addr: SocketAddr,
    ) -> Self {
        Self {
            relay,
            metrics,
            endpoints,
            endpoints_meta,
            addr,
        }
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    pub fn metrics(&self) -> Arc<metrics::Metrics> {
        self.metrics.clone()
    }

    pub fn endpoints(&self) -> Arc<Vec<String>> {
        self.endpoints.clone()
    }

    pub fn endpoints_meta(&self) -> Arc<Vec<serde_json::Value>> {
        self.endpoints_meta.clone()
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}
