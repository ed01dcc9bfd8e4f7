//! Shared application context

use crate::config::Config;
use crate::fetch::ImageFetcher;
use core_pipeline::IntakeLimits;
use llm_bridge::ModelGateway;
use std::sync::Arc;

/// State handed to every handler
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    limits: IntakeLimits,
    gateway: ModelGateway,
    fetcher: ImageFetcher,
}

impl AppState {
    pub fn new(config: Config, gateway: ModelGateway) -> anyhow::Result<Self> {
        let fetcher = ImageFetcher::new(config.url_fetch_timeout_secs)?;
        let limits = config.intake_limits();
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                limits,
                gateway,
                fetcher,
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn limits(&self) -> &IntakeLimits {
        &self.inner.limits
    }

    pub fn gateway(&self) -> &ModelGateway {
        &self.inner.gateway
    }

    pub fn fetcher(&self) -> &ImageFetcher {
        &self.inner.fetcher
    }
}
