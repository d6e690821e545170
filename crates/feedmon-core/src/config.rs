use crate::feed::FeedEndpoint;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config file found at {path}: {source}")]
    Missing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed configuration file: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("configuration lists no feeds")]
    NoFeeds,
    #[error("feed {index} has an empty websocket_host")]
    EmptyHost { index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedsConfig {
    pub hosts: Vec<FeedEndpoint>,
}

impl FeedsConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Missing {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let config: FeedsConfig = serde_json::from_str(raw)?;
        if config.hosts.is_empty() {
            return Err(ConfigError::NoFeeds);
        }
        if let Some(index) = config
            .hosts
            .iter()
            .position(|endpoint| endpoint.host.trim().is_empty())
        {
            return Err(ConfigError::EmptyHost { index });
        }
        Ok(config)
    }

    pub fn endpoints(&self) -> Vec<Arc<FeedEndpoint>> {
        self.hosts.iter().cloned().map(Arc::new).collect()
    }
}
