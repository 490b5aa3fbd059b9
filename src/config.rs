//! Connection settings of the write APIs, taken from flags or the
//! environment.

use std::time::Duration;

use clap::Args;
use url::Url;

use crate::client::{ClientConfig, RequestPolicy, RetryPolicy};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0} is not set")]
    Missing(&'static str),
}

#[derive(Args, Debug, Clone)]
pub struct ApiOpts {
    #[arg(long, env = "PRISMIC_REPOSITORY")]
    pub repository: Option<String>,
    #[arg(long, env = "PRISMIC_WRITE_API_TOKEN", hide_env_values = true)]
    pub write_token: Option<String>,
    #[arg(long, env = "PRISMIC_MIGRATION_API_KEY", hide_env_values = true)]
    pub migration_api_key: Option<String>,
    #[arg(
        long,
        env = "PRISMIC_MIGRATION_API_BASE_URL",
        default_value = "https://migration.prismic.io"
    )]
    pub migration_api_base_url: Url,
    #[arg(
        long,
        env = "PRISMIC_ASSET_API_BASE_URL",
        default_value = "https://asset-api.prismic.io"
    )]
    pub asset_api_base_url: Url,
    /// Minimum spacing between two requests to the same API.
    #[arg(long, env = "MIGRATE_REQUEST_INTERVAL_MS", default_value_t = 2500)]
    pub request_interval_ms: u64,
    #[arg(long, env = "MIGRATE_MAX_CONCURRENT", default_value_t = 1)]
    pub max_concurrent: usize,
    /// Attempts per request, the first one included.
    #[arg(long, env = "MIGRATE_MAX_ATTEMPTS", default_value_t = 3)]
    pub max_attempts: u32,
    #[arg(long, env = "MIGRATE_TIMEOUT_SECS", default_value_t = 60)]
    pub timeout_secs: u64,
}

impl ApiOpts {
    fn credentials(&self) -> Result<(String, String), Error> {
        let repository = self
            .repository
            .clone()
            .ok_or(Error::Missing("PRISMIC_REPOSITORY"))?;
        let token = self
            .write_token
            .clone()
            .ok_or(Error::Missing("PRISMIC_WRITE_API_TOKEN"))?;
        Ok((repository, token))
    }

    pub fn migration_config(&self) -> Result<ClientConfig, Error> {
        let (repository, token) = self.credentials()?;
        let api_key = self
            .migration_api_key
            .clone()
            .ok_or(Error::Missing("PRISMIC_MIGRATION_API_KEY"))?;
        Ok(ClientConfig {
            base_url: self.migration_api_base_url.clone(),
            repository,
            token,
            api_key: Some(api_key),
            timeout: Duration::from_secs(self.timeout_secs),
        })
    }

    pub fn asset_config(&self) -> Result<ClientConfig, Error> {
        let (repository, token) = self.credentials()?;
        Ok(ClientConfig {
            base_url: self.asset_api_base_url.clone(),
            repository,
            token,
            api_key: self.migration_api_key.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        })
    }

    pub fn request_policy(&self) -> RequestPolicy {
        RequestPolicy {
            interval: Duration::from_millis(self.request_interval_ms),
            max_concurrent: self.max_concurrent.max(1),
            retry: RetryPolicy {
                max_attempts: self.max_attempts.max(1),
                ..RetryPolicy::default()
            },
        }
    }
}
