//! CLI command implementations.

mod failed;
mod send;
mod spool;

pub use failed::{failed_delete, failed_list, failed_resend, failed_show};
pub use send::send;
pub use spool::{resend_spooled, spool_list};

use crate::output::OutputFormat;
use anyhow::Result;
use relay_config_and_utils::{Config, Paths};
use std::sync::Arc;
use usage_outbox::{
    DeliveryClient, DeliveryClientConfig, LogNotifier, Notifier, ReqwestTransport, Sender,
    SenderConfig, WebhookNotifier,
};
use usage_spool::{FileSpoolStore, SpoolLock};

/// Everything a command needs, resolved once at startup.
pub struct Context {
    pub config: Config,
    pub paths: Paths,
    pub format: OutputFormat,
}

impl Context {
    pub fn new(config: Config, paths: Paths, format: OutputFormat) -> Self {
        Self {
            config,
            paths,
            format,
        }
    }

    pub fn store(&self) -> FileSpoolStore {
        FileSpoolStore::new(
            self.config.spool_dir(&self.paths),
            self.config.failed_dir(&self.paths),
        )
    }

    /// Take the spool lock for the duration of a mutating command.
    pub fn lock(&self) -> Result<SpoolLock> {
        Ok(SpoolLock::acquire(&self.config.spool_dir(&self.paths))?)
    }

    /// Build a sender from the validated configuration.
    pub fn sender(&self) -> Result<Sender> {
        self.config.validate()?;

        let transport = ReqwestTransport::new(self.config.request_timeout())?;
        let client = DeliveryClient::new(
            DeliveryClientConfig {
                base_url: self.config.api_base_url.clone(),
                api_token: self.config.api_token.clone().unwrap_or_default(),
                max_retries: self.config.max_retries,
                retry_base_delay: self.config.retry_base_delay(),
                max_retry_delay: self.config.max_retry_delay(),
            },
            Arc::new(transport),
        );

        let notifier: Arc<dyn Notifier> = match &self.config.notify_webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(url.clone())?),
            None => Arc::new(LogNotifier),
        };

        Ok(Sender::new(
            client,
            Arc::new(self.store()),
            notifier,
            SenderConfig {
                usage_path: self.config.usage_path.clone(),
                spool_max_retries: self.config.spool_max_retries,
            },
        ))
    }
}
