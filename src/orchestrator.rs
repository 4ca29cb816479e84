//! The staged launch pipeline
//!
//! One pass per process: fetch the binary, write its configuration, spawn
//! it, publish the connection descriptor, notify the aggregator. Stages up
//! to and including the spawn abort the pipeline on failure; everything
//! after degrades to fallback values. The pipeline owns every moving part
//! explicitly; there is no module-level state.

use crate::artifact::{self, Arch, ArtifactSource};
use crate::config::Config;
use crate::error::LaunchError;
use crate::identity::{ConnectionDescriptor, IdentityResolver};
use crate::relay::{KeepalivePinger, UploadRelay};
use crate::server::PublishedSubscription;
use crate::supervisor::{Supervisor, CLEANUP_DELAY};
use crate::timer::OneShot;
use crate::worker::WorkerConfig;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Stages of one launch run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Fetching,
    Configuring,
    Launching,
    PublishingIdentity,
    Relaying,
    /// Worker running, subscription served, artifacts still on disk
    SteadyState,
    /// Delayed cleanup has fired; binary and configuration removed
    Cleaned,
    /// A stage before identity publishing failed; the run is over
    Failed,
}

/// Owns every moving part of a single launch run
pub struct Orchestrator {
    config: Config,
    client: reqwest::Client,
    source: ArtifactSource,
    resolver: IdentityResolver,
    published: PublishedSubscription,
    arch_label: Option<String>,
    keepalive_endpoint: Option<String>,
    cleanup_delay: Duration,
    stage: Arc<RwLock<Stage>>,
    cleanup: Option<OneShot>,
}

impl Orchestrator {
    pub fn new(config: Config, published: PublishedSubscription) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            config,
            client,
            source: ArtifactSource::default(),
            resolver: IdentityResolver::default(),
            published,
            arch_label: None,
            keepalive_endpoint: None,
            cleanup_delay: CLEANUP_DELAY,
            stage: Arc::new(RwLock::new(Stage::Idle)),
            cleanup: None,
        }
    }

    /// Override the artifact download locations
    pub fn with_artifact_source(mut self, source: ArtifactSource) -> Self {
        self.source = source;
        self
    }

    /// Override the identity discovery endpoints
    pub fn with_identity_resolver(mut self, resolver: IdentityResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Override the detected processor label
    pub fn with_arch_label(mut self, label: impl Into<String>) -> Self {
        self.arch_label = Some(label.into());
        self
    }

    /// Override the keepalive endpoint
    pub fn with_keepalive_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.keepalive_endpoint = Some(endpoint.into());
        self
    }

    /// Override the delay before launch artifacts are removed
    pub fn with_cleanup_delay(mut self, delay: Duration) -> Self {
        self.cleanup_delay = delay;
        self
    }

    /// Current pipeline stage
    pub fn stage(&self) -> Stage {
        *self.stage.read()
    }

    /// Handle to the scheduled artifact cleanup, once launched
    pub fn cleanup_timer(&self) -> Option<&OneShot> {
        self.cleanup.as_ref()
    }

    /// Drive the pipeline to its settled stage.
    ///
    /// Returns `SteadyState` on success and `Failed` when a startup stage
    /// errored; either way the HTTP front stays up.
    pub async fn run(&mut self) -> Stage {
        if let Err(e) = self.launch().await {
            error!(error = %e, class = ?e.class(), "Launch pipeline failed");
            self.set_stage(Stage::Failed);
        }
        self.stage()
    }

    async fn launch(&mut self) -> Result<(), LaunchError> {
        let supervisor = Supervisor::new(&self.config);

        match std::fs::create_dir_all(&self.config.work_dir) {
            Ok(()) => debug!(path = %self.config.work_dir.display(), "Working directory ready"),
            // Not failing here: the fetch stage will surface the real error
            Err(e) => warn!(path = %self.config.work_dir.display(), error = %e, "Failed to create working directory"),
        }

        self.set_stage(Stage::Fetching);
        let arch = match &self.arch_label {
            Some(label) => Arch::resolve(label)?,
            None => Arch::host()?,
        };
        supervisor.remove_stale();
        let url = self.source.url_for(arch).to_string();
        artifact::fetch(&self.client, &url, &self.config.binary_path()).await?;

        self.set_stage(Stage::Configuring);
        WorkerConfig::socks5(&self.config.worker).write(&self.config.worker_config_path())?;

        self.set_stage(Stage::Launching);
        supervisor.spawn_worker().await?;

        let stage = Arc::clone(&self.stage);
        self.cleanup = Some(supervisor.schedule_cleanup(self.cleanup_delay, move || {
            *stage.write() = Stage::Cleaned;
        }));

        self.set_stage(Stage::PublishingIdentity);
        let ip = self.resolver.public_ip(&self.client).await;
        let isp = self.resolver.isp_label(&self.client).await;
        let descriptor = ConnectionDescriptor::socks5(&self.config.worker, &ip, &isp);
        if let Err(e) = descriptor.persist(&self.config.sub_file_path()) {
            warn!(error = %e, "Failed to persist subscription file");
        }
        self.published.publish(descriptor.encoded());
        info!(route = %self.config.subscription_route(), "Subscription published");

        self.set_stage(Stage::Relaying);
        let relay = UploadRelay::new(self.client.clone(), &self.config);
        if let Err(e) = relay.upload(&descriptor).await {
            warn!(error = %e, "Upload relay failed");
        }

        // Keepalive is detached from the pipeline; its outcome only shows
        // up in the logs
        let mut pinger = KeepalivePinger::new(self.client.clone(), &self.config);
        if let Some(endpoint) = &self.keepalive_endpoint {
            pinger = pinger.with_endpoint(endpoint.clone());
        }
        tokio::spawn(async move {
            if let Err(e) = pinger.ping().await {
                warn!(error = %e, "Keepalive registration failed");
            }
        });

        self.set_stage(Stage::SteadyState);
        Ok(())
    }

    fn set_stage(&self, stage: Stage) {
        debug!(?stage, "Pipeline stage");
        *self.stage.write() = stage;
    }
}
