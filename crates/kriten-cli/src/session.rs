//! Connection to a live cluster.

use std::sync::Arc;

use anyhow::{Context, Result};

use kriten_core::{AllowAll, Authorization, AuthorizedIds, Principal, ResourceKind, TracingAuditSink};
use kriten_engine::KritenService;
use kriten_engine::catalog::kube::ConfigMapStore;
use kriten_engine::config::EngineConfig;
use kriten_engine::secrets::kube::KubeSecretStore;
use kriten_engine::workload::WorkloadApi;
use kriten_engine::workload::kube::KubeWorkloads;

use crate::Config;

/// Provider recorded on audit events emitted by the CLI.
pub const CLI_PROVIDER: &str = "cli";

/// An engine service bound to the caller's cluster credentials.
pub struct Session {
    /// Engine configuration in effect.
    pub engine: EngineConfig,
    /// Service over the cluster-backed stores.
    pub service: KritenService,
    /// Orchestrator handle, for waits outside the service.
    pub workloads: Arc<dyn WorkloadApi>,
    /// Principal performing mutations.
    pub principal: Principal,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("namespace", &self.engine.namespace)
            .field("principal", &self.principal)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Resolves the engine configuration for `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if a `KRITEN_*` variable is malformed or the
    /// namespace override is blank.
    pub fn engine_config(config: &Config) -> Result<EngineConfig> {
        let mut engine = EngineConfig::from_env().context("invalid KRITEN_* environment")?;
        if let Some(namespace) = &config.namespace {
            engine = engine.with_namespace(namespace.clone());
        }
        engine.validate().context("invalid namespace")?;
        Ok(engine)
    }

    /// Connects to the cluster named by the current kubeconfig context.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or no cluster
    /// credentials can be found.
    pub async fn connect(config: &Config) -> Result<Self> {
        let engine = Self::engine_config(config)?;
        let client = kube::Client::try_default()
            .await
            .context("failed to load cluster credentials")?;
        tracing::debug!(namespace = %engine.namespace, "connected to cluster");

        let workloads: Arc<dyn WorkloadApi> =
            Arc::new(KubeWorkloads::new(client.clone(), &engine.namespace));
        let service = KritenService::new(
            Arc::new(ConfigMapStore::new(client.clone(), &engine.namespace)),
            Arc::new(KubeSecretStore::new(client, &engine.namespace)),
            Arc::clone(&workloads),
            Arc::new(TracingAuditSink),
            &engine,
        );

        Ok(Self {
            engine,
            service,
            workloads,
            principal: Principal::new(config.user.clone(), CLI_PROVIDER),
        })
    }

    /// Returns the ids of `kind` visible to the session principal.
    ///
    /// # Errors
    ///
    /// Returns an error if the authorization lookup fails.
    pub async fn visible(&self, kind: ResourceKind) -> Result<AuthorizedIds> {
        Ok(AllowAll.authorized_ids(&self.principal, kind).await?)
    }
}
