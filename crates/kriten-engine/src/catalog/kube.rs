//! Catalog store backed by ConfigMaps.

use ::kube::api::{DeleteParams, ListParams, PostParams};
use ::kube::{Api, Client};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::{ConfigStore, Record, WriteOp};
use crate::error::Result;
use crate::k8s::map_kube_error;

const RESOURCE: &str = "config";

/// [`ConfigStore`] that keeps each record in a ConfigMap's `data`.
#[derive(Clone)]
pub struct ConfigMapStore {
    api: Api<ConfigMap>,
}

impl std::fmt::Debug for ConfigMapStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigMapStore").finish_non_exhaustive()
    }
}

impl ConfigMapStore {
    /// Creates a store for ConfigMaps in `namespace`.
    #[must_use]
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }
}

#[async_trait]
impl ConfigStore for ConfigMapStore {
    async fn get(&self, name: &str) -> Result<Option<Record>> {
        let found = self
            .api
            .get_opt(name)
            .await
            .map_err(|e| map_kube_error(e, RESOURCE, name))?;
        Ok(found.map(|cm| cm.data.unwrap_or_default()))
    }

    async fn list(&self) -> Result<Vec<(String, Record)>> {
        let list = self
            .api
            .list(&ListParams::default())
            .await
            .map_err(|e| map_kube_error(e, RESOURCE, "*"))?;
        let mut records: Vec<_> = list
            .items
            .into_iter()
            .filter_map(|cm| Some((cm.metadata.name?, cm.data.unwrap_or_default())))
            .collect();
        records.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(records)
    }

    async fn put(&self, name: &str, data: Record, op: WriteOp) -> Result<Record> {
        let config_map = ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..ObjectMeta::default()
            },
            data: Some(data),
            ..ConfigMap::default()
        };
        let params = PostParams::default();
        let stored = match op {
            WriteOp::Create => self.api.create(&params, &config_map).await,
            WriteOp::Update => self.api.replace(name, &params, &config_map).await,
        }
        .map_err(|e| map_kube_error(e, RESOURCE, name))?;
        Ok(stored.data.unwrap_or_default())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.api
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| map_kube_error(e, RESOURCE, name))?;
        Ok(())
    }
}
