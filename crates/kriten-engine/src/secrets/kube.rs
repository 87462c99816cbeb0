//! Secret store backed by Kubernetes Secrets.

use ::kube::api::{DeleteParams, PostParams};
use ::kube::{Api, Client};
use async_trait::async_trait;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::SecretStore;
use crate::catalog::{Record, WriteOp};
use crate::error::{Error, Result};
use crate::k8s::{is_kube_not_found, map_kube_error};

const RESOURCE: &str = "secret";

/// [`SecretStore`] over opaque Secrets.
#[derive(Clone)]
pub struct KubeSecretStore {
    api: Api<Secret>,
}

impl std::fmt::Debug for KubeSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSecretStore").finish_non_exhaustive()
    }
}

impl KubeSecretStore {
    /// Creates a store for Secrets in `namespace`.
    #[must_use]
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }
}

fn decode(name: &str, secret: Secret) -> Result<Record> {
    let mut record = Record::new();
    for (key, ByteString(bytes)) in secret.data.unwrap_or_default() {
        let value = String::from_utf8(bytes).map_err(|_| Error::Serialization {
            message: format!("secret {name} key {key} is not valid UTF-8"),
        })?;
        record.insert(key, value);
    }
    if let Some(string_data) = secret.string_data {
        record.extend(string_data);
    }
    Ok(record)
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn get(&self, name: &str) -> Result<Option<Record>> {
        let found = self
            .api
            .get_opt(name)
            .await
            .map_err(|e| map_kube_error(e, RESOURCE, name))?;
        found.map(|secret| decode(name, secret)).transpose()
    }

    async fn put(&self, name: &str, data: Record, op: WriteOp) -> Result<()> {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..ObjectMeta::default()
            },
            type_: Some("Opaque".to_string()),
            string_data: Some(data),
            ..Secret::default()
        };
        let params = PostParams::default();
        match op {
            WriteOp::Create => self.api.create(&params, &secret).await,
            WriteOp::Update => self.api.replace(name, &params, &secret).await,
        }
        .map_err(|e| map_kube_error(e, RESOURCE, name))?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        match self.api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(err) if is_kube_not_found(&err) => Ok(()),
            Err(err) => Err(map_kube_error(err, RESOURCE, name)),
        }
    }
}
