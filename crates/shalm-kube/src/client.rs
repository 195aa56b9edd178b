//! kube-rs backed cluster client
//!
//! Objects are applied with Server-Side Apply under a fixed field manager
//! and force enabled, so repeated installs of the same chart converge
//! without conflicts. Kinds are resolved through API discovery, which is
//! run once when the client is created.

use async_trait::async_trait;
use kube::{
    Client,
    api::{Api, DeleteParams, DynamicObject, Patch, PatchParams, PropagationPolicy},
    core::{GroupVersionKind, TypeMeta},
    discovery::{ApiCapabilities, ApiResource, Discovery, Scope},
};
use std::future::Future;
use std::time::Duration;

use crate::category::{sort_for_apply, sort_for_delete};
use crate::error::{KubeError, Result};
use crate::k8s::{K8s, K8sOptions};
use crate::manifest::object_ref;

/// Field manager name for Server-Side Apply
const FIELD_MANAGER: &str = "shalm";

/// Settings for [`KubeClient`]
#[derive(Debug, Clone)]
pub struct KubeClientConfig {
    /// Server-Side Apply field manager
    pub field_manager: String,

    /// Namespace for namespaced objects that carry none
    pub default_namespace: String,

    /// Validate against the API server without persisting
    pub dry_run: bool,
}

impl Default for KubeClientConfig {
    fn default() -> Self {
        Self {
            field_manager: FIELD_MANAGER.to_string(),
            default_namespace: "default".to_string(),
            dry_run: false,
        }
    }
}

/// Cluster client talking to a live API server
pub struct KubeClient {
    client: Client,
    discovery: Discovery,
    config: KubeClientConfig,
}

impl KubeClient {
    /// Connect using the ambient kubeconfig or in-cluster configuration
    pub async fn new(config: KubeClientConfig) -> Result<Self> {
        let client = Client::try_default().await?;
        Self::with_client(client, config).await
    }

    /// Wrap an existing client and run discovery
    pub async fn with_client(client: Client, config: KubeClientConfig) -> Result<Self> {
        let discovery = Discovery::new(client.clone()).run().await?;
        Ok(Self {
            client,
            discovery,
            config,
        })
    }

    /// Refresh discovery cache (call after CRD changes)
    pub async fn refresh_discovery(&mut self) -> Result<()> {
        self.discovery = Discovery::new(self.client.clone()).run().await?;
        Ok(())
    }

    /// Resolve a kind given by name (`Secret`, `secret` or `secrets`)
    fn resolve_kind(&self, kind: &str) -> Result<(ApiResource, ApiCapabilities)> {
        for group in self.discovery.groups() {
            for (resource, capabilities) in group.recommended_resources() {
                if resource.kind.eq_ignore_ascii_case(kind)
                    || resource.plural.eq_ignore_ascii_case(kind)
                {
                    return Ok((resource, capabilities));
                }
            }
        }
        Err(KubeError::UnknownKind(kind.to_string()))
    }

    /// Resolve the API resource of a decoded object
    fn resolve_object(&self, obj: &DynamicObject) -> Result<(ApiResource, ApiCapabilities)> {
        let types = obj.types.as_ref().ok_or_else(|| {
            KubeError::InvalidManifest(format!("{} has no apiVersion or kind", object_ref(obj)))
        })?;
        let gvk = gvk_from_type_meta(types);
        self.discovery
            .resolve_gvk(&gvk)
            .ok_or_else(|| KubeError::UnknownKind(format!("{}/{}", types.api_version, types.kind)))
    }

    fn api(
        &self,
        resource: &ApiResource,
        capabilities: &ApiCapabilities,
        namespace: &str,
    ) -> Api<DynamicObject> {
        if capabilities.scope == Scope::Namespaced {
            Api::namespaced_with(self.client.clone(), namespace, resource)
        } else {
            Api::all_with(self.client.clone(), resource)
        }
    }

    async fn apply_one(&self, mut obj: DynamicObject, options: &K8sOptions) -> Result<()> {
        let (resource, capabilities) = self.resolve_object(&obj)?;
        let name = obj
            .metadata
            .name
            .clone()
            .ok_or_else(|| KubeError::InvalidManifest(format!("{} has no name", object_ref(&obj))))?;

        let namespace = options.effective_namespace(&obj, &self.config.default_namespace);
        if capabilities.scope == Scope::Namespaced {
            obj.metadata.namespace = Some(namespace.clone());
        }

        let mut params = PatchParams::apply(&self.config.field_manager).force();
        params.dry_run = self.config.dry_run;

        let api = self.api(&resource, &capabilities, &namespace);
        api.patch(&name, &params, &Patch::Apply(&obj))
            .await
            .map_err(|e| KubeError::OperationFailed {
                operation: format!("apply {}", object_ref(&obj)),
                message: e.to_string(),
            })?;

        tracing::debug!(object = %object_ref(&obj), namespace = %namespace, "applied");
        Ok(())
    }

    async fn delete_one(&self, obj: DynamicObject, options: &K8sOptions) -> Result<()> {
        let (resource, capabilities) = self.resolve_object(&obj)?;
        let name = obj
            .metadata
            .name
            .clone()
            .ok_or_else(|| KubeError::InvalidManifest(format!("{} has no name", object_ref(&obj))))?;

        let namespace = options.effective_namespace(&obj, &self.config.default_namespace);
        let params = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Background),
            dry_run: self.config.dry_run,
            ..Default::default()
        };

        let api = self.api(&resource, &capabilities, &namespace);
        match api.delete(&name, &params).await {
            Ok(_) => {
                tracing::debug!(object = %object_ref(&obj), namespace = %namespace, "deleted");
                Ok(())
            }
            Err(kube::Error::Api(resp)) if resp.code == 404 && options.ignore_not_found => {
                tracing::debug!(object = %object_ref(&obj), "already absent");
                Ok(())
            }
            Err(e) => Err(KubeError::Api(e)),
        }
    }
}

#[async_trait]
impl K8s for KubeClient {
    async fn get(&self, kind: &str, name: &str, options: &K8sOptions) -> Result<DynamicObject> {
        let (resource, capabilities) = self.resolve_kind(kind)?;
        let namespace = options
            .namespace
            .clone()
            .unwrap_or_else(|| self.config.default_namespace.clone());
        let api = self.api(&resource, &capabilities, &namespace);

        with_timeout(options.timeout_duration(), async {
            api.get(name).await.map_err(KubeError::Api)
        })
        .await
    }

    async fn apply(&self, mut objects: Vec<DynamicObject>, options: &K8sOptions) -> Result<()> {
        sort_for_apply(&mut objects);
        with_timeout(options.timeout_duration(), async {
            for obj in objects {
                self.apply_one(obj, options).await?;
            }
            Ok(())
        })
        .await
    }

    async fn delete(&self, mut objects: Vec<DynamicObject>, options: &K8sOptions) -> Result<()> {
        sort_for_delete(&mut objects);
        with_timeout(options.timeout_duration(), async {
            for obj in objects {
                self.delete_one(obj, options).await?;
            }
            Ok(())
        })
        .await
    }

    fn progress(&self, percent: u8) {
        tracing::info!(percent, "progress");
    }
}

async fn with_timeout<T>(
    timeout: Option<Duration>,
    operation: impl Future<Output = Result<T>>,
) -> Result<T> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, operation)
            .await
            .map_err(|_| KubeError::Timeout(format!("{}s", limit.as_secs())))?,
        None => operation.await,
    }
}

/// Convert TypeMeta to GroupVersionKind
///
/// - "apps/v1" -> group="apps", version="v1"
/// - "v1" -> group="", version="v1" (core API)
fn gvk_from_type_meta(tm: &TypeMeta) -> GroupVersionKind {
    let (group, version) = match tm.api_version.rsplit_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), tm.api_version.clone()),
    };

    GroupVersionKind {
        group,
        version,
        kind: tm.kind.clone(),
    }
}
