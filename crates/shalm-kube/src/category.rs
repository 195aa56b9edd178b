//! Dependency ordering of resource kinds
//!
//! A chart's manifests arrive in template order. Before they reach the API
//! server they are sorted so that prerequisites exist first (CRDs before
//! their custom resources, namespaces before namespaced objects, config
//! before the workloads mounting it). Deletion walks the same order
//! backwards.

use kube::api::DynamicObject;

/// Resource category, in apply order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceCategory {
    /// CustomResourceDefinition
    Crd = 0,
    /// Namespace
    Namespace = 1,
    /// ResourceQuota, LimitRange
    NamespaceConfig = 2,
    /// ClusterRole, ClusterRoleBinding
    ClusterRbac = 10,
    /// Role, RoleBinding, ServiceAccount
    NamespacedRbac = 11,
    /// ConfigMap, Secret
    Config = 20,
    /// PersistentVolume, PersistentVolumeClaim, StorageClass
    Storage = 21,
    /// NetworkPolicy, Service, Endpoints, Ingress
    Network = 30,
    /// Deployment, StatefulSet, DaemonSet, ReplicaSet, Pod
    Workload = 40,
    /// Job, CronJob
    Batch = 50,
    /// HorizontalPodAutoscaler, PodDisruptionBudget
    Autoscaling = 60,
    /// Instances of custom resource definitions
    CustomResource = 70,
    /// Everything else
    Other = 100,
}

const CORE_GROUPS: &[&str] = &[
    "",
    "apps",
    "batch",
    "autoscaling",
    "policy",
    "networking.k8s.io",
    "rbac.authorization.k8s.io",
    "storage.k8s.io",
    "admissionregistration.k8s.io",
    "apiextensions.k8s.io",
    "certificates.k8s.io",
    "coordination.k8s.io",
    "discovery.k8s.io",
    "events.k8s.io",
    "flowcontrol.apiserver.k8s.io",
    "node.k8s.io",
    "scheduling.k8s.io",
];

impl ResourceCategory {
    /// Categorize a resource by its kind and apiVersion
    pub fn from_resource(kind: &str, api_version: &str) -> Self {
        match kind {
            "CustomResourceDefinition" => Self::Crd,
            "Namespace" => Self::Namespace,
            "ResourceQuota" | "LimitRange" => Self::NamespaceConfig,
            "ClusterRole" | "ClusterRoleBinding" => Self::ClusterRbac,
            "Role" | "RoleBinding" | "ServiceAccount" => Self::NamespacedRbac,
            "ConfigMap" | "Secret" => Self::Config,
            "PersistentVolume" | "PersistentVolumeClaim" | "StorageClass" => Self::Storage,
            "NetworkPolicy" | "Service" | "Endpoints" | "Ingress" | "IngressClass" => Self::Network,
            "Deployment" | "StatefulSet" | "DaemonSet" | "ReplicaSet" | "Pod" => Self::Workload,
            "Job" | "CronJob" => Self::Batch,
            "HorizontalPodAutoscaler" | "PodDisruptionBudget" => Self::Autoscaling,
            _ if Self::is_custom_api_version(api_version) => Self::CustomResource,
            _ => Self::Other,
        }
    }

    /// Categorize a decoded object
    pub fn of(obj: &DynamicObject) -> Self {
        match &obj.types {
            Some(types) => Self::from_resource(&types.kind, &types.api_version),
            None => Self::Other,
        }
    }

    /// Check if an apiVersion belongs to a non-builtin API group
    pub fn is_custom_api_version(api_version: &str) -> bool {
        let group = api_version.rsplit_once('/').map(|(g, _)| g).unwrap_or("");
        !CORE_GROUPS.contains(&group)
    }
}

/// Stable sort into apply order
pub fn sort_for_apply(objects: &mut [DynamicObject]) {
    objects.sort_by_key(ResourceCategory::of);
}

/// Stable sort into delete order (reverse of apply order)
pub fn sort_for_delete(objects: &mut [DynamicObject]) {
    objects.sort_by_key(|obj| std::cmp::Reverse(ResourceCategory::of(obj)));
}
