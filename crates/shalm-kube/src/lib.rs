//! Shalm Kube - cluster integration for charts
//!
//! This crate provides:
//! - The [`K8s`] cluster client contract used by chart apply/delete
//! - [`KubeClient`], a kube-rs implementation using server-side apply
//! - [`Vault`], persisting managed secrets as `Opaque` cluster secrets
//! - [`MockK8s`], an in-memory recording client for tests
//! - Manifest stream decoding and dependency-aware resource ordering

pub mod category;
pub mod client;
pub mod error;
pub mod k8s;
pub mod manifest;
pub mod mock;
pub mod vault;

pub use category::ResourceCategory;
pub use client::{KubeClient, KubeClientConfig};
pub use error::{KubeError, Result};
pub use k8s::{K8s, K8sOptions};
pub use manifest::{object_ref, parse_manifests};
pub use mock::{MockK8s, MockOperation, OperationKind};
pub use vault::{K8sVault, SecretData, Vault};

pub use kube::api::DynamicObject;
