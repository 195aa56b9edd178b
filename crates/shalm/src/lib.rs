//! Shalm - composable Kubernetes charts with managed secrets
//!
//! A [`Chart`] is a dynamically typed object: reserved attributes (`name`,
//! `namespace`, `__class__`), a value mapping that may hold nested charts
//! and [`Jewel`]s, and a table of hook methods. Applying a chart walks its
//! sub-charts first, then renders and applies its own manifests. Deleting
//! removes its own manifests first, then releases its jewels, then tears
//! down its sub-charts.
//!
//! Jewels are managed secrets. Their payload is read from the cluster when
//! a secret of the same name already exists, otherwise generated once by a
//! [`JewelBackend`], and persisted through the [`shalm_kube::Vault`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use shalm::{Chart, ChartOptions};
//! use shalm_core::ChartSource;
//! use shalm_kube::{KubeClient, KubeClientConfig};
//!
//! # async fn run() -> shalm::Result<()> {
//! let source = ChartSource::load("charts/mariadb")?;
//! let chart = Chart::from_source(source, ChartOptions::new("databases"))?;
//! let k8s = Arc::new(KubeClient::new(KubeClientConfig::default()).await?);
//! chart.apply(k8s).await?;
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod callable;
pub mod chart;
pub mod error;
pub mod jewel;
pub mod merge;
pub mod template;
pub mod value;

pub use callable::{Args, Builtin, Callable};
pub use chart::{Chart, ChartBuilder, ChartClass, ChartOptions};
pub use error::{Result, ShalmError};
pub use jewel::{ComplexJewelBackend, Jewel, JewelBackend, JewelState};
pub use merge::merge;
pub use template::RenderMode;
pub use value::{Dict, K8sValue, Value};
