//! Shalm Engine - manifest rendering for charts
//!
//! This crate provides a MiniJinja-based renderer with:
//! - Kubernetes-oriented filters (toyaml, b64encode, nindent, ...)
//! - Manifest-name glob filtering for partial apply/delete
//! - Helper templates (`_`-prefixed) that are loadable but never emitted
//! - Template errors carrying source spans for diagnostics

pub mod engine;
pub mod error;
pub mod filters;

pub use engine::{Engine, EngineBuilder, RenderResult};
pub use error::{EngineError, Result, TemplateError, TemplateErrorKind};
