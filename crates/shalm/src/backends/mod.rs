//! Built-in jewel backends

pub mod user_credential;

pub use user_credential::{SecretCharset, UserCredential};
