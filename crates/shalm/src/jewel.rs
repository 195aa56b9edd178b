//! Managed secrets
//!
//! A [`Jewel`] wraps a [`JewelBackend`] and a secret name. Its payload is
//! produced lazily: the first field access either lets the backend complete
//! a payload previously read from the vault, or generates a fresh one.
//! Subsequent accesses reuse the same payload.
//!
//! ```text
//! Init ──read (secret exists)──▶ Loaded ──ensure──▶ Ready
//!   └────────────────ensure───────────────────────────▲
//! ```

use indexmap::IndexMap;
use shalm_kube::{SecretData, Vault};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Result, ShalmError};
use crate::value::Value;

/// Generator for a jewel's payload
pub trait JewelBackend: Send + Sync {
    /// Backend name, also the jewel's type name
    fn name(&self) -> &str;

    /// Exposed field names mapped to payload keys
    fn keys(&self) -> IndexMap<String, String>;

    /// Complete an existing payload, keeping what is already there
    fn apply(&self, existing: &SecretData) -> Result<SecretData>;

    /// Extra capabilities, if the backend has them
    fn complex(&self) -> Option<&dyn ComplexJewelBackend> {
        None
    }
}

/// Backends generating from a template and owning external state
pub trait ComplexJewelBackend: Send + Sync {
    /// Generate a payload from scratch
    fn template(&self) -> Result<SecretData>;

    /// Clean up external state
    fn delete(&self) -> Result<()>;
}

/// Lifecycle state of a jewel within one apply cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JewelState {
    /// Nothing read or generated yet
    Init,
    /// Payload read from the vault, not yet completed by the backend
    Loaded,
    /// Payload final
    Ready,
}

#[derive(Debug)]
struct JewelInner {
    state: JewelState,
    data: SecretData,
}

/// A managed secret
pub struct Jewel {
    backend: Arc<dyn JewelBackend>,
    name: String,
    inner: Mutex<JewelInner>,
}

impl Jewel {
    pub fn new(backend: Arc<dyn JewelBackend>, name: impl Into<String>) -> Self {
        Self {
            backend,
            name: name.into(),
            inner: Mutex::new(JewelInner {
                state: JewelState::Init,
                data: SecretData::new(),
            }),
        }
    }

    /// Secret name in the cluster
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> &dyn JewelBackend {
        self.backend.as_ref()
    }

    pub fn state(&self) -> JewelState {
        self.lock().state
    }

    /// Current payload
    pub fn data(&self) -> SecretData {
        self.lock().data.clone()
    }

    fn lock(&self) -> MutexGuard<'_, JewelInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load a previously stored payload
    ///
    /// Only a jewel in `Init` reads. A missing secret leaves it in `Init`
    /// without error; any other vault failure is returned.
    pub async fn read(&self, vault: &dyn Vault) -> Result<()> {
        if self.state() != JewelState::Init {
            return Ok(());
        }

        match vault.read(&self.name).await {
            Ok(data) => {
                let mut inner = self.lock();
                inner.data = data;
                inner.state = JewelState::Loaded;
                tracing::debug!(jewel = %self.name, "loaded stored secret");
                Ok(())
            }
            Err(e) if vault.is_not_exist(&e) => {
                tracing::debug!(jewel = %self.name, "no stored secret");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Produce the final payload, once
    pub fn ensure(&self) -> Result<()> {
        let mut inner = self.lock();
        let data = match inner.state {
            JewelState::Ready => return Ok(()),
            JewelState::Loaded => self.backend.apply(&inner.data)?,
            JewelState::Init => match self.backend.complex() {
                Some(complex) => complex.template()?,
                None => self.backend.apply(&SecretData::new())?,
            },
        };
        tracing::debug!(jewel = %self.name, from = ?inner.state, "jewel ready");
        inner.data = data;
        inner.state = JewelState::Ready;
        Ok(())
    }

    /// Text of a field, generating the payload first
    pub fn field(&self, name: &str) -> Result<String> {
        let key = self.payload_key(name)?;
        self.ensure()?;
        Ok(decode(self.lock().data.get(&key)))
    }

    /// Text of a field as currently held, without generating anything
    pub fn peek(&self, name: &str) -> Result<String> {
        if name == "name" {
            return Ok(self.name.clone());
        }
        let key = self.payload_key(name)?;
        Ok(decode(self.lock().data.get(&key)))
    }

    fn payload_key(&self, name: &str) -> Result<String> {
        self.backend
            .keys()
            .get(name)
            .cloned()
            .ok_or_else(|| ShalmError::NoSuchAttr {
                owner: self.backend.name().to_string(),
                attr: name.to_string(),
            })
    }

    /// Attribute read
    pub fn attr(&self, name: &str) -> Result<Value> {
        if name == "name" {
            return Ok(Value::String(self.name.clone()));
        }
        self.field(name).map(Value::String)
    }

    pub fn attr_names(&self) -> Vec<String> {
        let mut names = vec!["name".to_string()];
        names.extend(self.backend.keys().into_keys());
        names
    }

    /// Every exposed field, generating the payload first
    pub fn template_values(&self) -> Result<IndexMap<String, String>> {
        self.ensure()?;
        let inner = self.lock();
        Ok(self
            .backend
            .keys()
            .into_iter()
            .map(|(field, key)| (field, decode(inner.data.get(&key))))
            .collect())
    }

    /// Persist the payload
    pub async fn write(&self, vault: &dyn Vault) -> Result<()> {
        let data = self.data();
        vault.write(&self.name, &data).await?;
        Ok(())
    }

    /// Release external state and the stored secret
    pub async fn delete(&self, vault: &dyn Vault) -> Result<()> {
        if let Some(complex) = self.backend.complex() {
            complex.delete()?;
        }
        vault.delete(&self.name).await?;
        tracing::debug!(jewel = %self.name, "released");
        Ok(())
    }
}

fn decode(bytes: Option<&Vec<u8>>) -> String {
    bytes
        .map(|b| String::from_utf8_lossy(b).into_owned())
        .unwrap_or_default()
}

impl fmt::Display for Jewel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(name = {})", self.backend.name(), self.name)
    }
}

impl fmt::Debug for Jewel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jewel")
            .field("backend", &self.backend.name())
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}
