//! `user_credential` backend
//!
//! Exposes `username` and `password`. Missing fields are generated, fields
//! already present in the stored payload are never rotated.

use indexmap::IndexMap;
use rand::Rng;
use shalm_kube::SecretData;
use std::sync::Arc;

use crate::callable::{Args, Builtin};
use crate::error::{Result, ShalmError};
use crate::jewel::{Jewel, JewelBackend};
use crate::value::Value;

const USERNAME_KEY: &str = "username";
const PASSWORD_KEY: &str = "password";

/// Longest value `user_credential` generates
pub const MAX_LENGTH: usize = 4096;

/// Character sets for secret generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecretCharset {
    /// a-zA-Z0-9 (default)
    #[default]
    Alphanumeric,
    /// a-zA-Z
    Alpha,
    /// 0-9
    Numeric,
    /// 0-9a-f
    Hex,
    /// a-zA-Z0-9-_ (URL safe)
    UrlSafe,
}

impl SecretCharset {
    /// Get the character set as bytes
    pub const fn chars(&self) -> &'static [u8] {
        match self {
            Self::Alphanumeric => b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789",
            Self::Alpha => b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ",
            Self::Numeric => b"0123456789",
            Self::Hex => b"0123456789abcdef",
            Self::UrlSafe => b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_",
        }
    }

    /// Parse charset from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "alphanumeric" | "alnum" => Some(Self::Alphanumeric),
            "alpha" => Some(Self::Alpha),
            "numeric" | "num" | "digits" => Some(Self::Numeric),
            "hex" => Some(Self::Hex),
            "urlsafe" | "url" => Some(Self::UrlSafe),
            _ => None,
        }
    }

    /// Random string of `length` characters from this set
    pub fn generate(&self, length: usize) -> String {
        let chars = self.chars();
        let mut rng = rand::rng();
        (0..length)
            .map(|_| chars[rng.random_range(0..chars.len())] as char)
            .collect()
    }
}

/// Username/password pair
#[derive(Debug, Clone)]
pub struct UserCredential {
    username: Option<String>,
    length: usize,
    charset: SecretCharset,
}

impl Default for UserCredential {
    fn default() -> Self {
        Self {
            username: None,
            length: 16,
            charset: SecretCharset::Alphanumeric,
        }
    }
}

impl UserCredential {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed username instead of a generated one
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Length of generated values
    pub fn length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }

    pub fn charset(mut self, charset: SecretCharset) -> Self {
        self.charset = charset;
        self
    }

    /// Script constructor: `user_credential(name, username=, length=, charset=)`
    pub fn constructor() -> Builtin {
        Builtin::new("user_credential", |args: Args| async move {
            const FN: &str = "user_credential";
            let name = args
                .string(FN, 0, "name")?
                .ok_or_else(|| ShalmError::invalid_argument(FN, "missing argument for name"))?;

            let mut backend = UserCredential::new();
            if let Some(username) = args.string(FN, 1, "username")? {
                backend = backend.username(username);
            }
            match args.get(FN, 2, "length")? {
                None | Some(Value::None) => {}
                Some(Value::Int(n)) => {
                    let length = usize::try_from(n)
                        .ok()
                        .filter(|len| (1..=MAX_LENGTH).contains(len))
                        .ok_or_else(|| {
                            ShalmError::invalid_argument(
                                FN,
                                format!("length must be between 1 and {}, got {}", MAX_LENGTH, n),
                            )
                        })?;
                    backend = backend.length(length);
                }
                Some(other) => {
                    return Err(ShalmError::invalid_argument(
                        FN,
                        format!("length must be an int, got {}", other.type_name()),
                    ));
                }
            }
            if let Some(charset) = args.string(FN, 3, "charset")? {
                let parsed = SecretCharset::parse(&charset).ok_or_else(|| {
                    ShalmError::invalid_argument(FN, format!("unknown charset '{}'", charset))
                })?;
                backend = backend.charset(parsed);
            }

            Ok(Value::Jewel(Arc::new(Jewel::new(Arc::new(backend), name))))
        })
    }
}

impl JewelBackend for UserCredential {
    fn name(&self) -> &str {
        "user_credential"
    }

    fn keys(&self) -> IndexMap<String, String> {
        IndexMap::from([
            (USERNAME_KEY.to_string(), USERNAME_KEY.to_string()),
            (PASSWORD_KEY.to_string(), PASSWORD_KEY.to_string()),
        ])
    }

    fn apply(&self, existing: &SecretData) -> Result<SecretData> {
        if !(1..=MAX_LENGTH).contains(&self.length) {
            return Err(ShalmError::Backend {
                backend: self.name().to_string(),
                message: format!("length must be between 1 and {}, got {}", MAX_LENGTH, self.length),
            });
        }
        let mut data = existing.clone();
        data.entry(USERNAME_KEY.to_string()).or_insert_with(|| {
            self.username
                .clone()
                .unwrap_or_else(|| SecretCharset::Alpha.generate(8).to_lowercase())
                .into_bytes()
        });
        data.entry(PASSWORD_KEY.to_string())
            .or_insert_with(|| self.charset.generate(self.length).into_bytes());
        Ok(data)
    }
}
