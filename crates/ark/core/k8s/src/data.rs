use std::{fmt, ops::Deref, str::FromStr};

use anyhow::{anyhow, bail, Error, Result};
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::Display;

/// A validated, wire-safe identifier shared by models, topics and object
/// storage buckets.
///
/// Lowercase ASCII alphanumerics, `-`, `_` and `.`, 1-63 characters,
/// matching the conventions NATS subjects (dot-separated tokens) and S3
/// bucket names both tolerate. A model name such as `"qa.in"` is legal;
/// `crate::model::Model` derives its `table_name` by replacing dots with
/// underscores (spec.md §3 "Model").
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Name(String);

impl Name {
    fn pattern() -> &'static Regex {
        static PATTERN: ::std::sync::OnceLock<Regex> = ::std::sync::OnceLock::new();
        PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9]([a-z0-9\-_.]{0,61}[a-z0-9])?$").unwrap())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Name {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if !Self::pattern().is_match(s) {
            bail!("invalid name: {s:?} (expected lowercase alphanumerics, '-' or '_', 1-63 chars)");
        }
        Ok(Self(s.into()))
    }
}

impl TryFrom<String> for Name {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl Deref for Name {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for Name {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated endpoint URL (object storage, message bus, etc.), kept as a
/// thin wrapper so the wire/CLI layer can round-trip it without losing the
/// original string formatting (e.g. a trailing slash).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Url(::url::Url);

impl Url {
    pub fn scheme(&self) -> &str {
        self.0.scheme()
    }

    pub fn as_url(&self) -> &::url::Url {
        &self.0
    }

    pub fn into_url(self) -> ::url::Url {
        self.0
    }
}

impl FromStr for Url {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<::url::Url>()
            .map(Self)
            .map_err(|error| anyhow!("invalid URL ({s:?}): {error}"))
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<::url::Url> for Url {
    fn from(value: ::url::Url) -> Self {
        Self(value)
    }
}

/// Storage backend discriminant surfaced by the model registry; only
/// `ObjectStorage` bindings are usable by the data plane today.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[strum(serialize_all = "PascalCase")]
pub enum StorageKind {
    Database,
    Kubernetes,
    ObjectStorage,
}
