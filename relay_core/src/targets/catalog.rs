//! Targets as listed by the external tool.

use crate::error::ToolError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// An addressable remote entity, `<type>/<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub path: String,
    #[serde(default = "available_by_default")]
    pub available: bool,
}

fn available_by_default() -> bool {
    true
}

impl Target {
    pub fn new(path: impl Into<String>, available: bool) -> Self {
        Self {
            path: path.into(),
            available,
        }
    }

    /// Substring before the first `/`.
    pub fn target_type(&self) -> &str {
        self.path
            .split_once('/')
            .map_or(self.path.as_str(), |(ty, _)| ty)
    }

    /// Everything after the first `/`.
    pub fn name(&self) -> &str {
        self.path
            .split_once('/')
            .map_or(self.path.as_str(), |(_, name)| name)
    }
}

/// Namespace capability of a listing. The current namespace is always a member of `all`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceInfo {
    current: String,
    all: Vec<String>,
}

impl NamespaceInfo {
    pub fn new(current: impl Into<String>, mut all: Vec<String>) -> Self {
        let current = current.into();
        if !all.contains(&current) {
            all.insert(0, current.clone());
        }
        Self { current, all }
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn all(&self) -> &[String] {
        &self.all
    }

    /// Every namespace except the current one, in listing order.
    pub fn others(&self) -> impl Iterator<Item = &str> {
        self.all
            .iter()
            .map(String::as_str)
            .filter(|ns| *ns != self.current)
    }
}

/// One namespace-scoped listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetCatalog {
    targets: Vec<Target>,
    namespaces: Option<NamespaceInfo>,
}

impl TargetCatalog {
    pub fn new(targets: Vec<Target>, namespaces: Option<NamespaceInfo>) -> Self {
        Self {
            targets,
            namespaces,
        }
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn namespaces(&self) -> Option<&NamespaceInfo> {
        self.namespaces.as_ref()
    }

    pub fn current_namespace(&self) -> Option<&str> {
        self.namespaces.as_ref().map(NamespaceInfo::current)
    }

    /// Keep only available targets whose type is in `supported`.
    pub fn filtered(self, supported: &[String]) -> Self {
        let targets = self
            .targets
            .into_iter()
            .filter(|t| t.available && supported.iter().any(|s| s == t.target_type()))
            .collect();
        Self {
            targets,
            namespaces: self.namespaces,
        }
    }

    pub fn targets_of_type<'a>(&'a self, ty: &'a str) -> impl Iterator<Item = &'a Target> + 'a {
        self.targets.iter().filter(move |t| t.target_type() == ty)
    }

    pub fn has_type(&self, ty: &str) -> bool {
        self.targets_of_type(ty).next().is_some()
    }

    /// Types from `priority` that have at least one target, in priority order.
    pub fn types_with_targets<'a>(&self, priority: &'a [String]) -> Vec<&'a str> {
        priority
            .iter()
            .map(String::as_str)
            .filter(|ty| self.has_type(ty))
            .collect()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Listing {
    Rich {
        targets: Vec<Target>,
        #[serde(default)]
        current_namespace: Option<String>,
        #[serde(default)]
        namespaces: Option<Vec<String>>,
    },
    Legacy(Vec<String>),
}

/// Decode `ls` output: the rich object form or the legacy array of paths.
///
/// Namespace support is only reported when the listing names a current
/// namespace.
pub fn parse_listing(stdout: &str) -> Result<TargetCatalog, serde_json::Error> {
    let catalog = match serde_json::from_str::<Listing>(stdout.trim())? {
        Listing::Rich {
            targets,
            current_namespace,
            namespaces,
        } => TargetCatalog::new(
            targets,
            current_namespace.map(|current| NamespaceInfo::new(current, namespaces.unwrap_or_default())),
        ),
        Listing::Legacy(paths) => TargetCatalog::new(
            paths.into_iter().map(|path| Target::new(path, true)).collect(),
            None,
        ),
    };
    Ok(catalog)
}

/// Where catalogs come from.
#[async_trait]
pub trait TargetSource: Send + Sync {
    async fn list(&self, namespace: Option<&str>) -> Result<TargetCatalog, ToolError>;
}
