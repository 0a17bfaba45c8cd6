//! Conditional resource planning
//!
//! Decides what the topology contains before anything is built: whether the
//! bootstrap git user exists, which payload seeds the repository, and the
//! derived names. Pure apart from the catalog's presence check.

use crate::names::DerivedNames;
use repopipe_config::ParameterSet;
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

/// Catalog entry used when no payload is named after the repository
pub const DEFAULT_PAYLOAD: &str = "default-repo";

/// Directory searched by [`DirectoryCatalog::default`]
pub const DEFAULT_CATALOG_DIR: &str = "boilerplate";

/// Lookup of repository seed payloads by name
pub trait PayloadCatalog {
    /// Exact-name presence check
    fn contains(&self, name: &str) -> bool;

    /// Location of the named entry
    fn locate(&self, name: &str) -> PathBuf;

    /// Name of the generic fallback entry
    fn default_entry(&self) -> &str {
        DEFAULT_PAYLOAD
    }
}

/// Payload catalog backed by subdirectories of one root directory
#[derive(Debug, Clone)]
pub struct DirectoryCatalog {
    root: PathBuf,
}

impl DirectoryCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for DirectoryCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_CATALOG_DIR)
    }
}

impl PayloadCatalog for DirectoryCatalog {
    fn contains(&self, name: &str) -> bool {
        self.root.join(name).is_dir()
    }

    fn locate(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

/// The payload chosen to seed the repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    pub name: String,
    pub path: PathBuf,
    /// True when the generic default was chosen
    pub is_default: bool,
}

/// Planner decisions consumed by the topology builder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub names: DerivedNames,
    pub create_git_user: bool,
    pub payload: Payload,
}

pub fn plan<C: PayloadCatalog + ?Sized>(params: &ParameterSet, catalog: &C) -> Plan {
    let names = DerivedNames::derive(params);
    let payload = select_payload(&names.repository, catalog);
    debug!(
        payload = %payload.name,
        is_default = payload.is_default,
        create_git_user = params.create_git_user,
        "Planned topology"
    );

    Plan {
        names,
        create_git_user: params.create_git_user,
        payload,
    }
}

fn select_payload<C: PayloadCatalog + ?Sized>(repository: &str, catalog: &C) -> Payload {
    if catalog.contains(repository) {
        Payload {
            name: repository.to_string(),
            path: catalog.locate(repository),
            is_default: false,
        }
    } else {
        let name = catalog.default_entry().to_string();
        Payload {
            path: catalog.locate(&name),
            name,
            is_default: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::params;
    use std::collections::HashSet;

    struct SetCatalog(HashSet<&'static str>);

    impl PayloadCatalog for SetCatalog {
        fn contains(&self, name: &str) -> bool {
            self.0.contains(name)
        }

        fn locate(&self, name: &str) -> PathBuf {
            PathBuf::from("catalog").join(name)
        }
    }

    #[test]
    fn named_payload_is_selected_when_present() {
        let catalog = SetCatalog(HashSet::from(["demo-dev-repo", "default-repo"]));
        let plan = plan(&params(false), &catalog);
        assert_eq!(plan.payload.name, "demo-dev-repo");
        assert!(!plan.payload.is_default);
        assert_eq!(plan.payload.path, PathBuf::from("catalog/demo-dev-repo"));
    }

    #[test]
    fn default_payload_otherwise() {
        let catalog = SetCatalog(HashSet::from(["demo-dev", "demo-dev-repo-old"]));
        let plan = plan(&params(false), &catalog);
        assert_eq!(plan.payload.name, "default-repo");
        assert!(plan.payload.is_default);
    }

    #[test]
    fn flag_is_carried_into_plan() {
        let catalog = SetCatalog(HashSet::new());
        assert!(plan(&params(true), &catalog).create_git_user);
        assert!(!plan(&params(false), &catalog).create_git_user);
    }

    #[test]
    fn directory_catalog_checks_for_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("demo-dev-repo")).unwrap();
        std::fs::write(dir.path().join("other-repo"), b"not a directory").unwrap();

        let catalog = DirectoryCatalog::new(dir.path());
        assert!(catalog.contains("demo-dev-repo"));
        assert!(!catalog.contains("other-repo"));
        assert!(!catalog.contains("missing"));
    }
}
