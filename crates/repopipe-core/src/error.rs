//! Error types for graph construction and asset staging

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// G001: Derived identifier violates the provider's naming rules
    G001InvalidName,
    /// G002: Two resources share a logical id or physical name
    G002DuplicateResource,
    /// G003: A stage consumes an artifact no earlier stage produced
    G003DanglingArtifact,
    /// G004: Pipeline stages are not Source, Build, CreateChangeSet, DeployChangeSet
    G004StageOrder,
    /// G005: Bootstrap identity is scoped wider than pull/push on one repository
    G005IdentityScope,
    /// A001: Payload directory could not be staged
    A001AssetStaging,
    /// A002: Payload could not be packaged as a zip archive
    A002AssetArchive,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::G001InvalidName => "G001",
            Self::G002DuplicateResource => "G002",
            Self::G003DanglingArtifact => "G003",
            Self::G004StageOrder => "G004",
            Self::G005IdentityScope => "G005",
            Self::A001AssetStaging => "A001",
            Self::A002AssetArchive => "A002",
        }
    }
}

/// Errors that abort topology construction. No partial graph is returned
/// alongside any of these.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("[{code}] Invalid {kind} name '{name}': {reason}")]
    InvalidName {
        code: &'static str,
        kind: &'static str,
        name: String,
        reason: String,
    },

    #[error("[{code}] Duplicate resource '{name}'")]
    DuplicateResource { code: &'static str, name: String },

    #[error("[{code}] Stage '{stage}' consumes artifact '{artifact}' which no earlier stage produces")]
    DanglingArtifact {
        code: &'static str,
        stage: String,
        artifact: String,
    },

    #[error("[{code}] Pipeline stages must be {expected}, found {found}")]
    StageOrder {
        code: &'static str,
        expected: String,
        found: String,
    },

    #[error("[{code}] Bootstrap identity '{user}' is not scoped to pull/push on repository '{repository}'")]
    IdentityScope {
        code: &'static str,
        user: String,
        repository: String,
    },
}

impl GraphError {
    pub fn invalid_name(kind: &'static str, name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            code: ErrorCode::G001InvalidName.as_str(),
            kind,
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn duplicate(name: impl Into<String>) -> Self {
        Self::DuplicateResource {
            code: ErrorCode::G002DuplicateResource.as_str(),
            name: name.into(),
        }
    }

    pub fn dangling_artifact(stage: &str, artifact: &str) -> Self {
        Self::DanglingArtifact {
            code: ErrorCode::G003DanglingArtifact.as_str(),
            stage: stage.to_string(),
            artifact: artifact.to_string(),
        }
    }

    pub fn stage_order(expected: String, found: String) -> Self {
        Self::StageOrder {
            code: ErrorCode::G004StageOrder.as_str(),
            expected,
            found,
        }
    }

    pub fn identity_scope(user: &str, repository: &str) -> Self {
        Self::IdentityScope {
            code: ErrorCode::G005IdentityScope.as_str(),
            user: user.to_string(),
            repository: repository.to_string(),
        }
    }
}

/// Errors raised while hashing or packaging the repository seed payload
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("[{code}] Payload directory {} does not exist", path.display())]
    MissingPayload { code: &'static str, path: PathBuf },

    #[error("[{code}] Failed to read payload {}: {source}", path.display())]
    Io {
        code: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[{code}] Failed to walk payload directory: {source}")]
    Walk {
        code: &'static str,
        #[source]
        source: walkdir::Error,
    },

    #[error("[{code}] Failed to archive {entry}: {source}")]
    Archive {
        code: &'static str,
        entry: String,
        #[source]
        source: zip::result::ZipError,
    },
}

impl AssetError {
    pub fn missing_payload(path: &Path) -> Self {
        Self::MissingPayload {
            code: ErrorCode::A001AssetStaging.as_str(),
            path: path.to_path_buf(),
        }
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            code: ErrorCode::A001AssetStaging.as_str(),
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn archive(entry: impl Into<String>, source: zip::result::ZipError) -> Self {
        Self::Archive {
            code: ErrorCode::A002AssetArchive.as_str(),
            entry: entry.into(),
            source,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingPayload { code, .. }
            | Self::Io { code, .. }
            | Self::Walk { code, .. }
            | Self::Archive { code, .. } => *code,
        }
    }
}

impl From<walkdir::Error> for AssetError {
    fn from(source: walkdir::Error) -> Self {
        Self::Walk {
            code: ErrorCode::A001AssetStaging.as_str(),
            source,
        }
    }
}

/// Any failure of a synthesis pass
#[derive(Debug, Error)]
pub enum SynthError {
    #[error(transparent)]
    Config(#[from] repopipe_config::ConfigError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error("Failed to serialize template: {0}")]
    Serialize(String),
}

pub type Result<T> = std::result::Result<T, GraphError>;
