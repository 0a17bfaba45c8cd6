//! Pipeline stages, actions and the artifacts that link them

use serde::Serialize;
use std::fmt;

/// Relative path of the packaged template inside the build artifact
pub const PACKAGED_TEMPLATE: &str = "packaged.yaml";

/// Opaque data handle passed between stages. Only the name matters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Artifact(String);

impl Artifact {
    /// Name an artifact after the stage and action producing it
    pub fn produced_by(stage: StageKind, action: &str) -> Self {
        Self(format!("Artifact_{}_{}", stage.name(), action))
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Reference a file inside this artifact
    pub fn at_path(&self, file: &str) -> ArtifactPath {
        ArtifactPath {
            artifact: self.clone(),
            file: file.to_string(),
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A file within an artifact, rendered as `Artifact::file`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactPath {
    pub artifact: Artifact,
    pub file: String,
}

impl fmt::Display for ArtifactPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.artifact, self.file)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StageKind {
    Source,
    Build,
    CreateChangeSet,
    DeployChangeSet,
}

impl StageKind {
    /// The only stage order a pipeline may have
    pub const ORDER: [StageKind; 4] = [
        StageKind::Source,
        StageKind::Build,
        StageKind::CreateChangeSet,
        StageKind::DeployChangeSet,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Source => "Source",
            StageKind::Build => "Build",
            StageKind::CreateChangeSet => "CreateChangeSet",
            StageKind::DeployChangeSet => "DeployChangeSet",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Capabilities acknowledged when creating the change set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Capability {
    NamedIam,
    AutoExpand,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::NamedIam => "CAPABILITY_NAMED_IAM",
            Capability::AutoExpand => "CAPABILITY_AUTO_EXPAND",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Action {
    /// Fetch the tracked branch of the repository
    #[serde(rename_all = "camelCase")]
    CodeCommitSource {
        name: String,
        repository: String,
        branch: String,
        output: Artifact,
    },
    /// Run the build project against the source artifact
    #[serde(rename_all = "camelCase")]
    CodeBuild {
        name: String,
        project: String,
        input: Artifact,
        outputs: Vec<Artifact>,
    },
    /// Compute (or replace) a named change set against the target stack
    #[serde(rename_all = "camelCase")]
    CreateReplaceChangeSet {
        name: String,
        stack_name: String,
        change_set_name: String,
        template_path: ArtifactPath,
        capabilities: Vec<Capability>,
        admin_permissions: bool,
    },
    /// Execute the change set created by the previous stage
    #[serde(rename_all = "camelCase")]
    ExecuteChangeSet {
        name: String,
        stack_name: String,
        change_set_name: String,
    },
}

impl Action {
    pub fn name(&self) -> &str {
        match self {
            Action::CodeCommitSource { name, .. }
            | Action::CodeBuild { name, .. }
            | Action::CreateReplaceChangeSet { name, .. }
            | Action::ExecuteChangeSet { name, .. } => name,
        }
    }

    pub fn inputs(&self) -> Vec<&Artifact> {
        match self {
            Action::CodeCommitSource { .. } | Action::ExecuteChangeSet { .. } => Vec::new(),
            Action::CodeBuild { input, .. } => vec![input],
            Action::CreateReplaceChangeSet { template_path, .. } => vec![&template_path.artifact],
        }
    }

    pub fn outputs(&self) -> Vec<&Artifact> {
        match self {
            Action::CodeCommitSource { output, .. } => vec![output],
            Action::CodeBuild { outputs, .. } => outputs.iter().collect(),
            Action::CreateReplaceChangeSet { .. } | Action::ExecuteChangeSet { .. } => Vec::new(),
        }
    }
}

/// One pipeline stage holding a single action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stage {
    pub kind: StageKind,
    pub action: Action,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_names_follow_stage_and_action() {
        let artifact = Artifact::produced_by(StageKind::Build, "Build");
        assert_eq!(artifact.name(), "Artifact_Build_Build");
        assert_eq!(
            artifact.at_path(PACKAGED_TEMPLATE).to_string(),
            "Artifact_Build_Build::packaged.yaml"
        );
    }

    #[test]
    fn change_set_action_consumes_template_artifact() {
        let build = Artifact::produced_by(StageKind::Build, "Build");
        let action = Action::CreateReplaceChangeSet {
            name: "CreateChangeSet".into(),
            stack_name: "s".into(),
            change_set_name: "s-changeset".into(),
            template_path: build.at_path(PACKAGED_TEMPLATE),
            capabilities: vec![Capability::NamedIam],
            admin_permissions: true,
        };
        assert_eq!(action.inputs(), vec![&build]);
        assert!(action.outputs().is_empty());
    }
}
