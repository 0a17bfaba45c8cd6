//! Topology builder
//!
//! Assembles the resource graph from the parameter set and the plan:
//! repository, optional bootstrap identity, artifact store, build project and
//! the four-stage pipeline. Descriptors refer to each other by logical id or
//! physical name, never by pointer, so the graph is a plain value that can be
//! validated, rendered and printed.

use crate::error::{GraphError, Result};
use crate::plan::{Payload, Plan};
use repopipe_config::ParameterSet;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use tracing::info;

pub mod pipeline;

pub use pipeline::{
    Action, Artifact, ArtifactPath, Capability, Stage, StageKind, PACKAGED_TEMPLATE,
};

/// Logical ids of the resources the builder emits
pub mod logical_ids {
    pub const REPOSITORY: &str = "Repository";
    pub const GIT_USER: &str = "GitIamUser";
    pub const GIT_POLICY: &str = "GitPolicy";
    pub const ARTIFACT_STORE: &str = "PipelineArtifactsBucket";
    pub const LOG_GROUP: &str = "PipelineLogs";
    pub const BUILD_PROJECT: &str = "BuildProject";
    pub const PIPELINE: &str = "Pipeline";
}

pub const BUILD_SPEC: &str = "buildspec.yml";
pub const DEFAULT_BUILD_IMAGE: &str = "aws/codebuild/amazonlinux2-x86_64-standard:4.0";
pub const BUILD_COMPUTE_TYPE: &str = "BUILD_GENERAL1_SMALL";

/// Build environment variable carrying the artifact store name
pub const PACKAGE_BUCKET_VAR: &str = "PACKAGE_BUCKET";

const SOURCE_ACTION: &str = "GetSource";
const BUILD_ACTION: &str = "Build";
const CREATE_CHANGE_SET_ACTION: &str = "CreateChangeSet";
const DEPLOY_ACTION: &str = "Deploy";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployEnvironment {
    pub account: String,
    pub region: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RemovalPolicy {
    Destroy,
    Retain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub logical_id: String,
    pub name: String,
    pub description: String,
    pub default_branch: String,
    pub seed: Payload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum GitPermission {
    Pull,
    Push,
}

impl GitPermission {
    pub fn action(&self) -> &'static str {
        match self {
            GitPermission::Pull => "codecommit:GitPull",
            GitPermission::Push => "codecommit:GitPush",
        }
    }
}

/// Minimally privileged user that may only pull from and push to one
/// repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapIdentity {
    pub logical_id: String,
    pub user_name: String,
    pub policy_logical_id: String,
    pub policy_name: String,
    /// Logical id of the repository the permissions apply to
    pub repository: String,
    pub permissions: BTreeSet<GitPermission>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Encryption {
    /// Provider-managed keys (SSE-S3)
    S3Managed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactStore {
    pub logical_id: String,
    pub encryption: Encryption,
    /// Empty the bucket before deleting it on teardown
    pub auto_delete_objects: bool,
    pub removal_policy: RemovalPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogDestination {
    pub logical_id: String,
    pub retention_days: Option<u32>,
    pub removal_policy: RemovalPolicy,
}

/// Value of a build environment variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueRef {
    Literal(String),
    /// Physical name of the resource with this logical id
    NameOf(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentVariable {
    pub name: String,
    pub value: ValueRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildProject {
    pub logical_id: String,
    pub name: String,
    pub build_spec: String,
    pub image: String,
    pub compute_type: String,
    /// Required for docker-in-docker builds
    pub privileged: bool,
    pub environment_variables: Vec<EnvironmentVariable>,
    pub logging: LogDestination,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    pub logical_id: String,
    pub name: String,
    /// Logical id of the artifact store
    pub artifact_store: String,
    pub restart_execution_on_update: bool,
    pub cross_account_keys: bool,
    pub stages: Vec<Stage>,
}

/// The four descriptor kinds of the topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ResourceKind {
    Repository,
    ArtifactStore,
    BuildProject,
    PipelineStage,
}

/// Borrowed view of one descriptor in the graph
#[derive(Debug, Clone, Copy)]
pub enum ResourceDescriptor<'a> {
    Repository(&'a Repository),
    ArtifactStore(&'a ArtifactStore),
    BuildProject(&'a BuildProject),
    PipelineStage(&'a Stage),
}

impl ResourceDescriptor<'_> {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceDescriptor::Repository(_) => ResourceKind::Repository,
            ResourceDescriptor::ArtifactStore(_) => ResourceKind::ArtifactStore,
            ResourceDescriptor::BuildProject(_) => ResourceKind::BuildProject,
            ResourceDescriptor::PipelineStage(_) => ResourceKind::PipelineStage,
        }
    }
}

/// Complete resource graph handed to the renderer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Graph {
    pub description: String,
    pub environment: DeployEnvironment,
    pub tags: Vec<Tag>,
    pub repository: Repository,
    pub bootstrap_identity: Option<BootstrapIdentity>,
    pub artifact_store: ArtifactStore,
    pub build_project: BuildProject,
    pub pipeline: Pipeline,
}

impl Graph {
    /// Descriptors in construction order; the bootstrap identity is not one
    pub fn descriptors(&self) -> Vec<ResourceDescriptor<'_>> {
        let mut descriptors = vec![
            ResourceDescriptor::Repository(&self.repository),
            ResourceDescriptor::ArtifactStore(&self.artifact_store),
            ResourceDescriptor::BuildProject(&self.build_project),
        ];
        descriptors.extend(
            self.pipeline
                .stages
                .iter()
                .map(ResourceDescriptor::PipelineStage),
        );
        descriptors
    }

    pub fn descriptor_kinds(&self) -> BTreeSet<ResourceKind> {
        self.descriptors().iter().map(|d| d.kind()).collect()
    }

    pub fn stage(&self, kind: StageKind) -> Option<&Stage> {
        self.pipeline.stages.iter().find(|s| s.kind == kind)
    }

    /// Check the structural invariants of the graph
    pub fn validate(&self) -> Result<()> {
        self.validate_logical_ids()?;
        self.validate_stage_order()?;
        self.validate_artifacts()?;
        self.validate_identity()?;
        Ok(())
    }

    fn validate_logical_ids(&self) -> Result<()> {
        let mut ids = vec![
            self.repository.logical_id.as_str(),
            self.artifact_store.logical_id.as_str(),
            self.build_project.logical_id.as_str(),
            self.build_project.logging.logical_id.as_str(),
            self.pipeline.logical_id.as_str(),
        ];
        if let Some(identity) = &self.bootstrap_identity {
            ids.push(&identity.logical_id);
            ids.push(&identity.policy_logical_id);
        }

        let mut seen = HashSet::new();
        for id in ids {
            if !seen.insert(id) {
                return Err(GraphError::duplicate(id));
            }
        }
        Ok(())
    }

    fn validate_stage_order(&self) -> Result<()> {
        let found: Vec<StageKind> = self.pipeline.stages.iter().map(|s| s.kind).collect();
        if found != StageKind::ORDER {
            return Err(GraphError::stage_order(
                join_stages(&StageKind::ORDER),
                join_stages(&found),
            ));
        }
        Ok(())
    }

    fn validate_artifacts(&self) -> Result<()> {
        let mut produced: HashSet<&Artifact> = HashSet::new();
        for stage in &self.pipeline.stages {
            for input in stage.action.inputs() {
                if !produced.contains(input) {
                    return Err(GraphError::dangling_artifact(stage.name(), input.name()));
                }
            }
            for output in stage.action.outputs() {
                if !produced.insert(output) {
                    return Err(GraphError::duplicate(output.name()));
                }
            }
        }
        Ok(())
    }

    fn validate_identity(&self) -> Result<()> {
        let Some(identity) = &self.bootstrap_identity else {
            return Ok(());
        };
        let allowed = BTreeSet::from([GitPermission::Pull, GitPermission::Push]);
        if identity.permissions != allowed || identity.repository != self.repository.logical_id {
            return Err(GraphError::identity_scope(
                &identity.user_name,
                &identity.repository,
            ));
        }
        Ok(())
    }
}

fn join_stages(stages: &[StageKind]) -> String {
    stages
        .iter()
        .map(StageKind::name)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Build the resource graph. Fails without returning any partial graph.
pub fn build(params: &ParameterSet, plan: &Plan) -> Result<Graph> {
    let names = &plan.names;
    names.validate()?;

    let repository = Repository {
        logical_id: logical_ids::REPOSITORY.to_string(),
        name: names.repository.clone(),
        description: params.app_desc.clone(),
        default_branch: params.branch.clone(),
        seed: plan.payload.clone(),
    };

    let bootstrap_identity = plan.create_git_user.then(|| BootstrapIdentity {
        logical_id: logical_ids::GIT_USER.to_string(),
        user_name: names.git_user.clone(),
        policy_logical_id: logical_ids::GIT_POLICY.to_string(),
        policy_name: names.git_policy.clone(),
        repository: repository.logical_id.clone(),
        permissions: BTreeSet::from([GitPermission::Pull, GitPermission::Push]),
    });

    let artifact_store = ArtifactStore {
        logical_id: logical_ids::ARTIFACT_STORE.to_string(),
        encryption: Encryption::S3Managed,
        auto_delete_objects: true,
        removal_policy: RemovalPolicy::Destroy,
    };

    let build_project = BuildProject {
        logical_id: logical_ids::BUILD_PROJECT.to_string(),
        name: names.build_project.clone(),
        build_spec: BUILD_SPEC.to_string(),
        image: params
            .build_image
            .clone()
            .unwrap_or_else(|| DEFAULT_BUILD_IMAGE.to_string()),
        compute_type: BUILD_COMPUTE_TYPE.to_string(),
        privileged: true,
        environment_variables: vec![EnvironmentVariable {
            name: PACKAGE_BUCKET_VAR.to_string(),
            value: ValueRef::NameOf(artifact_store.logical_id.clone()),
        }],
        logging: LogDestination {
            logical_id: logical_ids::LOG_GROUP.to_string(),
            retention_days: params.log_retention_days,
            removal_policy: RemovalPolicy::Retain,
        },
    };

    let source_output = Artifact::produced_by(StageKind::Source, SOURCE_ACTION);
    let build_output = Artifact::produced_by(StageKind::Build, BUILD_ACTION);

    let stages = vec![
        Stage {
            kind: StageKind::Source,
            action: Action::CodeCommitSource {
                name: SOURCE_ACTION.to_string(),
                repository: repository.name.clone(),
                branch: repository.default_branch.clone(),
                output: source_output.clone(),
            },
        },
        Stage {
            kind: StageKind::Build,
            action: Action::CodeBuild {
                name: BUILD_ACTION.to_string(),
                project: build_project.logical_id.clone(),
                input: source_output,
                outputs: vec![build_output.clone()],
            },
        },
        Stage {
            kind: StageKind::CreateChangeSet,
            action: Action::CreateReplaceChangeSet {
                name: CREATE_CHANGE_SET_ACTION.to_string(),
                stack_name: names.stack.clone(),
                change_set_name: names.change_set.clone(),
                template_path: build_output.at_path(PACKAGED_TEMPLATE),
                capabilities: vec![Capability::NamedIam, Capability::AutoExpand],
                admin_permissions: true,
            },
        },
        Stage {
            kind: StageKind::DeployChangeSet,
            action: Action::ExecuteChangeSet {
                name: DEPLOY_ACTION.to_string(),
                stack_name: names.stack.clone(),
                change_set_name: names.change_set.clone(),
            },
        },
    ];

    let pipeline = Pipeline {
        logical_id: logical_ids::PIPELINE.to_string(),
        name: names.pipeline.clone(),
        artifact_store: artifact_store.logical_id.clone(),
        restart_execution_on_update: true,
        cross_account_keys: true,
        stages,
    };

    let graph = Graph {
        description: format!("Source repository and delivery pipeline for {}", names.app_env),
        environment: DeployEnvironment {
            account: params.aws_account.clone(),
            region: params.aws_region.clone(),
        },
        tags: tags(params),
        repository,
        bootstrap_identity,
        artifact_store,
        build_project,
        pipeline,
    };
    graph.validate()?;

    info!(
        repository = %graph.repository.name,
        pipeline = %graph.pipeline.name,
        bootstrap_identity = graph.bootstrap_identity.is_some(),
        "Built resource graph"
    );
    Ok(graph)
}

fn tags(params: &ParameterSet) -> Vec<Tag> {
    let mut tags = Vec::new();
    if !params.app_name.is_empty() {
        tags.push(Tag {
            key: "app-name".to_string(),
            value: params.app_name.clone(),
        });
    }
    if !params.environment.is_empty() {
        tags.push(Tag {
            key: "environment".to_string(),
            value: params.environment.clone(),
        });
    }
    tags.push(Tag {
        key: "created-by".to_string(),
        value: params.user.clone(),
    });
    tags
}
