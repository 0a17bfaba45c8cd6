//! Stack outputs projected from the built graph

use crate::topology::Graph;
use serde::Serialize;

pub const CLONE_URL_SSH: &str = "GitRepoCloneUrlSsh";
pub const CLONE_URL_HTTP: &str = "GitRepoCloneUrlHttp";
pub const CLONE_URL_GRC: &str = "GitRepoCloneUrlGrc";
pub const GIT_USER: &str = "GitUser";

/// Where an output's value comes from once the stack exists
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputValue {
    /// Attribute of a resource, resolved by the provisioning engine
    GetAtt {
        logical_id: String,
        attribute: String,
    },
    /// Physical id of a resource
    Ref(String),
    /// Known at synthesis time
    Literal(String),
}

impl OutputValue {
    /// Human-readable form for printing before deploy
    pub fn describe(&self) -> String {
        match self {
            OutputValue::GetAtt {
                logical_id,
                attribute,
            } => format!("<{}.{}>", logical_id, attribute),
            OutputValue::Ref(logical_id) => format!("<{}>", logical_id),
            OutputValue::Literal(value) => value.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackOutput {
    pub name: String,
    pub description: String,
    pub value: OutputValue,
}

/// Clone URLs for every address scheme, plus the bootstrap user name when the
/// graph has one.
pub fn emit(graph: &Graph) -> Vec<StackOutput> {
    let repo = &graph.repository;
    let mut outputs = vec![
        StackOutput {
            name: CLONE_URL_SSH.to_string(),
            description: "Repository clone URL (SSH)".to_string(),
            value: OutputValue::GetAtt {
                logical_id: repo.logical_id.clone(),
                attribute: "CloneUrlSsh".to_string(),
            },
        },
        StackOutput {
            name: CLONE_URL_HTTP.to_string(),
            description: "Repository clone URL (HTTPS)".to_string(),
            value: OutputValue::GetAtt {
                logical_id: repo.logical_id.clone(),
                attribute: "CloneUrlHttp".to_string(),
            },
        },
        StackOutput {
            name: CLONE_URL_GRC.to_string(),
            description: "Repository clone URL (git-remote-codecommit)".to_string(),
            value: OutputValue::Literal(format!(
                "codecommit::{}://{}",
                graph.environment.region, repo.name
            )),
        },
    ];

    if let Some(identity) = &graph.bootstrap_identity {
        outputs.push(StackOutput {
            name: GIT_USER.to_string(),
            description: "IAM user allowed to pull from and push to the repository".to_string(),
            value: OutputValue::Ref(identity.logical_id.clone()),
        });
    }

    outputs
}
