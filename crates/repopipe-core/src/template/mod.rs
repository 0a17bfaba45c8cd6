//! CloudFormation template rendering
//!
//! Turns the resource graph into a template document. Besides the resources
//! named in the graph, the renderer emits the supporting resources the
//! pipeline needs to run: service roles and their policies, the artifact key,
//! the source-change event rule and the bucket auto-delete handler.

use crate::assets::StagedAsset;
use crate::error::{GraphError, SynthError};
use crate::outputs::{OutputValue, StackOutput};
use crate::topology::Graph;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

mod iam;
mod resources;

pub use resources::supporting_ids;

pub const FORMAT_VERSION: &str = "2010-09-09";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeletionPolicy {
    Delete,
    Retain,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnResource {
    #[serde(rename = "Type")]
    pub resource_type: String,
    pub properties: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<DeletionPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<DeletionPolicy>,
}

impl CfnResource {
    pub fn new(resource_type: &str, properties: Value) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            properties,
            depends_on: Vec::new(),
            deletion_policy: None,
            update_replace_policy: None,
        }
    }

    pub fn depends_on(mut self, logical_id: &str) -> Self {
        self.depends_on.push(logical_id.to_string());
        self
    }

    /// Same policy on deletion and on replacement
    pub fn removal(mut self, policy: DeletionPolicy) -> Self {
        self.deletion_policy = Some(policy);
        self.update_replace_policy = Some(policy);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnOutput {
    pub description: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Resources")]
    pub resources: BTreeMap<String, CfnResource>,
    #[serde(rename = "Outputs", skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, CfnOutput>,
}

impl Template {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            description: description.into(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Add a resource; logical ids are unique within a template
    pub fn insert(&mut self, logical_id: &str, resource: CfnResource) -> Result<(), GraphError> {
        if self.resources.contains_key(logical_id) {
            return Err(GraphError::duplicate(logical_id));
        }
        self.resources.insert(logical_id.to_string(), resource);
        Ok(())
    }

    pub fn resource(&self, logical_id: &str) -> Option<&CfnResource> {
        self.resources.get(logical_id)
    }

    /// Logical ids of every resource of the given type
    pub fn ids_of_type(&self, resource_type: &str) -> Vec<&str> {
        self.resources
            .iter()
            .filter(|(_, r)| r.resource_type == resource_type)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    pub fn to_json(&self) -> Result<String, SynthError> {
        serde_json::to_string_pretty(self).map_err(|e| SynthError::Serialize(e.to_string()))
    }

    pub fn to_yaml(&self) -> Result<String, SynthError> {
        serde_yaml::to_string(self).map_err(|e| SynthError::Serialize(e.to_string()))
    }
}

pub(crate) fn reference(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

pub(crate) fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

pub(crate) fn sub(pattern: impl Into<String>) -> Value {
    json!({ "Fn::Sub": pattern.into() })
}

/// Render the graph, its outputs and the staged payload into one template
pub fn render(
    graph: &Graph,
    outputs: &[StackOutput],
    asset: &StagedAsset,
) -> Result<Template, GraphError> {
    let mut template = Template::new(&graph.description);
    resources::render_resources(&mut template, graph, asset)?;

    for output in outputs {
        let value = match &output.value {
            OutputValue::GetAtt {
                logical_id,
                attribute,
            } => get_att(logical_id, attribute),
            OutputValue::Ref(logical_id) => reference(logical_id),
            OutputValue::Literal(value) => Value::String(value.clone()),
        };
        template.outputs.insert(
            output.name.clone(),
            CfnOutput {
                description: output.description.clone(),
                value,
            },
        );
    }

    Ok(template)
}
