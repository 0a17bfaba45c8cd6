//! IAM role and policy document helpers

use super::{reference, sub, CfnResource};
use serde_json::{json, Value};

pub(crate) const POLICY_VERSION: &str = "2012-10-17";

/// One `Allow` statement
pub(crate) fn allow(actions: &[&str], resources: Vec<Value>) -> Value {
    json!({
        "Effect": "Allow",
        "Action": actions,
        "Resource": resources,
    })
}

pub(crate) fn document(statements: Vec<Value>) -> Value {
    json!({
        "Version": POLICY_VERSION,
        "Statement": statements,
    })
}

/// AWS-managed policy ARN in the current partition
pub(crate) fn managed_policy(path: &str) -> Value {
    sub(format!("arn:${{AWS::Partition}}:iam::aws:policy/{}", path))
}

/// Role assumable by one service principal
pub(crate) fn service_role(service: &str, managed: Vec<Value>, tags: &Value) -> CfnResource {
    let mut properties = json!({
        "AssumeRolePolicyDocument": document(vec![json!({
            "Effect": "Allow",
            "Principal": { "Service": service },
            "Action": "sts:AssumeRole",
        })]),
        "Tags": tags,
    });
    if !managed.is_empty() {
        properties["ManagedPolicyArns"] = Value::Array(managed);
    }
    CfnResource::new("AWS::IAM::Role", properties)
}

/// Inline policy attached to one role
pub(crate) fn role_policy(name: &str, role: &str, statements: Vec<Value>) -> CfnResource {
    CfnResource::new(
        "AWS::IAM::Policy",
        json!({
            "PolicyName": name,
            "Roles": [reference(role)],
            "PolicyDocument": document(statements),
        }),
    )
}
