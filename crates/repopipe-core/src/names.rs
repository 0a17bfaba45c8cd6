//! Deterministic names derived from the parameter set

use crate::error::{GraphError, Result};
use repopipe_config::ParameterSet;
use serde::Serialize;

/// Every physical name the topology uses, computed by string concatenation
/// from `{app}-{env}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedNames {
    pub app_env: String,
    pub repository: String,
    pub pipeline: String,
    pub build_project: String,
    pub stack: String,
    pub change_set: String,
    pub git_user: String,
    pub git_policy: String,
}

impl DerivedNames {
    pub fn derive(params: &ParameterSet) -> Self {
        let app_env = params.app_env.clone();
        let stack = format!("{}-stack", app_env);
        Self {
            repository: format!("{}-repo", app_env),
            pipeline: format!("pipeline-{}", app_env),
            build_project: format!("{}-build", app_env),
            change_set: format!("{}-changeset", stack),
            git_user: format!("{}-git-user", app_env),
            git_policy: format!("{}-git-policy", app_env),
            stack,
            app_env,
        }
    }

    /// Check every name against the naming rules of the service that owns it
    pub fn validate(&self) -> Result<()> {
        check(
            "repository",
            &self.repository,
            100,
            |c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'),
        )?;
        check(
            "pipeline",
            &self.pipeline,
            100,
            |c| c.is_ascii_alphanumeric() || matches!(c, '.' | '@' | '-' | '_'),
        )?;
        check(
            "build project",
            &self.build_project,
            255,
            |c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'),
        )?;
        check_stack_name("stack", &self.stack)?;
        check_stack_name("change set", &self.change_set)?;
        check("IAM user", &self.git_user, 64, is_iam_name_char)?;
        check("IAM policy", &self.git_policy, 128, is_iam_name_char)?;
        Ok(())
    }
}

fn is_iam_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '=' | ',' | '.' | '@' | '_' | '-')
}

fn check(
    kind: &'static str,
    name: &str,
    max_len: usize,
    allowed: impl Fn(char) -> bool,
) -> Result<()> {
    if name.is_empty() {
        return Err(GraphError::invalid_name(kind, name, "must not be empty"));
    }
    if name.len() > max_len {
        return Err(GraphError::invalid_name(
            kind,
            name,
            format!("must be at most {} characters", max_len),
        ));
    }
    if let Some(bad) = name.chars().find(|c| !allowed(*c)) {
        return Err(GraphError::invalid_name(
            kind,
            name,
            format!("character '{}' is not allowed", bad),
        ));
    }
    Ok(())
}

// CloudFormation stack and change set names: [a-zA-Z][-a-zA-Z0-9]*
fn check_stack_name(kind: &'static str, name: &str) -> Result<()> {
    check(kind, name, 128, |c| c.is_ascii_alphanumeric() || c == '-')?;
    if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(GraphError::invalid_name(kind, name, "must start with a letter"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::params;

    #[test]
    fn names_follow_app_env() {
        let names = DerivedNames::derive(&params(false));
        assert_eq!(names.app_env, "demo-dev");
        assert_eq!(names.repository, "demo-dev-repo");
        assert_eq!(names.pipeline, "pipeline-demo-dev");
        assert_eq!(names.build_project, "demo-dev-build");
        assert_eq!(names.stack, "demo-dev-stack");
        assert_eq!(names.change_set, "demo-dev-stack-changeset");
        assert_eq!(names.git_user, "demo-dev-git-user");
        assert!(names.validate().is_ok());
    }

    #[test]
    fn stack_name_must_start_with_letter() {
        let mut p = params(false);
        p.app_name = "1demo".into();
        p.app_env = "1demo-dev".into();
        let err = DerivedNames::derive(&p).validate().unwrap_err();
        assert!(matches!(err, GraphError::InvalidName { kind: "stack", .. }));
    }

    #[test]
    fn underscores_are_rejected_in_stack_names() {
        let mut p = params(false);
        p.app_env = "demo_app-dev".into();
        let err = DerivedNames::derive(&p).validate().unwrap_err();
        assert!(matches!(err, GraphError::InvalidName { kind: "stack", .. }));
    }

    #[test]
    fn spaces_are_rejected_everywhere() {
        let mut p = params(false);
        p.app_env = "demo app-dev".into();
        let err = DerivedNames::derive(&p).validate().unwrap_err();
        assert!(matches!(err, GraphError::InvalidName { kind: "repository", .. }));
    }
}
