//! Parameter loading from command-line flags

use anyhow::{Context, Result};
use clap::Args;
use repopipe_config::{
    keys, ConfigFile, EnvSource, Overrides, ParameterSet, StdEnvSource, DEFAULT_CONFIG_FILE,
};
use repopipe_core::plan::{DirectoryCatalog, DEFAULT_CATALOG_DIR};
use std::path::PathBuf;
use tracing::debug;

/// Flags shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct ParameterArgs {
    /// Path to the parameters file
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding repository seed payloads
    #[arg(long, value_name = "DIR", global = true)]
    pub boilerplate: Option<PathBuf>,

    /// Environment name (overrides [default] env)
    #[arg(long, global = true)]
    pub env: Option<String>,

    /// Application name (overrides [default] app)
    #[arg(long, global = true)]
    pub app: Option<String>,

    /// User recorded in the created-by tag (overrides [default] user)
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Extra override as key=value, e.g. -c createGitUser=yes
    #[arg(short = 'c', long = "context", value_name = "KEY=VALUE", global = true)]
    pub context: Vec<String>,
}

impl ParameterArgs {
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    pub fn catalog(&self) -> DirectoryCatalog {
        DirectoryCatalog::new(
            self.boilerplate
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CATALOG_DIR)),
        )
    }

    /// `--context` pairs first, then the dedicated flags on top
    pub fn overrides(&self) -> Result<Overrides> {
        let mut overrides = Overrides::from_pairs(&self.context)?;
        overrides
            .set(keys::ENV, self.env.clone())
            .set(keys::APP, self.app.clone())
            .set(keys::USER, self.user.clone());
        Ok(overrides)
    }

    pub fn load(&self) -> Result<ParameterSet> {
        self.load_with_env(&StdEnvSource)
    }

    pub fn load_with_env<E: EnvSource + ?Sized>(&self, env: &E) -> Result<ParameterSet> {
        let path = self.config_path();
        let file = ConfigFile::load(&path)
            .with_context(|| format!("Failed to load parameters from {}", path.display()))?;
        let overrides = self.overrides()?;
        if overrides.is_empty() {
            debug!("No parameter overrides given, using file values only");
        }
        debug!(
            file = %path.display(),
            overrides = overrides.len(),
            "Resolving parameters"
        );
        ParameterSet::resolve(&overrides, &file, env).context("Failed to resolve parameters")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repopipe_config::OverrideSource;
    use std::fs;

    struct NoEnv;

    impl EnvSource for NoEnv {
        fn get(&self, _key: &str) -> Option<String> {
            None
        }

        fn get_raw(&self, _key: &str) -> Option<String> {
            None
        }
    }

    const PARAMETERS: &str = r#"
[default]
env = "dev"
app = "demo"
user = "alice"

[demo-dev]
awsRegion = "us-east-1"
awsAccount = "123456789012"
appDesc = "Demo application"
createGitUser = false

[demo-prod]
awsRegion = "eu-west-1"
awsAccount = "210987654321"
appDesc = "Demo application (prod)"
createGitUser = true
"#;

    fn args(dir: &tempfile::TempDir) -> ParameterArgs {
        let path = dir.path().join("parameters.toml");
        fs::write(&path, PARAMETERS).unwrap();
        ParameterArgs {
            config: Some(path),
            ..Default::default()
        }
    }

    #[test]
    fn flags_override_context_pairs() {
        let args = ParameterArgs {
            env: Some("prod".into()),
            context: vec!["env=staging".into(), "createGitUser=yes".into()],
            ..Default::default()
        };
        let overrides = args.overrides().unwrap();
        assert_eq!(overrides.len(), 2);
        assert_eq!(overrides.get("env").as_deref(), Some("prod"));
        assert_eq!(overrides.get("createGitUser").as_deref(), Some("yes"));
    }

    #[test]
    fn env_flag_selects_section() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = args(&dir);
        args.env = Some("prod".into());
        let params = args.load_with_env(&NoEnv).unwrap();
        assert_eq!(params.app_env, "demo-prod");
        assert_eq!(params.aws_region, "eu-west-1");
        assert!(params.create_git_user);
    }

    #[test]
    fn missing_file_names_the_path() {
        let args = ParameterArgs {
            config: Some(PathBuf::from("/nonexistent/parameters.toml")),
            ..Default::default()
        };
        let err = args.load_with_env(&NoEnv).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/parameters.toml"));
    }

    #[test]
    fn malformed_context_is_rejected() {
        let args = ParameterArgs {
            context: vec!["createGitUser".into()],
            ..Default::default()
        };
        assert!(args.overrides().is_err());
    }
}
