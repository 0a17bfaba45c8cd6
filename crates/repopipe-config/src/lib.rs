// repopipe-config - Parameter resolution for the pipeline topology
//
// Resolves one immutable ParameterSet from:
// 1. Overrides (CLI flags, --context key=value) - highest priority
// 2. The sectioned config file: [default] for env/app/user, [{app}-{env}]
//    for everything else
// 3. The process environment, for the account and region only

use serde::Serialize;

mod error;
mod resolve;
mod sources;
mod validation;

pub use error::{ConfigError, Result};
pub use sources::{
    ConfigFile, EnvSource, OverrideSource, Overrides, Section, StdEnvSource, DEFAULT_CONFIG_FILE,
    DEFAULT_SECTION, ENV_PREFIX,
};

/// Branch tracked by the repository and the Source stage unless configured
pub const DEFAULT_BRANCH: &str = "main";

/// Recognized parameter keys, shared by the config file and `--context`.
pub mod keys {
    pub const ENV: &str = "env";
    pub const APP: &str = "app";
    pub const USER: &str = "user";
    pub const REGION: &str = "awsRegion";
    pub const ACCOUNT: &str = "awsAccount";
    pub const DESCRIPTION: &str = "appDesc";
    pub const CREATE_GIT_USER: &str = "createGitUser";
    pub const BRANCH: &str = "branch";
    pub const BUILD_IMAGE: &str = "buildImage";
    pub const LOG_RETENTION_DAYS: &str = "logRetentionDays";
    pub const ASSET_BUCKET: &str = "assetBucket";
}

/// Fully resolved deployment parameters.
///
/// Built once by [`ParameterSet::resolve`] and only read afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSet {
    pub environment: String,
    pub app_name: String,
    pub user: String,
    /// Composite key `{app}-{env}`, also the active config section
    pub app_env: String,
    pub aws_region: String,
    pub aws_account: String,
    pub app_desc: String,
    pub create_git_user: bool,
    pub branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_retention_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_bucket: Option<String>,
}

impl ParameterSet {
    /// Resolve and validate parameters from all sources
    pub fn resolve<O, E>(overrides: &O, file: &ConfigFile, env: &E) -> Result<Self>
    where
        O: OverrideSource + ?Sized,
        E: EnvSource + ?Sized,
    {
        let params = resolve::resolve(overrides, file, env)?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        validation::validate_parameters(self)
    }
}
