// Parameter resolution.
//
// Priority per key:
// - env, app, user:         overrides > [default]
// - appDesc, createGitUser: overrides > [{app}-{env}]
// - awsRegion, awsAccount:  overrides > [{app}-{env}] > process environment
// - optional keys:          overrides > [{app}-{env}] > built-in default
//
// Empty values count as absent at every level.

use crate::error::{ConfigError, Result};
use crate::sources::{ConfigFile, EnvSource, OverrideSource, Section, DEFAULT_SECTION};
use crate::{keys, ParameterSet, DEFAULT_BRANCH};
use tracing::debug;

pub fn resolve<O, E>(overrides: &O, file: &ConfigFile, env: &E) -> Result<ParameterSet>
where
    O: OverrideSource + ?Sized,
    E: EnvSource + ?Sized,
{
    let defaults = file.section(DEFAULT_SECTION);

    let environment = required(overrides, defaults, DEFAULT_SECTION, keys::ENV)?;
    let app_name = required(overrides, defaults, DEFAULT_SECTION, keys::APP)?;
    let user = required(overrides, defaults, DEFAULT_SECTION, keys::USER)?;
    let app_env = format!("{}-{}", app_name, environment);

    let section = file
        .section(&app_env)
        .ok_or_else(|| ConfigError::MissingSection {
            section: app_env.clone(),
            origin: file.origin().to_string(),
        })?;
    debug!(section = %section.name(), "Resolved active configuration section");

    let aws_region = lookup(overrides, Some(section), keys::REGION)
        .or_else(|| env_region(env))
        .ok_or_else(|| ConfigError::missing_key(&app_env, keys::REGION))?;
    let aws_account = lookup(overrides, Some(section), keys::ACCOUNT)
        .or_else(|| env_account(env))
        .ok_or_else(|| ConfigError::missing_key(&app_env, keys::ACCOUNT))?;

    let app_desc = required(overrides, Some(section), &app_env, keys::DESCRIPTION)?;
    // No default: an environment has to opt in or out of the git user
    let create_git_user = parse_flag(
        keys::CREATE_GIT_USER,
        &required(overrides, Some(section), &app_env, keys::CREATE_GIT_USER)?,
    )?;

    let branch =
        lookup(overrides, Some(section), keys::BRANCH).unwrap_or_else(|| DEFAULT_BRANCH.into());
    let build_image = lookup(overrides, Some(section), keys::BUILD_IMAGE);
    let asset_bucket = lookup(overrides, Some(section), keys::ASSET_BUCKET);
    let log_retention_days = lookup(overrides, Some(section), keys::LOG_RETENTION_DAYS)
        .map(|raw| {
            raw.trim().parse::<u32>().map_err(|e| {
                ConfigError::invalid_value(keys::LOG_RETENTION_DAYS, &raw, e.to_string())
            })
        })
        .transpose()?;

    Ok(ParameterSet {
        environment,
        app_name,
        user,
        app_env,
        aws_region,
        aws_account,
        app_desc,
        create_git_user,
        branch,
        build_image,
        log_retention_days,
        asset_bucket,
    })
}

/// Override first, then the given section. Empty strings never win.
fn lookup<O>(overrides: &O, section: Option<&Section>, key: &str) -> Option<String>
where
    O: OverrideSource + ?Sized,
{
    if let Some(value) = overrides.get(key).filter(|v| !v.is_empty()) {
        debug!(key, "Using override value");
        return Some(value);
    }
    section
        .and_then(|s| s.get(key))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn required<O>(
    overrides: &O,
    section: Option<&Section>,
    section_name: &str,
    key: &str,
) -> Result<String>
where
    O: OverrideSource + ?Sized,
{
    lookup(overrides, section, key).ok_or_else(|| ConfigError::missing_key(section_name, key))
}

fn env_region<E: EnvSource + ?Sized>(env: &E) -> Option<String> {
    non_empty(env.get("DEFAULT_REGION"))
        .or_else(|| non_empty(env.get_raw("AWS_REGION")))
        .or_else(|| non_empty(env.get_raw("AWS_DEFAULT_REGION")))
}

fn env_account<E: EnvSource + ?Sized>(env: &E) -> Option<String> {
    non_empty(env.get("DEFAULT_ACCOUNT")).or_else(|| non_empty(env.get_raw("AWS_ACCOUNT_ID")))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Accepts yes/no/true/false in any case.
pub(crate) fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" => Ok(true),
        "no" | "false" => Ok(false),
        _ => Err(ConfigError::invalid_value(
            key,
            raw,
            "expected 'yes' or 'no'",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Overrides;
    use std::collections::HashMap;

    struct MapEnv(HashMap<String, String>);

    impl MapEnv {
        fn empty() -> Self {
            Self(HashMap::new())
        }

        fn with(pairs: &[(&str, &str)]) -> Self {
            Self(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            )
        }
    }

    impl EnvSource for MapEnv {
        fn get(&self, key: &str) -> Option<String> {
            self.0.get(&format!("REPOPIPE_{}", key)).cloned()
        }

        fn get_raw(&self, key: &str) -> Option<String> {
            self.0.get(key).cloned()
        }
    }

    const CONFIG: &str = r#"
        [default]
        env = "dev"
        app = "demo"
        user = "alice"

        [demo-dev]
        awsRegion = "us-east-1"
        awsAccount = "123456789012"
        appDesc = "Demo application"
        createGitUser = "yes"

        [demo-prod]
        awsRegion = ""
        awsAccount = ""
        appDesc = "Demo production"
        createGitUser = "no"
        logRetentionDays = 30
    "#;

    fn file() -> ConfigFile {
        ConfigFile::from_toml_str(CONFIG, "parameters.toml").unwrap()
    }

    #[test]
    fn defaults_come_from_default_section() {
        let params = resolve(&Overrides::new(), &file(), &MapEnv::empty()).unwrap();
        assert_eq!(params.environment, "dev");
        assert_eq!(params.app_name, "demo");
        assert_eq!(params.user, "alice");
        assert_eq!(params.app_env, "demo-dev");
        assert_eq!(params.aws_region, "us-east-1");
        assert_eq!(params.aws_account, "123456789012");
        assert!(params.create_git_user);
        assert_eq!(params.branch, "main");
        assert_eq!(params.log_retention_days, None);
    }

    #[test]
    fn overrides_win_over_file_values() {
        let overrides = Overrides::from_pairs([
            "env=prod",
            "user=bob",
            "awsRegion=eu-west-1",
            "awsAccount=210987654321",
        ])
        .unwrap();
        let params = resolve(&overrides, &file(), &MapEnv::empty()).unwrap();
        assert_eq!(params.app_env, "demo-prod");
        assert_eq!(params.user, "bob");
        assert_eq!(params.aws_region, "eu-west-1");
        assert_eq!(params.aws_account, "210987654321");
        assert!(!params.create_git_user);
        assert_eq!(params.log_retention_days, Some(30));
    }

    #[test]
    fn empty_override_falls_through_to_file() {
        let overrides = Overrides::from_pairs(["env=", "app="]).unwrap();
        let params = resolve(&overrides, &file(), &MapEnv::empty()).unwrap();
        assert_eq!(params.app_env, "demo-dev");
    }

    #[test]
    fn unknown_environment_is_missing_section() {
        let overrides = Overrides::from_pairs(["env=staging"]).unwrap();
        let err = resolve(&overrides, &file(), &MapEnv::empty()).unwrap_err();
        match err {
            ConfigError::MissingSection { section, .. } => assert_eq!(section, "demo-staging"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_region_falls_back_to_environment() {
        let overrides = Overrides::from_pairs(["env=prod"]).unwrap();
        let env = MapEnv::with(&[
            ("AWS_REGION", "ap-southeast-2"),
            ("REPOPIPE_DEFAULT_ACCOUNT", "111122223333"),
        ]);
        let params = resolve(&overrides, &file(), &env).unwrap();
        assert_eq!(params.aws_region, "ap-southeast-2");
        assert_eq!(params.aws_account, "111122223333");
    }

    #[test]
    fn empty_prefixed_variable_does_not_shadow_aws_region() {
        let overrides = Overrides::from_pairs(["env=prod", "awsAccount=111122223333"]).unwrap();
        let env = MapEnv::with(&[
            ("REPOPIPE_DEFAULT_REGION", ""),
            ("AWS_DEFAULT_REGION", "ca-central-1"),
        ]);
        let params = resolve(&overrides, &file(), &env).unwrap();
        assert_eq!(params.aws_region, "ca-central-1");
    }

    #[test]
    fn file_region_wins_over_environment() {
        let env = MapEnv::with(&[("AWS_REGION", "ap-southeast-2")]);
        let params = resolve(&Overrides::new(), &file(), &env).unwrap();
        assert_eq!(params.aws_region, "us-east-1");
    }

    #[test]
    fn region_missing_everywhere_names_the_key() {
        let overrides = Overrides::from_pairs(["env=prod"]).unwrap();
        let err = resolve(&overrides, &file(), &MapEnv::empty()).unwrap_err();
        match err {
            ConfigError::MissingKey { section, key } => {
                assert_eq!(section, "demo-prod");
                assert_eq!(key, "awsRegion");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_default_section_requires_overrides() {
        let file = ConfigFile::from_toml_str(
            "[x-y]\nawsRegion='us-east-1'\nawsAccount='123456789012'\nappDesc='d'\ncreateGitUser='no'\n",
            "inline",
        )
        .unwrap();
        let err = resolve(&Overrides::new(), &file, &MapEnv::empty()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { ref key, .. } if key == "env"));

        let mut overrides = Overrides::new();
        overrides
            .set("env", Some("y".into()))
            .set("app", Some("x".into()))
            .set("user", Some("carol".into()));
        let params = resolve(&overrides, &file, &MapEnv::empty()).unwrap();
        assert_eq!(params.app_env, "x-y");
    }

    #[test]
    fn git_user_flag_is_required() {
        let file = ConfigFile::from_toml_str(
            "[demo-dev]\nawsRegion='us-east-1'\nawsAccount='123456789012'\nappDesc='d'\n",
            "inline",
        )
        .unwrap();
        let overrides = Overrides::from_pairs(["env=dev", "app=demo", "user=alice"]).unwrap();
        let err = resolve(&overrides, &file, &MapEnv::empty()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { ref key, .. } if key == "createGitUser"));

        let overrides =
            Overrides::from_pairs(["env=dev", "app=demo", "user=alice", "createGitUser=no"])
                .unwrap();
        assert!(!resolve(&overrides, &file, &MapEnv::empty()).unwrap().create_git_user);
    }

    #[test]
    fn flag_parsing() {
        assert!(parse_flag("createGitUser", "yes").unwrap());
        assert!(parse_flag("createGitUser", "TRUE").unwrap());
        assert!(!parse_flag("createGitUser", "no").unwrap());
        assert!(!parse_flag("createGitUser", "false").unwrap());
        assert!(parse_flag("createGitUser", "maybe").is_err());
    }

    #[test]
    fn bad_retention_is_invalid_value() {
        let overrides = Overrides::from_pairs(["logRetentionDays=forever"]).unwrap();
        let err = resolve(&overrides, &file(), &MapEnv::empty()).unwrap_err();
        assert_eq!(err.code(), "C003");
    }
}
