// Parameter validation
//
// Checks value shapes the provisioning engine would otherwise reject late.
// Resource naming rules live with the topology builder.

use crate::error::{ConfigError, Result};
use crate::{keys, ParameterSet};
use tracing::warn;

/// Retention periods accepted by CloudWatch Logs
const RETENTION_DAYS: &[u32] = &[
    1, 3, 5, 7, 14, 30, 60, 90, 120, 150, 180, 365, 400, 545, 731, 1096, 1827, 2192, 2557, 2922,
    3288, 3653,
];

const MAX_DESCRIPTION_LEN: usize = 1000;

pub fn validate_parameters(params: &ParameterSet) -> Result<()> {
    validate_account(&params.aws_account)?;
    validate_region(&params.aws_region)?;

    if params.app_desc.len() > MAX_DESCRIPTION_LEN {
        return Err(ConfigError::invalid_value(
            keys::DESCRIPTION,
            &params.app_desc,
            format!("must be at most {} characters", MAX_DESCRIPTION_LEN),
        ));
    }

    if let Some(days) = params.log_retention_days {
        if !RETENTION_DAYS.contains(&days) {
            return Err(ConfigError::invalid_value(
                keys::LOG_RETENTION_DAYS,
                &days.to_string(),
                "not a CloudWatch Logs retention period (1, 3, 5, 7, 14, 30, ...)",
            ));
        }
    }

    if params.branch.contains(char::is_whitespace) {
        return Err(ConfigError::invalid_value(
            keys::BRANCH,
            &params.branch,
            "branch names cannot contain whitespace",
        ));
    }

    if params.create_git_user {
        warn!(
            user = %format!("{}-git-user", params.app_env),
            "Bootstrap git user will be created without credentials; generate HTTPS git credentials or upload an SSH key after deploy"
        );
    }

    Ok(())
}

fn validate_account(account: &str) -> Result<()> {
    if account.len() != 12 || !account.chars().all(|c| c.is_ascii_digit()) {
        return Err(ConfigError::invalid_value(
            keys::ACCOUNT,
            account,
            "AWS account ids are 12 digits",
        ));
    }
    Ok(())
}

fn validate_region(region: &str) -> Result<()> {
    let well_formed = region.contains('-')
        && region
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !region.starts_with('-')
        && !region.ends_with('-');
    if !well_formed {
        return Err(ConfigError::invalid_value(
            keys::REGION,
            region,
            "expected a region code such as 'us-east-1'",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ParameterSet {
        ParameterSet {
            environment: "dev".into(),
            app_name: "demo".into(),
            user: "alice".into(),
            app_env: "demo-dev".into(),
            aws_region: "us-east-1".into(),
            aws_account: "123456789012".into(),
            app_desc: "Demo".into(),
            create_git_user: false,
            branch: "main".into(),
            build_image: None,
            log_retention_days: None,
            asset_bucket: None,
        }
    }

    #[test]
    fn accepts_well_formed_parameters() {
        assert!(validate_parameters(&params()).is_ok());
    }

    #[test]
    fn rejects_short_account() {
        let mut p = params();
        p.aws_account = "12345".into();
        assert!(validate_parameters(&p).is_err());
    }

    #[test]
    fn rejects_uppercase_region() {
        let mut p = params();
        p.aws_region = "US-EAST-1".into();
        assert!(validate_parameters(&p).is_err());
    }

    #[test]
    fn retention_must_be_supported_value() {
        let mut p = params();
        p.log_retention_days = Some(14);
        assert!(validate_parameters(&p).is_ok());
        p.log_retention_days = Some(15);
        assert!(validate_parameters(&p).is_err());
    }
}
