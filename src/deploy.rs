//! `deploy` command: create or update the stack through CloudFormation
//!
//! Synthesis runs to completion first; nothing is sent to AWS unless the
//! template rendered cleanly. The caller's account must match `awsAccount`.
//! The zipped seed payload is uploaded to the asset bucket, then the stack is
//! created when absent and updated otherwise, and polled until it reaches a
//! terminal status.

use crate::params::ParameterArgs;
use crate::synth::DEFAULT_STACK_NAME;
use anyhow::Result;
use clap::Args;

#[derive(Args, Debug, Clone)]
pub struct DeployArgs {
    /// Name of the stack to create or update
    #[arg(long, default_value = DEFAULT_STACK_NAME)]
    pub stack_name: String,

    /// Return once the request is accepted instead of waiting for completion
    #[arg(long)]
    pub no_wait: bool,
}

#[cfg(feature = "provision")]
pub fn run(args: DeployArgs, params: &ParameterArgs) -> Result<()> {
    use anyhow::Context;
    use repopipe_core::synthesize;

    let parameters = params.load()?;
    let synthesis = synthesize(&parameters, &params.catalog())
        .with_context(|| format!("Failed to synthesize {}", parameters.app_env))?;
    let seed = synthesis
        .asset
        .archive()
        .context("Failed to package repository seed")?;

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(stack::deploy(&args, &parameters, &synthesis, seed))
}

#[cfg(not(feature = "provision"))]
pub fn run(_args: DeployArgs, _params: &ParameterArgs) -> Result<()> {
    anyhow::bail!(
        "deploy is not available in this build.\n\
        Rebuild with --features provision, or deploy the output of `repopipe synth` with the AWS CLI."
    )
}

/// Decisions taken on CloudFormation, STS and S3 responses
#[cfg_attr(not(feature = "provision"), allow(dead_code))]
mod status {
    use anyhow::{bail, Result};

    pub(super) const NO_UPDATES: &str = "No updates are to be performed";

    /// Region whose buckets are created without a location constraint
    const DEFAULT_S3_REGION: &str = "us-east-1";

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(super) enum Progress {
        Waiting,
        Complete,
        Failed,
    }

    /// Where a stack status leaves the deployment. An empty status has not
    /// been reported yet and keeps the poll going.
    pub(super) fn classify(status: &str) -> Progress {
        if status.is_empty() || status.ends_with("_IN_PROGRESS") {
            Progress::Waiting
        } else if status.contains("ROLLBACK") || status.ends_with("_FAILED") {
            Progress::Failed
        } else {
            Progress::Complete
        }
    }

    /// An update rejected only because the template is unchanged
    pub(super) fn is_no_updates(message: Option<&str>) -> bool {
        message.is_some_and(|m| m.contains(NO_UPDATES))
    }

    /// Refuse credentials that resolve to an account other than `awsAccount`
    pub(super) fn check_account(expected: &str, caller: Option<&str>) -> Result<()> {
        match caller {
            Some(account) if account == expected => Ok(()),
            Some(account) => bail!(
                "Credentials belong to account {}, but awsAccount is {}.\n\
                Switch credentials or correct parameters.toml before deploying.",
                account,
                expected
            ),
            None => bail!("Could not determine the account of the current credentials"),
        }
    }

    /// Location constraint for `CreateBucket`, absent in us-east-1
    pub(super) fn bucket_location(region: &str) -> Option<&str> {
        (region != DEFAULT_S3_REGION).then_some(region)
    }
}

#[cfg(feature = "provision")]
mod stack {
    use super::status::{self, Progress};
    use super::DeployArgs;
    use crate::synth::print_outputs;
    use anyhow::{bail, Context, Result};
    use aws_config::{BehaviorVersion, Region, SdkConfig};
    use aws_sdk_cloudformation::error::ProvideErrorMetadata;
    use aws_sdk_cloudformation::types::{Capability, Stack, Tag};
    use aws_sdk_cloudformation::Client;
    use aws_sdk_s3::primitives::ByteStream;
    use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
    use repopipe_config::ParameterSet;
    use repopipe_core::{StagedAsset, Synthesis};
    use std::time::Duration;
    use tracing::{debug, info, warn};

    const POLL_INTERVAL: Duration = Duration::from_secs(5);
    const MAX_POLLS: u32 = 360;

    pub(super) async fn deploy(
        args: &DeployArgs,
        parameters: &ParameterSet,
        synthesis: &Synthesis,
        seed: Vec<u8>,
    ) -> Result<()> {
        let body = synthesis.template.to_json()?;
        let tags: Vec<Tag> = synthesis
            .graph
            .tags
            .iter()
            .map(|t| Tag::builder().key(&t.key).value(&t.value).build())
            .collect();
        let capabilities = vec![
            Capability::CapabilityNamedIam,
            Capability::CapabilityAutoExpand,
        ];

        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(parameters.aws_region.clone()))
            .load()
            .await;

        verify_account(&config, &parameters.aws_account).await?;
        publish_seed(&config, &parameters.aws_region, &synthesis.asset, seed).await?;

        let client = Client::new(&config);
        if describe(&client, &args.stack_name).await?.is_some() {
            info!("Updating stack: {}", args.stack_name);
            let result = client
                .update_stack()
                .stack_name(&args.stack_name)
                .template_body(&body)
                .set_capabilities(Some(capabilities))
                .set_tags(Some(tags))
                .send()
                .await;
            if let Err(err) = result {
                if status::is_no_updates(err.message()) {
                    println!("Stack {} is up to date", args.stack_name);
                    return Ok(());
                }
                return Err(err).context("Failed to update stack");
            }
        } else {
            info!("Creating stack: {}", args.stack_name);
            client
                .create_stack()
                .stack_name(&args.stack_name)
                .template_body(&body)
                .set_capabilities(Some(capabilities))
                .set_tags(Some(tags))
                .send()
                .await
                .context("Failed to create stack")?;
        }

        if args.no_wait {
            println!("Deployment of {} started", args.stack_name);
            println!();
            print_outputs(&synthesis.outputs);
            return Ok(());
        }

        let stack = wait(&client, &args.stack_name).await?;
        println!();
        println!("Deployed {}", args.stack_name);
        println!();
        println!("Outputs:");
        for output in stack.outputs() {
            println!(
                "  {} = {}",
                output.output_key().unwrap_or_default(),
                output.output_value().unwrap_or_default()
            );
        }
        Ok(())
    }

    async fn verify_account(config: &SdkConfig, expected: &str) -> Result<()> {
        let identity = aws_sdk_sts::Client::new(config)
            .get_caller_identity()
            .send()
            .await
            .context("Failed to resolve the caller identity")?;
        status::check_account(expected, identity.account())?;
        debug!(account = %expected, "Caller account matches awsAccount");
        Ok(())
    }

    /// Make sure the asset bucket exists and holds the seed archive. The key is
    /// content-addressed, so an existing object is left alone.
    async fn publish_seed(
        config: &SdkConfig,
        region: &str,
        asset: &StagedAsset,
        seed: Vec<u8>,
    ) -> Result<()> {
        let s3 = aws_sdk_s3::Client::new(config);

        match s3.head_bucket().bucket(&asset.bucket).send().await {
            Ok(_) => {}
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => {
                info!("Creating asset bucket: {}", asset.bucket);
                let mut request = s3.create_bucket().bucket(&asset.bucket);
                if let Some(location) = status::bucket_location(region) {
                    request = request.create_bucket_configuration(
                        CreateBucketConfiguration::builder()
                            .location_constraint(BucketLocationConstraint::from(location))
                            .build(),
                    );
                }
                request
                    .send()
                    .await
                    .with_context(|| format!("Failed to create bucket {}", asset.bucket))?;
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Failed to access bucket {}", asset.bucket))
            }
        }

        let existing = s3
            .head_object()
            .bucket(&asset.bucket)
            .key(&asset.object_key)
            .send()
            .await;
        match existing {
            Ok(_) => {
                debug!(key = %asset.object_key, "Repository seed already published");
                return Ok(());
            }
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => {}
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("Failed to check s3://{}/{}", asset.bucket, asset.object_key)
                })
            }
        }

        info!(
            bucket = %asset.bucket,
            key = %asset.object_key,
            bytes = seed.len(),
            "Publishing repository seed"
        );
        s3.put_object()
            .bucket(&asset.bucket)
            .key(&asset.object_key)
            .content_type("application/zip")
            .body(ByteStream::from(seed))
            .send()
            .await
            .with_context(|| {
                format!("Failed to upload s3://{}/{}", asset.bucket, asset.object_key)
            })?;
        Ok(())
    }

    /// Current description of the stack, or `None` when it does not exist
    async fn describe(client: &Client, stack_name: &str) -> Result<Option<Stack>> {
        match client.describe_stacks().stack_name(stack_name).send().await {
            Ok(resp) => Ok(resp.stacks().first().cloned()),
            Err(err) if err.message().is_some_and(|m| m.contains("does not exist")) => Ok(None),
            Err(err) => Err(err).context("Failed to describe stack"),
        }
    }

    async fn wait(client: &Client, stack_name: &str) -> Result<Stack> {
        for _ in 0..MAX_POLLS {
            tokio::time::sleep(POLL_INTERVAL).await;

            let Some(stack) = describe(client, stack_name).await? else {
                bail!("Stack {} disappeared while waiting", stack_name);
            };
            let status = stack
                .stack_status()
                .map(|s| s.as_str().to_string())
                .unwrap_or_default();

            match status::classify(&status) {
                Progress::Waiting => info!("Waiting for {}: {}", stack_name, status),
                Progress::Failed => {
                    let reason = stack.stack_status_reason().unwrap_or("no reason reported");
                    bail!("Stack {} ended in {}: {}", stack_name, status, reason);
                }
                Progress::Complete => return Ok(stack),
            }
        }

        warn!("Gave up waiting for {}", stack_name);
        bail!(
            "Timed out after {}s waiting for stack {}",
            POLL_INTERVAL.as_secs() * u64::from(MAX_POLLS),
            stack_name
        )
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn graph_tags_become_stack_tags() {
            let tag = Tag::builder().key("app").value("demo").build();
            assert_eq!(tag.key(), Some("app"));
            assert_eq!(tag.value(), Some("demo"));
        }

        #[test]
        fn us_east_1_buckets_have_no_location_constraint() {
            assert!(status::bucket_location("us-east-1").is_none());
            let location = status::bucket_location("eu-west-1").map(BucketLocationConstraint::from);
            assert_eq!(location, Some(BucketLocationConstraint::EuWest1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::status::*;

    #[test]
    fn stack_statuses_are_classified() {
        assert_eq!(classify("CREATE_COMPLETE"), Progress::Complete);
        assert_eq!(classify("UPDATE_COMPLETE"), Progress::Complete);
        assert_eq!(classify("CREATE_IN_PROGRESS"), Progress::Waiting);
        assert_eq!(
            classify("UPDATE_COMPLETE_CLEANUP_IN_PROGRESS"),
            Progress::Waiting
        );
        assert_eq!(classify("UPDATE_ROLLBACK_COMPLETE"), Progress::Failed);
        assert_eq!(classify("ROLLBACK_COMPLETE"), Progress::Failed);
        assert_eq!(classify("CREATE_FAILED"), Progress::Failed);
        assert_eq!(classify(""), Progress::Waiting);
    }

    #[test]
    fn unchanged_template_is_not_an_error() {
        assert!(is_no_updates(Some("No updates are to be performed.")));
        assert!(!is_no_updates(Some("Template format error")));
        assert!(!is_no_updates(None));
    }

    #[test]
    fn caller_account_must_match() {
        assert!(check_account("123456789012", Some("123456789012")).is_ok());

        let err = check_account("123456789012", Some("210987654321")).unwrap_err();
        assert!(err.to_string().contains("210987654321"));
        assert!(check_account("123456789012", None).is_err());
    }

    #[test]
    fn bucket_location_skips_default_region() {
        assert_eq!(bucket_location("us-east-1"), None);
        assert_eq!(bucket_location("eu-west-1"), Some("eu-west-1"));
    }
}
