//! Per-resource rendering

use super::iam::{allow, managed_policy, role_policy, service_role};
use super::{get_att, reference, sub, CfnResource, DeletionPolicy, Template};
use crate::assets::StagedAsset;
use crate::error::GraphError;
use crate::topology::{
    Action, ArtifactStore, BootstrapIdentity, BuildProject, Encryption, Graph, LogDestination,
    Pipeline, RemovalPolicy, Repository, Stage, Tag, ValueRef,
};
use serde_json::{json, Value};

/// Logical ids of resources that exist only in the rendered template
pub mod supporting_ids {
    pub const ARTIFACT_KEY: &str = "PipelineArtifactsKey";
    pub const ARTIFACT_KEY_ALIAS: &str = "PipelineArtifactsKeyAlias";
    pub const PIPELINE_ROLE: &str = "PipelineRole";
    pub const PIPELINE_POLICY: &str = "PipelineRolePolicy";
    pub const BUILD_ROLE: &str = "BuildProjectRole";
    pub const BUILD_POLICY: &str = "BuildProjectRolePolicy";
    pub const DEPLOY_ROLE: &str = "ChangeSetDeployRole";
    pub const EVENTS_ROLE: &str = "SourceEventRole";
    pub const EVENTS_POLICY: &str = "SourceEventRolePolicy";
    pub const SOURCE_RULE: &str = "SourceChangeRule";
    pub const AUTO_DELETE_ROLE: &str = "AutoDeleteObjectsRole";
    pub const AUTO_DELETE_POLICY: &str = "AutoDeleteObjectsRolePolicy";
    pub const AUTO_DELETE_FUNCTION: &str = "AutoDeleteObjectsFunction";
    pub const AUTO_DELETE_OBJECTS: &str = "PipelineArtifactsBucketAutoDeleteObjects";
}

use supporting_ids as ids;

const AUTO_DELETE_HANDLER: &str = r#"import boto3
import cfnresponse

s3 = boto3.resource("s3")


def handler(event, context):
    try:
        if event["RequestType"] == "Delete":
            bucket = s3.Bucket(event["ResourceProperties"]["BucketName"])
            bucket.object_versions.delete()
            bucket.objects.all().delete()
        cfnresponse.send(event, context, cfnresponse.SUCCESS, {})
    except Exception as exc:
        print(exc)
        cfnresponse.send(event, context, cfnresponse.FAILED, {"Error": str(exc)})
"#;

const AUTO_DELETE_RUNTIME: &str = "python3.12";

pub(super) fn render_resources(
    template: &mut Template,
    graph: &Graph,
    asset: &StagedAsset,
) -> Result<(), GraphError> {
    let tags = tag_list(&graph.tags);

    template.insert(
        &graph.repository.logical_id,
        repository(&graph.repository, asset, &tags),
    )?;
    if let Some(identity) = &graph.bootstrap_identity {
        let (user, policy) = bootstrap_identity(identity, &tags);
        template.insert(&identity.logical_id, user)?;
        template.insert(&identity.policy_logical_id, policy)?;
    }

    artifact_store(template, &graph.artifact_store, &tags)?;
    artifact_key(template, &graph.pipeline, &tags)?;

    let logging = &graph.build_project.logging;
    template.insert(&logging.logical_id, log_group(logging, &tags))?;
    build_project(template, &graph.build_project, &graph.artifact_store, &tags)?;
    pipeline(template, graph, &tags)?;
    source_trigger(template, graph, &tags)?;
    Ok(())
}

fn tag_list(tags: &[Tag]) -> Value {
    Value::Array(
        tags.iter()
            .map(|t| json!({ "Key": t.key, "Value": t.value }))
            .collect(),
    )
}

fn removal(policy: RemovalPolicy) -> DeletionPolicy {
    match policy {
        RemovalPolicy::Destroy => DeletionPolicy::Delete,
        RemovalPolicy::Retain => DeletionPolicy::Retain,
    }
}

fn repository(repo: &Repository, asset: &StagedAsset, tags: &Value) -> CfnResource {
    CfnResource::new(
        "AWS::CodeCommit::Repository",
        json!({
            "RepositoryName": repo.name,
            "RepositoryDescription": repo.description,
            "Code": {
                "BranchName": repo.default_branch,
                "S3": { "Bucket": asset.bucket, "Key": asset.object_key },
            },
            "Tags": tags,
        }),
    )
}

fn bootstrap_identity(identity: &BootstrapIdentity, tags: &Value) -> (CfnResource, CfnResource) {
    let user = CfnResource::new(
        "AWS::IAM::User",
        json!({ "UserName": identity.user_name, "Tags": tags }),
    );

    let actions: Vec<&str> = identity.permissions.iter().map(|p| p.action()).collect();
    let policy = CfnResource::new(
        "AWS::IAM::Policy",
        json!({
            "PolicyName": identity.policy_name,
            "Users": [reference(&identity.logical_id)],
            "PolicyDocument": super::iam::document(vec![json!({
                "Effect": "Allow",
                "Action": actions,
                "Resource": get_att(&identity.repository, "Arn"),
            })]),
        }),
    );
    (user, policy)
}

fn artifact_store(
    template: &mut Template,
    store: &ArtifactStore,
    tags: &Value,
) -> Result<(), GraphError> {
    let algorithm = match store.encryption {
        Encryption::S3Managed => "AES256",
    };
    let bucket = CfnResource::new(
        "AWS::S3::Bucket",
        json!({
            "BucketEncryption": {
                "ServerSideEncryptionConfiguration": [
                    { "ServerSideEncryptionByDefault": { "SSEAlgorithm": algorithm } }
                ]
            },
            "PublicAccessBlockConfiguration": {
                "BlockPublicAcls": true,
                "BlockPublicPolicy": true,
                "IgnorePublicAcls": true,
                "RestrictPublicBuckets": true,
            },
            "Tags": tags,
        }),
    )
    .removal(removal(store.removal_policy));
    template.insert(&store.logical_id, bucket)?;

    if store.auto_delete_objects {
        auto_delete_objects(template, &store.logical_id, tags)?;
    }
    Ok(())
}

/// Custom resource that empties the bucket when the stack deletes it
fn auto_delete_objects(
    template: &mut Template,
    bucket: &str,
    tags: &Value,
) -> Result<(), GraphError> {
    template.insert(
        ids::AUTO_DELETE_ROLE,
        service_role(
            "lambda.amazonaws.com",
            vec![managed_policy("service-role/AWSLambdaBasicExecutionRole")],
            tags,
        ),
    )?;
    template.insert(
        ids::AUTO_DELETE_POLICY,
        role_policy(
            ids::AUTO_DELETE_POLICY,
            ids::AUTO_DELETE_ROLE,
            vec![allow(
                &["s3:GetBucket*", "s3:List*", "s3:DeleteObject*"],
                bucket_and_objects(bucket),
            )],
        ),
    )?;
    template.insert(
        ids::AUTO_DELETE_FUNCTION,
        CfnResource::new(
            "AWS::Lambda::Function",
            json!({
                "Runtime": AUTO_DELETE_RUNTIME,
                "Handler": "index.handler",
                "Timeout": 900,
                "MemorySize": 128,
                "Role": get_att(ids::AUTO_DELETE_ROLE, "Arn"),
                "Code": { "ZipFile": AUTO_DELETE_HANDLER },
                "Tags": tags,
            }),
        )
        .depends_on(ids::AUTO_DELETE_ROLE),
    )?;
    template.insert(
        ids::AUTO_DELETE_OBJECTS,
        CfnResource::new(
            "Custom::S3AutoDeleteObjects",
            json!({
                "ServiceToken": get_att(ids::AUTO_DELETE_FUNCTION, "Arn"),
                "BucketName": reference(bucket),
            }),
        )
        .depends_on(ids::AUTO_DELETE_POLICY)
        .removal(DeletionPolicy::Delete),
    )
}

fn bucket_and_objects(bucket: &str) -> Vec<Value> {
    vec![
        get_att(bucket, "Arn"),
        json!({ "Fn::Join": ["", [get_att(bucket, "Arn"), "/*"]] }),
    ]
}

/// Customer-managed key shared by the artifact store and build project
fn artifact_key(
    template: &mut Template,
    pipeline: &Pipeline,
    tags: &Value,
) -> Result<(), GraphError> {
    if !pipeline.cross_account_keys {
        return Ok(());
    }
    template.insert(
        ids::ARTIFACT_KEY,
        CfnResource::new(
            "AWS::KMS::Key",
            json!({
                "KeyPolicy": super::iam::document(vec![json!({
                    "Effect": "Allow",
                    "Principal": { "AWS": sub("arn:${AWS::Partition}:iam::${AWS::AccountId}:root") },
                    "Action": "kms:*",
                    "Resource": "*",
                })]),
                "Tags": tags,
            }),
        )
        .removal(DeletionPolicy::Delete),
    )?;
    template.insert(
        ids::ARTIFACT_KEY_ALIAS,
        CfnResource::new(
            "AWS::KMS::Alias",
            json!({
                "AliasName": format!("alias/codepipeline-{}", pipeline.name.to_lowercase()),
                "TargetKeyId": get_att(ids::ARTIFACT_KEY, "Arn"),
            }),
        )
        .removal(DeletionPolicy::Delete),
    )
}

fn key_statement() -> Value {
    allow(
        &[
            "kms:Decrypt",
            "kms:DescribeKey",
            "kms:Encrypt",
            "kms:ReEncrypt*",
            "kms:GenerateDataKey*",
        ],
        vec![get_att(ids::ARTIFACT_KEY, "Arn")],
    )
}

fn log_group(logging: &LogDestination, tags: &Value) -> CfnResource {
    let mut properties = json!({ "Tags": tags });
    if let Some(days) = logging.retention_days {
        properties["RetentionInDays"] = json!(days);
    }
    CfnResource::new("AWS::Logs::LogGroup", properties).removal(removal(logging.removal_policy))
}

fn build_project(
    template: &mut Template,
    project: &BuildProject,
    store: &ArtifactStore,
    tags: &Value,
) -> Result<(), GraphError> {
    let log_group_arn = get_att(&project.logging.logical_id, "Arn");
    let mut statements = vec![
        allow(
            &["logs:CreateLogStream", "logs:PutLogEvents"],
            vec![
                log_group_arn.clone(),
                json!({ "Fn::Join": ["", [log_group_arn, ":*"]] }),
            ],
        ),
        allow(
            &[
                "s3:GetObject*",
                "s3:GetBucket*",
                "s3:List*",
                "s3:PutObject",
                "s3:PutObjectLegalHold",
                "s3:PutObjectRetention",
                "s3:PutObjectTagging",
                "s3:PutObjectVersionTagging",
                "s3:Abort*",
            ],
            bucket_and_objects(&store.logical_id),
        ),
    ];
    let cross_account_keys = template.resource(ids::ARTIFACT_KEY).is_some();
    if cross_account_keys {
        statements.push(key_statement());
    }

    template.insert(
        ids::BUILD_ROLE,
        service_role("codebuild.amazonaws.com", Vec::new(), tags),
    )?;
    template.insert(
        ids::BUILD_POLICY,
        role_policy(ids::BUILD_POLICY, ids::BUILD_ROLE, statements),
    )?;

    let variables: Vec<Value> = project
        .environment_variables
        .iter()
        .map(|var| {
            let value = match &var.value {
                ValueRef::Literal(value) => Value::String(value.clone()),
                ValueRef::NameOf(logical_id) => reference(logical_id),
            };
            json!({ "Name": var.name, "Type": "PLAINTEXT", "Value": value })
        })
        .collect();

    let mut properties = json!({
        "Name": project.name,
        "ServiceRole": get_att(ids::BUILD_ROLE, "Arn"),
        "Source": { "Type": "CODEPIPELINE", "BuildSpec": project.build_spec },
        "Artifacts": { "Type": "CODEPIPELINE" },
        "Environment": {
            "Type": "LINUX_CONTAINER",
            "ComputeType": project.compute_type,
            "Image": project.image,
            "ImagePullCredentialsType": "CODEBUILD",
            "PrivilegedMode": project.privileged,
            "EnvironmentVariables": variables,
        },
        "LogsConfig": {
            "CloudWatchLogs": {
                "Status": "ENABLED",
                "GroupName": reference(&project.logging.logical_id),
            }
        },
        "Tags": tags,
    });
    if cross_account_keys {
        properties["EncryptionKey"] = get_att(ids::ARTIFACT_KEY, "Arn");
    }

    template.insert(
        &project.logical_id,
        CfnResource::new("AWS::CodeBuild::Project", properties).depends_on(ids::BUILD_POLICY),
    )
}

fn artifacts(artifacts: Vec<&crate::topology::Artifact>) -> Value {
    Value::Array(
        artifacts
            .into_iter()
            .map(|a| json!({ "Name": a.name() }))
            .collect(),
    )
}

fn action_type(category: &str, provider: &str) -> Value {
    json!({
        "Category": category,
        "Owner": "AWS",
        "Provider": provider,
        "Version": "1",
    })
}

fn stage(stage: &Stage) -> Value {
    let action = &stage.action;
    let (type_id, configuration) = match action {
        Action::CodeCommitSource {
            repository, branch, ..
        } => (
            action_type("Source", "CodeCommit"),
            json!({
                "RepositoryName": repository,
                "BranchName": branch,
                // Started by the source-change event rule instead
                "PollForSourceChanges": false,
            }),
        ),
        Action::CodeBuild { project, .. } => (
            action_type("Build", "CodeBuild"),
            json!({ "ProjectName": reference(project) }),
        ),
        Action::CreateReplaceChangeSet {
            stack_name,
            change_set_name,
            template_path,
            capabilities,
            admin_permissions,
            ..
        } => {
            let capabilities: Vec<&str> = capabilities.iter().map(|c| c.as_str()).collect();
            let mut configuration = json!({
                "ActionMode": "CHANGE_SET_REPLACE",
                "StackName": stack_name,
                "ChangeSetName": change_set_name,
                "TemplatePath": template_path.to_string(),
                "Capabilities": capabilities.join(","),
            });
            if *admin_permissions {
                configuration["RoleArn"] = get_att(ids::DEPLOY_ROLE, "Arn");
            }
            (action_type("Deploy", "CloudFormation"), configuration)
        }
        Action::ExecuteChangeSet {
            stack_name,
            change_set_name,
            ..
        } => (
            action_type("Deploy", "CloudFormation"),
            json!({
                "ActionMode": "CHANGE_SET_EXECUTE",
                "StackName": stack_name,
                "ChangeSetName": change_set_name,
            }),
        ),
    };

    let mut rendered = json!({
        "Name": action.name(),
        "ActionTypeId": type_id,
        "Configuration": configuration,
        "RunOrder": 1,
    });
    let inputs = action.inputs();
    if !inputs.is_empty() {
        rendered["InputArtifacts"] = artifacts(inputs);
    }
    let outputs = action.outputs();
    if !outputs.is_empty() {
        rendered["OutputArtifacts"] = artifacts(outputs);
    }

    json!({ "Name": stage.name(), "Actions": [rendered] })
}

fn pipeline(template: &mut Template, graph: &Graph, tags: &Value) -> Result<(), GraphError> {
    let pipeline = &graph.pipeline;
    let store = &pipeline.artifact_store;

    let mut statements = vec![
        allow(
            &[
                "s3:GetObject*",
                "s3:GetBucket*",
                "s3:List*",
                "s3:DeleteObject*",
                "s3:PutObject",
                "s3:Abort*",
            ],
            bucket_and_objects(store),
        ),
        allow(
            &[
                "codecommit:GetBranch",
                "codecommit:GetCommit",
                "codecommit:UploadArchive",
                "codecommit:GetUploadArchiveStatus",
                "codecommit:CancelUploadArchive",
            ],
            vec![get_att(&graph.repository.logical_id, "Arn")],
        ),
        allow(
            &["codebuild:BatchGetBuilds", "codebuild:StartBuild", "codebuild:StopBuild"],
            vec![get_att(&graph.build_project.logical_id, "Arn")],
        ),
        allow(
            &[
                "cloudformation:CreateChangeSet",
                "cloudformation:DeleteChangeSet",
                "cloudformation:DescribeChangeSet",
                "cloudformation:DescribeStacks",
                "cloudformation:ExecuteChangeSet",
            ],
            change_set_stacks(pipeline),
        ),
    ];
    if pipeline.cross_account_keys {
        statements.push(key_statement());
    }

    let needs_deploy_role = pipeline.stages.iter().any(|s| {
        matches!(
            s.action,
            Action::CreateReplaceChangeSet {
                admin_permissions: true,
                ..
            }
        )
    });
    if needs_deploy_role {
        template.insert(
            ids::DEPLOY_ROLE,
            service_role(
                "cloudformation.amazonaws.com",
                vec![managed_policy("AdministratorAccess")],
                tags,
            ),
        )?;
        statements.push(allow(
            &["iam:PassRole"],
            vec![get_att(ids::DEPLOY_ROLE, "Arn")],
        ));
    }

    template.insert(
        ids::PIPELINE_ROLE,
        service_role("codepipeline.amazonaws.com", Vec::new(), tags),
    )?;
    template.insert(
        ids::PIPELINE_POLICY,
        role_policy(ids::PIPELINE_POLICY, ids::PIPELINE_ROLE, statements),
    )?;

    let mut artifact_store = json!({ "Type": "S3", "Location": reference(store) });
    if pipeline.cross_account_keys {
        artifact_store["EncryptionKey"] = json!({
            "Type": "KMS",
            "Id": get_att(ids::ARTIFACT_KEY, "Arn"),
        });
    }

    let stages: Vec<Value> = pipeline.stages.iter().map(stage).collect();
    template.insert(
        &pipeline.logical_id,
        CfnResource::new(
            "AWS::CodePipeline::Pipeline",
            json!({
                "Name": pipeline.name,
                "RoleArn": get_att(ids::PIPELINE_ROLE, "Arn"),
                "RestartExecutionOnUpdate": pipeline.restart_execution_on_update,
                "ArtifactStore": artifact_store,
                "Stages": stages,
                "Tags": tags,
            }),
        )
        .depends_on(ids::PIPELINE_POLICY),
    )
}

/// Stacks the pipeline may create and execute change sets against
fn change_set_stacks(pipeline: &Pipeline) -> Vec<Value> {
    let mut stacks: Vec<&str> = pipeline
        .stages
        .iter()
        .filter_map(|s| match &s.action {
            Action::CreateReplaceChangeSet { stack_name, .. }
            | Action::ExecuteChangeSet { stack_name, .. } => Some(stack_name.as_str()),
            _ => None,
        })
        .collect();
    stacks.dedup();
    stacks
        .into_iter()
        .map(|name| {
            sub(format!(
                "arn:${{AWS::Partition}}:cloudformation:${{AWS::Region}}:${{AWS::AccountId}}:stack/{}/*",
                name
            ))
        })
        .collect()
}

/// Start the pipeline on commits to the tracked branch
fn source_trigger(template: &mut Template, graph: &Graph, tags: &Value) -> Result<(), GraphError> {
    let pipeline_arn = sub(format!(
        "arn:${{AWS::Partition}}:codepipeline:${{AWS::Region}}:${{AWS::AccountId}}:${{{}}}",
        graph.pipeline.logical_id
    ));

    template.insert(
        ids::EVENTS_ROLE,
        service_role("events.amazonaws.com", Vec::new(), tags),
    )?;
    template.insert(
        ids::EVENTS_POLICY,
        role_policy(
            ids::EVENTS_POLICY,
            ids::EVENTS_ROLE,
            vec![allow(
                &["codepipeline:StartPipelineExecution"],
                vec![pipeline_arn.clone()],
            )],
        ),
    )?;
    template.insert(
        ids::SOURCE_RULE,
        CfnResource::new(
            "AWS::Events::Rule",
            json!({
                "State": "ENABLED",
                "EventPattern": {
                    "source": ["aws.codecommit"],
                    "resources": [get_att(&graph.repository.logical_id, "Arn")],
                    "detail-type": ["CodeCommit Repository State Change"],
                    "detail": {
                        "event": ["referenceCreated", "referenceUpdated"],
                        "referenceName": [graph.repository.default_branch],
                    },
                },
                "Targets": [{
                    "Arn": pipeline_arn,
                    "Id": "Target0",
                    "RoleArn": get_att(ids::EVENTS_ROLE, "Arn"),
                }],
            }),
        ),
    )
}
