use anyhow::Result;
use repopipe::synth::{write, TemplateFormat};
use repopipe::ParameterArgs;
use repopipe_config::EnvSource;
use repopipe_core::synthesize;
use serde_json::Value;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

const PARAMETERS: &str = r#"
[default]
env = "dev"
app = "demo"
user = "alice"

[demo-dev]
awsRegion = "us-east-1"
awsAccount = "123456789012"
appDesc = "Demo application"
createGitUser = "no"

[demo-prod]
awsRegion = "eu-west-1"
awsAccount = "123456789012"
appDesc = "Demo application"
createGitUser = "yes"
"#;

struct NoEnv;

impl EnvSource for NoEnv {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }

    fn get_raw(&self, _key: &str) -> Option<String> {
        None
    }
}

/// Workspace with a parameters file and a default payload
fn workspace() -> Result<TempDir> {
    let dir = TempDir::new()?;
    fs::write(dir.path().join("parameters.toml"), PARAMETERS)?;
    let payload = dir.path().join("boilerplate/default-repo");
    fs::create_dir_all(&payload)?;
    fs::write(payload.join("buildspec.yml"), "version: 0.2\n")?;
    Ok(dir)
}

fn args(dir: &Path) -> ParameterArgs {
    ParameterArgs {
        config: Some(dir.join("parameters.toml")),
        boilerplate: Some(dir.join("boilerplate")),
        ..Default::default()
    }
}

fn read_json(path: &Path) -> Result<Value> {
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

#[test]
fn dev_environment_synthesizes_without_git_user() -> Result<()> {
    let dir = workspace()?;
    let args = args(dir.path());
    let params = args.load_with_env(&NoEnv)?;
    let synthesis = synthesize(&params, &args.catalog())?;

    let out = dir.path().join("out");
    let written = write(&synthesis, &out, "RepoPipelineStack", TemplateFormat::Json)?;
    assert_eq!(written.template, out.join("RepoPipelineStack.template.json"));

    let template = read_json(&written.template)?;
    assert_eq!(
        template["Resources"]["Repository"]["Properties"]["RepositoryName"],
        "demo-dev-repo"
    );
    assert_eq!(
        template["Resources"]["Pipeline"]["Properties"]["Name"],
        "pipeline-demo-dev"
    );
    assert!(template["Resources"].get("GitIamUser").is_none());

    let outputs: Vec<&String> = template["Outputs"].as_object().unwrap().keys().collect();
    assert_eq!(
        outputs,
        vec!["GitRepoCloneUrlGrc", "GitRepoCloneUrlHttp", "GitRepoCloneUrlSsh"]
    );

    let manifest = read_json(&written.manifest)?;
    let asset = &manifest["assets"][0];
    assert_eq!(asset["bucket"], "repopipe-assets-123456789012-us-east-1");
    assert_eq!(
        template["Resources"]["Repository"]["Properties"]["Code"]["S3"]["Key"],
        asset["objectKey"]
    );
    Ok(())
}

#[test]
fn synth_writes_seed_archive_under_object_key() -> Result<()> {
    let dir = workspace()?;
    let src = dir.path().join("boilerplate/default-repo/src");
    fs::create_dir_all(&src)?;
    fs::write(src.join("app.py"), "def handler(event, context):\n    return {}\n")?;

    let args = args(dir.path());
    let params = args.load_with_env(&NoEnv)?;
    let synthesis = synthesize(&params, &args.catalog())?;
    let out = dir.path().join("out");
    let written = write(&synthesis, &out, "RepoPipelineStack", TemplateFormat::Json)?;

    assert_eq!(written.archive, out.join(&synthesis.asset.object_key));
    let mut archive = zip::ZipArchive::new(fs::File::open(&written.archive)?)?;
    let mut names: Vec<String> = archive.file_names().map(String::from).collect();
    names.sort();
    assert_eq!(names, vec!["buildspec.yml", "src/app.py"]);

    let mut buildspec = String::new();
    archive.by_name("buildspec.yml")?.read_to_string(&mut buildspec)?;
    assert_eq!(buildspec, "version: 0.2\n");
    Ok(())
}

#[test]
fn prod_override_adds_git_user() -> Result<()> {
    let dir = workspace()?;
    let mut args = args(dir.path());
    args.env = Some("prod".into());
    let params = args.load_with_env(&NoEnv)?;
    let synthesis = synthesize(&params, &args.catalog())?;

    assert_eq!(synthesis.outputs.len(), 4);
    let template: Value = serde_json::from_str(&synthesis.template.to_json()?)?;
    assert_eq!(
        template["Resources"]["GitIamUser"]["Properties"]["UserName"],
        "demo-prod-git-user"
    );
    assert_eq!(
        template["Outputs"]["GitRepoCloneUrlGrc"]["Value"],
        "codecommit::eu-west-1://demo-prod-repo"
    );
    Ok(())
}

#[test]
fn named_payload_wins_over_default() -> Result<()> {
    let dir = workspace()?;
    let named = dir.path().join("boilerplate/demo-dev-repo");
    fs::create_dir_all(&named)?;
    fs::write(named.join("buildspec.yml"), "version: 0.2\nphases: {}\n")?;

    let args = args(dir.path());
    let params = args.load_with_env(&NoEnv)?;
    let synthesis = synthesize(&params, &args.catalog())?;
    assert_eq!(synthesis.plan.payload.name, "demo-dev-repo");
    assert_eq!(synthesis.asset.source_path, named);
    Ok(())
}

#[test]
fn unknown_environment_fails_before_writing() -> Result<()> {
    let dir = workspace()?;
    let mut args = args(dir.path());
    args.env = Some("qa".into());
    let err = args.load_with_env(&NoEnv).unwrap_err();
    assert!(format!("{err:#}").contains("demo-qa"));
    Ok(())
}

#[test]
fn cli_synth_writes_yaml() -> Result<()> {
    let dir = workspace()?;
    let out = dir.path().join("out");
    let output = Command::new(env!("CARGO_BIN_EXE_repopipe"))
        .current_dir(dir.path())
        .args(["synth", "--format", "yaml", "--output"])
        .arg(&out)
        .args(["-c", "createGitUser=yes"])
        .env("RUST_LOG", "error")
        .output()?;

    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("GitUser = <GitIamUser>"));
    assert!(stdout.contains("codecommit::us-east-1://demo-dev-repo"));

    let yaml = fs::read_to_string(out.join("RepoPipelineStack.template.yaml"))?;
    assert!(yaml.contains("AWS::CodePipeline::Pipeline"));
    assert!(out.join("assets.json").exists());
    let archives = fs::read_dir(&out)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|x| x == "zip"))
        .count();
    assert_eq!(archives, 1);
    Ok(())
}

#[test]
fn cli_plan_prints_derived_names() -> Result<()> {
    let dir = workspace()?;
    let output = Command::new(env!("CARGO_BIN_EXE_repopipe"))
        .current_dir(dir.path())
        .args(["plan", "--app", "shop"])
        .args(["-c", "env=dev"])
        .env("RUST_LOG", "error")
        .output()?;

    // No [shop-dev] table
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("shop-dev"));

    let output = Command::new(env!("CARGO_BIN_EXE_repopipe"))
        .current_dir(dir.path())
        .arg("plan")
        .env("RUST_LOG", "error")
        .output()?;
    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(report["names"]["stack"], "demo-dev-stack");
    assert_eq!(report["payload"]["isDefault"], true);
    Ok(())
}

#[cfg(not(feature = "provision"))]
#[test]
fn cli_deploy_requires_provision_feature() -> Result<()> {
    let dir = workspace()?;
    let output = Command::new(env!("CARGO_BIN_EXE_repopipe"))
        .current_dir(dir.path())
        .arg("deploy")
        .env("RUST_LOG", "error")
        .output()?;

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--features provision"));
    Ok(())
}
