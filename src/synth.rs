//! `synth` command: render the template, asset manifest and seed archive to disk

use crate::params::ParameterArgs;
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use repopipe_core::assets::{AssetManifest, MANIFEST_FILE};
use repopipe_core::{synthesize, StackOutput, Synthesis};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Stack name used when `--stack-name` is not given
pub const DEFAULT_STACK_NAME: &str = "RepoPipelineStack";

/// Output directory used when `--output` is not given
pub const DEFAULT_OUTPUT_DIR: &str = "repopipe.out";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum TemplateFormat {
    #[default]
    Json,
    Yaml,
}

impl TemplateFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            TemplateFormat::Json => "json",
            TemplateFormat::Yaml => "yaml",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct SynthArgs {
    /// Directory the template and asset manifest are written to
    #[arg(short, long, value_name = "DIR", default_value = DEFAULT_OUTPUT_DIR)]
    pub output: PathBuf,

    /// Template serialization format
    #[arg(long, value_enum, default_value_t = TemplateFormat::Json)]
    pub format: TemplateFormat,

    /// Name of the stack the template is deployed as
    #[arg(long, default_value = DEFAULT_STACK_NAME)]
    pub stack_name: String,
}

/// Files written by one synthesis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Written {
    pub template: PathBuf,
    pub manifest: PathBuf,
    pub archive: PathBuf,
}

pub fn run(args: SynthArgs, params: &ParameterArgs) -> Result<()> {
    let parameters = params.load()?;
    let synthesis = synthesize(&parameters, &params.catalog())
        .with_context(|| format!("Failed to synthesize {}", parameters.app_env))?;

    let written = write(&synthesis, &args.output, &args.stack_name, args.format)?;

    println!();
    println!("Synthesized {} ({})", args.stack_name, parameters.app_env);
    println!("  template: {}", written.template.display());
    println!("  assets:   {}", written.manifest.display());
    println!("  seed:     {}", written.archive.display());
    println!();
    print_outputs(&synthesis.outputs);

    Ok(())
}

/// Write `<stack>.template.<ext>`, the asset manifest and the zipped seed
/// payload (named by its object key) into `dir`
pub fn write(
    synthesis: &Synthesis,
    dir: &Path,
    stack_name: &str,
    format: TemplateFormat,
) -> Result<Written> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;

    let body = match format {
        TemplateFormat::Json => synthesis.template.to_json()?,
        TemplateFormat::Yaml => synthesis.template.to_yaml()?,
    };
    let template = dir.join(format!("{}.template.{}", stack_name, format.extension()));
    fs::write(&template, body)
        .with_context(|| format!("Failed to write {}", template.display()))?;

    let manifest_body = serde_json::to_string_pretty(&AssetManifest::new(vec![synthesis
        .asset
        .clone()]))
    .context("Failed to serialize asset manifest")?;
    let manifest = dir.join(MANIFEST_FILE);
    fs::write(&manifest, manifest_body)
        .with_context(|| format!("Failed to write {}", manifest.display()))?;

    let archive = dir.join(&synthesis.asset.object_key);
    let bytes = synthesis
        .asset
        .archive()
        .context("Failed to package repository seed")?;
    fs::write(&archive, bytes)
        .with_context(|| format!("Failed to write {}", archive.display()))?;

    info!(
        template = %template.display(),
        manifest = %manifest.display(),
        archive = %archive.display(),
        "Wrote synthesis output"
    );
    Ok(Written {
        template,
        manifest,
        archive,
    })
}

pub(crate) fn print_outputs(outputs: &[StackOutput]) {
    println!("Outputs:");
    for output in outputs {
        println!("  {} = {}", output.name, output.value.describe());
    }
}
