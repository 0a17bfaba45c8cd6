//! `plan` command: show what a synthesis would build without writing anything

use crate::params::ParameterArgs;
use anyhow::{Context, Result};
use repopipe_core::plan::plan;
use serde_json::json;

pub fn run(params: &ParameterArgs) -> Result<()> {
    let parameters = params.load()?;
    let plan = plan(&parameters, &params.catalog());

    let report = json!({
        "parameters": parameters,
        "names": plan.names,
        "createGitUser": plan.create_git_user,
        "payload": plan.payload,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to serialize plan")?
    );
    Ok(())
}
