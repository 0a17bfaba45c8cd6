// repopipe-core - Planning, topology and template rendering
//
// Pure functions from a resolved ParameterSet to a CloudFormation template:
// plan -> build graph -> emit outputs -> stage payload -> render.
// The only I/O is hashing the chosen payload directory.

pub mod assets;
pub mod error;
pub mod names;
pub mod outputs;
pub mod plan;
pub mod template;
pub mod topology;

pub use assets::{default_asset_bucket, stage_payload, AssetManifest, StagedAsset};
pub use error::{AssetError, ErrorCode, GraphError, SynthError};
pub use names::DerivedNames;
pub use outputs::{emit, OutputValue, StackOutput};
pub use plan::{plan, DirectoryCatalog, Payload, PayloadCatalog, Plan};
pub use template::Template;
pub use topology::{build, Graph};

use repopipe_config::ParameterSet;
use tracing::info;

/// Everything one synthesis pass produces
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub plan: Plan,
    pub graph: Graph,
    pub outputs: Vec<StackOutput>,
    pub asset: StagedAsset,
    pub template: Template,
}

/// Run the whole pipeline for one parameter set.
///
/// Nothing is returned unless every phase succeeds.
pub fn synthesize<C: PayloadCatalog + ?Sized>(
    params: &ParameterSet,
    catalog: &C,
) -> Result<Synthesis, SynthError> {
    let plan = plan::plan(params, catalog);
    let graph = topology::build(params, &plan)?;
    let outputs = outputs::emit(&graph);

    let bucket = params
        .asset_bucket
        .clone()
        .unwrap_or_else(|| default_asset_bucket(&params.aws_account, &params.aws_region));
    let asset = stage_payload(&plan.payload, &bucket)?;

    let template = template::render(&graph, &outputs, &asset)?;
    info!(
        resources = template.resources.len(),
        outputs = outputs.len(),
        "Synthesized template"
    );

    Ok(Synthesis {
        plan,
        graph,
        outputs,
        asset,
        template,
    })
}
