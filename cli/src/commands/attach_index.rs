//! `a3s-refs attach-index` command - Attach a file to an index's reference index.

use std::path::PathBuf;

use a3s_refs_core::config::RefsConfig;
use a3s_refs_runtime::{Artifact, ImageReference, ReferenceEngine};
use clap::Args;

use super::TargetArgs;

#[derive(Args)]
pub struct AttachIndexArgs {
    /// File to attach
    pub file: PathBuf,

    /// Media type of the file
    pub media_type: String,

    /// Reference type recorded on the index entry (e.g., "signature")
    pub reference_type: String,

    /// Free-form description recorded on the index entry
    pub description: String,

    /// Image index to attach to
    pub index: String,

    #[command(flatten)]
    pub target: TargetArgs,
}

pub async fn execute(
    args: AttachIndexArgs,
    config: &RefsConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let index = ImageReference::parse(&args.index)?;
    let artifact = Artifact::from_file(&args.file, args.media_type)
        .await?
        .with_artifact_type(args.reference_type)
        .with_description(args.description);

    let registry = super::open_registry(config);
    let engine = ReferenceEngine::new(&registry, config);
    let outcome = engine
        .attach_to_index(&index, &artifact, &args.target.target())
        .await?;
    super::attach::print_outcome(&outcome);
    Ok(())
}
