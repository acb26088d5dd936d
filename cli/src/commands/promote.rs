//! `a3s-refs promote` command - Turn an image index into a reference index.

use a3s_refs_core::config::RefsConfig;
use a3s_refs_runtime::{ImageReference, PromoteOutcome, ReferenceEngine};
use clap::Args;

use super::TargetArgs;

#[derive(Args)]
pub struct PromoteArgs {
    /// Image index to promote
    pub index: String,

    #[command(flatten)]
    pub target: TargetArgs,
}

pub async fn execute(args: PromoteArgs, config: &RefsConfig) -> Result<(), Box<dyn std::error::Error>> {
    let reference = ImageReference::parse(&args.index)?;
    let registry = super::open_registry(config);
    let engine = ReferenceEngine::new(&registry, config);

    match engine.promote_index(&reference, &args.target.target()).await? {
        PromoteOutcome::Promoted { index, written_to } => {
            println!("Promoted: {}@{}", written_to, index.digest);
        }
        PromoteOutcome::AlreadyReference { index, location } => {
            println!("{} already holds a reference index ({})", location, index.digest);
        }
    }
    Ok(())
}
