//! `a3s-refs attach` command - Attach a file to an image or index.

use std::path::PathBuf;

use a3s_refs_core::config::RefsConfig;
use a3s_refs_runtime::{Artifact, AttachOutcome, ImageReference, ReferenceEngine};
use clap::Args;

use super::TargetArgs;
use crate::output;

#[derive(Args)]
pub struct AttachArgs {
    /// File to attach
    pub file: PathBuf,

    /// Media type of the file (e.g., "image/png")
    pub media_type: String,

    /// Artifact type recorded on the artifact manifest (e.g., "sbom")
    pub artifact_type: String,

    /// Image or index to attach to (e.g., "ghcr.io/org/app:v1")
    pub subject: String,

    /// Description recorded when the subject is an index
    #[arg(short, long)]
    pub description: Option<String>,

    #[command(flatten)]
    pub target: TargetArgs,
}

pub async fn execute(args: AttachArgs, config: &RefsConfig) -> Result<(), Box<dyn std::error::Error>> {
    let subject = ImageReference::parse(&args.subject)?;
    let artifact = Artifact::from_file(&args.file, args.media_type)
        .await?
        .with_artifact_type(args.artifact_type)
        .with_description(args.description.unwrap_or_default());

    let registry = super::open_registry(config);
    let engine = ReferenceEngine::new(&registry, config);
    let outcome = engine.attach(&subject, &artifact, &args.target.target()).await?;
    print_outcome(&outcome);
    Ok(())
}

pub(super) fn print_outcome(outcome: &AttachOutcome) {
    match outcome {
        AttachOutcome::Manifest {
            subject,
            artifact,
            pushed_to,
        } => {
            println!(
                "Attached {} ({}) to manifest {}",
                output::short_digest(&artifact.digest),
                output::format_size(artifact.size),
                output::short_digest(&subject.digest)
            );
            println!("Pushed: {}", pushed_to);
        }
        AttachOutcome::Index {
            subject,
            artifact,
            index,
            written_to,
            promoted,
        } => {
            if *promoted {
                println!("Promoted {} to a reference index", subject.digest);
            }
            println!(
                "Attached {} to index {}",
                output::short_digest(&artifact.digest),
                output::short_digest(&subject.digest)
            );
            println!("Reference index: {}@{}", written_to, index.digest);
        }
    }
}
