//! `a3s-refs create-ref-index` command - Preview (and optionally write) a reference index.

use a3s_refs_core::config::RefsConfig;
use a3s_refs_runtime::{ImageReference, IndexTarget, PromoteOutcome, ReferenceEngine};
use clap::Args;

use crate::output;

#[derive(Args)]
pub struct CreateRefIndexArgs {
    /// Image index to build a reference index for
    pub index: String,

    /// Push the reference index to the fallback tag
    #[arg(long)]
    pub write: bool,
}

pub async fn execute(
    args: CreateRefIndexArgs,
    config: &RefsConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let reference = ImageReference::parse(&args.index)?;
    let registry = super::open_registry(config);
    let engine = ReferenceEngine::new(&registry, config);
    let plan = engine.build_reference_index(&reference).await?;

    println!("Fallback tag: {}", plan.fallback);

    let mut table = output::new_table(&["#", "MEDIA TYPE", "DIGEST", "SIZE", "PLATFORM"]);
    for (position, entry) in plan.promotion.index().manifests.iter().enumerate() {
        table.add_row(vec![
            position.to_string(),
            entry.media_type.clone(),
            output::short_digest(&entry.digest),
            output::format_size(entry.size),
            output::format_platform(entry),
        ]);
    }
    println!("{table}");

    if !plan.promotion.was_promoted() {
        println!("{} is already a reference index; nothing to write", reference);
        return Ok(());
    }
    if args.write {
        match engine.promote_index(&reference, &IndexTarget::FallbackTag).await? {
            PromoteOutcome::Promoted { index, written_to } => {
                println!("Written: {}@{}", written_to, index.digest);
            }
            PromoteOutcome::AlreadyReference { index, location } => {
                println!(
                    "{} already holds a reference index ({}); nothing written",
                    location, index.digest
                );
            }
        }
    }
    Ok(())
}
