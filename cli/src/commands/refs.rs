//! `a3s-refs refs` command - List artifacts attached to an image or index.

use a3s_refs_core::config::RefsConfig;
use a3s_refs_runtime::{ContentHash, ImageReference, ReferenceEngine, ReferenceEntry, ReferenceFilter};
use clap::Args;
use serde::Serialize;

use crate::output;

#[derive(Args)]
pub struct RefsArgs {
    /// Image or index to inspect
    pub reference: String,

    /// Only entries attached to this digest
    #[arg(long, conflicts_with = "all")]
    pub subject: Option<String>,

    /// Every entry carrying a reference annotation
    #[arg(long)]
    pub all: bool,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

/// One listing row, as printed with `--json`.
#[derive(Debug, Serialize)]
struct RefRow {
    position: usize,
    #[serde(rename = "type")]
    reference_type: Option<String>,
    description: Option<String>,
    subject: String,
    digest: String,
    media_type: String,
    size: i64,
}

impl From<ReferenceEntry> for RefRow {
    fn from(entry: ReferenceEntry) -> Self {
        Self {
            position: entry.position,
            reference_type: entry.reference_type,
            description: entry.description,
            subject: entry.subject.to_string(),
            digest: entry.descriptor.digest.to_string(),
            media_type: entry.descriptor.media_type,
            size: entry.descriptor.size,
        }
    }
}

pub async fn execute(args: RefsArgs, config: &RefsConfig) -> Result<(), Box<dyn std::error::Error>> {
    let reference = ImageReference::parse(&args.reference)?;
    let filter = match (args.subject, args.all) {
        (Some(subject), _) => Some(ReferenceFilter::Subject(subject.parse::<ContentHash>()?)),
        (None, true) => Some(ReferenceFilter::All),
        (None, false) => None,
    };

    let registry = super::open_registry(config);
    let engine = ReferenceEngine::new(&registry, config);
    let listing = engine.list_references(&reference, filter).await?;
    let rows: Vec<RefRow> = listing.iter().map(RefRow::from).collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let mut table = output::new_table(&["#", "TYPE", "DIGEST", "SIZE", "SUBJECT", "DESCRIPTION"]);
    for row in &rows {
        table.add_row(vec![
            row.position.to_string(),
            row.reference_type.clone().unwrap_or_else(|| "-".to_string()),
            row.digest.clone(),
            output::format_size(row.size),
            row.subject.clone(),
            row.description.clone().unwrap_or_default(),
        ]);
    }
    println!("{table}");
    Ok(())
}
