//! Table formatting helpers for CLI output.

use a3s_refs_runtime::{ContentHash, Descriptor};
use comfy_table::{ContentArrangement, Table};

/// Hex characters shown by [`short_digest`].
const SHORT_DIGEST_LEN: usize = 12;

/// Create a styled table with the given headers.
pub fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.load_preset(comfy_table::presets::NOTHING);
    table.set_header(headers);
    table
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Descriptor sizes are signed on the wire; negatives show as zero.
pub fn format_size(size: i64) -> String {
    format_bytes(u64::try_from(size).unwrap_or(0))
}

/// `sha256:abcdef123456`, like `docker images` digests.
pub fn short_digest(digest: &ContentHash) -> String {
    let hex = digest.hex();
    let end = hex.len().min(SHORT_DIGEST_LEN);
    format!("{}:{}", digest.algorithm().as_str(), &hex[..end])
}

/// Platform of an index entry, or `-`.
pub fn format_platform(descriptor: &Descriptor) -> String {
    descriptor
        .platform
        .as_ref()
        .map_or_else(|| "-".to_string(), |p| p.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(100 * 1048576), "100.0 MB");
        assert_eq!(format_bytes(10 * 1073741824), "10.0 GB");
    }

    #[test]
    fn test_format_size_negative() {
        assert_eq!(format_size(-1), "0 B");
        assert_eq!(format_size(2048), "2.0 KB");
    }

    #[test]
    fn test_short_digest() {
        let digest = ContentHash::sha256(b"hello");
        let short = short_digest(&digest);
        assert_eq!(short, format!("sha256:{}", &digest.hex()[..12]));
    }

    #[test]
    fn test_format_platform() {
        let desc = Descriptor::describe(b"x", "application/vnd.oci.image.manifest.v1+json");
        assert_eq!(format_platform(&desc), "-");
    }

    #[test]
    fn test_new_table_with_rows() {
        let mut table = new_table(&["TYPE", "DIGEST"]);
        table.add_row(["sbom", "sha256:abc"]);
        let output = table.to_string();
        assert!(output.contains("TYPE"));
        assert!(output.contains("sbom"));
        assert!(output.contains("sha256:abc"));
    }
}
