//! Writing a completed disclosure package to disk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use serde_json::json;

use crate::Result;
use crate::archive::ArchiveStore;
use crate::dependency::{self, Dependency};
use crate::request::DisclosurePackage;

/// File name of the package manifest inside the export directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Outcome of an export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    /// Message files written.
    pub written: usize,
    /// Disclosed messages whose body had gone missing since processing.
    pub missing: usize,
    /// Path of the manifest.
    pub manifest: PathBuf,
}

/// Writes every disclosed body as `<message id>.eml` plus a manifest listing
/// all decisions. Withheld messages are listed but never written.
pub(super) async fn write_package(
    archive: &dyn ArchiveStore,
    timeout: Duration,
    package: &DisclosurePackage,
    dir: &Path,
) -> Result<ExportSummary> {
    tokio::fs::create_dir_all(dir).await?;

    let mut written = 0;
    let mut missing = 0;
    for item in package.disclosed() {
        let id = &item.message_id;
        match dependency::bounded(Dependency::ArchiveStore, timeout, archive.get_body(id)).await {
            Ok(body) => {
                tokio::fs::write(dir.join(format!("{id}.eml")), &body).await?;
                written += 1;
            }
            Err(err) if err.is_not_found() => {
                tracing::warn!(message = id.short(), "disclosed body missing at export");
                missing += 1;
            }
            Err(err) => return Err(err),
        }
    }

    let items: Vec<_> = package
        .items
        .iter()
        .map(|item| {
            json!({
                "message_id": item.message_id,
                "decision": item.decision.as_str(),
                "reason": item.decision.reason().map(|r| r.as_str()),
                "score": item.score,
            })
        })
        .collect();
    let manifest = json!({
        "request_id": package.request_id,
        "disclosed": package.disclosed_count(),
        "withheld": package.withheld_count(),
        "items": items,
    });
    let manifest_path = dir.join(MANIFEST_FILE);
    tokio::fs::write(&manifest_path, serde_json::to_vec_pretty(&manifest)?).await?;

    tracing::info!(
        request = %package.request_id,
        written,
        missing,
        dir = %dir.display(),
        "package exported"
    );
    Ok(ExportSummary {
        written,
        missing,
        manifest: manifest_path,
    })
}
