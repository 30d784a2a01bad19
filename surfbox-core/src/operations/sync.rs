//! One synchronization pass of a local directory against the cluster.
//!
//! Phases, in order: scan the directory, fold it into the local index, fetch
//! the block store list and the remote index, decide uploads and downloads
//! from that one snapshot, run the uploads, run the downloads, and write the
//! local index back. A failure on one file is recorded in the report and the
//! pass moves on to the next file.

use crate::cluster::DynCluster;
use crate::error::Result;
use crate::model::{FileInfoMap, FileMeta};
use crate::operations::download_file::{
    DownloadFileOperation, DownloadFileOperationOutcome, DownloadFileOperationRequest,
};
use crate::operations::scan_dir::{LocalChanges, ScanDirOperation};
use crate::operations::upload_file::{
    UploadFileOperation, UploadFileOperationOutcome, UploadFileOperationRequest,
};
use crate::storage::LocalIndex;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tracing::Instrument;
use ulid::Ulid;

/// Client-side settings for a sync pass.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub base_dir: PathBuf,
    pub block_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Scan,
    Upload,
    Download,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub filename: String,
    pub phase: SyncPhase,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub created: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
    pub uploaded: Vec<String>,
    pub downloaded: Vec<String>,
    pub deleted_locally: Vec<String>,
    /// Uploads the metadata store turned down because of a version mismatch.
    pub rejected: Vec<String>,
    pub failed: Vec<FileFailure>,
}

impl SyncReport {
    fn new(run_id: String, started_at: DateTime<Utc>, local: LocalChanges) -> Self {
        Self {
            run_id,
            started_at,
            finished_at: started_at,
            created: local.created,
            modified: local.modified,
            deleted: local.deleted,
            uploaded: Vec::new(),
            downloaded: Vec::new(),
            deleted_locally: Vec::new(),
            rejected: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.rejected.is_empty()
    }

    fn fail(&mut self, filename: &str, phase: SyncPhase, error: impl ToString) {
        self.failed.push(FileFailure {
            filename: filename.to_string(),
            phase,
            error: error.to_string(),
        });
    }
}

/// Files to transfer, decided from a single remote snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub uploads: Vec<FileMeta>,
    pub downloads: Vec<FileMeta>,
}

impl SyncPlan {
    /// Upload what is newer locally or unknown remotely; download what is
    /// unknown locally or at least as new remotely. Equal versions are
    /// downloaded again, which is how a client converges after a rejection.
    pub fn decide(local: &FileInfoMap, remote: &FileInfoMap) -> Self {
        let mut plan = Self::default();

        for (name, local_meta) in local {
            let upload = match remote.get(name) {
                None => true,
                Some(remote_meta) => local_meta.version > remote_meta.version,
            };
            if upload {
                plan.uploads.push(local_meta.clone());
            }
        }

        for (name, remote_meta) in remote {
            let download = match local.get(name) {
                None => true,
                Some(local_meta) => remote_meta.version >= local_meta.version,
            };
            if download {
                plan.downloads.push(remote_meta.clone());
            }
        }

        plan.uploads.sort_by(|a, b| a.filename.cmp(&b.filename));
        plan.downloads.sort_by(|a, b| a.filename.cmp(&b.filename));
        plan
    }
}

#[derive(Clone)]
pub struct SyncOperation {
    cluster: DynCluster,
    settings: SyncSettings,
}

impl SyncOperation {
    pub fn new(cluster: DynCluster, settings: SyncSettings) -> Self {
        Self { cluster, settings }
    }

    pub async fn run(&self) -> Result<SyncReport> {
        let run_id = Ulid::new().to_string();
        let span = tracing::info_span!("sync", run_id = %run_id);
        self.run_pass(run_id).instrument(span).await
    }

    async fn run_pass(&self, run_id: String) -> Result<SyncReport> {
        let started_at = Utc::now();
        let SyncSettings {
            base_dir,
            block_size,
        } = &self.settings;

        let local_index = LocalIndex::new(base_dir);
        let mut index = local_index.load()?;
        let synced = index.clone();

        let scan = ScanDirOperation::new(base_dir.clone(), *block_size)
            .run()
            .await?;
        let local_changes = scan.apply_to_index(&mut index);
        let mut report = SyncReport::new(run_id, started_at, local_changes);
        for (name, error) in &scan.unreadable {
            report.fail(name, SyncPhase::Scan, error);
        }

        tracing::info!(
            "Scanned {}: {} files, {} created, {} modified, {} deleted",
            base_dir.display(),
            scan.files.len(),
            report.created.len(),
            report.modified.len(),
            report.deleted.len()
        );

        let remote = match self.fetch_remote().await {
            Ok(remote) => remote,
            Err(error) => {
                // The index on disk stays at the last synced state, so the
                // next pass detects the same local changes again.
                tracing::warn!("Failed to fetch remote state: {}", error);
                return Err(error);
            }
        };

        let plan = SyncPlan::decide(&index, &remote);
        tracing::info!(
            "Planned {} uploads and {} downloads",
            plan.uploads.len(),
            plan.downloads.len()
        );

        let uploader = UploadFileOperation::new(self.cluster.clone(), base_dir.clone(), *block_size);
        for meta in plan.uploads {
            let filename = meta.filename.clone();
            match uploader.run(UploadFileOperationRequest { meta }).await {
                Ok(UploadFileOperationOutcome::Committed { version, .. }) => {
                    if let Some(entry) = index.get_mut(&filename) {
                        entry.version = version;
                    }
                    report.uploaded.push(filename);
                }
                Ok(UploadFileOperationOutcome::Rejected) => {
                    roll_back(&mut index, &synced, &filename);
                    report.rejected.push(filename);
                }
                Err(error) => {
                    tracing::warn!("Failed to upload {}: {}", filename, error);
                    roll_back(&mut index, &synced, &filename);
                    report.fail(&filename, SyncPhase::Upload, error);
                }
            }
        }

        let downloader = DownloadFileOperation::new(self.cluster.clone(), base_dir.clone());
        for remote_meta in plan.downloads {
            let filename = remote_meta.filename.clone();
            let request = DownloadFileOperationRequest {
                remote: remote_meta.clone(),
            };
            match downloader.run(request).await {
                Ok(DownloadFileOperationOutcome::Restored { .. }) => {
                    index.insert(filename.clone(), remote_meta);
                    report.downloaded.push(filename);
                }
                Ok(DownloadFileOperationOutcome::Deleted { existed }) => {
                    index.insert(filename.clone(), remote_meta);
                    if existed {
                        report.deleted_locally.push(filename);
                    }
                }
                Err(error) => {
                    tracing::warn!("Failed to download {}: {}", filename, error);
                    report.fail(&filename, SyncPhase::Download, error);
                }
            }
        }

        local_index.write(&index)?;
        report.finished_at = Utc::now();

        tracing::info!(
            "Sync finished: {} uploaded, {} downloaded, {} removed locally, {} rejected, {} failed",
            report.uploaded.len(),
            report.downloaded.len(),
            report.deleted_locally.len(),
            report.rejected.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Block store list and remote index, read as two separate calls.
    async fn fetch_remote(&self) -> Result<FileInfoMap> {
        let block_store_addrs = self.cluster.get_block_store_addrs().await?;
        if block_store_addrs.is_empty() {
            tracing::warn!("Metadata store reports no block stores");
        } else {
            tracing::debug!("Block stores: {:?}", block_store_addrs);
        }

        self.cluster.get_file_info_map().await
    }
}

/// Puts `filename` back to its last synced entry, dropping it when it was
/// never synced, so an uncommitted local version is proposed again later.
fn roll_back(index: &mut FileInfoMap, synced: &FileInfoMap, filename: &str) {
    match synced.get(filename) {
        Some(meta) => {
            index.insert(filename.to_string(), meta.clone());
        }
        None => {
            index.remove(filename);
        }
    }
}
