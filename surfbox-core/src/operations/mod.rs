pub mod check_blocks;
pub mod download_file;
pub mod scan_dir;
pub mod sync;
pub mod upload_file;

pub use check_blocks::{CheckBlocksOperation, CheckBlocksReport, MissingBlock};
pub use download_file::{
    DownloadFileOperation, DownloadFileOperationOutcome, DownloadFileOperationRequest,
};
pub use scan_dir::{LocalChanges, ScanDirOperation, ScanDirOperationResult};
pub use sync::{FileFailure, SyncOperation, SyncPhase, SyncPlan, SyncReport, SyncSettings};
pub use upload_file::{
    UploadFileOperation, UploadFileOperationOutcome, UploadFileOperationRequest,
};
