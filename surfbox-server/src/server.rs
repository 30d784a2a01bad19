use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use surfbox_core::cluster::protocol::{
    BlockPayload, BlockStoreAddrsResponse, BlockStoreMapResponse, ENDPOINT_BLOCK_STORE_ADDRS,
    ENDPOINT_BLOCK_STORE_MAP, ENDPOINT_BLOCKS, ENDPOINT_FILES, ENDPOINT_HAS_BLOCKS,
    ENDPOINT_HEALTH, ErrorResponse, FileInfoMapResponse, HashesPayload, PutBlockResponse,
    UpdateFileResponse,
};
use surfbox_core::{Block, BlockStore, FileMeta, MetaStore, Result, SurfError};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Error wrapper turning `SurfError` into a JSON error response.
pub struct ApiError(SurfError);

impl From<SurfError> for ApiError {
    fn from(error: SurfError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SurfError::BlockNotFound(_) => StatusCode::NOT_FOUND,
            SurfError::InvalidRequest(_) | SurfError::HashMismatch { .. } => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {}", self.0);
        }

        let body = ErrorResponse {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    role: &'static str,
    entries: usize,
}

pub fn block_store_router(store: Arc<BlockStore>) -> Router {
    Router::new()
        .route(ENDPOINT_HEALTH, get(block_store_health))
        .route(ENDPOINT_BLOCKS, get(get_block_hashes).put(put_block))
        .route(ENDPOINT_HAS_BLOCKS, post(has_blocks))
        .route("/blocks/:hash", get(get_block))
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

pub fn meta_store_router(store: Arc<MetaStore>) -> Router {
    Router::new()
        .route(ENDPOINT_HEALTH, get(meta_store_health))
        .route(ENDPOINT_FILES, get(get_file_info_map).post(update_file))
        .route(ENDPOINT_BLOCK_STORE_MAP, post(get_block_store_map))
        .route(ENDPOINT_BLOCK_STORE_ADDRS, get(get_block_store_addrs))
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

pub async fn bind(bind_addr: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);
    Ok(listener)
}

pub async fn serve(listener: TcpListener, app: Router) -> Result<()> {
    axum::serve(listener, app).await?;
    Ok(())
}

// --- Block store handlers ---

async fn block_store_health(State(store): State<Arc<BlockStore>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        role: "block_store",
        entries: store.len(),
    })
}

async fn get_block(
    State(store): State<Arc<BlockStore>>,
    Path(hash): Path<String>,
) -> ApiResult<BlockPayload> {
    let block = store.get_block(&hash)?;
    Ok(Json(BlockPayload::from(&block)))
}

async fn put_block(
    State(store): State<Arc<BlockStore>>,
    Json(payload): Json<BlockPayload>,
) -> ApiResult<PutBlockResponse> {
    let block = Block::try_from(payload)?;
    tracing::debug!("Storing block {} ({} bytes)", block.hash, block.size);
    Ok(Json(PutBlockResponse {
        flag: store.put_block(block),
    }))
}

async fn has_blocks(
    State(store): State<Arc<BlockStore>>,
    Json(payload): Json<HashesPayload>,
) -> ApiResult<HashesPayload> {
    Ok(Json(HashesPayload {
        hashes: store.has_blocks(&payload.hashes),
    }))
}

async fn get_block_hashes(State(store): State<Arc<BlockStore>>) -> ApiResult<HashesPayload> {
    Ok(Json(HashesPayload {
        hashes: store.get_block_hashes(),
    }))
}

// --- Metadata store handlers ---

async fn meta_store_health(State(store): State<Arc<MetaStore>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        role: "meta_store",
        entries: store.get_file_info_map().len(),
    })
}

async fn get_file_info_map(State(store): State<Arc<MetaStore>>) -> ApiResult<FileInfoMapResponse> {
    Ok(Json(FileInfoMapResponse {
        file_info_map: store.get_file_info_map(),
    }))
}

async fn update_file(
    State(store): State<Arc<MetaStore>>,
    Json(meta): Json<FileMeta>,
) -> ApiResult<UpdateFileResponse> {
    let outcome = store.update_file(meta)?;
    Ok(Json(UpdateFileResponse {
        version: outcome.to_wire()?,
    }))
}

async fn get_block_store_map(
    State(store): State<Arc<MetaStore>>,
    Json(payload): Json<HashesPayload>,
) -> ApiResult<BlockStoreMapResponse> {
    Ok(Json(BlockStoreMapResponse {
        block_store_map: store.get_block_store_map(&payload.hashes),
    }))
}

async fn get_block_store_addrs(
    State(store): State<Arc<MetaStore>>,
) -> ApiResult<BlockStoreAddrsResponse> {
    Ok(Json(BlockStoreAddrsResponse {
        block_store_addrs: store.get_block_store_addrs(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::body::Bytes;
    use http_body_util::BodyExt;
    use serde::de::DeserializeOwned;
    use std::time::Duration;
    use surfbox_core::{HttpCluster, SyncOperation, SyncSettings, UpdateOutcome, compute_hash};
    use tower::ServiceExt;

    async fn call<R: DeserializeOwned>(
        app: Router,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, R) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_block_store_routes() {
        let store = Arc::new(BlockStore::new());
        let app = block_store_router(store.clone());
        let block = Block::new(Bytes::from_static(b"over the wire"));
        let payload = serde_json::to_value(BlockPayload::from(&block)).unwrap();

        let (status, put): (_, PutBlockResponse) =
            call(app.clone(), "PUT", "/blocks", Some(payload)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(put.flag);

        let uri = format!("/blocks/{}", block.hash);
        let (status, fetched): (_, BlockPayload) = call(app.clone(), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(Block::try_from(fetched).unwrap().data, block.data);

        let query = serde_json::json!({ "hashes": [compute_hash(b"absent"), block.hash.clone()] });
        let (_, present): (_, HashesPayload) =
            call(app.clone(), "POST", "/blocks/has", Some(query)).await;
        assert_eq!(present.hashes, vec![block.hash.clone()]);

        let (_, all): (_, HashesPayload) = call(app, "GET", "/blocks", None).await;
        assert_eq!(all.hashes, vec![block.hash]);
    }

    #[tokio::test]
    async fn test_missing_block_is_404() {
        let app = block_store_router(Arc::new(BlockStore::new()));
        let uri = format!("/blocks/{}", compute_hash(b"nothing"));

        let (status, body): (_, ErrorResponse) = call(app, "GET", &uri, None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.error.contains("Block not found"));
    }

    #[tokio::test]
    async fn test_bad_block_payload_is_400() {
        let app = block_store_router(Arc::new(BlockStore::new()));
        let payload = serde_json::json!({ "hash": "x", "data": "%%%", "size": 1 });

        let (status, _): (_, ErrorResponse) = call(app, "PUT", "/blocks", Some(payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_meta_store_version_check() {
        let store = Arc::new(MetaStore::new(vec!["127.0.0.1:9001".to_string()]));
        let app = meta_store_router(store.clone());
        let hash = compute_hash(b"x");

        let first = serde_json::json!({ "filename": "a.txt", "version": 1, "block_hash_list": [hash] });
        let (_, accepted): (_, UpdateFileResponse) =
            call(app.clone(), "POST", "/files", Some(first.clone())).await;
        assert_eq!(accepted.version, 1);

        let (_, rejected): (_, UpdateFileResponse) =
            call(app.clone(), "POST", "/files", Some(first)).await;
        assert_eq!(rejected.version, -1);

        let tombstone =
            serde_json::json!({ "filename": "a.txt", "version": 2, "block_hash_list": ["0"] });
        let (_, deleted): (_, UpdateFileResponse) =
            call(app.clone(), "POST", "/files", Some(tombstone)).await;
        assert_eq!(deleted.version, 2);

        let (_, files): (_, FileInfoMapResponse) = call(app.clone(), "GET", "/files", None).await;
        assert!(files.file_info_map["a.txt"].is_tombstone());

        let (_, addrs): (_, BlockStoreAddrsResponse) =
            call(app, "GET", "/block-store-addrs", None).await;
        assert_eq!(addrs.block_store_addrs, vec!["127.0.0.1:9001".to_string()]);
    }

    #[tokio::test]
    async fn test_unsafe_proposals_are_400() {
        let store = Arc::new(MetaStore::new(Vec::new()));
        let app = meta_store_router(store.clone());
        let hash = compute_hash(b"x");

        let proposals = [
            serde_json::json!({ "filename": "../escaped.txt", "version": 1, "block_hash_list": [hash] }),
            serde_json::json!({ "filename": "../victim.txt", "version": 1, "block_hash_list": ["0"] }),
            serde_json::json!({ "filename": "big.txt", "version": u64::MAX, "block_hash_list": [hash] }),
        ];
        for proposal in proposals {
            let (status, body): (_, ErrorResponse) =
                call(app.clone(), "POST", "/files", Some(proposal)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(body.error.contains("Invalid request"));
        }

        assert!(store.get_file_info_map().is_empty());
    }

    async fn spawn(app: Router) -> String {
        let listener = bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(serve(listener, app));
        addr
    }

    #[tokio::test]
    async fn test_sync_over_http() {
        let mut block_store_addrs = Vec::new();
        for _ in 0..2 {
            let addr = spawn(block_store_router(Arc::new(BlockStore::new()))).await;
            block_store_addrs.push(addr);
        }
        let meta_store = Arc::new(MetaStore::new(block_store_addrs));
        let meta_addr = spawn(meta_store_router(meta_store.clone())).await;

        let cluster = Arc::new(HttpCluster::new(meta_addr, Duration::from_secs(5)).unwrap());
        let alice = tempfile::tempdir().unwrap();
        let bob = tempfile::tempdir().unwrap();
        std::fs::write(alice.path().join("hello.txt"), b"hello over http, in blocks").unwrap();

        let settings = |dir: &std::path::Path| SyncSettings {
            base_dir: dir.to_path_buf(),
            block_size: 8,
        };
        let report = SyncOperation::new(cluster.clone(), settings(alice.path()))
            .run()
            .await
            .unwrap();
        assert_eq!(report.uploaded, vec!["hello.txt".to_string()]);

        let report = SyncOperation::new(cluster.clone(), settings(bob.path()))
            .run()
            .await
            .unwrap();
        assert_eq!(report.downloaded, vec!["hello.txt".to_string()]);
        assert_eq!(
            std::fs::read(bob.path().join("hello.txt")).unwrap(),
            b"hello over http, in blocks"
        );

        let stale = FileMeta::new("hello.txt", 1, vec![compute_hash(b"stale")]);
        assert_eq!(meta_store.update_file(stale).unwrap(), UpdateOutcome::Rejected);
    }
}
