use super::RemoteCluster;
use super::protocol::*;
use crate::error::{Result, SurfError};
use crate::model::{Block, FileInfoMap, FileMeta, UpdateOutcome};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;

/// HttpCluster talks JSON over HTTP to one metadata store and any number of
/// block stores. Every request is bounded by the configured timeout.
#[derive(Clone)]
pub struct HttpCluster {
    client: reqwest::Client,
    meta_store_addr: String,
}

impl HttpCluster {
    pub fn new(meta_store_addr: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| SurfError::Config(format!("failed to build HTTP client: {}", error)))?;

        Ok(Self {
            client,
            meta_store_addr: meta_store_addr.into(),
        })
    }

    fn url(addr: &str, path: &str) -> String {
        let base = addr.trim_end_matches('/');
        if base.starts_with("http://") || base.starts_with("https://") {
            format!("{}{}", base, path)
        } else {
            format!("http://{}{}", base, path)
        }
    }

    async fn get_json<R: DeserializeOwned>(&self, addr: &str, path: &str) -> Result<R> {
        let url = Self::url(addr, path);
        let response = self.client.get(&url).send().await?;
        Self::decode(response, &url).await
    }

    async fn send_json<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        addr: &str,
        path: &str,
        payload: &T,
    ) -> Result<R> {
        let url = Self::url(addr, path);
        let response = self
            .client
            .request(method, &url)
            .json(payload)
            .send()
            .await?;
        Self::decode(response, &url).await
    }

    async fn decode<R: DeserializeOwned>(response: reqwest::Response, url: &str) -> Result<R> {
        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<ErrorResponse>()
                .await
                .map(|body| body.error)
                .unwrap_or_default();
            return Err(SurfError::Http(format!(
                "request failed: status={} url={} {}",
                status, url, detail
            )));
        }

        Ok(response.json::<R>().await?)
    }
}

#[async_trait]
impl RemoteCluster for HttpCluster {
    async fn get_block(&self, block_store_addr: &str, hash: &str) -> Result<Block> {
        let url = Self::url(block_store_addr, &block_path(hash));
        let response = self.client.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(SurfError::BlockNotFound(hash.to_string()));
        }

        let payload: BlockPayload = Self::decode(response, &url).await?;
        Block::try_from(payload)
    }

    async fn put_block(&self, block_store_addr: &str, block: &Block) -> Result<bool> {
        let response: PutBlockResponse = self
            .send_json(
                reqwest::Method::PUT,
                block_store_addr,
                ENDPOINT_BLOCKS,
                &BlockPayload::from(block),
            )
            .await?;
        Ok(response.flag)
    }

    async fn has_blocks(&self, block_store_addr: &str, hashes: &[String]) -> Result<Vec<String>> {
        let payload = HashesPayload {
            hashes: hashes.to_vec(),
        };
        let response: HashesPayload = self
            .send_json(
                reqwest::Method::POST,
                block_store_addr,
                ENDPOINT_HAS_BLOCKS,
                &payload,
            )
            .await?;
        Ok(response.hashes)
    }

    async fn get_block_hashes(&self, block_store_addr: &str) -> Result<Vec<String>> {
        let response: HashesPayload = self.get_json(block_store_addr, ENDPOINT_BLOCKS).await?;
        Ok(response.hashes)
    }

    async fn get_file_info_map(&self) -> Result<FileInfoMap> {
        let response: FileInfoMapResponse =
            self.get_json(&self.meta_store_addr, ENDPOINT_FILES).await?;
        Ok(response.file_info_map)
    }

    async fn update_file(&self, meta: &FileMeta) -> Result<UpdateOutcome> {
        let response: UpdateFileResponse = self
            .send_json(
                reqwest::Method::POST,
                &self.meta_store_addr,
                ENDPOINT_FILES,
                meta,
            )
            .await?;
        Ok(UpdateOutcome::from_wire(response.version))
    }

    async fn get_block_store_map(
        &self,
        hashes: &[String],
    ) -> Result<HashMap<String, Vec<String>>> {
        let payload = HashesPayload {
            hashes: hashes.to_vec(),
        };
        let response: BlockStoreMapResponse = self
            .send_json(
                reqwest::Method::POST,
                &self.meta_store_addr,
                ENDPOINT_BLOCK_STORE_MAP,
                &payload,
            )
            .await?;
        Ok(response.block_store_map)
    }

    async fn get_block_store_addrs(&self) -> Result<Vec<String>> {
        let response: BlockStoreAddrsResponse = self
            .get_json(&self.meta_store_addr, ENDPOINT_BLOCK_STORE_ADDRS)
            .await?;
        Ok(response.block_store_addrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_adds_scheme_when_missing() {
        assert_eq!(
            HttpCluster::url("localhost:8081", "/blocks"),
            "http://localhost:8081/blocks"
        );
        assert_eq!(
            HttpCluster::url("https://store.example/", "/files"),
            "https://store.example/files"
        );
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_fast() {
        let cluster = HttpCluster::new("127.0.0.1:1", Duration::from_millis(200)).unwrap();
        let error = cluster.get_file_info_map().await.unwrap_err();
        assert!(matches!(error, SurfError::Http(_) | SurfError::Timeout(_)));
    }
}
