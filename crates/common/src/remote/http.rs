use async_trait::async_trait;
use reqwest::{header::HeaderMap, header::HeaderValue, Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{KeyDirectory, LedgerService, RemoteError};
use crate::crypto::{PublicKey, RsaPublicKey};
use crate::ledger::{
    AccountId, BlockAddress, Ledger, LedgerCreateRequest, LedgerHeadQuery, SignedBlock,
};

pub const DEFAULT_SERVICE_URL: &str = "https://thorne.app/api/";
pub const DEFAULT_USERS_URL: &str = "https://users.thorne.app/";
pub const DEFAULT_PUBLIC_USERS_URL: &str = "https://publicusers.thorne.app/";

/// Where the remote collaborators live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base of the `write`, `createLedger` and `getLedgerHead` endpoints
    pub service_url: Url,
    /// Key directory for private accounts
    pub users_url: Url,
    /// Key directory for public aliases; also serves every RSA key
    pub public_users_url: Url,
}

impl RemoteConfig {
    /// The hosted Thorne service
    pub fn hosted() -> Result<Self, RemoteError> {
        Self::new(DEFAULT_SERVICE_URL, DEFAULT_USERS_URL, DEFAULT_PUBLIC_USERS_URL)
    }

    pub fn new(service_url: &str, users_url: &str, public_users_url: &str) -> Result<Self, RemoteError> {
        Ok(Self {
            service_url: as_base(service_url)?,
            users_url: as_base(users_url)?,
            public_users_url: as_base(public_users_url)?,
        })
    }
}

/// Parse `url` so that relative joins append to its path
fn as_base(url: &str) -> Result<Url, url::ParseError> {
    if url.ends_with('/') {
        Url::parse(url)
    } else {
        Url::parse(&format!("{}/", url))
    }
}

/// A request to one of the remote endpoints
trait ApiRequest {
    type Response: DeserializeOwned;

    fn build_request(self, config: &RemoteConfig, client: &Client) -> Result<RequestBuilder, RemoteError>;
}

struct CreateLedger(LedgerCreateRequest);

impl ApiRequest for CreateLedger {
    type Response = Ledger;

    fn build_request(self, config: &RemoteConfig, client: &Client) -> Result<RequestBuilder, RemoteError> {
        let url = config.service_url.join("createLedger")?;
        Ok(client.put(url).json(&self.0))
    }
}

/// Service answer to a block write
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BlockResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: String,
    #[serde(rename = "UUID", default)]
    uuid: String,
}

impl BlockResponse {
    /// The address assigned to the written block
    fn into_address(self) -> Result<BlockAddress, RemoteError> {
        if !self.error.is_empty() && !self.success {
            return Err(RemoteError::Rejected(self.error));
        }
        if self.uuid.trim().is_empty() {
            return Err(RemoteError::Decode(
                "write acknowledged without a block address".to_string(),
            ));
        }
        Ok(BlockAddress::new(self.uuid))
    }
}

struct WriteBlock(SignedBlock);

impl ApiRequest for WriteBlock {
    type Response = BlockResponse;

    fn build_request(self, config: &RemoteConfig, client: &Client) -> Result<RequestBuilder, RemoteError> {
        let url = config.service_url.join("write")?;
        Ok(client.put(url).json(&self.0))
    }
}

struct LedgerHead(LedgerHeadQuery);

impl ApiRequest for LedgerHead {
    type Response = Ledger;

    fn build_request(self, config: &RemoteConfig, client: &Client) -> Result<RequestBuilder, RemoteError> {
        let url = config.service_url.join("getLedgerHead")?;
        Ok(client.put(url).json(&self.0))
    }
}

/// HTTP client for the ledger service and key directory
#[derive(Debug, Clone)]
pub struct HttpLedgerService {
    config: RemoteConfig,
    client: Client,
}

impl HttpLedgerService {
    pub fn new(config: RemoteConfig) -> Result<Self, RemoteError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder().default_headers(default_headers).build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    async fn call<T: ApiRequest>(&self, request: T) -> Result<T::Response, RemoteError> {
        let response = request.build_request(&self.config, &self.client)?.send().await?;

        if response.status().is_success() {
            Ok(response.json::<T::Response>().await?)
        } else {
            Err(RemoteError::Status(response.status(), response.text().await?))
        }
    }

    /// GET a published key file: a base64 string body
    async fn fetch_key(&self, url: Url) -> Result<String, RemoteError> {
        tracing::debug!("fetching key {}", url);
        let response = self.client.get(url.clone()).send().await?;
        match response.status() {
            status if status.is_success() => Ok(response.text().await?.trim().to_string()),
            StatusCode::NOT_FOUND => Err(RemoteError::NotFound(url.to_string())),
            status => Err(RemoteError::Status(status, response.text().await?)),
        }
    }
}

#[async_trait]
impl LedgerService for HttpLedgerService {
    async fn create_ledger(&self, request: LedgerCreateRequest) -> Result<Ledger, RemoteError> {
        self.call(CreateLedger(request)).await
    }

    async fn write_block(&self, block: SignedBlock) -> Result<BlockAddress, RemoteError> {
        self.call(WriteBlock(block)).await?.into_address()
    }

    async fn ledger_head(&self, query: LedgerHeadQuery) -> Result<BlockAddress, RemoteError> {
        Ok(self.call(LedgerHead(query)).await?.last_block)
    }

    async fn fetch_block(&self, address: &BlockAddress) -> Result<Option<SignedBlock>, RemoteError> {
        let url = Url::parse(address.as_str())?;
        let response = self.client.get(url).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let bytes = response.bytes().await?;
                serde_json::from_slice(&bytes)
                    .map(Some)
                    .map_err(|e| RemoteError::Decode(format!("block at {}: {}", address, e)))
            }
            status => Err(RemoteError::Status(status, response.text().await?)),
        }
    }
}

#[async_trait]
impl KeyDirectory for HttpLedgerService {
    async fn identity_key(&self, account: &AccountId) -> Result<PublicKey, RemoteError> {
        let base = if account.is_alias() {
            &self.config.public_users_url
        } else {
            &self.config.users_url
        };
        let url = base.join(&format!("{}/public.key", account))?;
        let encoded = self.fetch_key(url).await?;
        PublicKey::from_base64(&encoded).map_err(|e| RemoteError::Decode(e.to_string()))
    }

    async fn rsa_key(&self, account: &AccountId) -> Result<RsaPublicKey, RemoteError> {
        let url = self
            .config
            .public_users_url
            .join(&format!("{}/rsa.key", account))?;
        let encoded = self.fetch_key(url).await?;
        RsaPublicKey::from_base64(&encoded).map_err(|e| RemoteError::Decode(e.to_string()))
    }
}
