//! Balance source seam: the remote balance endpoint behind one trait.
//!
//! Everything upstream of this module treats the API as a single async
//! capability. The production implementation is [`HttpBalanceSource`];
//! tests substitute their own.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use saldo_core::{Address, FetchError, Network};
use serde::{Deserialize, Serialize};

/// Wire envelope returned by the balance endpoint.
///
/// A `success: false` envelope is a rejection even when the transport
/// succeeded; both are routed into the backup chain the same way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchEnvelope {
    pub success: bool,
    #[serde(default)]
    pub data: Option<FetchPayload>,
}

/// Payload of a successful envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchPayload {
    pub balances_table: BTreeMap<String, String>,
    pub network: Network,
    pub address: Address,
}

/// A provider of fresh balance tables.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// Fetch the balance table for `address` on `network`.
    async fn fetch(
        &self,
        network: &Network,
        address: &Address,
    ) -> Result<BTreeMap<String, String>, FetchError>;
}

/// HTTP implementation of [`BalanceSource`] over the GET
/// balance-by-address-and-network contract.
#[derive(Clone)]
pub struct HttpBalanceSource {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpBalanceSource {
    /// Build a client with a hard request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport {
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn balance_url(&self, network: &Network, address: &Address) -> String {
        format!("{}/api/v1/balances/{}/{}", self.base_url, network, address)
    }
}

#[async_trait]
impl BalanceSource for HttpBalanceSource {
    async fn fetch(
        &self,
        network: &Network,
        address: &Address,
    ) -> Result<BTreeMap<String, String>, FetchError> {
        let url = self.balance_url(network, address);
        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    elapsed_ms: self.timeout.as_millis() as u64,
                }
            } else {
                FetchError::Transport {
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let envelope: FetchEnvelope =
            response
                .json()
                .await
                .map_err(|e| FetchError::MalformedPayload {
                    reason: e.to_string(),
                })?;

        unwrap_envelope(envelope)
    }
}

/// Turn an envelope into a balance table, enforcing the success flag.
fn unwrap_envelope(envelope: FetchEnvelope) -> Result<BTreeMap<String, String>, FetchError> {
    if !envelope.success {
        return Err(FetchError::Rejected {
            message: "balance endpoint reported failure".to_string(),
        });
    }
    let payload = envelope.data.ok_or_else(|| FetchError::MalformedPayload {
        reason: "success envelope missing data".to_string(),
    })?;
    Ok(payload.balances_table)
}
