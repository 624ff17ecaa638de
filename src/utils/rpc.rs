use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::TransactionRequest;
use alloy::transports::http::Http;
use reqwest::Client;
use std::time::Duration;

const RPC_ERR_MAX_LEN: usize = 260;

pub type HttpProvider = RootProvider<Http<Client>>;

pub fn build_http_provider(rpc_url: &str) -> anyhow::Result<HttpProvider> {
    let trimmed = rpc_url.trim();
    if trimmed.is_empty() {
        anyhow::bail!("empty RPC url");
    }
    let parsed = trimmed
        .parse::<reqwest::Url>()
        .map_err(|err| anyhow::anyhow!("invalid RPC url `{}`: {}", trimmed, err))?;
    Ok(ProviderBuilder::new().on_http(parsed))
}

pub fn compact_rpc_error_message(message: &str) -> String {
    crate::utils::error::compact_error_message(message, RPC_ERR_MAX_LEN)
}

/// Single `eth_call` against the latest block, bounded by `timeout_ms`. No retries.
pub async fn eth_call_with_timeout(
    provider: &HttpProvider,
    to: Address,
    input: Bytes,
    timeout_ms: u64,
) -> anyhow::Result<Bytes> {
    let request = TransactionRequest::default().with_to(to).with_input(input);
    let raw = tokio::time::timeout(Duration::from_millis(timeout_ms), provider.call(&request))
        .await
        .map_err(|_| anyhow::anyhow!("eth_call timed out after {}ms for to={:#x}", timeout_ms, to))?
        .map_err(|err| {
            anyhow::anyhow!(
                "eth_call failed for to={:#x}: {}",
                to,
                compact_rpc_error_message(&err.to_string())
            )
        })?;
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_provider_rejects_empty_and_garbage_urls() {
        assert!(build_http_provider("  ").is_err());
        assert!(build_http_provider("not a url").is_err());
    }

    #[tokio::test]
    async fn test_build_http_provider_accepts_http_url() {
        assert!(build_http_provider("http://127.0.0.1:8545").is_ok());
    }
}
