//! Chain-indexed contract directory.
//!
//! Every chain maps logical names (`Governor`, `EUR.Treasury`, `Merkl.CoreMerkl`, ...) to either an
//! address or a nested map. The directory is loaded once per run and never mutated.

use crate::config::chains::ChainId;
use crate::error::{AuditError, Result};
use crate::utils::config::RegistrySource;
use alloy::primitives::Address;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

const REGISTRY_FETCH_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RegistryNode {
    Map(BTreeMap<String, RegistryNode>),
    List(Vec<RegistryNode>),
    Leaf(serde_json::Value),
}

/// Parse a registry leaf as an address.
///
/// Lower- and upper-case hex are accepted as-is; mixed case must carry a valid EIP-55 checksum.
pub fn parse_address(raw: &str) -> Option<Address> {
    let hex = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X"))?;
    if hex.len() != 40 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let has_lower = hex.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = hex.bytes().any(|b| b.is_ascii_uppercase());
    if has_lower && has_upper {
        return Address::parse_checksummed(format!("0x{hex}"), None).ok();
    }
    format!("0x{hex}").parse::<Address>().ok()
}

impl RegistryNode {
    fn as_address(&self) -> Option<Address> {
        match self {
            Self::Leaf(serde_json::Value::String(raw)) => parse_address(raw),
            _ => None,
        }
    }

    fn collect_addresses(&self, seen: &mut HashSet<Address>, out: &mut Vec<Address>) {
        match self {
            Self::Map(children) => {
                for child in children.values() {
                    child.collect_addresses(seen, out);
                }
            }
            Self::List(items) => {
                for item in items {
                    item.collect_addresses(seen, out);
                }
            }
            leaf => {
                if let Some(address) = leaf.as_address() {
                    if seen.insert(address) {
                        out.push(address);
                    }
                }
            }
        }
    }
}

/// Contract directory of a single chain.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Registry {
    root: BTreeMap<String, RegistryNode>,
}

impl Registry {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|err| AuditError::Registry(format!("invalid chain registry: {err}")))
    }

    /// Resolve a dotted path such as `EUR.bridges.LayerZero`.
    pub fn get(&self, path: &str) -> Option<&RegistryNode> {
        let mut segments = path.split('.');
        let mut node = self.root.get(segments.next()?)?;
        for segment in segments {
            match node {
                RegistryNode::Map(children) => node = children.get(segment)?,
                RegistryNode::List(_) | RegistryNode::Leaf(_) => return None,
            }
        }
        Some(node)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    pub fn address(&self, path: &str) -> Option<Address> {
        self.get(path).and_then(RegistryNode::as_address)
    }

    /// Every address-valued leaf, arrays included, deduplicated, in key order of first appearance.
    pub fn flatten(&self) -> Vec<Address> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for node in self.root.values() {
            node.collect_addresses(&mut seen, &mut out);
        }
        out
    }
}

/// All chain registries, keyed by chain id.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    chains: BTreeMap<u64, Registry>,
}

impl Directory {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let by_key: BTreeMap<String, serde_json::Value> = serde_json::from_str(raw)
            .map_err(|err| AuditError::Registry(format!("invalid registry directory: {err}")))?;
        let mut chains = BTreeMap::new();
        for (key, value) in by_key {
            // Non-numeric top-level keys (metadata, schema version) are not chains.
            let Ok(chain_id) = key.trim().parse::<u64>() else {
                tracing::debug!("[REGISTRY] Ignoring non-chain key `{}`", key);
                continue;
            };
            let registry = serde_json::from_value::<Registry>(value).map_err(|err| {
                AuditError::Registry(format!("invalid registry for chain {chain_id}: {err}"))
            })?;
            chains.insert(chain_id, registry);
        }
        Ok(Self { chains })
    }

    pub fn from_path(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| AuditError::Registry(format!("failed to read `{path}`: {err}")))?;
        Self::from_json_str(&raw)
    }

    pub async fn fetch(url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REGISTRY_FETCH_TIMEOUT_SECS))
            .build()
            .map_err(|err| AuditError::Registry(err.to_string()))?;
        let resp = client
            .get(url)
            .send()
            .await
            .map_err(|err| AuditError::Registry(format!("GET {url} failed: {err}")))?;
        if !resp.status().is_success() {
            return Err(AuditError::Registry(format!(
                "GET {url} returned HTTP {}",
                resp.status()
            )));
        }
        let body = resp
            .text()
            .await
            .map_err(|err| AuditError::Registry(format!("GET {url} body: {err}")))?;
        Self::from_json_str(&body)
    }

    pub async fn load(source: &RegistrySource) -> Result<Self> {
        let directory = match source {
            RegistrySource::Path(path) => Self::from_path(path)?,
            RegistrySource::Url(url) => Self::fetch(url).await?,
        };
        tracing::info!(
            "[REGISTRY] Loaded directories for {} chain(s)",
            directory.chains.len()
        );
        Ok(directory)
    }

    pub fn directory(&self, chain: ChainId) -> Result<&Registry> {
        self.chains
            .get(&chain.id())
            .ok_or(AuditError::ChainNotConfigured(chain.id()))
    }
}
