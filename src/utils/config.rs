use crate::config::chains::{parse_chain_list, ChainId, ChainList};
use crate::error::{AuditError, Result};
use std::collections::HashMap;
use std::env;

pub const DEFAULT_ROLES_CHANNEL: &str = "roles-on-chain";
const DEFAULT_PROBE_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_PROBE_CONCURRENCY: usize = 10;

/// Where the chain-indexed contract directory is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrySource {
    Path(String),
    Url(String),
}

#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub bot_token: String,
    pub guild_id: String,
    pub channel_name: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub chains: Vec<ChainId>,
    /// `CHAIN_IDS` entries that name no supported chain. Each one fails on its own.
    pub unknown_chains: Vec<String>,
    rpc_urls: HashMap<ChainId, String>,
    pub registry: RegistrySource,
    pub discord: Option<DiscordConfig>,
    pub probe_timeout_ms: u64,
    pub probe_concurrency: usize,
    pub dry_run: bool,
}

fn validate_http_url(name: &str, raw: &str) -> Result<()> {
    let parsed = raw.parse::<reqwest::Url>().map_err(|e| {
        AuditError::InvalidConfig(format!("{name} must be a valid URL, got `{raw}`: {e}"))
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(AuditError::InvalidConfig(format!(
            "{name} must use http(s) scheme, got `{other}`"
        ))),
    }
}

fn parse_bool_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup. `load` feeds it the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let chains_raw = non_empty(lookup("CHAIN_IDS"))
            .ok_or_else(|| AuditError::MissingConfig("CHAIN_IDS must be set".to_string()))?;
        let ChainList {
            chains,
            unknown: unknown_chains,
        } = parse_chain_list(&chains_raw);
        for raw in &unknown_chains {
            tracing::warn!("[AUDIT] Chain {} skipped: {}", raw, AuditError::UnknownChain(raw.clone()));
        }
        if chains.is_empty() {
            return Err(AuditError::InvalidConfig(format!(
                "CHAIN_IDS must name at least one supported chain, got `{chains_raw}`"
            )));
        }

        // A missing RPC URL only disables its own chain, so it is not checked here.
        let rpc_urls = chains
            .iter()
            .filter_map(|chain| non_empty(lookup(chain.rpc_env_var())).map(|url| (*chain, url)))
            .collect::<HashMap<_, _>>();

        let registry = match (
            non_empty(lookup("REGISTRY_PATH")),
            non_empty(lookup("REGISTRY_URL")),
        ) {
            (Some(path), _) => RegistrySource::Path(path),
            (None, Some(url)) => {
                validate_http_url("REGISTRY_URL", &url)?;
                RegistrySource::Url(url)
            }
            (None, None) => {
                return Err(AuditError::MissingConfig(
                    "REGISTRY_PATH or REGISTRY_URL must be set".to_string(),
                ))
            }
        };

        let dry_run = lookup("DRY_RUN").map(|v| parse_bool_flag(&v)).unwrap_or(false);
        let discord = match (
            non_empty(lookup("DISCORD_BOT_TOKEN")),
            non_empty(lookup("DISCORD_GUILD_ID")),
        ) {
            (Some(bot_token), Some(guild_id)) => Some(DiscordConfig {
                bot_token,
                guild_id,
                channel_name: non_empty(lookup("ROLES_CHANNEL"))
                    .unwrap_or_else(|| DEFAULT_ROLES_CHANNEL.to_string()),
            }),
            _ if dry_run => None,
            _ => {
                return Err(AuditError::MissingConfig(
                    "DISCORD_BOT_TOKEN and DISCORD_GUILD_ID must be set (or DRY_RUN=true)"
                        .to_string(),
                ))
            }
        };

        let probe_timeout_ms = lookup("PROBE_TIMEOUT_MS")
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .map(|v| v.clamp(250, 20_000))
            .unwrap_or(DEFAULT_PROBE_TIMEOUT_MS);
        let probe_concurrency = lookup("PROBE_CONCURRENCY")
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .map(|v| v.clamp(1, 256))
            .unwrap_or(DEFAULT_PROBE_CONCURRENCY);

        Ok(Self {
            chains,
            unknown_chains,
            rpc_urls,
            registry,
            discord,
            probe_timeout_ms,
            probe_concurrency,
            dry_run,
        })
    }

    /// RPC endpoint for `chain`, validated on access so a bad URL fails that chain alone.
    pub fn rpc_url(&self, chain: ChainId) -> Result<&str> {
        let url = self.rpc_urls.get(&chain).ok_or_else(|| {
            AuditError::MissingConfig(format!("{} must be set", chain.rpc_env_var()))
        })?;
        validate_http_url(chain.rpc_env_var(), url)?;
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_requires_chain_ids() {
        let err = Config::from_lookup(lookup_from(&[("REGISTRY_PATH", "r.json")])).unwrap_err();
        assert!(matches!(err, AuditError::MissingConfig(_)));
    }

    #[test]
    fn test_config_dry_run_does_not_need_discord() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("CHAIN_IDS", "1,137"),
            ("REGISTRY_PATH", "registry.json"),
            ("DRY_RUN", "true"),
            ("ETH_NODE_URI_MAINNET", "https://eth.example"),
        ]))
        .unwrap();
        assert!(cfg.dry_run);
        assert!(cfg.discord.is_none());
        assert_eq!(cfg.probe_concurrency, DEFAULT_PROBE_CONCURRENCY);
        assert_eq!(cfg.rpc_url(ChainId::Mainnet).unwrap(), "https://eth.example");
        // Polygon has no URL: only that chain is affected.
        assert!(matches!(
            cfg.rpc_url(ChainId::Polygon),
            Err(AuditError::MissingConfig(_))
        ));
    }

    #[test]
    fn test_config_requires_discord_outside_dry_run() {
        let err = Config::from_lookup(lookup_from(&[
            ("CHAIN_IDS", "1"),
            ("REGISTRY_PATH", "registry.json"),
        ]))
        .unwrap_err();
        assert!(matches!(err, AuditError::MissingConfig(_)));
    }

    #[test]
    fn test_config_clamps_probe_limits_and_defaults_channel() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("CHAIN_IDS", "42161"),
            ("REGISTRY_URL", "https://registry.example/registry.json"),
            ("DISCORD_BOT_TOKEN", "token"),
            ("DISCORD_GUILD_ID", "42"),
            ("PROBE_TIMEOUT_MS", "5"),
            ("PROBE_CONCURRENCY", "100000"),
        ]))
        .unwrap();
        assert_eq!(cfg.probe_timeout_ms, 250);
        assert_eq!(cfg.probe_concurrency, 256);
        let discord = cfg.discord.unwrap();
        assert_eq!(discord.channel_name, DEFAULT_ROLES_CHANNEL);
        assert_eq!(
            cfg.registry,
            RegistrySource::Url("https://registry.example/registry.json".to_string())
        );
    }

    #[test]
    fn test_unknown_chain_id_only_drops_that_chain() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("CHAIN_IDS", "1,999"),
            ("REGISTRY_PATH", "registry.json"),
            ("DRY_RUN", "1"),
            ("ETH_NODE_URI_MAINNET", "https://eth.example"),
        ]))
        .unwrap();
        assert_eq!(cfg.chains, vec![ChainId::Mainnet]);
        assert_eq!(cfg.unknown_chains, vec!["999".to_string()]);
        assert_eq!(cfg.rpc_url(ChainId::Mainnet).unwrap(), "https://eth.example");
    }

    #[test]
    fn test_config_fails_when_no_supported_chain_is_left() {
        let err = Config::from_lookup(lookup_from(&[
            ("CHAIN_IDS", "999,31337"),
            ("REGISTRY_PATH", "registry.json"),
            ("DRY_RUN", "1"),
        ]))
        .unwrap_err();
        assert!(matches!(err, AuditError::InvalidConfig(_)));
    }

    #[test]
    fn test_rpc_url_rejects_non_http_scheme() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("CHAIN_IDS", "10"),
            ("REGISTRY_PATH", "registry.json"),
            ("DRY_RUN", "1"),
            ("ETH_NODE_URI_OPTIMISM", "wss://op.example"),
        ]))
        .unwrap();
        assert!(matches!(
            cfg.rpc_url(ChainId::Optimism),
            Err(AuditError::InvalidConfig(_))
        ));
    }
}
