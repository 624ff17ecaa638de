use angle_role_audit::audit::audit_chains;
use angle_role_audit::config::chains::ChainId;
use angle_role_audit::error::AuditError;
use angle_role_audit::notify::{DiscordSink, ReportSink, StdoutSink};
use angle_role_audit::probe::{RpcReader, SharedReader};
use angle_role_audit::registry::Directory;
use angle_role_audit::utils::config::Config;
use angle_role_audit::utils::rpc::build_http_provider;
use anyhow::{anyhow, Context};
use std::sync::Arc;
use std::time::Instant;

fn rpc_reader(config: &Config, chain: ChainId) -> anyhow::Result<SharedReader> {
    let rpc_url = config.rpc_url(chain)?;
    let provider = build_http_provider(rpc_url)
        .with_context(|| format!("failed to build provider for chain {chain}"))?;
    Ok(Arc::new(RpcReader::new(provider, config.probe_timeout_ms)))
}

fn build_sink(config: &Config) -> anyhow::Result<Arc<dyn ReportSink>> {
    if config.dry_run {
        return Ok(Arc::new(StdoutSink));
    }
    let discord = config
        .discord
        .as_ref()
        .ok_or_else(|| anyhow!("discord credentials are required outside dry-run"))?;
    Ok(Arc::new(DiscordSink::new(discord)?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    angle_role_audit::utils::env_guard::harden_env_setup();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        eprintln!("[STARTUP] RUST_LOG invalid or unset; defaulting to 'info'");
        tracing_subscriber::EnvFilter::new("info")
    });
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Arc::new(Config::load().context("failed to load configuration")?);
    let directory = Arc::new(
        Directory::load(&config.registry)
            .await
            .context("failed to load contract registry")?,
    );
    let sink = build_sink(&config)?;

    tracing::info!(
        "[STARTUP] Auditing {} chain(s): {} | timeout={}ms concurrency={} sink={}",
        config.chains.len(),
        config
            .chains
            .iter()
            .map(|c| c.name())
            .collect::<Vec<_>>()
            .join(","),
        config.probe_timeout_ms,
        config.probe_concurrency,
        sink.name()
    );

    let started = Instant::now();
    let reader_config = Arc::clone(&config);
    let outcomes = audit_chains(
        &config.chains,
        directory,
        move |chain| rpc_reader(&reader_config, chain),
        config.probe_concurrency,
        sink,
    )
    .await;

    let mut completed = 0usize;
    for (chain, outcome) in outcomes {
        match outcome {
            Ok(posted) => {
                completed += 1;
                tracing::info!(
                    "[AUDIT] {} ({}) done; report {}",
                    chain.name(),
                    chain.id(),
                    if posted { "posted" } else { "unchanged" }
                );
            }
            Err(err) => {
                let configuration = err
                    .downcast_ref::<AuditError>()
                    .is_some_and(AuditError::is_configuration);
                if configuration {
                    tracing::warn!("[AUDIT] {} ({}) skipped: {:#}", chain.name(), chain.id(), err);
                } else {
                    tracing::error!("[AUDIT] {} ({}) failed: {:#}", chain.name(), chain.id(), err);
                }
            }
        }
    }
    let failed = config.chains.len() - completed + config.unknown_chains.len();

    tracing::info!(
        "[AUDIT] Finished {} chain(s) in {:.1}s ({} failed)",
        config.chains.len(),
        started.elapsed().as_secs_f64(),
        failed
    );
    if failed > 0 {
        return Err(anyhow!("{failed} chain(s) did not complete"));
    }
    Ok(())
}
