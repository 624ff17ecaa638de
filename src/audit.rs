//! Per-chain role audit.
//!
//! The audit is a flat list of [`Check`]s built from the registry, executed with a bounded number
//! of reads in flight. Each check reads one value, evaluates it against the chain's
//! [`Governance`] and appends to the chain's own [`AnomalyLog`]. Vault managers are discovered
//! first since they are not in the registry.

use crate::anomaly::{AnomalyLog, AnomalySnapshot, Capability, Subject};
use crate::config::chains::ChainId;
use crate::error::Result;
use crate::notify::{notify, ReportSink};
use crate::policy::{BridgedToken, Governance, PolicyKind};
use crate::probe::{holds, list_vault_managers, read_address, Attribute, ContractReader, Probe, SharedReader};
use crate::registry::{Directory, Registry};
use crate::report::{render, Report};
use crate::roles::Role;
use alloy::primitives::{address, Address};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Protocol deployer EOA.
pub const DEPLOYER: Address = address!("a9ddd91249dfdd450e81e1c56ab60e1a62651701");
/// Automation keepers.
pub const KEEPERS: [Address; 2] = [
    address!("a9bbbdde822789f123667044443dc7001fb43c01"),
    address!("a9bb7e640ff985376e67bbb5843bf9a63a2fba02"),
];
pub const MERKL_KEEPER: Address = address!("435046800fb9149ee65159721a92cb7d50a7534b");

/// One read plus the policy its answer is held to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    /// Read a single-principal getter; an unauthorized non-zero value is a structural anomaly.
    Attribute {
        subject: Subject,
        target: Address,
        attribute: Attribute,
        policy: PolicyKind,
    },
    /// Ask whether `principal` holds a capability; a positive, unauthorized answer is a finding.
    Membership {
        principal: Address,
        subject: Subject,
        target: Address,
        probe: Probe,
        capability: Capability,
        policy: PolicyKind,
    },
}

/// Addresses whose privileges are checked on every contract. Missing registry entries are skipped.
pub fn principals(governance: &Governance) -> Vec<Address> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let candidates = [
        Some(DEPLOYER),
        Some(KEEPERS[0]),
        Some(KEEPERS[1]),
        Some(MERKL_KEEPER),
        governance.governor,
        governance.guardian,
        governance.timelock,
        governance.core_borrow,
        governance.proxy_admin,
        governance.angle_governor.filter(|_| governance.mainnet),
    ];
    for candidate in candidates.into_iter().flatten() {
        if seen.insert(candidate) {
            out.push(candidate);
        }
    }
    out
}

fn merkl_deployed(registry: &Registry) -> bool {
    ["Merkl.CoreMerkl", "Merkl.DistributionCreator", "Merkl.Distributor"]
        .iter()
        .all(|path| registry.address(path).is_some())
}

fn attribute_check(
    registry: &Registry,
    label: &'static str,
    path: &str,
    attribute: Attribute,
    policy: PolicyKind,
) -> Option<Check> {
    let Some(target) = registry.address(path) else {
        tracing::debug!("[AUDIT] `{}` not in registry; skipping {} check", path, label);
        return None;
    };
    Some(Check::Attribute {
        subject: Subject::Label(label),
        target,
        attribute,
        policy,
    })
}

/// Checks on well-known registry entries, reported by name.
pub fn named_checks(chain: ChainId, registry: &Registry) -> Vec<Check> {
    use Attribute as A;
    let mut entries: Vec<(&'static str, &str, Attribute, PolicyKind)> = Vec::new();

    if chain.is_mainnet() {
        entries.extend([
            ("Transmuter EUR", "EUR.Transmuter", A::AccessControlManager, PolicyKind::Core),
            ("Transmuter USD", "USD.Transmuter", A::AccessControlManager, PolicyKind::Core),
            ("ANGLE", "ANGLE", A::Minter, PolicyKind::Minter),
            ("Proposal Sender", "ProposalSender", A::Owner, PolicyKind::Owner),
            ("Merkl Middleman", "MerklGaugeMiddleman", A::AccessControlManager, PolicyKind::CoreMerkl),
        ]);
        for (label, path) in [
            ("Gauge Controller", "GaugeController"),
            ("Smart Wallet Whitelist", "SmartWalletWhitelist"),
            ("veANGLE", "veANGLE"),
            ("veBoostProxy", "veBoostProxy"),
        ] {
            entries.push((label, path, A::Admin, PolicyKind::Owner));
            entries.push((label, path, A::FutureAdmin, PolicyKind::Owner));
        }
    } else {
        entries.push(("Proposal Receiver", "ProposalReceiver", A::Owner, PolicyKind::Owner));
    }

    if registry.contains("CoreBorrow") && registry.contains("AngleRouterV2") {
        entries.push(("Angle Router", "AngleRouterV2", A::Core, PolicyKind::Core));
    }

    if registry.contains("ANGLE") && chain != ChainId::Polygon {
        let bridge = BridgedToken::Angle.bridge_path();
        entries.extend([
            ("ANGLE bridge", bridge, A::CanonicalToken, PolicyKind::CanonicalToken(BridgedToken::Angle)),
            ("ANGLE bridge", bridge, A::Treasury, PolicyKind::BridgeTreasury(BridgedToken::Angle)),
            ("ANGLE bridge", bridge, A::CoreBorrow, PolicyKind::Core),
        ]);
    }

    if merkl_deployed(registry) {
        entries.extend([
            ("Distribution Creator", "Merkl.DistributionCreator", A::Core, PolicyKind::CoreMerkl),
            ("Distributor", "Merkl.Distributor", A::Core, PolicyKind::CoreMerkl),
        ]);
    }

    if registry.contains("EUR.Savings") && registry.contains("USD.Savings") {
        entries.extend([
            ("Savings EUR", "EUR.Savings", A::AccessControlManager, PolicyKind::Core),
            ("Savings USD", "USD.Savings", A::AccessControlManager, PolicyKind::Core),
        ]);
    }

    entries.push(("Proxy Admin", "ProxyAdmin", A::Owner, PolicyKind::ProxyAdminOwner));

    for (label, token) in [("EURA bridge", BridgedToken::EurA), ("USDA bridge", BridgedToken::UsdA)] {
        let bridge = token.bridge_path();
        entries.push((label, bridge, A::CanonicalToken, PolicyKind::CanonicalToken(token)));
        entries.push((label, bridge, A::Treasury, PolicyKind::BridgeTreasury(token)));
    }

    entries
        .into_iter()
        .filter_map(|(label, path, attribute, policy)| {
            attribute_check(registry, label, path, attribute, policy)
        })
        .collect()
}

/// Generic getters read off every registry contract.
pub fn structural_sweep(contracts: &[Address]) -> Vec<Check> {
    let mut checks = Vec::with_capacity(contracts.len() * Attribute::SWEEP.len());
    for &target in contracts {
        for attribute in Attribute::SWEEP {
            let Some(policy) = attribute.default_policy() else {
                continue;
            };
            checks.push(Check::Attribute {
                subject: Subject::Address(target),
                target,
                attribute,
                policy,
            });
        }
    }
    checks
}

fn membership(
    principal: Address,
    subject: Subject,
    target: Address,
    probe: Probe,
    capability: Capability,
    policy: PolicyKind,
) -> Check {
    Check::Membership {
        principal,
        subject,
        target,
        probe,
        capability,
        policy,
    }
}

/// Every membership probe for `principal` on every registry contract.
pub fn principal_sweep(principal: Address, contracts: &[Address]) -> Vec<Check> {
    let mut checks = Vec::with_capacity(contracts.len() * (3 + Role::ALL.len()));
    for &target in contracts {
        let subject = Subject::Address(target);
        checks.push(membership(
            principal,
            subject,
            target,
            Probe::IsMinter(principal),
            Capability::Minter,
            PolicyKind::Minter,
        ));
        checks.push(membership(
            principal,
            subject,
            target,
            Probe::IsTrusted(principal),
            Capability::Trusted,
            PolicyKind::Trusted,
        ));
        checks.push(membership(
            principal,
            subject,
            target,
            Probe::Trusted(principal),
            Capability::Trusted,
            PolicyKind::Trusted,
        ));
        for role in Role::ALL {
            checks.push(membership(
                principal,
                subject,
                target,
                Probe::HasRole(role, principal),
                Capability::Role(role),
                PolicyKind::Role(role),
            ));
        }
    }
    checks
}

/// Role checks on the governance contracts themselves, reported by name.
pub fn focused_checks(principal: Address, registry: &Registry, governance: &Governance) -> Vec<Check> {
    let mut checks = Vec::new();
    for (label, path) in [("EURA", "EUR.AgToken"), ("USDA", "USD.AgToken")] {
        if let Some(token) = registry.address(path) {
            checks.push(membership(
                principal,
                Subject::Label(label),
                token,
                Probe::IsMinter(principal),
                Capability::Minter,
                PolicyKind::Minter,
            ));
        }
    }

    let mut roles_on = |label: &'static str, target: Option<Address>, roles: &[(Role, PolicyKind)]| {
        let Some(target) = target else {
            return;
        };
        for &(role, policy) in roles {
            checks.push(membership(
                principal,
                Subject::Label(label),
                target,
                Probe::HasRole(role, principal),
                Capability::Role(role),
                policy,
            ));
        }
    };
    let as_policy = |role: Role| (role, PolicyKind::Role(role));

    roles_on(
        "CoreBorrow",
        governance.core_borrow,
        &[
            as_policy(Role::Governor),
            as_policy(Role::Guardian),
            as_policy(Role::FlashloanerTreasury),
        ],
    );
    roles_on(
        "Timelock",
        governance.timelock,
        &[
            as_policy(Role::Proposer),
            as_policy(Role::Executor),
            as_policy(Role::Canceller),
            as_policy(Role::DefaultAdmin),
        ],
    );
    if merkl_deployed(registry) {
        roles_on(
            "Merkl Core",
            governance.core_merkl,
            &[
                as_policy(Role::Governor),
                as_policy(Role::Guardian),
                (Role::FlashloanerTreasury, PolicyKind::Forbidden),
            ],
        );
    }
    if governance.mainnet {
        roles_on(
            "Angle Distributor",
            governance.angle_distributor,
            &[as_policy(Role::Governor), as_policy(Role::Guardian)],
        );
    }
    checks
}

/// Vault managers listed by the EUR and USD treasuries must point back at them.
pub async fn vault_manager_checks(reader: SharedReader, governance: &Governance) -> Vec<Check> {
    let mut checks = Vec::new();
    for treasury in [governance.eur_treasury, governance.usd_treasury].into_iter().flatten() {
        for vault in list_vault_managers(Arc::clone(&reader), treasury).await {
            checks.push(Check::Attribute {
                subject: Subject::Address(vault),
                target: vault,
                attribute: Attribute::Treasury,
                policy: PolicyKind::ListedUnder(treasury),
            });
        }
    }
    checks
}

/// Registry-derived checks of a chain, in report order.
pub fn plan(chain: ChainId, registry: &Registry, governance: &Governance) -> Vec<Check> {
    let contracts = registry.flatten();
    let mut checks = named_checks(chain, registry);
    checks.extend(structural_sweep(&contracts));
    for principal in principals(governance) {
        checks.extend(focused_checks(principal, registry, governance));
        checks.extend(principal_sweep(principal, &contracts));
    }
    checks
}

/// Execute one check. Unreadable values never produce anomalies.
pub async fn run_check(
    reader: &dyn ContractReader,
    governance: &Governance,
    log: &AnomalyLog,
    check: Check,
) {
    match check {
        Check::Attribute {
            subject,
            target,
            attribute,
            policy,
        } => {
            let Ok(observed) = read_address(reader, target, attribute).await else {
                return;
            };
            if !governance.authorized(policy, observed) {
                log.record_structural(subject, attribute, observed);
            }
        }
        Check::Membership {
            principal,
            subject,
            target,
            probe,
            capability,
            policy,
        } => {
            if holds(reader, target, probe).await != Ok(true) {
                return;
            }
            if !governance.authorized(policy, principal) {
                log.record_principal(principal, subject, capability);
            }
        }
    }
}

/// Run `checks` with at most `concurrency` reads in flight.
pub async fn run_checks(
    reader: SharedReader,
    governance: Arc<Governance>,
    log: Arc<AnomalyLog>,
    checks: Vec<Check>,
    concurrency: usize,
) {
    let limit = concurrency.max(1);
    let mut in_flight = JoinSet::new();
    for check in checks {
        while in_flight.len() >= limit {
            if let Some(Err(err)) = in_flight.join_next().await {
                tracing::warn!("[AUDIT] Check task failed: {}", err);
            }
        }
        let reader = Arc::clone(&reader);
        let governance = Arc::clone(&governance);
        let log = Arc::clone(&log);
        in_flight.spawn(async move {
            run_check(reader.as_ref(), &governance, &log, check).await;
        });
    }
    while let Some(joined) = in_flight.join_next().await {
        if let Err(err) = joined {
            tracing::warn!("[AUDIT] Check task failed: {}", err);
        }
    }
}

/// Audit one chain against its registry.
pub async fn audit_chain(
    chain: ChainId,
    registry: &Registry,
    reader: SharedReader,
    concurrency: usize,
) -> AnomalySnapshot {
    let governance = Arc::new(Governance::from_registry(chain, registry));
    let log = Arc::new(AnomalyLog::new());

    let mut checks = plan(chain, registry, &governance);
    checks.extend(vault_manager_checks(Arc::clone(&reader), &governance).await);
    tracing::info!(
        "[AUDIT] {} ({}): {} check(s) over {} contract(s)",
        chain.name(),
        chain.id(),
        checks.len(),
        registry.flatten().len()
    );

    run_checks(reader, governance, Arc::clone(&log), checks, concurrency).await;

    let snapshot = log.snapshot().into_sorted();
    tracing::info!(
        "[AUDIT] {} ({}): {} structural anomaly(ies), {} principal(s) flagged",
        chain.name(),
        chain.id(),
        snapshot.structural.len(),
        snapshot.principals.len()
    );
    snapshot
}

/// Audit a chain, render its report and hand it to `sink`. Returns the report and whether it was posted.
pub async fn audit_and_notify(
    chain: ChainId,
    registry: &Registry,
    reader: SharedReader,
    concurrency: usize,
    sink: &dyn ReportSink,
) -> Result<(Report, bool)> {
    let snapshot = audit_chain(chain, registry, reader, concurrency).await;
    let report = render(chain, &snapshot);
    let posted = notify(sink, &report).await?;
    Ok((report, posted))
}

/// Audit `chains` in parallel and report how each one ended.
///
/// A chain stands alone: a missing directory, a reader that cannot be built or a failed
/// notification ends that chain only. Chains whose task panicked are absent from the result.
pub async fn audit_chains<F>(
    chains: &[ChainId],
    directory: Arc<Directory>,
    reader_for: F,
    concurrency: usize,
    sink: Arc<dyn ReportSink>,
) -> Vec<(ChainId, anyhow::Result<bool>)>
where
    F: Fn(ChainId) -> anyhow::Result<SharedReader> + Send + Sync + 'static,
{
    let reader_for = Arc::new(reader_for);
    let mut tasks = JoinSet::new();
    for chain in chains.iter().copied() {
        let directory = Arc::clone(&directory);
        let reader_for = Arc::clone(&reader_for);
        let sink = Arc::clone(&sink);
        tasks.spawn(async move {
            let outcome = async {
                let registry = directory.directory(chain)?;
                let reader = (*reader_for)(chain)?;
                let (_, posted) =
                    audit_and_notify(chain, registry, reader, concurrency, sink.as_ref()).await?;
                Ok::<bool, anyhow::Error>(posted)
            }
            .await;
            (chain, outcome)
        });
    }

    let mut outcomes = Vec::with_capacity(chains.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(err) => tracing::error!("[AUDIT] Chain task panicked: {}", err),
        }
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(raw: &str) -> Registry {
        Registry::from_json_str(raw).unwrap()
    }

    const SIDECHAIN: &str = r#"{
        "Governor": "0x00000000000000000000000000000000000000a1",
        "Guardian": "0x00000000000000000000000000000000000000a2",
        "Timelock": "0x00000000000000000000000000000000000000a3",
        "CoreBorrow": "0x00000000000000000000000000000000000000a4",
        "ProxyAdmin": "0x00000000000000000000000000000000000000a5",
        "AngleGovernor": "0x00000000000000000000000000000000000000a6",
        "ProposalReceiver": "0x00000000000000000000000000000000000000a7",
        "EUR": {
            "AgToken": "0x00000000000000000000000000000000000000b1",
            "Treasury": "0x00000000000000000000000000000000000000b2"
        }
    }"#;

    #[test]
    fn test_principals_skip_missing_and_mainnet_only_entries() {
        let reg = registry(SIDECHAIN);
        let side = principals(&Governance::from_registry(ChainId::Arbitrum, &reg));
        assert_eq!(side.len(), 9);
        assert!(!side.contains(&Address::with_last_byte(0xa6)));
        let main = principals(&Governance::from_registry(ChainId::Mainnet, &reg));
        assert_eq!(main.len(), 10);
        assert!(main.contains(&Address::with_last_byte(0xa6)));

        let bare = principals(&Governance::default());
        assert_eq!(bare, vec![DEPLOYER, KEEPERS[0], KEEPERS[1], MERKL_KEEPER]);
    }

    #[test]
    fn test_named_checks_follow_chain_and_deployment() {
        let reg = registry(SIDECHAIN);
        let labels = |checks: Vec<Check>| {
            checks
                .into_iter()
                .filter_map(|c| match c {
                    Check::Attribute {
                        subject: Subject::Label(label),
                        attribute,
                        ..
                    } => Some((label, attribute)),
                    _ => None,
                })
                .collect::<Vec<_>>()
        };
        let side = labels(named_checks(ChainId::Arbitrum, &reg));
        assert!(side.contains(&("Proposal Receiver", Attribute::Owner)));
        assert!(side.contains(&("Proxy Admin", Attribute::Owner)));
        // No router, no bridges, no Merkl: nothing else resolves.
        assert_eq!(side.len(), 2);

        // Mainnet entries are absent from this registry, so only the proxy admin resolves.
        let main = labels(named_checks(ChainId::Mainnet, &reg));
        assert_eq!(main, vec![("Proxy Admin", Attribute::Owner)]);
    }

    #[test]
    fn test_focused_checks_cover_governance_contracts() {
        let reg = registry(SIDECHAIN);
        let gov = Governance::from_registry(ChainId::Arbitrum, &reg);
        let checks = focused_checks(DEPLOYER, &reg, &gov);
        // EURA minter + 3 CoreBorrow roles + 4 Timelock roles.
        assert_eq!(checks.len(), 8);
        assert!(checks.iter().all(|c| matches!(c, Check::Membership { principal, .. } if *principal == DEPLOYER)));
    }

    #[test]
    fn test_sweeps_cover_every_contract() {
        let contracts = [Address::with_last_byte(1), Address::with_last_byte(2)];
        assert_eq!(structural_sweep(&contracts).len(), 2 * Attribute::SWEEP.len());
        assert_eq!(principal_sweep(DEPLOYER, &contracts).len(), 2 * (3 + Role::ALL.len()));
    }
}
