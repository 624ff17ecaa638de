//! Anomaly accumulator.
//!
//! One [`AnomalyLog`] exists per chain audit. Probe tasks append to it concurrently; the report is
//! rendered from a [`AnomalySnapshot`] once every task has finished.

use crate::probe::Attribute;
use crate::roles::Role;
use alloy::primitives::Address;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// The contract an anomaly was observed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Subject {
    Address(Address),
    /// Well-known registry entry, reported by name.
    Label(&'static str),
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address(address) => write!(f, "{address}"),
            Self::Label(label) => f.write_str(label),
        }
    }
}

/// Privilege a principal was found holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    Minter,
    Trusted,
    Role(Role),
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minter => f.write_str("MINTER"),
            Self::Trusted => f.write_str("TRUSTED"),
            Self::Role(role) => f.write_str(role.label()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct StructuralAnomaly {
    pub subject: Subject,
    pub attribute: Attribute,
    pub observed: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PrincipalFinding {
    pub contract: Subject,
    pub capability: Capability,
}

/// Everything recorded for one chain, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnomalySnapshot {
    pub structural: Vec<StructuralAnomaly>,
    /// Principals in order of their first finding.
    pub principals: Vec<(Address, Vec<PrincipalFinding>)>,
}

impl AnomalySnapshot {
    pub fn is_empty(&self) -> bool {
        self.structural.is_empty() && self.principals.is_empty()
    }

    pub fn findings_for(&self, principal: Address) -> &[PrincipalFinding] {
        self.principals
            .iter()
            .find(|(who, _)| *who == principal)
            .map(|(_, findings)| findings.as_slice())
            .unwrap_or(&[])
    }

    /// Put every list in a fixed order, so the same chain state always renders the same report.
    pub fn into_sorted(mut self) -> Self {
        self.structural.sort();
        self.principals.sort_by_key(|(principal, _)| *principal);
        for (_, findings) in &mut self.principals {
            findings.sort();
        }
        self
    }
}

#[derive(Default)]
struct Entries {
    structural: Vec<StructuralAnomaly>,
    principal_order: Vec<Address>,
    principals: HashMap<Address, Vec<PrincipalFinding>>,
}

/// Append-only, shareable anomaly store. Duplicates are kept.
#[derive(Default)]
pub struct AnomalyLog {
    entries: Mutex<Entries>,
}

impl AnomalyLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn record_structural(&self, subject: Subject, attribute: Attribute, observed: Address) {
        tracing::debug!("[AUDIT] {} - wrong {}: {}", subject, attribute, observed);
        self.lock().structural.push(StructuralAnomaly {
            subject,
            attribute,
            observed,
        });
    }

    pub fn record_principal(&self, principal: Address, contract: Subject, capability: Capability) {
        tracing::debug!("[AUDIT] {} holds {} on {}", principal, capability, contract);
        let mut entries = self.lock();
        let finding = PrincipalFinding {
            contract,
            capability,
        };
        match entries.principals.get_mut(&principal) {
            Some(findings) => findings.push(finding),
            None => {
                entries.principal_order.push(principal);
                entries.principals.insert(principal, vec![finding]);
            }
        }
    }

    pub fn len(&self) -> usize {
        let entries = self.lock();
        entries.structural.len() + entries.principals.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> AnomalySnapshot {
        let entries = self.lock();
        let principals = entries
            .principal_order
            .iter()
            .map(|principal| {
                (
                    *principal,
                    entries.principals.get(principal).cloned().unwrap_or_default(),
                )
            })
            .collect();
        AnomalySnapshot {
            structural: entries.structural.clone(),
            principals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_principal_findings_keep_first_seen_order() {
        let log = AnomalyLog::new();
        let a = Address::with_last_byte(0xa);
        let b = Address::with_last_byte(0xb);
        let contract = Subject::Address(Address::with_last_byte(0xff));
        log.record_principal(b, contract, Capability::Role(Role::Keeper));
        log.record_principal(a, contract, Capability::Minter);
        log.record_principal(b, Subject::Label("Timelock"), Capability::Trusted);

        let snapshot = log.snapshot();
        let order = snapshot.principals.iter().map(|(p, _)| *p).collect::<Vec<_>>();
        assert_eq!(order, vec![b, a]);
        assert_eq!(snapshot.findings_for(b).len(), 2);
        assert_eq!(snapshot.findings_for(a)[0].capability, Capability::Minter);
        assert!(snapshot.findings_for(Address::ZERO).is_empty());
    }

    #[test]
    fn test_sorted_snapshot_ignores_arrival_order() {
        let a = Address::with_last_byte(0xa);
        let b = Address::with_last_byte(0xb);
        let first = Subject::Address(Address::with_last_byte(1));
        let second = Subject::Address(Address::with_last_byte(2));

        let forward = AnomalyLog::new();
        forward.record_structural(first, Attribute::Owner, a);
        forward.record_structural(second, Attribute::Minter, b);
        forward.record_principal(a, first, Capability::Minter);
        forward.record_principal(b, second, Capability::Trusted);
        forward.record_principal(a, second, Capability::Role(Role::Keeper));

        let backward = AnomalyLog::new();
        backward.record_principal(a, second, Capability::Role(Role::Keeper));
        backward.record_principal(b, second, Capability::Trusted);
        backward.record_structural(second, Attribute::Minter, b);
        backward.record_principal(a, first, Capability::Minter);
        backward.record_structural(first, Attribute::Owner, a);

        assert_ne!(forward.snapshot(), backward.snapshot());
        assert_eq!(forward.snapshot().into_sorted(), backward.snapshot().into_sorted());
    }

    #[test]
    fn test_duplicates_are_kept() {
        let log = AnomalyLog::new();
        let principal = Address::with_last_byte(1);
        let contract = Subject::Address(Address::with_last_byte(2));
        log.record_principal(principal, contract, Capability::Trusted);
        log.record_principal(principal, contract, Capability::Trusted);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_capability_and_subject_display() {
        assert_eq!(Capability::Role(Role::Keeper).to_string(), "KEEPER");
        assert_eq!(Capability::Minter.to_string(), "MINTER");
        assert_eq!(Subject::Label("Proxy Admin").to_string(), "Proxy Admin");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_are_not_lost() {
        let log = Arc::new(AnomalyLog::new());
        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..64u8 {
            let log = Arc::clone(&log);
            tasks.spawn(async move {
                for j in 0..16u8 {
                    let contract = Subject::Address(Address::with_last_byte(j));
                    if j % 2 == 0 {
                        log.record_structural(contract, Attribute::Owner, Address::with_last_byte(i));
                    } else {
                        log.record_principal(
                            Address::with_last_byte(i % 8),
                            contract,
                            Capability::Role(Role::DefaultAdmin),
                        );
                    }
                }
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap();
        }

        let snapshot = log.snapshot();
        assert_eq!(snapshot.structural.len(), 64 * 8);
        assert_eq!(snapshot.principals.len(), 8);
        let total = snapshot.principals.iter().map(|(_, f)| f.len()).sum::<usize>();
        assert_eq!(total, 64 * 8);
    }
}
