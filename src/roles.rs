use alloy::primitives::{keccak256, B256};
use std::fmt;
use std::sync::OnceLock;

/// Access-control roles probed through `hasRole(bytes32,address)`.
///
/// The set is closed: every role the audit knows about is listed here and nowhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Governor,
    Guardian,
    FlashloanerTreasury,
    TimelockAdmin,
    Proposer,
    Executor,
    Canceller,
    Keeper,
    Distributor,
    DefaultAdmin,
}

impl Role {
    pub const ALL: [Role; 10] = [
        Self::Governor,
        Self::Guardian,
        Self::FlashloanerTreasury,
        Self::TimelockAdmin,
        Self::Proposer,
        Self::Executor,
        Self::Canceller,
        Self::Keeper,
        Self::Distributor,
        Self::DefaultAdmin,
    ];

    /// Short name used in reports.
    pub fn label(self) -> &'static str {
        match self {
            Self::Governor => "GOVERNOR",
            Self::Guardian => "GUARDIAN",
            Self::FlashloanerTreasury => "FLASHLOANER_TREASURY",
            Self::TimelockAdmin => "TIMELOCK_ADMIN",
            Self::Proposer => "PROPOSER",
            Self::Executor => "EXECUTOR",
            Self::Canceller => "CANCELLER",
            Self::Keeper => "KEEPER",
            Self::Distributor => "DISTRIBUTOR",
            Self::DefaultAdmin => "DEFAULT_ADMIN",
        }
    }

    /// Solidity constant name; the role id is its keccak256 except for the zero default admin.
    pub fn constant_name(self) -> &'static str {
        match self {
            Self::Governor => "GOVERNOR_ROLE",
            Self::Guardian => "GUARDIAN_ROLE",
            Self::FlashloanerTreasury => "FLASHLOANER_TREASURY_ROLE",
            Self::TimelockAdmin => "TIMELOCK_ADMIN_ROLE",
            Self::Proposer => "PROPOSER_ROLE",
            Self::Executor => "EXECUTOR_ROLE",
            Self::Canceller => "CANCELLER_ROLE",
            Self::Keeper => "KEEPER_ROLE",
            Self::Distributor => "DISTRIBUTOR_ROLE",
            Self::DefaultAdmin => "DEFAULT_ADMIN_ROLE",
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    pub fn id(self) -> B256 {
        static IDS: OnceLock<[B256; 10]> = OnceLock::new();
        let ids = IDS.get_or_init(|| {
            Role::ALL.map(|role| match role {
                Role::DefaultAdmin => B256::ZERO,
                other => keccak256(other.constant_name().as_bytes()),
            })
        });
        ids[self.index()]
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_role_ids_match_solidity_constants() {
        assert_eq!(Role::DefaultAdmin.id(), B256::ZERO);
        assert_eq!(Role::Governor.id(), keccak256("GOVERNOR_ROLE"));
        assert_eq!(Role::Keeper.id(), keccak256("KEEPER_ROLE"));
    }

    #[test]
    fn test_role_ids_are_distinct_and_indexed_in_order() {
        let ids = Role::ALL.iter().map(|r| r.id()).collect::<HashSet<_>>();
        assert_eq!(ids.len(), Role::ALL.len());
        for (i, role) in Role::ALL.iter().enumerate() {
            assert_eq!(role.index(), i);
        }
    }
}
