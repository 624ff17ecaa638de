//! Authorization policy evaluator.
//!
//! Decides, for a chain and its registry, whether an observed principal may hold an attribute or a
//! role. Every predicate is pure: it reads the [`Governance`] snapshot and nothing else.
//!
//! Two observation shapes exist:
//! - single-principal attributes (`owner()`, `minter()`, `treasury()`, ...) read one address from a
//!   contract. A zero address means "nobody holds it" and is always authorized.
//! - role membership (`hasRole`, `isMinter`, `isTrusted`, `trusted`) asks whether a given principal
//!   holds a capability. Only a positive answer is evaluated, with the principal as the observed
//!   address.

use crate::config::chains::ChainId;
use crate::probe::Attribute;
use crate::registry::Registry;
use crate::roles::Role;
use alloy::primitives::Address;

/// LayerZero bridge tokens whose wiring is checked against the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgedToken {
    EurA,
    UsdA,
    Angle,
}

impl BridgedToken {
    pub fn label(self) -> &'static str {
        match self {
            Self::EurA => "EURA",
            Self::UsdA => "USDA",
            Self::Angle => "ANGLE",
        }
    }

    /// Registry path of the bridge contract itself.
    pub fn bridge_path(self) -> &'static str {
        match self {
            Self::EurA => "EUR.bridges.LayerZero",
            Self::UsdA => "USD.bridges.LayerZero",
            Self::Angle => "bridges.LayerZero",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyKind {
    /// `owner`, `admin`, `future_admin`.
    Owner,
    Minter,
    Treasury,
    /// `coreBorrow`, `core`, `accessControlManager`.
    Core,
    CoreMerkl,
    /// Stricter than [`PolicyKind::Owner`]: only the Governor may own the ProxyAdmin.
    ProxyAdminOwner,
    Trusted,
    /// The bridge's canonical token must be the registry's token of the same asset.
    CanonicalToken(BridgedToken),
    /// The bridge's treasury must be the registry's treasury of the same stablecoin.
    BridgeTreasury(BridgedToken),
    /// A vault manager must point back at the treasury that lists it.
    ListedUnder(Address),
    Role(Role),
    /// Capability that nobody may hold on the probed contract.
    Forbidden,
}

impl PolicyKind {
    /// Membership kinds evaluate a principal that answered "yes"; all others evaluate a read value.
    pub fn is_membership(self) -> bool {
        matches!(self, Self::Trusted | Self::Role(_) | Self::Forbidden)
    }
}

impl Attribute {
    /// Policy applied when the attribute is read off an arbitrary registry contract.
    /// `canonicalToken` only has meaning on bridge tokens and has no generic policy.
    pub fn default_policy(self) -> Option<PolicyKind> {
        match self {
            Self::Owner | Self::Admin | Self::FutureAdmin => Some(PolicyKind::Owner),
            Self::Minter => Some(PolicyKind::Minter),
            Self::Treasury => Some(PolicyKind::Treasury),
            Self::CoreBorrow | Self::Core | Self::AccessControlManager => Some(PolicyKind::Core),
            Self::CanonicalToken => None,
        }
    }
}

/// The registry entries policy decisions depend on, resolved once per chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Governance {
    pub mainnet: bool,
    pub governor: Option<Address>,
    pub guardian: Option<Address>,
    pub timelock: Option<Address>,
    pub proxy_admin: Option<Address>,
    pub core_borrow: Option<Address>,
    pub angle_governor: Option<Address>,
    pub proposal_receiver: Option<Address>,
    pub angle_distributor: Option<Address>,
    pub core_merkl: Option<Address>,
    pub eur_treasury: Option<Address>,
    pub usd_treasury: Option<Address>,
    pub eur_ag_token: Option<Address>,
    pub usd_ag_token: Option<Address>,
    pub angle: Option<Address>,
}

fn is_any(observed: Address, candidates: &[Option<Address>]) -> bool {
    candidates.iter().flatten().any(|c| *c == observed)
}

impl Governance {
    pub fn from_registry(chain: ChainId, registry: &Registry) -> Self {
        Self {
            mainnet: chain.is_mainnet(),
            governor: registry.address("Governor"),
            guardian: registry.address("Guardian"),
            timelock: registry.address("Timelock"),
            proxy_admin: registry.address("ProxyAdmin"),
            core_borrow: registry.address("CoreBorrow"),
            angle_governor: registry.address("AngleGovernor"),
            proposal_receiver: registry.address("ProposalReceiver"),
            angle_distributor: registry.address("AngleDistributor"),
            core_merkl: registry.address("Merkl.CoreMerkl"),
            eur_treasury: registry.address("EUR.Treasury"),
            usd_treasury: registry.address("USD.Treasury"),
            eur_ag_token: registry.address("EUR.AgToken"),
            usd_ag_token: registry.address("USD.AgToken"),
            angle: registry.address("ANGLE"),
        }
    }

    /// AngleGovernor only counts on mainnet.
    fn mainnet_governor(&self) -> Option<Address> {
        self.angle_governor.filter(|_| self.mainnet)
    }

    fn owner_set(&self) -> [Option<Address>; 5] {
        [
            self.governor,
            self.timelock,
            self.proxy_admin,
            self.core_borrow,
            self.mainnet_governor(),
        ]
    }

    fn guardian_set(&self) -> [Option<Address>; 6] {
        [
            self.governor,
            self.guardian,
            self.timelock,
            self.proxy_admin,
            self.core_borrow,
            self.mainnet_governor(),
        ]
    }

    fn treasuries(&self) -> [Option<Address>; 2] {
        [self.eur_treasury, self.usd_treasury]
    }

    fn role_authorized(&self, role: Role, principal: Address) -> bool {
        match role {
            Role::Governor => is_any(principal, &self.owner_set()),
            Role::Guardian => is_any(principal, &self.guardian_set()),
            Role::FlashloanerTreasury => is_any(principal, &self.treasuries()),
            Role::Proposer if self.mainnet => is_any(principal, &[self.angle_governor]),
            Role::Proposer => is_any(principal, &[self.proposal_receiver]),
            Role::Executor | Role::Canceller => is_any(principal, &[self.guardian]),
            Role::Distributor => self.mainnet && is_any(principal, &[self.angle_distributor]),
            Role::TimelockAdmin | Role::DefaultAdmin | Role::Keeper => false,
        }
    }

    pub fn authorized(&self, kind: PolicyKind, observed: Address) -> bool {
        if !kind.is_membership() && observed == Address::ZERO {
            return true;
        }
        match kind {
            PolicyKind::Owner => is_any(observed, &self.owner_set()),
            PolicyKind::Minter => is_any(observed, &[self.governor, self.timelock]),
            PolicyKind::Treasury => is_any(observed, &self.treasuries()),
            PolicyKind::Core => is_any(observed, &[self.core_borrow]),
            PolicyKind::CoreMerkl => is_any(observed, &[self.core_merkl]),
            PolicyKind::ProxyAdminOwner => is_any(observed, &[self.governor]),
            PolicyKind::Trusted => is_any(observed, &self.guardian_set()),
            PolicyKind::CanonicalToken(token) => {
                let expected = match token {
                    BridgedToken::EurA => self.eur_ag_token,
                    BridgedToken::UsdA => self.usd_ag_token,
                    BridgedToken::Angle => self.angle,
                };
                is_any(observed, &[expected])
            }
            PolicyKind::BridgeTreasury(BridgedToken::EurA) => {
                is_any(observed, &[self.eur_treasury])
            }
            PolicyKind::BridgeTreasury(BridgedToken::UsdA) => {
                is_any(observed, &[self.usd_treasury])
            }
            PolicyKind::BridgeTreasury(BridgedToken::Angle) => {
                is_any(observed, &[self.core_borrow])
            }
            PolicyKind::ListedUnder(treasury) => observed == treasury,
            PolicyKind::Role(role) => self.role_authorized(role, observed),
            PolicyKind::Forbidden => false,
        }
    }
}

/// One-shot form of [`Governance::authorized`] for callers holding a registry rather than a snapshot.
pub fn authorized(kind: PolicyKind, chain: ChainId, registry: &Registry, observed: Address) -> bool {
    Governance::from_registry(chain, registry).authorized(kind, observed)
}
