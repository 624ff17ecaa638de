//! Attribute prober.
//!
//! A probe is one speculative read-only call. Most registry contracts implement only a few of the
//! getters below, so a failed read (revert, transport error, timeout, undecodable return data) is
//! an expected outcome and surfaces as [`Unreadable`], never as an error.

use crate::roles::Role;
use crate::utils::rpc::{compact_rpc_error_message, eth_call_with_timeout, HttpProvider};
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Vault managers are enumerated this many indices at a time.
pub const VAULT_MANAGER_BATCH_SIZE: u64 = 10;
const VAULT_MANAGER_MAX_ENTRIES: u64 = 1_000;

alloy::sol! {
    interface IRoleProbe {
        function owner() external view returns (address);
        function minter() external view returns (address);
        function treasury() external view returns (address);
        function coreBorrow() external view returns (address);
        function core() external view returns (address);
        function admin() external view returns (address);
        function future_admin() external view returns (address);
        function accessControlManager() external view returns (address);
        function canonicalToken() external view returns (address);
        function isMinter(address account) external view returns (bool);
        function isTrusted(address account) external view returns (bool);
        function trusted(address account) external view returns (uint256);
        function hasRole(bytes32 role, address account) external view returns (bool);
        function vaultManagerList(uint256 index) external view returns (address);
    }
}

/// Zero-argument getters returning a single principal address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Attribute {
    Owner,
    Minter,
    Treasury,
    CoreBorrow,
    Core,
    Admin,
    FutureAdmin,
    AccessControlManager,
    CanonicalToken,
}

impl Attribute {
    /// Getters swept across every registry contract.
    pub const SWEEP: [Attribute; 7] = [
        Self::Owner,
        Self::Minter,
        Self::Treasury,
        Self::CoreBorrow,
        Self::Core,
        Self::Admin,
        Self::FutureAdmin,
    ];

    /// Wording used in report lines.
    pub fn name(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Minter => "minter",
            Self::Treasury => "treasury",
            Self::CoreBorrow => "core borrow",
            Self::Core => "core",
            Self::Admin => "admin",
            Self::FutureAdmin => "future admin",
            Self::AccessControlManager => "access control manager",
            Self::CanonicalToken => "canonical token",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Closed catalogue of reads the audit may issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Probe {
    Get(Attribute),
    IsMinter(Address),
    IsTrusted(Address),
    /// Legacy `trusted(address) -> uint256` mapping; non-zero means trusted.
    Trusted(Address),
    HasRole(Role, Address),
    VaultManagerList(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeValue {
    Address(Address),
    Bool(bool),
    Uint(U256),
}

impl ProbeValue {
    pub fn as_address(self) -> Option<Address> {
        match self {
            Self::Address(address) => Some(address),
            _ => None,
        }
    }

    /// Membership answer: `true`, or a non-zero `trusted` counter.
    pub fn is_positive(self) -> bool {
        match self {
            Self::Bool(flag) => flag,
            Self::Uint(value) => !value.is_zero(),
            Self::Address(address) => address != Address::ZERO,
        }
    }
}

/// Marker for a probe that produced no usable answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unreadable;

pub type Reading = Result<ProbeValue, Unreadable>;

impl Probe {
    pub fn calldata(self) -> Bytes {
        use IRoleProbe as I;
        let raw = match self {
            Self::Get(Attribute::Owner) => I::ownerCall {}.abi_encode(),
            Self::Get(Attribute::Minter) => I::minterCall {}.abi_encode(),
            Self::Get(Attribute::Treasury) => I::treasuryCall {}.abi_encode(),
            Self::Get(Attribute::CoreBorrow) => I::coreBorrowCall {}.abi_encode(),
            Self::Get(Attribute::Core) => I::coreCall {}.abi_encode(),
            Self::Get(Attribute::Admin) => I::adminCall {}.abi_encode(),
            Self::Get(Attribute::FutureAdmin) => I::future_adminCall {}.abi_encode(),
            Self::Get(Attribute::AccessControlManager) => {
                I::accessControlManagerCall {}.abi_encode()
            }
            Self::Get(Attribute::CanonicalToken) => I::canonicalTokenCall {}.abi_encode(),
            Self::IsMinter(account) => I::isMinterCall { account }.abi_encode(),
            Self::IsTrusted(account) => I::isTrustedCall { account }.abi_encode(),
            Self::Trusted(account) => I::trustedCall { account }.abi_encode(),
            Self::HasRole(role, account) => I::hasRoleCall {
                role: role.id(),
                account,
            }
            .abi_encode(),
            Self::VaultManagerList(index) => I::vaultManagerListCall {
                index: U256::from(index),
            }
            .abi_encode(),
        };
        Bytes::from(raw)
    }

    /// Decode return data. Anything that does not match the expected shape is unreadable.
    pub fn decode(self, data: &[u8]) -> Reading {
        use IRoleProbe as I;
        let decoded = match self {
            Self::Get(Attribute::Owner) => I::ownerCall::abi_decode_returns(data, true)
                .map(|r| ProbeValue::Address(r._0)),
            Self::Get(Attribute::Minter) => I::minterCall::abi_decode_returns(data, true)
                .map(|r| ProbeValue::Address(r._0)),
            Self::Get(Attribute::Treasury) => I::treasuryCall::abi_decode_returns(data, true)
                .map(|r| ProbeValue::Address(r._0)),
            Self::Get(Attribute::CoreBorrow) => I::coreBorrowCall::abi_decode_returns(data, true)
                .map(|r| ProbeValue::Address(r._0)),
            Self::Get(Attribute::Core) => I::coreCall::abi_decode_returns(data, true)
                .map(|r| ProbeValue::Address(r._0)),
            Self::Get(Attribute::Admin) => I::adminCall::abi_decode_returns(data, true)
                .map(|r| ProbeValue::Address(r._0)),
            Self::Get(Attribute::FutureAdmin) => {
                I::future_adminCall::abi_decode_returns(data, true)
                    .map(|r| ProbeValue::Address(r._0))
            }
            Self::Get(Attribute::AccessControlManager) => {
                I::accessControlManagerCall::abi_decode_returns(data, true)
                    .map(|r| ProbeValue::Address(r._0))
            }
            Self::Get(Attribute::CanonicalToken) => {
                I::canonicalTokenCall::abi_decode_returns(data, true)
                    .map(|r| ProbeValue::Address(r._0))
            }
            Self::IsMinter(_) => {
                I::isMinterCall::abi_decode_returns(data, true).map(|r| ProbeValue::Bool(r._0))
            }
            Self::IsTrusted(_) => {
                I::isTrustedCall::abi_decode_returns(data, true).map(|r| ProbeValue::Bool(r._0))
            }
            Self::Trusted(_) => {
                I::trustedCall::abi_decode_returns(data, true).map(|r| ProbeValue::Uint(r._0))
            }
            Self::HasRole(..) => {
                I::hasRoleCall::abi_decode_returns(data, true).map(|r| ProbeValue::Bool(r._0))
            }
            Self::VaultManagerList(_) => I::vaultManagerListCall::abi_decode_returns(data, true)
                .map(|r| ProbeValue::Address(r._0)),
        };
        decoded.map_err(|_| Unreadable)
    }
}

/// Read-only view of chain state, keyed by `(contract, probe)`.
#[async_trait]
pub trait ContractReader: Send + Sync {
    async fn read(&self, target: Address, probe: Probe) -> Reading;
}

pub type SharedReader = Arc<dyn ContractReader>;

/// Read a single-principal getter. Non-address answers are unreadable.
pub async fn read_address(
    reader: &dyn ContractReader,
    target: Address,
    attribute: Attribute,
) -> Result<Address, Unreadable> {
    reader
        .read(target, Probe::Get(attribute))
        .await?
        .as_address()
        .ok_or(Unreadable)
}

/// Membership probes: `Ok(true)` only for a positive answer.
pub async fn holds(
    reader: &dyn ContractReader,
    target: Address,
    probe: Probe,
) -> Result<bool, Unreadable> {
    reader.read(target, probe).await.map(ProbeValue::is_positive)
}

/// `eth_call` backed reader with a per-probe timeout.
pub struct RpcReader {
    provider: HttpProvider,
    timeout_ms: u64,
}

impl RpcReader {
    pub fn new(provider: HttpProvider, timeout_ms: u64) -> Self {
        Self {
            provider,
            timeout_ms,
        }
    }
}

#[async_trait]
impl ContractReader for RpcReader {
    async fn read(&self, target: Address, probe: Probe) -> Reading {
        match eth_call_with_timeout(&self.provider, target, probe.calldata(), self.timeout_ms).await
        {
            Ok(raw) => {
                let reading = probe.decode(raw.as_ref());
                if reading.is_err() {
                    tracing::debug!(
                        "[PROBE] {:?} on {:#x}: undecodable {} byte return",
                        probe,
                        target,
                        raw.len()
                    );
                }
                reading
            }
            Err(err) => {
                tracing::debug!(
                    "[PROBE] {:?} on {:#x}: {}",
                    probe,
                    target,
                    compact_rpc_error_message(&err.to_string())
                );
                Err(Unreadable)
            }
        }
    }
}

/// Enumerate `vaultManagerList(i)` for increasing `i` until a read fails.
///
/// Any failure marks the end of the list; reads are issued in concurrent batches and only the
/// prefix before the first failure is kept.
pub async fn list_vault_managers(reader: SharedReader, treasury: Address) -> Vec<Address> {
    let mut managers = Vec::new();
    let mut start = 0u64;
    while start < VAULT_MANAGER_MAX_ENTRIES {
        let mut batch = JoinSet::new();
        for index in start..start + VAULT_MANAGER_BATCH_SIZE {
            let reader = Arc::clone(&reader);
            batch.spawn(async move {
                let value = reader
                    .read(treasury, Probe::VaultManagerList(index))
                    .await
                    .ok()
                    .and_then(ProbeValue::as_address);
                (index, value)
            });
        }

        let mut results = Vec::with_capacity(VAULT_MANAGER_BATCH_SIZE as usize);
        while let Some(joined) = batch.join_next().await {
            // A panicked read task counts as a failed read.
            results.push(joined.unwrap_or((u64::MAX, None)));
        }
        results.sort_by_key(|(index, _)| *index);

        let mut exhausted = false;
        for (_, value) in results {
            match value {
                Some(manager) => managers.push(manager),
                None => {
                    exhausted = true;
                    break;
                }
            }
        }
        if exhausted {
            break;
        }
        start += VAULT_MANAGER_BATCH_SIZE;
    }
    tracing::debug!(
        "[PROBE] Treasury {:#x} lists {} vault manager(s)",
        treasury,
        managers.len()
    );
    managers
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;
    use std::collections::HashMap;

    struct Fixture(HashMap<(Address, Probe), ProbeValue>);

    #[async_trait]
    impl ContractReader for Fixture {
        async fn read(&self, target: Address, probe: Probe) -> Reading {
            self.0.get(&(target, probe)).copied().ok_or(Unreadable)
        }
    }

    const TREASURY: Address = address!("00000000000000000000000000000000000000aa");

    fn word(address: Address) -> Vec<u8> {
        let mut out = vec![0u8; 12];
        out.extend_from_slice(address.as_slice());
        out
    }

    #[test]
    fn test_calldata_selectors() {
        assert_eq!(
            &Probe::Get(Attribute::Owner).calldata()[..],
            &[0x8d, 0xa5, 0xcb, 0x5b]
        );
        let has_role = Probe::HasRole(Role::Keeper, TREASURY).calldata();
        assert_eq!(&has_role[..4], &[0x91, 0xd1, 0x48, 0x54]);
        assert_eq!(has_role.len(), 4 + 64);
        assert_eq!(&has_role[4..36], Role::Keeper.id().as_slice());
    }

    #[test]
    fn test_decode_address_and_rejects_short_data() {
        let probe = Probe::Get(Attribute::Owner);
        assert_eq!(
            probe.decode(&word(TREASURY)),
            Ok(ProbeValue::Address(TREASURY))
        );
        assert_eq!(probe.decode(&[0u8; 4]), Err(Unreadable));
        assert_eq!(probe.decode(&[]), Err(Unreadable));
    }

    #[test]
    fn test_decode_bool_rejects_dirty_word() {
        let probe = Probe::HasRole(Role::Governor, TREASURY);
        let mut yes = vec![0u8; 32];
        yes[31] = 1;
        assert_eq!(probe.decode(&yes), Ok(ProbeValue::Bool(true)));
        let mut dirty = vec![0u8; 32];
        dirty[31] = 2;
        assert_eq!(probe.decode(&dirty), Err(Unreadable));
    }

    #[test]
    fn test_trusted_counter_is_positive_when_non_zero() {
        assert!(ProbeValue::Uint(U256::from(1)).is_positive());
        assert!(!ProbeValue::Uint(U256::ZERO).is_positive());
        assert!(!ProbeValue::Bool(false).is_positive());
    }

    #[tokio::test]
    async fn test_list_vault_managers_stops_at_first_failure() {
        let mut values = HashMap::new();
        let managers = (0..13u64)
            .map(|i| Address::with_last_byte(0x10 + i as u8))
            .collect::<Vec<_>>();
        for (i, manager) in managers.iter().enumerate() {
            values.insert(
                (TREASURY, Probe::VaultManagerList(i as u64)),
                ProbeValue::Address(*manager),
            );
        }
        // A stray entry past the gap must not be picked up.
        values.insert(
            (TREASURY, Probe::VaultManagerList(15)),
            ProbeValue::Address(Address::with_last_byte(0xff)),
        );
        let reader: SharedReader = Arc::new(Fixture(values));
        let listed = list_vault_managers(reader, TREASURY).await;
        assert_eq!(listed, managers);
    }

    #[tokio::test]
    async fn test_list_vault_managers_empty_when_getter_missing() {
        let reader: SharedReader = Arc::new(Fixture(HashMap::new()));
        assert!(list_vault_managers(reader, TREASURY).await.is_empty());
    }

    #[tokio::test]
    async fn test_read_address_and_holds_surface_unreadable() {
        let mut values = HashMap::new();
        values.insert(
            (TREASURY, Probe::Get(Attribute::Owner)),
            ProbeValue::Address(TREASURY),
        );
        let reader = Fixture(values);
        assert_eq!(
            read_address(&reader, TREASURY, Attribute::Owner).await,
            Ok(TREASURY)
        );
        assert_eq!(
            read_address(&reader, TREASURY, Attribute::Minter).await,
            Err(Unreadable)
        );
        assert_eq!(
            holds(&reader, TREASURY, Probe::IsTrusted(TREASURY)).await,
            Err(Unreadable)
        );
    }
}
