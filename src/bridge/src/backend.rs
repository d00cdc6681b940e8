//! Collaborators the bridge settles against: project accounting and permissions.

use crate::errors::BridgeError;
use ferry_core::{types::short_hex, Address, Balance, TokenId};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// The project's fund accounting on this ledger.
///
/// Implementations must report truthfully; the bridge re-checks
/// `current_surplus` around every credit and treats a mismatch as fatal.
pub trait AccountingBackend: Send + Sync {
    /// The project's fungible token, if one is configured.
    fn project_token(&self) -> Option<TokenId>;

    /// Burns `amount` project tokens held by `holder` and releases the matching
    /// share of `token` backing assets to the bridge.
    ///
    /// A redemption that would release less than `min_reclaimed` must fail
    /// before anything is burned.
    ///
    /// # Returns
    ///
    /// The amount of `token` released.
    fn redeem(&self, holder: &Address, amount: Balance, token: &TokenId, min_reclaimed: Balance) -> Result<Balance, BridgeError>;

    /// The amount of `token` that redeeming `amount` project tokens would release
    /// right now.
    fn reclaimable(&self, amount: Balance, token: &TokenId) -> Balance;

    /// Mints `amount` project tokens to `beneficiary`.
    fn mint(&self, beneficiary: &Address, amount: Balance) -> Result<(), BridgeError>;

    /// Adds `amount` of `token` to the project's balance.
    fn credit(&self, token: &TokenId, amount: Balance) -> Result<(), BridgeError>;

    /// The project's current surplus in `token`.
    fn current_surplus(&self, token: &TokenId) -> Balance;
}

/// Actions gated by the permission provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Permission {
    /// Create, change or disable a token mapping
    MapToken,
}

/// Decides whether a caller may act on behalf of a project.
pub trait PermissionProvider: Send + Sync {
    /// Returns true if `caller` holds `permission` for `project_id`.
    fn is_authorized(&self, caller: &Address, project_id: u64, permission: Permission) -> bool;
}

/// Grants every permission to a single controller address.
#[derive(Clone, Debug)]
pub struct OwnerPermissions {
    owner: Address,
}

impl OwnerPermissions {
    /// Creates a provider controlled by `owner`.
    pub fn new(owner: Address) -> Self {
        Self { owner }
    }
}

impl PermissionProvider for OwnerPermissions {
    fn is_authorized(&self, caller: &Address, _project_id: u64, _permission: Permission) -> bool {
        *caller == self.owner
    }
}

/// State behind [`MemoryAccounting`].
#[derive(Debug, Default)]
struct Books {
    project_token: Option<TokenId>,
    holders: HashMap<Address, Balance>,
    surplus: HashMap<TokenId, Balance>,
    total_supply: Balance,
}

/// In-memory accounting with a fixed redemption rate.
///
/// Redeeming `n` project tokens releases `n * rate_bps / 10_000` backing assets.
#[derive(Debug)]
pub struct MemoryAccounting {
    books: Mutex<Books>,
    rate_bps: u32,
}

impl MemoryAccounting {
    /// Creates accounting for `project_token` with the given redemption rate in
    /// basis points.
    pub fn new(project_token: Option<TokenId>, rate_bps: u32) -> Self {
        Self {
            books: Mutex::new(Books {
                project_token,
                ..Books::default()
            }),
            rate_bps,
        }
    }

    fn rate(&self, amount: Balance) -> Option<Balance> {
        amount
            .checked_mul(Balance::from(self.rate_bps))
            .map(|scaled| scaled / 10_000)
    }

    fn books(&self) -> MutexGuard<'_, Books> {
        // A poisoned lock still holds consistent books: every mutation below is a
        // single assignment.
        self.books.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Issues project tokens to a holder.
    pub fn issue(&self, holder: &Address, amount: Balance) {
        let mut books = self.books();
        *books.holders.entry(*holder).or_default() += amount;
        books.total_supply += amount;
    }

    /// Adds backing assets to the project's surplus without going through a bridge.
    pub fn fund(&self, token: &TokenId, amount: Balance) {
        *self.books().surplus.entry(*token).or_default() += amount;
    }

    /// Project tokens held by `holder`.
    pub fn balance_of(&self, holder: &Address) -> Balance {
        self.books().holders.get(holder).copied().unwrap_or_default()
    }

    /// Total project token supply.
    pub fn total_supply(&self) -> Balance {
        self.books().total_supply
    }
}

impl AccountingBackend for MemoryAccounting {
    fn project_token(&self) -> Option<TokenId> {
        self.books().project_token
    }

    fn redeem(&self, holder: &Address, amount: Balance, token: &TokenId, min_reclaimed: Balance) -> Result<Balance, BridgeError> {
        let mut books = self.books();

        let held = books.holders.get(holder).copied().unwrap_or_default();
        if held < amount {
            return Err(BridgeError::Backend(format!(
                "holder {} has {} project tokens, cannot redeem {}",
                short_hex(holder),
                held,
                amount
            )));
        }

        let reclaimed = self
            .rate(amount)
            .ok_or_else(|| BridgeError::Backend("redemption amount overflow".to_string()))?;
        if reclaimed < min_reclaimed {
            return Err(BridgeError::Validation(format!(
                "redemption would release {}, below the minimum of {}",
                reclaimed, min_reclaimed
            )));
        }

        let surplus = books.surplus.get(token).copied().unwrap_or_default();
        if surplus < reclaimed {
            return Err(BridgeError::Backend(format!(
                "surplus of {} is {}, cannot release {}",
                short_hex(token),
                surplus,
                reclaimed
            )));
        }

        books.holders.insert(*holder, held - amount);
        books.surplus.insert(*token, surplus - reclaimed);
        books.total_supply -= amount;

        debug!("Redeemed {} project tokens of {} for {}", amount, short_hex(holder), reclaimed);
        Ok(reclaimed)
    }

    fn reclaimable(&self, amount: Balance, token: &TokenId) -> Balance {
        let surplus = self.current_surplus(token);
        self.rate(amount).unwrap_or(Balance::MAX).min(surplus)
    }

    fn mint(&self, beneficiary: &Address, amount: Balance) -> Result<(), BridgeError> {
        let mut books = self.books();
        let supply = books
            .total_supply
            .checked_add(amount)
            .ok_or_else(|| BridgeError::Backend("project token supply overflow".to_string()))?;
        books.total_supply = supply;
        *books.holders.entry(*beneficiary).or_default() += amount;
        Ok(())
    }

    fn credit(&self, token: &TokenId, amount: Balance) -> Result<(), BridgeError> {
        let mut books = self.books();
        let entry = books.surplus.entry(*token).or_default();
        *entry = entry
            .checked_add(amount)
            .ok_or_else(|| BridgeError::Backend("surplus overflow".to_string()))?;
        Ok(())
    }

    fn current_surplus(&self, token: &TokenId) -> Balance {
        self.books().surplus.get(token).copied().unwrap_or_default()
    }
}
