//! Per-account serialization and hold state.
//!
//! Transfers from the same sending account are decided one at a time, so a
//! BLOCK puts the account on hold before the next transfer from it is
//! scored. Transfers from different accounts never wait on each other.
//! Only accounts on hold or with a transfer in flight are tracked.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;

type Slots = DashMap<String, Arc<Mutex<AccountStatus>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    Active,
    Hold,
}

/// Exclusive access to one account's status for the duration of a decision
pub struct AccountPermit {
    account_id: String,
    accounts: Arc<Slots>,
    slot: Arc<Mutex<AccountStatus>>,
    guard: OwnedMutexGuard<AccountStatus>,
}

impl AccountPermit {
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn status(&self) -> AccountStatus {
        *self.guard
    }

    pub fn is_held(&self) -> bool {
        *self.guard == AccountStatus::Hold
    }

    /// Put the account on hold. Takes effect for every later permit.
    pub fn hold(&mut self) {
        if *self.guard != AccountStatus::Hold {
            info!(account_id = %self.account_id, "Account placed on hold");
        }
        *self.guard = AccountStatus::Hold;
    }
}

impl Drop for AccountPermit {
    fn drop(&mut self) {
        if *self.guard == AccountStatus::Hold {
            return;
        }
        // Untrack the account unless another transfer is waiting on it. The
        // map, `self.slot` and the guard account for three references.
        self.accounts.remove_if(&self.account_id, |_, slot| {
            Arc::ptr_eq(slot, &self.slot) && Arc::strong_count(slot) == 3
        });
    }
}

#[derive(Default)]
pub struct AccountGate {
    accounts: Arc<Slots>,
}

impl AccountGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `account_id`.
    pub async fn acquire(&self, account_id: &str) -> AccountPermit {
        // clone the Arc out so the shard lock is released before awaiting
        let slot = self
            .accounts
            .entry(account_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(AccountStatus::Active)))
            .clone();

        AccountPermit {
            account_id: account_id.to_string(),
            accounts: self.accounts.clone(),
            guard: slot.clone().lock_owned().await,
            slot,
        }
    }

    /// Current status without waiting. Untracked accounts are active;
    /// `None` while a transfer from the account is in flight.
    pub fn status(&self, account_id: &str) -> Option<AccountStatus> {
        let slot = match self.accounts.get(account_id) {
            Some(entry) => entry.value().clone(),
            None => return Some(AccountStatus::Active),
        };
        let status = slot.try_lock().ok().map(|guard| *guard);
        status
    }

    pub fn held_count(&self) -> usize {
        self.accounts
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .try_lock()
                    .map(|guard| *guard == AccountStatus::Hold)
                    .unwrap_or(false)
            })
            .count()
    }

    /// Number of tracked accounts
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
