// SPDX-License-Identifier: Apache-2.0
//! Organizations and accounts.
//!
//! Orgs own structures, splines, agents, and research state; each org links
//! to one balance account. Transfers are debit-then-credit and atomic: a
//! debit that would go negative fails with no state change. All mutations
//! happen through the operations here, in response to engine events or
//! explicit product-layer calls.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::fixed::Fixed64;
use crate::ident::{AccountId, IdAlloc, OrgId};
use crate::subsystem::{Subsystem, SubsystemId, ValidateError};
use crate::tlv::{ByteReader, ByteWriter, TlvError};
use crate::world::World;

const INSTANCE_VERSION: u32 = 1;

/// A balance account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Account {
    /// Stable id.
    pub id: AccountId,
    /// Balance; never negative.
    pub balance: Fixed64,
}

/// An organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Org {
    /// Stable id.
    pub id: OrgId,
    /// Optional weight/importance.
    pub priority: Fixed64,
    /// The org's account.
    pub account_id: AccountId,
}

/// Errors from org and account operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OrgError {
    /// Transfer amount must be strictly positive.
    #[error("transfer amount must be positive")]
    InvalidAmount,

    /// Account id does not resolve.
    #[error("no such account {0}")]
    NoSuchAccount(AccountId),

    /// Org id does not resolve.
    #[error("no such org {0}")]
    NoSuchOrg(OrgId),

    /// Debit side would go negative.
    #[error("insufficient funds in account {account}")]
    InsufficientFunds {
        /// The account that could not cover the debit.
        account: AccountId,
    },
}

/// Per-world org and account tables.
#[derive(Debug, Clone, Default)]
pub struct OrgState {
    pub(crate) accounts: BTreeMap<AccountId, Account>,
    pub(crate) orgs: BTreeMap<OrgId, Org>,
    pub(crate) account_ids: IdAlloc,
    pub(crate) org_ids: IdAlloc,
}

/// Creates an account with the given starting balance.
pub fn account_create(world: &mut World, initial_balance: Fixed64) -> AccountId {
    let id = AccountId(world.orgs.account_ids.alloc());
    world.orgs.accounts.insert(id, Account { id, balance: initial_balance });
    id
}

/// Account by id.
#[must_use]
pub fn account_get(world: &World, id: AccountId) -> Option<Account> {
    world.orgs.accounts.get(&id).copied()
}

/// Atomic transfer between two accounts.
///
/// `amount` must be positive; the debit side must cover it. On failure no
/// balance moves.
pub fn account_transfer(
    world: &mut World,
    from: AccountId,
    to: AccountId,
    amount: Fixed64,
) -> Result<(), OrgError> {
    transfer_state(&mut world.orgs, from, to, amount)
}

/// Transfer against the raw org tables, for tick paths under split borrows.
pub(crate) fn transfer_state(
    orgs: &mut OrgState,
    from: AccountId,
    to: AccountId,
    amount: Fixed64,
) -> Result<(), OrgError> {
    if amount <= Fixed64::ZERO {
        return Err(OrgError::InvalidAmount);
    }
    if !orgs.accounts.contains_key(&to) {
        return Err(OrgError::NoSuchAccount(to));
    }
    let Some(src) = orgs.accounts.get(&from) else {
        return Err(OrgError::NoSuchAccount(from));
    };
    if src.balance < amount {
        return Err(OrgError::InsufficientFunds { account: from });
    }
    if let Some(src) = orgs.accounts.get_mut(&from) {
        src.balance = src.balance.sub(amount);
    }
    if let Some(dst) = orgs.accounts.get_mut(&to) {
        dst.balance = dst.balance.add(amount);
    }
    Ok(())
}

/// Creates an org with a fresh account at the given balance and seeds its
/// research state from the catalog.
pub fn org_create(world: &mut World, initial_balance: Fixed64) -> OrgId {
    let account_id = account_create(world, initial_balance);
    let id = OrgId(world.orgs.org_ids.alloc());
    world.orgs.orgs.insert(id, Org { id, priority: Fixed64::ZERO, account_id });
    crate::research::org_init(world, id);
    crate::econ::org_init(world, id);
    id
}

/// Org by id.
#[must_use]
pub fn org_get(world: &World, id: OrgId) -> Option<Org> {
    world.orgs.orgs.get(&id).copied()
}

/// Updates an org record in place.
pub fn org_update(world: &mut World, org: Org) -> Result<(), OrgError> {
    if org.id.is_none() || !world.orgs.orgs.contains_key(&org.id) {
        return Err(OrgError::NoSuchOrg(org.id));
    }
    world.orgs.orgs.insert(org.id, org);
    Ok(())
}

/// Number of orgs.
#[must_use]
pub fn org_count(world: &World) -> usize {
    world.orgs.orgs.len()
}

/// Org by sorted index.
#[must_use]
pub fn org_get_by_index(world: &World, index: usize) -> Option<Org> {
    world.orgs.orgs.values().nth(index).copied()
}

/// The account of an org, if both resolve.
#[must_use]
pub fn org_account(world: &World, id: OrgId) -> Option<Account> {
    let org = org_get(world, id)?;
    account_get(world, org.account_id)
}

/// Organization subsystem entry.
pub struct OrganizationSubsystem;

impl Subsystem for OrganizationSubsystem {
    fn id(&self) -> SubsystemId {
        SubsystemId::Organization
    }

    fn name(&self) -> &'static str {
        "org"
    }

    fn init_instance(&self, world: &mut World) {
        world.orgs = OrgState::default();
    }

    fn save_instance(&self, world: &World) -> Vec<u8> {
        if world.orgs.accounts.is_empty() && world.orgs.orgs.is_empty() {
            return Vec::new();
        }
        let mut w = ByteWriter::versioned(INSTANCE_VERSION);
        w.u32(world.orgs.accounts.len() as u32);
        for acc in world.orgs.accounts.values() {
            w.u32(acc.id.raw());
            w.fixed64(acc.balance);
        }
        w.u32(world.orgs.orgs.len() as u32);
        for org in world.orgs.orgs.values() {
            w.u32(org.id.raw());
            w.fixed64(org.priority);
            w.u32(org.account_id.raw());
        }
        w.finish()
    }

    fn load_instance(&self, world: &mut World, bytes: &[u8]) -> Result<(), TlvError> {
        let mut r = ByteReader::new(bytes);
        r.version(INSTANCE_VERSION)?;
        world.orgs = OrgState::default();
        // Accounts restore before orgs, so org records always resolve.
        let account_count = r.u32()?;
        for _ in 0..account_count {
            let id = AccountId(r.u32()?);
            if id.is_none() {
                return Err(TlvError::BadHeader { field: "account_id", value: 0 });
            }
            let balance = r.fixed64()?;
            world.orgs.account_ids.observe(id.raw());
            world.orgs.accounts.insert(id, Account { id, balance });
        }
        let org_count = r.u32()?;
        for _ in 0..org_count {
            let id = OrgId(r.u32()?);
            if id.is_none() {
                return Err(TlvError::BadHeader { field: "org_id", value: 0 });
            }
            let priority = r.fixed64()?;
            let account_id = AccountId(r.u32()?);
            world.orgs.org_ids.observe(id.raw());
            world.orgs.orgs.insert(id, Org { id, priority, account_id });
        }
        Ok(())
    }

    fn validate(&self, world: &World) -> Result<(), ValidateError> {
        for acc in world.orgs.accounts.values() {
            if acc.balance.is_negative() {
                return Err(ValidateError {
                    subsystem: SubsystemId::Organization,
                    invariant: "account balances must stay non-negative",
                });
            }
        }
        for org in world.orgs.orgs.values() {
            if !world.orgs.accounts.contains_key(&org.account_id) {
                return Err(ValidateError {
                    subsystem: SubsystemId::Organization,
                    invariant: "every org must link to a live account",
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::content::ContentCatalog;

    fn world() -> World {
        World::new(1, ContentCatalog::new()).unwrap()
    }

    #[test]
    fn transfer_conserves_and_rejects_overdraft() {
        let mut w = world();
        let a = account_create(&mut w, Fixed64::from_int(10));
        let b = account_create(&mut w, Fixed64::from_int(0));
        account_transfer(&mut w, a, b, Fixed64::from_int(4)).unwrap();
        assert_eq!(account_get(&w, a).unwrap().balance, Fixed64::from_int(6));
        assert_eq!(account_get(&w, b).unwrap().balance, Fixed64::from_int(4));

        let err = account_transfer(&mut w, a, b, Fixed64::from_int(100));
        assert_eq!(err, Err(OrgError::InsufficientFunds { account: a }));
        assert_eq!(account_get(&w, a).unwrap().balance, Fixed64::from_int(6));
        assert_eq!(account_get(&w, b).unwrap().balance, Fixed64::from_int(4));
    }

    #[test]
    fn transfer_rejects_non_positive_amounts() {
        let mut w = world();
        let a = account_create(&mut w, Fixed64::from_int(10));
        let b = account_create(&mut w, Fixed64::from_int(10));
        assert_eq!(account_transfer(&mut w, a, b, Fixed64::ZERO), Err(OrgError::InvalidAmount));
        assert_eq!(
            account_transfer(&mut w, a, b, Fixed64::from_int(-1)),
            Err(OrgError::InvalidAmount)
        );
    }

    #[test]
    fn org_create_links_account() {
        let mut w = world();
        let org = org_create(&mut w, Fixed64::from_int(100));
        let acc = org_account(&w, org).unwrap();
        assert_eq!(acc.balance, Fixed64::from_int(100));
        assert!(w.validate().is_ok());
    }

    #[test]
    fn instance_blob_round_trips() {
        let mut w = world();
        let _ = org_create(&mut w, Fixed64::from_int(5));
        let _ = org_create(&mut w, Fixed64::from_int(7));
        let blob = OrganizationSubsystem.save_instance(&w);
        let mut w2 = world();
        OrganizationSubsystem.load_instance(&mut w2, &blob).unwrap();
        assert_eq!(org_count(&w2), 2);
        assert_eq!(w2.orgs.accounts, w.orgs.accounts);
        // Freshly allocated ids stay above the restored ones.
        let next = account_create(&mut w2, Fixed64::ZERO);
        assert!(next.raw() > 2);
    }
}
