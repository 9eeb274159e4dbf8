//! Interfaces of the collaborators the manager drives.
//!
//! Every call names the collaborator it targets by principal, the same way the
//! ledger helpers in a canister take the ledger canister id, so re-wiring a
//! collaborator through `file` redirects all later calls. Calls are
//! synchronous and their effects are visible to the next call immediately.

use crate::numeric::U256;
use candid::{CandidType, Deserialize, Principal};
use std::fmt;

/// Represents a failed call into a collaborator.
#[derive(CandidType, Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CallError {
    method: String,
    reason: String,
}

impl CallError {
    pub fn new(method: &str, reason: impl Into<String>) -> Self {
        Self {
            method: method.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns the name of the method that resulted in this error.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the failure reason.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "call to '{}' failed: {}", self.method, self.reason)
    }
}

/// Collateral locked and normalized debt of one position on the ledger.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UrnPosition {
    pub ink: U256,
    pub art: U256,
}

/// Ledger parameters of a collateral type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollateralTypeParams {
    /// Normalized debt across every position of the class.
    pub total_debt: U256,
    /// Accumulated stability rate, ray scaled.
    pub rate: U256,
    pub spot: U256,
    /// Debt ceiling, ray scaled.
    pub line: U256,
    pub dust: U256,
}

/// Result of claiming one epoch from the redemption pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Disbursement {
    pub payout_currency: U256,
    pub payout_token: U256,
    pub remaining_supply: U256,
    /// Shares still waiting to be redeemed.
    pub remaining_redeem: U256,
}

pub trait Ledger {
    /// False once global settlement has been triggered.
    fn is_live(&self, ledger: Principal) -> Result<bool, CallError>;

    fn urn_position(
        &self,
        ledger: Principal,
        ilk: &str,
        urn: Principal,
    ) -> Result<UrnPosition, CallError>;

    fn collateral_type(&self, ledger: Principal, ilk: &str)
        -> Result<CollateralTypeParams, CallError>;
}

pub trait TokenLedger {
    fn decimals(&self, token: Principal) -> Result<u8, CallError>;

    fn balance_of(&self, token: Principal, owner: Principal) -> Result<U256, CallError>;

    fn transfer(
        &mut self,
        token: Principal,
        from: Principal,
        to: Principal,
        amount: U256,
    ) -> Result<(), CallError>;

    fn transfer_from(
        &mut self,
        token: Principal,
        spender: Principal,
        from: Principal,
        to: Principal,
        amount: U256,
    ) -> Result<(), CallError>;

    fn approve(
        &mut self,
        token: Principal,
        owner: Principal,
        spender: Principal,
        amount: U256,
    ) -> Result<(), CallError>;
}

pub trait RedemptionPool {
    /// Replaces the caller's outstanding redeem order with `amount` shares.
    fn redeem_order(
        &mut self,
        pool: Principal,
        caller: Principal,
        amount: U256,
    ) -> Result<(), CallError>;

    /// Pays out whatever the pool owes the caller up to `epoch`.
    fn disburse(
        &mut self,
        pool: Principal,
        caller: Principal,
        epoch: u64,
    ) -> Result<Disbursement, CallError>;
}

pub trait BorrowerUrn {
    /// Token that `lock` pulls into the position.
    fn collateral_token(&self, urn: Principal) -> Result<Principal, CallError>;

    fn lock(&mut self, urn: Principal, caller: Principal, amount: U256) -> Result<(), CallError>;

    /// Partial exit. The manager never calls it: release always goes through `quit`.
    fn free(&mut self, urn: Principal, caller: Principal, amount: U256) -> Result<(), CallError>;

    /// Raises the position debt by `amount` and pays the stablecoin to the caller.
    fn draw(&mut self, urn: Principal, caller: Principal, amount: U256) -> Result<(), CallError>;

    /// Pulls `amount` stablecoin from the caller and burns it against the debt.
    fn wipe(&mut self, urn: Principal, caller: Principal, amount: U256) -> Result<(), CallError>;

    /// Fully exits the position, returning residual collateral to the caller.
    fn quit(&mut self, urn: Principal, caller: Principal) -> Result<(), CallError>;
}

pub trait StablecoinJoin {
    /// Pulls `amount` stablecoin from the caller into the ledger balance of `usr`.
    fn join(
        &mut self,
        join: Principal,
        caller: Principal,
        usr: Principal,
        amount: U256,
    ) -> Result<(), CallError>;
}

/// Everything the manager talks to.
pub trait Environment: Ledger + TokenLedger + RedemptionPool + BorrowerUrn + StablecoinJoin {}

impl<T> Environment for T where T: Ledger + TokenLedger + RedemptionPool + BorrowerUrn + StablecoinJoin {}

/// A host that can undo the effects of a failed call.
pub trait Transactional {
    type Checkpoint;

    fn checkpoint(&self) -> Self::Checkpoint;

    fn rollback(&mut self, checkpoint: Self::Checkpoint);
}
