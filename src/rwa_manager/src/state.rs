use crate::event::Event;
use crate::numeric::{self, U256, RAY};
use crate::{InitArg, ManagerError};
use candid::Principal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// Like assert_eq, but returns an error instead of panicking.
macro_rules! ensure_eq {
    ($lhs:expr, $rhs:expr, $msg:expr $(, $args:expr)* $(,)*) => {
        if $lhs != $rhs {
            return Err(format!("{} ({:?}) != {} ({:?}): {}",
                               std::stringify!($lhs), $lhs,
                               std::stringify!($rhs), $rhs,
                               format!($msg $(,$args)*)));
        }
    }
}

macro_rules! ensure {
    ($cond:expr, $msg:expr $(, $args:expr)* $(,)*) => {
        if !$cond {
            return Err(format!("Condition {} is false: {}",
                               std::stringify!($cond),
                               format!($msg $(,$args)*)));
        }
    }
}

/// Where the position is in its lifecycle, derived from the status flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    /// Deployed, nothing locked yet.
    Constructed,
    Operational,
    SoftLiquidation,
    WrittenOff,
    /// Caged or migrated. Terminal.
    Settled,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Constructed => write!(f, "Constructed"),
            Stage::Operational => write!(f, "Operational"),
            Stage::SoftLiquidation => write!(f, "Soft liquidation"),
            Stage::WrittenOff => write!(f, "Written off"),
            Stage::Settled => write!(f, "Settled"),
        }
    }
}

/// Collaborator wiring that admins can change with `file`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileParameter {
    Ledger,
    StablecoinJoin,
    Urn,
    Vow,
    Owner,
}

impl FileParameter {
    pub fn parse(what: &str) -> Result<Self, ManagerError> {
        match what {
            "ledger" => Ok(Self::Ledger),
            "stablecoin_join" => Ok(Self::StablecoinJoin),
            "urn" => Ok(Self::Urn),
            "vow" => Ok(Self::Vow),
            "owner" => Ok(Self::Owner),
            other => Err(ManagerError::UnrecognizedParameter(other.to_string())),
        }
    }
}

#[derive(Clone, Debug)]
pub struct State {
    pub manager_id: Principal,
    pub ilk: String,
    pub operator: Principal,
    pub admins: BTreeSet<Principal>,

    pub ledger: Principal,
    pub stablecoin: Principal,
    pub stablecoin_join: Principal,
    pub share_token: Principal,
    pub pool: Principal,
    pub tranche: Principal,
    pub urn: Principal,
    pub vow: Principal,

    /// Soft liquidation not triggered.
    pub safe: bool,
    /// Write-off not triggered.
    pub glad: bool,
    /// Position initialized and not caged or migrated.
    pub live: bool,
    /// Set by `cage` and `migrate`; `live` can never be restored afterwards.
    pub retired: bool,
    /// Written-off debt still owed, ray scaled.
    pub tab: U256,

    journal: Vec<Event>,
}

impl From<InitArg> for State {
    fn from(args: InitArg) -> Self {
        Self {
            manager_id: args.manager_id,
            ilk: args.ilk,
            operator: args.operator,
            admins: BTreeSet::from([args.deployer]),
            ledger: args.ledger,
            stablecoin: args.stablecoin,
            stablecoin_join: args.stablecoin_join,
            share_token: args.share_token,
            pool: args.pool,
            tranche: args.tranche,
            urn: args.urn,
            vow: args.vow,
            safe: true,
            glad: true,
            live: false,
            retired: false,
            tab: U256::ZERO,
            journal: Vec::new(),
        }
    }
}

impl State {
    pub fn is_admin(&self, who: &Principal) -> bool {
        self.admins.contains(who)
    }

    pub fn stage(&self) -> Stage {
        if self.retired {
            Stage::Settled
        } else if !self.glad {
            Stage::WrittenOff
        } else if !self.safe {
            Stage::SoftLiquidation
        } else if !self.live {
            Stage::Constructed
        } else {
            Stage::Operational
        }
    }

    pub(crate) fn push_event(&mut self, event: Event) {
        self.journal.push(event);
    }

    /// Drains the events produced by the current call.
    pub(crate) fn take_journal(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.journal)
    }

    pub fn rely(&mut self, usr: Principal) {
        self.admins.insert(usr);
    }

    pub fn deny(&mut self, usr: Principal) {
        self.admins.remove(&usr);
    }

    pub fn file(&mut self, what: FileParameter, data: Principal) {
        match what {
            FileParameter::Ledger => self.ledger = data,
            FileParameter::StablecoinJoin => self.stablecoin_join = data,
            FileParameter::Urn => self.urn = data,
            FileParameter::Vow => self.vow = data,
            FileParameter::Owner => self.operator = data,
        }
    }

    pub fn set_operator(&mut self, operator: Principal) {
        self.operator = operator;
    }

    pub fn mark_live(&mut self) {
        self.live = true;
    }

    pub fn trigger_soft_liquidation(&mut self) {
        self.safe = false;
    }

    pub fn write_off(&mut self, tab: U256) {
        self.tab = tab;
        self.glad = false;
    }

    /// Lowers the tab by a repayment expressed in stablecoin units.
    pub fn reduce_tab(&mut self, pay_back: U256) -> Result<(), ManagerError> {
        self.tab = numeric::sub(self.tab, numeric::mul(pay_back, RAY)?)?;
        Ok(())
    }

    pub fn retire(&mut self) {
        self.live = false;
        self.retired = true;
    }

    /// Checks whether the internal state of the manager matches the other state
    /// semantically (the state holds the same data, but maybe in a slightly
    /// different form).
    pub fn check_semantically_eq(&self, other: &Self) -> Result<(), String> {
        ensure_eq!(self.manager_id, other.manager_id, "manager_id does not match");
        ensure_eq!(self.ilk, other.ilk, "ilk does not match");
        ensure_eq!(self.operator, other.operator, "operator does not match");
        ensure_eq!(self.admins, other.admins, "admins do not match");
        ensure_eq!(self.ledger, other.ledger, "ledger does not match");
        ensure_eq!(self.stablecoin_join, other.stablecoin_join, "stablecoin_join does not match");
        ensure_eq!(self.urn, other.urn, "urn does not match");
        ensure_eq!(self.vow, other.vow, "vow does not match");
        ensure_eq!(self.safe, other.safe, "safe does not match");
        ensure_eq!(self.glad, other.glad, "glad does not match");
        ensure_eq!(self.live, other.live, "live does not match");
        ensure_eq!(self.retired, other.retired, "retired does not match");
        ensure_eq!(self.tab, other.tab, "tab does not match");
        Ok(())
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        ensure!(
            self.glad || !self.safe,
            "a written-off position must be in soft liquidation"
        );
        ensure!(
            !self.glad || self.tab == U256::ZERO,
            "tab must stay zero until the write-off, got {}",
            self.tab
        );
        ensure!(
            !self.retired || !self.live,
            "a retired manager cannot be live"
        );
        ensure!(
            self.journal.is_empty(),
            "{} events were left uncommitted",
            self.journal.len()
        );
        Ok(())
    }
}
