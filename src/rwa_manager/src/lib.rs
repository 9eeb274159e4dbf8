use candid::{CandidType, Deserialize, Principal};
use ic_canister_log::log;
use serde::Serialize;
use std::fmt;

use crate::event::Event;
use crate::gateway::{CallError, Environment, Transactional};
use crate::logs::{DEBUG, INFO};
use crate::numeric::{ArithmeticError, U256, TOKEN_DECIMALS};
use crate::state::{Stage, State};
use crate::storage::EventLog;

pub mod access;
pub mod event;
pub mod gateway;
pub mod logs;
pub mod manager;
pub mod numeric;
pub mod sandbox;
pub mod state;
pub mod storage;

#[derive(CandidType, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitArg {
    /// Account the manager holds tokens and positions under.
    pub manager_id: Principal,
    /// Collateral type tag of the position on the ledger.
    pub ilk: String,
    /// First admin.
    pub deployer: Principal,
    /// Account allowed to run day-to-day operations.
    pub operator: Principal,
    pub ledger: Principal,
    pub stablecoin: Principal,
    pub stablecoin_join: Principal,
    /// Pool share token held as collateral.
    pub share_token: Principal,
    pub pool: Principal,
    /// Account the pool pulls shares into when a redeem order is placed.
    pub tranche: Principal,
    pub urn: Principal,
    /// Deficit sink credited by `recover`.
    pub vow: Principal,
}

/// Why a call was refused before it touched any balance.
#[derive(CandidType, Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum Precondition {
    NotAuthorized,
    NotOperator,
    NotSafeAndLive,
    NotSafe,
    NotSoftLiquidation,
    NotWrittenOff,
    NotLive,
    LedgerNotLive,
    CageNotAllowed,
    Retired,
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::NotAuthorized => "caller is not an admin",
            Self::NotOperator => "caller is not the operator",
            Self::NotSafeAndLive => "manager is not safe and live",
            Self::NotSafe => "soft liquidation already triggered",
            Self::NotSoftLiquidation => "manager is not in soft liquidation",
            Self::NotWrittenOff => "debt has not been written off",
            Self::NotLive => "manager is not live",
            Self::LedgerNotLive => "ledger is in global settlement",
            Self::CageNotAllowed => "cage is not allowed for this caller",
            Self::Retired => "manager has been caged or migrated",
        };
        write!(f, "{}", reason)
    }
}

#[derive(CandidType, Clone, Debug, PartialEq, Eq, Deserialize)]
pub enum ManagerError {
    PreconditionViolation(Precondition),
    ArithmeticOverflow,
    ArithmeticUnderflow,
    BoundsViolation { amount: String },
    UnrecognizedParameter(String),
    DecimalMismatch { token: Principal, decimals: u8 },
    GatewayRejected(CallError),
}

impl ManagerError {
    pub fn bounds(amount: U256) -> Self {
        Self::BoundsViolation {
            amount: amount.to_string(),
        }
    }
}

impl From<Precondition> for ManagerError {
    fn from(p: Precondition) -> Self {
        Self::PreconditionViolation(p)
    }
}

impl From<ArithmeticError> for ManagerError {
    fn from(e: ArithmeticError) -> Self {
        match e {
            ArithmeticError::Overflow => Self::ArithmeticOverflow,
            ArithmeticError::Underflow => Self::ArithmeticUnderflow,
        }
    }
}

impl From<CallError> for ManagerError {
    fn from(e: CallError) -> Self {
        Self::GatewayRejected(e)
    }
}

impl fmt::Display for ManagerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreconditionViolation(p) => write!(f, "precondition violated: {}", p),
            Self::ArithmeticOverflow => write!(f, "arithmetic overflow"),
            Self::ArithmeticUnderflow => write!(f, "arithmetic underflow"),
            Self::BoundsViolation { amount } => {
                write!(f, "amount {} exceeds the positive half range", amount)
            }
            Self::UnrecognizedParameter(what) => write!(f, "unrecognized parameter '{}'", what),
            Self::DecimalMismatch { token, decimals } => write!(
                f,
                "token {} reports {} decimals, expected {}",
                token, decimals, TOKEN_DECIMALS
            ),
            Self::GatewayRejected(e) => write!(f, "{}", e),
        }
    }
}

/// One state-changing request to the manager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    InitializePosition { amount: U256 },
    DepositCollateral { amount: U256 },
    WithdrawCollateral { amount: U256 },
    DrawDebt { amount: U256 },
    RepayDebt { amount: U256 },
    /// The amount is not used; the position is always exited in full.
    ReleaseCollateral { amount: U256 },
    Tell,
    Unwind { epoch: u64 },
    Sink,
    Recover { epoch: u64 },
    Cage,
    Migrate { dst: Principal },
    Rely { usr: Principal },
    Deny { usr: Principal },
    File { what: String, data: Principal },
    SetOperator { operator: Principal },
}

impl Call {
    pub fn name(&self) -> &'static str {
        match self {
            Call::InitializePosition { .. } => "initialize_position",
            Call::DepositCollateral { .. } => "deposit_collateral",
            Call::WithdrawCollateral { .. } => "withdraw_collateral",
            Call::DrawDebt { .. } => "draw_debt",
            Call::RepayDebt { .. } => "repay_debt",
            Call::ReleaseCollateral { .. } => "release_collateral",
            Call::Tell => "tell",
            Call::Unwind { .. } => "unwind",
            Call::Sink => "sink",
            Call::Recover { .. } => "recover",
            Call::Cage => "cage",
            Call::Migrate { .. } => "migrate",
            Call::Rely { .. } => "rely",
            Call::Deny { .. } => "deny",
            Call::File { .. } => "file",
            Call::SetOperator { .. } => "set_operator",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerStatus {
    pub stage: Stage,
    pub safe: bool,
    pub glad: bool,
    pub live: bool,
    #[serde(with = "numeric::decimal")]
    pub tab: U256,
    pub ilk: String,
    pub operator: Principal,
}

#[derive(CandidType, Deserialize)]
pub struct GetEventsArg {
    pub start: u64,
    pub length: u64,
}

#[cfg(feature = "self_check")]
fn ok_or_die(result: Result<(), String>) {
    if let Err(msg) = result {
        log!(INFO, "[self_check] {}", msg);
        panic!("{}", msg);
    }
}

/// The manager of a single position together with its audit trail.
pub struct RwaManager {
    state: State,
    log: EventLog,
}

impl RwaManager {
    /// Deploys a manager. Fails unless the share token reports 18 decimals.
    pub fn new<E: Environment>(env: &E, args: InitArg) -> Result<Self, ManagerError> {
        let decimals = env.decimals(args.share_token)?;
        if decimals != TOKEN_DECIMALS {
            return Err(ManagerError::DecimalMismatch {
                token: args.share_token,
                decimals,
            });
        }
        log!(INFO, "[init] initialized manager for {} with args: {:?}", args.ilk, args);
        let log = EventLog::new();
        log.append(&Event::Init(args.clone()));
        Ok(Self {
            state: State::from(args),
            log,
        })
    }

    /// Runs `call` on behalf of `caller` as one transaction: either every
    /// effect commits, or the manager and the environment are left untouched.
    pub fn execute<E>(&mut self, env: &mut E, caller: Principal, call: Call) -> Result<(), ManagerError>
    where
        E: Environment + Transactional,
    {
        let name = call.name();
        let checkpoint = env.checkpoint();
        let snapshot = self.state.clone();

        match manager::dispatch(&mut self.state, env, caller, call) {
            Ok(()) => {
                for event in self.state.take_journal() {
                    self.log.append(&event);
                }
                self.check_postcondition();
                Ok(())
            }
            Err(e) => {
                log!(DEBUG, "[{}] call from {} rejected: {}", name, caller, e);
                self.state = snapshot;
                env.rollback(checkpoint);
                Err(e)
            }
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn status(&self) -> ManagerStatus {
        ManagerStatus {
            stage: self.state.stage(),
            safe: self.state.safe,
            glad: self.state.glad,
            live: self.state.live,
            tab: self.state.tab,
            ilk: self.state.ilk.clone(),
            operator: self.state.operator,
        }
    }

    pub fn is_admin(&self, who: &Principal) -> bool {
        self.state.is_admin(who)
    }

    pub fn events(&self) -> impl Iterator<Item = Event> + '_ {
        self.log.events()
    }

    pub fn get_events(&self, arg: GetEventsArg) -> Vec<Event> {
        const MAX_EVENTS_PER_QUERY: u64 = 2000;
        self.events()
            .skip(arg.start as usize)
            .take(arg.length.min(MAX_EVENTS_PER_QUERY) as usize)
            .collect()
    }

    pub fn count_events(&self) -> u64 {
        self.log.len()
    }

    /// Events that moved tokens or debt, leaving out configuration changes.
    pub fn position_history(&self) -> Vec<Event> {
        self.events()
            .filter(|event| event.is_position_related())
            .collect()
    }

    fn check_postcondition(&self) {
        #[cfg(feature = "self_check")]
        ok_or_die(self.check_invariants());
    }

    /// Checks that the live state is consistent and matches a replay of the log.
    pub fn check_invariants(&self) -> Result<(), String> {
        self.state.check_invariants()?;
        let recovered = event::replay(self.events())
            .map_err(|e| format!("failed to replay the event log: {:?}", e))?;
        recovered.check_invariants()?;
        self.state.check_semantically_eq(&recovered)
    }
}
