//! Operations of the manager: the normal borrowing path, the two-stage
//! liquidation protocol and the administrative surface.
//!
//! Each function assumes the caller already passed the role check of
//! [`crate::access`] and performs its collaborator calls in a fixed order.
//! A failure anywhere aborts the whole call; `RwaManager::execute` undoes
//! whatever happened before it.

use crate::access::authorize;
use crate::event::{
    record_cage, record_deny, record_draw, record_exit, record_file, record_join, record_lock,
    record_migrate, record_recover, record_release, record_rely, record_set_operator,
    record_sink, record_tell, record_unwind, record_wipe,
};
use crate::gateway::Environment;
use crate::logs::{DEBUG, INFO};
use crate::numeric::{self, U256, RAY};
use crate::state::{FileParameter, State};
use crate::{Call, ManagerError, Precondition};
use candid::Principal;
use ic_canister_log::log;

pub fn dispatch<E: Environment>(
    state: &mut State,
    env: &mut E,
    caller: Principal,
    call: Call,
) -> Result<(), ManagerError> {
    authorize(state, caller, call.access())?;
    match call {
        Call::InitializePosition { amount } => initialize_position(state, env, amount),
        Call::DepositCollateral { amount } => deposit_collateral(state, env, caller, amount),
        Call::WithdrawCollateral { amount } => withdraw_collateral(state, env, caller, amount),
        Call::DrawDebt { amount } => draw_debt(state, env, caller, amount),
        Call::RepayDebt { amount } => repay_debt(state, env, caller, amount),
        Call::ReleaseCollateral { amount } => release_collateral(state, env, amount),
        Call::Tell => tell(state, env),
        Call::Unwind { epoch } => unwind(state, env, epoch),
        Call::Sink => sink(state, env),
        Call::Recover { epoch } => recover(state, env, epoch),
        Call::Cage => cage(state, env, caller),
        Call::Migrate { dst } => migrate(state, env, dst),
        Call::Rely { usr } => rely(state, usr),
        Call::Deny { usr } => deny(state, usr),
        Call::File { what, data } => file(state, &what, data),
        Call::SetOperator { operator } => set_operator(state, operator),
    }
}

fn ensure_safe_and_live(state: &State) -> Result<(), ManagerError> {
    if !(state.safe && state.live) {
        return Err(Precondition::NotSafeAndLive.into());
    }
    Ok(())
}

fn ensure_soft_liquidation(state: &State) -> Result<(), ManagerError> {
    if !(!state.safe && state.glad && state.live) {
        return Err(Precondition::NotSoftLiquidation.into());
    }
    Ok(())
}

/// Sends whatever stablecoin the manager holds to the operator.
fn sweep_to_operator<E: Environment>(state: &State, env: &mut E) -> Result<U256, ManagerError> {
    let balance = env.balance_of(state.stablecoin, state.manager_id)?;
    env.transfer(state.stablecoin, state.manager_id, state.operator, balance)?;
    Ok(balance)
}

// --- Position ---

/// Locks RWA tokens held by the manager into the position. The first
/// successful lock makes the manager live.
pub fn initialize_position<E: Environment>(
    state: &mut State,
    env: &mut E,
    amount: U256,
) -> Result<(), ManagerError> {
    if state.retired {
        return Err(Precondition::Retired.into());
    }
    if !env.is_live(state.ledger)? {
        return Err(Precondition::LedgerNotLive.into());
    }
    let rwa_token = env.collateral_token(state.urn)?;
    env.approve(rwa_token, state.manager_id, state.urn, amount)?;
    env.lock(state.urn, state.manager_id, amount)?;
    record_lock(state, amount);
    log!(INFO, "[initialize_position] locked {} of {} into urn {}", amount, rwa_token, state.urn);
    Ok(())
}

/// Exits the position in full. `_amount` is accepted for interface
/// compatibility only; partial release is not supported.
pub fn release_collateral<E: Environment>(
    state: &mut State,
    env: &mut E,
    _amount: U256,
) -> Result<(), ManagerError> {
    env.quit(state.urn, state.manager_id)?;
    record_release(state);
    log!(INFO, "[release_collateral] exited urn {}", state.urn);
    Ok(())
}

// --- Share tokens ---

pub fn deposit_collateral<E: Environment>(
    state: &mut State,
    env: &mut E,
    caller: Principal,
    amount: U256,
) -> Result<(), ManagerError> {
    ensure_safe_and_live(state)?;
    if !numeric::fits_signed(amount) {
        return Err(ManagerError::bounds(amount));
    }
    env.transfer_from(state.share_token, state.manager_id, caller, state.manager_id, amount)?;
    record_join(state, amount);
    log!(INFO, "[deposit_collateral] {} deposited {} shares", caller, amount);
    Ok(())
}

pub fn withdraw_collateral<E: Environment>(
    state: &mut State,
    env: &mut E,
    caller: Principal,
    amount: U256,
) -> Result<(), ManagerError> {
    ensure_safe_and_live(state)?;
    if !numeric::within_half_range(amount) {
        return Err(ManagerError::bounds(amount));
    }
    env.transfer(state.share_token, state.manager_id, caller, amount)?;
    record_exit(state, amount);
    log!(INFO, "[withdraw_collateral] {} withdrew {} shares", caller, amount);
    Ok(())
}

// --- Stablecoin ---

pub fn draw_debt<E: Environment>(
    state: &mut State,
    env: &mut E,
    caller: Principal,
    amount: U256,
) -> Result<(), ManagerError> {
    ensure_safe_and_live(state)?;
    env.draw(state.urn, state.manager_id, amount)?;
    env.transfer(state.stablecoin, state.manager_id, caller, amount)?;
    record_draw(state, amount);
    log!(INFO, "[draw_debt] drew {} for {}", amount, caller);
    Ok(())
}

pub fn repay_debt<E: Environment>(
    state: &mut State,
    env: &mut E,
    caller: Principal,
    amount: U256,
) -> Result<(), ManagerError> {
    ensure_safe_and_live(state)?;
    env.transfer_from(state.stablecoin, state.manager_id, caller, state.manager_id, amount)?;
    env.approve(state.stablecoin, state.manager_id, state.urn, amount)?;
    env.wipe(state.urn, state.manager_id, amount)?;
    record_wipe(state, amount);
    log!(INFO, "[repay_debt] {} repaid {}", caller, amount);
    Ok(())
}

// --- Liquidation ---

/// Triggers the soft liquidation: every share the manager holds is put up
/// for redemption at once.
pub fn tell<E: Environment>(state: &mut State, env: &mut E) -> Result<(), ManagerError> {
    if !state.safe {
        return Err(Precondition::NotSafe.into());
    }
    let ink = env.balance_of(state.share_token, state.manager_id)?;
    record_tell(state, ink);
    env.approve(state.share_token, state.manager_id, state.tranche, ink)?;
    env.redeem_order(state.pool, state.manager_id, ink)?;
    log!(INFO, "[tell] submitted a redeem order for {} shares", ink);
    Ok(())
}

/// Claims the redemption proceeds of `epoch`, repays as much debt as they
/// cover and hands the remainder to the operator.
pub fn unwind<E: Environment>(state: &mut State, env: &mut E, epoch: u64) -> Result<(), ManagerError> {
    ensure_soft_liquidation(state)?;

    let redeemed = env.disburse(state.pool, state.manager_id, epoch)?.payout_currency;
    let art = env.urn_position(state.ledger, &state.ilk, state.urn)?.art;
    let rate = env.collateral_type(state.ledger, &state.ilk)?.rate;
    let cdptab = numeric::mul(art, rate)?;
    let pay_back = numeric::min(redeemed, numeric::divup(cdptab, RAY)?);
    log!(
        DEBUG,
        "[unwind] epoch {}: redeemed {}, art {}, rate {}, pay back {}",
        epoch, redeemed, art, rate, pay_back
    );

    env.approve(state.stablecoin, state.manager_id, state.urn, pay_back)?;
    env.wipe(state.urn, state.manager_id, pay_back)?;
    let residual = sweep_to_operator(state, env)?;

    record_unwind(state, pay_back);
    log!(INFO, "[unwind] paid back {}, returned {} to the operator", pay_back, residual);
    Ok(())
}

/// Freezes the outstanding debt as the tab. Must run before the ledger
/// culls the position so the debt is read at the current rate.
pub fn sink<E: Environment>(state: &mut State, env: &mut E) -> Result<(), ManagerError> {
    ensure_soft_liquidation(state)?;
    let art = env.urn_position(state.ledger, &state.ilk, state.urn)?.art;
    if !numeric::within_half_range(art) {
        return Err(ManagerError::bounds(art));
    }
    let rate = env.collateral_type(state.ledger, &state.ilk)?.rate;
    let tab = numeric::mul(art, rate)?;
    record_sink(state, tab);
    log!(INFO, "[sink] wrote off a tab of {}", tab);
    Ok(())
}

/// Claims the proceeds of `epoch` after the write-off. Once the ledger has
/// no debt left for the collateral type, proceeds cover the deficit first.
pub fn recover<E: Environment>(state: &mut State, env: &mut E, epoch: u64) -> Result<(), ManagerError> {
    if state.glad {
        return Err(Precondition::NotWrittenOff.into());
    }

    let recovered = env.disburse(state.pool, state.manager_id, epoch)?.payout_currency;
    let mut pay_back = U256::ZERO;
    if env.collateral_type(state.ledger, &state.ilk)?.total_debt == U256::ZERO {
        pay_back = numeric::min(recovered, state.tab / RAY);
        env.approve(state.stablecoin, state.manager_id, state.stablecoin_join, pay_back)?;
        env.join(state.stablecoin_join, state.manager_id, state.vow, pay_back)?;
    }
    let residual = sweep_to_operator(state, env)?;

    record_recover(state, recovered, pay_back)?;
    log!(
        INFO,
        "[recover] epoch {}: recovered {}, paid {} to the deficit sink, returned {} to the operator, tab now {}",
        epoch, recovered, pay_back, residual, state.tab
    );
    Ok(())
}

pub fn cage<E: Environment>(state: &mut State, env: &mut E, caller: Principal) -> Result<(), ManagerError> {
    let allowed = !state.glad || state.is_admin(&caller) || !env.is_live(state.ledger)?;
    if !allowed {
        return Err(Precondition::CageNotAllowed.into());
    }
    record_cage(state);
    log!(INFO, "[cage] caged by {}", caller);
    Ok(())
}

// --- Administration ---

/// Hands unlimited allowances on the stablecoin and the share token to `dst`
/// and retires this manager.
pub fn migrate<E: Environment>(state: &mut State, env: &mut E, dst: Principal) -> Result<(), ManagerError> {
    env.approve(state.stablecoin, state.manager_id, dst, U256::MAX)?;
    env.approve(state.share_token, state.manager_id, dst, U256::MAX)?;
    record_migrate(state, dst);
    log!(INFO, "[migrate] migrated to {}", dst);
    Ok(())
}

pub fn rely(state: &mut State, usr: Principal) -> Result<(), ManagerError> {
    if !state.live {
        return Err(Precondition::NotLive.into());
    }
    record_rely(state, usr);
    log!(INFO, "[rely] {} is now an admin", usr);
    Ok(())
}

pub fn deny(state: &mut State, usr: Principal) -> Result<(), ManagerError> {
    if !state.live {
        return Err(Precondition::NotLive.into());
    }
    record_deny(state, usr);
    log!(INFO, "[deny] {} is no longer an admin", usr);
    Ok(())
}

pub fn file(state: &mut State, what: &str, data: Principal) -> Result<(), ManagerError> {
    let parameter = FileParameter::parse(what)?;
    record_file(state, parameter, what, data);
    log!(INFO, "[file] {} set to {}", what, data);
    Ok(())
}

pub fn set_operator(state: &mut State, operator: Principal) -> Result<(), ManagerError> {
    record_set_operator(state, operator);
    log!(INFO, "[set_operator] operator is now {}", operator);
    Ok(())
}
