//! An in-memory world implementing every collaborator interface.
//!
//! The sandbox keeps one book per collaborator principal: ledgers with their
//! collateral types and positions, fungible tokens, borrower urns, redemption
//! pools and stablecoin joins. Any method can be made to fail on demand with
//! [`Sandbox::reject_method`] to exercise rollback paths.

use crate::gateway::{
    BorrowerUrn, CallError, CollateralTypeParams, Disbursement, Ledger, RedemptionPool,
    StablecoinJoin, TokenLedger, Transactional, UrnPosition,
};
use crate::numeric::{self, U256, RAY};
use candid::Principal;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Debug, Default)]
struct LedgerBook {
    live: bool,
    ilks: BTreeMap<String, CollateralTypeParams>,
    positions: BTreeMap<(String, Principal), UrnPosition>,
    /// Internal stablecoin balances, ray scaled.
    internal: BTreeMap<Principal, U256>,
}

#[derive(Clone, Debug, Default)]
struct TokenBook {
    decimals: u8,
    balances: BTreeMap<Principal, U256>,
    allowances: BTreeMap<(Principal, Principal), U256>,
}

#[derive(Clone, Debug)]
struct UrnBook {
    ledger: Principal,
    ilk: String,
    gem: Principal,
    stablecoin: Principal,
    operator: Principal,
}

#[derive(Clone, Debug)]
struct ScheduledPayout {
    epoch: u64,
    holder: Principal,
    currency: U256,
    shares: U256,
    claimed: bool,
}

#[derive(Clone, Debug)]
struct PoolBook {
    tranche: Principal,
    share_token: Principal,
    currency: Principal,
    orders: BTreeMap<Principal, U256>,
    payouts: Vec<ScheduledPayout>,
}

#[derive(Clone, Debug)]
struct JoinBook {
    ledger: Principal,
    stablecoin: Principal,
}

#[derive(Clone, Debug, Default)]
pub struct Sandbox {
    ledgers: BTreeMap<Principal, LedgerBook>,
    tokens: BTreeMap<Principal, TokenBook>,
    urns: BTreeMap<Principal, UrnBook>,
    pools: BTreeMap<Principal, PoolBook>,
    joins: BTreeMap<Principal, JoinBook>,
    rejected: BTreeSet<String>,
}

fn arithmetic(method: &str) -> impl Fn(numeric::ArithmeticError) -> CallError + '_ {
    move |e| CallError::new(method, e.to_string())
}

impl Sandbox {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Setup ---

    pub fn add_ledger(&mut self, ledger: Principal) {
        self.ledgers.insert(
            ledger,
            LedgerBook {
                live: true,
                ..Default::default()
            },
        );
    }

    /// Registers a collateral type with the given rate and debt ceiling.
    pub fn add_collateral_type(
        &mut self,
        ledger: Principal,
        ilk: &str,
        rate: U256,
        line: U256,
    ) -> Result<(), CallError> {
        let book = self.ledger_mut("add_collateral_type", ledger)?;
        book.ilks.insert(
            ilk.to_string(),
            CollateralTypeParams {
                total_debt: U256::ZERO,
                rate,
                spot: RAY,
                line,
                dust: U256::ZERO,
            },
        );
        Ok(())
    }

    pub fn add_token(&mut self, token: Principal, decimals: u8) {
        self.tokens.insert(
            token,
            TokenBook {
                decimals,
                ..Default::default()
            },
        );
    }

    pub fn add_urn(
        &mut self,
        urn: Principal,
        ledger: Principal,
        ilk: &str,
        gem: Principal,
        stablecoin: Principal,
        operator: Principal,
    ) {
        self.urns.insert(
            urn,
            UrnBook {
                ledger,
                ilk: ilk.to_string(),
                gem,
                stablecoin,
                operator,
            },
        );
    }

    pub fn add_pool(
        &mut self,
        pool: Principal,
        tranche: Principal,
        share_token: Principal,
        currency: Principal,
    ) {
        self.pools.insert(
            pool,
            PoolBook {
                tranche,
                share_token,
                currency,
                orders: BTreeMap::new(),
                payouts: Vec::new(),
            },
        );
    }

    pub fn add_join(&mut self, join: Principal, ledger: Principal, stablecoin: Principal) {
        self.joins.insert(join, JoinBook { ledger, stablecoin });
    }

    // --- Failure injection ---

    /// Makes every later call to `method` fail.
    pub fn reject_method(&mut self, method: &str) {
        self.rejected.insert(method.to_string());
    }

    pub fn accept_method(&mut self, method: &str) {
        self.rejected.remove(method);
    }

    fn check(&self, method: &str) -> Result<(), CallError> {
        if self.rejected.contains(method) {
            return Err(CallError::new(method, "rejected by the sandbox"));
        }
        Ok(())
    }

    // --- Ledger controls ---

    /// Triggers or lifts global settlement.
    pub fn set_ledger_live(&mut self, ledger: Principal, live: bool) -> Result<(), CallError> {
        self.ledger_mut("set_ledger_live", ledger)?.live = live;
        Ok(())
    }

    /// Accrues stability fees by replacing the rate of a collateral type.
    pub fn set_rate(&mut self, ledger: Principal, ilk: &str, rate: U256) -> Result<(), CallError> {
        self.ilk_mut("set_rate", ledger, ilk)?.rate = rate;
        Ok(())
    }

    /// Culls a position: drops its collateral and debt from the books, as a
    /// liquidation module would after the write-off.
    pub fn cull(&mut self, ledger: Principal, ilk: &str, urn: Principal) -> Result<(), CallError> {
        const METHOD: &str = "cull";
        let book = self.ledger_mut(METHOD, ledger)?;
        let position = book
            .positions
            .remove(&(ilk.to_string(), urn))
            .unwrap_or_default();
        let params = book
            .ilks
            .get_mut(ilk)
            .ok_or_else(|| CallError::new(METHOD, format!("unknown collateral type {}", ilk)))?;
        params.total_debt = numeric::sub(params.total_debt, position.art).map_err(arithmetic(METHOD))?;
        Ok(())
    }

    /// Internal ledger balance of `usr`, ray scaled.
    pub fn internal_balance(&self, ledger: Principal, usr: Principal) -> U256 {
        self.ledgers
            .get(&ledger)
            .and_then(|book| book.internal.get(&usr).copied())
            .unwrap_or(U256::ZERO)
    }

    // --- Token controls ---

    pub fn mint(&mut self, token: Principal, to: Principal, amount: U256) -> Result<(), CallError> {
        const METHOD: &str = "mint";
        let book = self.token_mut(METHOD, token)?;
        let balance = book.balances.entry(to).or_default();
        *balance = numeric::add(*balance, amount).map_err(arithmetic(METHOD))?;
        Ok(())
    }

    pub fn burn(&mut self, token: Principal, from: Principal, amount: U256) -> Result<(), CallError> {
        const METHOD: &str = "burn";
        let book = self.token_mut(METHOD, token)?;
        let balance = book.balances.entry(from).or_default();
        *balance = numeric::sub(*balance, amount)
            .map_err(|_| CallError::new(METHOD, "insufficient balance"))?;
        Ok(())
    }

    pub fn balance(&self, token: Principal, owner: Principal) -> U256 {
        self.tokens
            .get(&token)
            .and_then(|book| book.balances.get(&owner).copied())
            .unwrap_or(U256::ZERO)
    }

    pub fn allowance(&self, token: Principal, owner: Principal, spender: Principal) -> U256 {
        self.tokens
            .get(&token)
            .and_then(|book| book.allowances.get(&(owner, spender)).copied())
            .unwrap_or(U256::ZERO)
    }

    // --- Pool controls ---

    /// Schedules the redemption of `shares` held in the order of `holder` for
    /// `currency` at `epoch`. The currency is minted into the tranche.
    pub fn schedule_payout(
        &mut self,
        pool: Principal,
        epoch: u64,
        holder: Principal,
        currency: U256,
        shares: U256,
    ) -> Result<(), CallError> {
        const METHOD: &str = "schedule_payout";
        let book = self.pool_mut(METHOD, pool)?;
        let (tranche, token) = (book.tranche, book.currency);
        book.payouts.push(ScheduledPayout {
            epoch,
            holder,
            currency,
            shares,
            claimed: false,
        });
        self.mint(token, tranche, currency)
    }

    pub fn redeem_order_of(&self, pool: Principal, holder: Principal) -> U256 {
        self.pools
            .get(&pool)
            .and_then(|book| book.orders.get(&holder).copied())
            .unwrap_or(U256::ZERO)
    }

    // --- Lookups ---

    fn ledger(&self, method: &str, ledger: Principal) -> Result<&LedgerBook, CallError> {
        self.ledgers
            .get(&ledger)
            .ok_or_else(|| CallError::new(method, format!("unknown ledger {}", ledger)))
    }

    fn ledger_mut(&mut self, method: &str, ledger: Principal) -> Result<&mut LedgerBook, CallError> {
        self.ledgers
            .get_mut(&ledger)
            .ok_or_else(|| CallError::new(method, format!("unknown ledger {}", ledger)))
    }

    fn ilk_mut(
        &mut self,
        method: &str,
        ledger: Principal,
        ilk: &str,
    ) -> Result<&mut CollateralTypeParams, CallError> {
        self.ledger_mut(method, ledger)?
            .ilks
            .get_mut(ilk)
            .ok_or_else(|| CallError::new(method, format!("unknown collateral type {}", ilk)))
    }

    fn token(&self, method: &str, token: Principal) -> Result<&TokenBook, CallError> {
        self.tokens
            .get(&token)
            .ok_or_else(|| CallError::new(method, format!("unknown token {}", token)))
    }

    fn token_mut(&mut self, method: &str, token: Principal) -> Result<&mut TokenBook, CallError> {
        self.tokens
            .get_mut(&token)
            .ok_or_else(|| CallError::new(method, format!("unknown token {}", token)))
    }

    fn urn(&self, method: &str, urn: Principal, caller: Principal) -> Result<UrnBook, CallError> {
        let book = self
            .urns
            .get(&urn)
            .ok_or_else(|| CallError::new(method, format!("unknown urn {}", urn)))?;
        if book.operator != caller {
            return Err(CallError::new(method, "caller may not operate the urn"));
        }
        Ok(book.clone())
    }

    fn pool_mut(&mut self, method: &str, pool: Principal) -> Result<&mut PoolBook, CallError> {
        self.pools
            .get_mut(&pool)
            .ok_or_else(|| CallError::new(method, format!("unknown pool {}", pool)))
    }

    fn move_tokens(
        &mut self,
        method: &str,
        token: Principal,
        from: Principal,
        to: Principal,
        amount: U256,
    ) -> Result<(), CallError> {
        let book = self.token_mut(method, token)?;
        let from_balance = book.balances.get(&from).copied().unwrap_or(U256::ZERO);
        let from_balance = numeric::sub(from_balance, amount)
            .map_err(|_| CallError::new(method, "insufficient balance"))?;
        book.balances.insert(from, from_balance);
        let to_balance = book.balances.entry(to).or_default();
        *to_balance = numeric::add(*to_balance, amount).map_err(arithmetic(method))?;
        Ok(())
    }

    /// Adjusts a position by `dink` and `dart`, signed by the flags.
    fn frob(
        &mut self,
        method: &str,
        book: &UrnBook,
        urn: Principal,
        dink: (bool, U256),
        dart: (bool, U256),
    ) -> Result<(), CallError> {
        let ledger = self.ledger_mut(method, book.ledger)?;
        let params = ledger
            .ilks
            .get_mut(&book.ilk)
            .ok_or_else(|| CallError::new(method, format!("unknown collateral type {}", book.ilk)))?;
        let position = ledger
            .positions
            .entry((book.ilk.clone(), urn))
            .or_default();

        let (ink, art, total_debt) = (position.ink, position.art, params.total_debt);
        let shift = |value: U256, (up, delta): (bool, U256)| {
            if up {
                numeric::add(value, delta)
            } else {
                numeric::sub(value, delta)
            }
        };
        let ink = shift(ink, dink).map_err(arithmetic(method))?;
        let art = shift(art, dart).map_err(arithmetic(method))?;
        let total_debt = shift(total_debt, dart).map_err(arithmetic(method))?;

        if dart.0 && dart.1 > U256::ZERO {
            if !ledger.live {
                return Err(CallError::new(method, "ledger is not live"));
            }
            let total = numeric::mul(total_debt, params.rate).map_err(arithmetic(method))?;
            if total > params.line {
                return Err(CallError::new(method, "debt ceiling exceeded"));
            }
        }

        position.ink = ink;
        position.art = art;
        params.total_debt = total_debt;
        Ok(())
    }
}

impl Ledger for Sandbox {
    fn is_live(&self, ledger: Principal) -> Result<bool, CallError> {
        self.check("is_live")?;
        Ok(self.ledger("is_live", ledger)?.live)
    }

    fn urn_position(
        &self,
        ledger: Principal,
        ilk: &str,
        urn: Principal,
    ) -> Result<UrnPosition, CallError> {
        self.check("urn_position")?;
        Ok(self
            .ledger("urn_position", ledger)?
            .positions
            .get(&(ilk.to_string(), urn))
            .copied()
            .unwrap_or_default())
    }

    fn collateral_type(
        &self,
        ledger: Principal,
        ilk: &str,
    ) -> Result<CollateralTypeParams, CallError> {
        const METHOD: &str = "collateral_type";
        self.check(METHOD)?;
        self.ledger(METHOD, ledger)?
            .ilks
            .get(ilk)
            .copied()
            .ok_or_else(|| CallError::new(METHOD, format!("unknown collateral type {}", ilk)))
    }
}

impl TokenLedger for Sandbox {
    fn decimals(&self, token: Principal) -> Result<u8, CallError> {
        self.check("decimals")?;
        Ok(self.token("decimals", token)?.decimals)
    }

    fn balance_of(&self, token: Principal, owner: Principal) -> Result<U256, CallError> {
        self.check("balance_of")?;
        self.token("balance_of", token)?;
        Ok(self.balance(token, owner))
    }

    fn transfer(
        &mut self,
        token: Principal,
        from: Principal,
        to: Principal,
        amount: U256,
    ) -> Result<(), CallError> {
        self.check("transfer")?;
        self.move_tokens("transfer", token, from, to, amount)
    }

    fn transfer_from(
        &mut self,
        token: Principal,
        spender: Principal,
        from: Principal,
        to: Principal,
        amount: U256,
    ) -> Result<(), CallError> {
        const METHOD: &str = "transfer_from";
        self.check(METHOD)?;
        if spender != from {
            let book = self.token_mut(METHOD, token)?;
            let allowance = book.allowances.entry((from, spender)).or_default();
            // An allowance of `U256::MAX` never decreases.
            if *allowance != U256::MAX {
                *allowance = numeric::sub(*allowance, amount)
                    .map_err(|_| CallError::new(METHOD, "insufficient allowance"))?;
            }
        }
        self.move_tokens(METHOD, token, from, to, amount)
    }

    fn approve(
        &mut self,
        token: Principal,
        owner: Principal,
        spender: Principal,
        amount: U256,
    ) -> Result<(), CallError> {
        self.check("approve")?;
        self.token_mut("approve", token)?
            .allowances
            .insert((owner, spender), amount);
        Ok(())
    }
}

impl RedemptionPool for Sandbox {
    fn redeem_order(
        &mut self,
        pool: Principal,
        caller: Principal,
        amount: U256,
    ) -> Result<(), CallError> {
        const METHOD: &str = "redeem_order";
        self.check(METHOD)?;
        let book = self.pool_mut(METHOD, pool)?;
        let (tranche, share_token) = (book.tranche, book.share_token);
        let current = book.orders.get(&caller).copied().unwrap_or(U256::ZERO);
        book.orders.insert(caller, amount);
        if amount > current {
            self.transfer_from(share_token, tranche, caller, tranche, amount - current)
        } else {
            self.move_tokens(METHOD, share_token, tranche, caller, current - amount)
        }
    }

    fn disburse(
        &mut self,
        pool: Principal,
        caller: Principal,
        epoch: u64,
    ) -> Result<Disbursement, CallError> {
        const METHOD: &str = "disburse";
        self.check(METHOD)?;
        let book = self.pool_mut(METHOD, pool)?;
        let (mut currency, mut shares) = (U256::ZERO, U256::ZERO);
        for payout in book
            .payouts
            .iter_mut()
            .filter(|p| !p.claimed && p.holder == caller && p.epoch <= epoch)
        {
            currency = numeric::add(currency, payout.currency).map_err(arithmetic(METHOD))?;
            shares = numeric::add(shares, payout.shares).map_err(arithmetic(METHOD))?;
            payout.claimed = true;
        }
        let order = book.orders.entry(caller).or_default();
        *order = numeric::sub(*order, shares)
            .map_err(|_| CallError::new(METHOD, "payout exceeds the redeem order"))?;
        let remaining_redeem = *order;
        let (tranche, share_token, currency_token) = (book.tranche, book.share_token, book.currency);

        self.move_tokens(METHOD, currency_token, tranche, caller, currency)?;
        self.burn(share_token, tranche, shares)?;
        Ok(Disbursement {
            payout_currency: currency,
            payout_token: shares,
            remaining_supply: U256::ZERO,
            remaining_redeem,
        })
    }
}

impl BorrowerUrn for Sandbox {
    fn collateral_token(&self, urn: Principal) -> Result<Principal, CallError> {
        self.check("collateral_token")?;
        self.urns
            .get(&urn)
            .map(|book| book.gem)
            .ok_or_else(|| CallError::new("collateral_token", format!("unknown urn {}", urn)))
    }

    fn lock(&mut self, urn: Principal, caller: Principal, amount: U256) -> Result<(), CallError> {
        const METHOD: &str = "lock";
        self.check(METHOD)?;
        let book = self.urn(METHOD, urn, caller)?;
        self.transfer_from(book.gem, urn, caller, urn, amount)?;
        self.frob(METHOD, &book, urn, (true, amount), (true, U256::ZERO))
    }

    fn free(&mut self, urn: Principal, caller: Principal, amount: U256) -> Result<(), CallError> {
        const METHOD: &str = "free";
        self.check(METHOD)?;
        let book = self.urn(METHOD, urn, caller)?;
        let position = self.urn_position(book.ledger, &book.ilk, urn)?;
        if position.art > U256::ZERO {
            return Err(CallError::new(METHOD, "debt outstanding"));
        }
        self.frob(METHOD, &book, urn, (false, amount), (true, U256::ZERO))?;
        self.move_tokens(METHOD, book.gem, urn, caller, amount)
    }

    fn draw(&mut self, urn: Principal, caller: Principal, amount: U256) -> Result<(), CallError> {
        const METHOD: &str = "draw";
        self.check(METHOD)?;
        let book = self.urn(METHOD, urn, caller)?;
        let rate = self.collateral_type(book.ledger, &book.ilk)?.rate;
        let dart = numeric::mul(amount, RAY)
            .and_then(|rad| numeric::divup(rad, rate))
            .map_err(arithmetic(METHOD))?;
        self.frob(METHOD, &book, urn, (true, U256::ZERO), (true, dart))?;
        self.mint(book.stablecoin, caller, amount)
    }

    fn wipe(&mut self, urn: Principal, caller: Principal, amount: U256) -> Result<(), CallError> {
        const METHOD: &str = "wipe";
        self.check(METHOD)?;
        let book = self.urn(METHOD, urn, caller)?;
        let rate = self.collateral_type(book.ledger, &book.ilk)?.rate;
        if rate == U256::ZERO {
            return Err(CallError::new(METHOD, "collateral type has a zero rate"));
        }
        let dart = numeric::mul(amount, RAY).map_err(arithmetic(METHOD))? / rate;
        self.transfer_from(book.stablecoin, urn, caller, urn, amount)?;
        self.burn(book.stablecoin, urn, amount)?;
        self.frob(METHOD, &book, urn, (true, U256::ZERO), (false, dart))
    }

    fn quit(&mut self, urn: Principal, caller: Principal) -> Result<(), CallError> {
        const METHOD: &str = "quit";
        self.check(METHOD)?;
        let book = self.urn(METHOD, urn, caller)?;
        let position = self.urn_position(book.ledger, &book.ilk, urn)?;
        if position.art > U256::ZERO {
            return Err(CallError::new(METHOD, "debt outstanding"));
        }
        self.frob(METHOD, &book, urn, (false, position.ink), (true, U256::ZERO))?;
        self.move_tokens(METHOD, book.gem, urn, caller, position.ink)?;
        let leftover = self.balance(book.stablecoin, urn);
        self.move_tokens(METHOD, book.stablecoin, urn, caller, leftover)
    }
}

impl StablecoinJoin for Sandbox {
    fn join(
        &mut self,
        join: Principal,
        caller: Principal,
        usr: Principal,
        amount: U256,
    ) -> Result<(), CallError> {
        const METHOD: &str = "join";
        self.check(METHOD)?;
        let book = self
            .joins
            .get(&join)
            .cloned()
            .ok_or_else(|| CallError::new(METHOD, format!("unknown join {}", join)))?;
        self.transfer_from(book.stablecoin, join, caller, join, amount)?;
        self.burn(book.stablecoin, join, amount)?;
        let rad = numeric::mul(amount, RAY).map_err(arithmetic(METHOD))?;
        let ledger = self.ledger_mut(METHOD, book.ledger)?;
        let internal = ledger.internal.entry(usr).or_default();
        *internal = numeric::add(*internal, rad).map_err(arithmetic(METHOD))?;
        Ok(())
    }
}

impl Transactional for Sandbox {
    type Checkpoint = Sandbox;

    fn checkpoint(&self) -> Self::Checkpoint {
        self.clone()
    }

    fn rollback(&mut self, checkpoint: Self::Checkpoint) {
        *self = checkpoint;
    }
}
