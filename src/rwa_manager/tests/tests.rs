use assert_matches::assert_matches;
use candid::Principal;
use proptest::prelude::*;
use rwa_manager::event::Event;
use rwa_manager::gateway::Ledger;
use rwa_manager::numeric::{HALF_RANGE, RAY, U256, WAD};
use rwa_manager::sandbox::Sandbox;
use rwa_manager::state::Stage;
use rwa_manager::{Call, GetEventsArg, ManagerError, Precondition, RwaManager};

mod fixtures {
    use super::*;
    use rwa_manager::gateway::TokenLedger;
    use rwa_manager::InitArg;

    pub const ILK: &str = "RWA002-A";

    fn principal(id: u8) -> Principal {
        Principal::from_slice(&[id; 4])
    }

    pub fn manager_id() -> Principal {
        principal(1)
    }
    pub fn deployer() -> Principal {
        principal(2)
    }
    pub fn operator() -> Principal {
        principal(3)
    }
    pub fn ledger() -> Principal {
        principal(4)
    }
    pub fn dai() -> Principal {
        principal(5)
    }
    pub fn dai_join() -> Principal {
        principal(6)
    }
    pub fn drop_token() -> Principal {
        principal(7)
    }
    pub fn pool() -> Principal {
        principal(8)
    }
    pub fn tranche() -> Principal {
        principal(9)
    }
    pub fn urn() -> Principal {
        principal(10)
    }
    pub fn vow() -> Principal {
        principal(11)
    }
    pub fn rwa_token() -> Principal {
        principal(12)
    }
    pub fn stranger() -> Principal {
        principal(13)
    }

    pub fn wad(x: u128) -> U256 {
        U256::new(x) * WAD
    }

    pub fn init_arg() -> InitArg {
        InitArg {
            manager_id: manager_id(),
            ilk: ILK.to_string(),
            deployer: deployer(),
            operator: operator(),
            ledger: ledger(),
            stablecoin: dai(),
            stablecoin_join: dai_join(),
            share_token: drop_token(),
            pool: pool(),
            tranche: tranche(),
            urn: urn(),
            vow: vow(),
        }
    }

    /// A world with one collateral type at rate 1, the operator holding
    /// 1000 share tokens and the manager holding one RWA token.
    pub fn sandbox_with_share_decimals(decimals: u8) -> Sandbox {
        let mut sandbox = Sandbox::new();
        sandbox.add_ledger(ledger());
        sandbox
            .add_collateral_type(ledger(), ILK, RAY, wad(10_000) * RAY)
            .unwrap();
        sandbox.add_token(rwa_token(), 18);
        sandbox.add_token(dai(), 18);
        sandbox.add_token(drop_token(), decimals);
        sandbox.add_urn(urn(), ledger(), ILK, rwa_token(), dai(), manager_id());
        sandbox.add_pool(pool(), tranche(), drop_token(), dai());
        sandbox.add_join(dai_join(), ledger(), dai());

        sandbox.mint(rwa_token(), manager_id(), WAD).unwrap();
        sandbox.mint(drop_token(), operator(), wad(1_000)).unwrap();
        sandbox
            .approve(drop_token(), operator(), manager_id(), U256::MAX)
            .unwrap();
        sandbox
            .approve(dai(), operator(), manager_id(), U256::MAX)
            .unwrap();
        sandbox
    }

    pub fn constructed() -> (Sandbox, RwaManager) {
        let sandbox = sandbox_with_share_decimals(18);
        let manager = RwaManager::new(&sandbox, init_arg()).expect("failed to deploy the manager");
        (sandbox, manager)
    }

    pub fn operational() -> (Sandbox, RwaManager) {
        let (mut sandbox, mut manager) = constructed();
        manager
            .execute(&mut sandbox, operator(), Call::InitializePosition { amount: WAD })
            .unwrap();
        (sandbox, manager)
    }

    /// 100 shares deposited and 100 stablecoin drawn.
    pub fn borrowed() -> (Sandbox, RwaManager) {
        let (mut sandbox, mut manager) = operational();
        manager
            .execute(&mut sandbox, operator(), Call::DepositCollateral { amount: wad(100) })
            .unwrap();
        manager
            .execute(&mut sandbox, operator(), Call::DrawDebt { amount: wad(100) })
            .unwrap();
        (sandbox, manager)
    }

    pub fn told() -> (Sandbox, RwaManager) {
        let (mut sandbox, mut manager) = borrowed();
        manager.execute(&mut sandbox, deployer(), Call::Tell).unwrap();
        (sandbox, manager)
    }

    pub fn art(sandbox: &Sandbox) -> U256 {
        sandbox.urn_position(ledger(), ILK, urn()).unwrap().art
    }
}

use fixtures::*;

fn violation(precondition: Precondition) -> Result<(), ManagerError> {
    Err(ManagerError::PreconditionViolation(precondition))
}

fn last_event(manager: &RwaManager) -> Event {
    manager.events().last().expect("the log is never empty")
}

#[test]
fn should_reject_share_token_with_wrong_decimals() {
    let sandbox = sandbox_with_share_decimals(6);
    assert_matches!(
        RwaManager::new(&sandbox, init_arg()).err(),
        Some(ManagerError::DecimalMismatch { decimals: 6, .. })
    );
}

#[test]
fn should_start_constructed_with_deployer_as_admin() {
    let (_, manager) = constructed();
    let status = manager.status();
    assert_eq!(status.stage, Stage::Constructed);
    assert!(status.safe && status.glad && !status.live);
    assert_eq!(status.tab, U256::ZERO);
    assert!(manager.is_admin(&deployer()));
    assert!(!manager.is_admin(&operator()));
    assert_eq!(manager.count_events(), 1);
}

#[test]
fn should_lock_rwa_token_and_go_live() {
    let (sandbox, manager) = operational();
    assert_eq!(manager.status().stage, Stage::Operational);
    assert_eq!(sandbox.balance(rwa_token(), manager_id()), U256::ZERO);
    assert_eq!(sandbox.balance(rwa_token(), urn()), WAD);
    assert_eq!(sandbox.urn_position(ledger(), ILK, urn()).unwrap().ink, WAD);
    assert_eq!(last_event(&manager), Event::Lock { wad: WAD });
}

#[test]
fn should_refuse_initialization_during_global_settlement() {
    let (mut sandbox, mut manager) = constructed();
    sandbox.set_ledger_live(ledger(), false).unwrap();
    assert_eq!(
        manager.execute(&mut sandbox, operator(), Call::InitializePosition { amount: WAD }),
        violation(Precondition::LedgerNotLive)
    );
    assert!(!manager.status().live);
}

#[test]
fn should_only_accept_operator_for_position_calls() {
    let (mut sandbox, mut manager) = operational();
    for caller in [deployer(), stranger()] {
        assert_eq!(
            manager.execute(&mut sandbox, caller, Call::DrawDebt { amount: WAD }),
            violation(Precondition::NotOperator)
        );
    }
}

#[test]
fn should_move_exact_share_amounts() {
    let (mut sandbox, mut manager) = operational();
    manager
        .execute(&mut sandbox, operator(), Call::DepositCollateral { amount: wad(250) })
        .unwrap();
    assert_eq!(sandbox.balance(drop_token(), manager_id()), wad(250));
    assert_eq!(sandbox.balance(drop_token(), operator()), wad(750));

    manager
        .execute(&mut sandbox, operator(), Call::WithdrawCollateral { amount: wad(50) })
        .unwrap();
    assert_eq!(sandbox.balance(drop_token(), manager_id()), wad(200));
    assert_eq!(sandbox.balance(drop_token(), operator()), wad(800));
    assert_eq!(last_event(&manager), Event::Exit { wad: wad(50) });
}

#[test]
fn should_reject_amounts_outside_half_range() {
    let (mut sandbox, mut manager) = operational();
    assert_matches!(
        manager.execute(&mut sandbox, operator(), Call::DepositCollateral { amount: HALF_RANGE }),
        Err(ManagerError::BoundsViolation { .. })
    );
    assert_matches!(
        manager.execute(
            &mut sandbox,
            operator(),
            Call::WithdrawCollateral { amount: HALF_RANGE + U256::ONE }
        ),
        Err(ManagerError::BoundsViolation { .. })
    );
    // Exactly half the range passes the bound and fails on the balance instead.
    assert_matches!(
        manager.execute(&mut sandbox, operator(), Call::WithdrawCollateral { amount: HALF_RANGE }),
        Err(ManagerError::GatewayRejected(e)) if e.method() == "transfer"
    );
}

#[test]
fn should_draw_and_repay_debt() {
    let (mut sandbox, mut manager) = borrowed();
    assert_eq!(sandbox.balance(dai(), operator()), wad(100));
    assert_eq!(art(&sandbox), wad(100));

    manager
        .execute(&mut sandbox, operator(), Call::RepayDebt { amount: wad(40) })
        .unwrap();
    assert_eq!(sandbox.balance(dai(), operator()), wad(60));
    assert_eq!(art(&sandbox), wad(60));

    manager
        .execute(&mut sandbox, operator(), Call::RepayDebt { amount: wad(60) })
        .unwrap();
    assert_eq!(art(&sandbox), U256::ZERO);
    assert_eq!(sandbox.balance(dai(), manager_id()), U256::ZERO);
    assert_eq!(manager.check_invariants(), Ok(()));
}

#[test]
fn should_release_whole_position_regardless_of_amount() {
    let (mut sandbox, mut manager) = borrowed();
    manager
        .execute(&mut sandbox, operator(), Call::RepayDebt { amount: wad(100) })
        .unwrap();
    manager
        .execute(&mut sandbox, operator(), Call::ReleaseCollateral { amount: U256::ONE })
        .unwrap();
    assert_eq!(sandbox.balance(rwa_token(), manager_id()), WAD);
    assert_eq!(sandbox.urn_position(ledger(), ILK, urn()).unwrap().ink, U256::ZERO);
    assert_eq!(last_event(&manager), Event::Release);
}

#[test]
fn should_not_release_with_debt_outstanding() {
    let (mut sandbox, mut manager) = borrowed();
    let events_before = manager.count_events();
    assert_matches!(
        manager.execute(&mut sandbox, operator(), Call::ReleaseCollateral { amount: WAD }),
        Err(ManagerError::GatewayRejected(e)) if e.method() == "quit"
    );
    assert_eq!(manager.count_events(), events_before);
}

#[test]
fn should_roll_back_draw_above_ceiling() {
    let (mut sandbox, mut manager) = operational();
    let before = sandbox.clone();
    assert_matches!(
        manager.execute(&mut sandbox, operator(), Call::DrawDebt { amount: wad(10_001) }),
        Err(ManagerError::GatewayRejected(_))
    );
    assert_eq!(sandbox.balance(dai(), operator()), before.balance(dai(), operator()));
    assert_eq!(art(&sandbox), U256::ZERO);
}

#[test]
fn should_put_every_share_up_for_redemption_on_tell() {
    let (sandbox, manager) = told();
    assert_eq!(manager.status().stage, Stage::SoftLiquidation);
    assert_eq!(sandbox.balance(drop_token(), manager_id()), U256::ZERO);
    assert_eq!(sandbox.balance(drop_token(), tranche()), wad(100));
    assert_eq!(sandbox.redeem_order_of(pool(), manager_id()), wad(100));
    assert_eq!(last_event(&manager), Event::Tell { ink: wad(100) });
    assert!(rwa_manager::logs::export_info()
        .iter()
        .any(|message| message.starts_with("[tell]")));
}

#[test]
fn should_restrict_tell_to_admins() {
    let (mut sandbox, mut manager) = borrowed();
    assert_eq!(
        manager.execute(&mut sandbox, operator(), Call::Tell),
        violation(Precondition::NotAuthorized)
    );
}

#[test]
fn should_block_normal_operations_after_tell() {
    let (mut sandbox, mut manager) = told();
    for call in [
        Call::DepositCollateral { amount: WAD },
        Call::WithdrawCollateral { amount: WAD },
        Call::DrawDebt { amount: WAD },
        Call::RepayDebt { amount: WAD },
    ] {
        assert_eq!(
            manager.execute(&mut sandbox, operator(), call),
            violation(Precondition::NotSafeAndLive)
        );
    }
    assert_eq!(
        manager.execute(&mut sandbox, deployer(), Call::Tell),
        violation(Precondition::NotSafe)
    );
}

#[test]
fn should_wipe_all_debt_when_proceeds_cover_it() {
    let (mut sandbox, mut manager) = told();
    sandbox
        .schedule_payout(pool(), 1, manager_id(), wad(100), wad(100))
        .unwrap();

    manager
        .execute(&mut sandbox, stranger(), Call::Unwind { epoch: 1 })
        .unwrap();

    assert_eq!(art(&sandbox), U256::ZERO);
    assert_eq!(sandbox.balance(dai(), operator()), wad(100));
    assert_eq!(sandbox.balance(dai(), manager_id()), U256::ZERO);
    assert_eq!(last_event(&manager), Event::Unwind { pay_back: wad(100) });
    assert_eq!(manager.check_invariants(), Ok(()));
}

#[test]
fn should_unwind_across_several_epochs() {
    let (mut sandbox, mut manager) = told();
    sandbox
        .schedule_payout(pool(), 1, manager_id(), wad(30), wad(30))
        .unwrap();
    sandbox
        .schedule_payout(pool(), 2, manager_id(), wad(90), wad(70))
        .unwrap();

    manager
        .execute(&mut sandbox, stranger(), Call::Unwind { epoch: 1 })
        .unwrap();
    assert_eq!(art(&sandbox), wad(70));
    assert_eq!(sandbox.balance(dai(), operator()), wad(100));

    manager
        .execute(&mut sandbox, stranger(), Call::Unwind { epoch: 2 })
        .unwrap();
    assert_eq!(art(&sandbox), U256::ZERO);
    // Only the 20 above the remaining debt reaches the operator.
    assert_eq!(sandbox.balance(dai(), operator()), wad(120));

    manager
        .execute(&mut sandbox, stranger(), Call::Unwind { epoch: 3 })
        .unwrap();
    assert_eq!(art(&sandbox), U256::ZERO);
    assert_eq!(sandbox.balance(dai(), operator()), wad(120));
    assert_eq!(sandbox.balance(dai(), manager_id()), U256::ZERO);

    let pay_backs: Vec<Event> = manager
        .events()
        .filter(|e| matches!(e, Event::Unwind { .. }))
        .collect();
    assert_eq!(
        pay_backs,
        vec![
            Event::Unwind { pay_back: wad(30) },
            Event::Unwind { pay_back: wad(70) },
            Event::Unwind { pay_back: U256::ZERO },
        ]
    );
    assert_eq!(manager.check_invariants(), Ok(()));
}

#[test]
fn should_refuse_to_sink_debt_beyond_half_range() {
    let (mut sandbox, mut manager) = operational();
    // Rate of one unit makes every drawn stablecoin worth RAY units of debt.
    sandbox
        .add_collateral_type(ledger(), ILK, U256::ONE, U256::MAX)
        .unwrap();
    manager
        .execute(
            &mut sandbox,
            operator(),
            Call::DrawDebt {
                amount: HALF_RANGE / RAY + U256::new(10),
            },
        )
        .unwrap();
    assert!(art(&sandbox) > HALF_RANGE);
    manager.execute(&mut sandbox, deployer(), Call::Tell).unwrap();

    assert_matches!(
        manager.execute(&mut sandbox, deployer(), Call::Sink),
        Err(ManagerError::BoundsViolation { .. })
    );
    let status = manager.status();
    assert_eq!(status.tab, U256::ZERO);
    assert!(status.glad);
    assert_eq!(status.stage, Stage::SoftLiquidation);
}

#[test]
fn should_list_only_position_events_in_history() {
    let (mut sandbox, mut manager) = borrowed();
    manager
        .execute(&mut sandbox, deployer(), Call::Rely { usr: stranger() })
        .unwrap();
    manager
        .execute(&mut sandbox, operator(), Call::RepayDebt { amount: wad(10) })
        .unwrap();

    assert_eq!(
        manager.position_history(),
        vec![
            Event::Lock { wad: WAD },
            Event::Join { wad: wad(100) },
            Event::Draw { wad: wad(100) },
            Event::Wipe { wad: wad(10) },
        ]
    );
    assert_eq!(manager.count_events(), 6);
}

#[test]
fn should_never_overpay_debt_with_accrued_fees() {
    let (mut sandbox, mut manager) = told();
    sandbox
        .set_rate(ledger(), ILK, RAY + RAY / U256::new(10))
        .unwrap();
    sandbox
        .schedule_payout(pool(), 1, manager_id(), wad(200), wad(100))
        .unwrap();

    manager
        .execute(&mut sandbox, stranger(), Call::Unwind { epoch: 1 })
        .unwrap();

    assert_eq!(art(&sandbox), U256::ZERO);
    assert_eq!(last_event(&manager), Event::Unwind { pay_back: wad(110) });
    assert_eq!(sandbox.balance(dai(), operator()), wad(190));
}

#[test]
fn should_write_off_and_recover_shortfall() {
    let (mut sandbox, mut manager) = told();
    sandbox
        .schedule_payout(pool(), 1, manager_id(), wad(60), wad(60))
        .unwrap();
    manager
        .execute(&mut sandbox, stranger(), Call::Unwind { epoch: 1 })
        .unwrap();
    assert_eq!(art(&sandbox), wad(40));
    assert_eq!(sandbox.balance(dai(), operator()), wad(100));

    manager.execute(&mut sandbox, deployer(), Call::Sink).unwrap();
    assert_eq!(manager.status().tab, wad(40) * RAY);
    assert_eq!(manager.status().stage, Stage::WrittenOff);

    sandbox.cull(ledger(), ILK, urn()).unwrap();
    assert_eq!(
        sandbox.collateral_type(ledger(), ILK).unwrap().total_debt,
        U256::ZERO
    );
    sandbox
        .schedule_payout(pool(), 2, manager_id(), wad(40), wad(40))
        .unwrap();
    manager
        .execute(&mut sandbox, stranger(), Call::Recover { epoch: 2 })
        .unwrap();

    assert_eq!(manager.status().tab, U256::ZERO);
    assert_eq!(sandbox.internal_balance(ledger(), vow()), wad(40) * RAY);
    assert_eq!(sandbox.balance(dai(), operator()), wad(100));
    assert_eq!(
        last_event(&manager),
        Event::Recover {
            recovered: wad(40),
            pay_back: wad(40)
        }
    );
    assert_eq!(manager.check_invariants(), Ok(()));
}

#[test]
fn should_send_recovery_to_operator_while_ledger_has_debt() {
    let (mut sandbox, mut manager) = told();
    sandbox
        .schedule_payout(pool(), 1, manager_id(), wad(60), wad(60))
        .unwrap();
    manager
        .execute(&mut sandbox, stranger(), Call::Unwind { epoch: 1 })
        .unwrap();
    manager.execute(&mut sandbox, deployer(), Call::Sink).unwrap();

    sandbox
        .schedule_payout(pool(), 2, manager_id(), wad(40), wad(40))
        .unwrap();
    manager
        .execute(&mut sandbox, stranger(), Call::Recover { epoch: 2 })
        .unwrap();

    assert_eq!(manager.status().tab, wad(40) * RAY);
    assert_eq!(sandbox.internal_balance(ledger(), vow()), U256::ZERO);
    assert_eq!(sandbox.balance(dai(), operator()), wad(140));
}

#[test]
fn should_only_sink_once() {
    let (mut sandbox, mut manager) = told();
    manager.execute(&mut sandbox, deployer(), Call::Sink).unwrap();
    assert_eq!(
        manager.execute(&mut sandbox, deployer(), Call::Sink),
        violation(Precondition::NotSoftLiquidation)
    );
    assert_eq!(manager.status().tab, wad(100) * RAY);
}

#[test]
fn should_enforce_liquidation_order() {
    let (mut sandbox, mut manager) = borrowed();
    assert_eq!(
        manager.execute(&mut sandbox, stranger(), Call::Unwind { epoch: 1 }),
        violation(Precondition::NotSoftLiquidation)
    );
    assert_eq!(
        manager.execute(&mut sandbox, deployer(), Call::Sink),
        violation(Precondition::NotSoftLiquidation)
    );
    assert_eq!(
        manager.execute(&mut sandbox, stranger(), Call::Recover { epoch: 1 }),
        violation(Precondition::NotWrittenOff)
    );
    manager.execute(&mut sandbox, deployer(), Call::Tell).unwrap();
    manager.execute(&mut sandbox, deployer(), Call::Sink).unwrap();
    assert_eq!(
        manager.execute(&mut sandbox, stranger(), Call::Unwind { epoch: 1 }),
        violation(Precondition::NotSoftLiquidation)
    );
}

#[test]
fn should_allow_repeated_cage_after_write_off() {
    let (mut sandbox, mut manager) = told();
    manager.execute(&mut sandbox, deployer(), Call::Sink).unwrap();

    manager.execute(&mut sandbox, stranger(), Call::Cage).unwrap();
    let status = manager.status();
    manager.execute(&mut sandbox, stranger(), Call::Cage).unwrap();

    assert_eq!(manager.status(), status);
    assert_eq!(status.stage, Stage::Settled);
    assert!(!status.live);
    assert_eq!(manager.events().filter(|e| *e == Event::Cage).count(), 2);
    assert_eq!(manager.check_invariants(), Ok(()));
}

#[test]
fn should_gate_cage_on_caller_and_settlement() {
    let (mut sandbox, mut manager) = borrowed();
    assert_eq!(
        manager.execute(&mut sandbox, stranger(), Call::Cage),
        violation(Precondition::CageNotAllowed)
    );
    sandbox.set_ledger_live(ledger(), false).unwrap();
    assert!(!sandbox.is_live(ledger()).unwrap());
    assert_eq!(manager.execute(&mut sandbox, stranger(), Call::Cage), Ok(()));

    let (mut sandbox, mut manager) = borrowed();
    assert_eq!(manager.execute(&mut sandbox, deployer(), Call::Cage), Ok(()));
    assert_eq!(
        manager.execute(&mut sandbox, operator(), Call::InitializePosition { amount: WAD }),
        violation(Precondition::Retired)
    );
}

#[test]
fn should_hand_allowances_to_migration_target() {
    let (mut sandbox, mut manager) = borrowed();
    let dst = Principal::from_slice(&[42; 4]);
    manager
        .execute(&mut sandbox, deployer(), Call::Migrate { dst })
        .unwrap();

    assert_eq!(sandbox.allowance(dai(), manager_id(), dst), U256::MAX);
    assert_eq!(sandbox.allowance(drop_token(), manager_id(), dst), U256::MAX);
    assert_eq!(manager.status().stage, Stage::Settled);
    assert_eq!(
        manager.execute(&mut sandbox, operator(), Call::DepositCollateral { amount: WAD }),
        violation(Precondition::NotSafeAndLive)
    );
    assert_eq!(
        manager.execute(&mut sandbox, operator(), Call::InitializePosition { amount: WAD }),
        violation(Precondition::Retired)
    );
}

#[test]
fn should_manage_admins_only_while_live() {
    let (mut sandbox, mut manager) = constructed();
    assert_eq!(
        manager.execute(&mut sandbox, deployer(), Call::Rely { usr: stranger() }),
        violation(Precondition::NotLive)
    );

    manager
        .execute(&mut sandbox, operator(), Call::InitializePosition { amount: WAD })
        .unwrap();
    manager
        .execute(&mut sandbox, deployer(), Call::Rely { usr: stranger() })
        .unwrap();
    assert!(manager.is_admin(&stranger()));

    manager
        .execute(&mut sandbox, stranger(), Call::Deny { usr: deployer() })
        .unwrap();
    assert!(!manager.is_admin(&deployer()));
    assert_eq!(
        manager.execute(&mut sandbox, deployer(), Call::Tell),
        violation(Precondition::NotAuthorized)
    );
    assert_eq!(manager.check_invariants(), Ok(()));
}

#[test]
fn should_rewire_collaborators_with_file() {
    let (mut sandbox, mut manager) = constructed();
    let new_vow = Principal::from_slice(&[77; 4]);
    manager
        .execute(
            &mut sandbox,
            deployer(),
            Call::File {
                what: "vow".to_string(),
                data: new_vow,
            },
        )
        .unwrap();
    assert_eq!(manager.state().vow, new_vow);

    assert_eq!(
        manager.execute(
            &mut sandbox,
            deployer(),
            Call::File {
                what: "tranche".to_string(),
                data: new_vow,
            },
        ),
        Err(ManagerError::UnrecognizedParameter("tranche".to_string()))
    );
    assert_eq!(manager.check_invariants(), Ok(()));
}

#[test]
fn should_hand_over_operator_role() {
    let (mut sandbox, mut manager) = operational();
    manager
        .execute(&mut sandbox, operator(), Call::SetOperator { operator: stranger() })
        .unwrap();
    assert_eq!(manager.status().operator, stranger());
    assert_eq!(
        manager.execute(&mut sandbox, operator(), Call::DrawDebt { amount: WAD }),
        violation(Precondition::NotOperator)
    );
}

#[test]
fn should_roll_back_everything_when_a_gateway_fails() {
    let (mut sandbox, mut manager) = borrowed();
    sandbox.reject_method("redeem_order");
    let events_before = manager.count_events();

    assert_matches!(
        manager.execute(&mut sandbox, deployer(), Call::Tell),
        Err(ManagerError::GatewayRejected(e)) if e.method() == "redeem_order"
    );

    assert!(manager.status().safe);
    assert_eq!(manager.count_events(), events_before);
    assert_eq!(sandbox.allowance(drop_token(), manager_id(), tranche()), U256::ZERO);
    assert_eq!(sandbox.balance(drop_token(), manager_id()), wad(100));

    sandbox.accept_method("redeem_order");
    manager.execute(&mut sandbox, deployer(), Call::Tell).unwrap();
    assert!(!manager.status().safe);
}

#[test]
fn should_page_through_events() {
    let (_, manager) = borrowed();
    assert_eq!(manager.count_events(), 4);
    let page = manager.get_events(GetEventsArg {
        start: 1,
        length: 2,
    });
    assert_eq!(
        page,
        vec![
            Event::Lock { wad: WAD },
            Event::Join { wad: wad(100) }
        ]
    );
    assert!(manager
        .get_events(GetEventsArg {
            start: 10,
            length: 5
        })
        .is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn tab_never_grows_during_recovery(payouts in prop::collection::vec(0u128..80, 1..6)) {
        let (mut sandbox, mut manager) = told();
        manager.execute(&mut sandbox, deployer(), Call::Sink).unwrap();
        sandbox.cull(ledger(), ILK, urn()).unwrap();

        let mut previous = manager.status().tab;
        for (epoch, amount) in payouts.into_iter().enumerate() {
            let epoch = epoch as u64 + 1;
            sandbox
                .schedule_payout(pool(), epoch, manager_id(), wad(amount), U256::ZERO)
                .unwrap();
            manager
                .execute(&mut sandbox, stranger(), Call::Recover { epoch })
                .unwrap();
            let tab = manager.status().tab;
            prop_assert!(tab <= previous);
            previous = tab;
        }
        prop_assert_eq!(manager.check_invariants(), Ok(()));
        prop_assert_eq!(
            sandbox.internal_balance(ledger(), vow()) + previous,
            wad(100) * RAY
        );
    }
}
