//! Collaborators that call back into the game mid-operation

use ghostpool::{
    errors::{CollaboratorError, GameError, GhostPoolError, PoolResult},
    simulation::Sandbox,
    Address, Amount, LendingPool, PaymentToken, PoolConfig,
};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

type Hook = Box<dyn FnOnce(&Sandbox) -> PoolResult<()>>;

/// One-shot callback into the sandbox, fired from inside a collaborator call
#[derive(Default)]
struct Reentry {
    sandbox: RefCell<Weak<Sandbox>>,
    hook: RefCell<Option<Hook>>,
    observed: RefCell<Vec<PoolResult<()>>>,
}

impl Reentry {
    fn arm(&self, hook: impl FnOnce(&Sandbox) -> PoolResult<()> + 'static) {
        *self.hook.borrow_mut() = Some(Box::new(hook));
    }

    fn fire(&self) {
        let hook = self.hook.borrow_mut().take();
        let sandbox = self.sandbox.borrow().upgrade();
        if let (Some(hook), Some(sandbox)) = (hook, sandbox) {
            let result = hook(&sandbox);
            self.observed.borrow_mut().push(result);
        }
    }

    fn observed(&self) -> Vec<PoolResult<()>> {
        self.observed.borrow().clone()
    }
}

struct HostileToken {
    inner: Rc<dyn PaymentToken>,
    on_transfer: Reentry,
    on_transfer_from: Reentry,
}

impl PaymentToken for HostileToken {
    fn balance_of(&self, holder: &Address) -> Result<Amount, CollaboratorError> {
        self.inner.balance_of(holder)
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> Result<Amount, CollaboratorError> {
        self.inner.allowance(owner, spender)
    }

    fn approve(&self, owner: &Address, spender: &Address, amount: Amount) -> Result<bool, CollaboratorError> {
        self.inner.approve(owner, spender, amount)
    }

    fn transfer(&self, from: &Address, to: &Address, amount: Amount) -> Result<bool, CollaboratorError> {
        self.on_transfer.fire();
        self.inner.transfer(from, to, amount)
    }

    fn transfer_from(
        &self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<bool, CollaboratorError> {
        self.on_transfer_from.fire();
        self.inner.transfer_from(spender, from, to, amount)
    }
}

struct HostileLendingPool {
    inner: Rc<dyn LendingPool>,
    on_deposit: Reentry,
    on_withdraw: Reentry,
}

impl LendingPool for HostileLendingPool {
    fn deposit(
        &self,
        caller: &Address,
        asset: &Address,
        amount: Amount,
        on_behalf_of: &Address,
        referral_code: u16,
    ) -> Result<(), CollaboratorError> {
        self.on_deposit.fire();
        self.inner
            .deposit(caller, asset, amount, on_behalf_of, referral_code)
    }

    fn withdraw(
        &self,
        caller: &Address,
        asset: &Address,
        amount: Amount,
        to: &Address,
    ) -> Result<Amount, CollaboratorError> {
        self.on_withdraw.fire();
        self.inner.withdraw(caller, asset, amount, to)
    }

    fn balance_of(&self, asset: &Address, holder: &Address) -> Result<Amount, CollaboratorError> {
        self.inner.balance_of(asset, holder)
    }

    fn address(&self) -> Address {
        self.inner.address()
    }
}

struct Harness {
    sandbox: Rc<Sandbox>,
    token: Rc<HostileToken>,
    lending_pool: Rc<HostileLendingPool>,
}

fn harness() -> Harness {
    let mut config = PoolConfig::testing();
    config.game.segment_count = 5;

    let mut token = None;
    let mut lending_pool = None;
    let sandbox = Sandbox::new_with(config, |c| {
        let hostile_token = Rc::new(HostileToken {
            inner: c.token.clone(),
            on_transfer: Reentry::default(),
            on_transfer_from: Reentry::default(),
        });
        let hostile_pool = Rc::new(HostileLendingPool {
            inner: c.lending_pool.clone(),
            on_deposit: Reentry::default(),
            on_withdraw: Reentry::default(),
        });
        c.token = hostile_token.clone();
        c.lending_pool = hostile_pool.clone();
        token = Some(hostile_token);
        lending_pool = Some(hostile_pool);
    })
    .expect("Failed to build sandbox");

    let sandbox = Rc::new(sandbox);
    let token = token.expect("token wrapper installed");
    let lending_pool = lending_pool.expect("lending pool wrapper installed");
    for reentry in [
        &token.on_transfer,
        &token.on_transfer_from,
        &lending_pool.on_deposit,
        &lending_pool.on_withdraw,
    ] {
        *reentry.sandbox.borrow_mut() = Rc::downgrade(&sandbox);
    }

    Harness {
        sandbox,
        token,
        lending_pool,
    }
}

fn is_game_error(result: &PoolResult<()>, expected: GameError) -> bool {
    matches!(result, Err(GhostPoolError::Game(e)) if *e == expected)
}

#[test]
fn test_reentrant_withdraw_is_rejected() {
    let h = harness();
    let game = &h.sandbox.game;
    let alice = h.sandbox.fund_player("alice", 100);
    game.join(&alice).unwrap();
    h.sandbox.advance_to_segment(6);

    let target = alice.clone();
    h.token
        .on_transfer
        .arm(move |s| s.game.withdraw(&target).map(|_| ()));

    assert_eq!(game.withdraw(&alice).unwrap(), 10);
    let observed = h.token.on_transfer.observed();
    assert_eq!(observed.len(), 1);
    assert!(is_game_error(&observed[0], GameError::ReentrantCall("withdraw")));
    assert_eq!(h.sandbox.balance(&alice), 100);
    assert!(is_game_error(
        &game.withdraw(&alice).map(|_| ()),
        GameError::PlayerAlreadyWithdrawn(alice.clone())
    ));
}

#[test]
fn test_reentrant_redeem_is_rejected() {
    let h = harness();
    let game = &h.sandbox.game;
    let alice = h.sandbox.fund_player("alice", 100);
    game.join(&alice).unwrap();

    h.sandbox.advance_to_segment(1);
    game.deposit_into_external_pool().unwrap();
    h.sandbox.accrue_yield(3);
    h.sandbox.advance_to_segment(6);

    h.lending_pool
        .on_withdraw
        .arm(|s| s.game.redeem_from_external_pool().map(|_| ()));

    let report = game.redeem_from_external_pool().unwrap();
    assert_eq!(report.total_interest, 3);
    assert!(is_game_error(
        &h.lending_pool.on_withdraw.observed()[0],
        GameError::ReentrantCall("redeem_from_external_pool")
    ));

    // no winners, so the interest went to the owner exactly once
    assert_eq!(h.sandbox.balance(&h.sandbox.owner()), 3);
    assert_eq!(h.sandbox.balance(h.sandbox.pool_address()), 10);
}

#[test]
fn test_reentrant_sweep_is_rejected() {
    let h = harness();
    let game = &h.sandbox.game;
    for name in ["alice", "bob"] {
        let player = h.sandbox.fund_player(name, 100);
        game.join(&player).unwrap();
    }
    h.sandbox.advance_to_segment(1);

    h.lending_pool
        .on_deposit
        .arm(|s| s.game.deposit_into_external_pool().map(|_| ()));

    assert_eq!(game.deposit_into_external_pool().unwrap(), 20);
    assert!(is_game_error(
        &h.lending_pool.on_deposit.observed()[0],
        GameError::ReentrantCall("deposit_into_external_pool")
    ));
    assert_eq!(game.segment_deposit(0), 0);

    let asset = &h.sandbox.config.collaborators.asset;
    assert_eq!(
        h.sandbox.lending_pool.balance_of(asset, h.sandbox.pool_address()),
        Ok(20)
    );
}

#[test]
fn test_collaborator_sees_committed_effects() {
    let h = harness();
    let game = &h.sandbox.game;
    let alice = h.sandbox.fund_player("alice", 100);
    let bob = h.sandbox.fund_player("bob", 100);
    game.join(&alice).unwrap();
    game.join(&bob).unwrap();
    h.sandbox.advance_to_segment(1);

    let seen = Rc::new(RefCell::new(None));
    let (target, record) = (alice.clone(), seen.clone());
    h.token.on_transfer.arm(move |s| {
        let withdrawn = s.game.player(&target).map(|p| p.withdrawn);
        *record.borrow_mut() = Some((s.game.in_operation(), s.game.total_game_principal(), withdrawn));
        s.game.early_withdraw(&target).map(|_| ())
    });

    assert_eq!(game.early_withdraw(&alice).unwrap(), 9);
    assert_eq!(*seen.borrow(), Some((true, 11, Some(true))));
    assert!(is_game_error(
        &h.token.on_transfer.observed()[0],
        GameError::ReentrantCall("early_withdraw")
    ));
    assert!(!game.in_operation());
}

#[test]
fn test_reentrant_join_is_rejected_and_outer_failure_rolls_back() {
    let h = harness();
    let game = &h.sandbox.game;
    let alice = h.sandbox.fund_player("alice", 100);
    let bob = h.sandbox.fund_player("bob", 100);

    let joiner = bob.clone();
    h.token.on_transfer_from.arm(move |s| {
        let joined = s.game.join(&joiner);
        s.token.set_reject_transfers(true);
        joined
    });

    assert!(matches!(
        game.join(&alice),
        Err(GhostPoolError::Collaborator(CollaboratorError::TransferRejected { .. }))
    ));
    assert!(is_game_error(
        &h.token.on_transfer_from.observed()[0],
        GameError::ReentrantCall("join")
    ));

    assert!(game.players().is_empty());
    assert!(game.player(&bob).is_none());
    assert_eq!(game.total_game_principal(), 0);
    assert!(game.events().is_empty());
    assert_eq!(h.sandbox.balance(&alice), 100);
    assert_eq!(h.sandbox.balance(&bob), 100);
}

#[test]
fn test_exit_inside_failed_operation_cannot_be_repeated() {
    let h = harness();
    let game = &h.sandbox.game;
    let alice = h.sandbox.fund_player("alice", 100);
    let bob = h.sandbox.fund_player("bob", 100);
    let carol = h.sandbox.fund_player("carol", 100);
    game.join(&bob).unwrap();
    game.join(&carol).unwrap();

    // bob tries to leave from inside alice's join, which then fails
    let leaver = bob.clone();
    h.token.on_transfer_from.arm(move |s| {
        let exit = s.game.early_withdraw(&leaver).map(|_| ());
        s.token.set_reject_transfers(true);
        exit
    });
    assert!(game.join(&alice).is_err());
    assert!(is_game_error(
        &h.token.on_transfer_from.observed()[0],
        GameError::ReentrantCall("early_withdraw")
    ));
    h.sandbox.token.set_reject_transfers(false);

    assert_eq!(game.player(&bob).map(|p| p.withdrawn), Some(false));
    assert_eq!(h.sandbox.balance(&bob), 90);

    assert_eq!(game.early_withdraw(&bob).unwrap(), 9);
    assert!(is_game_error(
        &game.early_withdraw(&bob).map(|_| ()),
        GameError::PlayerAlreadyWithdrawn(bob.clone())
    ));

    assert_eq!(h.sandbox.balance(&bob), 99);
    assert_eq!(h.sandbox.balance(h.sandbox.pool_address()), 11);
    assert_eq!(game.total_game_principal(), 11);
    assert!(game.player(&alice).is_none());
}
