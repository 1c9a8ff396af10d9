//! The game coordinator
//!
//! `PoolGame` owns the aggregate state and runs every operation. Each operation checks all
//! of its preconditions, commits its effects, and only then calls collaborators. Any failure
//! anywhere rolls the state back to where the operation started.

use crate::config::{CollaboratorConfig, GameConfig, PoolConfig};
use crate::errors::{CollaboratorError, GameError, PoolResult};
use crate::games::{
    clock::GameClock,
    payout::{self, PayoutBreakdown},
    redemption::{self, RedemptionReport},
    types::{Address, Amount, GameEvent, Player, Segment},
};
use crate::state_manager::{GameState, StateManager};
use crate::traits::{
    Administration, LendingPool, PaymentToken, ReserveDataProvider, TimeSource, WITHDRAW_ALL,
};
use std::rc::Rc;
use tracing::{debug, info, warn};

/// Handles to every external collaborator
#[derive(Clone)]
pub struct Collaborators {
    pub token: Rc<dyn PaymentToken>,
    pub lending_pool: Rc<dyn LendingPool>,
    pub data_provider: Rc<dyn ReserveDataProvider>,
    pub admin: Rc<dyn Administration>,
    pub time: Rc<dyn TimeSource>,
}

/// A single savings game
pub struct PoolGame {
    config: GameConfig,
    addresses: CollaboratorConfig,
    clock: GameClock,
    yield_token: Address,
    state: StateManager,
    collaborators: Collaborators,
}

impl PoolGame {
    /// Build a new game. Resolves the yield-bearing token through the data provider.
    pub fn new(config: &PoolConfig, collaborators: Collaborators) -> PoolResult<Self> {
        config.validate()?;

        let yield_token = collaborators
            .data_provider
            .yield_token_address(&config.collaborators.asset)?;
        let first_segment_start = config
            .game
            .first_segment_start
            .unwrap_or_else(|| collaborators.time.now());

        info!(
            "Game created: {} segments of {}s, payment {}, fee {}%, yield token {}",
            config.game.segment_count,
            config.game.segment_length_secs,
            config.game.segment_payment,
            config.game.early_withdrawal_fee,
            yield_token
        );

        Ok(Self::assemble(
            config,
            first_segment_start,
            yield_token,
            GameState::default(),
            collaborators,
        ))
    }

    pub(crate) fn assemble(
        config: &PoolConfig,
        first_segment_start: u64,
        yield_token: Address,
        state: GameState,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            clock: GameClock::new(
                first_segment_start,
                config.game.segment_length_secs,
                config.game.segment_count,
            ),
            config: config.game.clone(),
            addresses: config.collaborators.clone(),
            yield_token,
            state: StateManager::from_state(state),
            collaborators,
        }
    }

    // ----- clock -----

    pub fn current_segment(&self) -> Segment {
        self.clock.current_segment(self.collaborators.time.now())
    }

    pub fn is_game_completed(&self) -> bool {
        self.clock.is_completed(self.collaborators.time.now())
    }

    // ----- player ledger -----

    /// Join during segment 0 and pay the first segment in the same step
    pub fn join(&self, player: &Address) -> PoolResult<()> {
        self.state.ensure_idle("join")?;
        self.ensure_not_paused()?;
        let segment = self.current_segment();
        let payment = self.config.segment_payment();

        self.state.atomic("join", |tx| {
            tx.update(|s| {
                s.ledger.register(player, segment)?;
                s.emit(GameEvent::JoinedGame {
                    player: player.clone(),
                    amount: payment,
                });
                Ok(())
            })?;
            self.collect_payment(tx, player, segment)
        })?;

        info!("Player {} joined the game", player);
        Ok(())
    }

    /// Pay the current segment. Segments must be paid consecutively.
    pub fn make_deposit(&self, player: &Address) -> PoolResult<()> {
        self.state.ensure_idle("make_deposit")?;
        self.ensure_not_paused()?;
        let segment = self.current_segment();
        let last_segment = self.clock.last_segment;

        self.state.atomic("make_deposit", |tx| {
            tx.update(|s| {
                s.ledger
                    .check_deposit_eligibility(player, segment, last_segment)?;
                if segment + 1 == last_segment {
                    s.ledger.add_winner(player);
                    debug!("Player {} paid the final segment", player);
                }
                Ok(())
            })?;
            self.collect_payment(tx, player, segment)
        })?;

        info!("Player {} paid segment {}", player, segment);
        Ok(())
    }

    /// Shared payment recording: bookkeeping first, the token pull last
    fn collect_payment(&self, tx: &StateManager, player: &Address, segment: Segment) -> PoolResult<()> {
        let payment = self.config.segment_payment();
        let pool = &self.addresses.pool_address;

        let approved = self.collaborators.token.allowance(player, pool)?;
        if approved < payment {
            return Err(GameError::InsufficientAllowance {
                required: payment,
                approved,
            }
            .into());
        }

        tx.update(|s| {
            s.ledger.record_payment(player, segment, payment)?;
            s.add_principal(payment)?;
            s.segments.credit(segment, payment)?;
            s.emit(GameEvent::Deposit {
                player: player.clone(),
                segment,
                amount: payment,
            });
            Ok(())
        })?;

        if !self
            .collaborators
            .token
            .transfer_from(pool, player, pool, payment)?
        {
            return Err(CollaboratorError::TransferRejected {
                to: pool.clone(),
                amount: payment,
            }
            .into());
        }
        Ok(())
    }

    // ----- segment pool -----

    /// Sweep the previous segment's bucket into the lending pool. Callable by anyone.
    pub fn deposit_into_external_pool(&self) -> PoolResult<Amount> {
        self.state.ensure_idle("deposit_into_external_pool")?;
        self.ensure_not_paused()?;
        if self.is_game_completed() {
            return Err(GameError::GameCompleted.into());
        }
        let segment = self.current_segment();
        let previous = segment
            .checked_sub(1)
            .ok_or(GameError::SweepDuringFirstSegment)?;

        let amount = self.state.atomic("deposit_into_external_pool", |tx| {
            let amount = tx.update(|s| {
                let amount = s.segments.take(previous)?;
                s.emit(GameEvent::FundsDepositedIntoExternalPool { amount });
                Ok(amount)
            })?;

            let pool = &self.addresses.pool_address;
            let lending_pool = self.collaborators.lending_pool.address();
            if !self.collaborators.token.approve(pool, &lending_pool, amount)? {
                return Err(CollaboratorError::ApprovalRejected {
                    spender: lending_pool,
                    amount,
                }
                .into());
            }
            self.collaborators.lending_pool.deposit(
                pool,
                &self.addresses.asset,
                amount,
                pool,
                self.config.referral_code,
            )?;
            Ok(amount)
        })?;

        info!("Swept {} from segment {} into the lending pool", amount, previous);
        Ok(amount)
    }

    // ----- redemption -----

    /// Pull everything out of the lending pool once the game is over. Runs at most once.
    pub fn redeem_from_external_pool(&self) -> PoolResult<RedemptionReport> {
        self.state.ensure_idle("redeem_from_external_pool")?;
        if !self.is_game_completed() {
            return Err(GameError::GameNotCompleted.into());
        }
        self.state
            .atomic("redeem_from_external_pool", |tx| self.redeem(tx))
    }

    fn redeem(&self, tx: &StateManager) -> PoolResult<RedemptionReport> {
        tx.update(|s| s.redemption.begin())?;

        let pool = &self.addresses.pool_address;
        let asset = &self.addresses.asset;
        let lending_pool = &self.collaborators.lending_pool;

        if lending_pool.balance_of(asset, pool)? > 0 {
            let withdrawn = lending_pool.withdraw(pool, asset, WITHDRAW_ALL, pool)?;
            debug!("Withdrew {} from the lending pool", withdrawn);
        }
        let total_amount = self.collaborators.token.balance_of(pool)?;

        let report = tx.update(|s| {
            let total_principal = s.total_game_principal;
            let (interest, shortfall) = redemption::compute_interest(total_amount, total_principal);
            if shortfall > 0 {
                warn!(
                    "Pool balance {} is {} short of tracked principal {}",
                    total_amount, shortfall, total_principal
                );
            }
            s.redemption.record_interest(interest);

            let winners = s.ledger.winners().to_vec();
            s.emit(GameEvent::FundsRedeemedFromExternalPool {
                total_amount,
                total_principal,
                total_interest: interest,
            });
            s.emit(GameEvent::WinnersAnnouncement {
                winners: winners.clone(),
            });

            Ok(RedemptionReport {
                total_amount,
                total_principal,
                total_interest: interest,
                interest_to_owner: winners.is_empty().then_some(interest),
                winners,
            })
        })?;

        if let Some(interest) = report.interest_to_owner.filter(|i| *i > 0) {
            let owner = self.collaborators.admin.owner();
            self.transfer_out(&owner, interest)?;
            info!("No winners, interest {} sent to owner {}", interest, owner);
        }

        info!(
            "Redeemed {} (principal {}, interest {}) for {} winners",
            report.total_amount,
            report.total_principal,
            report.total_interest,
            report.winners.len()
        );
        Ok(report)
    }

    // ----- payouts -----

    /// Final withdrawal after completion: principal, plus an equal interest share for winners.
    /// The first withdrawal triggers redemption when nobody has yet.
    pub fn withdraw(&self, player: &Address) -> PoolResult<Amount> {
        self.state.ensure_idle("withdraw")?;
        if !self.is_game_completed() {
            return Err(GameError::GameNotCompleted.into());
        }
        let last_segment = self.clock.last_segment;

        let payout = self.state.atomic("withdraw", |tx| {
            let record = tx.update(|s| s.ledger.mark_withdrawn(player))?;

            if !tx.view(|s| s.redemption.is_redeemed()) {
                debug!("Player {} triggers redemption", player);
                self.redeem(tx)?;
            }

            let breakdown = tx.update(|s| {
                let breakdown = payout::final_payout(
                    &record,
                    last_segment,
                    s.redemption.total_game_interest(),
                    s.ledger.winners().len(),
                );
                s.emit(GameEvent::Withdrawal {
                    player: player.clone(),
                    amount: breakdown.total()?,
                });
                Ok(breakdown)
            })?;

            let amount = breakdown.total()?;
            self.transfer_out(player, amount)?;
            Ok((breakdown, amount))
        })?;

        let (breakdown, amount) = payout;
        info!(
            "Player {} withdrew {} (principal {}, interest {})",
            player, amount, breakdown.principal, breakdown.interest_share
        );
        Ok(amount)
    }

    /// Leave before completion, forfeiting the early withdrawal fee to the pool
    pub fn early_withdraw(&self, player: &Address) -> PoolResult<Amount> {
        self.state.ensure_idle("early_withdraw")?;
        self.ensure_not_paused()?;
        if self.is_game_completed() {
            return Err(GameError::GameCompleted.into());
        }
        let segment = self.current_segment();
        let fee = self.config.early_withdrawal_fee;

        let amount = self.state.atomic("early_withdraw", |tx| {
            let amount = tx.update(|s| {
                let record = s.ledger.mark_withdrawn(player)?;
                let amount = payout::early_withdrawal_amount(record.amount_paid, fee)?;
                s.remove_principal(amount)?;
                if !s.segments.debit_if_covered(segment, amount) {
                    warn!(
                        "Segment {} bucket holds {} and was not reduced by {}",
                        segment,
                        s.segments.pending(segment),
                        amount
                    );
                }
                s.emit(GameEvent::EarlyWithdrawal {
                    player: player.clone(),
                    amount,
                });
                Ok(amount)
            })?;

            let pool = &self.addresses.pool_address;
            let idle = self.collaborators.token.balance_of(pool)?;
            if idle < amount {
                let shortfall = amount - idle;
                debug!("Idle balance {} short by {}, withdrawing from lending pool", idle, shortfall);
                self.collaborators
                    .lending_pool
                    .withdraw(pool, &self.addresses.asset, shortfall, pool)?;
            }

            self.transfer_out(player, amount)?;
            Ok(amount)
        })?;

        info!("Player {} withdrew early and received {}", player, amount);
        Ok(amount)
    }

    fn transfer_out(&self, to: &Address, amount: Amount) -> PoolResult<()> {
        if !self
            .collaborators
            .token
            .transfer(&self.addresses.pool_address, to, amount)?
        {
            return Err(CollaboratorError::TransferRejected {
                to: to.clone(),
                amount,
            }
            .into());
        }
        Ok(())
    }

    fn ensure_not_paused(&self) -> Result<(), GameError> {
        if self.collaborators.admin.is_paused() {
            return Err(GameError::Paused);
        }
        Ok(())
    }

    // ----- views -----

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn addresses(&self) -> &CollaboratorConfig {
        &self.addresses
    }

    pub fn clock(&self) -> &GameClock {
        &self.clock
    }

    pub fn yield_token(&self) -> &Address {
        &self.yield_token
    }

    pub fn players(&self) -> Vec<Address> {
        self.state.view(|s| s.ledger.roster().to_vec())
    }

    pub fn player(&self, address: &Address) -> Option<Player> {
        self.state.view(|s| s.ledger.player(address).cloned())
    }

    pub fn winners(&self) -> Vec<Address> {
        self.state.view(|s| s.ledger.winners().to_vec())
    }

    pub fn total_game_principal(&self) -> Amount {
        self.state.view(|s| s.total_game_principal)
    }

    pub fn total_game_interest(&self) -> Amount {
        self.state.view(|s| s.redemption.total_game_interest())
    }

    pub fn redeemed(&self) -> bool {
        self.state.view(|s| s.redemption.is_redeemed())
    }

    pub fn segment_deposit(&self, segment: Segment) -> Amount {
        self.state.view(|s| s.segments.pending(segment))
    }

    /// Payout `player` would receive from `withdraw` given the current interest figure
    pub fn projected_payout(&self, player: &Address) -> Option<PayoutBreakdown> {
        let last_segment = self.clock.last_segment;
        self.state.view(|s| {
            s.ledger.player(player).map(|record| {
                payout::final_payout(
                    record,
                    last_segment,
                    s.redemption.total_game_interest(),
                    s.ledger.winners().len(),
                )
            })
        })
    }

    /// True while an operation is running. Mutating calls made now fail with `ReentrantCall`.
    pub fn in_operation(&self) -> bool {
        self.state.in_operation()
    }

    pub fn events(&self) -> Vec<GameEvent> {
        self.state.view(|s| s.events.clone())
    }

    /// Take the journal. Fails with `ReentrantCall` while an operation is running.
    pub fn drain_events(&self) -> PoolResult<Vec<GameEvent>> {
        self.state.drain_events()
    }

    /// Copy of the committed state
    pub fn state(&self) -> GameState {
        self.state.snapshot()
    }
}
