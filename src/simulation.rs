//! In-memory collaborators and a scripted scenario runner
//!
//! Everything here is deterministic: the clock only moves when told to and the lending pool
//! only earns what `accrue_yield` hands it.

use crate::config::PoolConfig;
use crate::errors::{CollaboratorError, PoolResult};
use crate::games::{
    processor::{Collaborators, PoolGame},
    types::{Address, Amount, GameEvent, Segment},
};
use crate::traits::{
    LendingPool, OwnablePause, PaymentToken, ReserveDataProvider, TimeSource, WITHDRAW_ALL,
};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Clock start used when the configuration leaves the first segment start open
pub const DEFAULT_SIMULATION_START: u64 = 1_700_000_000;

/// ERC20-like token ledger
#[derive(Debug, Default)]
pub struct InMemoryToken {
    balances: RefCell<BTreeMap<Address, Amount>>,
    allowances: RefCell<BTreeMap<(Address, Address), Amount>>,
    reject_transfers: Cell<bool>,
}

impl InMemoryToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&self, to: &Address, amount: Amount) {
        let mut balances = self.balances.borrow_mut();
        let balance = balances.entry(to.clone()).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    /// Set the allowance `owner` grants `spender`, replacing any previous one
    pub fn set_allowance(&self, owner: &Address, spender: &Address, amount: Amount) {
        self.allowances
            .borrow_mut()
            .insert((owner.clone(), spender.clone()), amount);
    }

    /// Make every transfer return `false` until switched back
    pub fn set_reject_transfers(&self, reject: bool) {
        self.reject_transfers.set(reject);
    }

    pub fn balances(&self) -> BTreeMap<Address, Amount> {
        self.balances.borrow().clone()
    }

    fn move_balance(&self, from: &Address, to: &Address, amount: Amount) -> Result<(), CollaboratorError> {
        let mut balances = self.balances.borrow_mut();
        let available = balances.get(from).copied().unwrap_or(0);
        if available < amount {
            return Err(CollaboratorError::TokenFailed(format!(
                "{} holds {} but {} was requested",
                from, available, amount
            )));
        }
        balances.insert(from.clone(), available - amount);
        let receiver = balances.entry(to.clone()).or_insert(0);
        *receiver = receiver.saturating_add(amount);
        Ok(())
    }
}

impl PaymentToken for InMemoryToken {
    fn balance_of(&self, holder: &Address) -> Result<Amount, CollaboratorError> {
        Ok(self.balances.borrow().get(holder).copied().unwrap_or(0))
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> Result<Amount, CollaboratorError> {
        Ok(self
            .allowances
            .borrow()
            .get(&(owner.clone(), spender.clone()))
            .copied()
            .unwrap_or(0))
    }

    fn approve(&self, owner: &Address, spender: &Address, amount: Amount) -> Result<bool, CollaboratorError> {
        self.set_allowance(owner, spender, amount);
        Ok(true)
    }

    fn transfer(&self, from: &Address, to: &Address, amount: Amount) -> Result<bool, CollaboratorError> {
        if self.reject_transfers.get() {
            return Ok(false);
        }
        self.move_balance(from, to, amount)?;
        Ok(true)
    }

    fn transfer_from(
        &self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<bool, CollaboratorError> {
        if self.reject_transfers.get() {
            return Ok(false);
        }
        let key = (from.clone(), spender.clone());
        let approved = self.allowances.borrow().get(&key).copied().unwrap_or(0);
        if approved < amount {
            return Err(CollaboratorError::TokenFailed(format!(
                "{} approved {} for {} but {} was requested",
                from, approved, spender, amount
            )));
        }
        self.move_balance(from, to, amount)?;
        self.allowances.borrow_mut().insert(key, approved - amount);
        Ok(true)
    }
}

/// Lending pool holding one reserve, with yield added by hand
#[derive(Debug)]
pub struct InMemoryLendingPool {
    address: Address,
    asset: Address,
    token: Rc<InMemoryToken>,
    positions: RefCell<BTreeMap<Address, Amount>>,
    fail_withdrawals: Cell<bool>,
    last_referral_code: Cell<Option<u16>>,
}

impl InMemoryLendingPool {
    pub fn new(address: Address, asset: Address, token: Rc<InMemoryToken>) -> Self {
        Self {
            address,
            asset,
            token,
            positions: RefCell::new(BTreeMap::new()),
            fail_withdrawals: Cell::new(false),
            last_referral_code: Cell::new(None),
        }
    }

    /// Credit `amount` of yield to `holder`, backed by freshly minted tokens
    pub fn accrue_yield(&self, holder: &Address, amount: Amount) {
        self.token.mint(&self.address, amount);
        let mut positions = self.positions.borrow_mut();
        let position = positions.entry(holder.clone()).or_insert(0);
        *position = position.saturating_add(amount);
    }

    pub fn set_fail_withdrawals(&self, fail: bool) {
        self.fail_withdrawals.set(fail);
    }

    pub fn last_referral_code(&self) -> Option<u16> {
        self.last_referral_code.get()
    }

    fn check_asset(&self, asset: &Address) -> Result<(), CollaboratorError> {
        if *asset != self.asset {
            return Err(CollaboratorError::ProtocolFailed(format!("Unknown reserve {}", asset)));
        }
        Ok(())
    }
}

impl LendingPool for InMemoryLendingPool {
    fn deposit(
        &self,
        caller: &Address,
        asset: &Address,
        amount: Amount,
        on_behalf_of: &Address,
        referral_code: u16,
    ) -> Result<(), CollaboratorError> {
        self.check_asset(asset)?;
        if !self.token.transfer_from(&self.address, caller, &self.address, amount)? {
            return Err(CollaboratorError::ProtocolFailed(
                "Reserve transfer into the pool was rejected".to_string(),
            ));
        }

        let mut positions = self.positions.borrow_mut();
        let position = positions.entry(on_behalf_of.clone()).or_insert(0);
        *position = position.saturating_add(amount);
        self.last_referral_code.set(Some(referral_code));
        Ok(())
    }

    fn withdraw(
        &self,
        caller: &Address,
        asset: &Address,
        amount: Amount,
        to: &Address,
    ) -> Result<Amount, CollaboratorError> {
        self.check_asset(asset)?;
        if self.fail_withdrawals.get() {
            return Err(CollaboratorError::ProtocolFailed("Withdrawals are halted".to_string()));
        }

        let position = self.positions.borrow().get(caller).copied().unwrap_or(0);
        let amount = if amount == WITHDRAW_ALL { position } else { amount };
        if amount > position {
            return Err(CollaboratorError::ProtocolFailed(format!(
                "Position of {} is {}, cannot withdraw {}",
                caller, position, amount
            )));
        }

        if !self.token.transfer(&self.address, to, amount)? {
            return Err(CollaboratorError::ProtocolFailed(
                "Reserve transfer out of the pool was rejected".to_string(),
            ));
        }
        self.positions
            .borrow_mut()
            .insert(caller.clone(), position - amount);
        Ok(amount)
    }

    fn balance_of(&self, asset: &Address, holder: &Address) -> Result<Amount, CollaboratorError> {
        self.check_asset(asset)?;
        Ok(self.positions.borrow().get(holder).copied().unwrap_or(0))
    }

    fn address(&self) -> Address {
        self.address.clone()
    }
}

/// Fixed asset -> yield token mapping
#[derive(Debug, Default)]
pub struct StaticDataProvider {
    reserves: BTreeMap<Address, Address>,
}

impl StaticDataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reserve(mut self, asset: Address, yield_token: Address) -> Self {
        self.reserves.insert(asset, yield_token);
        self
    }
}

impl ReserveDataProvider for StaticDataProvider {
    fn yield_token_address(&self, asset: &Address) -> Result<Address, CollaboratorError> {
        self.reserves
            .get(asset)
            .cloned()
            .ok_or_else(|| CollaboratorError::DataProviderFailed(format!("No reserve for {}", asset)))
    }
}

/// Clock that moves only when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u64>,
}

impl ManualClock {
    pub fn new(now: u64) -> Self {
        Self { now: Cell::new(now) }
    }

    pub fn set(&self, now: u64) {
        self.now.set(now);
    }

    pub fn advance(&self, secs: u64) {
        self.now.set(self.now.get().saturating_add(secs));
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> u64 {
        self.now.get()
    }
}

/// A game wired to in-memory collaborators
pub struct Sandbox {
    pub config: PoolConfig,
    pub token: Rc<InMemoryToken>,
    pub lending_pool: Rc<InMemoryLendingPool>,
    pub data_provider: Rc<StaticDataProvider>,
    pub admin: Rc<OwnablePause>,
    pub clock: Rc<ManualClock>,
    pub game: PoolGame,
}

impl Sandbox {
    pub fn new(config: PoolConfig) -> PoolResult<Self> {
        Self::new_with(config, |_| {})
    }

    /// Like [`Sandbox::new`], but lets the caller swap collaborators before the game is built
    pub fn new_with(config: PoolConfig, customize: impl FnOnce(&mut Collaborators)) -> PoolResult<Self> {
        let addresses = &config.collaborators;
        let token = Rc::new(InMemoryToken::new());
        let lending_pool = Rc::new(InMemoryLendingPool::new(
            addresses.lending_pool.clone(),
            addresses.asset.clone(),
            token.clone(),
        ));
        let data_provider = Rc::new(StaticDataProvider::new().with_reserve(
            addresses.asset.clone(),
            Address::new(format!("a{}", addresses.asset)),
        ));
        let admin = Rc::new(OwnablePause::new(addresses.owner.clone()));
        let clock = Rc::new(ManualClock::new(
            config.game.first_segment_start.unwrap_or(DEFAULT_SIMULATION_START),
        ));

        let mut collaborators = Collaborators {
            token: token.clone(),
            lending_pool: lending_pool.clone(),
            data_provider: data_provider.clone(),
            admin: admin.clone(),
            time: clock.clone(),
        };
        customize(&mut collaborators);
        let game = PoolGame::new(&config, collaborators)?;

        Ok(Self {
            config,
            token,
            lending_pool,
            data_provider,
            admin,
            clock,
            game,
        })
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            token: self.token.clone(),
            lending_pool: self.lending_pool.clone(),
            data_provider: self.data_provider.clone(),
            admin: self.admin.clone(),
            time: self.clock.clone(),
        }
    }

    pub fn pool_address(&self) -> &Address {
        &self.config.collaborators.pool_address
    }

    pub fn owner(&self) -> Address {
        self.config.collaborators.owner.clone()
    }

    /// Mint `amount` to `name` and approve the pool to pull all of it
    pub fn fund_player(&self, name: &str, amount: Amount) -> Address {
        let player = Address::from(name);
        self.token.mint(&player, amount);
        self.token.set_allowance(&player, self.pool_address(), amount);
        player
    }

    pub fn balance(&self, holder: &Address) -> Amount {
        self.token.balance_of(holder).unwrap_or(0)
    }

    pub fn advance_to_segment(&self, segment: Segment) {
        self.clock.set(self.game.clock().segment_start(segment));
    }

    pub fn advance_segments(&self, count: u64) {
        self.clock
            .advance(count.saturating_mul(self.config.game.segment_length_secs));
    }

    /// Add yield to the pool's lending position
    pub fn accrue_yield(&self, amount: Amount) {
        self.lending_pool.accrue_yield(self.pool_address(), amount);
    }
}

/// A scripted run, usually read from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Minted and approved for each player the first time they join
    #[serde(default = "default_starting_balance")]
    pub starting_balance: u64,
    pub steps: Vec<ScenarioStep>,
}

fn default_starting_balance() -> u64 {
    1_000_000_000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum ScenarioStep {
    Join { players: Vec<String> },
    Deposit { players: Vec<String> },
    EarlyWithdraw { players: Vec<String> },
    Withdraw { players: Vec<String> },
    Sweep,
    Redeem,
    AdvanceSegments { count: u64 },
    AccrueYield { amount: u64 },
    Pause,
    Unpause,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step: usize,
    pub action: String,
    pub player: Option<String>,
    pub segment: Segment,
    pub ok: bool,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub outcomes: Vec<StepOutcome>,
    pub events: Vec<GameEvent>,
    pub winners: Vec<Address>,
    pub total_game_principal: Amount,
    pub total_game_interest: Amount,
    pub redeemed: bool,
    pub balances: BTreeMap<Address, Amount>,
}

impl SimulationReport {
    pub fn failures(&self) -> impl Iterator<Item = &StepOutcome> {
        self.outcomes.iter().filter(|o| !o.ok)
    }
}

/// Run every step; failed steps are recorded and the run continues
pub fn run_scenario(sandbox: &Sandbox, scenario: &Scenario) -> SimulationReport {
    let mut outcomes = Vec::new();

    for (index, step) in scenario.steps.iter().enumerate() {
        let mut record = |action: &str, player: Option<&str>, result: PoolResult<String>| {
            let (ok, detail) = match result {
                Ok(detail) => (true, detail),
                Err(e) => (false, e.to_string()),
            };
            outcomes.push(StepOutcome {
                step: index,
                action: action.to_string(),
                player: player.map(str::to_string),
                segment: sandbox.game.current_segment(),
                ok,
                detail,
            });
        };

        match step {
            ScenarioStep::Join { players } => {
                for name in players {
                    let player = Address::from(name.as_str());
                    if sandbox.game.player(&player).is_none() {
                        sandbox.fund_player(name, Amount::from(scenario.starting_balance));
                    }
                    let result = sandbox.game.join(&player).map(|_| "joined".to_string());
                    record("join", Some(name.as_str()), result);
                }
            }
            ScenarioStep::Deposit { players } => {
                for name in players {
                    let result = sandbox
                        .game
                        .make_deposit(&Address::from(name.as_str()))
                        .map(|_| "paid".to_string());
                    record("deposit", Some(name.as_str()), result);
                }
            }
            ScenarioStep::EarlyWithdraw { players } => {
                for name in players {
                    let result = sandbox
                        .game
                        .early_withdraw(&Address::from(name.as_str()))
                        .map(|amount| format!("received {}", amount));
                    record("early-withdraw", Some(name.as_str()), result);
                }
            }
            ScenarioStep::Withdraw { players } => {
                for name in players {
                    let result = sandbox
                        .game
                        .withdraw(&Address::from(name.as_str()))
                        .map(|amount| format!("received {}", amount));
                    record("withdraw", Some(name.as_str()), result);
                }
            }
            ScenarioStep::Sweep => {
                let result = sandbox
                    .game
                    .deposit_into_external_pool()
                    .map(|amount| format!("swept {}", amount));
                record("sweep", None, result);
            }
            ScenarioStep::Redeem => {
                let result = sandbox
                    .game
                    .redeem_from_external_pool()
                    .map(|r| format!("redeemed {} with interest {}", r.total_amount, r.total_interest));
                record("redeem", None, result);
            }
            ScenarioStep::AdvanceSegments { count } => {
                sandbox.advance_segments(*count);
                record("advance-segments", None, Ok(format!("advanced {}", count)));
            }
            ScenarioStep::AccrueYield { amount } => {
                sandbox.accrue_yield(Amount::from(*amount));
                record("accrue-yield", None, Ok(format!("accrued {}", amount)));
            }
            ScenarioStep::Pause => {
                let result = sandbox
                    .admin
                    .pause(&sandbox.owner())
                    .map(|_| "paused".to_string())
                    .map_err(Into::into);
                record("pause", None, result);
            }
            ScenarioStep::Unpause => {
                let result = sandbox
                    .admin
                    .unpause(&sandbox.owner())
                    .map(|_| "unpaused".to_string())
                    .map_err(Into::into);
                record("unpause", None, result);
            }
        }
    }

    SimulationReport {
        outcomes,
        events: sandbox.game.events(),
        winners: sandbox.game.winners(),
        total_game_principal: sandbox.game.total_game_principal(),
        total_game_interest: sandbox.game.total_game_interest(),
        redeemed: sandbox.game.redeemed(),
        balances: sandbox.token.balances(),
    }
}
