//! A cw-multi-test harness for the staking collaborator (spec.md §1), used
//! only by the contract crates' `tests/integration.rs` suites: a `Module`
//! impl bound into the `App`'s custom-message/query slot rather than a real
//! chain module, so `MsgSubmitPrice`/`MsgSubmitResult` style end-to-end tests
//! can exercise the `PawQuery::Validator` / `PawMsg::SlashValidator` boundary
//! the same way a validator set and staking keeper would on a live chain.

use std::cell::RefCell;
use std::collections::HashMap;

use cosmwasm_schema::serde::de::DeserializeOwned;
use cosmwasm_std::testing::{MockApi, MockStorage};
use cosmwasm_std::{Addr, Api, Binary, BlockInfo, CustomMsg, CustomQuery, Querier, Storage};
use cw_multi_test::{AppBuilder, AppResponse, BankKeeper, CosmosRouter, Module, WasmKeeper};

use anyhow::{bail, Result as AnyResult};
use paw_common::keeper::{PawMsg, PawQuery, ValidatorInfo, ValidatorStatus};

/// `App` alias wired for PAW's custom message/query pair, the same way
/// `pair_concentrated_inj`'s `InjApp` wires `InjMockModule` in: the three
/// non-custom slots (stake, distribution, ibc/gov) keep cw-multi-test's
/// defaults since nothing in this spec exercises them directly.
pub type PawApp = cw_multi_test::App<
    BankKeeper,
    MockApi,
    MockStorage,
    PawStakingModule,
    WasmKeeper<PawMsg, PawQuery>,
>;

/// In-memory validator set standing in for `StakingKeeper` (spec.md §1:
/// `GetValidator`, `IterateBondedValidators`, `Slash`, `Jail`). Slashes and
/// jails are recorded rather than applied to a real bonded-power ledger —
/// tests assert on `slashes()`/`jailed()` the way they'd assert on emitted
/// events from a real `Slash` call.
#[derive(Default)]
pub struct PawStakingModule {
    validators: RefCell<HashMap<String, ValidatorInfo>>,
    slashes: RefCell<Vec<(String, cosmwasm_std::Decimal)>>,
    jailed: RefCell<Vec<String>>,
}

impl PawStakingModule {
    pub fn new(validators: &[ValidatorInfo]) -> Self {
        let map = validators
            .iter()
            .cloned()
            .map(|v| (v.consensus_addr.clone(), v))
            .collect();
        PawStakingModule {
            validators: RefCell::new(map),
            slashes: RefCell::new(vec![]),
            jailed: RefCell::new(vec![]),
        }
    }

    pub fn slashes(&self) -> Vec<(String, cosmwasm_std::Decimal)> {
        self.slashes.borrow().clone()
    }

    pub fn jailed(&self) -> Vec<String> {
        self.jailed.borrow().clone()
    }
}

impl Module for PawStakingModule {
    type ExecT = PawMsg;
    type QueryT = PawQuery;
    type SudoT = cosmwasm_std::Empty;

    fn execute<ExecC, QueryC>(
        &self,
        _api: &dyn Api,
        _storage: &mut dyn Storage,
        _router: &dyn CosmosRouter<ExecC = ExecC, QueryC = QueryC>,
        _block: &BlockInfo,
        _sender: Addr,
        msg: Self::ExecT,
    ) -> AnyResult<AppResponse>
    where
        ExecC: CustomMsg + DeserializeOwned + 'static,
        QueryC: CustomQuery + DeserializeOwned + 'static,
    {
        match msg {
            PawMsg::SlashValidator {
                consensus_addr,
                fraction,
            } => {
                if let Some(v) = self.validators.borrow_mut().get_mut(&consensus_addr) {
                    v.power = ((v.power as u128)
                        .saturating_sub((v.power as u128 * fraction.atomics().u128())
                            / cosmwasm_std::Decimal::one().atomics().u128()))
                        as u64;
                }
                self.slashes.borrow_mut().push((consensus_addr, fraction));
                Ok(AppResponse::default())
            }
            PawMsg::JailValidator { consensus_addr } => {
                if let Some(v) = self.validators.borrow_mut().get_mut(&consensus_addr) {
                    v.status = ValidatorStatus::Jailed;
                }
                self.jailed.borrow_mut().push(consensus_addr);
                Ok(AppResponse::default())
            }
        }
    }

    fn query(
        &self,
        _api: &dyn Api,
        _storage: &dyn Storage,
        _querier: &dyn Querier,
        _block: &BlockInfo,
        request: Self::QueryT,
    ) -> AnyResult<Binary> {
        match request {
            PawQuery::Validator { consensus_addr } => {
                let found = self.validators.borrow().get(&consensus_addr).cloned();
                Ok(cosmwasm_std::to_json_binary(&found)?)
            }
            PawQuery::BondedValidators {} => {
                let all: Vec<ValidatorInfo> = self
                    .validators
                    .borrow()
                    .values()
                    .filter(|v| matches!(v.status, ValidatorStatus::Bonded))
                    .cloned()
                    .collect();
                Ok(cosmwasm_std::to_json_binary(&all)?)
            }
        }
    }

    fn sudo<ExecC, QueryC>(
        &self,
        _api: &dyn Api,
        _storage: &mut dyn Storage,
        _router: &dyn CosmosRouter<ExecC = ExecC, QueryC = QueryC>,
        _block: &BlockInfo,
        _msg: Self::SudoT,
    ) -> AnyResult<AppResponse>
    where
        ExecC: CustomMsg + DeserializeOwned + 'static,
        QueryC: CustomQuery + DeserializeOwned + 'static,
    {
        bail!("sudo not supported by PawStakingModule")
    }
}

/// Builds a `PawApp` with the given bonded validator set already registered
/// with the mock staking collaborator.
pub fn mock_app(validators: &[ValidatorInfo]) -> PawApp {
    AppBuilder::new()
        .with_custom(PawStakingModule::new(validators))
        .build(|_, _, _| {})
}

pub fn bonded(consensus_addr: &str, power: u64) -> ValidatorInfo {
    ValidatorInfo {
        consensus_addr: consensus_addr.to_string(),
        power,
        status: ValidatorStatus::Bonded,
    }
}
