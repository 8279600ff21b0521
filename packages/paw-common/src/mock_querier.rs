use std::collections::HashMap;

use cosmwasm_std::testing::{MockApi, MockQuerier, MockStorage, MOCK_CONTRACT_ADDR};
use cosmwasm_std::{
    from_json, to_json_binary, Coin, OwnedDeps, Querier, QuerierResult, QueryRequest, SystemError,
    SystemResult,
};

use crate::keeper::{PawQuery, ValidatorInfo, ValidatorStatus};

/// Drop-in replacement for `cosmwasm_std::testing::mock_dependencies` that
/// additionally serves `PawQuery` (the staking collaborator's custom query,
/// see `crate::keeper`), mirroring the teacher's `WasmMockQuerier` pattern
/// for simulating cross-module reads in unit tests.
pub fn mock_dependencies(
    contract_balance: &[Coin],
) -> OwnedDeps<MockStorage, MockApi, PawMockQuerier, PawQuery> {
    let base = MockQuerier::new(&[(MOCK_CONTRACT_ADDR, contract_balance)]);
    OwnedDeps {
        storage: MockStorage::default(),
        api: MockApi::default(),
        querier: PawMockQuerier::new(base),
        custom_query_type: Default::default(),
    }
}

pub struct PawMockQuerier {
    base: MockQuerier<PawQuery>,
    validators: HashMap<String, ValidatorInfo>,
}

impl Querier for PawMockQuerier {
    fn raw_query(&self, bin_request: &[u8]) -> QuerierResult {
        let request: QueryRequest<PawQuery> = match from_json(bin_request) {
            Ok(v) => v,
            Err(e) => {
                return SystemResult::Err(SystemError::InvalidRequest {
                    error: format!("Parsing query request: {e}"),
                    request: bin_request.into(),
                });
            }
        };
        self.handle_query(&request)
    }
}

impl PawMockQuerier {
    pub fn new(base: MockQuerier<PawQuery>) -> Self {
        PawMockQuerier {
            base,
            validators: HashMap::new(),
        }
    }

    pub fn with_validators(&mut self, validators: &[ValidatorInfo]) {
        self.validators = validators
            .iter()
            .cloned()
            .map(|v| (v.consensus_addr.clone(), v))
            .collect();
    }

    pub fn handle_query(&self, request: &QueryRequest<PawQuery>) -> QuerierResult {
        match request {
            QueryRequest::Custom(PawQuery::Validator { consensus_addr }) => {
                let found = self.validators.get(consensus_addr).cloned();
                SystemResult::Ok(to_json_binary(&found).into())
            }
            QueryRequest::Custom(PawQuery::BondedValidators {}) => {
                let all: Vec<ValidatorInfo> = self
                    .validators
                    .values()
                    .filter(|v| matches!(v.status, ValidatorStatus::Bonded))
                    .cloned()
                    .collect();
                SystemResult::Ok(to_json_binary(&all).into())
            }
            _ => self.base.handle_query(request),
        }
    }
}
