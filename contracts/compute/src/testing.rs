use cosmwasm_std::testing::{mock_env, mock_info};
use cosmwasm_std::{coins, Binary, Uint128};

use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;

use paw_common::keeper::{PawQuery, ValidatorInfo, ValidatorStatus};
use paw_common::mock_querier::mock_dependencies;

use crate::contract::{execute, instantiate, query};
use crate::error::ContractError;
use crate::merkle;
use crate::msg::{ExecuteMsg, InstantiateMsg, ParamsMsg, QueryMsg};
use crate::state::{Provider, Request, RequestStatus};

const OWNER: &str = "paw1owner";
const STAKE_DENOM: &str = "upaw";
const FEE_DENOM: &str = "uusdt";

fn instantiate_compute(deps: cosmwasm_std::DepsMut<PawQuery>, params: Option<ParamsMsg>) {
    instantiate(
        deps,
        mock_env(),
        mock_info(OWNER, &[]),
        InstantiateMsg {
            owner: OWNER.to_string(),
            params,
        },
    )
    .unwrap();
}

/// A deterministic secp256k1 keypair, used so result-submission tests don't
/// depend on an RNG: the same fixed scalar always signs the same way.
fn signing_key() -> SigningKey {
    SigningKey::from_slice(&[0x11u8; 32]).unwrap()
}

fn compressed_pubkey(key: &SigningKey) -> Binary {
    let verifying: VerifyingKey = VerifyingKey::from(key);
    Binary::from(verifying.to_encoded_point(true).as_bytes())
}

/// Builds the `(requestId ∥ resultHash ∥ nonce ∥ timestamp)` message and
/// signs its sha256 digest, mirroring `defense::verify_result_submission`.
fn sign_result(
    key: &SigningKey,
    request_id: u64,
    result_hash: &[u8],
    nonce: &str,
    timestamp: u64,
) -> Binary {
    let mut message = Vec::new();
    message.extend_from_slice(&request_id.to_be_bytes());
    message.extend_from_slice(result_hash);
    message.extend_from_slice(nonce.as_bytes());
    message.extend_from_slice(&timestamp.to_be_bytes());
    let digest = merkle::leaf_hash(&message);
    let signature: Signature = key.sign_prehash(&digest).unwrap();
    Binary::from(signature.to_bytes().as_slice())
}

fn register_provider(
    deps: cosmwasm_std::DepsMut<PawQuery>,
    sender: &str,
    pubkey: Binary,
    stake: u128,
) {
    execute(
        deps,
        mock_env(),
        mock_info(sender, &coins(stake, STAKE_DENOM)),
        ExecuteMsg::RegisterProvider {
            endpoint: "https://example.test".to_string(),
            pubkey,
            capabilities: 0b1,
        },
    )
    .unwrap();
}

fn validator(addr: &str, power: u64) -> ValidatorInfo {
    ValidatorInfo {
        consensus_addr: addr.to_string(),
        power,
        status: ValidatorStatus::Bonded,
    }
}

#[test]
fn register_provider_rejects_stake_below_minimum() {
    let mut deps = mock_dependencies(&[]);
    instantiate_compute(deps.as_mut(), None);

    let err = execute(
        deps.as_mut(),
        mock_env(),
        mock_info("provider1", &coins(100, STAKE_DENOM)),
        ExecuteMsg::RegisterProvider {
            endpoint: "https://example.test".to_string(),
            pubkey: Binary::from(vec![2u8; 33]),
            capabilities: 1,
        },
    )
    .unwrap_err();
    assert!(matches!(err, ContractError::InsufficientStake {}));
}

#[test]
fn register_provider_rejects_duplicate_registration() {
    let mut deps = mock_dependencies(&[]);
    instantiate_compute(deps.as_mut(), None);
    register_provider(deps.as_mut(), "provider1", Binary::from(vec![2u8; 33]), 1_000_000);

    let err = execute(
        deps.as_mut(),
        mock_env(),
        mock_info("provider1", &coins(1_000_000, STAKE_DENOM)),
        ExecuteMsg::RegisterProvider {
            endpoint: "https://example.test".to_string(),
            pubkey: Binary::from(vec![2u8; 33]),
            capabilities: 1,
        },
    )
    .unwrap_err();
    assert!(matches!(err, ContractError::Unauthorized {}));
}

/// `RequestCompute` escrows `maxPrice`, matches a capability-matching
/// provider via the matcher (`defense::match_provider`, covered directly in
/// `defense::tests` for the reputation-ranking rule) and assigns the request
/// to them in the same call (spec.md §4.4 "chooses provider via matcher").
#[test]
fn request_compute_assigns_capable_provider_and_escrows_funds() {
    let mut deps = mock_dependencies(&[]);
    instantiate_compute(deps.as_mut(), None);
    register_provider(deps.as_mut(), "provider1", Binary::from(vec![2u8; 33]), 1_000_000);

    let res = execute(
        deps.as_mut(),
        mock_env(),
        mock_info("requester1", &coins(500, FEE_DENOM)),
        ExecuteMsg::RequestCompute {
            payload: Binary::from(b"job".to_vec()),
            max_price: Uint128::new(500),
            deadline: mock_env().block.time.seconds() + 1_000,
            required_capabilities: 0b1,
            result_commitment: Binary::from(merkle::leaf_hash(b"expected-result").to_vec()),
        },
    )
    .unwrap();
    assert!(res
        .attributes
        .iter()
        .any(|a| a.key == "action" && a.value == "request_compute"));

    let request: Request = cosmwasm_std::from_json(
        query(deps.as_ref(), mock_env(), QueryMsg::Request { request_id: 1 }).unwrap(),
    )
    .unwrap();
    assert!(matches!(request.status, RequestStatus::Assigned));
    assert_eq!(request.escrow, Uint128::new(500));
}

#[test]
fn request_compute_rejects_when_no_provider_matches_capabilities() {
    let mut deps = mock_dependencies(&[]);
    instantiate_compute(deps.as_mut(), None);
    register_provider(deps.as_mut(), "provider1", Binary::from(vec![2u8; 33]), 1_000_000);

    let err = execute(
        deps.as_mut(),
        mock_env(),
        mock_info("requester1", &coins(500, FEE_DENOM)),
        ExecuteMsg::RequestCompute {
            payload: Binary::from(b"job".to_vec()),
            max_price: Uint128::new(500),
            deadline: mock_env().block.time.seconds() + 1_000,
            required_capabilities: 0b10,
            result_commitment: Binary::from(merkle::leaf_hash(b"x").to_vec()),
        },
    )
    .unwrap_err();
    assert!(matches!(err, ContractError::NoProviderAvailable {}));
}

/// Full happy path: a registered provider submits a correctly signed result
/// whose single-leaf merkle proof (empty sibling list) folds directly to the
/// commitment pinned at `RequestCompute` time; the request completes and the
/// provider is paid.
#[test]
fn submit_result_with_valid_signature_pays_provider_and_completes_request() {
    let mut deps = mock_dependencies(&[]);
    instantiate_compute(deps.as_mut(), None);

    let key = signing_key();
    let pubkey = compressed_pubkey(&key);
    register_provider(deps.as_mut(), "provider1", pubkey, 1_000_000);

    let result_hash = b"deterministic-result".to_vec();
    let leaf = merkle::leaf_hash(&result_hash);

    let env = mock_env();
    let deadline = env.block.time.seconds() + 1_000;
    execute(
        deps.as_mut(),
        env.clone(),
        mock_info("requester1", &coins(500, FEE_DENOM)),
        ExecuteMsg::RequestCompute {
            payload: Binary::from(b"job".to_vec()),
            max_price: Uint128::new(500),
            deadline,
            required_capabilities: 0b1,
            result_commitment: Binary::from(leaf.to_vec()),
        },
    )
    .unwrap();

    let timestamp = env.block.time.seconds();
    let signature = sign_result(&key, 1, &result_hash, "nonce-1", timestamp);

    let res = execute(
        deps.as_mut(),
        env.clone(),
        mock_info("provider1", &[]),
        ExecuteMsg::SubmitResult {
            request_id: 1,
            result_hash: Binary::from(result_hash.clone()),
            signature,
            merkle_proof: vec![],
            nonce: "nonce-1".to_string(),
            timestamp,
        },
    )
    .unwrap();
    assert_eq!(res.messages.len(), 1);

    let request: Request = cosmwasm_std::from_json(
        query(deps.as_ref(), env, QueryMsg::Request { request_id: 1 }).unwrap(),
    )
    .unwrap();
    assert!(matches!(request.status, RequestStatus::Completed));

    let provider: Provider = cosmwasm_std::from_json(
        query(
            deps.as_ref(),
            mock_env(),
            QueryMsg::Provider {
                address: "provider1".to_string(),
            },
        )
        .unwrap(),
    )
    .unwrap();
    assert_eq!(provider.reputation, 1);
}

#[test]
fn submit_result_rejects_tampered_signature() {
    let mut deps = mock_dependencies(&[]);
    instantiate_compute(deps.as_mut(), None);

    let key = signing_key();
    let pubkey = compressed_pubkey(&key);
    register_provider(deps.as_mut(), "provider1", pubkey, 1_000_000);

    let result_hash = b"deterministic-result".to_vec();
    let leaf = merkle::leaf_hash(&result_hash);
    let env = mock_env();
    let deadline = env.block.time.seconds() + 1_000;
    execute(
        deps.as_mut(),
        env.clone(),
        mock_info("requester1", &coins(500, FEE_DENOM)),
        ExecuteMsg::RequestCompute {
            payload: Binary::from(b"job".to_vec()),
            max_price: Uint128::new(500),
            deadline,
            required_capabilities: 0b1,
            result_commitment: Binary::from(leaf.to_vec()),
        },
    )
    .unwrap();

    let timestamp = env.block.time.seconds();
    // Sign a different message than the one submitted.
    let signature = sign_result(&key, 1, b"other-result", "nonce-1", timestamp);

    let err = execute(
        deps.as_mut(),
        env,
        mock_info("provider1", &[]),
        ExecuteMsg::SubmitResult {
            request_id: 1,
            result_hash: Binary::from(result_hash),
            signature,
            merkle_proof: vec![],
            nonce: "nonce-1".to_string(),
            timestamp,
        },
    )
    .unwrap_err();
    assert!(matches!(err, ContractError::InvalidSignature {}));
}

#[test]
fn submit_result_rejects_replayed_nonce() {
    let mut deps = mock_dependencies(&[]);
    instantiate_compute(deps.as_mut(), None);

    let key = signing_key();
    let pubkey = compressed_pubkey(&key);
    register_provider(deps.as_mut(), "provider1", pubkey, 1_000_000);

    let env = mock_env();
    for i in 1..=2u64 {
        let result_hash = format!("result-{i}").into_bytes();
        let leaf = merkle::leaf_hash(&result_hash);
        execute(
            deps.as_mut(),
            env.clone(),
            mock_info("requester1", &coins(500, FEE_DENOM)),
            ExecuteMsg::RequestCompute {
                payload: Binary::from(b"job".to_vec()),
                max_price: Uint128::new(500),
                deadline: env.block.time.seconds() + 1_000,
                required_capabilities: 0b1,
                result_commitment: Binary::from(leaf.to_vec()),
            },
        )
        .unwrap();
    }

    let timestamp = env.block.time.seconds();
    let result_hash_1 = b"result-1".to_vec();
    let signature = sign_result(&key, 1, &result_hash_1, "dup-nonce", timestamp);
    execute(
        deps.as_mut(),
        env.clone(),
        mock_info("provider1", &[]),
        ExecuteMsg::SubmitResult {
            request_id: 1,
            result_hash: Binary::from(result_hash_1),
            signature,
            merkle_proof: vec![],
            nonce: "dup-nonce".to_string(),
            timestamp,
        },
    )
    .unwrap();

    let result_hash_2 = b"result-2".to_vec();
    let signature_2 = sign_result(&key, 2, &result_hash_2, "dup-nonce", timestamp);
    let err = execute(
        deps.as_mut(),
        env,
        mock_info("provider1", &[]),
        ExecuteMsg::SubmitResult {
            request_id: 2,
            result_hash: Binary::from(result_hash_2),
            signature: signature_2,
            merkle_proof: vec![],
            nonce: "dup-nonce".to_string(),
            timestamp,
        },
    )
    .unwrap_err();
    assert!(matches!(err, ContractError::ProofReplay {}));
}

/// S5: an assigned request whose deadline passes with no result is swept,
/// refunds the requester and penalizes the assigned provider's reputation.
#[test]
fn sweep_timeouts_refunds_requester_and_penalizes_provider() {
    let mut deps = mock_dependencies(&[]);
    instantiate_compute(deps.as_mut(), None);
    register_provider(deps.as_mut(), "provider1", Binary::from(vec![2u8; 33]), 1_000_000);

    let mut env = mock_env();
    let deadline = env.block.time.seconds() + 100;
    execute(
        deps.as_mut(),
        env.clone(),
        mock_info("requester1", &coins(500, FEE_DENOM)),
        ExecuteMsg::RequestCompute {
            payload: Binary::from(b"job".to_vec()),
            max_price: Uint128::new(500),
            deadline,
            required_capabilities: 0b1,
            result_commitment: Binary::from(merkle::leaf_hash(b"never-submitted").to_vec()),
        },
    )
    .unwrap();

    env.block.time = env.block.time.plus_seconds(200);
    let res = execute(
        deps.as_mut(),
        env.clone(),
        mock_info("anyone", &[]),
        ExecuteMsg::SweepTimeouts {},
    )
    .unwrap();
    assert_eq!(res.messages.len(), 1);
    assert!(res
        .attributes
        .iter()
        .any(|a| a.key == "timed_out_count" && a.value == "1"));

    let request: Request = cosmwasm_std::from_json(
        query(deps.as_ref(), env, QueryMsg::Request { request_id: 1 }).unwrap(),
    )
    .unwrap();
    assert!(matches!(request.status, RequestStatus::TimedOut));

    let provider: Provider = cosmwasm_std::from_json(
        query(
            deps.as_ref(),
            mock_env(),
            QueryMsg::Provider {
                address: "provider1".to_string(),
            },
        )
        .unwrap(),
    )
    .unwrap();
    assert_eq!(provider.reputation, -5);
}

/// A late `SubmitResult` after the sweep has already timed the request out
/// hits the already-finalized guard rather than double-paying the provider.
#[test]
fn submit_result_after_sweep_fails_already_finalized() {
    let mut deps = mock_dependencies(&[]);
    instantiate_compute(deps.as_mut(), None);
    let key = signing_key();
    let pubkey = compressed_pubkey(&key);
    register_provider(deps.as_mut(), "provider1", pubkey.clone(), 1_000_000);

    let mut env = mock_env();
    let deadline = env.block.time.seconds() + 100;
    let result_hash = b"late-result".to_vec();
    let leaf = merkle::leaf_hash(&result_hash);
    execute(
        deps.as_mut(),
        env.clone(),
        mock_info("requester1", &coins(500, FEE_DENOM)),
        ExecuteMsg::RequestCompute {
            payload: Binary::from(b"job".to_vec()),
            max_price: Uint128::new(500),
            deadline,
            required_capabilities: 0b1,
            result_commitment: Binary::from(leaf.to_vec()),
        },
    )
    .unwrap();

    env.block.time = env.block.time.plus_seconds(200);
    execute(
        deps.as_mut(),
        env.clone(),
        mock_info("anyone", &[]),
        ExecuteMsg::SweepTimeouts {},
    )
    .unwrap();

    let timestamp = env.block.time.seconds();
    let signature = sign_result(&key, 1, &result_hash, "late-nonce", timestamp);
    let err = execute(
        deps.as_mut(),
        env,
        mock_info("provider1", &[]),
        ExecuteMsg::SubmitResult {
            request_id: 1,
            result_hash: Binary::from(result_hash),
            signature,
            merkle_proof: vec![],
            nonce: "late-nonce".to_string(),
            timestamp,
        },
    )
    .unwrap_err();
    assert!(matches!(err, ContractError::AlreadyFinalized {}));
}

/// A validator disputes a completed result; stake-weighted votes against the
/// provider outweigh votes for it, so resolution slashes the provider and
/// refunds the requester.
#[test]
fn dispute_resolution_slashes_provider_when_votes_favor_challenger() {
    let mut deps = mock_dependencies(&[]);
    deps.querier
        .with_validators(&[validator("val1", 100), validator("val2", 200)]);
    instantiate_compute(deps.as_mut(), None);

    let key = signing_key();
    let pubkey = compressed_pubkey(&key);
    register_provider(deps.as_mut(), "provider1", pubkey, 1_000_000);

    let env = mock_env();
    let result_hash = b"disputed-result".to_vec();
    let leaf = merkle::leaf_hash(&result_hash);
    execute(
        deps.as_mut(),
        env.clone(),
        mock_info("requester1", &coins(500, FEE_DENOM)),
        ExecuteMsg::RequestCompute {
            payload: Binary::from(b"job".to_vec()),
            max_price: Uint128::new(500),
            deadline: env.block.time.seconds() + 1_000,
            required_capabilities: 0b1,
            result_commitment: Binary::from(leaf.to_vec()),
        },
    )
    .unwrap();

    let timestamp = env.block.time.seconds();
    let signature = sign_result(&key, 1, &result_hash, "n1", timestamp);
    execute(
        deps.as_mut(),
        env.clone(),
        mock_info("provider1", &[]),
        ExecuteMsg::SubmitResult {
            request_id: 1,
            result_hash: Binary::from(result_hash),
            signature,
            merkle_proof: vec![],
            nonce: "n1".to_string(),
            timestamp,
        },
    )
    .unwrap();

    execute(
        deps.as_mut(),
        env.clone(),
        mock_info("val1", &[]),
        ExecuteMsg::OpenDispute {
            request_id: 1,
            evidence: "bad output".to_string(),
        },
    )
    .unwrap();

    execute(
        deps.as_mut(),
        env.clone(),
        mock_info("val2", &[]),
        ExecuteMsg::VoteDispute {
            dispute_id: 1,
            for_provider: false,
        },
    )
    .unwrap();

    let mut env_later = env;
    env_later.block.height += 20_000;
    let res = execute(
        deps.as_mut(),
        env_later,
        mock_info("anyone", &[]),
        ExecuteMsg::ResolveDispute { dispute_id: 1 },
    )
    .unwrap();

    assert_eq!(res.messages.len(), 2); // slash + refund
    assert!(res
        .events
        .iter()
        .any(|e| e.ty == "dispute_resolved"
            && e.attributes
                .iter()
                .any(|a| a.key == "provider_wins" && a.value == "false")));

    let provider: Provider = cosmwasm_std::from_json(
        query(
            deps.as_ref(),
            mock_env(),
            QueryMsg::Provider {
                address: "provider1".to_string(),
            },
        )
        .unwrap(),
    )
    .unwrap();
    assert!(provider.reputation < 0);
}

#[test]
fn open_dispute_rejects_non_validator_challenger() {
    let mut deps = mock_dependencies(&[]);
    instantiate_compute(deps.as_mut(), None);

    let key = signing_key();
    let pubkey = compressed_pubkey(&key);
    register_provider(deps.as_mut(), "provider1", pubkey, 1_000_000);

    let env = mock_env();
    let result_hash = b"result".to_vec();
    let leaf = merkle::leaf_hash(&result_hash);
    execute(
        deps.as_mut(),
        env.clone(),
        mock_info("requester1", &coins(500, FEE_DENOM)),
        ExecuteMsg::RequestCompute {
            payload: Binary::from(b"job".to_vec()),
            max_price: Uint128::new(500),
            deadline: env.block.time.seconds() + 1_000,
            required_capabilities: 0b1,
            result_commitment: Binary::from(leaf.to_vec()),
        },
    )
    .unwrap();
    let timestamp = env.block.time.seconds();
    let signature = sign_result(&key, 1, &result_hash, "n1", timestamp);
    execute(
        deps.as_mut(),
        env.clone(),
        mock_info("provider1", &[]),
        ExecuteMsg::SubmitResult {
            request_id: 1,
            result_hash: Binary::from(result_hash),
            signature,
            merkle_proof: vec![],
            nonce: "n1".to_string(),
            timestamp,
        },
    )
    .unwrap();

    let err = execute(
        deps.as_mut(),
        env,
        mock_info("not-a-validator", &[]),
        ExecuteMsg::OpenDispute {
            request_id: 1,
            evidence: "bad output".to_string(),
        },
    )
    .unwrap_err();
    assert!(matches!(err, ContractError::NotValidator {}));
}

#[test]
fn invariant_reentrancy_guard_rejects_nested_entry() {
    use cosmwasm_std::testing::MockStorage;
    use paw_common::guard::ReentrancyGuard;

    let guard = ReentrancyGuard::new("compute_reentrancy_lock");
    let mut storage = MockStorage::new();
    guard.enter(&mut storage, ContractError::Reentrancy {}).unwrap();
    let err = guard.enter(&mut storage, ContractError::Reentrancy {}).unwrap_err();
    assert!(matches!(err, ContractError::Reentrancy {}));
    guard.exit(&mut storage).unwrap();
    assert!(guard.enter(&mut storage, ContractError::Reentrancy {}).is_ok());
}
