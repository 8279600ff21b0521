use cosmwasm_std::{coin, BankMsg, CosmosMsg};

use crate::asset::{Asset, Denom};

#[test]
fn asset_into_msg_builds_bank_send() {
    let asset = Asset::new(Denom::new("upaw").unwrap(), 123123u128.into());
    assert_eq!(
        asset.into_msg("addr0000"),
        CosmosMsg::<cosmwasm_std::Empty>::Bank(BankMsg::Send {
            to_address: "addr0000".to_string(),
            amount: vec![coin(123123u128, "upaw")],
        })
    );
}
