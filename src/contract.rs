use cosmwasm_std::{
    coins, entry_point, from_binary, to_binary, Addr, BankMsg, Binary, CosmosMsg, Deps, DepsMut,
    Env, MessageInfo, QueryResponse, Response, StdError, StdResult, Storage, Uint128, WasmMsg,
};
use secret_toolkit::storage::Item;
use secret_toolkit::utils::Query;
use secret_toolkit::{snip20, snip721};

use crate::msg::{
    BoxBalanceResponse, BoxTypeInfo, BoxTypesResponse, ExecuteMsg, FactoryQueryMsg,
    FeePerUnitResponse, InstantiateMsg, InventoryResponse, OpenPriceResponse, OpenRequestInfo,
    OpenRequestResponse, OracleExecuteMsg, OracleFeeResponse, OracleQueryMsg, PriceFeedQueryMsg, QueryMsg,
    RateResponse, ReceiveMsg, RewardsResponse, Snip1155Action, Snip1155ExecuteMsg, StateResponse,
    SuppliersResponse, TokenDef, TokensResponse,
};
use crate::state::{
    Config, OpenRequest, RequestStatus, RewardEntry, State, TokenKind, BLOCK_SIZE, BOX_BALANCES,
    BOX_SUPPLY, BOX_TYPE_LIST, CONFIG, ID_ENTRIES, MINTERS, MIN_CALLBACK_GAS, OPENER_REQUEST,
    PAUSERS, RATE_SCALE, REQUESTS, REWARDS, STATE, SUPPLIERS, TOKENS, TOKEN_LIST,
};
use crate::{allocation, inventory};

#[entry_point]
pub fn instantiate(
    deps: DepsMut,
    _env: Env,
    _info: MessageInfo,
    msg: InstantiateMsg,
) -> StdResult<Response> {
    let config = Config {
        admin: deps.api.addr_validate(&msg.admin)?,
        factory: deps.api.addr_validate(&msg.factory)?,
        factory_hash: msg.factory_hash,
        oracle: deps.api.addr_validate(&msg.oracle)?,
        oracle_hash: msg.oracle_hash,
        price_feed: deps.api.addr_validate(&msg.price_feed)?,
        price_feed_hash: msg.price_feed_hash,
        payment_denom: msg.payment_denom,
    };
    CONFIG.save(deps.storage, &config)?;

    let state = State {
        units_supply: Uint128::zero(),
        units_requested: Uint128::zero(),
        units_minted: Uint128::zero(),
        next_request_id: 1,
        paused: false,
        emergency_mode: false,
    };
    STATE.save(deps.storage, &state)?;

    TOKEN_LIST.save(deps.storage, &vec![])?;
    SUPPLIERS.save(deps.storage, &vec![])?;
    MINTERS.save(deps.storage, &vec![])?;
    PAUSERS.save(deps.storage, &vec![])?;
    BOX_TYPE_LIST.save(deps.storage, &vec![])?;

    Ok(Response::new()
        .add_attribute("action", "instantiate")
        .add_attribute("admin", config.admin.to_string()))
}

#[entry_point]
pub fn execute(deps: DepsMut, env: Env, info: MessageInfo, msg: ExecuteMsg) -> StdResult<Response> {
    match msg {
        ExecuteMsg::AddTokens { tokens } => execute_add_tokens(deps, info, tokens),
        ExecuteMsg::AddSuppliers { addresses } => {
            execute_update_role(deps, info, &SUPPLIERS, addresses, true, "supplier")
        }
        ExecuteMsg::RemoveSuppliers { addresses } => {
            execute_update_role(deps, info, &SUPPLIERS, addresses, false, "supplier")
        }
        ExecuteMsg::AddMinters { addresses } => {
            execute_update_role(deps, info, &MINTERS, addresses, true, "minter")
        }
        ExecuteMsg::RemoveMinters { addresses } => {
            execute_update_role(deps, info, &MINTERS, addresses, false, "minter")
        }
        ExecuteMsg::AddPausers { addresses } => {
            execute_update_role(deps, info, &PAUSERS, addresses, true, "pauser")
        }
        ExecuteMsg::RemovePausers { addresses } => {
            execute_update_role(deps, info, &PAUSERS, addresses, false, "pauser")
        }
        ExecuteMsg::SetAmountsPerUnit {
            tokens,
            token_ids,
            amounts_per_unit,
        } => execute_set_amounts_per_unit(deps, info, tokens, token_ids, amounts_per_unit),
        ExecuteMsg::Mint {
            recipient,
            box_type,
            amount,
        } => execute_mint(deps, info, recipient, vec![box_type], vec![amount]),
        ExecuteMsg::MintBatch {
            recipient,
            box_types,
            amounts,
        } => execute_mint(deps, info, recipient, box_types, amounts),
        ExecuteMsg::Pause {} => execute_set_paused(deps, info, true),
        ExecuteMsg::Unpause {} => execute_set_paused(deps, info, false),
        ExecuteMsg::Withdraw { to } => execute_withdraw(deps, env, info, to),
        ExecuteMsg::EmergencyWithdraw {
            kind,
            token,
            code_hash,
            to,
            token_ids,
            amounts,
        } => execute_emergency_withdraw(deps, env, info, kind, token, code_hash, to, token_ids, amounts),
        ExecuteMsg::Open {
            callback_gas,
            box_types,
            amounts,
        } => execute_open(deps, env, info, callback_gas, box_types, amounts),
        ExecuteMsg::Fulfill {
            request_id,
            randomness,
        } => execute_fulfill(deps, env, info, request_id, randomness),
        ExecuteMsg::RecoverBoxes { opener } => execute_recover_boxes(deps, info, opener),
        ExecuteMsg::ClaimRewards { opener } => execute_claim_rewards(deps, env, info, opener),
        ExecuteMsg::Receive {
            sender: _,
            from,
            amount,
            msg: _,
            memo: _,
        } => execute_receive_snip20(deps, info, from, amount),
        ExecuteMsg::ReceiveNft {
            sender,
            token_id,
            msg: _,
        } => execute_receive_nft(deps, info, sender, vec![token_id]),
        ExecuteMsg::BatchReceiveNft {
            sender: _,
            from,
            token_ids,
            msg: _,
        } => execute_receive_nft(deps, info, from, token_ids),
        ExecuteMsg::Snip1155Receive {
            sender: _,
            token_id,
            from,
            amount,
            memo: _,
            msg,
        } => execute_receive_snip1155(
            deps,
            info,
            from,
            vec![Snip1155Action { token_id, amount }],
            msg,
        ),
        ExecuteMsg::Snip1155BatchReceive {
            sender: _,
            from,
            actions,
            msg,
        } => execute_receive_snip1155(deps, info, from, actions, msg),
    }
}

fn end_of_service() -> StdError {
    StdError::generic_err("end of service")
}

fn require_admin(config: &Config, sender: &Addr) -> StdResult<()> {
    if *sender != config.admin {
        return Err(StdError::generic_err("unauthorized: admin only"));
    }
    Ok(())
}

fn require_role(
    storage: &dyn Storage,
    item: &Item<Vec<Addr>>,
    sender: &Addr,
    role: &str,
) -> StdResult<()> {
    if !item.load(storage)?.contains(sender) {
        return Err(StdError::generic_err(format!("unauthorized: {} only", role)));
    }
    Ok(())
}

fn execute_update_role(
    deps: DepsMut,
    info: MessageInfo,
    item: &Item<Vec<Addr>>,
    addresses: Vec<String>,
    add: bool,
    role: &str,
) -> StdResult<Response> {
    let config = CONFIG.load(deps.storage)?;
    require_admin(&config, &info.sender)?;

    let mut members = item.load(deps.storage)?;
    let action = if add { "add" } else { "remove" };
    let mut resp = Response::new().add_attribute("action", format!("{}_{}s", action, role));
    for address in addresses {
        let addr = deps.api.addr_validate(&address)?;
        let present = members.contains(&addr);
        if add && !present {
            members.push(addr.clone());
            resp = resp.add_attribute(format!("{}_added", role), addr.to_string());
        } else if !add && present {
            members.retain(|member| *member != addr);
            resp = resp.add_attribute(format!("{}_removed", role), addr.to_string());
        }
    }
    item.save(deps.storage, &members)?;
    Ok(resp)
}

fn execute_add_tokens(
    deps: DepsMut,
    info: MessageInfo,
    tokens: Vec<TokenDef>,
) -> StdResult<Response> {
    let config = CONFIG.load(deps.storage)?;
    require_admin(&config, &info.sender)?;
    let state = STATE.load(deps.storage)?;
    if state.emergency_mode {
        return Err(end_of_service());
    }

    let mut list = TOKEN_LIST.load(deps.storage)?;
    let mut resp = Response::new().add_attribute("action", "add_tokens");
    for def in tokens {
        let addr = deps.api.addr_validate(&def.address)?;
        if TOKENS.get(deps.storage, &addr).is_some() {
            continue;
        }
        let entry = RewardEntry {
            token: addr.clone(),
            code_hash: def.code_hash,
            kind: TokenKind::Unset,
            amount_per_unit: Uint128::zero(),
            rate_configured: false,
            balance: Uint128::zero(),
            items: vec![],
            ids: vec![],
            units: Uint128::zero(),
        };
        TOKENS.insert(deps.storage, &addr, &entry)?;
        list.push(addr.clone());
        resp = resp.add_attribute("token_added", addr.to_string());
    }
    TOKEN_LIST.save(deps.storage, &list)?;
    Ok(resp)
}

fn execute_set_amounts_per_unit(
    deps: DepsMut,
    info: MessageInfo,
    tokens: Vec<String>,
    token_ids: Vec<Option<String>>,
    amounts_per_unit: Vec<Uint128>,
) -> StdResult<Response> {
    let config = CONFIG.load(deps.storage)?;
    require_admin(&config, &info.sender)?;
    let mut state = STATE.load(deps.storage)?;
    if state.emergency_mode {
        return Err(end_of_service());
    }
    if tokens.len() != token_ids.len() || tokens.len() != amounts_per_unit.len() {
        return Err(StdError::generic_err("length mismatch"));
    }

    let mut changes = Vec::with_capacity(tokens.len());
    for ((token, token_id), amount_per_unit) in
        tokens.iter().zip(token_ids).zip(amounts_per_unit)
    {
        changes.push(inventory::RateChange {
            token: deps.api.addr_validate(token)?,
            token_id,
            amount_per_unit,
        });
    }
    let entries = changes.len();
    inventory::apply_rate_changes(deps.storage, &mut state, changes)?;
    STATE.save(deps.storage, &state)?;

    Ok(Response::new()
        .add_attribute("action", "set_amounts_per_unit")
        .add_attribute("entries", entries.to_string())
        .add_attribute("units_supply", state.units_supply.to_string()))
}

// Box ledger. Burns and mints stage balances in memory so a batch either
// lands fully or not at all.

fn mint_boxes(
    storage: &mut dyn Storage,
    state: &mut State,
    recipient: &Addr,
    box_types: &[u64],
    amounts: &[Uint128],
    count_minted: bool,
) -> StdResult<Uint128> {
    if box_types.len() != amounts.len() {
        return Err(StdError::generic_err("length mismatch"));
    }
    let mut balances: Vec<(u64, Uint128)> = Vec::new();
    let mut supplies: Vec<(u64, Uint128)> = Vec::new();
    let mut list = BOX_TYPE_LIST.load(storage)?;
    let mut total_units = Uint128::zero();
    for (box_type, amount) in box_types.iter().zip(amounts) {
        if *box_type == 0 {
            return Err(StdError::generic_err("box type must yield at least one unit"));
        }
        if amount.is_zero() {
            return Err(StdError::generic_err("box amount must not be zero"));
        }
        let balance = match balances.iter().position(|(bt, _)| bt == box_type) {
            Some(pos) => balances.remove(pos).1,
            None => BOX_BALANCES
                .get(storage, &(recipient.clone(), *box_type))
                .unwrap_or_default(),
        };
        balances.push((*box_type, balance + *amount));
        let supply = match supplies.iter().position(|(bt, _)| bt == box_type) {
            Some(pos) => supplies.remove(pos).1,
            None => BOX_SUPPLY.get(storage, box_type).unwrap_or_default(),
        };
        supplies.push((*box_type, supply + *amount));
        if !list.contains(box_type) {
            list.push(*box_type);
        }
        total_units += Uint128::from(*box_type) * *amount;
    }
    for (box_type, balance) in balances {
        BOX_BALANCES.insert(storage, &(recipient.clone(), box_type), &balance)?;
    }
    for (box_type, supply) in supplies {
        BOX_SUPPLY.insert(storage, &box_type, &supply)?;
    }
    BOX_TYPE_LIST.save(storage, &list)?;
    if count_minted {
        state.units_minted += total_units;
    }
    Ok(total_units)
}

fn burn_boxes(
    storage: &mut dyn Storage,
    opener: &Addr,
    box_types: &[u64],
    amounts: &[Uint128],
) -> StdResult<Uint128> {
    let mut balances: Vec<(u64, Uint128)> = Vec::new();
    let mut supplies: Vec<(u64, Uint128)> = Vec::new();
    let mut total_units = Uint128::zero();
    for (box_type, amount) in box_types.iter().zip(amounts) {
        if amount.is_zero() {
            return Err(StdError::generic_err("box amount must not be zero"));
        }
        let balance = match balances.iter().position(|(bt, _)| bt == box_type) {
            Some(pos) => balances.remove(pos).1,
            None => BOX_BALANCES
                .get(storage, &(opener.clone(), *box_type))
                .unwrap_or_default(),
        };
        if balance < *amount {
            return Err(StdError::generic_err(format!(
                "insufficient box balance for type {}",
                box_type
            )));
        }
        balances.push((*box_type, balance - *amount));
        let supply = match supplies.iter().position(|(bt, _)| bt == box_type) {
            Some(pos) => supplies.remove(pos).1,
            None => BOX_SUPPLY.get(storage, box_type).unwrap_or_default(),
        };
        supplies.push((*box_type, supply - *amount));
        total_units += Uint128::from(*box_type) * *amount;
    }
    for (box_type, balance) in balances {
        BOX_BALANCES.insert(storage, &(opener.clone(), box_type), &balance)?;
    }
    for (box_type, supply) in supplies {
        BOX_SUPPLY.insert(storage, &box_type, &supply)?;
    }
    Ok(total_units)
}

fn execute_mint(
    deps: DepsMut,
    info: MessageInfo,
    recipient: String,
    box_types: Vec<u64>,
    amounts: Vec<Uint128>,
) -> StdResult<Response> {
    require_role(deps.storage, &MINTERS, &info.sender, "minter")?;
    let recipient = deps.api.addr_validate(&recipient)?;
    let mut state = STATE.load(deps.storage)?;
    let total_units = mint_boxes(deps.storage, &mut state, &recipient, &box_types, &amounts, true)?;
    STATE.save(deps.storage, &state)?;

    Ok(Response::new()
        .add_attribute("action", "mint")
        .add_attribute("recipient", recipient.to_string())
        .add_attribute("units", total_units.to_string()))
}

fn execute_set_paused(deps: DepsMut, info: MessageInfo, paused: bool) -> StdResult<Response> {
    require_role(deps.storage, &PAUSERS, &info.sender, "pauser")?;
    let mut state = STATE.load(deps.storage)?;
    if state.paused == paused {
        return Err(StdError::generic_err(if paused {
            "already paused"
        } else {
            "not paused"
        }));
    }
    state.paused = paused;
    STATE.save(deps.storage, &state)?;
    Ok(Response::new().add_attribute("action", if paused { "pause" } else { "unpause" }))
}

fn execute_withdraw(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    to: Option<String>,
) -> StdResult<Response> {
    let config = CONFIG.load(deps.storage)?;
    require_admin(&config, &info.sender)?;
    let to = match to {
        Some(address) => deps.api.addr_validate(&address)?,
        None => config.admin.clone(),
    };
    let balance = deps
        .querier
        .query_balance(env.contract.address, &config.payment_denom)?;
    if balance.amount.is_zero() {
        return Err(StdError::generic_err("nothing to withdraw"));
    }

    Ok(Response::new()
        .add_message(BankMsg::Send {
            to_address: to.to_string(),
            amount: vec![balance.clone()],
        })
        .add_attribute("action", "withdraw")
        .add_attribute("to", to.to_string())
        .add_attribute("amount", balance.amount.to_string()))
}

fn snip1155_transfer(
    env: &Env,
    token: &Addr,
    code_hash: &str,
    recipient: &Addr,
    token_id: &str,
    amount: Uint128,
) -> StdResult<CosmosMsg> {
    Ok(CosmosMsg::Wasm(WasmMsg::Execute {
        contract_addr: token.to_string(),
        code_hash: code_hash.to_string(),
        msg: to_binary(&Snip1155ExecuteMsg::Transfer {
            token_id: token_id.to_string(),
            from: env.contract.address.clone(),
            recipient: recipient.clone(),
            amount,
            memo: None,
            padding: None,
        })?,
        funds: vec![],
    }))
}

#[allow(clippy::too_many_arguments)]
fn execute_emergency_withdraw(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    kind: TokenKind,
    token: String,
    code_hash: Option<String>,
    to: String,
    token_ids: Vec<String>,
    amounts: Vec<Uint128>,
) -> StdResult<Response> {
    let config = CONFIG.load(deps.storage)?;
    require_admin(&config, &info.sender)?;
    let token = deps.api.addr_validate(&token)?;
    let to = deps.api.addr_validate(&to)?;
    let mut state = STATE.load(deps.storage)?;
    let armed = !state.emergency_mode;
    state.emergency_mode = true;

    let entry = TOKENS.get(deps.storage, &token);
    if let Some(held) = &entry {
        if held.kind != TokenKind::Unset && held.kind != kind {
            return Err(StdError::generic_err(format!(
                "token {} is already registered as {}",
                token,
                held.kind.name()
            )));
        }
    }
    let hash = match &entry {
        Some(held) => held.code_hash.clone(),
        None => code_hash
            .ok_or_else(|| StdError::generic_err("code hash required for an unlisted token"))?,
    };

    let mut msgs: Vec<CosmosMsg> = Vec::new();
    match kind {
        TokenKind::Unset => return Err(StdError::generic_err("token kind required")),
        TokenKind::Snip20 => {
            let amount = amounts
                .first()
                .copied()
                .ok_or_else(|| StdError::generic_err("amount required"))?;
            if let Some(mut held) = entry {
                if held.kind == TokenKind::Snip20 {
                    held.balance = held.balance.checked_sub(amount).map_err(|_| {
                        StdError::generic_err(format!("insufficient balance for {}", token))
                    })?;
                    let cap = inventory::floor_units(held.balance, held.amount_per_unit);
                    if held.units > cap {
                        held.units = cap;
                    }
                    TOKENS.insert(deps.storage, &token, &held)?;
                }
            }
            msgs.push(snip20::transfer_msg(
                to.to_string(),
                amount,
                None,
                None,
                BLOCK_SIZE,
                hash.clone(),
                token.to_string(),
            )?);
        }
        TokenKind::Snip721 | TokenKind::Snip1155Nft => {
            if token_ids.is_empty() {
                return Err(StdError::generic_err("token ids required"));
            }
            if let Some(mut held) = entry {
                if held.kind == kind {
                    for token_id in &token_ids {
                        let pos = held
                            .items
                            .iter()
                            .position(|item| item == token_id)
                            .ok_or_else(|| {
                                StdError::generic_err(format!("token id {} not held", token_id))
                            })?;
                        held.items.remove(pos);
                    }
                    held.units = inventory::floor_units(
                        Uint128::from(held.items.len() as u128),
                        held.amount_per_unit,
                    );
                    TOKENS.insert(deps.storage, &token, &held)?;
                }
            }
            for token_id in &token_ids {
                if kind == TokenKind::Snip721 {
                    msgs.push(snip721::transfer_nft_msg(
                        to.to_string(),
                        token_id.clone(),
                        None,
                        None,
                        BLOCK_SIZE,
                        hash.clone(),
                        token.to_string(),
                    )?);
                } else {
                    msgs.push(snip1155_transfer(
                        &env,
                        &token,
                        &hash,
                        &to,
                        token_id,
                        Uint128::one(),
                    )?);
                }
            }
        }
        TokenKind::Snip1155Fungible => {
            if token_ids.len() != amounts.len() || token_ids.is_empty() {
                return Err(StdError::generic_err("length mismatch"));
            }
            for (token_id, amount) in token_ids.iter().zip(&amounts) {
                let key = (token.clone(), token_id.clone());
                if let Some(mut id_entry) = ID_ENTRIES.get(deps.storage, &key) {
                    id_entry.balance = id_entry.balance.checked_sub(*amount).map_err(|_| {
                        StdError::generic_err(format!(
                            "insufficient balance for {} id {}",
                            token, token_id
                        ))
                    })?;
                    let cap =
                        inventory::floor_units(id_entry.balance, id_entry.amount_per_unit);
                    if id_entry.units > cap {
                        id_entry.units = cap;
                    }
                    ID_ENTRIES.insert(deps.storage, &key, &id_entry)?;
                }
                msgs.push(snip1155_transfer(&env, &token, &hash, &to, token_id, *amount)?);
            }
        }
    }

    state.units_supply = inventory::reconcile_units_supply(deps.storage)?;
    STATE.save(deps.storage, &state)?;

    let mut resp = Response::new()
        .add_messages(msgs)
        .add_attribute("action", "emergency_withdraw")
        .add_attribute("token", token.to_string())
        .add_attribute("to", to.to_string());
    if armed {
        resp = resp.add_attribute("emergency_mode", "armed");
    }
    Ok(resp)
}

/// Open price components: the oracle fee converted into the payment denom,
/// and the factory's per unit fee. All three quotes are read fresh; nothing
/// is locked in for the fulfillment.
pub fn open_price(
    deps: Deps,
    env: &Env,
    config: &Config,
    callback_gas: u64,
    units_to_get: Uint128,
) -> StdResult<(Uint128, Uint128, Uint128)> {
    let fee: OracleFeeResponse = OracleQueryMsg::Fee { callback_gas }.query(
        deps.querier,
        config.oracle_hash.clone(),
        config.oracle.to_string(),
    )?;
    let rate: RateResponse = PriceFeedQueryMsg::Rate {}.query(
        deps.querier,
        config.price_feed_hash.clone(),
        config.price_feed.to_string(),
    )?;
    let per_unit: FeePerUnitResponse = FactoryQueryMsg::FeePerUnit {
        lootbox: env.contract.address.to_string(),
    }
    .query(
        deps.querier,
        config.factory_hash.clone(),
        config.factory.to_string(),
    )?;

    let oracle_fee = fee.fee.multiply_ratio(rate.rate, Uint128::new(RATE_SCALE));
    let platform_fee = per_unit.fee_per_unit * units_to_get;
    Ok((oracle_fee + platform_fee, oracle_fee, platform_fee))
}

fn execute_open(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    callback_gas: u64,
    box_types: Vec<u64>,
    amounts: Vec<Uint128>,
) -> StdResult<Response> {
    let config = CONFIG.load(deps.storage)?;
    let mut state = STATE.load(deps.storage)?;
    if state.emergency_mode {
        return Err(end_of_service());
    }
    if state.paused {
        return Err(StdError::generic_err("paused"));
    }
    if box_types.len() != amounts.len() {
        return Err(StdError::generic_err("length mismatch"));
    }
    if OPENER_REQUEST.get(deps.storage, &info.sender).is_some() {
        return Err(StdError::generic_err("open request already in progress"));
    }
    if callback_gas < MIN_CALLBACK_GAS {
        return Err(StdError::generic_err(format!(
            "callback gas budget too low: minimum {}",
            MIN_CALLBACK_GAS
        )));
    }

    let mut units_to_get = Uint128::zero();
    for (box_type, amount) in box_types.iter().zip(&amounts) {
        units_to_get += Uint128::from(*box_type) * *amount;
    }
    if units_to_get.is_zero() {
        return Err(StdError::generic_err("zero reward units requested"));
    }
    let available = state.units_supply - state.units_requested;
    if units_to_get > available {
        return Err(StdError::generic_err(format!(
            "not enough reward units available: requested {}, available {}",
            units_to_get, available
        )));
    }

    let (total_price, oracle_fee, platform_fee) =
        open_price(deps.as_ref(), &env, &config, callback_gas, units_to_get)?;
    let paid = info
        .funds
        .iter()
        .find(|coin| coin.denom == config.payment_denom)
        .map(|coin| coin.amount)
        .unwrap_or_default();
    if paid < total_price {
        return Err(StdError::generic_err(format!(
            "insufficient payment: required {}, received {}",
            total_price, paid
        )));
    }

    burn_boxes(deps.storage, &info.sender, &box_types, &amounts)?;

    let request_id = state.next_request_id;
    state.next_request_id += 1;
    state.units_requested += units_to_get;
    STATE.save(deps.storage, &state)?;
    let request = OpenRequest {
        opener: info.sender.clone(),
        units_to_get,
        box_types,
        box_amounts: amounts,
        status: RequestStatus::Pending,
    };
    REQUESTS.insert(deps.storage, &request_id, &request)?;
    OPENER_REQUEST.insert(deps.storage, &info.sender, &request_id)?;

    let mut resp = Response::new().add_message(CosmosMsg::Wasm(WasmMsg::Execute {
        contract_addr: config.oracle.to_string(),
        code_hash: config.oracle_hash.clone(),
        msg: to_binary(&OracleExecuteMsg::RequestRandomness {
            job_id: request_id,
            callback_gas,
        })?,
        funds: coins(oracle_fee.u128(), &config.payment_denom),
    }));
    if !platform_fee.is_zero() {
        resp = resp.add_message(BankMsg::Send {
            to_address: config.factory.to_string(),
            amount: coins(platform_fee.u128(), &config.payment_denom),
        });
    }
    let excess = paid - total_price;
    if !excess.is_zero() {
        resp = resp.add_message(BankMsg::Send {
            to_address: info.sender.to_string(),
            amount: coins(excess.u128(), &config.payment_denom),
        });
    }

    Ok(resp
        .add_attribute("action", "open")
        .add_attribute("request_id", request_id.to_string())
        .add_attribute("opener", info.sender.to_string())
        .add_attribute("units_to_get", units_to_get.to_string()))
}

fn fulfill_failure(request_id: u64, reason: String) -> Response {
    Response::new()
        .add_attribute("action", "fulfill")
        .add_attribute("request_id", request_id.to_string())
        .add_attribute("outcome", "failed")
        .add_attribute("reason", reason)
}

fn execute_fulfill(
    deps: DepsMut,
    _env: Env,
    info: MessageInfo,
    request_id: u64,
    randomness: Binary,
) -> StdResult<Response> {
    let config = CONFIG.load(deps.storage)?;
    if info.sender != config.oracle {
        return Err(StdError::generic_err("unauthorized: oracle only"));
    }

    // The oracle's callback must always land, so every fault from here on is
    // absorbed into a failure notification instead of an error.
    let mut request = match REQUESTS.get(deps.storage, &request_id) {
        Some(request) => request,
        None => {
            return Ok(fulfill_failure(
                request_id,
                "unknown or already fulfilled request".to_string(),
            ))
        }
    };
    if request.status != RequestStatus::Pending {
        return Ok(fulfill_failure(
            request_id,
            "open request is not pending".to_string(),
        ));
    }

    match allocation::allocate(
        deps.storage,
        &request.opener,
        request.units_to_get,
        randomness.as_slice(),
    ) {
        Ok(rewards) => {
            let mut state = STATE.load(deps.storage)?;
            state.units_supply -= request.units_to_get;
            state.units_requested -= request.units_to_get;
            STATE.save(deps.storage, &state)?;
            REQUESTS.remove(deps.storage, &request_id)?;
            OPENER_REQUEST.remove(deps.storage, &request.opener)?;

            let mut resp = Response::new()
                .add_attribute("action", "fulfill")
                .add_attribute("request_id", request_id.to_string())
                .add_attribute("outcome", "fulfilled")
                .add_attribute("opener", request.opener.to_string())
                .add_attribute("units", request.units_to_get.to_string())
                .add_attribute("randomness", hex::encode(randomness.as_slice()));
            for reward in rewards {
                resp = resp.add_attribute(
                    "reward",
                    format!(
                        "{}:{}:{}",
                        reward.token,
                        reward.token_id.as_deref().unwrap_or("-"),
                        reward.amount
                    ),
                );
            }
            Ok(resp)
        }
        Err(err) => {
            request.status = RequestStatus::Failed;
            REQUESTS.insert(deps.storage, &request_id, &request)?;
            Ok(fulfill_failure(request_id, err.to_string()))
        }
    }
}

fn execute_recover_boxes(deps: DepsMut, _info: MessageInfo, opener: String) -> StdResult<Response> {
    let opener = deps.api.addr_validate(&opener)?;
    let request_id = OPENER_REQUEST
        .get(deps.storage, &opener)
        .ok_or_else(|| StdError::generic_err("nothing to recover"))?;
    let request = REQUESTS
        .get(deps.storage, &request_id)
        .ok_or_else(|| StdError::generic_err("nothing to recover"))?;
    if request.status != RequestStatus::Failed {
        return Err(StdError::generic_err("open request is not failed"));
    }

    let mut state = STATE.load(deps.storage)?;
    mint_boxes(
        deps.storage,
        &mut state,
        &opener,
        &request.box_types,
        &request.box_amounts,
        false,
    )?;
    state.units_requested -= request.units_to_get;
    STATE.save(deps.storage, &state)?;
    REQUESTS.remove(deps.storage, &request_id)?;
    OPENER_REQUEST.remove(deps.storage, &opener)?;

    Ok(Response::new()
        .add_attribute("action", "recover_boxes")
        .add_attribute("opener", opener.to_string())
        .add_attribute("request_id", request_id.to_string())
        .add_attribute("units", request.units_to_get.to_string()))
}

fn execute_claim_rewards(
    deps: DepsMut,
    env: Env,
    _info: MessageInfo,
    opener: String,
) -> StdResult<Response> {
    let state = STATE.load(deps.storage)?;
    if state.paused {
        return Err(StdError::generic_err("paused"));
    }
    let opener = deps.api.addr_validate(&opener)?;
    let rewards = REWARDS.get(deps.storage, &opener).unwrap_or_default();
    if rewards.is_empty() {
        return Err(StdError::generic_err("nothing to claim"));
    }
    REWARDS.remove(deps.storage, &opener)?;

    let mut msgs: Vec<CosmosMsg> = Vec::with_capacity(rewards.len());
    for reward in &rewards {
        let entry = inventory::require_allowed(deps.storage, &reward.token)?;
        match entry.kind {
            TokenKind::Snip20 => {
                msgs.push(snip20::transfer_msg(
                    opener.to_string(),
                    reward.amount,
                    None,
                    None,
                    BLOCK_SIZE,
                    entry.code_hash.clone(),
                    reward.token.to_string(),
                )?);
            }
            TokenKind::Snip721 => {
                let token_id = reward
                    .token_id
                    .clone()
                    .ok_or_else(|| StdError::generic_err("reward is missing a token id"))?;
                msgs.push(snip721::transfer_nft_msg(
                    opener.to_string(),
                    token_id,
                    None,
                    None,
                    BLOCK_SIZE,
                    entry.code_hash.clone(),
                    reward.token.to_string(),
                )?);
            }
            TokenKind::Snip1155Fungible | TokenKind::Snip1155Nft => {
                let token_id = reward
                    .token_id
                    .clone()
                    .ok_or_else(|| StdError::generic_err("reward is missing a token id"))?;
                msgs.push(snip1155_transfer(
                    &env,
                    &reward.token,
                    &entry.code_hash,
                    &opener,
                    &token_id,
                    reward.amount,
                )?);
            }
            TokenKind::Unset => {
                return Err(StdError::generic_err(format!(
                    "token kind not set for {}",
                    reward.token
                )))
            }
        }
    }

    Ok(Response::new()
        .add_messages(msgs)
        .add_attribute("action", "claim_rewards")
        .add_attribute("opener", opener.to_string())
        .add_attribute("rewards", rewards.len().to_string()))
}

fn execute_receive_snip20(
    deps: DepsMut,
    info: MessageInfo,
    from: String,
    amount: Uint128,
) -> StdResult<Response> {
    let state = STATE.load(deps.storage)?;
    if state.emergency_mode {
        return Err(end_of_service());
    }
    let from = deps.api.addr_validate(&from)?;
    require_role(deps.storage, &SUPPLIERS, &from, "supplier")?;

    // info.sender is the token contract delivering the transfer notification.
    inventory::deposit_fungible(deps.storage, &info.sender, amount)?;

    Ok(Response::new()
        .add_attribute("action", "supply")
        .add_attribute("token", info.sender.to_string())
        .add_attribute("kind", TokenKind::Snip20.name())
        .add_attribute("from", from.to_string())
        .add_attribute("amount", amount.to_string()))
}

fn execute_receive_nft(
    deps: DepsMut,
    info: MessageInfo,
    from: String,
    token_ids: Vec<String>,
) -> StdResult<Response> {
    let mut state = STATE.load(deps.storage)?;
    if state.emergency_mode {
        return Err(end_of_service());
    }
    let from = deps.api.addr_validate(&from)?;
    require_role(deps.storage, &SUPPLIERS, &from, "supplier")?;

    let count = token_ids.len();
    let units_added = inventory::deposit_nft(deps.storage, &info.sender, &token_ids)?;
    if !units_added.is_zero() {
        state.units_supply += units_added;
        STATE.save(deps.storage, &state)?;
    }

    Ok(Response::new()
        .add_attribute("action", "supply")
        .add_attribute("token", info.sender.to_string())
        .add_attribute("kind", TokenKind::Snip721.name())
        .add_attribute("from", from.to_string())
        .add_attribute("token_ids", count.to_string())
        .add_attribute("units_added", units_added.to_string()))
}

fn execute_receive_snip1155(
    deps: DepsMut,
    info: MessageInfo,
    from: String,
    actions: Vec<Snip1155Action>,
    msg: Option<Binary>,
) -> StdResult<Response> {
    let mut state = STATE.load(deps.storage)?;
    if state.emergency_mode {
        return Err(end_of_service());
    }
    let from = deps.api.addr_validate(&from)?;
    require_role(deps.storage, &SUPPLIERS, &from, "supplier")?;
    if actions.is_empty() {
        return Err(StdError::generic_err("no token ids supplied"));
    }

    let intent = match msg {
        Some(bin) => from_binary(&bin)?,
        None => ReceiveMsg::Supply {},
    };
    let kind = match intent {
        ReceiveMsg::Supply {} => TokenKind::Snip1155Fungible,
        ReceiveMsg::SupplyNft {} => TokenKind::Snip1155Nft,
    };
    let mut units_added = Uint128::zero();
    for action in &actions {
        match intent {
            ReceiveMsg::Supply {} => inventory::deposit_semi_fungible(
                deps.storage,
                &info.sender,
                &action.token_id,
                action.amount,
            )?,
            ReceiveMsg::SupplyNft {} => {
                units_added += inventory::deposit_semi_fungible_nft(
                    deps.storage,
                    &info.sender,
                    &action.token_id,
                    action.amount,
                )?;
            }
        }
    }
    if !units_added.is_zero() {
        state.units_supply += units_added;
        STATE.save(deps.storage, &state)?;
    }

    Ok(Response::new()
        .add_attribute("action", "supply")
        .add_attribute("token", info.sender.to_string())
        .add_attribute("kind", kind.name())
        .add_attribute("from", from.to_string())
        .add_attribute("token_ids", actions.len().to_string())
        .add_attribute("units_added", units_added.to_string()))
}

#[entry_point]
pub fn query(deps: Deps, env: Env, msg: QueryMsg) -> StdResult<QueryResponse> {
    match msg {
        QueryMsg::GetConfig {} => to_binary(&CONFIG.load(deps.storage)?),
        QueryMsg::GetState {} => to_binary(&query_state(deps)?),
        QueryMsg::GetInventory {} => to_binary(&query_inventory(deps)?),
        QueryMsg::GetTokens {} => to_binary(&TokensResponse {
            tokens: TOKEN_LIST.load(deps.storage)?,
        }),
        QueryMsg::GetSuppliers {} => to_binary(&SuppliersResponse {
            suppliers: SUPPLIERS.load(deps.storage)?,
        }),
        QueryMsg::GetBoxTypes {} => to_binary(&query_box_types(deps)?),
        QueryMsg::GetBoxBalance { owner, box_type } => {
            to_binary(&query_box_balance(deps, owner, box_type)?)
        }
        QueryMsg::GetOpenRequest { opener } => to_binary(&query_open_request(deps, opener)?),
        QueryMsg::GetRewards { opener } => to_binary(&query_rewards(deps, opener)?),
        QueryMsg::GetOpenPrice {
            callback_gas,
            units_to_get,
        } => to_binary(&query_open_price(deps, env, callback_gas, units_to_get)?),
    }
}

fn query_state(deps: Deps) -> StdResult<StateResponse> {
    let state = STATE.load(deps.storage)?;
    Ok(StateResponse {
        units_supply: state.units_supply,
        units_requested: state.units_requested,
        available_supply: state.units_supply.saturating_sub(state.units_requested),
        units_minted: state.units_minted,
        paused: state.paused,
        emergency_mode: state.emergency_mode,
    })
}

fn query_inventory(deps: Deps) -> StdResult<InventoryResponse> {
    let (inventory, leftovers) = inventory::inventory_views(deps.storage)?;
    Ok(InventoryResponse {
        inventory,
        leftovers,
    })
}

fn query_box_types(deps: Deps) -> StdResult<BoxTypesResponse> {
    let mut box_types = Vec::new();
    for box_type in BOX_TYPE_LIST.load(deps.storage)? {
        let supply = BOX_SUPPLY.get(deps.storage, &box_type).unwrap_or_default();
        box_types.push(BoxTypeInfo { box_type, supply });
    }
    Ok(BoxTypesResponse { box_types })
}

fn query_box_balance(deps: Deps, owner: String, box_type: u64) -> StdResult<BoxBalanceResponse> {
    let owner = deps.api.addr_validate(&owner)?;
    Ok(BoxBalanceResponse {
        balance: BOX_BALANCES
            .get(deps.storage, &(owner, box_type))
            .unwrap_or_default(),
    })
}

fn query_open_request(deps: Deps, opener: String) -> StdResult<OpenRequestResponse> {
    let opener = deps.api.addr_validate(&opener)?;
    let request = match OPENER_REQUEST.get(deps.storage, &opener) {
        Some(request_id) => REQUESTS
            .get(deps.storage, &request_id)
            .map(|request| OpenRequestInfo {
                request_id,
                opener: request.opener,
                units_to_get: request.units_to_get,
                box_types: request.box_types,
                box_amounts: request.box_amounts,
                status: request.status,
            }),
        None => None,
    };
    Ok(OpenRequestResponse { request })
}

fn query_rewards(deps: Deps, opener: String) -> StdResult<RewardsResponse> {
    let opener = deps.api.addr_validate(&opener)?;
    Ok(RewardsResponse {
        rewards: REWARDS.get(deps.storage, &opener).unwrap_or_default(),
    })
}

fn query_open_price(
    deps: Deps,
    env: Env,
    callback_gas: u64,
    units_to_get: Uint128,
) -> StdResult<OpenPriceResponse> {
    let config = CONFIG.load(deps.storage)?;
    let (total, oracle_fee, platform_fee) =
        open_price(deps, &env, &config, callback_gas, units_to_get)?;
    Ok(OpenPriceResponse {
        total,
        oracle_fee,
        platform_fee,
    })
}
