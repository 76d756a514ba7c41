use cosmwasm_std::{Addr, StdError, StdResult, Storage, Uint128};

use crate::msg::InventoryEntry;
use crate::state::{
    IdEntry, RewardEntry, State, TokenKind, ID_ENTRIES, TOKENS, TOKEN_LIST,
};

pub fn floor_units(amount: Uint128, amount_per_unit: Uint128) -> Uint128 {
    if amount_per_unit.is_zero() {
        Uint128::zero()
    } else {
        Uint128::from(amount.u128() / amount_per_unit.u128())
    }
}

fn item_count(entry: &RewardEntry) -> Uint128 {
    Uint128::from(entry.items.len() as u128)
}

pub fn require_allowed(storage: &dyn Storage, token: &Addr) -> StdResult<RewardEntry> {
    TOKENS
        .get(storage, token)
        .ok_or_else(|| StdError::generic_err(format!("token denied: {}", token)))
}

/// The kind is established by the first successful deposit and is immutable
/// afterwards. NFT kinds start out redeemable at one unit per id unless the
/// admin configured a rate before the first deposit landed.
fn establish_kind(entry: &mut RewardEntry, kind: TokenKind) -> StdResult<()> {
    if entry.kind == TokenKind::Unset {
        entry.kind = kind;
        if !entry.rate_configured
            && matches!(kind, TokenKind::Snip721 | TokenKind::Snip1155Nft)
        {
            entry.amount_per_unit = Uint128::one();
        }
        return Ok(());
    }
    if entry.kind != kind {
        return Err(StdError::generic_err(format!(
            "token {} is already registered as {}",
            entry.token,
            entry.kind.name()
        )));
    }
    Ok(())
}

/// SNIP-20 deposit. New balance stays in leftovers until the admin re-sets
/// the rate; committed units never move on a fungible deposit.
pub fn deposit_fungible(
    storage: &mut dyn Storage,
    token: &Addr,
    amount: Uint128,
) -> StdResult<()> {
    if amount.is_zero() {
        return Err(StdError::generic_err("deposit amount must not be zero"));
    }
    let mut entry = require_allowed(storage, token)?;
    establish_kind(&mut entry, TokenKind::Snip20)?;
    entry.balance += amount;
    TOKENS.insert(storage, token, &entry)
}

/// SNIP-721 deposit. Returns the units the deposit committed to inventory.
pub fn deposit_nft(
    storage: &mut dyn Storage,
    token: &Addr,
    token_ids: &[String],
) -> StdResult<Uint128> {
    if token_ids.is_empty() {
        return Err(StdError::generic_err("no token ids supplied"));
    }
    let mut entry = require_allowed(storage, token)?;
    establish_kind(&mut entry, TokenKind::Snip721)?;
    for token_id in token_ids {
        if entry.items.contains(token_id) {
            return Err(StdError::generic_err(format!(
                "token id {} already supplied",
                token_id
            )));
        }
        entry.items.push(token_id.clone());
    }
    let new_units = floor_units(item_count(&entry), entry.amount_per_unit);
    let delta = new_units - entry.units;
    entry.units = new_units;
    TOKENS.insert(storage, token, &entry)?;
    Ok(delta)
}

/// SNIP-1155 NFT deposit: a single id at amount exactly one. Returns the
/// units the deposit committed to inventory.
pub fn deposit_semi_fungible_nft(
    storage: &mut dyn Storage,
    token: &Addr,
    token_id: &str,
    amount: Uint128,
) -> StdResult<Uint128> {
    if amount != Uint128::one() {
        return Err(StdError::generic_err(
            "nft token id amount must be exactly 1",
        ));
    }
    let mut entry = require_allowed(storage, token)?;
    establish_kind(&mut entry, TokenKind::Snip1155Nft)?;
    if entry.items.iter().any(|id| id == token_id) {
        return Err(StdError::generic_err(format!(
            "token id {} already supplied",
            token_id
        )));
    }
    entry.items.push(token_id.to_string());
    let new_units = floor_units(item_count(&entry), entry.amount_per_unit);
    let delta = new_units - entry.units;
    entry.units = new_units;
    TOKENS.insert(storage, token, &entry)?;
    Ok(delta)
}

/// SNIP-1155 fungible deposit. Like SNIP-20, the balance lands in leftovers
/// for the id until its rate is re-set.
pub fn deposit_semi_fungible(
    storage: &mut dyn Storage,
    token: &Addr,
    token_id: &str,
    amount: Uint128,
) -> StdResult<()> {
    if amount.is_zero() {
        return Err(StdError::generic_err("deposit amount must not be zero"));
    }
    let mut entry = require_allowed(storage, token)?;
    establish_kind(&mut entry, TokenKind::Snip1155Fungible)?;
    let key = (token.clone(), token_id.to_string());
    let mut id_entry = ID_ENTRIES.get(storage, &key).unwrap_or(IdEntry {
        balance: Uint128::zero(),
        amount_per_unit: Uint128::zero(),
        units: Uint128::zero(),
    });
    id_entry.balance += amount;
    ID_ENTRIES.insert(storage, &key, &id_entry)?;
    if !entry.ids.iter().any(|id| id == token_id) {
        entry.ids.push(token_id.to_string());
    }
    TOKENS.insert(storage, token, &entry)
}

pub struct RateChange {
    pub token: Addr,
    pub token_id: Option<String>,
    pub amount_per_unit: Uint128,
}

/// Re-set exchange rates for a batch of entries. The whole batch is staged in
/// memory and written only if the resulting supply still covers the units
/// already promised to pending open requests.
pub fn apply_rate_changes(
    storage: &mut dyn Storage,
    state: &mut State,
    changes: Vec<RateChange>,
) -> StdResult<()> {
    let mut entries: Vec<(Addr, RewardEntry)> = Vec::new();
    let mut id_entries: Vec<((Addr, String), IdEntry)> = Vec::new();
    let mut supply = state.units_supply;

    for change in changes {
        let mut entry = match entries.iter().find(|(addr, _)| *addr == change.token) {
            Some((_, staged)) => staged.clone(),
            None => require_allowed(storage, &change.token)?,
        };
        match entry.kind {
            TokenKind::Unset => {
                return Err(StdError::generic_err(format!(
                    "no tokens supplied yet for {}",
                    change.token
                )));
            }
            TokenKind::Snip20 => {
                if change.token_id.is_some() {
                    return Err(StdError::generic_err(format!(
                        "unexpected token id for {}",
                        change.token
                    )));
                }
                let new_units = floor_units(entry.balance, change.amount_per_unit);
                supply = supply + new_units - entry.units;
                entry.amount_per_unit = change.amount_per_unit;
                entry.rate_configured = true;
                entry.units = new_units;
            }
            TokenKind::Snip721 | TokenKind::Snip1155Nft => {
                if change.token_id.is_some() {
                    return Err(StdError::generic_err(format!(
                        "unexpected token id for {}",
                        change.token
                    )));
                }
                let new_units = floor_units(item_count(&entry), change.amount_per_unit);
                supply = supply + new_units - entry.units;
                entry.amount_per_unit = change.amount_per_unit;
                entry.rate_configured = true;
                entry.units = new_units;
            }
            TokenKind::Snip1155Fungible => {
                let token_id = change.token_id.clone().ok_or_else(|| {
                    StdError::generic_err(format!("token id required for {}", change.token))
                })?;
                let key = (change.token.clone(), token_id.clone());
                let mut id_entry = match id_entries.iter().find(|(k, _)| *k == key) {
                    Some((_, staged)) => staged.clone(),
                    None => ID_ENTRIES.get(storage, &key).ok_or_else(|| {
                        StdError::generic_err(format!(
                            "no tokens supplied yet for {} id {}",
                            change.token, token_id
                        ))
                    })?,
                };
                let new_units = floor_units(id_entry.balance, change.amount_per_unit);
                supply = supply + new_units - id_entry.units;
                id_entry.amount_per_unit = change.amount_per_unit;
                id_entry.units = new_units;
                match id_entries.iter().position(|(k, _)| *k == key) {
                    Some(pos) => id_entries[pos].1 = id_entry,
                    None => id_entries.push((key, id_entry)),
                }
                entry.rate_configured = true;
            }
        }
        match entries.iter().position(|(addr, _)| *addr == change.token) {
            Some(pos) => entries[pos].1 = entry,
            None => entries.push((change.token.clone(), entry)),
        }
    }

    if supply < state.units_requested {
        return Err(StdError::generic_err(
            "pending open requests would exceed supply",
        ));
    }
    for (addr, entry) in entries {
        TOKENS.insert(storage, &addr, &entry)?;
    }
    for (key, id_entry) in id_entries {
        ID_ENTRIES.insert(storage, &key, &id_entry)?;
    }
    state.units_supply = supply;
    Ok(())
}

fn amount_rows(
    entry: &RewardEntry,
    token_id: Option<String>,
    amount_per_unit: Uint128,
    units: Uint128,
    balance: Uint128,
    inventory: &mut Vec<InventoryEntry>,
    leftovers: &mut Vec<InventoryEntry>,
) {
    let committed = units * amount_per_unit;
    if !units.is_zero() {
        inventory.push(InventoryEntry {
            token: entry.token.clone(),
            kind: entry.kind,
            token_id: token_id.clone(),
            amount_per_unit,
            units,
            amount: committed,
            token_ids: vec![],
        });
    }
    let rest = balance - committed;
    if !rest.is_zero() {
        leftovers.push(InventoryEntry {
            token: entry.token.clone(),
            kind: entry.kind,
            token_id,
            amount_per_unit,
            units: Uint128::zero(),
            amount: rest,
            token_ids: vec![],
        });
    }
}

/// The inventory vs leftovers partition, recomputed from the ledger on every
/// call. Allocation consumes ids from the back of `items`, so the committed
/// slice of an identity entry is its most recently supplied ids.
pub fn inventory_views(
    storage: &dyn Storage,
) -> StdResult<(Vec<InventoryEntry>, Vec<InventoryEntry>)> {
    let mut inventory = Vec::new();
    let mut leftovers = Vec::new();
    for token in TOKEN_LIST.load(storage)? {
        let entry = require_allowed(storage, &token)?;
        match entry.kind {
            TokenKind::Unset => {
                leftovers.push(InventoryEntry {
                    token: entry.token.clone(),
                    kind: entry.kind,
                    token_id: None,
                    amount_per_unit: Uint128::zero(),
                    units: Uint128::zero(),
                    amount: Uint128::zero(),
                    token_ids: vec![],
                });
            }
            TokenKind::Snip20 => {
                amount_rows(
                    &entry,
                    None,
                    entry.amount_per_unit,
                    entry.units,
                    entry.balance,
                    &mut inventory,
                    &mut leftovers,
                );
            }
            TokenKind::Snip721 | TokenKind::Snip1155Nft => {
                let committed = (entry.units * entry.amount_per_unit).u128() as usize;
                let split = entry.items.len() - committed;
                if !entry.units.is_zero() {
                    inventory.push(InventoryEntry {
                        token: entry.token.clone(),
                        kind: entry.kind,
                        token_id: None,
                        amount_per_unit: entry.amount_per_unit,
                        units: entry.units,
                        amount: Uint128::from(committed as u128),
                        token_ids: entry.items[split..].to_vec(),
                    });
                }
                if split > 0 {
                    leftovers.push(InventoryEntry {
                        token: entry.token.clone(),
                        kind: entry.kind,
                        token_id: None,
                        amount_per_unit: entry.amount_per_unit,
                        units: Uint128::zero(),
                        amount: Uint128::from(split as u128),
                        token_ids: entry.items[..split].to_vec(),
                    });
                }
            }
            TokenKind::Snip1155Fungible => {
                for token_id in &entry.ids {
                    let key = (token.clone(), token_id.clone());
                    let id_entry = ID_ENTRIES.get(storage, &key).ok_or_else(|| {
                        StdError::generic_err(format!(
                            "missing id entry for {} id {}",
                            token, token_id
                        ))
                    })?;
                    amount_rows(
                        &entry,
                        Some(token_id.clone()),
                        id_entry.amount_per_unit,
                        id_entry.units,
                        id_entry.balance,
                        &mut inventory,
                        &mut leftovers,
                    );
                }
            }
        }
    }
    Ok((inventory, leftovers))
}

/// Recompute the supply from the raw ledger, checking every entry's internal
/// consistency along the way. Used by tests and to resync after an emergency
/// withdrawal.
pub fn reconcile_units_supply(storage: &dyn Storage) -> StdResult<Uint128> {
    let mut total = Uint128::zero();
    for token in TOKEN_LIST.load(storage)? {
        let entry = require_allowed(storage, &token)?;
        match entry.kind {
            TokenKind::Unset => {}
            TokenKind::Snip20 => {
                if entry.units > floor_units(entry.balance, entry.amount_per_unit) {
                    return Err(StdError::generic_err(format!(
                        "inventory ledger inconsistent for {}",
                        token
                    )));
                }
                total += entry.units;
            }
            TokenKind::Snip721 | TokenKind::Snip1155Nft => {
                if entry.units != floor_units(item_count(&entry), entry.amount_per_unit) {
                    return Err(StdError::generic_err(format!(
                        "inventory ledger inconsistent for {}",
                        token
                    )));
                }
                total += entry.units;
            }
            TokenKind::Snip1155Fungible => {
                for token_id in &entry.ids {
                    let key = (token.clone(), token_id.clone());
                    let id_entry = ID_ENTRIES.get(storage, &key).ok_or_else(|| {
                        StdError::generic_err(format!(
                            "missing id entry for {} id {}",
                            token, token_id
                        ))
                    })?;
                    if id_entry.units > floor_units(id_entry.balance, id_entry.amount_per_unit)
                    {
                        return Err(StdError::generic_err(format!(
                            "inventory ledger inconsistent for {} id {}",
                            token, token_id
                        )));
                    }
                    total += id_entry.units;
                }
            }
        }
    }
    Ok(total)
}
