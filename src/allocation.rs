use cosmwasm_std::{Addr, StdError, StdResult, Storage, Uint128};
use sha2::{Digest, Sha256};

use crate::state::{RewardTuple, TokenKind, ID_ENTRIES, REWARDS, TOKENS, TOKEN_LIST};

/// One drawable slice of the live inventory: a whole token entry, or a single
/// token id of a SNIP-1155 fungible entry.
struct PoolSlot {
    token: Addr,
    token_id: Option<String>,
    kind: TokenKind,
    amount_per_unit: Uint128,
    units: u128,
}

/// Index derivation for draw `draw`: the first 16 digest bytes of
/// `Sha256(randomness || draw)` reduced modulo the units still in the pool.
fn derive_index(randomness: &[u8], draw: u128, modulus: u128) -> u128 {
    let mut hasher = Sha256::new();
    hasher.update(randomness);
    hasher.update(draw.to_be_bytes());
    let digest = hasher.finalize();
    let mut word = [0u8; 16];
    word.copy_from_slice(&digest[..16]);
    u128::from_be_bytes(word) % modulus
}

fn build_pool(storage: &dyn Storage) -> StdResult<Vec<PoolSlot>> {
    let mut pool = Vec::new();
    for token in TOKEN_LIST.load(storage)? {
        let entry = TOKENS.get(storage, &token).ok_or_else(|| {
            StdError::generic_err(format!("token denied: {}", token))
        })?;
        match entry.kind {
            TokenKind::Unset => {}
            TokenKind::Snip20 | TokenKind::Snip721 | TokenKind::Snip1155Nft => {
                if !entry.units.is_zero() {
                    pool.push(PoolSlot {
                        token: token.clone(),
                        token_id: None,
                        kind: entry.kind,
                        amount_per_unit: entry.amount_per_unit,
                        units: entry.units.u128(),
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
                    if !id_entry.units.is_zero() {
                        pool.push(PoolSlot {
                            token: token.clone(),
                            token_id: Some(token_id.clone()),
                            kind: entry.kind,
                            amount_per_unit: id_entry.amount_per_unit,
                            units: id_entry.units.u128(),
                        });
                    }
                }
            }
        }
    }
    Ok(pool)
}

/// Select `units_to_get` reward units from the live inventory without
/// replacement, each draw weighted by the slots' remaining units. The same
/// randomness always reproduces the same picks over the same ledger.
///
/// Picks are staged in memory; storage is written only once every draw has
/// landed, so a failure leaves the ledger untouched and the caller can park
/// the request as failed.
pub fn allocate(
    storage: &mut dyn Storage,
    opener: &Addr,
    units_to_get: Uint128,
    randomness: &[u8],
) -> StdResult<Vec<RewardTuple>> {
    let pool = build_pool(storage)?;
    let mut remaining: u128 = pool.iter().map(|slot| slot.units).sum();
    let want = units_to_get.u128();
    if remaining < want {
        return Err(StdError::generic_err(format!(
            "insufficient reward units: have {}, need {}",
            remaining, want
        )));
    }

    let mut picked = vec![0u128; pool.len()];
    for draw in 0..want {
        let target = derive_index(randomness, draw, remaining);
        let mut cursor = 0u128;
        for (i, slot) in pool.iter().enumerate() {
            let available = slot.units - picked[i];
            if available == 0 {
                continue;
            }
            if target < cursor + available {
                picked[i] += 1;
                break;
            }
            cursor += available;
        }
        remaining -= 1;
    }

    let mut tuples = Vec::new();
    for (i, count) in picked.iter().enumerate() {
        if *count == 0 {
            continue;
        }
        let slot = &pool[i];
        let count_units = Uint128::from(*count);
        match slot.kind {
            TokenKind::Snip20 => {
                let mut entry = TOKENS.get(storage, &slot.token).ok_or_else(|| {
                    StdError::generic_err(format!("token denied: {}", slot.token))
                })?;
                entry.balance -= count_units * slot.amount_per_unit;
                entry.units -= count_units;
                TOKENS.insert(storage, &slot.token, &entry)?;
                for _ in 0..*count {
                    tuples.push(RewardTuple {
                        token: slot.token.clone(),
                        token_id: None,
                        amount: slot.amount_per_unit,
                    });
                }
            }
            TokenKind::Snip721 | TokenKind::Snip1155Nft => {
                let mut entry = TOKENS.get(storage, &slot.token).ok_or_else(|| {
                    StdError::generic_err(format!("token denied: {}", slot.token))
                })?;
                let ids_to_take = (count_units * slot.amount_per_unit).u128();
                for _ in 0..ids_to_take {
                    let token_id = entry.items.pop().ok_or_else(|| {
                        StdError::generic_err(format!(
                            "inventory ledger inconsistent for {}",
                            slot.token
                        ))
                    })?;
                    tuples.push(RewardTuple {
                        token: slot.token.clone(),
                        token_id: Some(token_id),
                        amount: Uint128::one(),
                    });
                }
                entry.units -= count_units;
                TOKENS.insert(storage, &slot.token, &entry)?;
            }
            TokenKind::Snip1155Fungible => {
                let token_id = slot.token_id.clone().unwrap_or_default();
                let key = (slot.token.clone(), token_id.clone());
                let mut id_entry = ID_ENTRIES.get(storage, &key).ok_or_else(|| {
                    StdError::generic_err(format!(
                        "missing id entry for {} id {}",
                        slot.token, token_id
                    ))
                })?;
                id_entry.balance -= count_units * slot.amount_per_unit;
                id_entry.units -= count_units;
                ID_ENTRIES.insert(storage, &key, &id_entry)?;
                for _ in 0..*count {
                    tuples.push(RewardTuple {
                        token: slot.token.clone(),
                        token_id: Some(token_id.clone()),
                        amount: slot.amount_per_unit,
                    });
                }
            }
            TokenKind::Unset => {
                return Err(StdError::generic_err(format!(
                    "token kind not set for {}",
                    slot.token
                )));
            }
        }
    }

    let mut rewards = REWARDS.get(storage, opener).unwrap_or_default();
    rewards.extend(tuples.iter().cloned());
    REWARDS.insert(storage, opener, &rewards)?;
    Ok(tuples)
}
