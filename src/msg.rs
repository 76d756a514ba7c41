use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use cosmwasm_std::{Addr, Binary, Uint128};
use secret_toolkit::utils::Query;
use crate::state::{Config, RequestStatus, RewardTuple, TokenKind, BLOCK_SIZE};

/// Instantiate message
#[derive(Serialize, Deserialize, JsonSchema)]
pub struct InstantiateMsg {
    pub admin: String,
    pub factory: String,
    pub factory_hash: String,
    pub oracle: String,
    pub oracle_hash: String,
    pub price_feed: String,
    pub price_feed_hash: String,
    pub payment_denom: String,
}

#[derive(Serialize, Deserialize, Clone, JsonSchema)]
pub struct TokenDef {
    pub address: String,
    pub code_hash: String,
}

#[derive(Serialize, Deserialize, Clone, JsonSchema)]
pub struct Snip1155Action {
    pub token_id: String,
    pub amount: Uint128,
}

/// Execute messages
#[derive(Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExecuteMsg {
    /// Register reward tokens with an unset kind (admin only, idempotent)
    AddTokens { tokens: Vec<TokenDef> },
    AddSuppliers { addresses: Vec<String> },
    RemoveSuppliers { addresses: Vec<String> },
    AddMinters { addresses: Vec<String> },
    RemoveMinters { addresses: Vec<String> },
    AddPausers { addresses: Vec<String> },
    RemovePausers { addresses: Vec<String> },
    /// Reconfigure exchange rates; parallel arrays, applied all or nothing
    SetAmountsPerUnit {
        tokens: Vec<String>,
        token_ids: Vec<Option<String>>,
        amounts_per_unit: Vec<Uint128>,
    },
    /// Mint boxes (minter only); the box type is the units it yields
    Mint {
        recipient: String,
        box_type: u64,
        amount: Uint128,
    },
    MintBatch {
        recipient: String,
        box_types: Vec<u64>,
        amounts: Vec<Uint128>,
    },
    Pause {},
    Unpause {},
    /// Sweep the contract's native balance to `to` (admin only)
    Withdraw { to: Option<String> },
    /// Move any holdings out and arm emergency mode (admin only)
    EmergencyWithdraw {
        kind: TokenKind,
        token: String,
        code_hash: Option<String>,
        to: String,
        token_ids: Vec<String>,
        amounts: Vec<Uint128>,
    },
    /// Burn boxes and request randomness; payment rides along as native funds
    Open {
        callback_gas: u64,
        box_types: Vec<u64>,
        amounts: Vec<Uint128>,
    },
    /// Randomness callback, oracle only
    Fulfill {
        request_id: u64,
        randomness: Binary,
    },
    /// Return the boxes burned by a failed open request (callable by anyone)
    RecoverBoxes { opener: String },
    /// Pay out the opener's accumulated rewards (callable by anyone)
    ClaimRewards { opener: String },
    /// SNIP-20 Receive hook
    Receive {
        sender: String,
        from: String,
        amount: Uint128,
        msg: Option<Binary>,
        #[serde(skip_serializing_if = "Option::is_none")]
        memo: Option<String>,
    },
    /// SNIP-721 receive hooks
    ReceiveNft {
        sender: String,
        token_id: String,
        msg: Option<Binary>,
    },
    BatchReceiveNft {
        sender: String,
        from: String,
        token_ids: Vec<String>,
        msg: Option<Binary>,
    },
    /// SNIP-1155 receive hooks
    Snip1155Receive {
        sender: String,
        token_id: String,
        from: String,
        amount: Uint128,
        memo: Option<String>,
        msg: Option<Binary>,
    },
    Snip1155BatchReceive {
        sender: String,
        from: String,
        actions: Vec<Snip1155Action>,
        msg: Option<Binary>,
    },
}

/// Messages sent within SNIP-1155 receive hooks, declaring the supply intent.
/// Absent msg means a plain fungible supply.
#[derive(Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReceiveMsg {
    Supply {},
    SupplyNft {},
}

/// Query messages
#[derive(Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum QueryMsg {
    GetConfig {},
    GetState {},
    /// Inventory vs leftovers split, recomputed on demand
    GetInventory {},
    GetTokens {},
    GetSuppliers {},
    GetBoxTypes {},
    GetBoxBalance { owner: String, box_type: u64 },
    GetOpenRequest { opener: String },
    GetRewards { opener: String },
    GetOpenPrice {
        callback_gas: u64,
        units_to_get: Uint128,
    },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct StateResponse {
    pub units_supply: Uint128,
    pub units_requested: Uint128,
    pub available_supply: Uint128,
    pub units_minted: Uint128,
    pub paused: bool,
    pub emergency_mode: bool,
}

/// One classified slice of a token's holdings. Amount-based entries carry the
/// committed (or leftover) balance in `amount`; identity-based entries carry
/// the ids composing the slice in `token_ids`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct InventoryEntry {
    pub token: Addr,
    pub kind: TokenKind,
    pub token_id: Option<String>,
    pub amount_per_unit: Uint128,
    pub units: Uint128,
    pub amount: Uint128,
    pub token_ids: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct InventoryResponse {
    pub inventory: Vec<InventoryEntry>,
    pub leftovers: Vec<InventoryEntry>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct TokensResponse {
    pub tokens: Vec<Addr>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct SuppliersResponse {
    pub suppliers: Vec<Addr>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct BoxTypeInfo {
    pub box_type: u64,
    pub supply: Uint128,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct BoxTypesResponse {
    pub box_types: Vec<BoxTypeInfo>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct BoxBalanceResponse {
    pub balance: Uint128,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct OpenRequestInfo {
    pub request_id: u64,
    pub opener: Addr,
    pub units_to_get: Uint128,
    pub box_types: Vec<u64>,
    pub box_amounts: Vec<Uint128>,
    pub status: RequestStatus,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct OpenRequestResponse {
    pub request: Option<OpenRequestInfo>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct RewardsResponse {
    pub rewards: Vec<RewardTuple>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct OpenPriceResponse {
    pub total: Uint128,
    pub oracle_fee: Uint128,
    pub platform_fee: Uint128,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct ConfigResponse {
    pub config: Config,
}

// Collaborator interfaces, consumed the way the reference contracts expose
// them. Outbound executes are built as raw WasmMsg with the token's code hash.

/// Executed on the randomness oracle; the oracle fee rides along as native
/// funds. The oracle later executes `Fulfill` back on this contract with the
/// same id.
#[derive(Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OracleExecuteMsg {
    RequestRandomness { job_id: u64, callback_gas: u64 },
}

#[derive(Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OracleQueryMsg {
    Fee { callback_gas: u64 },
}

impl Query for OracleQueryMsg {
    const BLOCK_SIZE: usize = BLOCK_SIZE;
}

/// Oracle fee quoted in the oracle's own fee unit.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct OracleFeeResponse {
    pub fee: Uint128,
}

#[derive(Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PriceFeedQueryMsg {
    Rate {},
}

impl Query for PriceFeedQueryMsg {
    const BLOCK_SIZE: usize = BLOCK_SIZE;
}

/// Native units per oracle fee unit, scaled by `RATE_SCALE`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct RateResponse {
    pub rate: Uint128,
}

#[derive(Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FactoryQueryMsg {
    FeePerUnit { lootbox: String },
}

impl Query for FactoryQueryMsg {
    const BLOCK_SIZE: usize = BLOCK_SIZE;
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct FeePerUnitResponse {
    pub fee_per_unit: Uint128,
}

/// SNIP-1155 transfer, built manually for reward payouts.
#[derive(Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Snip1155ExecuteMsg {
    Transfer {
        token_id: String,
        from: Addr,
        recipient: Addr,
        amount: Uint128,
        memo: Option<String>,
        padding: Option<String>,
    },
}

/// Migration message
#[derive(Serialize, Deserialize, JsonSchema)]
pub struct MigrateMsg {}
