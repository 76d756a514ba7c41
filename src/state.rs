use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use secret_toolkit::storage::{Item, Keymap};
use cosmwasm_std::{Addr, Uint128};

/// Minimum gas an opener must budget for the oracle callback.
pub const MIN_CALLBACK_GAS: u64 = 100_000;
/// Price feed rates are fixed-point with six decimals.
pub const RATE_SCALE: u128 = 1_000_000;
/// Block size used to pad outbound SNIP messages.
pub const BLOCK_SIZE: usize = 256;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct Config {
    pub admin: Addr,
    pub factory: Addr,
    pub factory_hash: String,
    pub oracle: Addr,
    pub oracle_hash: String,
    pub price_feed: Addr,
    pub price_feed_hash: String,
    pub payment_denom: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct State {
    /// Whole reward units currently committed to inventory across all entries.
    pub units_supply: Uint128,
    /// Units reserved by pending open requests. Never exceeds `units_supply`.
    pub units_requested: Uint128,
    /// Lifetime box units minted by minters. Monotonic.
    pub units_minted: Uint128,
    pub next_request_id: u64,
    pub paused: bool,
    pub emergency_mode: bool,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Unset,
    Snip20,
    Snip721,
    Snip1155Fungible,
    Snip1155Nft,
}

impl TokenKind {
    pub fn name(&self) -> &'static str {
        match self {
            TokenKind::Unset => "unset",
            TokenKind::Snip20 => "snip20",
            TokenKind::Snip721 => "snip721",
            TokenKind::Snip1155Fungible => "snip1155",
            TokenKind::Snip1155Nft => "snip1155_nft",
        }
    }
}

/// Ledger entry for one allowed reward token. The kind is set by the first
/// successful deposit and never changes afterwards.
///
/// `items` holds SNIP-721 / SNIP-1155 NFT ids in supply order; allocation
/// consumes them from the back, so the most recently supplied ids are spent
/// first. For SNIP-1155 fungible tokens the balances live in `ID_ENTRIES`
/// and `ids` only records which token ids have been seen.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct RewardEntry {
    pub token: Addr,
    pub code_hash: String,
    pub kind: TokenKind,
    pub amount_per_unit: Uint128,
    /// Whether an admin ever configured the rate. First NFT deposits default
    /// the rate to 1 only while this is false.
    pub rate_configured: bool,
    /// Deposited balance. SNIP-20 only.
    pub balance: Uint128,
    pub items: Vec<String>,
    pub ids: Vec<String>,
    /// Whole units committed to inventory. Balance beyond
    /// `units * amount_per_unit` is leftovers.
    pub units: Uint128,
}

/// Per token id ledger for SNIP-1155 fungible entries.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct IdEntry {
    pub balance: Uint128,
    pub amount_per_unit: Uint128,
    pub units: Uint128,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Failed,
}

/// A live open request. Fulfilled requests are deleted on the spot, so only
/// `Pending` and `Failed` are ever stored. The burned boxes are kept verbatim
/// so a failed request can be recovered exactly.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct OpenRequest {
    pub opener: Addr,
    pub units_to_get: Uint128,
    pub box_types: Vec<u64>,
    pub box_amounts: Vec<Uint128>,
    pub status: RequestStatus,
}

/// One allocated reward owed to an opener, pending claim.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct RewardTuple {
    pub token: Addr,
    pub token_id: Option<String>,
    pub amount: Uint128,
}

pub const CONFIG: Item<Config> = Item::new(b"config");
pub const STATE: Item<State> = Item::new(b"state");

// Allow-list: ordered for deterministic allocation and listing.
pub const TOKEN_LIST: Item<Vec<Addr>> = Item::new(b"token_list");
pub const TOKENS: Keymap<Addr, RewardEntry> = Keymap::new(b"tokens");
pub const ID_ENTRIES: Keymap<(Addr, String), IdEntry> = Keymap::new(b"id_entries");

// Role sets, admin managed.
pub const SUPPLIERS: Item<Vec<Addr>> = Item::new(b"suppliers");
pub const MINTERS: Item<Vec<Addr>> = Item::new(b"minters");
pub const PAUSERS: Item<Vec<Addr>> = Item::new(b"pausers");

// Box ledger: box_type doubles as the units one box yields.
pub const BOX_TYPE_LIST: Item<Vec<u64>> = Item::new(b"box_type_list");
pub const BOX_SUPPLY: Keymap<u64, Uint128> = Keymap::new(b"box_supply");
pub const BOX_BALANCES: Keymap<(Addr, u64), Uint128> = Keymap::new(b"box_balances");

// Open request lifecycle, keyed by the self-assigned oracle job id, with one
// live slot per opener.
pub const REQUESTS: Keymap<u64, OpenRequest> = Keymap::new(b"requests");
pub const OPENER_REQUEST: Keymap<Addr, u64> = Keymap::new(b"opener_request");

// Allocated rewards accumulated until claimed.
pub const REWARDS: Keymap<Addr, Vec<RewardTuple>> = Keymap::new(b"rewards");
