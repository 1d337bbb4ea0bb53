//! Wire-format and wallet-policy constants

/// Serialized block header size
pub const HEADER_SIZE: usize = 80;

/// Magic bytes plus the little-endian block length that precede every block
pub const BLOCK_FRAME_PREFIX: usize = 8;

/// Serialized outpoint size: 32-byte tx hash + 4-byte output index
pub const OUTPOINT_SIZE: usize = 36;

/// Outputs created by a coinbase need this many confirmations to be spent
pub const COINBASE_MATURITY: u32 = 120;

/// Confirmations after which a received output stops counting as unconfirmed
pub const MIN_CONFIRMATIONS: u32 = 6;

/// Script length of `OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG`
pub const STD_HASH160_SCRIPT_LEN: usize = 25;

/// Script length of `<65-byte pubkey> OP_CHECKSIG`
pub const STD_PUBKEY65_SCRIPT_LEN: usize = 67;

/// Hash of a coinbase input's previous output
pub const EMPTY_HASH: [u8; 32] = [0u8; 32];

/// Main network genesis block hash (internal byte order)
pub const MAINNET_GENESIS_HASH_HEX: &str =
    "6fe28c0ab6f1b372c1a6a246ae63f74f931e8365e15a089c68d6190000000000";

/// Main network genesis coinbase transaction hash (internal byte order)
pub const MAINNET_GENESIS_TX_HASH_HEX: &str =
    "3ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4a";

/// Main network message start bytes
pub const MAINNET_MAGIC_BYTES_HEX: &str = "f9beb4d9";

/// Test network genesis block hash (internal byte order)
pub const TESTNET_GENESIS_HASH_HEX: &str =
    "43497fd7f826957108f4a30fd9cec3aeba79972084e90ead01ea330900000000";

/// Test network genesis coinbase shares the main network transaction
pub const TESTNET_GENESIS_TX_HASH_HEX: &str =
    "3ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4a";

/// Test network message start bytes
pub const TESTNET_MAGIC_BYTES_HEX: &str = "0b110907";
