use crate::checkpoints::Checkpoint;
use dagchain_primitives::merkle::merkle_root;
use dagchain_primitives::{
    Amount, Block, BlockHeader, Hash, OutPoint, Transaction, TxInput, TxOutput, ATOMS_PER_COIN,
};
use dagchain_utxo::script::OP_RETURN;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Networks with their own genesis block and consensus constants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
    Regtest,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mainnet => f.write_str("mainnet"),
            Self::Testnet => f.write_str("testnet"),
            Self::Regtest => f.write_str("regtest"),
        }
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            "regtest" => Ok(Self::Regtest),
            other => Err(format!("Unknown network: {other}")),
        }
    }
}

/// Consensus constants of a network.
#[derive(Debug, Clone)]
pub struct ChainParams {
    pub network: Network,
    pub genesis_block: Block,
    /// Compact form of the easiest allowed target.
    pub pow_limit_bits: u32,
    /// Desired seconds between main chain blocks.
    pub target_time_per_block: u64,
    /// Number of main chain blocks per difficulty window.
    pub work_diff_window_size: u64,
    /// Number of windows averaged by the retarget.
    pub work_diff_windows: u64,
    /// Weight decay between consecutive windows, as a power of two.
    pub work_diff_alpha: u64,
    /// Bound on how much one retarget can change the target, in either direction.
    pub retarget_adjustment_factor: u64,
    /// Every block keeps the bits of its main parent.
    pub no_retargeting: bool,
    /// Main chain layers before a coinbase output can be spent.
    pub coinbase_maturity: u64,
    /// GHOSTDAG `k`.
    pub anticone_size: u64,
    pub max_block_size: usize,
    pub max_tx_size: usize,
    pub max_sig_ops_per_block: usize,
    /// Seconds a block timestamp may run ahead of the local clock.
    pub max_time_offset: u32,
    pub base_subsidy: u64,
    pub mul_subsidy: u64,
    pub div_subsidy: u64,
    /// Main chain layers between subsidy reductions.
    pub subsidy_reduction_interval: u64,
    /// Confirmations an hourglass block needs to become a checkpoint candidate and the
    /// finality point.
    pub checkpoint_confirmations: u64,
    pub checkpoints: Vec<Checkpoint>,
}

impl ChainParams {
    /// Constructs a new instance of [`ChainParams`].
    pub fn new(network: Network) -> Self {
        match network {
            Network::Mainnet => {
                let pow_limit_bits = 0x1f00ffff;
                Self {
                    network,
                    genesis_block: genesis_block(1_600_000_000, pow_limit_bits, b"dagchain mainnet"),
                    pow_limit_bits,
                    target_time_per_block: 30,
                    work_diff_window_size: 160,
                    work_diff_windows: 20,
                    work_diff_alpha: 1,
                    retarget_adjustment_factor: 2,
                    no_retargeting: false,
                    coinbase_maturity: 720,
                    anticone_size: 3,
                    max_block_size: 1_000_000,
                    max_tx_size: 1_000_000,
                    max_sig_ops_per_block: 20_000,
                    max_time_offset: 2 * 60 * 60,
                    base_subsidy: 12 * ATOMS_PER_COIN,
                    mul_subsidy: 100,
                    div_subsidy: 101,
                    subsidy_reduction_interval: 669_600,
                    checkpoint_confirmations: 1_000,
                    checkpoints: Vec::new(),
                }
            }
            Network::Testnet => {
                let pow_limit_bits = 0x2003ffff;
                Self {
                    network,
                    genesis_block: genesis_block(1_650_000_000, pow_limit_bits, b"dagchain testnet"),
                    pow_limit_bits,
                    target_time_per_block: 30,
                    work_diff_window_size: 60,
                    work_diff_windows: 20,
                    work_diff_alpha: 1,
                    retarget_adjustment_factor: 2,
                    no_retargeting: false,
                    coinbase_maturity: 16,
                    anticone_size: 3,
                    max_block_size: 1_000_000,
                    max_tx_size: 1_000_000,
                    max_sig_ops_per_block: 20_000,
                    max_time_offset: 2 * 60 * 60,
                    base_subsidy: 50 * ATOMS_PER_COIN,
                    mul_subsidy: 100,
                    div_subsidy: 101,
                    subsidy_reduction_interval: 128,
                    checkpoint_confirmations: 100,
                    checkpoints: Vec::new(),
                }
            }
            Network::Regtest => {
                let pow_limit_bits = 0x207fffff;
                Self {
                    network,
                    genesis_block: genesis_block(1_700_000_000, pow_limit_bits, b"dagchain regtest"),
                    pow_limit_bits,
                    target_time_per_block: 1,
                    work_diff_window_size: 8,
                    work_diff_windows: 4,
                    work_diff_alpha: 1,
                    retarget_adjustment_factor: 2,
                    no_retargeting: true,
                    coinbase_maturity: 4,
                    anticone_size: 3,
                    max_block_size: 1_000_000,
                    max_tx_size: 1_000_000,
                    max_sig_ops_per_block: 20_000,
                    max_time_offset: 2 * 60 * 60,
                    base_subsidy: 50 * ATOMS_PER_COIN,
                    mul_subsidy: 1,
                    div_subsidy: 2,
                    subsidy_reduction_interval: 150,
                    checkpoint_confirmations: 16,
                    checkpoints: Vec::new(),
                }
            }
        }
    }

    pub fn genesis_hash(&self) -> Hash {
        self.genesis_block.hash()
    }

    /// Seconds a full difficulty window is expected to take.
    pub fn target_timespan(&self) -> u64 {
        self.target_time_per_block * self.work_diff_window_size
    }
}

fn genesis_block(timestamp: u32, bits: u32, message: &[u8]) -> Block {
    let coinbase = Transaction {
        version: 1,
        lock_time: 0,
        expire: 0,
        inputs: vec![TxInput::new(OutPoint::null(), message.to_vec())],
        outputs: vec![TxOutput::new(Amount::meer(0), vec![OP_RETURN])],
    };

    let header = BlockHeader {
        version: 1,
        parent_root: Hash::ZERO,
        tx_root: merkle_root(&[coinbase.hash()]),
        state_root: Hash::ZERO,
        timestamp,
        bits,
        nonce: 0,
    };

    Block {
        header,
        parents: Vec::new(),
        transactions: vec![coinbase],
    }
}
