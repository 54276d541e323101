use crate::cli::CommonParams;
use crate::Result;
use serde::Serialize;

/// Print the best state of the chain.
#[derive(Debug, clap::Parser)]
pub struct Info {
    /// Count the entries of the utxo set, which walks the whole set.
    #[clap(long)]
    pub utxo_count: bool,

    #[allow(missing_docs)]
    #[clap(flatten)]
    pub common_params: CommonParams,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChainInfo {
    network: String,
    best_hash: String,
    main_height: u64,
    main_order: u64,
    total_blocks: u64,
    tips: Vec<String>,
    bits: String,
    median_time: u32,
    total_txns: u64,
    total_subsidy: u64,
    work_sum: String,
    latest_checkpoint: Option<u64>,
    is_current: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    utxo_count: Option<u64>,
}

impl Info {
    pub fn run(self) -> Result<()> {
        let chain = self.common_params.open_chain()?;
        let best = chain.best_snapshot();

        let utxo_count = if self.utxo_count {
            Some(chain.chain_db().utxo_count()?)
        } else {
            None
        };

        let info = ChainInfo {
            network: chain.params().network.to_string(),
            best_hash: best.hash.to_string(),
            main_height: best.graph_state.main_height,
            main_order: best.graph_state.main_order,
            total_blocks: best.graph_state.total_blocks,
            tips: best.graph_state.tips.iter().map(ToString::to_string).collect(),
            bits: format!("{:08x}", best.bits),
            median_time: best.median_time,
            total_txns: best.total_txns,
            total_subsidy: best.total_subsidy,
            work_sum: best.work_sum.to_str_radix(16),
            latest_checkpoint: chain.latest_checkpoint().map(|checkpoint| checkpoint.layer),
            is_current: chain.is_current(),
            utxo_count,
        };

        println!("{}", serde_json::to_string_pretty(&info)?);

        Ok(())
    }
}
