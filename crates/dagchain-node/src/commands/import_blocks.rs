use crate::block_file::BlockFileReader;
use crate::cli::CommonParams;
use crate::{Error, Result};
use dagchain_consensus::BehaviorFlags;
use std::path::PathBuf;
use std::time::{Duration, Instant};

const INTERVAL: Duration = Duration::from_secs(5);

/// Import blocks from a block file.
#[derive(Debug, clap::Parser)]
pub struct ImportBlocks {
    /// Path to the block file.
    pub path: PathBuf,

    /// Skip the difficulty and script checks.
    ///
    /// Only for block files from a trusted source.
    #[clap(long)]
    pub fast_add: bool,

    /// Number of blocks to import.
    ///
    /// The process will stop after importing the specified number of blocks.
    #[clap(long)]
    pub block_count: Option<usize>,

    #[allow(missing_docs)]
    #[clap(flatten)]
    pub common_params: CommonParams,
}

#[derive(Debug, Default)]
struct ImportStats {
    imported: usize,
    known: usize,
    orphans: usize,
    invalid: usize,
}

impl ImportBlocks {
    pub fn run(self) -> Result<()> {
        let chain = self.common_params.open_chain()?;
        let reader = BlockFileReader::open(&self.path)?;

        let flags = if self.fast_add {
            BehaviorFlags::FAST_ADD
        } else {
            BehaviorFlags::empty()
        };

        tracing::info!("Start to import blocks from {}", self.path.display());

        let mut stats = ImportStats::default();
        let mut last_update = Instant::now();
        let mut last_imported = 0;

        for block in reader {
            let block = block?;
            let hash = block.hash();

            if chain.have_block(&hash) {
                stats.known += 1;
                continue;
            }

            match chain.process_block(block, flags) {
                Ok(true) => stats.orphans += 1,
                Ok(false) => stats.imported += 1,
                Err(dagchain_consensus::Error::Rule(err)) => {
                    tracing::warn!("Block {hash} is invalid: {err}");
                    stats.invalid += 1;
                }
                Err(err) => return Err(Error::Chain(err)),
            }

            let now = Instant::now();
            if now > last_update + INTERVAL {
                let speed = calculate_import_speed(stats.imported - last_imported, last_update);
                let best = chain.best_snapshot();
                tracing::info!(
                    "Imported {} blocks,{speed}, best order {} ({})",
                    stats.imported,
                    best.graph_state.main_order,
                    best.hash,
                );
                last_imported = stats.imported;
                last_update = now;
            }

            if self
                .block_count
                .is_some_and(|block_count| stats.imported == block_count)
            {
                break;
            }
        }

        tracing::info!(
            "Imported {} blocks, {} already known, {} orphans, {} invalid",
            stats.imported,
            stats.known,
            stats.orphans,
            stats.invalid,
        );

        Ok(())
    }
}

/// Calculates `imported / (now - last_update)` and returns a `String` representing the speed
/// of import.
fn calculate_import_speed(imported: usize, last_update: Instant) -> String {
    let elapsed_ms = last_update.elapsed().as_millis().max(1);
    let speed = imported as u128 * 1000 / elapsed_ms;
    format!(" {speed} bps")
}
