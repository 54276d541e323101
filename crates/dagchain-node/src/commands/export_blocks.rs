use crate::block_file::BlockFileWriter;
use crate::cli::CommonParams;
use crate::Result;
use dagchain_storage::Error as StorageError;
use std::path::PathBuf;

/// Export every block except genesis into a block file, in arrival order.
///
/// Parents always precede their children, so the file can be replayed with `import-blocks`.
#[derive(Debug, clap::Parser)]
pub struct ExportBlocks {
    /// Path of the block file to create.
    pub path: PathBuf,

    #[allow(missing_docs)]
    #[clap(flatten)]
    pub common_params: CommonParams,
}

impl ExportBlocks {
    pub fn run(self) -> Result<()> {
        let chain = self.common_params.open_chain()?;
        let db = chain.chain_db();
        let mut writer = BlockFileWriter::create(&self.path)?;

        let mut exported = 0;
        for entry in db.block_index_entries()?.into_iter().skip(1) {
            let hash = entry.hash();
            let block = db.block(&hash)?.ok_or_else(|| {
                StorageError::Corruption(format!("Block {hash} is missing from the database"))
            })?;
            writer.write_block(&block)?;
            exported += 1;
        }
        writer.finish()?;

        tracing::info!("Exported {exported} blocks to {}", self.path.display());

        Ok(())
    }
}
