use crate::Error;
use dagchain_primitives::Block;
use dagchain_storage::WriteTransaction;
use dagchain_utxo::SpentTxOut;

/// Optional indexes maintained alongside the chain, such as a transaction or address index.
///
/// Both hooks run inside the database update that connects or disconnects the block, so index
/// writes made through `db_tx` commit atomically with the chain state. Only valid blocks are
/// reported; `stxos` is the spend journal of the block.
pub trait IndexManager: Send + Sync {
    fn connect_block(
        &self,
        db_tx: &mut WriteTransaction<'_>,
        block: &Block,
        stxos: &[SpentTxOut],
    ) -> Result<(), Error>;

    fn disconnect_block(
        &self,
        db_tx: &mut WriteTransaction<'_>,
        block: &Block,
        stxos: &[SpentTxOut],
    ) -> Result<(), Error>;
}
