use super::{best_chain_state, index_entry, make_best_state, unix_time, BlockChain, ChainState};
use crate::difficulty::calc_easiest_difficulty;
use crate::error::{ErrorCode, RuleError};
use crate::notifications::Notification;
use crate::verification::{self, check_transaction_inputs, BehaviorFlags};
use crate::Error;
use dagchain_dag::{AddBlockOutcome, BlockDag, BlockStatus, NodeId};
use dagchain_primitives::pow::compact_to_big;
use dagchain_primitives::{Block, Hash, OutPoint, Transaction};
use dagchain_utxo::{count_spent_outputs, SpentTxOut, UtxoViewpoint};
use indexmap::IndexMap;
use std::collections::VecDeque;
use std::sync::Arc;

impl BlockChain {
    /// Processes a block received from the network or an import.
    ///
    /// Returns `Ok(true)` if the block is an orphan waiting for unknown parents. A block that
    /// entered the DAG but failed validation is kept in the DAG, marked as failed and reported
    /// with its rule error.
    ///
    /// Notifications are delivered after the chain lock is released.
    pub fn process_block(&self, block: Block, flags: BehaviorFlags) -> Result<bool, Error> {
        let block = Arc::new(block);
        let mut notifications = Vec::new();

        let result = {
            let mut state = self.state.write();
            self.process_block_locked(&mut state, block, flags, &mut notifications)
        };

        for notification in &notifications {
            self.notifier.notify(notification);
        }

        result
    }

    fn process_block_locked(
        &self,
        state: &mut ChainState,
        block: Arc<Block>,
        flags: BehaviorFlags,
        notifications: &mut Vec<Notification>,
    ) -> Result<bool, Error> {
        let hash = block.hash();
        tracing::trace!("Processing block {hash} with {flags:?}");

        if state.dag.index().have_block(&hash) {
            return Err(
                RuleError::new(ErrorCode::DuplicateBlock, format!("Already have block {hash}"))
                    .into(),
            );
        }

        if self.orphans.read().is_orphan(&hash) {
            return Err(RuleError::new(
                ErrorCode::DuplicateBlock,
                format!("Already have block {hash} as orphan"),
            )
            .into());
        }

        verification::check_block_sanity(&block, &self.params, flags, unix_time())?;

        if let Some(checkpoint) = state.checkpoints.find_previous(&state.dag) {
            let checkpoint = state.dag.node(checkpoint);
            let header = &block.header;

            if header.timestamp < checkpoint.timestamp() {
                return Err(RuleError::new(
                    ErrorCode::CheckpointTimeTooOld,
                    format!(
                        "Block {hash} has timestamp {} before the last checkpoint timestamp {}",
                        header.timestamp,
                        checkpoint.timestamp()
                    ),
                )
                .into());
            }

            if !flags.contains(BehaviorFlags::FAST_ADD) {
                let duration = u64::from(header.timestamp - checkpoint.timestamp());
                let required = calc_easiest_difficulty(checkpoint.bits(), duration, &self.params);
                if compact_to_big(header.bits) > compact_to_big(required) {
                    return Err(RuleError::new(
                        ErrorCode::DifficultyTooLow,
                        format!(
                            "Block {hash} target difficulty of {:08x} is too low when compared \
                            to the previous checkpoint",
                            header.bits
                        ),
                    )
                    .into());
                }
            }
        }

        let missing = verification::missing_parents(&block, |parent| {
            state.dag.index().have_block(parent)
        });
        if !missing.is_empty() {
            tracing::debug!(
                "Adding orphan block {hash} with {} unknown parents",
                missing.len()
            );
            self.orphans
                .write()
                .insert_orphan_block(block, state.dag.main_height());
            return Ok(true);
        }

        let validation_error = self.maybe_accept_block(state, block, flags, notifications)?;

        self.process_orphans(state, hash, flags, notifications)?;

        match validation_error {
            Some(err) => Err(err.into()),
            None => Ok(false),
        }
    }

    /// Inserts a block whose parents are all known and replays the utxo set.
    ///
    /// Errors mean the block was rejected without entering the DAG. `Ok(Some(_))` means the
    /// block entered the DAG but failed validation.
    fn maybe_accept_block(
        &self,
        state: &mut ChainState,
        block: Arc<Block>,
        flags: BehaviorFlags,
        notifications: &mut Vec<Notification>,
    ) -> Result<Option<RuleError>, Error> {
        let hash = block.hash();
        let parents = state.dag.resolve_parents(hash, &block.parents)?;

        if parents
            .iter()
            .all(|parent| state.dag.index_mut().has_invalid_ancestry(*parent))
        {
            return Err(RuleError::new(
                ErrorCode::InvalidAncestorBlock,
                format!("Every parent of block {hash} is known to be invalid"),
            )
            .into());
        }

        let main_parent = state.dag.select_parent(&parents);
        verification::check_block_context(
            &block,
            state.dag.index(),
            main_parent,
            &self.params,
            flags,
        )?;

        let layer = state.dag.node(main_parent).layer() + 1;
        if !state.checkpoints.verify(layer, &hash) {
            return Err(RuleError::new(
                ErrorCode::BadCheckpoint,
                format!("Block {hash} at layer {layer} does not match the checkpoint"),
            )
            .into());
        }

        if let Some(checkpoint) = state.checkpoints.find_previous(&state.dag) {
            let checkpoint_layer = state.dag.node(checkpoint).layer();
            if layer < checkpoint_layer {
                return Err(RuleError::new(
                    ErrorCode::ForkTooOld,
                    format!(
                        "Block {hash} at layer {layer} forks the main chain before the \
                        checkpoint at layer {checkpoint_layer}"
                    ),
                )
                .into());
            }
        }

        let old_tip = state
            .dag
            .main_tip()
            .map(|tip| state.dag.node(tip).hash())
            .unwrap_or(Hash::ZERO);

        let outcome = state.dag.add_block(&block)?;
        state
            .dag
            .index_mut()
            .set_status_flags(outcome.node, BlockStatus::DATA_STORED);
        state.total_txns += block.transactions.len() as u64;

        tracing::debug!(
            "Inserted block {hash} at layer {layer}, {} new orders, {} old orders",
            outcome.new_orders.len(),
            outcome.old_orders.len()
        );

        let result = self.connect_dag_chain(state, &block, &outcome, old_tip, flags, notifications);
        if let Err(err) = &result {
            tracing::error!("Failed to commit block {hash}, reloading the chain state: {err}");
            if let Err(reload_err) = self.reload_chain_state(state) {
                panic!(
                    "In-memory chain state diverged from the database after failing to commit \
                    block {hash}: {reload_err}"
                );
            }
        }
        result
    }

    /// Replays the order change of an insertion against the utxo set and commits it.
    ///
    /// Blocks that lost their position are disconnected newest first, then every block with a
    /// new position is validated and connected in order. Blocks failing validation keep their
    /// position and get an empty spend journal.
    fn connect_dag_chain(
        &self,
        state: &mut ChainState,
        block: &Arc<Block>,
        outcome: &AddBlockOutcome,
        old_tip: Hash,
        flags: BehaviorFlags,
        notifications: &mut Vec<Notification>,
    ) -> Result<Option<RuleError>, Error> {
        let db = &*self.db;
        let mut view = UtxoViewpoint::new();
        let mut journals = IndexMap::<Hash, Option<Vec<SpentTxOut>>>::new();
        let mut total_subsidy = state.total_subsidy;

        let mut detached = Vec::new();
        let mut detached_hashes = Vec::with_capacity(outcome.old_orders.len());
        for &node in outcome.old_orders.iter().rev() {
            let hash = state.dag.node(node).hash();

            if state.dag.node(node).status().contains(BlockStatus::VALID) {
                let old_block = Arc::new(self.stored_block(&hash)?);
                let stxos = db.spend_journal(&hash)?;
                view.disconnect_transactions(db, &old_block.transactions, hash, &stxos)?;
                total_subsidy = total_subsidy.saturating_sub(
                    self.subsidy_cache
                        .calc_block_subsidy(state.dag.node(node).layer()),
                );
                tracing::debug!("Disconnected block {hash}");
                detached.push((old_block, stxos));
            }

            state
                .dag
                .index_mut()
                .unset_status_flags(node, BlockStatus::VALID | BlockStatus::VALIDATE_FAILED);
            journals.insert(hash, None);
            detached_hashes.push(hash);
        }

        let checkpoint_layer = state
            .checkpoints
            .find_previous(&state.dag)
            .map(|checkpoint| state.dag.node(checkpoint).layer());

        let mut attached = Vec::new();
        let mut validation_error = None;
        for &node in &outcome.new_orders {
            let hash = state.dag.node(node).hash();
            let layer = state.dag.node(node).layer();
            let ordered_block = if node == outcome.node {
                block.clone()
            } else {
                Arc::new(self.stored_block(&hash)?)
            };

            let skip_scripts = flags.contains(BehaviorFlags::FAST_ADD)
                || checkpoint_layer.is_some_and(|checkpoint_layer| layer <= checkpoint_layer);

            let result =
                match self.connect_block(&state.dag, &mut view, node, &ordered_block, skip_scripts)
                {
                    Ok(stxos) => Ok(stxos),
                    Err(Error::Rule(err)) => Err(err),
                    Err(err) => return Err(err),
                };

            match result {
                Ok(stxos) => {
                    state
                        .dag
                        .index_mut()
                        .set_status_flags(node, BlockStatus::VALID);
                    total_subsidy += self.subsidy_cache.calc_block_subsidy(layer);
                    tracing::debug!("Connected block {hash} with {} spent outputs", stxos.len());
                    journals.insert(hash, Some(stxos.clone()));
                    attached.push((ordered_block, stxos));
                }
                Err(err) => {
                    tracing::debug!("Block {hash} failed validation: {err}");
                    state
                        .dag
                        .index_mut()
                        .set_status_flags(node, BlockStatus::VALIDATE_FAILED);
                    journals.insert(hash, Some(Vec::new()));
                    if node == outcome.node {
                        validation_error = Some(err);
                    }
                }
            }
        }

        let index_entries = state
            .dag
            .index_mut()
            .take_dirty()
            .into_iter()
            .map(|node| index_entry(&state.dag, node))
            .collect::<Vec<_>>();

        let orders = outcome
            .new_orders
            .iter()
            .map(|node| {
                let node = state.dag.node(*node);
                let order = node.order().expect("Nodes with a new position are ordered; qed");
                (order, node.hash())
            })
            .collect::<Vec<_>>();
        let order_len = state.dag.order().len() as u64;

        let (block_size, num_txns) = if outcome.main_tip_changed {
            (block.size() as u64, block.transactions.len() as u64)
        } else {
            let previous = self.best_state.read();
            (previous.block_size, previous.num_txns)
        };
        let best_state = make_best_state(
            &state.dag,
            state.total_txns,
            total_subsidy,
            block_size,
            num_txns,
        );

        db.update(|db_tx| -> Result<(), Error> {
            db_tx.put_block(block)?;

            for entry in &index_entries {
                db_tx.put_block_index_entry(entry)?;
            }

            for (order, hash) in &orders {
                db_tx.put_order(*order, hash)?;
            }
            for order in order_len..outcome.previous_order_len {
                db_tx.delete_order(order)?;
            }

            for (hash, journal) in &journals {
                match journal {
                    Some(stxos) => db_tx.put_spend_journal(hash, stxos)?,
                    None => db_tx.delete_spend_journal(hash)?,
                }
            }

            db_tx.put_utxo_view(&view)?;
            db_tx.put_best_chain_state(&best_chain_state(&best_state))?;
            db_tx.put_total_subsidy(total_subsidy)?;

            if let Some(index_manager) = &self.index_manager {
                for (old_block, stxos) in &detached {
                    index_manager.disconnect_block(db_tx, old_block, stxos)?;
                }
                for (new_block, stxos) in &attached {
                    index_manager.connect_block(db_tx, new_block, stxos)?;
                }
            }

            Ok(())
        })?;

        view.commit();
        tracing::trace!("Utxo view holds {} entries after commit", view.len());
        state.total_subsidy = total_subsidy;

        if outcome.main_tip_changed {
            tracing::debug!(
                "New main tip {} at layer {}",
                best_state.hash,
                best_state.graph_state.main_height
            );
        }

        let new_tip = best_state.hash;
        *self.best_state.write() = Arc::new(best_state);

        if !outcome.old_orders.is_empty() {
            tracing::info!(
                "Reorganized {} blocks, main tip {old_tip} -> {new_tip}",
                detached_hashes.len()
            );
        }

        for (old_block, _) in detached {
            notifications.push(Notification::BlockDisconnected { block: old_block });
        }

        if !outcome.old_orders.is_empty() {
            notifications.push(Notification::Reorganization {
                old_tip,
                new_tip,
                detached: detached_hashes,
                attached: outcome
                    .new_orders
                    .iter()
                    .map(|node| state.dag.node(*node).hash())
                    .collect(),
            });
        }

        for (new_block, _) in attached {
            notifications.push(Notification::BlockConnected { block: new_block });
        }

        notifications.push(Notification::BlockAccepted {
            block: block.clone(),
            is_main_tip_change: outcome.main_tip_changed,
            flags,
        });

        Ok(validation_error)
    }

    /// Validates the transactions of an ordered block against `view` and connects them.
    ///
    /// On failure the view is restored to its state before the call.
    fn connect_block(
        &self,
        dag: &BlockDag,
        view: &mut UtxoViewpoint,
        node: NodeId,
        block: &Block,
        skip_scripts: bool,
    ) -> Result<Vec<SpentTxOut>, Error> {
        let db = &*self.db;
        let hash = dag.node(node).hash();
        let layer = dag.node(node).layer();

        view.fetch_input_utxos(db, &block.transactions, |origin| {
            dag.index()
                .lookup_node(origin)
                .is_some_and(|origin| origin.status().known_invalid())
        })?;

        let own_outputs = block
            .transactions
            .iter()
            .flat_map(|tx| {
                let tx_hash = tx.hash();
                (0..tx.outputs.len() as u32).map(move |index| OutPoint::new(tx_hash, index))
            })
            .collect::<Vec<_>>();
        view.fetch_utxos(db, own_outputs.iter().copied())?;

        if let Some(outpoint) = own_outputs.iter().find(|outpoint| {
            view.lookup_entry(outpoint)
                .is_some_and(|entry| !entry.is_spent())
        }) {
            return Err(RuleError::new(
                ErrorCode::OverwriteTx,
                format!(
                    "Block {hash} tries to overwrite transaction {} that has unspent outputs",
                    outpoint.hash
                ),
            )
            .into());
        }

        let mut stxos = Vec::with_capacity(count_spent_outputs(&block.transactions));
        let mut fees = 0u64;

        for (tx_index, tx) in block.transactions.iter().enumerate() {
            if !tx.is_coinbase() {
                let current: &UtxoViewpoint = view;
                let checked = check_transaction_inputs(
                    tx,
                    layer,
                    current,
                    |origin| dag.index().lookup_node(origin).map(|origin| origin.layer()),
                    self.params.coinbase_maturity,
                )
                .and_then(|fee| {
                    if !skip_scripts {
                        self.verify_scripts(tx, current)?;
                    }
                    Ok(fee)
                });

                match checked {
                    Ok(fee) => fees = fees.saturating_add(fee),
                    Err(err) => {
                        view.disconnect_transactions(
                            db,
                            &block.transactions[..tx_index],
                            hash,
                            &stxos,
                        )?;
                        return Err(err.into());
                    }
                }
            }

            view.connect_transaction(tx, tx_index as u32, hash, Some(&mut stxos));
        }

        let subsidy = self.subsidy_cache.calc_block_subsidy(layer);
        let coinbase_value = block
            .transactions
            .first()
            .map(|coinbase| {
                coinbase
                    .outputs
                    .iter()
                    .fold(0u64, |total, output| total.saturating_add(output.amount.value))
            })
            .unwrap_or_default();

        if coinbase_value > subsidy.saturating_add(fees) {
            view.disconnect_transactions(db, &block.transactions, hash, &stxos)?;
            return Err(RuleError::new(
                ErrorCode::BadCoinbaseValue,
                format!(
                    "Coinbase transaction of block {hash} pays {coinbase_value} which is more \
                    than expected value of {}",
                    subsidy.saturating_add(fees)
                ),
            )
            .into());
        }

        Ok(stxos)
    }

    fn verify_scripts(&self, tx: &Transaction, view: &UtxoViewpoint) -> Result<(), RuleError> {
        let tx_hash = tx.hash();
        for (index, input) in tx.inputs.iter().enumerate() {
            let outpoint = input.previous_out;
            let prev = view.lookup_entry(&outpoint).ok_or_else(|| {
                RuleError::new(
                    ErrorCode::MissingTxOut,
                    format!("Output {outpoint} referenced from transaction {tx_hash}:{index} is unknown"),
                )
            })?;

            self.script_verifier
                .verify_input(tx, index, prev)
                .map_err(|err| {
                    RuleError::new(
                        ErrorCode::ScriptValidation,
                        format!(
                            "Failed to validate input {tx_hash}:{index} which references output \
                            {outpoint}: {err}"
                        ),
                    )
                })?;
        }
        Ok(())
    }

    /// Accepts the orphans waiting for `hash`, and recursively the orphans waiting for them.
    ///
    /// A database failure stops the loop; blocks accepted before it stay accepted.
    fn process_orphans(
        &self,
        state: &mut ChainState,
        hash: Hash,
        flags: BehaviorFlags,
        notifications: &mut Vec<Notification>,
    ) -> Result<(), Error> {
        let mut queue = VecDeque::from([hash]);

        while let Some(parent) = queue.pop_front() {
            let ready = self
                .orphans
                .write()
                .remove_blocks_for_parent(&parent, |hash| state.dag.index().have_block(hash));

            for orphan in ready {
                let orphan_hash = orphan.hash();
                tracing::debug!("Processing orphan block {orphan_hash} with parent {parent}");

                match self.maybe_accept_block(state, orphan, flags, notifications) {
                    Ok(None) => {}
                    Ok(Some(err)) => {
                        tracing::debug!("Orphan block {orphan_hash} failed validation: {err}");
                    }
                    Err(Error::Rule(err)) => {
                        tracing::debug!("Rejected orphan block {orphan_hash}: {err}");
                        continue;
                    }
                    Err(err) => return Err(err),
                }

                queue.push_back(orphan_hash);
            }
        }

        Ok(())
    }
}
