use crate::verification::BehaviorFlags;
use dagchain_primitives::{Block, Hash};
use parking_lot::RwLock;
use std::sync::Arc;

/// Chain events delivered to subscribers after the chain lock is released.
#[derive(Debug, Clone)]
pub enum Notification {
    /// A block entered the DAG, whether or not it passed validation.
    BlockAccepted {
        block: Arc<Block>,
        is_main_tip_change: bool,
        flags: BehaviorFlags,
    },
    /// A block got connected to the utxo set.
    BlockConnected { block: Arc<Block> },
    /// A block got disconnected from the utxo set.
    BlockDisconnected { block: Arc<Block> },
    /// Blocks lost their position in the order.
    Reorganization {
        old_tip: Hash,
        new_tip: Hash,
        /// Blocks that lost their order, in the order they were detached.
        detached: Vec<Hash>,
        /// Blocks that received an order, ascending.
        attached: Vec<Hash>,
    },
}

pub type NotificationCallback = Box<dyn Fn(&Notification) + Send + Sync>;

/// Registry of notification subscribers.
#[derive(Default)]
pub struct Notifier {
    callbacks: RwLock<Vec<NotificationCallback>>,
}

impl Notifier {
    pub fn subscribe(&self, callback: NotificationCallback) {
        self.callbacks.write().push(callback);
    }

    pub fn notify(&self, notification: &Notification) {
        for callback in self.callbacks.read().iter() {
            callback(notification);
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("subscribers", &self.callbacks.read().len())
            .finish()
    }
}
