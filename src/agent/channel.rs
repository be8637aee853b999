//! Agent forwarding transactions over an unbounded channel to the shipper.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;

use crate::agent::Agent;
use crate::error::AgentError;
use crate::runtime::registry::ValueRegistry;
use crate::transaction::Transaction;

pub struct ChannelAgent {
    enabled: bool,
    registry: Arc<ValueRegistry>,
    sender: mpsc::UnboundedSender<Transaction>,
}

impl ChannelAgent {
    /// Create the agent and the receiving end to hand to
    /// [`run_shipper`](crate::agent::run_shipper).
    pub fn new(
        enabled: bool,
        registry: Arc<ValueRegistry>,
    ) -> (Self, mpsc::UnboundedReceiver<Transaction>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                enabled,
                registry,
                sender,
            },
            receiver,
        )
    }
}

impl Agent for ChannelAgent {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn registry(&self) -> &ValueRegistry {
        &self.registry
    }

    fn add_transaction(&self, mut transaction: Transaction) -> Result<(), AgentError> {
        if !self.enabled {
            return Err(AgentError::Disabled);
        }

        transaction.timestamp = Some(Utc::now());
        self.sender
            .send(transaction)
            .map_err(|_| AgentError::ChannelClosed)
    }
}
