//! Agents receive finished transactions and own the value registry.
//!
//! An agent is built once per process through an [`AgentCell`] and then
//! shared by every mediator.

pub mod channel;
pub mod shipper;
pub mod sink;

use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{AgentError, ConfigError};
use crate::runtime::registry::{ValueRegistry, SELF_APPLICATION_KEY};
use crate::transaction::Transaction;

pub use channel::ChannelAgent;
pub use shipper::run_shipper;
pub use sink::{MemorySink, NdjsonSink, SerializationError, TransactionSink};

/// Receiver of transactions produced by mediation passes.
pub trait Agent: Send + Sync {
    fn is_enabled(&self) -> bool;

    fn registry(&self) -> &ValueRegistry;

    fn new_transaction(&self) -> Transaction {
        Transaction::new()
    }

    /// Hand a transaction over. Must not block the caller.
    fn add_transaction(&self, transaction: Transaction) -> Result<(), AgentError>;
}

/// Check that an enabled agent knows the mediating host's own application.
pub fn validate_agent(agent: &dyn Agent) -> Result<(), ConfigError> {
    if agent.is_enabled() && !agent.registry().application_exists(SELF_APPLICATION_KEY) {
        return Err(ConfigError::MissingSelfApplication(SELF_APPLICATION_KEY.to_string()));
    }
    Ok(())
}

/// Process-wide slot holding the agent once it has been built.
///
/// The lock is held for the whole build, so concurrent callers wait for the
/// first initializer and then reuse its agent. A failed build leaves the
/// slot empty and the next caller tries again.
#[derive(Default)]
pub struct AgentCell {
    slot: Mutex<Option<Arc<dyn Agent>>>,
}

impl AgentCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<dyn Agent>> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get_or_try_init<F>(&self, init: F) -> Result<Arc<dyn Agent>, ConfigError>
    where
        F: FnOnce() -> Result<Arc<dyn Agent>, ConfigError>,
    {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(agent) = slot.as_ref() {
            return Ok(Arc::clone(agent));
        }

        let agent = init()?;
        validate_agent(agent.as_ref())?;

        tracing::info!(enabled = agent.is_enabled(), "agent initialized");
        *slot = Some(Arc::clone(&agent));
        Ok(agent)
    }
}
