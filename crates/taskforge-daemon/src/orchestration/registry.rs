//! Per-user directory of active executions.
//!
//! A thin layer over the orchestrator: it records which user owns which
//! execution and scopes listing/stopping accordingly. No state beyond the
//! ownership table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use super::orchestrator::{ExecutionOrchestrator, OrchestratorError};
use super::types::{ExecutionOptions, ExecutionSnapshot, StartAck, StartRequest};

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("No execution {execution_id} for user {user_id}")]
    NotOwned {
        execution_id: String,
        user_id: String,
    },

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

/// Directory of executions keyed by execution id, scoped per user.
pub struct AgentRegistry {
    orchestrator: Arc<ExecutionOrchestrator>,
    owners: RwLock<HashMap<String, String>>,
}

impl AgentRegistry {
    pub fn new(orchestrator: Arc<ExecutionOrchestrator>) -> Self {
        Self {
            orchestrator,
            owners: RwLock::new(HashMap::new()),
        }
    }

    /// Start work on a task for a user.
    pub async fn start_agent(
        &self,
        task_id: &str,
        options: ExecutionOptions,
        user_id: &str,
    ) -> Result<StartAck, RegistryError> {
        let ack = self
            .orchestrator
            .start(StartRequest {
                task_id: task_id.to_string(),
                user_id: user_id.to_string(),
                options,
            })
            .await?;
        self.owners
            .write()
            .await
            .insert(ack.execution_id.clone(), user_id.to_string());
        info!(user_id, task_id, execution_id = %ack.execution_id, "Registered agent execution");
        Ok(ack)
    }

    /// Snapshot of one execution, restricted to its owner.
    pub async fn agent_status(
        &self,
        execution_id: &str,
        user_id: &str,
    ) -> Result<ExecutionSnapshot, RegistryError> {
        self.check_owner(execution_id, user_id).await?;
        Ok(self.orchestrator.status(execution_id).await?)
    }

    /// All non-terminal executions owned by a user.
    pub async fn active_sessions(&self, user_id: &str) -> Vec<ExecutionSnapshot> {
        self.orchestrator.active(Some(user_id)).await
    }

    /// Stop an execution, restricted to its owner. Idempotent.
    pub async fn stop_agent(
        &self,
        execution_id: &str,
        user_id: &str,
    ) -> Result<(), RegistryError> {
        self.check_owner(execution_id, user_id).await?;
        self.orchestrator.stop(execution_id).await?;
        Ok(())
    }

    /// Evict finished executions together with their ownership records.
    ///
    /// Both tables only grow otherwise; a long-running daemon calls this
    /// periodically. Returns how many executions were evicted.
    pub async fn prune_finished(&self, retention: Duration) -> usize {
        let evicted = self.orchestrator.prune_finished(retention).await;
        if !evicted.is_empty() {
            let mut owners = self.owners.write().await;
            for id in &evicted {
                owners.remove(id);
            }
        }
        evicted.len()
    }

    async fn check_owner(&self, execution_id: &str, user_id: &str) -> Result<(), RegistryError> {
        let owners = self.owners.read().await;
        match owners.get(execution_id) {
            Some(owner) if owner == user_id => Ok(()),
            _ => Err(RegistryError::NotOwned {
                execution_id: execution_id.to_string(),
                user_id: user_id.to_string(),
            }),
        }
    }
}
