//! In-memory agent registry.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use conductor_core::workflow::SubAgentReference;

use super::{Agent, AgentResolver, ResolveError};

/// Resolver backed by a map from qualified name (`namespace/name` or `name`)
/// to agent handle.
#[derive(Default, Clone)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent under an un-namespaced name.
    pub fn register(&mut self, name: impl Into<String>, agent: Arc<dyn Agent>) {
        let name = name.into();
        debug!(agent = %name, "Registering agent");
        self.agents.insert(name, agent);
    }

    /// Register an agent under `namespace/name`.
    pub fn register_namespaced(
        &mut self,
        namespace: &str,
        name: &str,
        agent: Arc<dyn Agent>,
    ) {
        self.register(SubAgentReference::namespaced(namespace, name).qualified_name(), agent);
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, agent: Arc<dyn Agent>) -> Self {
        self.register(name, agent);
        self
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl AgentResolver for AgentRegistry {
    fn resolve(&self, reference: &SubAgentReference) -> Result<Arc<dyn Agent>, ResolveError> {
        let key = reference.qualified_name();
        self.agents
            .get(&key)
            .cloned()
            .ok_or(ResolveError::NotFound { reference: key })
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.agents.keys().collect();
        names.sort();
        f.debug_struct("AgentRegistry").field("agents", &names).finish()
    }
}
