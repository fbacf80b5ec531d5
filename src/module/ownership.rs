// ABOUTME: ToolOwnership - the global table mapping tool names to the module
// ABOUTME: that owns them. Created once at the composition root and shared.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;

/// Outcome of trying to claim a tool name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// The name is now owned by the claimant.
    Granted,
    /// The name was already owned by another module.
    Taken { owner: String },
}

/// Maps each tool name to its owning module id.
///
/// At most one owner per name. Reads are public; claims and releases are
/// crate-private so only module registration and the loader mutate it.
/// Clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct ToolOwnership {
    owners: Arc<RwLock<HashMap<String, String>>>,
}

impl ToolOwnership {
    pub fn new() -> Self {
        Self::default()
    }

    /// The module owning `tool`, if any.
    pub async fn owner_of(&self, tool: &str) -> Option<String> {
        self.owners.read().await.get(tool).cloned()
    }

    pub async fn is_owned(&self, tool: &str) -> bool {
        self.owners.read().await.contains_key(tool)
    }

    /// Snapshot of the whole table, sorted by tool name.
    pub async fn snapshot(&self) -> BTreeMap<String, String> {
        self.owners
            .read()
            .await
            .iter()
            .map(|(tool, module)| (tool.clone(), module.clone()))
            .collect()
    }

    /// Tool names owned by `module`, sorted.
    pub async fn tools_of(&self, module: &str) -> Vec<String> {
        let mut tools: Vec<_> = self
            .owners
            .read()
            .await
            .iter()
            .filter(|(_, owner)| owner.as_str() == module)
            .map(|(tool, _)| tool.clone())
            .collect();
        tools.sort();
        tools
    }

    pub async fn len(&self) -> usize {
        self.owners.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.owners.read().await.is_empty()
    }

    /// Atomically claim `tool` for `module`.
    pub(crate) async fn claim(&self, tool: &str, module: &str) -> Claim {
        let mut owners = self.owners.write().await;
        match owners.get(tool) {
            Some(owner) => Claim::Taken {
                owner: owner.clone(),
            },
            None => {
                owners.insert(tool.to_string(), module.to_string());
                Claim::Granted
            }
        }
    }

    /// Release `tool` if `module` owns it. Returns whether an entry was removed.
    pub(crate) async fn release(&self, tool: &str, module: &str) -> bool {
        let mut owners = self.owners.write().await;
        if owners.get(tool).is_some_and(|owner| owner == module) {
            owners.remove(tool);
            true
        } else {
            false
        }
    }
}
