use cloudpilot_core::domain::capability::{CapabilityDescriptor, CapabilityId};
use cloudpilot_core::errors::CapabilityError;
use serde_json::Value;

/// Immutable catalog of every capability the agent can route to.
///
/// Built once at startup from the closed `CapabilityId` set; there is no way to
/// register or remove an entry afterwards, so the router and the gate always
/// observe the same menu.
#[derive(Clone, Debug)]
pub struct CapabilityRegistry {
    descriptors: Vec<CapabilityDescriptor>,
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self { descriptors: CapabilityId::ALL.into_iter().map(CapabilityDescriptor::for_id).collect() }
    }

    pub fn lookup(&self, name: &str) -> Result<&CapabilityDescriptor, CapabilityError> {
        let id = CapabilityId::parse(name)?;
        self.get(id).ok_or_else(|| CapabilityError::UnknownCapability(name.to_string()))
    }

    pub fn get(&self, id: CapabilityId) -> Option<&CapabilityDescriptor> {
        self.descriptors.iter().find(|descriptor| descriptor.id == id)
    }

    /// Descriptors in declaration order.
    pub fn all(&self) -> &[CapabilityDescriptor] {
        &self.descriptors
    }

    pub fn tool_schemas(&self) -> Vec<Value> {
        self.descriptors.iter().map(CapabilityDescriptor::tool_schema).collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.descriptors.iter().map(CapabilityDescriptor::name).collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
