use cloudpilot_agent::CapabilityRegistry;

use super::CommandResult;

pub fn run() -> CommandResult {
    let registry = CapabilityRegistry::new();
    CommandResult::json("capabilities", &registry.all())
}
