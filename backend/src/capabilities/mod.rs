//! The gateway's capability catalogue.

pub mod prompts;
pub mod resources;
pub mod tools;

use std::sync::Arc;

use crate::error::RegistryError;
use crate::mcp::CapabilityRegistry;
use crate::plantuml::PlantUmlClient;

/// Build the registry served to every session.
pub fn build_registry(client: Arc<PlantUmlClient>) -> Result<CapabilityRegistry, RegistryError> {
    CapabilityRegistry::builder()
        .tool(tools::GenerateDiagram::new(client.clone()))
        .tool(tools::EncodePlantUml::new(client.clone()))
        .tool(tools::DecodePlantUml)
        .tool(tools::GenerateSequenceDiagram::new(client.clone()))
        .tool(tools::GenerateArchitectureDiagram::new(client))
        .prompt(prompts::ErrorHandlingPrompt)
        .prompt(prompts::DiagramFromDescriptionPrompt)
        .resource(resources::quick_reference())
        .resource(resources::error_handling())
        .build()
}
