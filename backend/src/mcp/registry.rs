//! Capability registry: the tools, prompts and resources a session can reach.
//!
//! The registry is assembled once at startup and shared read-only by every
//! session. Names (and resource URIs) are unique within their category, and
//! listings come back in registration order.

use async_trait::async_trait;
use plantuml_mcp_types::{
    mcp::{GetPromptResult, ReadResourceResult, ResourceContents},
    CallToolResult, CapabilityKind, PromptDescriptor, ResourceDescriptor, ToolDescriptor,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::outbound::SessionLogger;
use crate::error::{InvocationError, RegistryError};

/// What a tool handler gets besides its arguments.
#[derive(Clone)]
pub struct ToolContext {
    pub session_id: String,
    pub logger: SessionLogger,
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;

    /// Run the tool. Domain failures belong in the returned result with
    /// `is_error` set; `Err` is for arguments the tool cannot work with.
    async fn call(&self, arguments: Value, ctx: ToolContext)
        -> Result<CallToolResult, InvocationError>;
}

pub trait PromptHandler: Send + Sync {
    fn descriptor(&self) -> PromptDescriptor;

    fn render(&self, arguments: &HashMap<String, String>)
        -> Result<GetPromptResult, InvocationError>;
}

/// A static text document.
#[derive(Debug, Clone)]
pub struct StaticResource {
    pub descriptor: ResourceDescriptor,
    pub text: &'static str,
}

#[derive(Default)]
pub struct CapabilityRegistry {
    tools: Vec<(ToolDescriptor, Arc<dyn ToolHandler>)>,
    prompts: Vec<(PromptDescriptor, Arc<dyn PromptHandler>)>,
    resources: Vec<StaticResource>,
}

impl CapabilityRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|(d, _)| d.clone()).collect()
    }

    pub fn list_prompts(&self) -> Vec<PromptDescriptor> {
        self.prompts.iter().map(|(d, _)| d.clone()).collect()
    }

    pub fn list_resources(&self) -> Vec<ResourceDescriptor> {
        self.resources.iter().map(|r| r.descriptor.clone()).collect()
    }

    pub fn has_tools(&self) -> bool {
        !self.tools.is_empty()
    }

    pub fn has_prompts(&self) -> bool {
        !self.prompts.is_empty()
    }

    pub fn has_resources(&self) -> bool {
        !self.resources.is_empty()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tool(name).is_some()
    }

    fn tool(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools
            .iter()
            .find(|(d, _)| d.name == name)
            .map(|(_, h)| h.clone())
    }

    pub async fn invoke_tool(
        &self,
        name: &str,
        arguments: Value,
        ctx: ToolContext,
    ) -> Result<CallToolResult, InvocationError> {
        let handler = self
            .tool(name)
            .ok_or_else(|| InvocationError::unknown(CapabilityKind::Tool, name))?;
        handler.call(arguments, ctx).await
    }

    pub fn get_prompt(
        &self,
        name: &str,
        arguments: &HashMap<String, String>,
    ) -> Result<GetPromptResult, InvocationError> {
        let (descriptor, handler) = self
            .prompts
            .iter()
            .find(|(d, _)| d.name == name)
            .ok_or_else(|| InvocationError::unknown(CapabilityKind::Prompt, name))?;

        for argument in descriptor.arguments.iter().filter(|a| a.required) {
            let present = arguments
                .get(&argument.name)
                .map(|v| !v.trim().is_empty())
                .unwrap_or(false);
            if !present {
                return Err(InvocationError::InvalidArguments(format!(
                    "Missing required argument '{}'",
                    argument.name
                )));
            }
        }

        handler.render(arguments)
    }

    pub fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, InvocationError> {
        let resource = self
            .resources
            .iter()
            .find(|r| r.descriptor.uri == uri)
            .ok_or_else(|| InvocationError::unknown(CapabilityKind::Resource, uri))?;

        Ok(ReadResourceResult {
            contents: vec![ResourceContents {
                uri: resource.descriptor.uri.clone(),
                mime_type: resource.descriptor.mime_type.clone(),
                text: resource.text.to_string(),
            }],
        })
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    tools: Vec<Arc<dyn ToolHandler>>,
    prompts: Vec<Arc<dyn PromptHandler>>,
    resources: Vec<StaticResource>,
}

impl RegistryBuilder {
    pub fn tool(mut self, handler: impl ToolHandler + 'static) -> Self {
        self.tools.push(Arc::new(handler));
        self
    }

    pub fn prompt(mut self, handler: impl PromptHandler + 'static) -> Self {
        self.prompts.push(Arc::new(handler));
        self
    }

    pub fn resource(mut self, resource: StaticResource) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn build(self) -> Result<CapabilityRegistry, RegistryError> {
        let mut registry = CapabilityRegistry::default();

        let mut seen = HashSet::new();
        for handler in self.tools {
            let descriptor = handler.descriptor();
            if !seen.insert(descriptor.name.clone()) {
                return Err(RegistryError::Duplicate {
                    kind: CapabilityKind::Tool,
                    name: descriptor.name,
                });
            }
            registry.tools.push((descriptor, handler));
        }

        let mut seen = HashSet::new();
        for handler in self.prompts {
            let descriptor = handler.descriptor();
            if !seen.insert(descriptor.name.clone()) {
                return Err(RegistryError::Duplicate {
                    kind: CapabilityKind::Prompt,
                    name: descriptor.name,
                });
            }
            registry.prompts.push((descriptor, handler));
        }

        let mut seen = HashSet::new();
        for resource in self.resources {
            if !seen.insert(resource.descriptor.uri.clone()) {
                return Err(RegistryError::Duplicate {
                    kind: CapabilityKind::Resource,
                    name: resource.descriptor.uri,
                });
            }
            registry.resources.push(resource);
        }

        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::outbound::{LogFloor, Outbound};
    use plantuml_mcp_types::{mcp::PromptMessage, Content, PromptArgument};
    use serde_json::json;

    struct Echo(&'static str);

    #[async_trait]
    impl ToolHandler for Echo {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor {
                name: self.0.to_string(),
                description: "Echo arguments".to_string(),
                input_schema: json!({"type": "object"}),
                output_schema: None,
            }
        }

        async fn call(
            &self,
            arguments: Value,
            _ctx: ToolContext,
        ) -> Result<CallToolResult, InvocationError> {
            Ok(CallToolResult::success(vec![], arguments))
        }
    }

    struct Greeting;

    impl PromptHandler for Greeting {
        fn descriptor(&self) -> PromptDescriptor {
            PromptDescriptor {
                name: "greeting".to_string(),
                description: "Say hello".to_string(),
                arguments: vec![PromptArgument {
                    name: "who".to_string(),
                    description: "Who to greet".to_string(),
                    required: true,
                }],
            }
        }

        fn render(
            &self,
            arguments: &HashMap<String, String>,
        ) -> Result<GetPromptResult, InvocationError> {
            Ok(GetPromptResult {
                description: "Say hello".to_string(),
                messages: vec![PromptMessage {
                    role: "user".to_string(),
                    content: Content::text(format!("Hello {}", arguments["who"])),
                }],
            })
        }
    }

    fn ctx() -> ToolContext {
        ToolContext {
            session_id: "test".to_string(),
            logger: SessionLogger::new(None, Arc::new(LogFloor::new()), Outbound::new()),
        }
    }

    fn doc(uri: &str) -> StaticResource {
        StaticResource {
            descriptor: ResourceDescriptor {
                uri: uri.to_string(),
                name: "Doc".to_string(),
                description: "A document".to_string(),
                mime_type: "text/markdown".to_string(),
            },
            text: "# Doc",
        }
    }

    #[test]
    fn listing_keeps_registration_order() {
        let registry = CapabilityRegistry::builder()
            .tool(Echo("b"))
            .tool(Echo("a"))
            .build()
            .unwrap();
        let names: Vec<_> = registry.list_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(registry.list_tools(), registry.list_tools());
    }

    #[test]
    fn rejects_duplicates() {
        let result = CapabilityRegistry::builder()
            .tool(Echo("a"))
            .tool(Echo("a"))
            .build();
        assert!(matches!(result, Err(RegistryError::Duplicate { .. })));

        let result = CapabilityRegistry::builder()
            .resource(doc("x://a"))
            .resource(doc("x://a"))
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn invokes_tools_by_name() {
        let registry = CapabilityRegistry::builder().tool(Echo("echo")).build().unwrap();

        let result = registry
            .invoke_tool("echo", json!({"x": 1}), ctx())
            .await
            .unwrap();
        assert_eq!(result.structured_content, Some(json!({"x": 1})));

        let err = registry.invoke_tool("nope", json!({}), ctx()).await.unwrap_err();
        assert_eq!(err, InvocationError::unknown(CapabilityKind::Tool, "nope"));
    }

    #[test]
    fn prompt_requires_declared_arguments() {
        let registry = CapabilityRegistry::builder().prompt(Greeting).build().unwrap();

        let err = registry.get_prompt("greeting", &HashMap::new()).unwrap_err();
        assert!(matches!(err, InvocationError::InvalidArguments(_)));

        let args = HashMap::from([("who".to_string(), "world".to_string())]);
        let result = registry.get_prompt("greeting", &args).unwrap();
        assert_eq!(result.messages[0].content, Content::text("Hello world"));
    }

    #[test]
    fn reads_resources_by_uri() {
        let registry = CapabilityRegistry::builder().resource(doc("x://a")).build().unwrap();

        let result = registry.read_resource("x://a").unwrap();
        assert_eq!(result.contents[0].text, "# Doc");
        assert_eq!(result.contents[0].mime_type, "text/markdown");
        assert!(registry.read_resource("x://b").is_err());
    }
}
