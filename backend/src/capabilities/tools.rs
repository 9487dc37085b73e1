//! PlantUML tools.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use garde::Validate;
use plantuml_mcp_types::{CallToolResult, Content, ToolDescriptor};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::InvocationError;
use crate::mcp::{SessionLogger, ToolContext, ToolHandler};
use crate::plantuml::{
    encoding, line_at,
    templates::{ArchitectureDiagram, SequenceDiagram},
    OutputFormat, PlantUmlClient, PreparedSource, RenderOutcome, SyntaxError, Validation,
};

const RETRY_HINT: &str =
    "Fix the reported line (see error.line and error.problematic_code) and call the tool again.";

fn output_format_schema() -> Value {
    json!({
        "type": "string",
        "enum": ["svg", "png"],
        "default": "svg",
        "description": "Image format of the rendered diagram"
    })
}

fn diagram_output_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "success": {"type": "boolean"},
            "format": {"type": "string"},
            "url": {"type": "string"},
            "markdown": {"type": "string"},
            "encoded": {"type": "string"},
            "validated": {"type": "boolean"},
            "plantuml_code": {"type": "string"},
            "error": {
                "type": "object",
                "properties": {
                    "message": {"type": "string"},
                    "line": {"type": "integer"},
                    "problematic_code": {"type": "string"}
                },
                "required": ["message"]
            },
            "retry_hint": {"type": "string"}
        },
        "required": ["success"]
    })
}

fn failure(message: impl Into<String>) -> CallToolResult {
    let message = message.into();
    CallToolResult::failure(
        message.clone(),
        json!({
            "success": false,
            "error": {"message": message},
        }),
    )
}

fn syntax_failure(source: &PreparedSource, caller_text: &str, error: SyntaxError) -> CallToolResult {
    let line = error.line.map(|l| source.caller_line(l));
    let problematic_code = line.and_then(|l| line_at(caller_text, l));

    let mut detail = Map::new();
    detail.insert("message".to_string(), json!(error.message));
    if let Some(line) = line {
        detail.insert("line".to_string(), json!(line));
    }
    if let Some(code) = &problematic_code {
        detail.insert("problematic_code".to_string(), json!(code));
    }

    let text = match (line, &problematic_code) {
        (Some(line), Some(code)) => {
            format!("PlantUML syntax error on line {}: {} (`{}`)", line, error.message, code)
        }
        (Some(line), None) => format!("PlantUML syntax error on line {}: {}", line, error.message),
        _ => format!("PlantUML syntax error: {}", error.message),
    };

    CallToolResult::failure(
        text,
        json!({
            "success": false,
            "error": Value::Object(detail),
            "retry_hint": RETRY_HINT,
        }),
    )
}

/// Encode, validate and (optionally) fetch a diagram.
async fn render_diagram(
    client: &PlantUmlClient,
    caller_text: &str,
    format: OutputFormat,
    include_image: bool,
    logger: &SessionLogger,
) -> CallToolResult {
    let source = PreparedSource::new(caller_text);
    let encoded = match encoding::encode(&source.text) {
        Ok(encoded) => encoded,
        Err(e) => return failure(format!("Failed to encode diagram: {}", e)),
    };
    logger.debug(format!(
        "Encoded {} bytes of PlantUML source into {} characters",
        source.text.len(),
        encoded.len()
    ));

    let validated = match client.validate(&encoded).await {
        Ok(Validation::Valid) => true,
        Ok(Validation::Invalid(error)) => {
            logger.error(
                format!("PlantUML syntax error: {}", error.message),
                error.line.map(|l| json!({"line": source.caller_line(l)})),
            );
            return syntax_failure(&source, caller_text, error);
        }
        Err(e) => {
            warn!("PlantUML server unreachable during validation, assuming valid: {:#}", e);
            logger.warning(format!("Validation skipped: {:#}", e));
            false
        }
    };

    let url = client.diagram_url(format, &encoded);
    let markdown = format!("![PlantUML diagram]({})", url);
    let mut content = vec![Content::text(format!(
        "Diagram URL: {}\n\nMarkdown: {}",
        url, markdown
    ))];

    if include_image {
        match client.render(format, &encoded).await {
            Ok(RenderOutcome::Image(image)) => {
                debug!("Fetched {} bytes of {}", image.bytes.len(), image.content_type);
                content.push(Content::Image {
                    data: STANDARD.encode(&image.bytes),
                    mime_type: format.mime_type().to_string(),
                });
            }
            Ok(RenderOutcome::SyntaxError(error)) => {
                return syntax_failure(&source, caller_text, error);
            }
            Err(e) => {
                warn!("Failed to fetch rendered diagram: {:#}", e);
                return failure(format!("Failed to fetch diagram from PlantUML server: {:#}", e));
            }
        }
    }

    logger.info(format!("Diagram ready: {}", url));
    CallToolResult::success(
        content,
        json!({
            "success": true,
            "format": format.as_str(),
            "url": url,
            "markdown": markdown,
            "encoded": encoded,
            "validated": validated,
        }),
    )
}

/// Attach the generated source to a template tool's result.
fn with_source(mut result: CallToolResult, source: &str) -> CallToolResult {
    if let Some(Value::Object(map)) = result.structured_content.as_mut() {
        map.insert("plantuml_code".to_string(), json!(source));
    }
    result
}

#[derive(Debug, Deserialize, Validate)]
struct GenerateArgs {
    #[garde(length(min = 1))]
    plantuml_code: String,
    #[serde(default)]
    #[garde(skip)]
    output_format: OutputFormat,
    #[serde(default)]
    #[garde(skip)]
    include_image: bool,
}

pub struct GenerateDiagram {
    client: Arc<PlantUmlClient>,
}

impl GenerateDiagram {
    pub fn new(client: Arc<PlantUmlClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for GenerateDiagram {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "generate_plantuml_diagram".to_string(),
            description: "Render PlantUML source to an SVG or PNG diagram. Validates the syntax \
                          first; on failure returns the error message, line number and offending \
                          code so the source can be fixed and resubmitted."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "plantuml_code": {
                        "type": "string",
                        "description": "PlantUML source. @startuml/@enduml are added if missing."
                    },
                    "output_format": output_format_schema(),
                    "include_image": {
                        "type": "boolean",
                        "default": false,
                        "description": "Also return the rendered image inline (base64)"
                    }
                },
                "required": ["plantuml_code"]
            }),
            output_schema: Some(diagram_output_schema()),
        }
    }

    async fn call(&self, arguments: Value, ctx: ToolContext) -> Result<CallToolResult, InvocationError> {
        let args: GenerateArgs = serde_json::from_value(arguments)?;
        args.validate()?;
        debug!(
            "Session {}: rendering {} diagram",
            ctx.session_id,
            args.output_format.as_str()
        );

        Ok(render_diagram(
            &self.client,
            &args.plantuml_code,
            args.output_format,
            args.include_image,
            &ctx.logger,
        )
        .await)
    }
}

#[derive(Debug, Deserialize, Validate)]
struct EncodeArgs {
    #[garde(length(min = 1))]
    plantuml_code: String,
}

pub struct EncodePlantUml {
    client: Arc<PlantUmlClient>,
}

impl EncodePlantUml {
    pub fn new(client: Arc<PlantUmlClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for EncodePlantUml {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "encode_plantuml".to_string(),
            description: "Encode PlantUML source into the compressed token used in PlantUML \
                          server URLs."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "plantuml_code": {"type": "string", "description": "PlantUML source to encode"}
                },
                "required": ["plantuml_code"]
            }),
            output_schema: Some(json!({
                "type": "object",
                "properties": {
                    "success": {"type": "boolean"},
                    "encoded": {"type": "string"},
                    "url": {"type": "string"}
                },
                "required": ["success"]
            })),
        }
    }

    async fn call(&self, arguments: Value, ctx: ToolContext) -> Result<CallToolResult, InvocationError> {
        let args: EncodeArgs = serde_json::from_value(arguments)?;
        args.validate()?;

        ctx.logger.debug(format!(
            "Encoding {} bytes of PlantUML source",
            args.plantuml_code.len()
        ));
        let encoded = match encoding::encode(&args.plantuml_code) {
            Ok(encoded) => encoded,
            Err(e) => return Ok(failure(format!("Failed to encode diagram: {}", e))),
        };
        ctx.logger.info("PlantUML source encoded");

        let url = self.client.diagram_url(OutputFormat::Svg, &encoded);
        Ok(CallToolResult::success(
            vec![Content::text(encoded.clone())],
            json!({"success": true, "encoded": encoded, "url": url}),
        ))
    }
}

#[derive(Debug, Deserialize, Validate)]
struct DecodeArgs {
    #[garde(length(min = 1))]
    encoded_string: String,
}

pub struct DecodePlantUml;

#[async_trait]
impl ToolHandler for DecodePlantUml {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "decode_plantuml".to_string(),
            description: "Decode a PlantUML URL token back into PlantUML source.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "encoded_string": {
                        "type": "string",
                        "description": "Encoded token (the part after /svg/ or /png/ in a PlantUML URL)"
                    }
                },
                "required": ["encoded_string"]
            }),
            output_schema: Some(json!({
                "type": "object",
                "properties": {
                    "success": {"type": "boolean"},
                    "plantuml_code": {"type": "string"}
                },
                "required": ["success"]
            })),
        }
    }

    async fn call(&self, arguments: Value, ctx: ToolContext) -> Result<CallToolResult, InvocationError> {
        let args: DecodeArgs = serde_json::from_value(arguments)?;
        args.validate()?;

        match encoding::decode(&args.encoded_string) {
            Ok(source) => {
                ctx.logger.info("PlantUML token decoded");
                Ok(CallToolResult::success(
                    vec![Content::text(source.clone())],
                    json!({"success": true, "plantuml_code": source}),
                ))
            }
            Err(e) => {
                ctx.logger.warning(format!("Decoding failed: {}", e));
                Ok(failure(format!("Failed to decode PlantUML token: {}", e)))
            }
        }
    }
}

pub struct GenerateSequenceDiagram {
    client: Arc<PlantUmlClient>,
}

impl GenerateSequenceDiagram {
    pub fn new(client: Arc<PlantUmlClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for GenerateSequenceDiagram {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "generate_sequence_diagram".to_string(),
            description: "Build a sequence diagram from participants and message steps, then \
                          render it."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "participants": {
                        "type": "array",
                        "minItems": 1,
                        "items": {
                            "type": "object",
                            "properties": {
                                "name": {"type": "string"},
                                "kind": {
                                    "type": "string",
                                    "enum": ["participant", "actor", "boundary", "control",
                                             "entity", "database", "collections", "queue"]
                                }
                            },
                            "required": ["name"]
                        }
                    },
                    "steps": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "from": {"type": "string"},
                                "to": {"type": "string"},
                                "message": {"type": "string"},
                                "style": {"type": "string", "enum": ["sync", "async", "reply"]}
                            },
                            "required": ["from", "to", "message"]
                        }
                    },
                    "output_format": output_format_schema()
                },
                "required": ["participants", "steps"]
            }),
            output_schema: Some(diagram_output_schema()),
        }
    }

    async fn call(&self, arguments: Value, ctx: ToolContext) -> Result<CallToolResult, InvocationError> {
        let diagram: SequenceDiagram = serde_json::from_value(arguments)?;
        let source = diagram
            .to_plantuml()
            .map_err(|e| InvocationError::InvalidArguments(e.to_string()))?;

        let result =
            render_diagram(&self.client, &source, diagram.output_format, false, &ctx.logger).await;
        Ok(with_source(result, &source))
    }
}

pub struct GenerateArchitectureDiagram {
    client: Arc<PlantUmlClient>,
}

impl GenerateArchitectureDiagram {
    pub fn new(client: Arc<PlantUmlClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for GenerateArchitectureDiagram {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "generate_architecture_diagram".to_string(),
            description: "Build a component/architecture diagram from grouped nodes and \
                          connections, then render it."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "groups": {
                        "type": "array",
                        "minItems": 1,
                        "items": {
                            "type": "object",
                            "properties": {
                                "name": {"type": "string"},
                                "nodes": {
                                    "type": "array",
                                    "minItems": 1,
                                    "items": {
                                        "type": "object",
                                        "properties": {
                                            "id": {"type": "string"},
                                            "label": {"type": "string"},
                                            "kind": {
                                                "type": "string",
                                                "enum": ["component", "database", "queue", "cloud",
                                                         "node", "actor", "interface", "storage"]
                                            }
                                        },
                                        "required": ["id"]
                                    }
                                }
                            },
                            "required": ["name", "nodes"]
                        }
                    },
                    "connections": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "from": {"type": "string"},
                                "to": {"type": "string"},
                                "label": {"type": "string"}
                            },
                            "required": ["from", "to"]
                        }
                    },
                    "output_format": output_format_schema()
                },
                "required": ["groups"]
            }),
            output_schema: Some(diagram_output_schema()),
        }
    }

    async fn call(&self, arguments: Value, ctx: ToolContext) -> Result<CallToolResult, InvocationError> {
        let diagram: ArchitectureDiagram = serde_json::from_value(arguments)?;
        let source = diagram
            .to_plantuml()
            .map_err(|e| InvocationError::InvalidArguments(e.to_string()))?;

        let result =
            render_diagram(&self.client, &source, diagram.output_format, false, &ctx.logger).await;
        Ok(with_source(result, &source))
    }
}
