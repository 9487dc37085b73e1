//! Guidance prompts.

use plantuml_mcp_types::{
    mcp::{GetPromptResult, PromptMessage},
    Content, PromptArgument, PromptDescriptor,
};
use std::collections::HashMap;

use crate::error::InvocationError;
use crate::mcp::PromptHandler;

const ERROR_HANDLING_GUIDE: &str = "\
When `generate_plantuml_diagram` (or one of the template tools) fails, the \
result has `isError: true` and `structuredContent` looks like:

```json
{
  \"success\": false,
  \"error\": {\"message\": \"Syntax Error?\", \"line\": 3, \"problematic_code\": \"A -> \"},
  \"retry_hint\": \"...\"
}
```

1. Read `error.message` to learn what the PlantUML parser rejected.
2. Go to `error.line` (1-based, counted in the source you sent) and compare \
it with `error.problematic_code`.
3. Fix only that construct. Common causes: a missing arrow target, an \
unclosed block (`alt`/`loop`/`group` without `end`), unbalanced quotes, or a \
keyword from a different diagram type.
4. Call the tool again with the corrected source. Do not give up after one \
failure; most errors are fixed in one or two retries.

If the result has no `line`, the server could not pin the error down. \
Simplify the diagram and add elements back one at a time.";

pub struct ErrorHandlingPrompt;

impl PromptHandler for ErrorHandlingPrompt {
    fn descriptor(&self) -> PromptDescriptor {
        PromptDescriptor {
            name: "plantuml_error_handling".to_string(),
            description: "How to read PlantUML failure results and retry".to_string(),
            arguments: Vec::new(),
        }
    }

    fn render(&self, _arguments: &HashMap<String, String>) -> Result<GetPromptResult, InvocationError> {
        Ok(GetPromptResult {
            description: "Handling PlantUML syntax errors".to_string(),
            messages: vec![PromptMessage {
                role: "user".to_string(),
                content: Content::text(ERROR_HANDLING_GUIDE),
            }],
        })
    }
}

pub struct DiagramFromDescriptionPrompt;

impl DiagramFromDescriptionPrompt {
    fn guidance(diagram_type: &str) -> &'static str {
        match diagram_type {
            "sequence" => "Use participants/actors and arrows (`A -> B : message`). Group \
                           alternatives with `alt ... else ... end`.",
            "class" => "Declare classes with fields and methods in braces and relate them \
                        with `<|--`, `*--`, `o--` or `-->`.",
            "activity" => "Use the new activity syntax: `start`, `:action;`, \
                           `if (cond) then (yes) ... else (no) ... endif`, `stop`.",
            "component" | "architecture" => "Group components in `package` blocks and connect \
                                             them with `-->` plus a label.",
            "state" => "Use `[*] --> State`, `State --> Other : event` and composite states \
                        in braces.",
            "usecase" => "Declare actors and `(use cases)` and link them with `-->`.",
            _ => "Pick the PlantUML diagram type that fits the description best.",
        }
    }
}

impl PromptHandler for DiagramFromDescriptionPrompt {
    fn descriptor(&self) -> PromptDescriptor {
        PromptDescriptor {
            name: "diagram_from_description".to_string(),
            description: "Turn a plain-language description into a PlantUML diagram".to_string(),
            arguments: vec![
                PromptArgument {
                    name: "description".to_string(),
                    description: "What the diagram should show".to_string(),
                    required: true,
                },
                PromptArgument {
                    name: "diagram_type".to_string(),
                    description: "sequence, class, activity, component, state or usecase \
                                  (default: sequence)"
                        .to_string(),
                    required: false,
                },
            ],
        }
    }

    fn render(&self, arguments: &HashMap<String, String>) -> Result<GetPromptResult, InvocationError> {
        let description = arguments
            .get("description")
            .map(|d| d.trim())
            .filter(|d| !d.is_empty())
            .ok_or_else(|| {
                InvocationError::InvalidArguments("Missing required argument 'description'".to_string())
            })?;
        let diagram_type = arguments
            .get("diagram_type")
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "sequence".to_string());

        let text = format!(
            "Create a PlantUML {diagram_type} diagram for the following description:\n\n\
             {description}\n\n\
             {guidance}\n\n\
             Wrap the source in @startuml / @enduml and render it with \
             `generate_plantuml_diagram`. If the result has `isError: true`, fix the line \
             reported in `structuredContent.error` and try again.",
            diagram_type = diagram_type,
            description = description,
            guidance = Self::guidance(&diagram_type),
        );

        Ok(GetPromptResult {
            description: format!("PlantUML {} diagram from a description", diagram_type),
            messages: vec![PromptMessage {
                role: "user".to_string(),
                content: Content::text(text),
            }],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(result: &GetPromptResult) -> &str {
        match &result.messages[0].content {
            Content::Text { text } => text.as_str(),
            other => panic!("unexpected content: {:?}", other),
        }
    }

    #[test]
    fn description_prompt_defaults_to_sequence() {
        let args = HashMap::from([("description".to_string(), "User logs in".to_string())]);
        let result = DiagramFromDescriptionPrompt.render(&args).unwrap();
        assert!(text(&result).contains("PlantUML sequence diagram"));
        assert!(text(&result).contains("User logs in"));
    }

    #[test]
    fn description_prompt_honours_type() {
        let args = HashMap::from([
            ("description".to_string(), "Order lifecycle".to_string()),
            ("diagram_type".to_string(), "State".to_string()),
        ]);
        let result = DiagramFromDescriptionPrompt.render(&args).unwrap();
        assert!(text(&result).contains("PlantUML state diagram"));
    }

    #[test]
    fn description_prompt_requires_description() {
        let err = DiagramFromDescriptionPrompt.render(&HashMap::new()).unwrap_err();
        assert!(matches!(err, InvocationError::InvalidArguments(_)));
    }

    #[test]
    fn error_handling_prompt_mentions_structured_fields() {
        let result = ErrorHandlingPrompt.render(&HashMap::new()).unwrap();
        assert!(text(&result).contains("problematic_code"));
        assert!(ErrorHandlingPrompt.descriptor().arguments.is_empty());
    }
}
