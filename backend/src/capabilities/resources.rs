//! Static reference documents.

use plantuml_mcp_types::ResourceDescriptor;

use crate::mcp::StaticResource;

pub const QUICK_REFERENCE_URI: &str = "plantuml://docs/quick-reference";
pub const ERROR_HANDLING_URI: &str = "plantuml://docs/error-handling";

const QUICK_REFERENCE: &str = r#"# PlantUML quick reference

Every diagram sits between `@startuml` and `@enduml`.

## Sequence

```plantuml
@startuml
actor User
participant "Web App" as web
database DB
User -> web : login
web -> DB : SELECT user
DB --> web : row
alt valid password
  web --> User : welcome
else
  web --> User : denied
end
@enduml
```

Arrows: `->` sync, `->>` async, `-->` reply. Participants: `participant`,
`actor`, `boundary`, `control`, `entity`, `database`, `collections`, `queue`.

## Class

```plantuml
@startuml
class Order {
  +id: UUID
  +total(): Money
}
Order "1" *-- "many" LineItem
Customer --> Order
@enduml
```

## Activity

```plantuml
@startuml
start
:Receive order;
if (in stock?) then (yes)
  :Ship;
else (no)
  :Back-order;
endif
stop
@enduml
```

## Component

```plantuml
@startuml
package "Backend" {
  component "API" as api
  database "Postgres" as db
}
api --> db : SQL
@enduml
```

## State

```plantuml
@startuml
[*] --> Draft
Draft --> Submitted : submit
Submitted --> [*]
@enduml
```
"#;

const ERROR_HANDLING: &str = r#"# Handling PlantUML errors

Diagram tools validate the source against the PlantUML server before
returning a URL. A syntax error comes back as a tool result with
`isError: true`:

```json
{
  "success": false,
  "error": {
    "message": "Syntax Error?",
    "line": 2,
    "problematic_code": "A -> "
  },
  "retry_hint": "Fix the reported line ..."
}
```

- `error.line` is 1-based and counted in the source you submitted. It is
  clamped to the number of lines you sent.
- `error.problematic_code` is the text of that line, when present.
- When the PlantUML server cannot be reached for validation, the diagram is
  assumed valid and `validated` is `false` in the success result.

## Common fixes

| Symptom | Fix |
|---------|-----|
| Arrow without a target | Complete `A -> B : message` |
| `alt` / `loop` / `group` error at the last line | Add the missing `end` |
| Error on a quoted name | Balance the quotes or use an alias |
| Keyword rejected | Check it belongs to the diagram type in use |
"#;

pub fn quick_reference() -> StaticResource {
    StaticResource {
        descriptor: ResourceDescriptor {
            uri: QUICK_REFERENCE_URI.to_string(),
            name: "PlantUML quick reference".to_string(),
            description: "Syntax examples for the common diagram types".to_string(),
            mime_type: "text/markdown".to_string(),
        },
        text: QUICK_REFERENCE,
    }
}

pub fn error_handling() -> StaticResource {
    StaticResource {
        descriptor: ResourceDescriptor {
            uri: ERROR_HANDLING_URI.to_string(),
            name: "PlantUML error handling".to_string(),
            description: "How diagram failures are reported and how to fix them".to_string(),
            mime_type: "text/markdown".to_string(),
        },
        text: ERROR_HANDLING,
    }
}
