//! Placeholder AST - parsing of command elements
//!
//! Token grammar (only `{{$` opens a token; other braces stay literal):
//!
//! ```text
//! {{$}}                                           whole ExecutorInput as JSON
//! {{$.inputs.parameters['NAME']}}
//! {{$.inputs.artifacts['NAME'].uri|path|metadata}}
//! {{$.outputs.parameters['NAME'].output_file}}
//! {{$.outputs.artifacts['NAME'].uri|path|metadata}}
//! {{$.outputs.output_file}}  {{$.outputMetadataUri}}
//! {{$.pipeline_job_name}}  {{$.pipeline_job_uuid}}
//! {{$.pipeline_task_name}}  {{$.pipeline_task_uuid}}  {{$.pipeline_root}}
//! ```
//!
//! Structured elements:
//!
//! ```text
//! {"Concat": [element, ...]}
//! {"IfPresent": {"InputName": "x", "Then": [element, ...], "Else": [element, ...]}}
//! ```
//!
//! Structured elements may also arrive JSON-encoded inside a string.

use std::fmt;

use serde_json::{Map, Value};

use crate::ast::{CommandArg, ComponentSpec};
use crate::error::KilnError;

const TOKEN_OPEN: &str = "{{$";
const TOKEN_CLOSE: &str = "}}";

/// Which facet of an artifact a placeholder reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactField {
    Uri,
    Path,
    Metadata,
}

impl ArtifactField {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "uri" => Some(Self::Uri),
            "path" => Some(Self::Path),
            "metadata" => Some(Self::Metadata),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Uri => "uri",
            Self::Path => "path",
            Self::Metadata => "metadata",
        }
    }
}

/// A single placeholder token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    ExecutorInput,
    InputParameter(String),
    InputArtifact { name: String, field: ArtifactField },
    OutputParameterFile(String),
    OutputArtifact { name: String, field: ArtifactField },
    OutputFile,
    PipelineJobName,
    PipelineJobUuid,
    PipelineTaskName,
    PipelineTaskUuid,
    PipelineRoot,
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExecutorInput => write!(f, "{{{{$}}}}"),
            Self::InputParameter(n) => write!(f, "{{{{$.inputs.parameters['{n}']}}}}"),
            Self::InputArtifact { name, field } => {
                write!(f, "{{{{$.inputs.artifacts['{name}'].{}}}}}", field.as_str())
            }
            Self::OutputParameterFile(n) => {
                write!(f, "{{{{$.outputs.parameters['{n}'].output_file}}}}")
            }
            Self::OutputArtifact { name, field } => {
                write!(f, "{{{{$.outputs.artifacts['{name}'].{}}}}}", field.as_str())
            }
            Self::OutputFile => write!(f, "{{{{$.outputs.output_file}}}}"),
            Self::PipelineJobName => write!(f, "{{{{$.pipeline_job_name}}}}"),
            Self::PipelineJobUuid => write!(f, "{{{{$.pipeline_job_uuid}}}}"),
            Self::PipelineTaskName => write!(f, "{{{{$.pipeline_task_name}}}}"),
            Self::PipelineTaskUuid => write!(f, "{{{{$.pipeline_task_uuid}}}}"),
            Self::PipelineRoot => write!(f, "{{{{$.pipeline_root}}}}"),
        }
    }
}

/// Part of a template string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Ref(Placeholder),
}

/// A parsed command/args element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandElement {
    Template(Vec<Segment>),
    Concat(Vec<CommandElement>),
    IfPresent {
        input_name: String,
        then: Vec<CommandElement>,
        otherwise: Vec<CommandElement>,
    },
}

impl CommandElement {
    /// Every placeholder referenced by this element, depth first
    pub fn placeholders(&self) -> Vec<&Placeholder> {
        let mut out = Vec::new();
        self.collect_placeholders(&mut out);
        out
    }

    fn collect_placeholders<'a>(&'a self, out: &mut Vec<&'a Placeholder>) {
        match self {
            Self::Template(segments) => out.extend(segments.iter().filter_map(|s| match s {
                Segment::Ref(p) => Some(p),
                Segment::Literal(_) => None,
            })),
            Self::Concat(parts) => parts.iter().for_each(|p| p.collect_placeholders(out)),
            Self::IfPresent {
                then, otherwise, ..
            } => then
                .iter()
                .chain(otherwise.iter())
                .for_each(|p| p.collect_placeholders(out)),
        }
    }

    /// Check every reference against the component's declared inputs/outputs
    pub fn check_declared(&self, component: &ComponentSpec) -> Result<(), KilnError> {
        match self {
            Self::Template(segments) => {
                for segment in segments {
                    if let Segment::Ref(p) = segment {
                        check_placeholder(p, component)?;
                    }
                }
            }
            Self::Concat(parts) => {
                for part in parts {
                    part.check_declared(component)?;
                }
            }
            Self::IfPresent {
                input_name,
                then,
                otherwise,
            } => {
                if !component.input_definitions.contains(input_name) {
                    return Err(undeclared(format!("IfPresent '{input_name}'"), "input"));
                }
                for part in then.iter().chain(otherwise.iter()) {
                    part.check_declared(component)?;
                }
            }
        }
        Ok(())
    }
}

fn undeclared(placeholder: String, kind: &str) -> KilnError {
    KilnError::UnresolvedPlaceholder {
        placeholder,
        reason: format!("no such {kind} is declared by the component"),
    }
}

fn check_placeholder(p: &Placeholder, component: &ComponentSpec) -> Result<(), KilnError> {
    let inputs = &component.input_definitions;
    let outputs = &component.output_definitions;
    let declared = match p {
        Placeholder::InputParameter(n) => inputs.parameters.contains_key(n),
        Placeholder::InputArtifact { name, .. } => inputs.artifacts.contains_key(name),
        Placeholder::OutputParameterFile(n) => outputs.parameters.contains_key(n),
        Placeholder::OutputArtifact { name, .. } => outputs.artifacts.contains_key(name),
        _ => true,
    };
    if declared {
        Ok(())
    } else {
        let kind = match p {
            Placeholder::InputParameter(_) | Placeholder::InputArtifact { .. } => "input",
            _ => "output",
        };
        Err(undeclared(p.to_string(), kind))
    }
}

// ═══════════════════════════════════════════════════════════════
// PARSING
// ═══════════════════════════════════════════════════════════════

/// Parse one command/args element from the IR
pub fn parse_element(arg: &CommandArg) -> Result<CommandElement, KilnError> {
    match arg {
        CommandArg::Text(s) => parse_text(s),
        CommandArg::Structured(map) => parse_structured(map, &arg.to_value()),
    }
}

/// Parse every element of a command
pub fn parse_command<'a>(
    args: impl IntoIterator<Item = &'a CommandArg>,
) -> Result<Vec<CommandElement>, KilnError> {
    args.into_iter().map(parse_element).collect()
}

/// Parse a template string into literal/placeholder segments
///
/// A token ends at the first `}}` outside a quoted key, so keys may
/// contain braces.
pub fn parse_template(text: &str) -> Result<Vec<Segment>, KilnError> {
    if !text.contains(TOKEN_OPEN) {
        return Ok(vec![Segment::Literal(text.to_string())]);
    }
    let parse_err = |reason: String| KilnError::PlaceholderParse {
        element: text.to_string(),
        reason,
    };

    let mut segments = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(TOKEN_OPEN) {
        if start > 0 {
            segments.push(Segment::Literal(rest[..start].to_string()));
        }
        let body = &rest[start + TOKEN_OPEN.len()..];
        let len = PathParser::token_len(body)
            .ok_or_else(|| parse_err("unterminated '{{$' token".to_string()))?;
        segments.push(Segment::Ref(parse_path(&body[..len]).map_err(parse_err)?));
        rest = &body[len + TOKEN_CLOSE.len()..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest.to_string()));
    }
    Ok(segments)
}

fn parse_text(text: &str) -> Result<CommandElement, KilnError> {
    // Compilers emit structured placeholders as JSON strings
    if text.trim_start().starts_with('{') {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) {
            if map.contains_key("Concat") || map.contains_key("IfPresent") {
                return parse_structured(&map, &Value::String(text.to_string()));
            }
        }
    }
    parse_template(text).map(CommandElement::Template)
}

fn parse_value(value: &Value, root: &Value) -> Result<CommandElement, KilnError> {
    match value {
        Value::String(s) => parse_text(s),
        Value::Object(map) => parse_structured(map, root),
        other => Err(KilnError::PlaceholderParse {
            element: root.to_string(),
            reason: format!("unexpected element {other}"),
        }),
    }
}

/// `Then`/`Else` accept a single element or a list
fn parse_list(value: &Value, root: &Value) -> Result<Vec<CommandElement>, KilnError> {
    match value {
        Value::Array(items) => items.iter().map(|v| parse_value(v, root)).collect(),
        single => Ok(vec![parse_value(single, root)?]),
    }
}

fn parse_structured(map: &Map<String, Value>, root: &Value) -> Result<CommandElement, KilnError> {
    let err = |reason: &str| KilnError::PlaceholderParse {
        element: root.to_string(),
        reason: reason.to_string(),
    };

    if map.len() != 1 {
        return Err(err("structured placeholder must have exactly one key"));
    }
    if let Some(parts) = map.get("Concat") {
        let Value::Array(items) = parts else {
            return Err(err("Concat expects a list"));
        };
        let parts = items
            .iter()
            .map(|v| parse_value(v, root))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(CommandElement::Concat(parts));
    }
    if let Some(body) = map.get("IfPresent") {
        let Value::Object(body) = body else {
            return Err(err("IfPresent expects an object"));
        };
        let input_name = body
            .get("InputName")
            .and_then(Value::as_str)
            .ok_or_else(|| err("IfPresent requires a string InputName"))?;
        let then = match body.get("Then") {
            Some(v) => parse_list(v, root)?,
            None => Vec::new(),
        };
        let otherwise = match body.get("Else") {
            Some(v) => parse_list(v, root)?,
            None => Vec::new(),
        };
        return Ok(CommandElement::IfPresent {
            input_name: input_name.to_string(),
            then,
            otherwise,
        });
    }
    Err(err("unknown structured placeholder (expected Concat or IfPresent)"))
}

// ═══════════════════════════════════════════════════════════════
// TOKEN PATH PARSER
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, PartialEq)]
enum Step<'a> {
    Field(&'a str),
    Key(&'a str),
}

/// Cursor over the text between `{{$` and `}}`
struct PathParser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> PathParser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    /// Byte length of a token body, up to the `}}` that closes it
    ///
    /// Quoted keys are skipped whole. `None` when the token never closes.
    fn token_len(body: &str) -> Option<usize> {
        let mut quote: Option<char> = None;
        for (i, c) in body.char_indices() {
            match quote {
                Some(q) if c == q => quote = None,
                Some(_) => {}
                None if c == '\'' || c == '"' => quote = Some(c),
                None if body[i..].starts_with(TOKEN_CLOSE) => return Some(i),
                None => {}
            }
        }
        None
    }

    fn steps(mut self) -> Result<Vec<Step<'a>>, String> {
        let mut steps = Vec::new();
        while !self.rest().is_empty() {
            if self.rest().starts_with('.') {
                self.pos += 1;
                steps.push(Step::Field(self.ident()?));
            } else if self.rest().starts_with('[') {
                steps.push(Step::Key(self.bracket_key()?));
            } else {
                return Err(format!("unexpected '{}'", self.rest()));
            }
        }
        Ok(steps)
    }

    fn ident(&mut self) -> Result<&'a str, String> {
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err("expected a field name after '.'".to_string());
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    /// `['name']` or `["name"]`
    fn bracket_key(&mut self) -> Result<&'a str, String> {
        let rest = self.rest();
        let quote = rest[1..]
            .chars()
            .next()
            .filter(|c| *c == '\'' || *c == '"')
            .ok_or_else(|| "expected a quoted key inside [...]".to_string())?;
        let body = &rest[2..];
        let close = body
            .find(quote)
            .ok_or_else(|| "unterminated quoted key".to_string())?;
        if !body[close + 1..].starts_with(']') {
            return Err("expected ']' after quoted key".to_string());
        }
        self.pos += 2 + close + 2;
        Ok(&body[..close])
    }
}

/// Parse the inside of a token (everything after `$`)
fn parse_path(inner: &str) -> Result<Placeholder, String> {
    let steps = PathParser::new(inner.trim()).steps()?;
    let artifact_field = |f: &str| {
        ArtifactField::parse(f).ok_or_else(|| format!("unknown artifact field '{f}'"))
    };

    use Step::{Field, Key};
    let placeholder = match steps.as_slice() {
        [] => Placeholder::ExecutorInput,
        [Field("inputs"), Field("parameters"), Key(n)] => Placeholder::InputParameter(n.to_string()),
        [Field("inputs"), Field("artifacts"), Key(n), Field(f)] => Placeholder::InputArtifact {
            name: n.to_string(),
            field: artifact_field(f)?,
        },
        [Field("outputs"), Field("parameters"), Key(n), Field("output_file")] => {
            Placeholder::OutputParameterFile(n.to_string())
        }
        [Field("outputs"), Field("artifacts"), Key(n), Field(f)] => Placeholder::OutputArtifact {
            name: n.to_string(),
            field: artifact_field(f)?,
        },
        [Field("outputs"), Field("output_file")] | [Field("outputMetadataUri")] => {
            Placeholder::OutputFile
        }
        [Field("pipeline_job_name")] => Placeholder::PipelineJobName,
        [Field("pipeline_job_uuid")] => Placeholder::PipelineJobUuid,
        [Field("pipeline_task_name")] => Placeholder::PipelineTaskName,
        [Field("pipeline_task_uuid")] => Placeholder::PipelineTaskUuid,
        [Field("pipeline_root")] => Placeholder::PipelineRoot,
        _ => return Err(format!("unknown placeholder path '{inner}'")),
    };
    Ok(placeholder)
}
