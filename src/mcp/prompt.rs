//! Prompt registry and template engine.
//!
//! Prompt templates contain `{{var}}` substitutions and `{{#if var}}...{{/if}}`
//! conditional blocks. Templates are tokenised **once at registration** into
//! an explicit node tree, then evaluated against an argument map on each
//! `prompts/get` — no per-render pattern compilation, and nested blocks
//! (including same-name nesting) evaluate by ordinary tree walking.
//!
//! Rendering rules, per parameter:
//!
//! - supplied with a non-null value: `{{name}}` substitutes the stringified
//!   value and `{{#if name}}...{{/if}}` unwraps to its contents;
//! - absent or null: conditional blocks drop with their contents, and bare
//!   `{{name}}` references render empty.
//!
//! After evaluation, runs of three or more newlines collapse to exactly two
//! and the result is trimmed.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors from prompt lookup.
#[derive(Error, Debug)]
pub enum PromptError {
    /// The requested prompt is not registered.
    #[error("Unknown prompt: {0}")]
    NotFound(String),
}

/// A declared prompt parameter.
#[derive(Debug, Clone, Serialize)]
pub struct PromptArgument {
    /// Parameter name, referenced from the template body.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Whether callers are expected to supply this parameter.
    pub required: bool,
}

/// A registered prompt template.
#[derive(Debug, Clone)]
pub struct PromptDescriptor {
    /// Unique prompt name.
    pub name: String,
    /// Human-readable description for discovery.
    pub description: String,
    /// Declared parameters, in order.
    pub arguments: Vec<PromptArgument>,
    /// Template body text.
    pub template: String,
}

/// Wire projection for `prompts/list` responses.
#[derive(Debug, Clone, Serialize)]
pub struct PromptInfo {
    /// Unique prompt name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Declared parameters.
    pub arguments: Vec<PromptArgument>,
}

/// A template node produced by tokenisation.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Literal(String),
    Variable(String),
    Conditional { name: String, children: Vec<Node> },
}

/// Tokenises a template body into a node tree.
///
/// Malformed input degrades rather than failing: an unclosed `{{#if}}`
/// block is treated as closed at end of input, a stray `{{/if}}` is
/// dropped, and an unterminated `{{` is kept as literal text.
fn tokenize(template: &str) -> Vec<Node> {
    // Each stack frame is the children list of an open {{#if}} block.
    let mut stack: Vec<(String, Vec<Node>)> = Vec::new();
    let mut current: Vec<Node> = Vec::new();
    let mut rest = template;

    loop {
        let Some(open) = rest.find("{{") else {
            if !rest.is_empty() {
                current.push(Node::Literal(rest.to_string()));
            }
            break;
        };

        if open > 0 {
            current.push(Node::Literal(rest[..open].to_string()));
        }

        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("}}") else {
            // Unterminated token: keep the remainder as literal text.
            current.push(Node::Literal(rest[open..].to_string()));
            break;
        };

        let tag = after_open[..close].trim();
        rest = &after_open[close + 2..];

        if let Some(name) = tag.strip_prefix("#if ") {
            stack.push((name.trim().to_string(), std::mem::take(&mut current)));
        } else if tag == "/if" {
            if let Some((name, parent)) = stack.pop() {
                let children = std::mem::replace(&mut current, parent);
                current.push(Node::Conditional { name, children });
            } else {
                tracing::warn!("Stray {{{{/if}}}} in prompt template; ignoring");
            }
        } else if !tag.is_empty() {
            current.push(Node::Variable(tag.to_string()));
        }
    }

    // Unclosed blocks close implicitly at end of input.
    while let Some((name, parent)) = stack.pop() {
        tracing::warn!(block = %name, "Unclosed {{{{#if}}}} block in prompt template");
        let children = std::mem::replace(&mut current, parent);
        current.push(Node::Conditional { name, children });
    }

    current
}

/// Returns the supplied argument when present and non-null.
fn supplied<'a>(args: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    args.get(name).filter(|v| !v.is_null())
}

/// Stringifies an argument value for substitution.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Evaluates a node tree against an argument map.
fn evaluate(nodes: &[Node], args: &Map<String, Value>, out: &mut String) {
    for node in nodes {
        match node {
            Node::Literal(text) => out.push_str(text),
            Node::Variable(name) => {
                if let Some(value) = supplied(args, name) {
                    out.push_str(&stringify(value));
                }
            }
            Node::Conditional { name, children } => {
                if supplied(args, name).is_some() {
                    evaluate(children, args, out);
                }
            }
        }
    }
}

/// Collapses runs of three or more newlines to exactly two.
fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run = 0_usize;
    for ch in text.chars() {
        if ch == '\n' {
            run += 1;
            if run <= 2 {
                out.push(ch);
            }
        } else {
            run = 0;
            out.push(ch);
        }
    }
    out
}

/// A descriptor plus its pre-tokenised template.
#[derive(Debug, Clone)]
struct CompiledPrompt {
    descriptor: PromptDescriptor,
    nodes: Vec<Node>,
}

/// Registry of prompts keyed by name, preserving registration order.
#[derive(Debug, Default)]
pub struct PromptRegistry {
    prompts: IndexMap<String, CompiledPrompt>,
}

impl PromptRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites a descriptor by name, compiling its template.
    ///
    /// Overwriting an existing entry is logged as a warning, not an error.
    pub fn register(&mut self, descriptor: PromptDescriptor) {
        if self.prompts.contains_key(&descriptor.name) {
            tracing::warn!(prompt = %descriptor.name, "Overwriting existing prompt registration");
        }
        let nodes = tokenize(&descriptor.template);
        self.prompts
            .insert(descriptor.name.clone(), CompiledPrompt { descriptor, nodes });
    }

    /// Looks up a descriptor by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PromptDescriptor> {
        self.prompts.get(name).map(|c| &c.descriptor)
    }

    /// Returns all prompts in registration order, projected for discovery.
    #[must_use]
    pub fn to_wire_format(&self) -> Vec<PromptInfo> {
        self.prompts
            .values()
            .map(|c| PromptInfo {
                name: c.descriptor.name.clone(),
                description: c.descriptor.description.clone(),
                arguments: c.descriptor.arguments.clone(),
            })
            .collect()
    }

    /// Returns the number of registered prompts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    /// Returns true when no prompts are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    /// Renders a prompt against the supplied arguments.
    ///
    /// # Errors
    ///
    /// Returns [`PromptError::NotFound`] when no prompt with that name is
    /// registered.
    pub fn render(&self, name: &str, args: &Map<String, Value>) -> Result<String, PromptError> {
        let compiled = self
            .prompts
            .get(name)
            .ok_or_else(|| PromptError::NotFound(name.to_string()))?;

        let mut out = String::with_capacity(compiled.descriptor.template.len());
        evaluate(&compiled.nodes, args, &mut out);

        Ok(collapse_blank_lines(&out).trim().to_string())
    }
}
