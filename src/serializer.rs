use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::ir::*;
use crate::validate::validate;

const INDENT: &str = "    ";

/// What to do with a diagram that fails validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Policy {
    #[default]
    Strict,
    /// Writes schema violations through; references must still resolve.
    Tolerant,
}

pub fn serialize(diagram: &Diagram) -> Result<String> {
    serialize_with_policy(diagram, Policy::Strict)
}

pub fn serialize_with_policy(diagram: &Diagram, policy: Policy) -> Result<String> {
    if let Err(violations) = validate(diagram) {
        if policy == Policy::Strict || violations.has_ambiguous_references() {
            return Err(Error::Invalid(violations));
        }
        for violation in &violations {
            warn!(%violation, "serializing despite violation");
        }
    }
    Ok(render(diagram))
}

/// Writes the diagram as-is, without checking it.
pub fn render(diagram: &Diagram) -> String {
    let mut lines = Vec::with_capacity(diagram.entities.len() + diagram.relationships.len() + 4);

    lines.push("entities:".to_string());
    for entity in &diagram.entities {
        lines.push(format!("{INDENT}{};", entity_line(diagram, entity)));
    }

    lines.push(String::new());
    lines.push("relationships:".to_string());
    for relationship in &diagram.relationships {
        lines.push(format!("{INDENT}{};", relationship_line(diagram, relationship)));
    }

    // The editor's parser expects this trailing indented line.
    lines.push(INDENT.to_string());

    debug!(
        entities = diagram.entities.len(),
        relationships = diagram.relationships.len(),
        "serialized diagram"
    );
    lines.join("\n")
}

pub fn attribute_token(attr: &Attribute) -> String {
    format!("{}{}", attr.key_kind.prefix(), attr.name)
}

fn entity_line(diagram: &Diagram, entity: &Entity) -> String {
    let mut header: Vec<&str> = vec![entity.name.as_str()];
    if entity.kind != EntityKind::Strong {
        header.push(entity.kind.token());
    }
    let mut options = entity.options.iter().map(String::as_str);
    if entity.kind == EntityKind::Subclass {
        header.extend(options.next().map(|parent| diagram.canonical_name(parent)));
    }
    header.extend(options);

    let mut line = header.join(".");
    if !entity.attributes.is_empty() {
        let attrs: Vec<String> = entity.attributes.iter().map(attribute_token).collect();
        line.push(' ');
        line.push_str(&attrs.join(", "));
    }
    line
}

fn relationship_line(diagram: &Diagram, relationship: &Relationship) -> String {
    let mut tokens = vec![
        diagram.canonical_name(&relationship.entity_from),
        relationship.cardinality_to_from.token(),
        relationship.name.as_str(),
        relationship.cardinality_from_to.token(),
        diagram.canonical_name(&relationship.entity_to),
    ];
    if relationship.line_kind == LineKind::Double {
        tokens.push(LineKind::Double.token());
    }

    let mut line = tokens.join(" ");
    if !relationship.attributes.is_empty() {
        let names: Vec<&str> = relationship
            .attributes
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        line.push_str(&format!(" {{{}}}", names.join(", ")));
    }
    line
}
