use tracing::{debug, warn};
use winnow::ascii::{multispace0, multispace1};
use winnow::combinator::{alt, opt, preceded, repeat, separated, terminated};
use winnow::error::ContextError;
use winnow::prelude::*;
use winnow::stream::Offset;
use winnow::token::{take_till, take_while};

use crate::error::{Error, Result};
use crate::ir::*;

/// Reads DSL text back into a [`Diagram`].
pub fn parse(input: &str) -> Result<Diagram> {
    let (entity_stmts, relationship_stmts) = document
        .parse(input)
        .map_err(|e| document_error(input, e.offset()))?;

    let mut entities: Vec<Entity> = Vec::new();
    for text in entity_stmts {
        let entity = parse_statement(input, text, "entity", entity_stmt)?;
        if entities.iter().any(|e| same_name(&e.name, &entity.name)) {
            warn!(entity = %entity.name, "duplicate entity ignored");
            continue;
        }
        entities.push(entity);
    }

    let relationships = relationship_stmts
        .into_iter()
        .map(|text| parse_statement(input, text, "relationship", relationship_stmt))
        .collect::<Result<Vec<_>>>()?;

    debug!(
        entities = entities.len(),
        relationships = relationships.len(),
        "parsed diagram"
    );
    Ok(Diagram {
        entities,
        relationships,
    })
}

fn document<'s>(input: &mut &'s str) -> winnow::Result<(Vec<&'s str>, Vec<&'s str>)> {
    multispace0.parse_next(input)?;
    "entities:".parse_next(input)?;
    let entities: Vec<&str> = repeat(0.., raw_statement).parse_next(input)?;
    multispace0.parse_next(input)?;
    let relationships: Option<Vec<&str>> =
        opt(preceded("relationships:", repeat(0.., raw_statement))).parse_next(input)?;
    multispace0.parse_next(input)?;
    Ok((entities, relationships.unwrap_or_default()))
}

/// Text of one `;`-terminated statement, without the terminator. Stops short
/// of block headers such as `relationships:`.
fn raw_statement<'s>(input: &mut &'s str) -> winnow::Result<&'s str> {
    multispace0.parse_next(input)?;
    terminated(take_till(1.., |c: char| c == ';' || c == ':'), ';').parse_next(input)
}

fn parse_statement<'s, O>(
    input: &'s str,
    text: &'s str,
    what: &str,
    mut parser: impl Parser<&'s str, O, ContextError>,
) -> Result<O> {
    parser.parse(text).map_err(|e| {
        let statement = text.trim_end();
        let message = match e.inner().cause() {
            Some(cause) => format!("{cause} in {what} `{statement}`"),
            None => format!("invalid {what} `{statement}`"),
        };
        syntax_error(input, text.offset_from(&input) + e.offset(), message)
    })
}

fn document_error(input: &str, offset: usize) -> Error {
    let rest = &input[offset..];
    let message = if !input.trim_start().starts_with("entities:") {
        "expected `entities:` block".to_string()
    } else {
        let context = rest.lines().next().unwrap_or("").trim();
        let context_display = if context.chars().count() > 40 {
            format!("{}...", context.chars().take(40).collect::<String>())
        } else {
            context.to_string()
        };
        format!("unexpected `{context_display}`")
    };
    syntax_error(input, offset, message)
}

fn syntax_error(input: &str, offset: usize, message: String) -> Error {
    let line = input[..offset.min(input.len())].matches('\n').count() + 1;
    Error::Syntax { line, message }
}

fn entity_stmt(input: &mut &str) -> winnow::Result<Entity> {
    let name = identifier.parse_next(input)?;
    let kind = if input.starts_with('.') {
        preceded('.', entity_kind).parse_next(input)?
    } else {
        EntityKind::Strong
    };
    let options: Vec<&str> = repeat(0.., preceded('.', identifier)).parse_next(input)?;
    let attributes: Option<Vec<Attribute>> =
        opt(preceded(multispace1, separated(1.., entity_attribute, ','))).parse_next(input)?;
    multispace0.parse_next(input)?;

    Ok(Entity {
        name: name.to_string(),
        kind,
        options: options.into_iter().map(str::to_string).collect(),
        attributes: attributes.unwrap_or_default(),
    })
}

fn entity_kind(input: &mut &str) -> winnow::Result<EntityKind> {
    identifier
        .try_map(|token: &str| token.parse::<EntityKind>())
        .parse_next(input)
}

fn entity_attribute(input: &mut &str) -> winnow::Result<Attribute> {
    multispace0.parse_next(input)?;
    let text = attribute_text.parse_next(input)?.trim_end();
    let attr = if let Some(name) = text.strip_prefix("du.") {
        Attribute::partial(name)
    } else if let Some(name) = text.strip_prefix("u.") {
        Attribute::primary(name)
    } else {
        Attribute::plain(text)
    };
    Ok(attr)
}

/// An attribute name, keeping commas inside a `(...)` value list.
fn attribute_text<'s>(input: &mut &'s str) -> winnow::Result<&'s str> {
    repeat::<_, _, (), _, _>(
        1..,
        alt((
            ('(', take_till(0.., ')'), ')').void(),
            take_till(1.., |c: char| matches!(c, ',' | '(' | '{' | '}')).void(),
        )),
    )
    .take()
    .parse_next(input)
}

fn relationship_stmt(input: &mut &str) -> winnow::Result<Relationship> {
    let entity_from = identifier.parse_next(input)?;
    multispace1.parse_next(input)?;
    let cardinality_to_from = cardinality.parse_next(input)?;
    multispace1.parse_next(input)?;
    let name = take_till(1.., |c: char| c.is_whitespace()).parse_next(input)?;
    multispace1.parse_next(input)?;
    let cardinality_from_to = cardinality.parse_next(input)?;
    multispace1.parse_next(input)?;
    let entity_to = identifier.parse_next(input)?;

    let line_kind = if input.trim_start().starts_with(is_identifier_char) {
        preceded(
            multispace1,
            identifier.try_map(|token: &str| token.parse::<LineKind>()),
        )
        .parse_next(input)?
    } else {
        LineKind::Single
    };

    let attributes: Option<Vec<Attribute>> = opt(preceded(
        (multispace0, '{'),
        terminated(
            separated(0.., relationship_attribute, ','),
            (multispace0, '}'),
        ),
    ))
    .parse_next(input)?;
    multispace0.parse_next(input)?;

    Ok(Relationship {
        entity_from: entity_from.to_string(),
        cardinality_to_from,
        name: name.to_string(),
        cardinality_from_to,
        entity_to: entity_to.to_string(),
        line_kind,
        attributes: attributes.unwrap_or_default(),
    })
}

fn relationship_attribute(input: &mut &str) -> winnow::Result<Attribute> {
    multispace0.parse_next(input)?;
    let text = attribute_text.parse_next(input)?;
    Ok(Attribute::plain(text.trim_end()))
}

fn cardinality(input: &mut &str) -> winnow::Result<Cardinality> {
    identifier
        .try_map(|token: &str| token.parse::<Cardinality>())
        .parse_next(input)
}

fn identifier<'s>(input: &mut &'s str) -> winnow::Result<&'s str> {
    take_while(1.., is_identifier_char).parse_next(input)
}
