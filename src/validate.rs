use std::fmt;

use tracing::debug;

use crate::ir::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    Entity {
        index: usize,
        name: String,
    },
    EntityAttribute {
        entity: String,
        index: usize,
        name: String,
    },
    Relationship {
        index: usize,
        name: String,
    },
    RelationshipAttribute {
        relationship: String,
        index: usize,
        name: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Invariant {
    DuplicateEntityName,
    MalformedName,
    OptionCount,
    Participation,
    Disjointness,
    PrimaryKeyCount,
    PartialKeyCount,
    UnexpectedPrimaryKey,
    UnexpectedPartialKey,
    MissingDiscriminator,
    DiscriminatorShape,
    ParentNotSuperclass,
    SuperclassAfterSubclass,
    WeakOwnerCount,
    RelationshipAttributeKey,
    UnresolvedReference,
    AmbiguousReference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationClass {
    SchemaViolation,
    AmbiguousReference,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintViolation {
    pub element: Element,
    pub invariant: Invariant,
    pub value: Option<String>,
}

/// Every violation found by one [`validate`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Violations(pub Vec<ConstraintViolation>);

impl Invariant {
    pub fn class(self) -> ViolationClass {
        match self {
            Invariant::UnresolvedReference | Invariant::AmbiguousReference => {
                ViolationClass::AmbiguousReference
            }
            _ => ViolationClass::SchemaViolation,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Invariant::DuplicateEntityName => "entity name is already declared",
            Invariant::MalformedName => "name cannot be written as a DSL token",
            Invariant::OptionCount => "wrong number of header options for entity kind",
            Invariant::Participation => "participation must be `total` or `partial`",
            Invariant::Disjointness => "disjointness must be `disjoint` or `overlap`",
            Invariant::PrimaryKeyCount => "entity needs exactly one primary key",
            Invariant::PartialKeyCount => "weak entity needs exactly one partial key",
            Invariant::UnexpectedPrimaryKey => "primary key not allowed on this entity kind",
            Invariant::UnexpectedPartialKey => "partial key only allowed on weak entities",
            Invariant::MissingDiscriminator => "superclass must end with a non-key discriminator",
            Invariant::DiscriminatorShape => {
                "discriminator must be multi-valued for overlap and plain for disjoint"
            }
            Invariant::ParentNotSuperclass => "subclass parent is not a superclass",
            Invariant::SuperclassAfterSubclass => "superclass must be declared before subclass",
            Invariant::WeakOwnerCount => "weak entity needs exactly one double relationship",
            Invariant::RelationshipAttributeKey => "relationship attributes carry no key role",
            Invariant::UnresolvedReference => "reference matches no entity",
            Invariant::AmbiguousReference => "reference matches more than one entity",
        }
    }
}

impl ConstraintViolation {
    fn new(element: Element, invariant: Invariant) -> Self {
        Self {
            element,
            invariant,
            value: None,
        }
    }

    fn with_value(mut self, value: impl fmt::Display) -> Self {
        self.value = Some(value.to_string());
        self
    }

    pub fn class(&self) -> ViolationClass {
        self.invariant.class()
    }
}

impl Violations {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ConstraintViolation> {
        self.0.iter()
    }

    pub fn has_ambiguous_references(&self) -> bool {
        self.iter()
            .any(|v| v.class() == ViolationClass::AmbiguousReference)
    }
}

impl<'a> IntoIterator for &'a Violations {
    type Item = &'a ConstraintViolation;
    type IntoIter = std::slice::Iter<'a, ConstraintViolation>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Entity { index, name } => write!(f, "entity #{index} `{name}`"),
            Element::EntityAttribute {
                entity,
                index,
                name,
            } => write!(f, "attribute #{index} `{name}` of entity `{entity}`"),
            Element::Relationship { index, name } => {
                write!(f, "relationship #{index} `{name}`")
            }
            Element::RelationshipAttribute {
                relationship,
                index,
                name,
            } => write!(
                f,
                "attribute #{index} `{name}` of relationship `{relationship}`"
            ),
        }
    }
}

impl fmt::Display for ViolationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationClass::SchemaViolation => f.write_str("SchemaViolation"),
            ViolationClass::AmbiguousReference => f.write_str("AmbiguousReference"),
        }
    }
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}: {}",
            self.class(),
            self.element,
            self.invariant.describe()
        )?;
        if let Some(value) = &self.value {
            write!(f, " (found `{value}`)")?;
        }
        Ok(())
    }
}

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, violation) in self.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  {violation}")?;
        }
        Ok(())
    }
}

pub fn validate(diagram: &Diagram) -> Result<(), Violations> {
    let mut found = Vec::new();

    for (index, entity) in diagram.entities.iter().enumerate() {
        check_entity(diagram, index, entity, &mut found);
    }
    for (index, relationship) in diagram.relationships.iter().enumerate() {
        check_relationship(diagram, index, relationship, &mut found);
    }

    debug!(
        entities = diagram.entities.len(),
        relationships = diagram.relationships.len(),
        violations = found.len(),
        "validated diagram"
    );

    if found.is_empty() {
        Ok(())
    } else {
        Err(Violations(found))
    }
}

fn entity_element(index: usize, entity: &Entity) -> Element {
    Element::Entity {
        index,
        name: entity.name.clone(),
    }
}

fn check_entity(
    diagram: &Diagram,
    index: usize,
    entity: &Entity,
    found: &mut Vec<ConstraintViolation>,
) {
    let element = || entity_element(index, entity);

    if let Some(earlier) = diagram.entities[..index]
        .iter()
        .find(|e| same_name(&e.name, &entity.name))
    {
        found.push(
            ConstraintViolation::new(element(), Invariant::DuplicateEntityName)
                .with_value(&earlier.name),
        );
    }

    if !is_identifier(&entity.name) {
        found.push(
            ConstraintViolation::new(element(), Invariant::MalformedName).with_value(&entity.name),
        );
    }
    for (attr_index, attr) in entity.attributes.iter().enumerate() {
        let plain_with_prefix =
            attr.key_kind.is_none() && (attr.name.starts_with("u.") || attr.name.starts_with("du."));
        if plain_with_prefix || !is_attribute_token(&attr.name) {
            found.push(
                ConstraintViolation::new(
                    Element::EntityAttribute {
                        entity: entity.name.clone(),
                        index: attr_index,
                        name: attr.name.clone(),
                    },
                    Invariant::MalformedName,
                )
                .with_value(&attr.name),
            );
        }
    }

    if entity.options.len() != entity.kind.option_count() {
        found.push(
            ConstraintViolation::new(element(), Invariant::OptionCount)
                .with_value(entity.options.join(".")),
        );
    }

    check_keys(index, entity, found);

    match entity.kind {
        EntityKind::Superclass => check_superclass(index, entity, found),
        EntityKind::Subclass => check_subclass(diagram, index, entity, found),
        EntityKind::Weak => check_weak_owner(diagram, index, entity, found),
        EntityKind::Strong | EntityKind::Associative => {}
    }
}

fn check_keys(index: usize, entity: &Entity, found: &mut Vec<ConstraintViolation>) {
    let attribute_element = |attr_index: usize, attr: &Attribute| Element::EntityAttribute {
        entity: entity.name.clone(),
        index: attr_index,
        name: attr.name.clone(),
    };
    let primaries = entity.keys(KeyKind::Primary).count();
    let partials = entity.keys(KeyKind::Partial).count();

    let (primary_allowed, partial_allowed) = match entity.kind {
        EntityKind::Strong | EntityKind::Superclass => (true, false),
        EntityKind::Weak => (false, true),
        EntityKind::Subclass | EntityKind::Associative => (false, false),
    };

    if primary_allowed && primaries != 1 {
        found.push(
            ConstraintViolation::new(entity_element(index, entity), Invariant::PrimaryKeyCount)
                .with_value(primaries),
        );
    }
    if partial_allowed && partials != 1 {
        found.push(
            ConstraintViolation::new(entity_element(index, entity), Invariant::PartialKeyCount)
                .with_value(partials),
        );
    }
    if !primary_allowed {
        for (attr_index, attr) in entity.keys(KeyKind::Primary) {
            found.push(ConstraintViolation::new(
                attribute_element(attr_index, attr),
                Invariant::UnexpectedPrimaryKey,
            ));
        }
    }
    if !partial_allowed {
        for (attr_index, attr) in entity.keys(KeyKind::Partial) {
            found.push(ConstraintViolation::new(
                attribute_element(attr_index, attr),
                Invariant::UnexpectedPartialKey,
            ));
        }
    }
}

fn check_superclass(index: usize, entity: &Entity, found: &mut Vec<ConstraintViolation>) {
    let element = || entity_element(index, entity);

    let participation = entity.options.first().map(String::as_str);
    if let Some(p) = participation.filter(|p| !matches!(*p, "total" | "partial")) {
        found.push(ConstraintViolation::new(element(), Invariant::Participation).with_value(p));
    }

    let disjointness = entity.options.get(1).map(String::as_str);
    if let Some(d) = disjointness.filter(|d| !matches!(*d, "disjoint" | "overlap")) {
        found.push(ConstraintViolation::new(element(), Invariant::Disjointness).with_value(d));
    }

    let Some(discriminator) = entity.attributes.last().filter(|a| a.key_kind.is_none()) else {
        found.push(ConstraintViolation::new(
            element(),
            Invariant::MissingDiscriminator,
        ));
        return;
    };
    let shape_ok = match disjointness {
        Some("overlap") => discriminator.is_multi_valued(),
        Some("disjoint") => !discriminator.is_multi_valued(),
        _ => true,
    };
    if !shape_ok {
        found.push(
            ConstraintViolation::new(
                Element::EntityAttribute {
                    entity: entity.name.clone(),
                    index: entity.attributes.len() - 1,
                    name: discriminator.name.clone(),
                },
                Invariant::DiscriminatorShape,
            )
            .with_value(disjointness.unwrap_or_default()),
        );
    }
}

fn check_subclass(
    diagram: &Diagram,
    index: usize,
    entity: &Entity,
    found: &mut Vec<ConstraintViolation>,
) {
    let Some(parent) = entity.parent() else {
        return;
    };
    let element = || entity_element(index, entity);

    if !is_identifier(parent) {
        found.push(ConstraintViolation::new(element(), Invariant::MalformedName).with_value(parent));
    }

    match diagram.resolve(parent) {
        Resolution::Missing => found.push(
            ConstraintViolation::new(element(), Invariant::UnresolvedReference).with_value(parent),
        ),
        Resolution::Ambiguous(_) => found.push(
            ConstraintViolation::new(element(), Invariant::AmbiguousReference).with_value(parent),
        ),
        Resolution::Found(parent_index, parent_entity) => {
            if parent_entity.kind != EntityKind::Superclass {
                found.push(
                    ConstraintViolation::new(element(), Invariant::ParentNotSuperclass)
                        .with_value(&parent_entity.name),
                );
            }
            if parent_index >= index {
                found.push(
                    ConstraintViolation::new(element(), Invariant::SuperclassAfterSubclass)
                        .with_value(&parent_entity.name),
                );
            }
        }
    }
}

fn check_weak_owner(
    diagram: &Diagram,
    index: usize,
    entity: &Entity,
    found: &mut Vec<ConstraintViolation>,
) {
    let owners = diagram
        .relationships
        .iter()
        .filter_map(|r| r.owner_of(&entity.name))
        .count();
    if owners != 1 {
        found.push(
            ConstraintViolation::new(entity_element(index, entity), Invariant::WeakOwnerCount)
                .with_value(owners),
        );
    }
}

fn check_relationship(
    diagram: &Diagram,
    index: usize,
    relationship: &Relationship,
    found: &mut Vec<ConstraintViolation>,
) {
    let element = || Element::Relationship {
        index,
        name: relationship.name.clone(),
    };

    if !is_relationship_token(&relationship.name) {
        found.push(
            ConstraintViolation::new(element(), Invariant::MalformedName)
                .with_value(&relationship.name),
        );
    }

    for endpoint in [&relationship.entity_from, &relationship.entity_to] {
        if !is_identifier(endpoint) {
            found.push(
                ConstraintViolation::new(element(), Invariant::MalformedName).with_value(endpoint),
            );
        }
        let invariant = match diagram.resolve(endpoint) {
            Resolution::Found(..) => continue,
            Resolution::Missing => Invariant::UnresolvedReference,
            Resolution::Ambiguous(_) => Invariant::AmbiguousReference,
        };
        found.push(ConstraintViolation::new(element(), invariant).with_value(endpoint));
    }

    for (attr_index, attr) in relationship.attributes.iter().enumerate() {
        let attribute_element = || Element::RelationshipAttribute {
            relationship: relationship.name.clone(),
            index: attr_index,
            name: attr.name.clone(),
        };
        if !attr.key_kind.is_none() {
            found.push(ConstraintViolation::new(
                attribute_element(),
                Invariant::RelationshipAttributeKey,
            ));
        }
        if !is_attribute_token(&attr.name) {
            found.push(
                ConstraintViolation::new(attribute_element(), Invariant::MalformedName)
                    .with_value(&attr.name),
            );
        }
    }
}

/// Relationship names are read up to the next whitespace.
fn is_relationship_token(name: &str) -> bool {
    !name.is_empty() && !name.chars().any(|c| c.is_whitespace() || matches!(c, ';' | ':'))
}

/// Attribute names are split on `,` and close on `{`/`}` except inside a
/// `(...)` value list. `;` and `:` end the statement anywhere.
fn is_attribute_token(name: &str) -> bool {
    if name.is_empty() || name.trim() != name {
        return false;
    }
    let mut in_list = false;
    for c in name.chars() {
        match c {
            ';' | ':' => return false,
            ')' if in_list => in_list = false,
            _ if in_list => {}
            '(' => in_list = true,
            ',' | '{' | '}' => return false,
            _ => {}
        }
    }
    !in_list
}
