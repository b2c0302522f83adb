use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// One ER diagram: entities and explicit relationships, both in author order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagram {
    pub entities: Vec<Entity>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub relationships: Vec<Relationship>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(
        rename = "attrs",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// Opaque name. Multi-valued attributes carry their value list inline,
    /// e.g. `person_type(customer?, employee?)`.
    pub name: String,
    #[serde(
        rename = "type",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "KeyKind::is_none"
    )]
    pub key_kind: KeyKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub entity_from: String,
    /// Cardinality on the `entity_to` side toward `entity_from`.
    #[serde(rename = "cardinality_right_to_left")]
    pub cardinality_to_from: Cardinality,
    pub name: String,
    /// Cardinality on the `entity_from` side toward `entity_to`.
    #[serde(rename = "cardinality_left_to_right")]
    pub cardinality_from_to: Cardinality,
    pub entity_to: String,
    #[serde(rename = "line_type", default, deserialize_with = "null_as_default")]
    pub line_kind: LineKind,
    #[serde(
        rename = "attrs",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    #[default]
    #[serde(rename = "strong")]
    Strong,
    #[serde(rename = "weak")]
    Weak,
    #[serde(rename = "assoc")]
    Associative,
    #[serde(rename = "super")]
    Superclass,
    #[serde(rename = "sub")]
    Subclass,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    #[default]
    None,
    Primary,
    Partial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    #[serde(rename = "11")]
    ExactlyOne,
    #[serde(rename = "01")]
    ZeroOrOne,
    #[serde(rename = "0m")]
    ZeroOrMany,
    #[serde(rename = "1m")]
    OneOrMany,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    #[default]
    Single,
    Double,
}

/// A DSL token that does not name any variant of the target enumeration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {what} `{token}`")]
pub struct UnknownToken {
    pub what: &'static str,
    pub token: String,
}

impl UnknownToken {
    fn new(what: &'static str, token: &str) -> Self {
        Self {
            what,
            token: token.to_string(),
        }
    }
}

impl EntityKind {
    pub fn token(self) -> &'static str {
        match self {
            EntityKind::Strong => "strong",
            EntityKind::Weak => "weak",
            EntityKind::Associative => "assoc",
            EntityKind::Superclass => "super",
            EntityKind::Subclass => "sub",
        }
    }

    pub fn option_count(self) -> usize {
        match self {
            EntityKind::Superclass => 2,
            EntityKind::Subclass => 1,
            _ => 0,
        }
    }
}

impl FromStr for EntityKind {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strong" => Ok(EntityKind::Strong),
            "weak" => Ok(EntityKind::Weak),
            "assoc" => Ok(EntityKind::Associative),
            "super" => Ok(EntityKind::Superclass),
            "sub" => Ok(EntityKind::Subclass),
            _ => Err(UnknownToken::new("entity kind", s)),
        }
    }
}

impl KeyKind {
    pub fn is_none(&self) -> bool {
        *self == KeyKind::None
    }

    pub fn prefix(self) -> &'static str {
        match self {
            KeyKind::None => "",
            KeyKind::Primary => "u.",
            KeyKind::Partial => "du.",
        }
    }
}

impl Cardinality {
    pub fn token(self) -> &'static str {
        match self {
            Cardinality::ExactlyOne => "11",
            Cardinality::ZeroOrOne => "01",
            Cardinality::ZeroOrMany => "0m",
            Cardinality::OneOrMany => "1m",
        }
    }
}

impl FromStr for Cardinality {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "11" => Ok(Cardinality::ExactlyOne),
            "01" => Ok(Cardinality::ZeroOrOne),
            "0m" => Ok(Cardinality::ZeroOrMany),
            "1m" => Ok(Cardinality::OneOrMany),
            _ => Err(UnknownToken::new("cardinality", s)),
        }
    }
}

impl LineKind {
    pub fn token(self) -> &'static str {
        match self {
            LineKind::Single => "single",
            LineKind::Double => "double",
        }
    }
}

impl FromStr for LineKind {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(LineKind::Single),
            "double" => Ok(LineKind::Double),
            _ => Err(UnknownToken::new("line kind", s)),
        }
    }
}

impl Attribute {
    pub fn new(name: impl Into<String>, key_kind: KeyKind) -> Self {
        Self {
            name: name.into(),
            key_kind,
        }
    }

    pub fn plain(name: impl Into<String>) -> Self {
        Self::new(name, KeyKind::None)
    }

    pub fn primary(name: impl Into<String>) -> Self {
        Self::new(name, KeyKind::Primary)
    }

    pub fn partial(name: impl Into<String>) -> Self {
        Self::new(name, KeyKind::Partial)
    }

    /// True when the name embeds a `(v1?, v2?)` value list.
    pub fn is_multi_valued(&self) -> bool {
        match self.name.find('(') {
            Some(open) => open > 0 && self.name.ends_with(')'),
            None => false,
        }
    }
}

impl Entity {
    pub fn new(name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            name: name.into(),
            kind,
            options: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn strong(name: impl Into<String>) -> Self {
        Self::new(name, EntityKind::Strong)
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_attributes(mut self, attributes: impl IntoIterator<Item = Attribute>) -> Self {
        self.attributes = attributes.into_iter().collect();
        self
    }

    pub fn keys(&self, key_kind: KeyKind) -> impl Iterator<Item = (usize, &Attribute)> {
        self.attributes
            .iter()
            .enumerate()
            .filter(move |(_, a)| a.key_kind == key_kind)
    }

    pub fn parent(&self) -> Option<&str> {
        match self.kind {
            EntityKind::Subclass => self.options.first().map(String::as_str),
            _ => None,
        }
    }
}

impl Relationship {
    pub fn new(
        entity_from: impl Into<String>,
        cardinality_to_from: Cardinality,
        name: impl Into<String>,
        cardinality_from_to: Cardinality,
        entity_to: impl Into<String>,
    ) -> Self {
        Self {
            entity_from: entity_from.into(),
            cardinality_to_from,
            name: name.into(),
            cardinality_from_to,
            entity_to: entity_to.into(),
            line_kind: LineKind::Single,
            attributes: Vec::new(),
        }
    }

    pub fn double(mut self) -> Self {
        self.line_kind = LineKind::Double;
        self
    }

    pub fn with_attributes(mut self, attributes: impl IntoIterator<Item = Attribute>) -> Self {
        self.attributes = attributes.into_iter().collect();
        self
    }

    /// The endpoint opposite to `entity`, if either endpoint names it.
    pub fn other_end(&self, entity: &str) -> Option<&str> {
        if same_name(&self.entity_from, entity) {
            Some(self.entity_to.as_str())
        } else if same_name(&self.entity_to, entity) {
            Some(self.entity_from.as_str())
        } else {
            None
        }
    }

    /// The owner this relationship gives the weak entity `weak`. Only `double`
    /// lines own, and a self-loop owns nothing.
    pub fn owner_of(&self, weak: &str) -> Option<&str> {
        if self.line_kind != LineKind::Double {
            return None;
        }
        self.other_end(weak).filter(|owner| !same_name(owner, weak))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<'a> {
    Found(usize, &'a Entity),
    Missing,
    Ambiguous(usize),
}

/// Structural edge implied by entity kinds, never stored as a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImpliedEdge<'a> {
    Hierarchy { superclass: &'a str, subclass: &'a str },
    Ownership { owner: &'a str, weak: &'a str },
}

impl Diagram {
    pub fn new(entities: Vec<Entity>, relationships: Vec<Relationship>) -> Self {
        Self {
            entities,
            relationships,
        }
    }

    pub fn resolve(&self, name: &str) -> Resolution<'_> {
        let mut matches = self
            .entities
            .iter()
            .enumerate()
            .filter(|(_, e)| same_name(&e.name, name));
        match (matches.next(), matches.count()) {
            (None, _) => Resolution::Missing,
            (Some((index, entity)), 0) => Resolution::Found(index, entity),
            (Some(_), rest) => Resolution::Ambiguous(rest + 1),
        }
    }

    /// Name as declared by the referenced entity, or `name` itself when it
    /// does not resolve to exactly one entity.
    pub fn canonical_name<'a>(&'a self, name: &'a str) -> &'a str {
        match self.resolve(name) {
            Resolution::Found(_, entity) => entity.name.as_str(),
            _ => name,
        }
    }

    /// Hierarchy edges in subclass order, then ownership edges in weak-entity order.
    pub fn implied_edges(&self) -> Vec<ImpliedEdge<'_>> {
        let hierarchy = self.entities.iter().filter_map(move |entity| {
            let parent = entity.parent()?;
            match self.resolve(parent) {
                Resolution::Found(_, superclass) => Some(ImpliedEdge::Hierarchy {
                    superclass: &superclass.name,
                    subclass: &entity.name,
                }),
                _ => None,
            }
        });

        let ownership = self
            .entities
            .iter()
            .filter(|e| e.kind == EntityKind::Weak)
            .flat_map(move |weak| {
                self.relationships
                    .iter()
                    .filter_map(move |r| r.owner_of(&weak.name))
                    .map(move |owner| ImpliedEdge::Ownership {
                        owner: self.canonical_name(owner),
                        weak: &weak.name,
                    })
            });

        hierarchy.chain(ownership).collect()
    }
}

pub fn same_name(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

pub fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

/// Entity names, header options and relationship endpoints are identifiers.
pub fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(is_identifier_char)
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
