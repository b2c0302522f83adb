pub mod dsl_parser;
pub mod error;
pub mod ir;
pub mod serializer;
pub mod validate;

pub use error::{Error, Result};
pub use ir::{
    Attribute, Cardinality, Diagram, Entity, EntityKind, ImpliedEdge, KeyKind, LineKind,
    Relationship, Resolution,
};
pub use serializer::{Policy, serialize, serialize_with_policy};
pub use validate::{ConstraintViolation, Invariant, ViolationClass, Violations, validate};

/// Translates generator JSON into DSL text, refusing any invalid diagram.
pub fn translate(json: &str) -> Result<String> {
    translate_with_policy(json, Policy::Strict)
}

pub fn translate_with_policy(json: &str, policy: Policy) -> Result<String> {
    let diagram: Diagram = serde_json::from_str(json)?;
    serialize_with_policy(&diagram, policy)
}
