use std::collections::BTreeSet;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use proptest::sample::Index;

use erdsl::{Attribute, Cardinality, Diagram, Entity, EntityKind, Relationship, dsl_parser};

fn cardinality() -> impl Strategy<Value = Cardinality> {
    prop_oneof![
        Just(Cardinality::ExactlyOne),
        Just(Cardinality::ZeroOrOne),
        Just(Cardinality::ZeroOrMany),
        Just(Cardinality::OneOrMany),
    ]
}

fn name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,8}"
}

fn multi_valued_name() -> impl Strategy<Value = String> {
    ("[a-z]{1,6}", prop::collection::vec("[a-z]{1,4}", 1..4))
        .prop_map(|(name, values)| format!("{name}({}?)", values.join("?, ")))
}

fn plain_attribute() -> impl Strategy<Value = Attribute> {
    prop_oneof![
        "[a-z]([a-z_ ]{0,5}[a-z])?".prop_map(Attribute::plain),
        multi_valued_name().prop_map(Attribute::plain),
    ]
}

fn plain_attributes() -> impl Strategy<Value = Vec<Attribute>> {
    prop::collection::vec(plain_attribute(), 0..3)
}

/// Entity counts: strong, subclasses under one superclass (if any), weak, associative.
type Shape = (usize, Option<usize>, usize, usize);

/// Participation total?, overlap?, multi-valued and plain discriminator names.
type SuperclassSeed = (bool, bool, String, String);

type RelationshipSeed = (Index, Cardinality, String, Cardinality, Index, bool, Vec<Attribute>);

fn relationship() -> impl Strategy<Value = RelationshipSeed> {
    (
        any::<Index>(),
        cardinality(),
        "[a-z][a-z_.-]{0,8}",
        cardinality(),
        any::<Index>(),
        any::<bool>(),
        plain_attributes(),
    )
}

fn diagram() -> impl Strategy<Value = Diagram> {
    (1..4usize, prop::option::of(0..3usize), 0..3usize, 0..2usize)
        .prop_flat_map(|shape: Shape| {
            let (strong, subclasses, weak, assoc) = shape;
            let total = strong + subclasses.map_or(0, |n| n + 1) + weak + assoc;
            (
                Just(shape),
                prop::collection::btree_set(name(), total),
                prop::collection::vec(plain_attributes(), total),
                (any::<bool>(), any::<bool>(), multi_valued_name(), "[a-z]{1,8}"),
                prop::collection::vec((any::<Index>(), cardinality(), cardinality()), weak),
                prop::collection::vec(relationship(), 0..5),
            )
        })
        .prop_map(|(shape, names, attrs, superclass, owners, extra)| {
            build(shape, names, attrs, superclass, owners, extra)
        })
}

/// Lays entities out so every generated diagram validates: superclass before
/// its subclasses, each weak entity owned by a strong one through one double
/// line, extra lines single wherever they touch a weak entity.
fn build(
    (strong, subclasses, weak, assoc): Shape,
    names: BTreeSet<String>,
    attrs: Vec<Vec<Attribute>>,
    (total, overlap, multi_discriminator, plain_discriminator): SuperclassSeed,
    owners: Vec<(Index, Cardinality, Cardinality)>,
    extra: Vec<RelationshipSeed>,
) -> Diagram {
    let mut names = names.into_iter();
    let mut attrs = attrs.into_iter();
    let mut next = || (names.next().unwrap(), attrs.next().unwrap());
    let mut entities = Vec::new();
    let mut relationships = Vec::new();

    for _ in 0..strong {
        let (name, plain) = next();
        entities.push(
            Entity::strong(name)
                .with_attributes(std::iter::once(Attribute::primary("id")).chain(plain)),
        );
    }

    if let Some(count) = subclasses {
        let (name, plain_attrs) = next();
        let discriminator = if overlap {
            multi_discriminator
        } else {
            plain_discriminator
        };
        entities.push(
            Entity::new(name.clone(), EntityKind::Superclass)
                .with_options([
                    if total { "total" } else { "partial" },
                    if overlap { "overlap" } else { "disjoint" },
                ])
                .with_attributes(
                    std::iter::once(Attribute::primary("id"))
                        .chain(plain_attrs)
                        .chain(std::iter::once(Attribute::plain(discriminator))),
                ),
        );
        for _ in 0..count {
            let (sub, plain) = next();
            entities.push(
                Entity::new(sub, EntityKind::Subclass)
                    .with_options([name.as_str()])
                    .with_attributes(plain),
            );
        }
    }

    for (owner, to_from, from_to) in owners {
        let (name, plain) = next();
        let owner = entities[owner.index(strong)].name.clone();
        relationships.push(Relationship::new(owner, to_from, "owns", from_to, name.clone()).double());
        entities.push(
            Entity::new(name, EntityKind::Weak)
                .with_attributes(std::iter::once(Attribute::partial("seq")).chain(plain)),
        );
    }

    for _ in 0..assoc {
        let (name, plain) = next();
        entities.push(Entity::new(name, EntityKind::Associative).with_attributes(plain));
    }

    for (from, to_from, name, from_to, to, double, attrs) in extra {
        let from = &entities[from.index(entities.len())];
        let to = &entities[to.index(entities.len())];
        let touches_weak = from.kind == EntityKind::Weak || to.kind == EntityKind::Weak;
        let rel = Relationship::new(from.name.clone(), to_from, name, from_to, to.name.clone())
            .with_attributes(attrs);
        relationships.push(if double && !touches_weak { rel.double() } else { rel });
    }

    Diagram::new(entities, relationships)
}

fn printable() -> impl Strategy<Value = String> {
    prop_oneof!["[a-z][a-z_]{0,5}", "[ -~]{0,6}"]
}

/// Strong and associative entities plus relationships, every name drawn from
/// printable text so most diagrams fail validation.
fn loose_diagram() -> impl Strategy<Value = Diagram> {
    let entity = (
        printable(),
        any::<bool>(),
        printable(),
        prop::collection::vec(printable(), 0..3),
    );
    let relationship = (
        any::<Index>(),
        cardinality(),
        printable(),
        cardinality(),
        any::<Index>(),
        any::<bool>(),
        prop::collection::vec(printable(), 0..3),
    );
    (
        prop::collection::vec(entity, 1..4),
        prop::collection::vec(relationship, 0..3),
    )
        .prop_map(|(entities, rels)| {
            let entities: Vec<Entity> = entities
                .into_iter()
                .map(|(name, assoc, key, plain)| {
                    let plain = plain.into_iter().map(Attribute::plain);
                    if assoc {
                        Entity::new(name, EntityKind::Associative).with_attributes(plain)
                    } else {
                        Entity::strong(name)
                            .with_attributes(std::iter::once(Attribute::primary(key)).chain(plain))
                    }
                })
                .collect();
            let relationships = rels
                .into_iter()
                .map(|(from, to_from, name, from_to, to, double, attrs)| {
                    let from = entities[from.index(entities.len())].name.clone();
                    let to = entities[to.index(entities.len())].name.clone();
                    let rel = Relationship::new(from, to_from, name, from_to, to)
                        .with_attributes(attrs.into_iter().map(Attribute::plain));
                    if double { rel.double() } else { rel }
                })
                .collect();
            Diagram::new(entities, relationships)
        })
}

proptest! {
    #[test]
    fn serialize_is_idempotent(diagram in diagram()) {
        let first = erdsl::serialize(&diagram).unwrap();
        let second = erdsl::serialize(&diagram).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn parse_inverts_serialize(diagram in diagram()) {
        let text = erdsl::serialize(&diagram).unwrap();
        let parsed = dsl_parser::parse(&text).unwrap();
        prop_assert_eq!(parsed, diagram);
    }

    #[test]
    fn accepted_diagrams_read_back_unchanged(diagram in loose_diagram()) {
        if erdsl::validate(&diagram).is_ok() {
            let text = erdsl::serialize(&diagram).unwrap();
            let parsed = dsl_parser::parse(&text).unwrap();
            prop_assert_eq!(parsed, diagram);
        }
    }

    #[test]
    fn line_counts_match_diagram(diagram in diagram()) {
        let text = erdsl::serialize(&diagram).unwrap();
        let statements = text.lines().filter(|l| l.ends_with(';')).count();
        prop_assert_eq!(statements, diagram.entities.len() + diagram.relationships.len());
    }
}

#[test]
fn roundtrip_covers_every_entity_kind() {
    let diagram = Diagram::new(
        vec![
            Entity::strong("customer").with_attributes([Attribute::primary("id")]),
            Entity::new("person", EntityKind::Superclass)
                .with_options(["partial", "overlap"])
                .with_attributes([
                    Attribute::primary("ssn"),
                    Attribute::plain("person_type(customer?, employee?)"),
                ]),
            Entity::new("employee", EntityKind::Subclass)
                .with_options(["person"])
                .with_attributes([Attribute::plain("salary")]),
            Entity::new("visit", EntityKind::Weak)
                .with_attributes([Attribute::partial("visit_no"), Attribute::plain("date")]),
            Entity::new("purchase", EntityKind::Associative),
        ],
        vec![
            Relationship::new(
                "customer",
                Cardinality::ZeroOrMany,
                "makes",
                Cardinality::ExactlyOne,
                "visit",
            )
            .double(),
            Relationship::new(
                "employee",
                Cardinality::ZeroOrMany,
                "sells",
                Cardinality::ZeroOrMany,
                "customer",
            )
            .with_attributes([Attribute::plain("amount"), Attribute::plain("channel(web?, store?)")]),
        ],
    );
    let text = erdsl::serialize(&diagram).unwrap();
    assert_eq!(dsl_parser::parse(&text).unwrap(), diagram);
}
