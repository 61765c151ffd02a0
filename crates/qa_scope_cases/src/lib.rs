//! Test-case front matter: schema table, parser/serializer, lint/normalize,
//! and the corpus directory layout. Pure logic; no I/O.

pub mod frontmatter;
pub mod layout;
pub mod normalize;
pub mod schema_registry;

pub use frontmatter::{
    ensure_front_matter, parse, serialize, set_id, Body, MalformedDocument, Metadata, Section,
    TestCaseDocument, CANONICAL_KEY_ORDER,
};
pub use normalize::{lint, lint_with_registry, normalize_metadata, LintError, LintResult};
pub use schema_registry::{AllowedValues, FieldKind, SchemaEntry, SchemaError, SchemaRegistry};
