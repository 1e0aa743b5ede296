// Unit location and per-unit field extraction
pub mod cascade;
pub mod consistency;
pub mod dates;
pub mod fields;
pub mod locator;
pub mod normalize;

pub use cascade::{Cascade, FieldContext, FieldRules, Resolved, Strategy};
pub use consistency::ConsistencyPass;
pub use dates::DateSet;
pub use fields::FieldExtractor;
pub use locator::{LocatedUnit, Neighbours, UnitLocator};
pub use normalize::{normalize, NormalizedText, SubstitutionTable};
