//! Audience segmentation: declarative rule trees compiled into storage
//! predicates, and audience resolution against a customer store.

pub mod resolver;
pub mod rules;

pub use resolver::{AudienceResolver, CustomerQuery, Segment};
pub use rules::{
    compile, eval, AudienceFilter, CompareOp, CustomerField, FilterOp, FilterValue, GroupOperator,
    Rule,
};
