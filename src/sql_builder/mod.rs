//! SQL fragment builder.
//!
//! Builds parameterized statements one clause at a time. A statement is
//! built inside a [`StatementScope`]; all builders of that statement
//! (including sub-queries nested in select items or `EXISTS` predicates)
//! borrow the same scope and draw their aliases from its counter.

mod builder;
mod dialect;
mod errors;
mod scope;

pub use builder::{Join, JoinKind, QueryBuilder, SelectItem, SortOrder};
pub use dialect::{qualified, quote_ident, quote_literal, SqlDialect};
pub use errors::SqlBuildError;
pub use scope::{to_snake_case, Statement, StatementScope};
