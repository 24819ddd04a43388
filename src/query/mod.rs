//! Query core
//!
//! - **Operators**: named predicates with validity rules and renderings
//! - **Translator**: `(field, operator, value)` to a guarded condition
//! - **Parser**: nested filter trees to one composite condition
//! - **Data views**: output columns and ordering by concept
//! - **Pipeline**: filter tree and view applied to one root model
//!
//! # Filter trees
//!
//! ```rust,ignore
//! let tree = json!({
//!     "type": "and",
//!     "children": [
//!         {"id": 4, "operator": "exact", "value": true},
//!         {"id": "hr.employee.first_name", "operator": "exact", "value": "John"},
//!     ]
//! });
//! let node = site.parse_tree(&tree, &employee, &Context::new())?;
//! let rows = node.apply(&site.database().objects(&employee)?).rows();
//! ```

mod dataview;
mod error;
mod operators;
mod parser;
mod pipeline;
mod translator;

pub use dataview::{parse_view, validate_view, DataView, SortDirection};
pub use error::{QueryError, QueryResult};
pub use operators::{Operator, TEXT_MAX_LIST_SIZE};
pub use parser::{parse, validate, BranchKind, FieldLookup, FieldRef, Leaf, ParsedNode};
pub use pipeline::{DataQuery, QueryProcessor};
pub use translator::{
    default_operator_map, split_operand, translator_for, CleanedData, DefaultTranslator, QueryEnv,
    RawData, Translation, Translator,
};
