//! Operations on Values paired with a schema: validation, field set
//! extraction, comparison, and merging.

mod comparison;
mod parser;
mod typed_value;
mod validation;

pub use comparison::*;
pub use parser::*;
pub use typed_value::*;
pub use validation::*;
