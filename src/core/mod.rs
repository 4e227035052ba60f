//! Template compilation: types, type mapping, constraints, parameter resolution, records.

pub mod compiler;
pub mod constraints;
pub mod record;
pub mod resolver;
pub mod typemap;
pub mod types;
