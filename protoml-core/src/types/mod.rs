//! Record schemas shared by every subsystem: data types, data groups,
//! dataset descriptions, templates, induced transforms and states.

pub mod data;
pub mod transform;

pub use data::{ColumnSpec, DataGroup, DataType, DatasetFile, GroupSource, State};
pub use transform::{
    ConstraintClass, FileSpec, InducedTransform, ParameterSpec, StateSpec, Transform,
    TransformFunction, ValueKind,
};
