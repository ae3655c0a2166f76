//! SQL fragment generation.

pub mod order_by;

pub use order_by::{
    JoinDescriptor, NAMESPACE_SEPARATOR, OrderByBuilder, OrderSpec, OrderTransform, SortDirection,
    build_order_by,
};
