//! Parameterized SQL for resource queries. Identifiers come from resolved resources;
//! values are always bound.

mod builder;
pub mod params;
pub use builder::*;
pub use params::*;
