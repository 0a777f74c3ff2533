/*
[INPUT]:  Exchange schema definitions and serde requirements
[OUTPUT]: Typed Rust structs/enums with serialization support
[POS]:    Data layer - type definitions for market-data domain objects
[UPDATE]: When the exchange schema changes or new types are added
*/

pub mod enums;
pub mod models;

pub use enums::*;
pub use models::*;

pub(crate) use models::wire;
