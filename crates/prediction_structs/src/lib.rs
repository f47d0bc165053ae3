//! Common structs for model serving shared across crates.

mod channel_order;
mod error;
mod schema;
mod value;

pub use channel_order::*;
pub use error::*;
pub use schema::*;
pub use value::*;
