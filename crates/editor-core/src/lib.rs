mod core;
pub mod fuzzy;
mod heading_id;
pub mod media;
mod node;
mod ops;
mod plugin;
mod serde_value;
mod slash;
mod toc;

pub use crate::core::*;
pub use crate::heading_id::*;
pub use crate::node::*;
pub use crate::ops::*;
pub use crate::plugin::*;
pub use crate::serde_value::*;
pub use crate::slash::*;
pub use crate::toc::*;
