pub mod avalanche;
pub mod mock;
pub mod traits;

pub use traits::{Broadcaster, ChainQuery};
