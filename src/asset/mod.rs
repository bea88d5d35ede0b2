pub mod cache;
pub mod dict;
pub mod handle;

pub use cache::AssetCache;
pub use dict::{HandleDict, HandlePool};
pub use handle::{Handle, Identified};
