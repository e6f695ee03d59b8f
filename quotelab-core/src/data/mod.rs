//! Provider fallback chain and its collaborator interfaces.

pub mod cache;
pub mod fallback;
pub mod provider;
pub mod resolution;

pub use cache::{cache_key, BarCache, CacheError, MemoryCache};
pub use fallback::{BarsResponse, FallbackChain, FallbackConfig};
pub use provider::{BarProvider, DataError, ProviderError, ProviderKind};
pub use resolution::{parse_resolution, FallbackPlan};
