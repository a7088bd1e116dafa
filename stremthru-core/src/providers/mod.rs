//! Provider seam: the trait upstream clients implement, their error type,
//! HTTP response helpers, and normalization of raw pages.

pub mod error;
pub mod http;
pub mod normalizer;
pub mod traits;

pub use error::ProviderError;
pub use normalizer::{FetchOutcome, NormalizedList, normalize};
pub use traits::{ListMeta, ListPage, ListProvider, RawListItem};
