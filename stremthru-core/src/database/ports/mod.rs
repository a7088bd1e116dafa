//! Repository ports. The engine depends only on these traits; adapters live
//! under [`crate::database::infrastructure`].

pub mod identity;
pub mod lists;

pub use identity::{IdentityRepository, IdentityWrite};
pub use lists::ListRepository;
