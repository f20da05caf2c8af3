//! Inherited access control.
//!
//! - [`AclComposer`] derives an item's effective grantee list from the
//!   mirror
//! - [`AclFeed`] is the shared feed document the search index reads
//! - [`FeedHandle`] serializes every feed mutation through one task

mod composer;
mod feed;
mod writer;

pub use composer::AclComposer;
pub use feed::{AclFeed, FeedRecord};
pub use writer::FeedHandle;
