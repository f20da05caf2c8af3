//! The source hierarchy: where items, grants and content come from.

mod box_client;
mod provider;

pub use box_client::{BoxClient, BoxClientConfig};
pub use provider::{ChildPage, HierarchyProvider, StaticHierarchy};
