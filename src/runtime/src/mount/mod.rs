//! Union mounts backing the snapshot root.
//!
//! The snapshot manager only requires that its root is served by a union
//! mount; providers decide how that mount comes to exist.

pub mod fuse;
pub mod mountinfo;
pub mod native;
pub mod union;

pub use fuse::{Branches, FuseMount, FuseUnionProvider, FUSE_PROVIDER};
pub use mountinfo::{lookup, parse_mountinfo, MountInfo};
pub use native::{NativeMount, NativeProvider, NATIVE_PROVIDER};
pub use union::{ProviderRegistry, UnionMount, UnionMountProvider};
