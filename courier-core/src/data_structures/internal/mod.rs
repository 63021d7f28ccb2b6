//! Internal implementation details.

pub mod concurrent_container;
pub mod marked_ptr;

pub(crate) use marked_ptr::MarkedPtr;
pub use concurrent_container::{ConcurrentContainer, LinkedNode, TakeContainer};
