//! Lock-free containers.
//!
//! # Organization
//!
//! - [`queue`] - Michael-Scott FIFO queue
//! - [`stack`] - Treiber LIFO stack
//! - [`list`] - unordered linked list with Harris-style logical deletion
//! - [`internal`] - node and container traits shared by all three

pub(crate) mod internal;
pub mod list;
pub mod queue;
pub mod stack;

pub use list::ConcurrentList;
pub use queue::ConcurrentQueue;
pub use stack::ConcurrentStack;

// MarkedPtr stays pub(crate); only the list marks pointers.
pub(crate) use internal::MarkedPtr;
pub use internal::{ConcurrentContainer, LinkedNode, TakeContainer};
