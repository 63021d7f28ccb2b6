//! Blocking synchronization primitives used around the lock-free core.

pub mod countdown_event;
pub mod one_shot;

pub use countdown_event::CountdownEvent;
pub use one_shot::OneShot;
