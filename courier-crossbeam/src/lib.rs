//! Epoch-based reclamation for courier containers.
//!
//! This crate provides `EpochGuard`, an implementation of the `Guard` trait
//! backed by crossbeam-epoch. It is the guard the executor runs its queues on.
//!
//! # Usage
//!
//! ```ignore
//! use courier_core::data_structures::ConcurrentQueue;
//! use courier_crossbeam::EpochGuard;
//!
//! let queue: ConcurrentQueue<i32, EpochGuard> = ConcurrentQueue::new();
//! queue.enqueue(42);
//! ```

pub mod epoch_guard;

pub use epoch_guard::{EpochGuard, EpochRef};

use courier_core::data_structures::{ConcurrentList, ConcurrentQueue, ConcurrentStack};

pub type EpochQueue<T> = ConcurrentQueue<T, EpochGuard>;
pub type EpochStack<T> = ConcurrentStack<T, EpochGuard>;
pub type EpochList<T> = ConcurrentList<T, EpochGuard>;
