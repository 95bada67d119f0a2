//! ZeroIPC: a cross-language, zero-copy IPC substrate over POSIX shared
//! memory. A segment is a named, memory-mapped region addressed through
//! a metadata table; structures (array, queue, stack, ring, map, set,
//! pool) and synchronization primitives (semaphore, barrier, latch) are
//! located inside it by name and operated on directly, with no
//! serialization on the hot path.
//!
//! ```no_run
//! use zeroipc::{Segment, Array};
//!
//! let segment = Segment::create("/my_segment", 1 << 20, 16)?;
//! let values = Array::<f64>::create_in(&segment, "values", 100)?;
//! values.set(0, 3.14)?;
//! # Ok::<(), zeroipc::Error>(())
//! ```

pub mod backoff;
pub mod error;
pub mod hash;
pub mod segment;
pub mod structures;
pub mod sync;
pub mod table;

pub use error::{Error, Result};
pub use segment::Segment;
pub use structures::array::Array;
pub use structures::map::Map;
pub use structures::pool::Pool;
pub use structures::queue::Queue;
pub use structures::ring::Ring;
pub use structures::set::Set;
pub use structures::stack::Stack;
pub use sync::barrier::Barrier;
pub use sync::latch::Latch;
pub use sync::semaphore::Semaphore;
