//! The family of concurrent data structures that live inside a segment.
//!
//! Each structure is a contiguous byte region located through the
//! segment's [`crate::table::Table`]: a create operation bump-allocates
//! through the table, an open operation looks the name up. From there,
//! all operations are direct reads/writes into the mapped segment with
//! the atomic orderings spec'd per structure.

pub mod array;
pub mod map;
pub mod pool;
pub mod queue;
pub mod ring;
pub mod set;
pub mod stack;

use crate::error::{Error, Result};
use crate::segment::Segment;

/// Bump-allocate `total_size` bytes under `name` in `segment`'s table
/// and return a pointer to the start of that region.
pub(crate) fn allocate(segment: &Segment, name: &str, total_size: u32) -> Result<*mut u8> {
    let table = segment.table();
    let offset = table.add(name, total_size)?;
    Ok(unsafe { (segment.raw_base() as *mut u8).add(offset as usize) })
}

/// Look up `name` in `segment`'s table and return a pointer to its
/// region plus its recorded byte size.
pub(crate) fn lookup(segment: &Segment, name: &str) -> Result<(*mut u8, u32)> {
    let table = segment.table();
    let (offset, size) = table
        .find(name)
        .ok_or_else(|| Error::NotFound(name.to_string()))?;
    let ptr = unsafe { (segment.raw_base() as *mut u8).add(offset as usize) };
    Ok((ptr, size))
}
