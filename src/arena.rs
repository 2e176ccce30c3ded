// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{cell::Cell, fmt};

use tracing::debug;

use crate::error::{Error, Result};

mod extended;
mod local;

pub use extended::ExtendedPool;
pub use local::{LocalPool, DEFAULT_POOL_LIMIT, DEFAULT_POOL_SIZE};

/// Largest page any pool may use. Handles keep the in-page offset in 16 bits.
pub const MAX_PAGE_SIZE: usize = 1 << 16;

/// Backing storage for the arena. A pool is a fixed number of equally sized pages; the
/// arena decides where things go, the pool only has to make pages available.
pub trait Pool: Send {
    /// A short name for logging.
    fn name(&self) -> &'static str;

    /// The size of a single page in bytes. Never more than MAX_PAGE_SIZE.
    fn page_size(&self) -> usize;

    /// The maximum number of pages this pool can hold.
    fn page_limit(&self) -> usize;

    /// The total number of addressable bytes.
    fn capacity(&self) -> usize;

    /// The number of bytes currently held from the host.
    fn reserved(&self) -> usize;

    /// Makes the given page usable. Returns false if the host could not provide it.
    fn reserve(&mut self, page: usize) -> bool;

    /// Returns the given page, if it has been reserved.
    fn page(&self, page: usize) -> Option<&[u8]>;

    /// Returns the given page for writing, if it has been reserved.
    fn page_mut(&mut self, page: usize) -> Option<&mut [u8]>;

    /// Gives back whatever the pool does not need to keep between songs.
    fn release(&mut self);
}

/// An opaque reference to bytes held by an arena. Handles are only produced by
/// Arena::allocate and are meaningless once the arena has been reset.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u32);

impl Handle {
    fn new(page: usize, offset: usize) -> Handle {
        debug_assert!(page <= u16::MAX as usize && offset < MAX_PAGE_SIZE);
        Handle(((page as u32) << 16) | offset as u32)
    }

    fn page(self) -> usize {
        (self.0 >> 16) as usize
    }

    fn offset(self) -> usize {
        (self.0 & 0xffff) as usize
    }

    /// Returns the raw encoding, used when the handle is stored inside a record.
    pub(crate) fn to_raw(self) -> u32 {
        self.0
    }

    /// Rebuilds a handle from its stored encoding.
    pub(crate) fn from_raw(raw: u32) -> Handle {
        Handle(raw)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.page(), self.offset())
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self)
    }
}

/// Usage counters for an arena since its last reset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// Bytes handed out by allocate.
    pub allocated: usize,
    /// Bytes held from the host by the pool.
    pub reserved: usize,
    /// Total addressable bytes.
    pub capacity: usize,
    /// Number of pull operations.
    pub pulls: u64,
    /// Number of push operations.
    pub pushes: u64,
}

/// An append-only bump allocator over a paged pool. Allocations never move, never cross a
/// page boundary and are never freed individually; reset makes all of the space reusable.
pub struct Arena {
    pool: Box<dyn Pool>,
    /// The page holding the next free byte.
    page: usize,
    /// The next free byte within the current page.
    offset: usize,
    allocated: usize,
    pulls: Cell<u64>,
    pushes: u64,
}

impl Arena {
    /// Creates an arena over the given pool.
    pub fn new<P: Pool + 'static>(pool: P) -> Arena {
        debug!(
            pool = pool.name(),
            page_size = pool.page_size(),
            pages = pool.page_limit(),
            capacity = pool.capacity(),
            "Arena created."
        );
        Arena {
            pool: Box::new(pool),
            page: 0,
            offset: 0,
            allocated: 0,
            pulls: Cell::new(0),
            pushes: 0,
        }
    }

    /// Reserves size bytes and returns a handle to them.
    pub fn allocate(&mut self, size: usize) -> Result<Handle> {
        let page_size = self.pool.page_size();
        if size > page_size {
            return Err(self.out_of_memory(size));
        }

        let (mut page, mut offset) = (self.page, self.offset);
        if offset + size > page_size {
            page += 1;
            offset = 0;
        }
        if page >= self.pool.page_limit()
            || page * page_size + offset + size > self.pool.capacity()
        {
            return Err(self.out_of_memory(size));
        }
        if !self.pool.reserve(page) {
            return Err(self.out_of_memory(size));
        }

        self.page = page;
        self.offset = offset + size;
        self.allocated += size;
        Ok(Handle::new(page, offset))
    }

    /// Copies buf.len() bytes starting at the handle into buf.
    pub fn pull(&self, handle: Handle, buf: &mut [u8]) -> Result<()> {
        let range = self.span(handle, buf.len())?;
        let page = self
            .pool
            .page(handle.page())
            .ok_or(Error::CorruptHandle { handle })?;
        buf.copy_from_slice(page.get(range).ok_or(Error::CorruptHandle { handle })?);
        self.pulls.set(self.pulls.get() + 1);
        Ok(())
    }

    /// Copies data into the arena starting at the handle.
    pub fn push(&mut self, handle: Handle, data: &[u8]) -> Result<()> {
        let range = self.span(handle, data.len())?;
        let page = self
            .pool
            .page_mut(handle.page())
            .ok_or(Error::CorruptHandle { handle })?;
        page.get_mut(range)
            .ok_or(Error::CorruptHandle { handle })?
            .copy_from_slice(data);
        self.pushes += 1;
        Ok(())
    }

    /// Forgets every allocation. All previously issued handles become invalid.
    pub fn reset(&mut self) {
        self.page = 0;
        self.offset = 0;
        self.allocated = 0;
        self.pulls.set(0);
        self.pushes = 0;
        self.pool.release();
    }

    /// Returns the usage counters.
    pub fn stats(&self) -> Stats {
        Stats {
            allocated: self.allocated,
            reserved: self.pool.reserved(),
            capacity: self.pool.capacity(),
            pulls: self.pulls.get(),
            pushes: self.pushes,
        }
    }

    /// Returns the name of the backing pool.
    pub fn pool_name(&self) -> &'static str {
        self.pool.name()
    }

    /// Validates that len bytes at the handle lie within allocated space and returns the
    /// in-page byte range.
    fn span(&self, handle: Handle, len: usize) -> Result<std::ops::Range<usize>> {
        let (page, start) = (handle.page(), handle.offset());
        let end = start + len;
        let in_bounds = if page < self.page {
            end <= self.pool.page_size()
        } else {
            page == self.page && end <= self.offset
        };
        if !in_bounds || self.allocated == 0 {
            return Err(Error::CorruptHandle { handle });
        }
        Ok(start..end)
    }

    fn out_of_memory(&self, requested: usize) -> Error {
        Error::OutOfMemory {
            requested,
            allocated: self.allocated,
            capacity: self.pool.capacity(),
        }
    }
}

/// Allocates a zeroed page, returning None if the host is out of memory.
fn zeroed_page(size: usize) -> Option<Box<[u8]>> {
    let mut page = Vec::new();
    page.try_reserve_exact(size).ok()?;
    page.resize(size, 0);
    Some(page.into_boxed_slice())
}
