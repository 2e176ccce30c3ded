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
use tracing::info;

use super::{zeroed_page, Pool, MAX_PAGE_SIZE};
use crate::error::{Error, Result};

/// A single large block of secondary memory, reserved up front and addressed in
/// MAX_PAGE_SIZE pages. The last page may be shorter than the others.
pub struct ExtendedPool {
    data: Box<[u8]>,
}

impl ExtendedPool {
    /// Reserves size bytes of secondary memory.
    pub fn new(size: usize) -> Result<ExtendedPool> {
        let size = size.clamp(1, MAX_PAGE_SIZE * (u16::MAX as usize + 1));
        let data = zeroed_page(size).ok_or(Error::OutOfMemory {
            requested: size,
            allocated: 0,
            capacity: 0,
        })?;

        info!(kilobytes = size >> 10, "Reserved extended memory.");
        Ok(ExtendedPool { data })
    }
}

impl Pool for ExtendedPool {
    fn name(&self) -> &'static str {
        "extended"
    }

    fn page_size(&self) -> usize {
        MAX_PAGE_SIZE
    }

    fn page_limit(&self) -> usize {
        self.data.len().div_ceil(MAX_PAGE_SIZE)
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn reserved(&self) -> usize {
        self.data.len()
    }

    fn reserve(&mut self, page: usize) -> bool {
        page < self.page_limit()
    }

    fn page(&self, page: usize) -> Option<&[u8]> {
        let start = page.checked_mul(MAX_PAGE_SIZE)?;
        let end = start.saturating_add(MAX_PAGE_SIZE).min(self.data.len());
        self.data.get(start..end)
    }

    fn page_mut(&mut self, page: usize) -> Option<&mut [u8]> {
        let start = page.checked_mul(MAX_PAGE_SIZE)?;
        let end = start.saturating_add(MAX_PAGE_SIZE).min(self.data.len());
        self.data.get_mut(start..end)
    }

    fn release(&mut self) {}
}
