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
use tracing::debug;

use super::{zeroed_page, Pool, MAX_PAGE_SIZE};
use crate::error::{Error, Result};

/// The default size of a single local pool.
pub const DEFAULT_POOL_SIZE: usize = 8192;

/// The default maximum number of local pools.
pub const DEFAULT_POOL_LIMIT: usize = 64;

/// A handful of small pools in ordinary memory. The first pool is reserved immediately,
/// the others only once the previous one overflows.
pub struct LocalPool {
    pool_size: usize,
    limit: usize,
    pools: Vec<Box<[u8]>>,
}

impl LocalPool {
    /// Creates a pool set of at most limit pools of pool_size bytes each.
    pub fn new(pool_size: usize, limit: usize) -> Result<LocalPool> {
        let pool_size = pool_size.clamp(1, MAX_PAGE_SIZE);
        let limit = limit.clamp(1, u16::MAX as usize + 1);
        let first = zeroed_page(pool_size).ok_or(Error::OutOfMemory {
            requested: pool_size,
            allocated: 0,
            capacity: pool_size * limit,
        })?;

        let mut pools = Vec::with_capacity(limit);
        pools.push(first);
        Ok(LocalPool {
            pool_size,
            limit,
            pools,
        })
    }
}

impl Pool for LocalPool {
    fn name(&self) -> &'static str {
        "local"
    }

    fn page_size(&self) -> usize {
        self.pool_size
    }

    fn page_limit(&self) -> usize {
        self.limit
    }

    fn capacity(&self) -> usize {
        self.pool_size * self.limit
    }

    fn reserved(&self) -> usize {
        self.pool_size * self.pools.len()
    }

    fn reserve(&mut self, page: usize) -> bool {
        if page < self.pools.len() {
            return true;
        }
        if page != self.pools.len() || page >= self.limit {
            return false;
        }
        match zeroed_page(self.pool_size) {
            Some(pool) => {
                debug!(pool = page, "Reserved local pool.");
                self.pools.push(pool);
                true
            }
            None => false,
        }
    }

    fn page(&self, page: usize) -> Option<&[u8]> {
        self.pools.get(page).map(|pool| &pool[..])
    }

    fn page_mut(&mut self, page: usize) -> Option<&mut [u8]> {
        self.pools.get_mut(page).map(|pool| &mut pool[..])
    }

    fn release(&mut self) {
        self.pools.truncate(1);
    }
}
