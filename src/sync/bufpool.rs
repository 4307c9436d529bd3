//! Fixed-size buffer pool
//!
//! A pool of `count` fixed-size blocks carved out of a single backing
//! buffer. Free blocks are threaded into a singly-linked freelist using
//! the block's own storage to hold the "next free" pointer, so no extra
//! bookkeeping memory is needed beyond the pool header itself. `take`
//! never blocks: an empty pool is reported immediately as depleted.

use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::types::{opt, OsObjKind, OsObjQty, OsOpt};

/// Fixed-size block pool over caller-supplied storage
pub struct OsBufPool {
    obj_kind: OsObjKind,
    /// Backing storage, `block_size * count` bytes
    pool: *mut u8,
    block_size: usize,
    count: OsObjQty,
    free_count: OsObjQty,
    free_head: *mut u8,
    app_owned: bool,
    #[cfg(feature = "defmt")]
    name: &'static str,
}

// SAFETY: all access to `pool`/`free_head` happens under the kernel's
// single global critical section, same as every other sync primitive.
unsafe impl Send for OsBufPool {}
unsafe impl Sync for OsBufPool {}

impl OsBufPool {
    pub const fn new() -> Self {
        OsBufPool {
            obj_kind: OsObjKind::BufPool,
            pool: core::ptr::null_mut(),
            block_size: 0,
            count: 0,
            free_count: 0,
            free_head: core::ptr::null_mut(),
            app_owned: false,
            #[cfg(feature = "defmt")]
            name: "",
        }
    }

    /// Initialize the pool over caller-supplied storage and thread every
    /// block onto the freelist.
    ///
    /// # Safety
    /// `buf` must point to at least `block_size * count` bytes, valid and
    /// exclusively owned by this pool for its entire lifetime. `block_size`
    /// must be at least `size_of::<*mut u8>()` so a free block can hold its
    /// own freelist link.
    pub unsafe fn create(
        &mut self,
        buf: *mut u8,
        block_size: usize,
        count: OsObjQty,
        create_opt: OsOpt,
        _name: &'static str,
    ) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::CreateIsr);
        }
        if block_size < core::mem::size_of::<*mut u8>() || count == 0 {
            return Err(OsError::OptInvalid);
        }

        critical_section(|_cs| {
            self.obj_kind = OsObjKind::BufPool;
            self.pool = buf;
            self.block_size = block_size;
            self.count = count;
            self.app_owned = create_opt & opt::BUFPOOL_APP_OWNED != 0;
            #[cfg(feature = "defmt")]
            {
                self.name = _name;
            }

            self.free_head = core::ptr::null_mut();
            for i in (0..count as usize).rev() {
                let block = unsafe { buf.add(i * block_size) };
                unsafe { (block as *mut *mut u8).write(self.free_head) };
                self.free_head = block;
            }
            self.free_count = count;

            Ok(())
        })
    }

    /// Take a block off the freelist. Never blocks.
    pub fn take(&mut self) -> OsResult<*mut u8> {
        if self.obj_kind != OsObjKind::BufPool {
            return Err(OsError::ObjType);
        }

        critical_section(|_cs| {
            if self.free_head.is_null() {
                return Err(OsError::BufPoolDepleted);
            }
            let block = self.free_head;
            self.free_head = unsafe { (block as *mut *mut u8).read() };
            self.free_count -= 1;
            Ok(block)
        })
    }

    /// Return a block to the freelist.
    ///
    /// # Safety
    /// `block` must be a pointer previously returned by `take` on this
    /// same pool, not already returned, and not used again after this call.
    pub unsafe fn give(&mut self, block: *mut u8) -> OsResult<()> {
        if self.obj_kind != OsObjKind::BufPool {
            return Err(OsError::ObjType);
        }
        if !self.owns(block) {
            return Err(OsError::BufPoolForeignBlock);
        }
        if self.free_count >= self.count {
            return Err(OsError::BufPoolForeignBlock);
        }

        critical_section(|_cs| {
            unsafe { (block as *mut *mut u8).write(self.free_head) };
            self.free_head = block;
            self.free_count += 1;
            Ok(())
        })
    }

    /// Tear the pool down. `force` (`opt::DEL_ALWAYS`) allows deletion even
    /// while blocks are still checked out; otherwise outstanding blocks
    /// refuse the delete.
    pub fn del(&mut self, del_opt: OsOpt) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::DelIsr);
        }
        if self.obj_kind != OsObjKind::BufPool {
            return Err(OsError::ObjType);
        }
        if self.free_count < self.count && del_opt & opt::DEL_ALWAYS == 0 {
            return Err(OsError::StateInvalid);
        }

        critical_section(|_cs| {
            self.pool = core::ptr::null_mut();
            self.free_head = core::ptr::null_mut();
            self.count = 0;
            self.free_count = 0;
            Ok(())
        })
    }

    /// Number of blocks currently checked out.
    #[inline]
    pub fn get_count(&self) -> OsObjQty {
        self.count - self.free_count
    }

    #[inline]
    pub fn free_count(&self) -> OsObjQty {
        self.free_count
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Re-thread every block back onto the freelist, discarding any
    /// outstanding checkouts. Used to recover a pool whose owner leaked
    /// blocks rather than tracking each one down.
    pub fn reset(&mut self) -> OsResult<()> {
        if self.obj_kind != OsObjKind::BufPool {
            return Err(OsError::ObjType);
        }

        critical_section(|_cs| {
            self.free_head = core::ptr::null_mut();
            for i in (0..self.count as usize).rev() {
                let block = unsafe { self.pool.add(i * self.block_size) };
                unsafe { (block as *mut *mut u8).write(self.free_head) };
                self.free_head = block;
            }
            self.free_count = self.count;
            Ok(())
        })
    }

    fn owns(&self, block: *mut u8) -> bool {
        if self.pool.is_null() || self.count == 0 {
            return false;
        }
        let start = self.pool as usize;
        let end = start + self.block_size * self.count as usize;
        let addr = block as usize;
        addr >= start && addr < end && (addr - start) % self.block_size == 0
    }
}

impl Default for OsBufPool {
    fn default() -> Self {
        Self::new()
    }
}
