//! Thread stacks.
//!
//! Each stack is a private anonymous mapping whose lowest page is
//! `PROT_NONE`, so running off the end faults instead of scribbling over a
//! neighbour. A canary word sits just above the guard page and is checked
//! every time the owning thread is switched out.

use crate::error::{ThreadError, ThreadResult};
use core::ptr::NonNull;
use spin::Once;

const STACK_CANARY: u64 = 0xDEAD_BEEF_CAFE_BABE;
const STACK_ALIGN: usize = 16;

/// A dedicated stack region owned by one TCB slot.
pub struct Stack {
    /// Lowest address of the allocation (the guard page).
    base: NonNull<u8>,
    /// Total bytes allocated, guard included.
    total: usize,
    /// Bytes reserved below the usable region.
    guard: usize,
}

impl Stack {
    /// Usable size in bytes.
    pub fn size(&self) -> usize {
        self.total - self.guard
    }

    /// Lowest usable address; the stack grows down towards it.
    pub fn bottom(&self) -> *mut u8 {
        unsafe { self.base.as_ptr().add(self.guard) }
    }

    /// Highest usable address, aligned for the first frame.
    pub fn top(&self) -> *mut u8 {
        let end = unsafe { self.base.as_ptr().add(self.total) } as usize;
        (end & !(STACK_ALIGN - 1)) as *mut u8
    }

    /// Whether the canary at the bottom of the stack is intact.
    pub fn canary_intact(&self) -> bool {
        unsafe { (self.bottom() as *const u64).read_volatile() == STACK_CANARY }
    }

    fn install_canary(&self) {
        unsafe { (self.bottom() as *mut u64).write_volatile(STACK_CANARY) }
    }
}

static PAGE_SIZE: Once<usize> = Once::new();

fn page_size() -> usize {
    *PAGE_SIZE.call_once(|| {
        let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if page > 0 {
            page as usize
        } else {
            4096
        }
    })
}

impl Stack {
    /// Map a stack of at least `size` usable bytes plus a guard page.
    pub fn allocate(size: usize) -> ThreadResult<Stack> {
        let page = page_size();
        let usable = size
            .checked_add(page - 1)
            .map(|s| s & !(page - 1))
            .ok_or(ThreadError::OutOfMemory)?;
        let total = usable.checked_add(page).ok_or(ThreadError::OutOfMemory)?;

        let raw = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                total,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_STACK,
                -1,
                0,
            )
        };
        if raw == libc::MAP_FAILED {
            return Err(ThreadError::OutOfMemory);
        }

        if unsafe { libc::mprotect(raw, page, libc::PROT_NONE) } != 0 {
            unsafe { libc::munmap(raw, total) };
            return Err(ThreadError::OutOfMemory);
        }

        let base = NonNull::new(raw as *mut u8).ok_or(ThreadError::OutOfMemory)?;
        let stack = Stack {
            base,
            total,
            guard: page,
        };
        stack.install_canary();
        Ok(stack)
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base.as_ptr() as *mut libc::c_void, self.total);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_rounds_and_aligns() {
        let stack = Stack::allocate(20 * 1024).unwrap();
        assert!(stack.size() >= 20 * 1024);
        assert_eq!(stack.top() as usize % STACK_ALIGN, 0);
        assert!(stack.bottom() < stack.top());
        assert!(stack.canary_intact());
    }

    #[test]
    fn test_canary_detects_overwrite() {
        let stack = Stack::allocate(16 * 1024).unwrap();
        unsafe { (stack.bottom() as *mut u64).write_volatile(0xBAD_CAFE) };
        assert!(!stack.canary_intact());
    }

    #[test]
    fn test_unsatisfiable_size_is_out_of_memory() {
        assert!(matches!(
            Stack::allocate(usize::MAX / 4),
            Err(ThreadError::OutOfMemory)
        ));
        assert!(matches!(
            Stack::allocate(usize::MAX),
            Err(ThreadError::OutOfMemory)
        ));
    }

    #[test]
    fn test_stack_is_writable_end_to_end() {
        let stack = Stack::allocate(16 * 1024).unwrap();
        unsafe {
            stack.top().sub(8).write_volatile(0xAA);
            stack.bottom().add(8).write_volatile(0x55);
        }
        assert!(stack.canary_intact());
    }
}
