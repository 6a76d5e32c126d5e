//! AArch64 (AAPCS64) context switching.

use super::EntryFn;
use core::arch::naked_asm;

/// Callee-saved state of a suspended thread.
///
/// `x[0..10]` hold x19..x28, followed by the frame pointer, link register and
/// stack pointer; `d` holds the low halves of v8..v15.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Context {
    pub x: [u64; 10],
    pub fp: u64,
    pub lr: u64,
    pub sp: u64,
    pub d: [u64; 8],
}

impl Context {
    /// Build a context that enters `entry(arg)` on the stack ending at `stack_top`.
    ///
    /// # Safety
    /// `stack_top` must be the upper end of a writable region large enough for
    /// `entry` to run, and that region must outlive every switch into the
    /// returned context.
    pub unsafe fn prepare(stack_top: *mut u8, entry: EntryFn, arg: usize) -> Self {
        let mut ctx = Context::default();
        ctx.x[0] = arg as u64;
        ctx.x[1] = entry as usize as u64;
        ctx.lr = thread_trampoline as usize as u64;
        ctx.sp = (stack_top as usize & !0xF) as u64;
        ctx
    }
}

/// First code run by a prepared context: `entry(arg)` with x19/x20 as inputs.
#[unsafe(naked)]
unsafe extern "C" fn thread_trampoline() -> ! {
    naked_asm!(
        "mov x29, xzr",
        "mov x0, x19",
        "blr x20",
        "brk #1",
    )
}

/// Save the caller's callee-saved registers into `from` and resume `to`.
///
/// # Safety
/// `from` must be valid for writes and `to` must hold either a context saved by
/// this function or one built by [`Context::prepare`] whose stack is still live.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_context(from: *mut Context, to: *const Context) {
    naked_asm!(
        "stp x19, x20, [x0, #0]",
        "stp x21, x22, [x0, #16]",
        "stp x23, x24, [x0, #32]",
        "stp x25, x26, [x0, #48]",
        "stp x27, x28, [x0, #64]",
        "stp x29, x30, [x0, #80]",
        "mov x9, sp",
        "str x9, [x0, #96]",
        "stp d8, d9, [x0, #104]",
        "stp d10, d11, [x0, #120]",
        "stp d12, d13, [x0, #136]",
        "stp d14, d15, [x0, #152]",
        "ldp x19, x20, [x1, #0]",
        "ldp x21, x22, [x1, #16]",
        "ldp x23, x24, [x1, #32]",
        "ldp x25, x26, [x1, #48]",
        "ldp x27, x28, [x1, #64]",
        "ldp x29, x30, [x1, #80]",
        "ldr x9, [x1, #96]",
        "mov sp, x9",
        "ldp d8, d9, [x1, #104]",
        "ldp d10, d11, [x1, #120]",
        "ldp d12, d13, [x1, #136]",
        "ldp d14, d15, [x1, #152]",
        "ret",
    )
}
