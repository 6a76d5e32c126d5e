//! x86_64 (System V) context switching.

use super::EntryFn;
use core::arch::naked_asm;

/// Default MXCSR: all SIMD exceptions masked, round to nearest.
const MXCSR_DEFAULT: u32 = 0x1F80;
/// Default x87 control word: extended precision, exceptions masked.
const FPU_CW_DEFAULT: u32 = 0x037F;

/// Callee-saved state of a suspended thread.
///
/// Field offsets are hard-coded in [`switch_context`].
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Context {
    pub rsp: u64,
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub rbx: u64,
    pub rbp: u64,
    pub mxcsr: u32,
    pub fpu_cw: u32,
}

impl Default for Context {
    fn default() -> Self {
        Context {
            rsp: 0,
            r15: 0,
            r14: 0,
            r13: 0,
            r12: 0,
            rbx: 0,
            rbp: 0,
            mxcsr: MXCSR_DEFAULT,
            fpu_cw: FPU_CW_DEFAULT,
        }
    }
}

impl Context {
    /// Build a context that enters `entry(arg)` on the stack ending at `stack_top`.
    ///
    /// # Safety
    /// `stack_top` must be the 16-byte aligned upper end of a writable region
    /// large enough for `entry` to run, and that region must outlive every
    /// switch into the returned context.
    pub unsafe fn prepare(stack_top: *mut u8, entry: EntryFn, arg: usize) -> Self {
        let top = (stack_top as usize & !0xF) as *mut u64;
        unsafe {
            // [top - 16] return address consumed by the `ret` in switch_context,
            // [top - 8]  zero slot so an unwinder walking past the trampoline stops.
            let frame = top.sub(2);
            frame.write(thread_trampoline as usize as u64);
            frame.add(1).write(0);

            Context {
                rsp: frame as u64,
                r12: arg as u64,
                r13: entry as usize as u64,
                ..Context::default()
            }
        }
    }
}

/// First code run by a prepared context: `entry(arg)` with an aligned stack.
#[unsafe(naked)]
unsafe extern "C" fn thread_trampoline() -> ! {
    naked_asm!(
        "xor ebp, ebp",
        "mov rdi, r12",
        "and rsp, -16",
        "call r13",
        "ud2",
    )
}

/// Save the caller's callee-saved registers into `from` and resume `to`.
///
/// Returns when some other thread switches back into `from`.
///
/// # Safety
/// `from` must be valid for writes and `to` must hold either a context saved by
/// this function or one built by [`Context::prepare`] whose stack is still live.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_context(from: *mut Context, to: *const Context) {
    naked_asm!(
        "mov [rdi + 0x00], rsp",
        "mov [rdi + 0x08], r15",
        "mov [rdi + 0x10], r14",
        "mov [rdi + 0x18], r13",
        "mov [rdi + 0x20], r12",
        "mov [rdi + 0x28], rbx",
        "mov [rdi + 0x30], rbp",
        "stmxcsr dword ptr [rdi + 0x38]",
        "fnstcw word ptr [rdi + 0x3c]",
        "mov rsp, [rsi + 0x00]",
        "mov r15, [rsi + 0x08]",
        "mov r14, [rsi + 0x10]",
        "mov r13, [rsi + 0x18]",
        "mov r12, [rsi + 0x20]",
        "mov rbx, [rsi + 0x28]",
        "mov rbp, [rsi + 0x30]",
        "ldmxcsr dword ptr [rsi + 0x38]",
        "fldcw word ptr [rsi + 0x3c]",
        "ret",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::{offset_of, size_of};

    #[test]
    fn test_layout_matches_switch_offsets() {
        assert_eq!(offset_of!(Context, rsp), 0x00);
        assert_eq!(offset_of!(Context, r15), 0x08);
        assert_eq!(offset_of!(Context, r12), 0x20);
        assert_eq!(offset_of!(Context, rbp), 0x30);
        assert_eq!(offset_of!(Context, mxcsr), 0x38);
        assert_eq!(offset_of!(Context, fpu_cw), 0x3c);
        assert_eq!(size_of::<Context>(), 0x40);
    }

    #[test]
    fn test_prepared_frame() {
        extern "C" fn never(_: usize) -> ! {
            loop {
                core::hint::spin_loop();
            }
        }

        #[repr(align(16))]
        struct Region([u64; 64]);

        let mut region = Region([0; 64]);
        let top = unsafe { region.0.as_mut_ptr().add(64) } as *mut u8;
        let ctx = unsafe { Context::prepare(top, never, 0x1234) };

        assert_eq!(ctx.rsp, top as u64 - 16);
        assert_eq!(region.0[62], thread_trampoline as usize as u64);
        assert_eq!(region.0[63], 0);
        assert_eq!(ctx.r12, 0x1234);
        assert_eq!(ctx.r13, never as usize as u64);
        assert_eq!(ctx.mxcsr, MXCSR_DEFAULT);
    }
}
