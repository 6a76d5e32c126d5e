//! Architecture layer: saved execution contexts and the switch primitive.
//!
//! Each supported architecture provides
//!
//! * `Context`: the callee-saved register set of a suspended thread,
//! * `Context::prepare`: a context that, when switched to, calls
//!   `entry(arg)` on a fresh stack through a small trampoline,
//! * `switch_context`: save the caller into one context and resume another.
//!
//! Only callee-saved state is recorded because a switch always happens at a
//! call boundary: either a cooperative yield or the quantum handler, which the
//! kernel already entered through a full register save.

/// Entry point run by a freshly prepared context. It must never return.
pub type EntryFn = extern "C" fn(usize) -> !;

#[cfg(target_arch = "x86_64")]
mod x86_64;
#[cfg(target_arch = "x86_64")]
pub use self::x86_64::{switch_context, Context};

#[cfg(target_arch = "aarch64")]
mod aarch64;
#[cfg(target_arch = "aarch64")]
pub use self::aarch64::{switch_context, Context};

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!("ult-runtime supports x86_64 and aarch64 only");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::Stack;
    use core::cell::Cell;

    struct Ping {
        main: Context,
        worker: Context,
        hits: Cell<usize>,
    }

    extern "C" fn bounce(arg: usize) -> ! {
        let ping = unsafe { &mut *(arg as *mut Ping) };
        loop {
            ping.hits.set(ping.hits.get() + 1);
            unsafe { switch_context(&mut ping.worker, &ping.main) };
        }
    }

    #[test]
    fn test_switch_round_trips() {
        let stack = Stack::allocate(64 * 1024).unwrap();
        let mut ping = Ping {
            main: Context::default(),
            worker: Context::default(),
            hits: Cell::new(0),
        };
        let arg = &mut ping as *mut Ping as usize;
        ping.worker = unsafe { Context::prepare(stack.top(), bounce, arg) };

        for round in 1..=3 {
            unsafe { switch_context(&mut ping.main, &ping.worker) };
            assert_eq!(ping.hits.get(), round);
        }
        assert!(stack.canary_intact());
    }

    #[test]
    fn test_callee_saved_state_survives_switch() {
        let stack = Stack::allocate(64 * 1024).unwrap();
        let mut ping = Ping {
            main: Context::default(),
            worker: Context::default(),
            hits: Cell::new(0),
        };
        let arg = &mut ping as *mut Ping as usize;
        ping.worker = unsafe { Context::prepare(stack.top(), bounce, arg) };

        let mut acc = 0u64;
        for i in 0..16u64 {
            acc = acc.wrapping_mul(31).wrapping_add(i);
            unsafe { switch_context(&mut ping.main, &ping.worker) };
        }
        let mut expected = 0u64;
        for i in 0..16u64 {
            expected = expected.wrapping_mul(31).wrapping_add(i);
        }
        assert_eq!(acc, expected);
        assert_eq!(ping.hits.get(), 16);
    }
}
