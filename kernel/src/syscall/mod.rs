//! System-call dispatcher (spec.md §4.7)
//!
//! The trap entry stub that decodes a syscall exception and calls
//! [`dispatch`] is an external collaborator (spec.md §1); what lands here
//! is an already-populated [`TrapFrame`]. Return convention matches
//! OS/161's: the syscall number comes in `v0`, up to four arguments come in
//! `a0`..`a3`, and on return `v0`/`v1` carry the result while `a3` is zero
//! on success and nonzero on error (in which case `v0` holds the errno).
//! The dispatcher always advances `epc` past the `syscall` instruction
//! itself so the caller resumes at the following instruction either way.
//!
//! Before doing anything else, `dispatch` asserts that the trapping thread
//! holds no spinlocks (spec.md §4.7: "the kernel's single most important
//! correctness invariant"). A syscall handler runs with interrupts enabled
//! and may block; entering one while still holding a lock risks deadlock
//! the first time it contends against itself or sleeps while held.

pub mod fs;
pub mod misc;
pub mod process;

use crate::error::KernelError;
use crate::process::Pid;

/// The MIPS-style trap frame handed to the dispatcher by the (external)
/// exception entry stub. Field order and the 37-word size mirror the
/// register set a `syscall` exception saves on this target.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct TrapFrame {
    pub tf_vaddr: u32,
    pub tf_status: u32,
    pub tf_cause: u32,
    pub tf_lo: u32,
    pub tf_hi: u32,
    pub tf_ra: u32,
    pub tf_mullo: u32,
    pub tf_mulhi: u32,
    pub tf_at: u32,
    pub tf_v0: u32,
    pub tf_v1: u32,
    pub tf_a0: u32,
    pub tf_a1: u32,
    pub tf_a2: u32,
    pub tf_a3: u32,
    pub tf_t0: u32,
    pub tf_t1: u32,
    pub tf_t2: u32,
    pub tf_t3: u32,
    pub tf_t4: u32,
    pub tf_t5: u32,
    pub tf_t6: u32,
    pub tf_t7: u32,
    pub tf_s0: u32,
    pub tf_s1: u32,
    pub tf_s2: u32,
    pub tf_s3: u32,
    pub tf_s4: u32,
    pub tf_s5: u32,
    pub tf_s6: u32,
    pub tf_s7: u32,
    pub tf_t8: u32,
    pub tf_t9: u32,
    pub tf_gp: u32,
    pub tf_sp: u32,
    pub tf_s8: u32,
    pub tf_epc: u32,
}

/// The syscall numbers this core recognizes (spec.md §4.7). Numbers are
/// local to this core, not a claim of ABI compatibility with any other
/// kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    Reboot = 0,
    GetTimeOfDay = 1,
    Fork = 2,
    Execv = 3,
    Exit = 4,
    Waitpid = 5,
    Getpid = 6,
    Open = 7,
    Read = 8,
    Write = 9,
    Close = 10,
    Lseek = 11,
    Dup2 = 12,
    Sbrk = 13,
}

impl Syscall {
    fn from_number(n: u32) -> Option<Self> {
        Some(match n {
            0 => Self::Reboot,
            1 => Self::GetTimeOfDay,
            2 => Self::Fork,
            3 => Self::Execv,
            4 => Self::Exit,
            5 => Self::Waitpid,
            6 => Self::Getpid,
            7 => Self::Open,
            8 => Self::Read,
            9 => Self::Write,
            10 => Self::Close,
            11 => Self::Lseek,
            12 => Self::Dup2,
            13 => Self::Sbrk,
            _ => return None,
        })
    }
}

/// Dispatch the syscall named by `tf.tf_v0`, mutating `tf` in place with
/// the result, and advance `tf.tf_epc` past the trapping instruction
/// (spec.md §4.7). `caller` is the PID of the process that trapped.
pub fn dispatch(tf: &mut TrapFrame, caller: Pid) {
    assert_eq!(
        crate::raii::held_lock_count(),
        0,
        "syscall dispatch entered while holding a spinlock"
    );

    let result = match Syscall::from_number(tf.tf_v0) {
        Some(call) => dispatch_one(call, tf, caller),
        None => Err(KernelError::NoSyscall { nr: tf.tf_v0 as usize }),
    };

    match result {
        Ok((v0, v1)) => {
            tf.tf_v0 = v0;
            tf.tf_v1 = v1;
            tf.tf_a3 = 0;
        }
        Err(err) => {
            tf.tf_v0 = err.to_errno() as i32 as u32;
            tf.tf_a3 = 1;
        }
    }
    tf.tf_epc = tf.tf_epc.wrapping_add(4);
}

fn dispatch_one(call: Syscall, tf: &TrapFrame, caller: Pid) -> Result<(u32, u32), KernelError> {
    match call {
        Syscall::Reboot => misc::reboot(),
        Syscall::GetTimeOfDay => misc::get_time_of_day(),
        Syscall::Fork => process::sys_fork(caller),
        Syscall::Execv => process::sys_execv(caller, tf.tf_a0, tf.tf_a1),
        Syscall::Exit => process::sys_exit(caller, tf.tf_a0 as i32),
        Syscall::Waitpid => process::sys_waitpid(caller, tf.tf_a0),
        Syscall::Getpid => process::sys_getpid(caller),
        Syscall::Open => fs::sys_open(caller, tf.tf_a0, tf.tf_a1),
        Syscall::Read => fs::sys_read(caller, tf.tf_a0 as usize, tf.tf_a1, tf.tf_a2),
        Syscall::Write => fs::sys_write(caller, tf.tf_a0 as usize, tf.tf_a1, tf.tf_a2),
        Syscall::Close => fs::sys_close(caller, tf.tf_a0 as usize),
        Syscall::Lseek => fs::sys_lseek(caller, tf.tf_a0 as usize, tf.tf_a1 as i32, tf.tf_a2),
        Syscall::Dup2 => fs::sys_dup2(caller, tf.tf_a0 as usize, tf.tf_a1 as usize),
        Syscall::Sbrk => misc::sbrk(caller, tf.tf_a0 as i32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;
    use crate::process::table::PROCESS_TABLE;

    #[test]
    fn unknown_syscall_number_sets_the_error_flag() {
        let mut tf = TrapFrame { tf_v0: 999, ..Default::default() };
        dispatch(&mut tf, Pid::KERNEL);
        assert_eq!(tf.tf_a3, 1);
        assert_eq!(tf.tf_v0, crate::error::Errno::NoSyscall as u32);
    }

    #[test]
    fn dispatch_always_advances_epc_by_one_instruction() {
        let mut tf = TrapFrame { tf_v0: 0, tf_epc: 0x4000_0000, ..Default::default() };
        dispatch(&mut tf, Pid::KERNEL);
        assert_eq!(tf.tf_epc, 0x4000_0004);
    }

    #[test]
    #[should_panic(expected = "syscall dispatch entered while holding a spinlock")]
    fn dispatch_refuses_to_run_while_a_lock_is_held() {
        let lock: spin::Mutex<u32> = spin::Mutex::new(0);
        let _guard = crate::raii::TrackedMutexGuard::new(lock.lock(), "held-across-dispatch");
        let mut tf = TrapFrame { tf_v0: 0, ..Default::default() };
        dispatch(&mut tf, Pid::KERNEL);
    }

    #[test]
    fn getpid_returns_the_caller_pid() {
        crate::mm::init(64, 0);
        PROCESS_TABLE.init();
        let pid = PROCESS_TABLE.alloc(Pid::KERNEL, String::from("p")).expect("alloc should succeed");
        let mut tf = TrapFrame { tf_v0: Syscall::Getpid as u32, ..Default::default() };
        dispatch(&mut tf, pid);
        assert_eq!(tf.tf_a3, 0);
        assert_eq!(tf.tf_v0, pid.as_u32());
    }
}
