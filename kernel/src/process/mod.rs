//! Process and thread lifecycle: the process table, PID allocation, and
//! fork/waitpid/exit/exec (spec.md §3, §4.5).

pub mod exec;
pub mod exit;
pub mod fork;
pub mod pid;
pub mod process;
pub mod table;
pub mod wait;

pub use pid::{Pid, ProcessState};
pub use table::PROCESS_TABLE;

/// Spawn the init process at [`crate::config::INIT_PID`] with a fresh,
/// empty address space and console-wired stdio (spec.md §9, "bootstrap
/// order": the process table must exist before any user process is
/// created).
pub fn spawn_init() -> crate::error::KernelResult<Pid> {
    use alloc::string::String;

    let pid = pid::Pid(crate::config::INIT_PID);
    table::PROCESS_TABLE.install_at(pid, pid::Pid::KERNEL, String::from("init"))?;
    table::PROCESS_TABLE.with_mut(pid, |p| crate::fd::console::install_stdio(&mut p.fd_table))??;
    Ok(pid)
}
