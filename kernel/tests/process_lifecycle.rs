//! End-to-end process lifecycle scenarios (spec.md §8)

use mossbed_kernel::error::KernelError;
use mossbed_kernel::process::pid::Pid;
use mossbed_kernel::process::table::PROCESS_TABLE;
use mossbed_kernel::process::{exit, fork, wait};

fn fresh_vm() {
    mossbed_kernel::mm::init(512, 0);
    PROCESS_TABLE.init();
}

/// Forkbomb-small: a process forks a handful of children, all of which
/// exit, and the parent reaps every one of them by PID.
#[test]
fn forkbomb_small_every_child_is_reapable() {
    fresh_vm();
    let parent = PROCESS_TABLE
        .alloc(Pid::KERNEL, String::from("parent"))
        .expect("alloc parent");

    let mut children = Vec::new();
    for _ in 0..8 {
        children.push(fork::fork(parent).expect("fork should succeed"));
    }

    for (i, &child) in children.iter().enumerate() {
        exit::exit(child, i as i32).expect("exit should succeed");
    }

    for (i, &child) in children.iter().enumerate() {
        let (reaped, code) = wait::waitpid(parent, Some(child)).expect("waitpid should reap");
        assert_eq!(reaped, child);
        assert_eq!(code, i as i32);
    }

    assert!(!PROCESS_TABLE.has_children(parent));
}

/// Zombie-reaped-by-init: an orphaned zombie (parent exits first) becomes
/// reapable by init rather than being lost.
#[test]
fn zombie_orphaned_by_exiting_parent_is_reaped_by_init() {
    fresh_vm();
    PROCESS_TABLE
        .install_at(
            Pid(mossbed_kernel::config::INIT_PID),
            Pid::KERNEL,
            String::from("init"),
        )
        .expect("install init");
    let init = Pid(mossbed_kernel::config::INIT_PID);

    let parent = PROCESS_TABLE.alloc(init, String::from("parent")).expect("alloc parent");
    let child = fork::fork(parent).expect("fork should succeed");

    exit::exit(child, 3).expect("child exit should succeed");
    exit::exit(parent, 0).expect("parent exit should succeed");

    let (reaped, code) = wait::waitpid(init, Some(child)).expect("init should reap the orphan");
    assert_eq!(reaped, child);
    assert_eq!(code, 3);
}

/// waitpid on a PID that never belonged to the caller is rejected outright,
/// not silently treated as "not ready yet".
#[test]
fn waitpid_on_an_unrelated_pid_is_rejected() {
    fresh_vm();
    let a = PROCESS_TABLE.alloc(Pid::KERNEL, String::from("a")).expect("alloc a");
    let b = PROCESS_TABLE.alloc(Pid::KERNEL, String::from("b")).expect("alloc b");
    assert!(matches!(wait::waitpid(a, Some(b)), Err(KernelError::NotChild { .. })));
}
