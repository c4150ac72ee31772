use procvisor::errors::ProcError;
use procvisor::supervisor::{EntryState, ProcessRegistry};

#[test]
fn duplicate_pid_is_rejected_and_first_entry_kept() {
    let reg: ProcessRegistry<&'static str> = ProcessRegistry::new();
    reg.insert(100, 1, "first").unwrap();

    let err = reg.insert(100, 2, "second").unwrap_err();
    assert!(matches!(err, ProcError::DuplicatePid(100)));
    assert_eq!(reg.get(100), Some("first"));
    assert_eq!(reg.len(), 1);
}

#[test]
fn removal_is_guarded_by_serial() {
    let reg: ProcessRegistry<u32> = ProcessRegistry::new();
    reg.insert(7, 10, 0).unwrap();

    // A stale remover from an older process with the same pid.
    assert!(!reg.remove_if(7, 9, true));
    assert_eq!(reg.len(), 1);

    assert!(reg.remove_if(7, 10, true));
    assert!(reg.is_empty());
    assert!(!reg.remove_if(7, 10, true));
}

#[test]
fn exit_path_leaves_claimed_entries_to_kill_all() {
    let reg: ProcessRegistry<u32> = ProcessRegistry::new();
    reg.insert(1, 1, 0).unwrap();
    reg.insert(2, 2, 0).unwrap();

    let claimed = reg.claim_running();
    assert_eq!(claimed.len(), 2);
    assert_eq!(reg.state_of(1), Some(EntryState::Stopping));

    // Already claimed entries are not handed out twice.
    assert!(reg.claim_running().is_empty());

    // The exit task only removes running entries.
    assert!(!reg.remove_if(1, 1, true));
    // Kill-all removes regardless of state.
    assert!(reg.remove_if(1, 1, false));
    assert_eq!(reg.pids(), vec![2]);
}

#[test]
fn begin_shutdown_closes_the_registry() {
    let reg: ProcessRegistry<u32> = ProcessRegistry::new();
    reg.insert(3, 1, 0).unwrap();
    assert!(reg.is_accepting());

    let claimed = reg.begin_shutdown();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].pid, 3);
    assert!(!reg.is_accepting());

    let err = reg.insert(4, 2, 0).unwrap_err();
    assert!(matches!(err, ProcError::ShuttingDown));
    assert_eq!(reg.pids(), vec![3]);
}

#[test]
fn remove_unknown_pid_fails() {
    let reg: ProcessRegistry<u32> = ProcessRegistry::new();
    assert!(matches!(reg.remove(42).unwrap_err(), ProcError::UnknownPid(42)));

    reg.insert(42, 1, 5).unwrap();
    assert_eq!(reg.remove(42).unwrap(), 5);
}
