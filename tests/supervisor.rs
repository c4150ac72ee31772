mod common;
use crate::common::{eventually, init_tracing, quiet_supervisor, with_timeout, OutcomeRecorder};

use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::Signal;
use procvisor::errors::ProcError;
use procvisor::exec::{AsyncProcess, CaptureOptions, CommandSpec};
use procvisor::supervisor::{
    ChildSignal, ExitOutcome, ProcessOptions, ProcessSupervisor, SupervisorSettings,
};

type TestResult = Result<(), Box<dyn Error>>;

fn capture() -> ProcessOptions {
    ProcessOptions::new().capture(CaptureOptions::default())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_processes_report_their_own_exit_codes() -> TestResult {
    init_tracing();
    let sup = quiet_supervisor();

    let mut procs = Vec::new();
    for code in 0..6 {
        let proc = sup.shell(&format!("sleep 0.1; exit {code}"), None)?;
        procs.push((code, proc));
    }
    assert_eq!(sup.len(), 6);

    for (code, proc) in &procs {
        let outcome = with_timeout(proc.wait_outcome()).await?;
        assert_eq!(outcome.code(), Some(*code));
        assert_eq!(outcome.is_success(), *code == 0);
    }

    // Deregistration happens before the outcome is published.
    assert_eq!(sup.len(), 0);
    assert!(sup.pids().is_empty());

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn shell_wait_surfaces_failures() -> TestResult {
    let sup = quiet_supervisor();

    with_timeout(sup.shell_wait("true", None)).await?;

    let err = with_timeout(sup.shell_wait("exit 7", None)).await.unwrap_err();
    assert_eq!(err.exit_code(), Some(7));

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn run_async_with_capture_exposes_buffers_after_exit() -> TestResult {
    let sup = quiet_supervisor();

    let proc = sup.run_async("sh", ["-c", "echo out; echo err >&2; sleep 0.2"], Some(capture()))?;
    assert!(matches!(
        proc.stdout_buffer().unwrap_err(),
        ProcError::OutputPending
    ));

    with_timeout(proc.wait()).await?;
    assert_eq!(proc.stdout_buffer()?, b"out\n");
    assert_eq!(proc.stderr_buffer()?, b"err\n");
    assert!(proc.has_exited());
    assert_eq!(proc.exit_code(), Some(0));

    let plain = sup.run_async("true", Vec::<String>::new(), None)?;
    with_timeout(plain.wait()).await?;
    assert!(matches!(
        plain.stdout_buffer().unwrap_err(),
        ProcError::CaptureNotEnabled
    ));

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn options_apply_env_and_cwd() -> TestResult {
    let sup = quiet_supervisor();
    let dir = tempfile::tempdir()?;

    let opts = capture()
        .cwd(dir.path())
        .env("GREETING", "hello world");
    let proc = sup.shell("printf '%s in %s' \"$GREETING\" \"$(pwd -P)\"", Some(opts))?;
    with_timeout(proc.wait()).await?;

    let out = String::from_utf8(proc.stdout_buffer()?)?;
    assert_eq!(
        out,
        format!("hello world in {}", dir.path().canonicalize()?.display())
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn exec_script_runs_the_file_with_arguments() -> TestResult {
    let sup = quiet_supervisor();
    let dir = tempfile::tempdir()?;
    let script = dir.path().join("greet.sh");
    std::fs::write(&script, "printf '%s-%s' \"$1\" \"$2\"\nexit 0\n")?;

    let path = script.to_string_lossy().to_string();
    let proc = sup.exec_script(&path, ["a", "b"], Some(capture()))?;
    with_timeout(proc.wait()).await?;
    assert_eq!(proc.stdout_buffer()?, b"a-b");

    with_timeout(sup.exec_script_wait(&path, Vec::<String>::new(), None)).await?;

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn run_process_supervises_a_preconfigured_process() -> TestResult {
    let sup = quiet_supervisor();

    let mut process = AsyncProcess::new(CommandSpec::new("sh", ["-c", "printf ready"]));
    process.capture_stdio(CaptureOptions::default())?;

    let proc = sup.run_process(process)?;
    with_timeout(proc.wait()).await?;
    assert_eq!(proc.stdout_buffer()?, b"ready");

    let failing = AsyncProcess::new(CommandSpec::new("sh", ["-c", "exit 2"]));
    let err = with_timeout(sup.run_process_wait(failing)).await.unwrap_err();
    assert_eq!(err.exit_code(), Some(2));

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn signalling_a_running_process_ends_it() -> TestResult {
    init_tracing();
    let sup = quiet_supervisor();

    let proc = sup.run_async("sleep", ["30"], None)?;
    assert!(sup.get(proc.pid()).is_some());
    assert!(!proc.has_exited());

    proc.signal(Signal::SIGTERM).await?;
    let outcome = with_timeout(proc.wait_outcome()).await?;
    assert_eq!(
        outcome,
        ExitOutcome::Failed {
            code: None,
            signal: Some(Signal::SIGTERM as i32)
        }
    );
    assert!(sup.get(proc.pid()).is_none());

    // The process is gone: signalling must fail, not hit a recycled pid.
    let err = proc.signal(Signal::SIGTERM).await.unwrap_err();
    assert!(matches!(err, ProcError::Signal { .. }));

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn reaped_process_is_untracked_while_output_drains() -> TestResult {
    init_tracing();
    let sup = quiet_supervisor();

    // The shell exits at once; the background sleep keeps stderr open.
    let proc = sup.shell("sleep 2 &", None)?;
    let pid = proc.pid();

    let started = Instant::now();
    with_timeout(proc.wait_reaped()).await;
    assert!(started.elapsed() < Duration::from_millis(1500));

    assert!(proc.is_reaped());
    assert!(!proc.has_exited());
    assert!(!sup.pids().contains(&pid));
    assert!(sup.get(pid).is_none());

    let err = proc.signal(Signal::SIGTERM).await.unwrap_err();
    assert!(matches!(
        err,
        ProcError::Signal {
            source: Errno::ESRCH,
            ..
        }
    ));

    with_timeout(proc.wait()).await?;
    assert!(proc.has_exited());

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn many_waiters_see_the_same_outcome() -> TestResult {
    let sup = quiet_supervisor();
    let proc = sup.shell("sleep 0.2; exit 5", None)?;

    let mut waiters = Vec::new();
    for _ in 0..4 {
        let proc = proc.clone();
        waiters.push(tokio::spawn(async move { proc.wait_outcome().await }));
    }
    for waiter in waiters {
        let outcome = with_timeout(waiter).await??;
        assert_eq!(outcome.code(), Some(5));
    }
    assert_eq!(proc.outcome().and_then(|o| o.code()), Some(5));

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn exit_and_error_hooks_fire() -> TestResult {
    let sup = quiet_supervisor();
    let recorder = OutcomeRecorder::new();

    let opts = ProcessOptions::new()
        .on_exit(recorder.exit_hook())
        .on_error(recorder.error_hook());

    with_timeout(sup.shell_wait("true", Some(opts.clone()))).await?;
    let _ = with_timeout(sup.shell_wait("exit 9", Some(opts))).await;

    // Hooks run after the outcome is published.
    assert!(eventually(Duration::from_secs(2), || recorder.outcomes().len() == 2).await);
    let outcomes = recorder.outcomes();
    assert!(outcomes.contains(&ExitOutcome::Success));
    assert!(outcomes.iter().any(|o| o.code() == Some(9)));

    let errors = recorder.errors();
    assert_eq!(errors.len(), 1);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn signal_all_stops_everything_and_keeps_accepting() -> TestResult {
    init_tracing();
    let sup = quiet_supervisor();

    let a = sup.run_async("sleep", ["30"], None)?;
    let b = sup.run_async("sleep", ["30"], None)?;
    assert_eq!(sup.len(), 2);

    let stopped = with_timeout(sup.signal_all(Signal::SIGTERM)).await;
    assert_eq!(stopped, 2);
    assert!(sup.is_empty());
    assert!(a.has_exited());
    assert!(b.has_exited());

    // Not a shutdown: new processes are still accepted.
    with_timeout(sup.shell_wait("true", None)).await?;

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_interrupts_children_and_runs_the_exit_callback() -> TestResult {
    init_tracing();
    let called = Arc::new(AtomicUsize::new(0));
    let called_in_hook = Arc::clone(&called);

    let sup = ProcessSupervisor::builder()
        .capture_signals(false)
        .on_exit(move || {
            called_in_hook.fetch_add(1, Ordering::SeqCst);
        })
        .build()?;

    let a = sup.run_async("sleep", ["30"], None)?;
    let b = sup.run_async("sleep", ["30"], None)?;

    with_timeout(sup.shutdown(Signal::SIGTERM)).await;

    // Default child signal is SIGINT whatever the host received.
    for proc in [&a, &b] {
        let outcome = with_timeout(proc.wait_outcome()).await?;
        assert_eq!(outcome.signal(), Some(Signal::SIGINT as i32));
    }
    assert!(sup.is_empty());
    assert!(sup.is_shutting_down());
    assert_eq!(called.load(Ordering::SeqCst), 1);

    // A second shutdown waits for the first and does nothing else.
    with_timeout(sup.shutdown(Signal::SIGINT)).await;
    assert_eq!(called.load(Ordering::SeqCst), 1);

    // After shutdown no new process is tracked.
    let err = sup.run_async("true", Vec::<String>::new(), None).unwrap_err();
    assert!(matches!(err, ProcError::ShuttingDown));
    assert!(sup.is_empty());

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn forward_child_signal_passes_on_what_the_host_received() -> TestResult {
    let sup = ProcessSupervisor::new(SupervisorSettings {
        capture_signals: false,
        child_signal: ChildSignal::Forward,
        ..SupervisorSettings::default()
    })?;

    let proc = sup.run_async("sleep", ["30"], None)?;
    with_timeout(sup.shutdown(Signal::SIGTERM)).await;

    let outcome = with_timeout(proc.wait_outcome()).await?;
    assert_eq!(outcome.signal(), Some(Signal::SIGTERM as i32));

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_with_nothing_running_completes() -> TestResult {
    let sup = quiet_supervisor();
    with_timeout(sup.shutdown(Signal::SIGINT)).await;
    with_timeout(sup.wait_for_shutdown()).await;
    assert!(sup.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn spawn_failure_is_not_tracked() -> TestResult {
    let sup = quiet_supervisor();
    let err = sup
        .run_async("/definitely/not/a/real/program", Vec::<String>::new(), None)
        .unwrap_err();
    assert!(matches!(err, ProcError::Spawn { .. }));
    assert!(sup.is_empty());
    Ok(())
}

#[test]
fn child_signal_resolution() {
    assert_eq!(ChildSignal::default(), ChildSignal::Interrupt);
    assert_eq!(ChildSignal::Interrupt.resolve(Signal::SIGTERM), Signal::SIGINT);
    assert_eq!(ChildSignal::Terminate.resolve(Signal::SIGINT), Signal::SIGTERM);
    assert_eq!(ChildSignal::Kill.resolve(Signal::SIGINT), Signal::SIGKILL);
    assert_eq!(ChildSignal::Forward.resolve(Signal::SIGTERM), Signal::SIGTERM);

    assert_eq!("SIGTERM".parse::<ChildSignal>(), Ok(ChildSignal::Terminate));
    assert_eq!("int".parse::<ChildSignal>(), Ok(ChildSignal::Interrupt));
    assert_eq!("forward".parse::<ChildSignal>(), Ok(ChildSignal::Forward));
    assert!("hup".parse::<ChildSignal>().is_err());
}
