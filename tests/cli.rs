mod common;
use crate::common::{init_tracing, with_timeout};

use std::error::Error;

use clap::Parser;
use procvisor::cli::CliArgs;
use procvisor::supervisor::ChildSignal;

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn parses_commands_and_trailing_program() -> TestResult {
    let args = CliArgs::try_parse_from([
        "procvisor",
        "--cmd",
        "echo one",
        "--cmd",
        "echo two",
        "--child-signal",
        "term",
        "--quiet",
        "--",
        "ls",
        "-l",
    ])?;

    assert_eq!(args.cmds, vec!["echo one", "echo two"]);
    assert_eq!(args.child_signal, Some(ChildSignal::Terminate));
    assert!(args.quiet);
    assert_eq!(args.command, vec!["ls", "-l"]);
    assert!(args.config.is_none());
    Ok(())
}

#[test]
fn rejects_unknown_child_signal() {
    assert!(CliArgs::try_parse_from(["procvisor", "--child-signal", "hup"]).is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn dry_run_starts_nothing() -> TestResult {
    init_tracing();
    let args = CliArgs::try_parse_from(["procvisor", "--dry-run", "--cmd", "exit 9"])?;
    assert_eq!(with_timeout(procvisor::run(args)).await?, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn run_returns_first_failing_exit_code() -> TestResult {
    init_tracing();
    let args = CliArgs::try_parse_from([
        "procvisor",
        "--quiet",
        "--cmd",
        "exit 0",
        "--cmd",
        "exit 4",
        "--",
        "sh",
        "-c",
        "exit 6",
    ])?;
    assert_eq!(with_timeout(procvisor::run(args)).await?, 4);

    let ok = CliArgs::try_parse_from(["procvisor", "--quiet", "--", "true"])?;
    assert_eq!(with_timeout(procvisor::run(ok)).await?, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn run_without_commands_is_an_error() {
    let args = CliArgs::try_parse_from(["procvisor"]).unwrap();
    assert!(procvisor::run(args).await.is_err());
}
