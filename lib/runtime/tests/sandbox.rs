//! Full-stack scenarios: shell in, captured output out, with the
//! native tool set registered and the standard image provisioned.

use anyhow::Context;
use pretty_assertions::assert_eq;
use wasmbox_runtime::{ErrorClass, Sandbox, SandboxConfig};
use wasmbox_shell::DenyAllGateway;

/// Surface runtime `info!`/`debug!` output under `--nocapture`.
fn init_tracing() {
    use tracing::metadata::LevelFilter;
    tracing_subscriber::fmt::SubscriberBuilder::default()
        .with_max_level(LevelFilter::DEBUG)
        .with_test_writer()
        .try_init()
        .ok();
}

fn sandbox() -> Sandbox {
    init_tracing();
    Sandbox::new()
}

/// Seeds a file into the sandbox image before the scenario runs.
fn seed_file(sandbox: &Sandbox, path: &str, data: &[u8]) -> anyhow::Result<()> {
    sandbox
        .vfs()
        .lock()
        .unwrap()
        .write_file(path, data.to_vec())
        .with_context(|| format!("seeding {path}"))?;
    Ok(())
}

#[test]
fn echo_hello_world() {
    let mut sandbox = sandbox();
    let result = sandbox.run("echo hello world");
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "hello world\n");
    assert_eq!(result.stderr, "");
    assert_eq!(result.error_class, None);
}

#[test]
fn sort_pipe_uniq_over_a_data_file() -> anyhow::Result<()> {
    let mut sandbox = sandbox();
    seed_file(&sandbox, "/home/user/data.txt", b"b\na\nb\nc\na\n")?;
    let result = sandbox.run("sort data.txt | uniq");
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "a\nb\nc\n");
    Ok(())
}

#[test]
fn loop_with_break() {
    let mut sandbox = sandbox();
    let result =
        sandbox.run(r#"for i in 1 2 3 4 5; do if [ "$i" = "3" ]; then break; fi; echo $i; done"#);
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "1\n2\n");
}

#[test]
fn shebang_script_dispatches_to_registered_interpreter() {
    use futures::future::LocalBoxFuture;
    use std::sync::Arc;
    use wasmbox_wasi::{ProcessCtx, Tool};

    // Stand-in for a registry-provided python3 module: proves the
    // dispatch path (shebang -> interpreter -> spawn with script path).
    struct FakePython;
    impl Tool for FakePython {
        fn spawn(&self, mut ctx: ProcessCtx) -> LocalBoxFuture<'static, i32> {
            Box::pin(async move {
                let script = ctx.args.get(1).cloned().unwrap_or_default();
                let source = {
                    let mut vfs = ctx.vfs.lock().unwrap();
                    vfs.read_file(&script).map(|b| b.to_vec()).unwrap_or_default()
                };
                if String::from_utf8_lossy(&source).contains("print(\"ok\")") {
                    let _ = ctx.write_all(1, b"ok\n").await;
                    0
                } else {
                    1
                }
            })
        }
    }

    let mut sandbox = sandbox();
    sandbox.install_tool("python3", Arc::new(FakePython));
    sandbox.set_env("PWD", "/home/user");
    let result = sandbox.run(
        "echo '#!/usr/bin/env python3\nprint(\"ok\")' > solve.py; chmod +x solve.py; ./solve.py",
    );
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "ok\n");
}

#[test]
fn quota_violation_is_enospc_and_totals_hold() {
    let mut sandbox = Sandbox::with_config(
        SandboxConfig {
            fs_limit_bytes: Some(500),
            ..SandboxConfig::default()
        },
        std::sync::Arc::new(DenyAllGateway),
    );
    let before = sandbox.vfs().lock().unwrap().total_bytes();
    let result = sandbox.run(
        "printf '%01000d' 0 > /home/user/big.txt; echo status=$?",
    );
    // The write fails with the quota error, not EROFS.
    assert!(result.stderr.contains("no space left on device"), "stderr: {}", result.stderr);
    assert_eq!(sandbox.vfs().lock().unwrap().total_bytes(), before);
}

#[test]
fn status_of_false_is_reported_by_dollar_question() {
    let mut sandbox = sandbox();
    let result = sandbox.run("false; echo $?");
    assert_eq!(result.exit_code, 0);
    assert!(result.stdout.contains('1'));
}

#[test]
fn gzip_gunzip_round_trip() -> anyhow::Result<()> {
    let mut sandbox = sandbox();
    seed_file(&sandbox, "/home/user/p", b"payload payload payload\n")?;
    let result = sandbox.run("gzip p && gunzip p.gz && cat p");
    assert_eq!(result.exit_code, 0, "stderr: {}", result.stderr);
    assert_eq!(result.stdout, "payload payload payload\n");
    Ok(())
}

#[test]
fn tar_round_trip_restores_a_directory() {
    let mut sandbox = sandbox();
    let seed = "mkdir -p d/sub && echo alpha > d/one.txt && echo beta > d/sub/two.txt";
    assert_eq!(sandbox.run(seed).exit_code, 0);
    let pack = sandbox.run("tar -cf a.tar d && rm -r d && tar -xf a.tar");
    assert_eq!(pack.exit_code, 0, "stderr: {}", pack.stderr);
    let check = sandbox.run("cat d/one.txt d/sub/two.txt");
    assert_eq!(check.stdout, "alpha\nbeta\n");
}

#[test]
fn bin_is_populated_with_tool_stubs() {
    let mut sandbox = sandbox();
    let listing = sandbox.run("ls /bin");
    assert!(listing.stdout.contains("sort"), "stdout: {}", listing.stdout);
    assert!(listing.stdout.contains("gzip"));
    let which = sandbox.run("which sort");
    assert_eq!(which.stdout, "/bin/sort\n");
    assert_eq!(which.exit_code, 0);
}

#[test]
fn environment_defaults() {
    let mut sandbox = sandbox();
    let result = sandbox.run("echo $HOME $USER $SHELL; pwd");
    assert_eq!(result.stdout, "/home/user user /bin/sh\n/home/user\n");
    let path = sandbox.run("echo $PATH");
    assert_eq!(path.stdout, "/bin:/usr/bin\n");
}

#[test]
fn state_persists_across_runs() {
    let mut sandbox = sandbox();
    sandbox.run("export GREETING=hi");
    assert_eq!(sandbox.run("echo $GREETING").stdout, "hi\n");
    sandbox.run("cd /tmp");
    assert_eq!(sandbox.run("pwd").stdout, "/tmp\n");
    assert_eq!(sandbox.get_env("PWD").as_deref(), Some("/tmp"));
}

#[test]
fn set_env_reaches_child_processes() {
    let mut sandbox = sandbox();
    sandbox.set_env("CUSTOM_FLAG", "on");
    let result = sandbox.run("env | grep CUSTOM_FLAG");
    assert_eq!(result.stdout, "CUSTOM_FLAG=on\n");
}

#[test]
fn output_truncation_is_flagged_not_fatal() {
    let mut sandbox = Sandbox::with_config(
        SandboxConfig {
            output_limit_bytes: 16,
            ..SandboxConfig::default()
        },
        std::sync::Arc::new(DenyAllGateway),
    );
    let result = sandbox.run("echo 'this line is well beyond sixteen bytes'");
    assert_eq!(result.exit_code, 0);
    assert!(result.truncated);
    assert_eq!(result.stdout.len(), 16);
}

#[test]
fn run_timeout_reports_class_and_124() {
    let mut sandbox = Sandbox::with_config(
        SandboxConfig {
            run_timeout_ms: Some(0),
            ..SandboxConfig::default()
        },
        std::sync::Arc::new(DenyAllGateway),
    );
    let result = sandbox.run("while true; do :; done");
    assert_eq!(result.exit_code, 124);
    assert_eq!(result.error_class, Some(ErrorClass::Timeout));
}

#[test]
fn cancel_state_is_fresh_for_each_run() {
    let mut sandbox = sandbox();
    // A cancel left over from a previous command must not poison the
    // next run: run() resets the control plane first.
    sandbox.control().cancel();
    let result = sandbox.run("echo survives");
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "survives\n");
    assert_eq!(result.error_class, None);
}

#[test]
fn snapshots_round_trip_through_the_sandbox() {
    let mut sandbox = sandbox();
    sandbox.run("echo original > /home/user/state.txt");
    let snapshot = sandbox.snapshot();
    sandbox.run("echo clobbered > /home/user/state.txt; rm -f /home/user/state.txt");
    sandbox.restore(snapshot).unwrap();
    let result = sandbox.run("cat /home/user/state.txt");
    assert_eq!(result.stdout, "original\n");
}

#[test]
fn read_only_paths_reject_writes_and_leave_tree_unchanged() {
    let mut sandbox = sandbox();
    let before = (
        sandbox.vfs().lock().unwrap().file_count(),
        sandbox.vfs().lock().unwrap().total_bytes(),
    );
    let result = sandbox.run("echo intruder > /usr/bin/own");
    assert_eq!(result.exit_code, 1);
    assert!(result.stderr.contains("read-only"));
    let after = (
        sandbox.vfs().lock().unwrap().file_count(),
        sandbox.vfs().lock().unwrap().total_bytes(),
    );
    assert_eq!(before, after);
}

#[test]
fn coreutils_compose_in_pipelines() {
    let mut sandbox = sandbox();
    sandbox.run("printf 'one\\ntwo\\nthree\\nfour\\n' > list.txt");
    assert_eq!(sandbox.run("cat list.txt | wc -l").stdout.trim(), "4");
    assert_eq!(sandbox.run("head -n 2 list.txt | tail -n 1").stdout, "two\n");
    assert_eq!(sandbox.run("grep -c o list.txt").stdout, "3\n");
    assert_eq!(sandbox.run("sort -r list.txt | head -n 1").stdout, "two\n");
}

#[test]
fn file_tools_operate_on_the_vfs() {
    let mut sandbox = sandbox();
    let script = "mkdir workdir && touch workdir/a workdir/b && ls workdir && \
                  cp workdir/a copied && mv copied moved && rm moved && \
                  basename /deep/path/file.txt && dirname /deep/path/file.txt";
    let result = sandbox.run(script);
    assert_eq!(result.exit_code, 0, "stderr: {}", result.stderr);
    assert_eq!(result.stdout, "a\nb\nfile.txt\n/deep/path\n");
}

#[test]
fn proc_and_dev_are_visible() {
    let mut sandbox = sandbox();
    let meminfo = sandbox.run("cat /proc/meminfo");
    assert!(meminfo.stdout.contains("MemTotal"));
    let devs = sandbox.run("ls /dev");
    assert!(devs.stdout.contains("null"));
}

#[test]
fn history_builtin_reports_past_commands() {
    let mut sandbox = sandbox();
    sandbox.run("echo first");
    sandbox.run("echo second");
    let result = sandbox.run("history");
    assert!(result.stdout.contains("echo first"));
    assert!(result.stdout.contains("echo second"));
}

#[test]
fn exit_traps_fire_on_session_close() {
    let mut sandbox = sandbox();
    sandbox.run("trap 'echo goodbye' EXIT");
    let result = sandbox.run_exit_traps();
    assert_eq!(result.stdout, "goodbye\n");
}

#[test]
fn run_is_deterministic_given_fixed_state() {
    let mut a = sandbox();
    let mut b = sandbox();
    let script = "for i in 1 2 3; do echo row-$i; done | sort -r";
    assert_eq!(a.run(script).stdout, b.run(script).stdout);
}

#[test]
fn install_and_remove_through_the_registry_contract() {
    use wasmbox_wasi::ToolRegistry;
    let sandbox = sandbox();
    let registry = sandbox.registry();
    registry
        .install("newtool", vec![0x00, 0x61, 0x73, 0x6d], "https://pkgs.example/newtool.wasm")
        .unwrap();
    assert!(registry.list().contains(&"newtool".to_string()));
    registry.remove("newtool").unwrap();
    assert!(!registry.list().contains(&"newtool".to_string()));
}
