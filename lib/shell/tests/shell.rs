//! End-to-end shell tests: command strings in, captured output out.
//! External commands resolve to small native test tools so pipelines
//! and shebang dispatch run for real.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use futures::executor::LocalPool;
use futures::future::LocalBoxFuture;
use wasmbox_shell::{DenyAllGateway, Executor, Io, RunStatus, Stream};
use wasmbox_vfs::Vfs;
use wasmbox_wasi::{
    ExecControl, FdTarget, OutputBuffer, ProcessCtx, ProcessKernel, Tool, ToolRegistry,
};

struct UpperTool;

impl Tool for UpperTool {
    fn spawn(&self, mut ctx: ProcessCtx) -> LocalBoxFuture<'static, i32> {
        Box::pin(async move {
            let mut buf = [0u8; 256];
            loop {
                match ctx.read(0, &mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let upper: Vec<u8> =
                            buf[..n].iter().map(|b| b.to_ascii_uppercase()).collect();
                        if ctx.write_all(1, &upper).await.is_err() {
                            break;
                        }
                    }
                }
            }
            0
        })
    }
}

/// Stand-in interpreter used to exercise shebang dispatch mechanics.
struct FakePython;

impl Tool for FakePython {
    fn spawn(&self, mut ctx: ProcessCtx) -> LocalBoxFuture<'static, i32> {
        Box::pin(async move {
            let _ = ctx.write_all(1, b"ok\n").await;
            0
        })
    }
}

struct ExitTool;

impl Tool for ExitTool {
    fn spawn(&self, ctx: ProcessCtx) -> LocalBoxFuture<'static, i32> {
        Box::pin(async move {
            ctx.args
                .get(1)
                .and_then(|code| code.parse().ok())
                .unwrap_or(0)
        })
    }
}

struct TestRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl TestRegistry {
    fn new() -> Self {
        let mut tools: HashMap<String, Arc<dyn Tool>> = HashMap::new();
        tools.insert("upper".to_string(), Arc::new(UpperTool));
        tools.insert("python3".to_string(), Arc::new(FakePython));
        tools.insert("exitn".to_string(), Arc::new(ExitTool));
        Self { tools }
    }
}

impl ToolRegistry for TestRegistry {
    fn lookup(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }
    fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }
    fn install(&self, _: &str, _: Vec<u8>, _: &str) -> Result<(), String> {
        Err("read-only registry".to_string())
    }
    fn remove(&self, _: &str) -> Result<(), String> {
        Err("read-only registry".to_string())
    }
}

struct Harness {
    pool: LocalPool,
    exec: Executor,
}

struct Output {
    code: i32,
    stdout: String,
    stderr: String,
    status: RunStatus,
}

/// Surface executor `debug!`/`trace!` output under `--nocapture`.
fn init_tracing() {
    use tracing::metadata::LevelFilter;
    tracing_subscriber::fmt::SubscriberBuilder::default()
        .with_max_level(LevelFilter::DEBUG)
        .with_test_writer()
        .try_init()
        .ok();
}

impl Harness {
    fn new() -> Self {
        init_tracing();
        let pool = LocalPool::new();
        let kernel = ProcessKernel::new(pool.spawner());
        let vfs = Arc::new(Mutex::new(Vfs::with_standard_layout()));
        let control = ExecControl::new();
        let mut exec = Executor::new(
            vfs,
            kernel,
            control,
            Arc::new(TestRegistry::new()),
            Arc::new(DenyAllGateway),
        );
        for (name, value) in [
            ("HOME", "/home/user"),
            ("PWD", "/home/user"),
            ("USER", "user"),
            ("PATH", "/bin:/usr/bin"),
            ("SHELL", "/bin/sh"),
        ] {
            exec.state.set_var(name, value);
            exec.state.export(name);
        }
        Self { pool, exec }
    }

    fn run(&mut self, command: &str) -> Output {
        let stdout = OutputBuffer::new(None);
        let stderr = OutputBuffer::new(None);
        let io = Io {
            stdin: Stream::null(),
            stdout: Stream::Target(FdTarget::Buffer(stdout.clone())),
            stderr: Stream::Target(FdTarget::Buffer(stderr.clone())),
        };
        let status = self.pool.run_until(self.exec.run_source(command, &io));
        Output {
            code: status.code(),
            stdout: stdout.into_string_lossy(),
            stderr: stderr.into_string_lossy(),
            status,
        }
    }

    fn file(&self, path: &str) -> anyhow::Result<String> {
        let content = self
            .exec
            .vfs
            .lock()
            .unwrap()
            .read_file(path)
            .with_context(|| format!("reading {path} back out of the sandbox"))?;
        Ok(String::from_utf8_lossy(&content).into_owned())
    }
}

fn run_one(command: &str) -> Output {
    Harness::new().run(command)
}

#[test]
fn echo_hello_world() {
    let out = run_one("echo hello world");
    assert_eq!(out.code, 0);
    assert_eq!(out.stdout, "hello world\n");
    assert_eq!(out.stderr, "");
}

#[test]
fn for_loop_with_break() {
    let out = run_one(r#"for i in 1 2 3 4 5; do if [ "$i" = "3" ]; then break; fi; echo $i; done"#);
    assert_eq!(out.code, 0);
    assert_eq!(out.stdout, "1\n2\n");
}

#[test]
fn false_then_status() {
    let out = run_one("false; echo $?");
    assert_eq!(out.code, 0);
    assert_eq!(out.stdout, "1\n");
}

#[test]
fn variable_expansion_forms() {
    let mut h = Harness::new();
    assert_eq!(h.run("x=abcdef; echo ${x}").stdout, "abcdef\n");
    assert_eq!(h.run("echo ${unset:-fallback}").stdout, "fallback\n");
    assert_eq!(h.run("echo ${assigned:=given}; echo $assigned").stdout, "given\ngiven\n");
    assert_eq!(h.run("x=set; echo ${x:+alt}").stdout, "alt\n");
    assert_eq!(h.run("x=abcdef; echo ${#x}").stdout, "6\n");
    assert_eq!(h.run("p=a/b/c; echo ${p#*/} ${p##*/}").stdout, "b/c c\n");
    assert_eq!(h.run("p=a.tar.gz; echo ${p%.*} ${p%%.*}").stdout, "a.tar a\n");
    assert_eq!(h.run("s=aXbXc; echo ${s/X/-} ${s//X/-}").stdout, "a-bXc a-b-c\n");
}

#[test]
fn unset_error_op_aborts() {
    let out = run_one("echo ${missing:?not set}; echo unreached");
    assert_eq!(out.code, 1);
    assert!(out.stderr.contains("not set"));
    assert!(!out.stdout.contains("unreached"));
}

#[test]
fn command_substitution_strips_trailing_newlines() {
    let out = run_one("echo [$(echo inner)]");
    assert_eq!(out.stdout, "[inner]\n");
    let nested = run_one("echo $(echo $(echo deep))");
    assert_eq!(nested.stdout, "deep\n");
    let ticks = run_one("echo `echo tick`");
    assert_eq!(ticks.stdout, "tick\n");
}

#[test]
fn arithmetic_expansion_and_command() {
    let mut h = Harness::new();
    assert_eq!(h.run("echo $((2 + 3 * 4))").stdout, "14\n");
    assert_eq!(h.run("x=5; echo $((x * 2))").stdout, "10\n");
    let cmd = h.run("(( 5 > 3 )) && echo yes");
    assert_eq!(cmd.stdout, "yes\n");
    let div = h.run("echo $((1 / 0))");
    assert_eq!(div.code, 1);
    assert!(div.stderr.contains("division by zero"));
}

#[test]
fn brace_and_tilde_expansion() {
    assert_eq!(run_one("echo {1..3}").stdout, "1 2 3\n");
    assert_eq!(run_one("echo a{b,c}d").stdout, "abd acd\n");
    assert_eq!(run_one("echo ~").stdout, "/home/user\n");
}

#[test]
fn glob_expansion_and_literal_fallback() {
    let mut h = Harness::new();
    h.run("echo x > /home/user/one.txt; echo x > /home/user/two.txt");
    assert_eq!(h.run("echo *.txt").stdout, "one.txt two.txt\n");
    assert_eq!(h.run("echo *.nope").stdout, "*.nope\n");
    // Quoted globs stay literal.
    assert_eq!(h.run("echo '*.txt'").stdout, "*.txt\n");
}

#[test]
fn field_splitting_respects_quotes() {
    let mut h = Harness::new();
    h.run(r#"v="a b""#);
    assert_eq!(h.run(r#"printf '[%s]' $v"#).stdout, "[a][b]");
    assert_eq!(h.run(r#"printf '[%s]' "$v""#).stdout, "[a b]");
}

#[test]
fn pipeline_through_native_tool() {
    let out = run_one("echo abc | upper");
    assert_eq!(out.code, 0);
    assert_eq!(out.stdout, "ABC\n");
}

#[test]
fn multi_stage_pipeline() {
    let out = run_one("echo abc | upper | upper");
    assert_eq!(out.stdout, "ABC\n");
}

#[test]
fn pipeline_exit_code_is_last_stage() {
    let out = run_one("exitn 3 | exitn 0");
    assert_eq!(out.code, 0);
    let out = run_one("exitn 0 | exitn 7");
    assert_eq!(out.code, 7);
}

#[test]
fn pipefail_reports_first_nonzero() {
    let out = run_one("set -o pipefail; exitn 3 | exitn 0");
    assert_eq!(out.code, 3);
}

#[test]
fn negated_pipeline() {
    assert_eq!(run_one("! false").code, 0);
    assert_eq!(run_one("! true").code, 1);
}

#[test]
fn redirects_create_truncate_append() -> anyhow::Result<()> {
    let mut h = Harness::new();
    h.run("echo one > /home/user/f");
    assert_eq!(h.file("/home/user/f")?, "one\n");
    h.run("echo two >> /home/user/f");
    assert_eq!(h.file("/home/user/f")?, "one\ntwo\n");
    h.run("echo three > /home/user/f");
    assert_eq!(h.file("/home/user/f")?, "three\n");

    let read_back = h.run("read line < /home/user/f; echo got:$line");
    assert_eq!(read_back.stdout, "got:three\n");
    Ok(())
}

#[test]
fn redirect_to_read_only_path_fails_without_running() {
    let out = run_one("echo data > /usr/blocked");
    assert_eq!(out.code, 1);
    assert!(out.stderr.contains("read-only"));
    assert_eq!(out.stdout, "");
}

#[test]
fn stderr_redirect_and_dup() -> anyhow::Result<()> {
    let mut h = Harness::new();
    let out = h.run("echo oops 1>&2");
    assert_eq!(out.stdout, "");
    assert_eq!(out.stderr, "oops\n");

    h.run("echo msg 2>/home/user/err.log 1>&2");
    assert_eq!(h.file("/home/user/err.log")?, "msg\n");
    Ok(())
}

#[test]
fn heredoc_and_herestring() {
    let out = run_one("upper <<EOF\nhello\nEOF");
    assert_eq!(out.stdout, "HELLO\n");
    let quoted = run_one("upper <<'EOF'\n$HOME\nEOF");
    assert_eq!(quoted.stdout, "$HOME\n");
    let expanded = run_one("upper <<EOF\n$HOME\nEOF");
    assert_eq!(expanded.stdout, "/HOME/USER\n");
    let herestring = run_one("upper <<< hi");
    assert_eq!(herestring.stdout, "HI\n");
}

#[test]
fn if_elif_else() {
    let script = "if [ 1 -gt 2 ]; then echo a; elif [ 2 -gt 1 ]; then echo b; else echo c; fi";
    assert_eq!(run_one(script).stdout, "b\n");
}

#[test]
fn while_and_until_loops() {
    let out = run_one("i=0; while [ $i -lt 3 ]; do echo $i; i=$((i+1)); done");
    assert_eq!(out.stdout, "0\n1\n2\n");
    let out = run_one("i=0; until [ $i -ge 2 ]; do echo $i; i=$((i+1)); done");
    assert_eq!(out.stdout, "0\n1\n");
}

#[test]
fn c_style_for_loop() {
    let out = run_one("for ((i=0; i<3; i++)); do echo $i; done");
    assert_eq!(out.stdout, "0\n1\n2\n");
}

#[test]
fn infinite_loop_hits_iteration_cap() {
    let out = run_one("while true; do :; done");
    assert_eq!(out.code, 1);
    assert!(out.stderr.contains("loop iteration limit"));
}

#[test]
fn continue_skips_iteration() {
    let out = run_one("for i in 1 2 3; do if [ $i = 2 ]; then continue; fi; echo $i; done");
    assert_eq!(out.stdout, "1\n3\n");
}

#[test]
fn case_patterns() {
    let script = "case abc in x) echo no;; a*|z) echo yes;; *) echo default;; esac";
    assert_eq!(run_one(script).stdout, "yes\n");
    let fallthrough = "case zzz in a) echo a;; esac; echo after";
    assert_eq!(run_one(fallthrough).stdout, "after\n");
}

#[test]
fn functions_locals_and_return() {
    let script = r#"
greet() {
    local who=$1
    echo "hi $who"
    return 4
}
greet world
echo status=$?
echo leaked=${who:-none}
"#;
    let out = run_one(script);
    assert_eq!(out.stdout, "hi world\nstatus=4\nleaked=none\n");
}

#[test]
fn function_recursion_is_bounded() {
    let out = run_one("f() { f; }; f");
    assert_eq!(out.code, 1);
    assert!(out.stderr.contains("function depth"));
}

#[test]
fn subshell_isolates_state() {
    let out = run_one("(cd /tmp && pwd); pwd");
    assert_eq!(out.stdout, "/tmp\n/home/user\n");
    let vars = run_one("x=outer; (x=inner; echo $x); echo $x");
    assert_eq!(vars.stdout, "inner\nouter\n");
}

#[test]
fn brace_group_shares_state() {
    let out = run_one("{ x=shared; }; echo $x");
    assert_eq!(out.stdout, "shared\n");
}

#[test]
fn errexit_stops_execution() {
    let out = run_one("set -e; false; echo unreached");
    assert_eq!(out.code, 1);
    assert_eq!(out.stdout, "");
    // Conditions stay exempt.
    let cond = run_one("set -e; if false; then echo a; fi; echo ok");
    assert_eq!(cond.stdout, "ok\n");
    let guard = run_one("set -e; false || echo rescued");
    assert_eq!(guard.stdout, "rescued\n");
}

#[test]
fn nounset_faults_unset_expansion() {
    let out = run_one("set -u; echo $never_set");
    assert_eq!(out.code, 1);
    assert!(out.stderr.contains("unbound variable"));
}

#[test]
fn and_or_sequencing() {
    assert_eq!(run_one("true && echo yes").stdout, "yes\n");
    assert_eq!(run_one("false && echo no; echo next").stdout, "next\n");
    assert_eq!(run_one("false || echo caught").stdout, "caught\n");
    assert_eq!(run_one("true || echo skipped; echo end").stdout, "end\n");
}

#[test]
fn positional_parameters_and_shift() {
    let script = r#"set -- one two three; echo $# $1; shift; echo $# $1"#;
    assert_eq!(run_one(script).stdout, "3 one\n2 two\n");
}

#[test]
fn quoted_at_preserves_fields() {
    let script = r#"set -- "a b" c; for x in "$@"; do echo [$x]; done"#;
    assert_eq!(run_one(script).stdout, "[a b]\n[c]\n");
}

#[test]
fn indexed_arrays() {
    let mut h = Harness::new();
    let out = h.run("a=(one two three); echo ${a[1]} ${#a[@]} ${a[@]}");
    assert_eq!(out.stdout, "two 3 one two three\n");
    let assign = h.run("a=(x); a[2]=z; echo ${a[2]} ${#a[@]}");
    assert_eq!(assign.stdout, "z 3\n");
}

#[test]
fn associative_arrays() {
    let out = run_one("declare -A m; m[key]=value; m[other]=2; echo ${m[key]} ${#m[@]}");
    assert_eq!(out.stdout, "value 2\n");
}

#[test]
fn double_bracket_patterns_and_regex() {
    assert_eq!(run_one("[[ abcdef == a*f ]] && echo glob").stdout, "glob\n");
    assert_eq!(run_one(r#"[[ "a*" == "a*" ]] && echo lit"#).stdout, "lit\n");
    assert_eq!(run_one("[[ ab == a ]] || echo nomatch").stdout, "nomatch\n");
    assert_eq!(run_one("[[ hello =~ ^h.*o$ ]] && echo re").stdout, "re\n");
    assert_eq!(
        run_one("[[ -n full && -z '' ]] && echo both").stdout,
        "both\n"
    );
}

#[test]
fn test_builtin_files_and_numbers() {
    let mut h = Harness::new();
    h.run("echo content > /home/user/present");
    assert_eq!(h.run("test -f /home/user/present; echo $?").stdout, "0\n");
    assert_eq!(h.run("test -d /home/user; echo $?").stdout, "0\n");
    assert_eq!(h.run("test -s /home/user/present; echo $?").stdout, "0\n");
    assert_eq!(h.run("test -f /home/user/absent; echo $?").stdout, "1\n");
    assert_eq!(h.run("[ 3 -lt 5 ]; echo $?").stdout, "0\n");
    assert_eq!(h.run("[ 5 -le 4 ]; echo $?").stdout, "1\n");
    assert_eq!(h.run("[ abc = abc ]; echo $?").stdout, "0\n");
    assert_eq!(h.run("[ ! -e /home/user/absent ]; echo $?").stdout, "0\n");
}

#[test]
fn eval_runs_in_current_shell() {
    let out = run_one("eval 'x=fromeval; echo $x'; echo again:$x");
    assert_eq!(out.stdout, "fromeval\nagain:fromeval\n");
}

#[test]
fn source_runs_in_current_shell() {
    let mut h = Harness::new();
    h.run("printf 'sourced_var=yes\\necho sourced\\n' > /home/user/lib.sh");
    let out = h.run("source /home/user/lib.sh; echo $sourced_var");
    assert_eq!(out.stdout, "sourced\nyes\n");
    let dot = h.run(". /home/user/lib.sh > /dev/null; echo $sourced_var");
    assert_eq!(dot.stdout, "yes\n");
}

#[test]
fn getopts_parses_flags_and_arguments() {
    let script = r#"set -- -a -b val rest
while getopts "ab:" opt; do
    echo "$opt=$OPTARG"
done
echo optind=$OPTIND"#;
    let out = run_one(script);
    assert_eq!(out.stdout, "a=\nb=val\noptind=4\n");
}

#[test]
fn external_command_not_found_is_127() {
    let out = run_one("no_such_tool");
    assert_eq!(out.code, 127);
    assert!(out.stderr.contains("command not found"));
}

#[test]
fn shebang_dispatches_to_registered_interpreter() {
    let mut h = Harness::new();
    let script = "printf '#!/usr/bin/env python3\\nprint(\"ok\")\\n' > solve.py; chmod +x solve.py; ./solve.py";
    let out = h.run(script);
    assert_eq!(out.code, 0);
    assert_eq!(out.stdout, "ok\n");
}

#[test]
fn script_without_exec_bit_is_126() {
    let mut h = Harness::new();
    h.run("echo 'echo hi' > plain.sh");
    let out = h.run("./plain.sh");
    assert_eq!(out.code, 126);
    assert!(out.stderr.contains("Permission denied"));
}

#[test]
fn shell_script_without_shebang_runs_in_process() {
    let mut h = Harness::new();
    h.run("printf 'echo arg1=$1\\n' > run.sh; chmod +x run.sh");
    let out = h.run("./run.sh hello");
    assert_eq!(out.stdout, "arg1=hello\n");
}

#[test]
fn syntax_error_is_exit_2() {
    let out = run_one("if true; then echo hi");
    assert_eq!(out.code, 2);
    assert!(out.stderr.contains("syntax error"));
}

#[test]
fn cancellation_maps_to_125() {
    let mut h = Harness::new();
    h.exec.control.cancel();
    let out = h.run("echo never");
    assert_eq!(out.status, RunStatus::Cancelled);
    assert_eq!(out.code, 125);
    h.exec.control.reset();
    assert_eq!(h.run("echo back").stdout, "back\n");
}

#[test]
fn deadline_maps_to_124() {
    let mut h = Harness::new();
    h.exec.control.set_deadline(1);
    let out = h.run("while true; do :; done");
    assert_eq!(out.status, RunStatus::Timeout);
    assert_eq!(out.code, 124);
}

#[test]
fn exit_trap_runs_on_request() {
    let mut h = Harness::new();
    h.run("trap 'echo bye' EXIT");
    let stdout = OutputBuffer::new(None);
    let io = Io {
        stdin: Stream::null(),
        stdout: Stream::Target(FdTarget::Buffer(stdout.clone())),
        stderr: Stream::null(),
    };
    h.pool.run_until(h.exec.run_exit_trap(&io));
    assert_eq!(stdout.into_string_lossy(), "bye\n");
}

#[test]
fn curl_denied_by_default_gateway() {
    let out = run_one("curl https://example.com/data");
    assert_eq!(out.code, 1);
    assert!(out.stderr.contains("network access denied"));
}

#[test]
fn type_and_which_and_command() {
    let mut h = Harness::new();
    assert_eq!(h.run("type cd").stdout, "cd is a shell builtin\n");
    let out = h.run("f() { :; }; type f");
    assert_eq!(out.stdout, "f is a function\n");
    assert_eq!(h.run("command echo via-command").stdout, "via-command\n");
    assert_eq!(h.run("command -v echo").stdout, "echo\n");
}

#[test]
fn mapfile_reads_lines_into_array() {
    let out = run_one("mapfile -t lines <<EOF\nalpha\nbeta\nEOF\necho ${#lines[@]} ${lines[1]}");
    assert_eq!(out.stdout, "2 beta\n");
}

#[test]
fn read_splits_across_variables() {
    let out = run_one("read a b <<< 'first second third'; echo [$a] [$b]");
    assert_eq!(out.stdout, "[first] [second third]\n");
}

#[test]
fn dev_null_swallows_output() {
    let out = run_one("echo hidden > /dev/null; echo shown");
    assert_eq!(out.stdout, "shown\n");
}

#[test]
fn assignment_prefix_is_temporary() {
    let mut h = Harness::new();
    // Overlay is visible to the command, then rolled back.
    let out = h.run("X=temp eval 'echo $X'; echo after:${X:-unset}");
    assert_eq!(out.stdout, "temp\nafter:unset\n");
}

#[test]
fn heredoc_with_tabs_stripped() {
    let out = run_one("upper <<-EOF\n\tindented\n\tEOF");
    assert_eq!(out.stdout, "INDENTED\n");
}
