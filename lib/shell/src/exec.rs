//! The shell executor: walks the command tree.

use std::rc::Rc;
use std::sync::Arc;

use futures::future::LocalBoxFuture;
use tracing::{debug, trace};
use wasmbox_vfs::path as vfspath;
use wasmbox_wasi::types::ExitSignal;
use wasmbox_wasi::{
    pipe, ExecControl, FdTarget, ProcessCtx, ProcessKernel, SharedVfs, ToolRegistry, PIPE_CAPACITY,
};

use crate::ast::{Assignment, AssignValue, Command, ListOp, Redirect, RedirKind, RedirTarget};
use crate::gateway::NetworkGateway;
use crate::parser;
use crate::pattern::fnmatch;
use crate::state::ShellState;
use crate::stream::{Io, Stream};

/// Iteration cap on `while`/`until` and C-style `for`.
pub const MAX_LOOP_ITERATIONS: u32 = 10_000;
/// Function call depth cap.
pub const MAX_FUNC_DEPTH: u32 = 100;

/// Non-local control flow raised while walking the tree. Loop signals
/// are caught by the nearest enclosing loop, `Return` by the nearest
/// function call, `Exit` by `run_source`, `Fail` by the current command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Flow {
    Break(u32),
    Continue(u32),
    Return(i32),
    Exit(i32),
    /// Abort the current command with a status (expansion and redirect
    /// failures).
    Fail(i32),
    /// Timeout or cancellation from the shared control plane.
    Signal(ExitSignal),
}

impl Flow {
    /// The status a pipeline stage reports when this flow escapes it.
    pub fn into_status(self) -> i32 {
        match self {
            Self::Break(_) | Self::Continue(_) => 0,
            Self::Return(code) | Self::Exit(code) | Self::Fail(code) => code,
            Self::Signal(signal) => signal.code(),
        }
    }
}

/// How a top-level `run` finished.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RunStatus {
    Done(i32),
    Timeout,
    Cancelled,
}

impl RunStatus {
    pub fn code(self) -> i32 {
        match self {
            Self::Done(code) => code,
            Self::Timeout => 124,
            Self::Cancelled => 125,
        }
    }
}

/// The tree walker. One per shell session; pipeline stages and subshells
/// run on clones.
pub struct Executor {
    pub state: ShellState,
    pub vfs: SharedVfs,
    pub kernel: ProcessKernel,
    pub control: ExecControl,
    pub registry: Arc<dyn ToolRegistry>,
    pub gateway: Arc<dyn NetworkGateway>,
    pub(crate) loop_depth: u32,
    pub(crate) func_depth: u32,
    pub(crate) subst_depth: u32,
    pub(crate) cond_depth: u32,
}

impl Executor {
    pub fn new(
        vfs: SharedVfs,
        kernel: ProcessKernel,
        control: ExecControl,
        registry: Arc<dyn ToolRegistry>,
        gateway: Arc<dyn NetworkGateway>,
    ) -> Self {
        Self {
            state: ShellState::new(),
            vfs,
            kernel,
            control,
            registry,
            gateway,
            loop_depth: 0,
            func_depth: 0,
            subst_depth: 0,
            cond_depth: 0,
        }
    }

    /// A clone for subshells and pipeline stages: shared filesystem and
    /// kernel, copied shell state, fresh loop/function nesting.
    pub(crate) fn subshell_clone(&self) -> Executor {
        Executor {
            state: self.state.clone(),
            vfs: self.vfs.clone(),
            kernel: self.kernel.clone(),
            control: self.control.clone(),
            registry: self.registry.clone(),
            gateway: self.gateway.clone(),
            loop_depth: 0,
            func_depth: self.func_depth,
            subst_depth: self.subst_depth,
            cond_depth: 0,
        }
    }

    /// Builtin output path: a failed write (quota, broken pipe) fails
    /// the current command with status 1.
    pub(crate) async fn write_stdout(&self, io: &Io, text: &str) -> Result<(), Flow> {
        match io.stdout.write_all(&self.vfs, text.as_bytes()).await {
            Ok(()) => Ok(()),
            Err(errno) => {
                self.write_stderr(io, &format!("sh: write error: {}\n", errno.message())).await;
                Err(Flow::Fail(1))
            }
        }
    }

    pub(crate) async fn write_stderr(&self, io: &Io, text: &str) {
        let _ = io.stderr.write_all(&self.vfs, text.as_bytes()).await;
    }

    /// Parses and runs a command string, translating terminal flows.
    pub async fn run_source(&mut self, source: &str, io: &Io) -> RunStatus {
        let program = match parser::parse(source) {
            Ok(Some(program)) => program,
            Ok(None) => return RunStatus::Done(0),
            Err(err) => {
                self.write_stderr(io, &format!("sh: {err}\n")).await;
                self.state.last_status = 2;
                return RunStatus::Done(2);
            }
        };
        let status = match self.exec(&program, io).await {
            Ok(status) => status,
            Err(Flow::Exit(code)) | Err(Flow::Return(code)) | Err(Flow::Fail(code)) => code,
            Err(Flow::Break(_)) | Err(Flow::Continue(_)) => 0,
            Err(Flow::Signal(ExitSignal::Timeout)) => return RunStatus::Timeout,
            Err(Flow::Signal(ExitSignal::Cancelled)) => return RunStatus::Cancelled,
            Err(Flow::Signal(ExitSignal::Exit(code))) => code,
        };
        self.state.last_status = status;
        RunStatus::Done(status)
    }

    /// Runs the `EXIT` trap, if one is set.
    pub async fn run_exit_trap(&mut self, io: &Io) {
        let Some(body) = self.state.traps.get("EXIT").cloned() else {
            return;
        };
        if let Ok(Some(program)) = parser::parse(&body) {
            let _ = self.exec(&program, io).await;
        }
    }

    pub fn exec<'a>(
        &'a mut self,
        cmd: &'a Command,
        io: &'a Io,
    ) -> LocalBoxFuture<'a, Result<i32, Flow>> {
        Box::pin(async move {
            self.control.check().map_err(Flow::Signal)?;
            match cmd {
                Command::Simple {
                    assignments,
                    words,
                    redirects,
                } => {
                    let status = match self.exec_simple(assignments, words, redirects, io).await {
                        Ok(status) => status,
                        Err(Flow::Fail(status)) => status,
                        Err(flow) => return Err(flow),
                    };
                    self.state.last_status = status;
                    self.maybe_errexit(status)?;
                    Ok(status)
                }
                Command::Pipeline { cmds } => {
                    let status = self.exec_pipeline(cmds, io).await?;
                    self.state.last_status = status;
                    self.maybe_errexit(status)?;
                    Ok(status)
                }
                Command::List { left, op, right } => match op {
                    ListOp::Seq => {
                        self.exec(left, io).await?;
                        self.exec(right, io).await
                    }
                    ListOp::And => {
                        self.cond_depth += 1;
                        let left_status = self.exec(left, io).await;
                        self.cond_depth -= 1;
                        let left_status = left_status?;
                        if left_status == 0 {
                            self.exec(right, io).await
                        } else {
                            Ok(left_status)
                        }
                    }
                    ListOp::Or => {
                        self.cond_depth += 1;
                        let left_status = self.exec(left, io).await;
                        self.cond_depth -= 1;
                        let left_status = left_status?;
                        if left_status != 0 {
                            self.exec(right, io).await
                        } else {
                            Ok(left_status)
                        }
                    }
                },
                Command::If {
                    cond,
                    then,
                    elifs,
                    else_branch,
                } => {
                    self.cond_depth += 1;
                    let cond_status = self.exec(cond, io).await;
                    self.cond_depth -= 1;
                    if cond_status? == 0 {
                        return self.exec(then, io).await;
                    }
                    for (elif_cond, elif_body) in elifs {
                        self.cond_depth += 1;
                        let elif_status = self.exec(elif_cond, io).await;
                        self.cond_depth -= 1;
                        if elif_status? == 0 {
                            return self.exec(elif_body, io).await;
                        }
                    }
                    match else_branch {
                        Some(body) => self.exec(body, io).await,
                        None => Ok(0),
                    }
                }
                Command::For { var, words, body } => {
                    let items = match words {
                        Some(words) => match self.expand_words(words, io).await {
                            Ok(items) => items,
                            Err(Flow::Fail(status)) => {
                                self.state.last_status = status;
                                return Ok(status);
                            }
                            Err(flow) => return Err(flow),
                        },
                        None => self.state.positional.clone(),
                    };
                    let mut status = 0;
                    self.loop_depth += 1;
                    for item in items {
                        self.control.check().map_err(|s| {
                            self.loop_depth -= 1;
                            Flow::Signal(s)
                        })?;
                        self.state.set_var(var, item);
                        match self.exec(body, io).await {
                            Ok(body_status) => status = body_status,
                            Err(Flow::Break(n)) => {
                                if n > 1 {
                                    self.loop_depth -= 1;
                                    return Err(Flow::Break(n - 1));
                                }
                                break;
                            }
                            Err(Flow::Continue(n)) => {
                                if n > 1 {
                                    self.loop_depth -= 1;
                                    return Err(Flow::Continue(n - 1));
                                }
                                continue;
                            }
                            Err(flow) => {
                                self.loop_depth -= 1;
                                return Err(flow);
                            }
                        }
                    }
                    self.loop_depth -= 1;
                    Ok(status)
                }
                Command::CFor {
                    init,
                    cond,
                    step,
                    body,
                } => self.exec_cfor(init, cond, step, body, io).await,
                Command::While { cond, body, until } => {
                    self.exec_while(cond, body, *until, io).await
                }
                Command::Case { word, items } => {
                    let subject = match self.expand_single(word, io).await {
                        Ok(subject) => subject,
                        Err(Flow::Fail(status)) => return Ok(status),
                        Err(flow) => return Err(flow),
                    };
                    for item in items {
                        for pattern_word in &item.patterns {
                            let pattern = match self.expand_pattern(pattern_word, io).await {
                                Ok(pattern) => pattern,
                                Err(Flow::Fail(status)) => return Ok(status),
                                Err(flow) => return Err(flow),
                            };
                            if fnmatch(&pattern, &subject) {
                                return match &item.body {
                                    Some(body) => self.exec(body, io).await,
                                    None => Ok(0),
                                };
                            }
                        }
                    }
                    Ok(0)
                }
                Command::Subshell(body) => {
                    let mut sub = self.subshell_clone();
                    let status = match sub.exec(body, io).await {
                        Ok(status) => status,
                        Err(flow @ Flow::Signal(_)) => return Err(flow),
                        Err(flow) => flow.into_status(),
                    };
                    self.state.last_status = status;
                    Ok(status)
                }
                Command::BraceGroup(body) => self.exec(body, io).await,
                Command::Negate(body) => {
                    self.cond_depth += 1;
                    let result = self.exec(body, io).await;
                    self.cond_depth -= 1;
                    let status = match result {
                        Ok(status) => status,
                        Err(Flow::Fail(status)) => status,
                        Err(flow) => return Err(flow),
                    };
                    let negated = if status == 0 { 1 } else { 0 };
                    self.state.last_status = negated;
                    Ok(negated)
                }
                Command::Function { name, body } => {
                    self.state
                        .funcs
                        .insert(name.clone(), Rc::new((**body).clone()));
                    Ok(0)
                }
                Command::Redirected { cmd, redirects } => {
                    let effective = match self.apply_redirects(redirects, io).await {
                        Ok(effective) => effective,
                        Err(Flow::Fail(status)) => {
                            self.state.last_status = status;
                            return Ok(status);
                        }
                        Err(flow) => return Err(flow),
                    };
                    self.exec(cmd, &effective).await
                }
                Command::DoubleBracket(words) => {
                    let status = match crate::builtins::eval_cond_words(self, words, io).await {
                        Ok(true) => 0,
                        Ok(false) => 1,
                        Err(Flow::Fail(status)) => status,
                        Err(flow) => return Err(flow),
                    };
                    self.state.last_status = status;
                    self.maybe_errexit(status)?;
                    Ok(status)
                }
                Command::ArithCommand(expr) => {
                    let status = match self.arith_eval(expr, io).await {
                        Ok(value) => {
                            if value != 0 {
                                0
                            } else {
                                1
                            }
                        }
                        Err(Flow::Fail(status)) => status,
                        Err(flow) => return Err(flow),
                    };
                    self.state.last_status = status;
                    self.maybe_errexit(status)?;
                    Ok(status)
                }
                Command::Break(n) => {
                    if self.loop_depth == 0 {
                        self.write_stderr(io, "sh: break: only meaningful in a loop\n").await;
                        Ok(0)
                    } else {
                        Err(Flow::Break(*n.max(&1)))
                    }
                }
                Command::Continue(n) => {
                    if self.loop_depth == 0 {
                        self.write_stderr(io, "sh: continue: only meaningful in a loop\n").await;
                        Ok(0)
                    } else {
                        Err(Flow::Continue(*n.max(&1)))
                    }
                }
            }
        })
    }

    /// `set -e`: abort on a failing command outside condition contexts.
    fn maybe_errexit(&self, status: i32) -> Result<(), Flow> {
        if self.state.options.errexit && status != 0 && self.cond_depth == 0 {
            Err(Flow::Exit(status))
        } else {
            Ok(())
        }
    }

    async fn exec_cfor(
        &mut self,
        init: &str,
        cond: &str,
        step: &str,
        body: &Command,
        io: &Io,
    ) -> Result<i32, Flow> {
        match self.arith_eval(init, io).await {
            Ok(_) => {}
            Err(Flow::Fail(status)) => return Ok(status),
            Err(flow) => return Err(flow),
        }
        let mut status = 0;
        let mut iterations = 0u32;
        self.loop_depth += 1;
        let result = loop {
            if let Err(signal) = self.control.check() {
                break Err(Flow::Signal(signal));
            }
            iterations += 1;
            if iterations > MAX_LOOP_ITERATIONS {
                self.write_stderr(io, "sh: loop iteration limit exceeded\n").await;
                break Ok(1);
            }
            if !cond.trim().is_empty() {
                match self.arith_eval(cond, io).await {
                    Ok(value) if value == 0 => break Ok(status),
                    Ok(_) => {}
                    Err(flow) => break Err(flow),
                }
            }
            match self.exec(body, io).await {
                Ok(body_status) => status = body_status,
                Err(Flow::Break(n)) => {
                    if n > 1 {
                        break Err(Flow::Break(n - 1));
                    }
                    break Ok(status);
                }
                Err(Flow::Continue(n)) if n <= 1 => {}
                Err(Flow::Continue(n)) => break Err(Flow::Continue(n - 1)),
                Err(flow) => break Err(flow),
            }
            match self.arith_eval(step, io).await {
                Ok(_) => {}
                Err(flow) => break Err(flow),
            }
        };
        self.loop_depth -= 1;
        match result {
            Err(Flow::Fail(fail_status)) => Ok(fail_status),
            other => other,
        }
    }

    async fn exec_while(
        &mut self,
        cond: &Command,
        body: &Command,
        until: bool,
        io: &Io,
    ) -> Result<i32, Flow> {
        let mut status = 0;
        let mut iterations = 0u32;
        self.loop_depth += 1;
        let result = loop {
            if let Err(signal) = self.control.check() {
                break Err(Flow::Signal(signal));
            }
            iterations += 1;
            if iterations > MAX_LOOP_ITERATIONS {
                self.write_stderr(io, "sh: loop iteration limit exceeded\n").await;
                break Ok(1);
            }
            self.cond_depth += 1;
            let cond_status = self.exec(cond, io).await;
            self.cond_depth -= 1;
            let truthy = match cond_status {
                Ok(cond_status) => (cond_status == 0) != until,
                Err(flow) => break Err(flow),
            };
            if !truthy {
                break Ok(status);
            }
            match self.exec(body, io).await {
                Ok(body_status) => status = body_status,
                Err(Flow::Break(n)) => {
                    if n > 1 {
                        break Err(Flow::Break(n - 1));
                    }
                    break Ok(status);
                }
                Err(Flow::Continue(n)) if n <= 1 => {}
                Err(Flow::Continue(n)) => break Err(Flow::Continue(n - 1)),
                Err(flow) => break Err(flow),
            }
        };
        self.loop_depth -= 1;
        result
    }

    async fn exec_pipeline(&mut self, cmds: &[Command], io: &Io) -> Result<i32, Flow> {
        trace!(stages = cmds.len(), "pipeline");
        let stage_count = cmds.len();
        let mut pids = Vec::with_capacity(stage_count);
        let mut prev_reader = None;
        for (idx, cmd) in cmds.iter().enumerate() {
            let stdin = match prev_reader.take() {
                Some(reader) => Stream::Target(FdTarget::PipeRead(reader)),
                None => io.stdin.clone(),
            };
            let stdout = if idx + 1 == stage_count {
                io.stdout.clone()
            } else {
                let (reader, writer) = pipe(PIPE_CAPACITY);
                prev_reader = Some(reader);
                Stream::Target(FdTarget::PipeWrite(writer))
            };
            let stage_io = Io {
                stdin,
                stdout,
                stderr: io.stderr.clone(),
            };
            let mut stage = self.subshell_clone();
            let cmd = cmd.clone();
            // The stage owns its pipe ends; dropping them at exit is
            // what delivers EOF downstream.
            let pid = self.kernel.spawn(Box::pin(async move {
                match stage.exec(&cmd, &stage_io).await {
                    Ok(status) => status,
                    Err(flow) => flow.into_status(),
                }
            }));
            pids.push(pid);
        }

        let mut statuses = Vec::with_capacity(stage_count);
        for pid in pids {
            statuses.push(self.kernel.waitpid(pid).await.unwrap_or(1));
        }
        self.control.check().map_err(Flow::Signal)?;
        let status = if self.state.options.pipefail {
            statuses.iter().copied().find(|s| *s != 0).unwrap_or(0)
        } else {
            statuses.last().copied().unwrap_or(0)
        };
        Ok(status)
    }

    async fn exec_simple(
        &mut self,
        assignments: &[Assignment],
        words: &[crate::word::Word],
        redirects: &[Redirect],
        io: &Io,
    ) -> Result<i32, Flow> {
        let fields = self.expand_words(words, io).await?;
        let effective = self.apply_redirects(redirects, io).await?;

        if fields.is_empty() {
            // Assignment-only command: bindings persist; status comes
            // from the last command substitution, if any.
            self.state.last_status = 0;
            self.apply_assignments(assignments, &effective).await?;
            return Ok(self.state.last_status);
        }

        let name = fields[0].clone();
        let args: Vec<String> = fields[1..].to_vec();
        debug!(command = %name, argc = args.len(), "dispatch");

        // `VAR=x cmd`: scalar bindings are temporary for the command's
        // run; array-valued prefixes (`declare -a a=(…)`) apply
        // directly since there is nothing to overlay them onto.
        let overlay = self.collect_overlay(assignments, &effective).await?;
        for assignment in assignments {
            if matches!(assignment.value, AssignValue::Array(_)) {
                self.apply_assignments(std::slice::from_ref(assignment), &effective)
                    .await?;
            }
        }

        if let Some(body) = self.state.funcs.get(&name).cloned() {
            let saved = self.push_overlay(&overlay);
            let result = self.call_function(&name, &body, args, &effective).await;
            self.pop_overlay(saved);
            return result;
        }

        if crate::builtins::is_builtin(&name) {
            let saved = self.push_overlay(&overlay);
            let result = self.run_builtin(&name, &args, &effective).await;
            self.pop_overlay(saved);
            return result;
        }

        self.run_external(&name, &args, &effective, overlay).await
    }

    /// Expands `VAR=x` prefixes into a (name, value) list.
    async fn collect_overlay(
        &mut self,
        assignments: &[Assignment],
        io: &Io,
    ) -> Result<Vec<(String, String)>, Flow> {
        let mut overlay = Vec::new();
        for assignment in assignments {
            if let AssignValue::Scalar(word) = &assignment.value {
                let value = self.expand_single(word, io).await?;
                overlay.push((assignment.name.clone(), value));
            }
        }
        Ok(overlay)
    }

    fn push_overlay(&mut self, overlay: &[(String, String)]) -> Vec<(String, Option<String>)> {
        let mut saved = Vec::with_capacity(overlay.len());
        for (name, value) in overlay {
            saved.push((name.clone(), self.state.env.get(name).cloned()));
            self.state.set_var(name, value.clone());
        }
        saved
    }

    fn pop_overlay(&mut self, saved: Vec<(String, Option<String>)>) {
        for (name, previous) in saved.into_iter().rev() {
            match previous {
                Some(value) => {
                    self.state.env.insert(name, value);
                }
                None => {
                    self.state.env.shift_remove(&name);
                }
            }
        }
    }

    /// Persistent assignments (no command word).
    pub(crate) async fn apply_assignments(
        &mut self,
        assignments: &[Assignment],
        io: &Io,
    ) -> Result<(), Flow> {
        for assignment in assignments {
            match &assignment.value {
                AssignValue::Scalar(word) => {
                    let value = self.expand_single(word, io).await?;
                    match &assignment.index {
                        None => {
                            if assignment.append {
                                let existing =
                                    self.state.get_var(&assignment.name).unwrap_or("").to_string();
                                self.state.set_var(&assignment.name, existing + &value);
                            } else {
                                self.state.set_var(&assignment.name, value);
                            }
                        }
                        Some(index) => self.assign_subscript(assignment, index, value, io).await?,
                    }
                }
                AssignValue::Array(words) => {
                    let values = self.expand_words(words, io).await?;
                    let entry = self.state.arrays.entry(assignment.name.clone()).or_default();
                    if assignment.append {
                        entry.extend(values);
                    } else {
                        *entry = values;
                    }
                    self.state.env.shift_remove(&assignment.name);
                }
            }
        }
        Ok(())
    }

    async fn assign_subscript(
        &mut self,
        assignment: &Assignment,
        index: &str,
        value: String,
        io: &Io,
    ) -> Result<(), Flow> {
        if self.state.assoc.contains_key(&assignment.name) {
            let key_word =
                crate::lexer::lex_word_text(index).map_err(|_| Flow::Fail(2))?;
            let key = self.expand_single(&key_word, io).await?;
            let map = self.state.assoc.entry(assignment.name.clone()).or_default();
            if assignment.append {
                let existing = map.get(&key).cloned().unwrap_or_default();
                map.insert(key, existing + &value);
            } else {
                map.insert(key, value);
            }
            return Ok(());
        }
        let idx = self.arith_eval(index, io).await?;
        if idx < 0 {
            self.write_stderr(io, &format!("sh: {}: bad array subscript\n", assignment.name))
                .await;
            return Err(Flow::Fail(1));
        }
        let entry = self.state.arrays.entry(assignment.name.clone()).or_default();
        let idx = idx as usize;
        if entry.len() <= idx {
            entry.resize(idx + 1, String::new());
        }
        if assignment.append {
            entry[idx] = std::mem::take(&mut entry[idx]) + &value;
        } else {
            entry[idx] = value;
        }
        Ok(())
    }

    async fn call_function(
        &mut self,
        name: &str,
        body: &Rc<Command>,
        args: Vec<String>,
        io: &Io,
    ) -> Result<i32, Flow> {
        if self.func_depth >= MAX_FUNC_DEPTH {
            self.write_stderr(io, &format!("sh: {name}: maximum function depth exceeded\n"))
                .await;
            return Ok(1);
        }
        let saved_positional = std::mem::replace(&mut self.state.positional, args);
        self.state.push_local_scope();
        self.func_depth += 1;
        let result = self.exec(body, io).await;
        self.func_depth -= 1;
        self.state.pop_local_scope();
        self.state.positional = saved_positional;
        match result {
            Ok(status) => Ok(status),
            Err(Flow::Return(code)) => Ok(code),
            Err(flow) => Err(flow),
        }
    }

    /// Applies redirections in order, producing the effective streams.
    pub(crate) async fn apply_redirects(
        &mut self,
        redirects: &[Redirect],
        io: &Io,
    ) -> Result<Io, Flow> {
        let mut effective = io.clone();
        for redirect in redirects {
            let fd = redirect.fd.unwrap_or_else(|| redirect.kind.default_fd());
            let stream = match (&redirect.kind, &redirect.target) {
                (RedirKind::In, RedirTarget::Word(word)) => {
                    let path = self.redirect_path(word, io).await?;
                    let exists = self.vfs.lock().unwrap().stat(&path).is_ok();
                    if !exists {
                        self.write_stderr(io, &format!("sh: {path}: No such file or directory\n"))
                            .await;
                        return Err(Flow::Fail(1));
                    }
                    Stream::from_file(path, false, true, false)
                }
                (RedirKind::Out | RedirKind::OutClobber, RedirTarget::Word(word)) => {
                    let path = self.redirect_path(word, io).await?;
                    let truncated = self
                        .vfs
                        .lock()
                        .unwrap()
                        .write_file(&path, bytes::Bytes::new());
                    if let Err(err) = truncated {
                        self.write_stderr(io, &format!("sh: {path}: {err}\n")).await;
                        return Err(Flow::Fail(1));
                    }
                    Stream::from_file(path, false, false, true)
                }
                (RedirKind::Append, RedirTarget::Word(word)) => {
                    let path = self.redirect_path(word, io).await?;
                    let created = {
                        let mut vfs = self.vfs.lock().unwrap();
                        if vfs.stat(&path).is_err() {
                            vfs.write_file(&path, bytes::Bytes::new())
                        } else {
                            Ok(())
                        }
                    };
                    if let Err(err) = created {
                        self.write_stderr(io, &format!("sh: {path}: {err}\n")).await;
                        return Err(Flow::Fail(1));
                    }
                    Stream::from_file(path, true, false, true)
                }
                (RedirKind::HereDoc { .. }, RedirTarget::Heredoc { body, quoted }) => {
                    let content = if *quoted {
                        body.clone()
                    } else {
                        self.expand_heredoc(body, io).await?
                    };
                    Stream::Target(FdTarget::from_bytes(content.into_bytes()))
                }
                (RedirKind::HereString, RedirTarget::Word(word)) => {
                    let mut content = self.expand_single(word, io).await?;
                    content.push('\n');
                    Stream::Target(FdTarget::from_bytes(content.into_bytes()))
                }
                (RedirKind::DupOut | RedirKind::DupIn, RedirTarget::Fd(source)) => {
                    match source {
                        0 => effective.stdin.clone(),
                        1 => effective.stdout.clone(),
                        2 => effective.stderr.clone(),
                        other => {
                            self.write_stderr(io, &format!("sh: {other}: bad file descriptor\n"))
                                .await;
                            return Err(Flow::Fail(1));
                        }
                    }
                }
                _ => {
                    self.write_stderr(io, "sh: unsupported redirection\n").await;
                    return Err(Flow::Fail(1));
                }
            };
            match fd {
                0 => effective.stdin = stream,
                1 => effective.stdout = stream,
                2 => effective.stderr = stream,
                other => {
                    self.write_stderr(io, &format!("sh: {other}: bad file descriptor\n")).await;
                    return Err(Flow::Fail(1));
                }
            }
        }
        Ok(effective)
    }

    async fn redirect_path(&mut self, word: &crate::word::Word, io: &Io) -> Result<String, Flow> {
        let raw = self.expand_single(word, io).await?;
        vfspath::absolutize(&self.state.pwd(), &raw).map_err(|_| Flow::Fail(1))
    }

    /// External command dispatch: explicit paths (shebang-aware), then
    /// the tool registry.
    pub(crate) async fn run_external(
        &mut self,
        name: &str,
        args: &[String],
        io: &Io,
        overlay: Vec<(String, String)>,
    ) -> Result<i32, Flow> {
        self.control.check().map_err(Flow::Signal)?;
        if name.contains('/') {
            return self.run_path_command(name, args, io, overlay).await;
        }
        match self.registry.lookup(name) {
            Some(tool) => {
                let argv = std::iter::once(name.to_string())
                    .chain(args.iter().cloned())
                    .collect();
                self.spawn_tool(&tool, argv, io, overlay).await
            }
            None => {
                self.write_stderr(io, &format!("sh: {name}: command not found\n")).await;
                Ok(127)
            }
        }
    }

    async fn run_path_command(
        &mut self,
        name: &str,
        args: &[String],
        io: &Io,
        overlay: Vec<(String, String)>,
    ) -> Result<i32, Flow> {
        let path = match vfspath::absolutize(&self.state.pwd(), name) {
            Ok(path) => path,
            Err(_) => {
                self.write_stderr(io, &format!("sh: {name}: No such file or directory\n")).await;
                return Ok(127);
            }
        };
        let (content, mode) = {
            let mut vfs = self.vfs.lock().unwrap();
            match (vfs.read_file(&path), vfs.stat(&path)) {
                (Ok(content), Ok(stat)) => (content, stat.mode),
                _ => {
                    self.write_stderr(io, &format!("sh: {name}: No such file or directory\n"))
                        .await;
                    return Ok(127);
                }
            }
        };
        if mode & 0o111 == 0 {
            self.write_stderr(io, &format!("sh: {name}: Permission denied\n")).await;
            return Ok(126);
        }
        let text = String::from_utf8_lossy(&content).into_owned();

        if let Some(rest) = text.strip_prefix("#!") {
            let line = rest.lines().next().unwrap_or("").trim();
            let mut parts = line.split_whitespace();
            let interp_path = parts.next().unwrap_or("");
            let mut interp = vfspath::file_name(interp_path).to_string();
            let mut extra: Vec<String> = parts.map(str::to_string).collect();
            if interp == "env" {
                if extra.is_empty() {
                    self.write_stderr(io, &format!("sh: {name}: bad interpreter\n")).await;
                    return Ok(126);
                }
                interp = extra.remove(0);
            }
            if interp == "sh" || interp == "bash" {
                return self.run_script(&text, &path, args, io).await;
            }
            match self.registry.lookup(&interp) {
                Some(tool) => {
                    let mut argv = vec![interp.clone()];
                    argv.extend(extra);
                    argv.push(path.clone());
                    argv.extend(args.iter().cloned());
                    return self.spawn_tool(&tool, argv, io, overlay).await;
                }
                None => {
                    self.write_stderr(io, &format!("sh: {name}: {interp}: bad interpreter\n"))
                        .await;
                    return Ok(127);
                }
            }
        }

        // No shebang: run as a shell script in-process.
        self.run_script(&text, &path, args, io).await
    }

    /// Runs a shell script in-process with its own positional parameters
    /// and only the exported environment.
    pub(crate) async fn run_script(
        &mut self,
        source: &str,
        path: &str,
        args: &[String],
        io: &Io,
    ) -> Result<i32, Flow> {
        if self.func_depth >= MAX_FUNC_DEPTH {
            self.write_stderr(io, &format!("sh: {path}: maximum recursion exceeded\n")).await;
            return Ok(1);
        }
        let mut sub = self.subshell_clone();
        sub.func_depth += 1;
        sub.state.positional = args.to_vec();
        sub.state.arg0 = path.to_string();
        sub.state.funcs.clear();
        let exported: Vec<(String, String)> = self.state.exported_env();
        sub.state.env = exported.into_iter().collect();
        sub.state.exported = sub.state.env.keys().cloned().collect();
        let status = sub.run_source(source, io).await;
        match status {
            RunStatus::Done(code) => Ok(code),
            RunStatus::Timeout => Err(Flow::Signal(ExitSignal::Timeout)),
            RunStatus::Cancelled => Err(Flow::Signal(ExitSignal::Cancelled)),
        }
    }

    pub(crate) async fn spawn_tool(
        &mut self,
        tool: &Arc<dyn wasmbox_wasi::Tool>,
        argv: Vec<String>,
        io: &Io,
        overlay: Vec<(String, String)>,
    ) -> Result<i32, Flow> {
        let fds = match io.to_fd_table(&self.vfs) {
            Ok(fds) => fds,
            Err(err) => {
                self.write_stderr(io, &format!("sh: {err}\n")).await;
                return Ok(1);
            }
        };
        let mut env = self.state.exported_env();
        env.extend(overlay);
        let ctx = ProcessCtx {
            args: argv,
            env,
            fds,
            vfs: self.vfs.clone(),
            cwd: self.state.pwd(),
            control: self.control.clone(),
        };
        let pid = self.kernel.spawn(tool.spawn(ctx));
        let status = self.kernel.waitpid(pid).await.unwrap_or(1);
        self.control.check().map_err(Flow::Signal)?;
        Ok(status)
    }
}
