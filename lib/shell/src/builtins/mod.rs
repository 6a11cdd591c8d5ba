//! Shell builtins. All execute in the current shell (no fork); errors
//! print to stderr and report through the exit status.

mod getopts;
mod net;
mod printf;
mod read;
mod test_expr;

pub(crate) use test_expr::eval_cond_words;

use crate::exec::{Executor, Flow};
use crate::parser;
use crate::stream::Io;
use wasmbox_vfs::path as vfspath;

const BUILTINS: &[&str] = &[
    ":", ".", "[", "break", "cd", "chmod", "command", "continue", "curl", "date", "declare",
    "echo", "eval", "exit", "export", "false", "getopts", "history", "let", "local", "mapfile",
    "printf", "pwd", "read", "readarray", "return", "set", "shift", "source", "test", "trap",
    "true", "type", "typeset", "unset", "wget", "which",
];

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

impl Executor {
    pub(crate) async fn run_builtin(
        &mut self,
        name: &str,
        args: &[String],
        io: &Io,
    ) -> Result<i32, Flow> {
        self.control.check().map_err(Flow::Signal)?;
        match name {
            ":" | "true" => Ok(0),
            "false" => Ok(1),
            "cd" => self.builtin_cd(args, io).await,
            "pwd" => {
                self.write_stdout(io, &format!("{}\n", self.state.pwd())).await?;
                Ok(0)
            }
            "echo" => self.builtin_echo(args, io).await,
            "printf" => self.builtin_printf(args, io).await,
            "export" => self.builtin_export(args, io).await,
            "unset" => self.builtin_unset(args).await,
            "set" => self.builtin_set(args, io).await,
            "shift" => self.builtin_shift(args).await,
            "read" => self.builtin_read(args, io).await,
            "mapfile" | "readarray" => self.builtin_mapfile(args, io).await,
            "eval" => self.builtin_eval(args, io).await,
            "source" | "." => self.builtin_source(args, io).await,
            "getopts" => self.builtin_getopts(args, io).await,
            "test" => {
                let status = test_expr::eval_test(self, args, io).await?;
                Ok(status)
            }
            "[" => {
                let Some((last, rest)) = args.split_last() else {
                    self.write_stderr(io, "sh: [: missing `]'\n").await;
                    return Ok(2);
                };
                if last != "]" {
                    self.write_stderr(io, "sh: [: missing `]'\n").await;
                    return Ok(2);
                }
                let status = test_expr::eval_test(self, rest, io).await?;
                Ok(status)
            }
            "trap" => self.builtin_trap(args, io).await,
            "declare" | "typeset" => self.builtin_declare(args, io).await,
            "local" => self.builtin_local(args, io).await,
            "type" => self.builtin_type(args, io).await,
            "command" => self.builtin_command(args, io).await,
            "let" => self.builtin_let(args, io).await,
            "exit" => {
                let code = args
                    .first()
                    .and_then(|a| a.parse().ok())
                    .unwrap_or(self.state.last_status);
                Err(Flow::Exit(code))
            }
            "return" => {
                if self.func_depth == 0 {
                    self.write_stderr(io, "sh: return: can only `return' from a function or sourced script\n")
                        .await;
                    return Ok(1);
                }
                let code = args
                    .first()
                    .and_then(|a| a.parse().ok())
                    .unwrap_or(self.state.last_status);
                Err(Flow::Return(code))
            }
            "break" | "continue" => {
                if self.loop_depth == 0 {
                    self.write_stderr(io, &format!("sh: {name}: only meaningful in a loop\n"))
                        .await;
                    return Ok(0);
                }
                let level: u32 = args.first().and_then(|a| a.parse().ok()).unwrap_or(1).max(1);
                Err(if name == "break" {
                    Flow::Break(level)
                } else {
                    Flow::Continue(level)
                })
            }
            "which" => self.builtin_which(args, io).await,
            "chmod" => self.builtin_chmod(args, io).await,
            "date" => self.builtin_date(args, io).await,
            "history" => self.builtin_history(args, io).await,
            "curl" => self.builtin_curl(args, io).await,
            "wget" => self.builtin_wget(args, io).await,
            other => {
                self.write_stderr(io, &format!("sh: {other}: not a builtin\n")).await;
                Ok(1)
            }
        }
    }

    async fn builtin_cd(&mut self, args: &[String], io: &Io) -> Result<i32, Flow> {
        let target = match args.first().map(String::as_str) {
            None => self.state.get_var("HOME").unwrap_or("/home/user").to_string(),
            Some("-") => {
                let oldpwd = self.state.get_var("OLDPWD").unwrap_or("/").to_string();
                self.write_stdout(io, &format!("{oldpwd}\n")).await?;
                oldpwd
            }
            Some(path) => path.to_string(),
        };
        // Normalization is lexical: `cd a/..` stays put even when `a`
        // is a symlink.
        let resolved = match vfspath::absolutize(&self.state.pwd(), &target) {
            Ok(resolved) => resolved,
            Err(_) => {
                self.write_stderr(io, &format!("sh: cd: {target}: invalid path\n")).await;
                return Ok(1);
            }
        };
        if !self.vfs.lock().unwrap().is_dir(&resolved) {
            self.write_stderr(io, &format!("sh: cd: {target}: No such file or directory\n"))
                .await;
            return Ok(1);
        }
        let previous = self.state.pwd();
        self.state.set_var("OLDPWD", previous);
        self.state.set_var("PWD", resolved);
        Ok(0)
    }

    async fn builtin_echo(&mut self, args: &[String], io: &Io) -> Result<i32, Flow> {
        let mut newline = true;
        let mut escapes = false;
        let mut idx = 0;
        while idx < args.len() {
            match args[idx].as_str() {
                "-n" => newline = false,
                "-e" => escapes = true,
                "-E" => escapes = false,
                "-ne" | "-en" => {
                    newline = false;
                    escapes = true;
                }
                _ => break,
            }
            idx += 1;
        }
        let mut out = String::new();
        for (n, arg) in args[idx..].iter().enumerate() {
            if n > 0 {
                out.push(' ');
            }
            if escapes {
                let (text, stop) = process_echo_escapes(arg);
                out.push_str(&text);
                if stop {
                    self.write_stdout(io, &out).await?;
                    return Ok(0);
                }
            } else {
                out.push_str(arg);
            }
        }
        if newline {
            out.push('\n');
        }
        self.write_stdout(io, &out).await?;
        Ok(0)
    }

    async fn builtin_export(&mut self, args: &[String], io: &Io) -> Result<i32, Flow> {
        if args.is_empty() || args[0] == "-p" {
            let mut names: Vec<&String> = self.state.exported.iter().collect();
            names.sort();
            let mut out = String::new();
            for name in names {
                match self.state.get_var(name) {
                    Some(value) => out.push_str(&format!("declare -x {name}=\"{value}\"\n")),
                    None => out.push_str(&format!("declare -x {name}\n")),
                }
            }
            self.write_stdout(io, &out).await?;
            return Ok(0);
        }
        for arg in args {
            match arg.split_once('=') {
                Some((name, value)) => {
                    self.state.set_var(name, value);
                    self.state.export(name);
                }
                None => self.state.export(arg),
            }
        }
        Ok(0)
    }

    async fn builtin_unset(&mut self, args: &[String]) -> Result<i32, Flow> {
        let mut funcs_only = false;
        let mut idx = 0;
        while idx < args.len() {
            match args[idx].as_str() {
                "-f" => funcs_only = true,
                "-v" => funcs_only = false,
                _ => break,
            }
            idx += 1;
        }
        for name in &args[idx..] {
            if funcs_only {
                self.state.funcs.remove(name);
            } else {
                self.state.unset_var(name);
                self.state.funcs.remove(name);
            }
        }
        Ok(0)
    }

    async fn builtin_set(&mut self, args: &[String], io: &Io) -> Result<i32, Flow> {
        if args.is_empty() {
            let mut names: Vec<(&String, &String)> = self.state.env.iter().collect();
            names.sort();
            let mut out = String::new();
            for (name, value) in names {
                out.push_str(&format!("{name}={value}\n"));
            }
            self.write_stdout(io, &out).await?;
            return Ok(0);
        }
        let mut idx = 0;
        while idx < args.len() {
            match args[idx].as_str() {
                "-e" => self.state.options.errexit = true,
                "+e" => self.state.options.errexit = false,
                "-u" => self.state.options.nounset = true,
                "+u" => self.state.options.nounset = false,
                "-o" | "+o" => {
                    let enable = args[idx] == "-o";
                    idx += 1;
                    match args.get(idx).map(String::as_str) {
                        Some("errexit") => self.state.options.errexit = enable,
                        Some("nounset") => self.state.options.nounset = enable,
                        Some("pipefail") => self.state.options.pipefail = enable,
                        Some(other) => {
                            self.write_stderr(io, &format!("sh: set: {other}: invalid option name\n"))
                                .await;
                            return Ok(1);
                        }
                        None => {
                            let opts = self.state.options;
                            let render = |on: bool| if on { "on" } else { "off" };
                            self.write_stdout(
                                io,
                                &format!(
                                    "errexit \t{}\nnounset \t{}\npipefail\t{}\n",
                                    render(opts.errexit),
                                    render(opts.nounset),
                                    render(opts.pipefail)
                                ),
                            )
                            .await?;
                        }
                    }
                }
                "--" => {
                    self.state.positional = args[idx + 1..].to_vec();
                    return Ok(0);
                }
                other if other.starts_with('-') || other.starts_with('+') => {
                    self.write_stderr(io, &format!("sh: set: {other}: invalid option\n")).await;
                    return Ok(2);
                }
                _ => {
                    self.state.positional = args[idx..].to_vec();
                    return Ok(0);
                }
            }
            idx += 1;
        }
        Ok(0)
    }

    async fn builtin_shift(&mut self, args: &[String]) -> Result<i32, Flow> {
        let n: usize = args.first().and_then(|a| a.parse().ok()).unwrap_or(1);
        if n > self.state.positional.len() {
            return Ok(1);
        }
        self.state.positional.drain(..n);
        Ok(0)
    }

    async fn builtin_eval(&mut self, args: &[String], io: &Io) -> Result<i32, Flow> {
        let source = args.join(" ");
        if source.trim().is_empty() {
            return Ok(0);
        }
        if self.subst_depth >= crate::expand::MAX_SUBST_DEPTH {
            self.write_stderr(io, "sh: eval: nesting too deep\n").await;
            return Ok(1);
        }
        match parser::parse(&source) {
            Ok(None) => Ok(0),
            Ok(Some(program)) => {
                self.subst_depth += 1;
                let result = self.exec(&program, io).await;
                self.subst_depth -= 1;
                result
            }
            Err(err) => {
                self.write_stderr(io, &format!("sh: eval: {err}\n")).await;
                Ok(2)
            }
        }
    }

    async fn builtin_source(&mut self, args: &[String], io: &Io) -> Result<i32, Flow> {
        let Some(file) = args.first() else {
            self.write_stderr(io, "sh: source: filename argument required\n").await;
            return Ok(2);
        };
        let path = match vfspath::absolutize(&self.state.pwd(), file) {
            Ok(path) => path,
            Err(_) => {
                self.write_stderr(io, &format!("sh: source: {file}: invalid path\n")).await;
                return Ok(1);
            }
        };
        let content = match self.vfs.lock().unwrap().read_file(&path) {
            Ok(content) => content,
            Err(err) => {
                self.write_stderr(io, &format!("sh: source: {file}: {err}\n")).await;
                return Ok(1);
            }
        };
        let source = String::from_utf8_lossy(&content).into_owned();
        let replaced = if args.len() > 1 {
            Some(std::mem::replace(&mut self.state.positional, args[1..].to_vec()))
        } else {
            None
        };
        // Sourced files run in the current shell; `return` works.
        self.func_depth += 1;
        let result = match parser::parse(&source) {
            Ok(None) => Ok(0),
            Ok(Some(program)) => self.exec(&program, io).await,
            Err(err) => {
                self.write_stderr(io, &format!("sh: source: {err}\n")).await;
                Ok(2)
            }
        };
        self.func_depth -= 1;
        if let Some(saved) = replaced {
            self.state.positional = saved;
        }
        match result {
            Err(Flow::Return(code)) => Ok(code),
            other => other,
        }
    }

    async fn builtin_trap(&mut self, args: &[String], io: &Io) -> Result<i32, Flow> {
        if args.is_empty() {
            let mut out = String::new();
            let mut entries: Vec<(&String, &String)> = self.state.traps.iter().collect();
            entries.sort();
            for (signal, body) in entries {
                out.push_str(&format!("trap -- '{body}' {signal}\n"));
            }
            self.write_stdout(io, &out).await?;
            return Ok(0);
        }
        let (action, signals) = args.split_first().expect("non-empty");
        if signals.is_empty() {
            self.write_stderr(io, "sh: trap: usage: trap action signal...\n").await;
            return Ok(2);
        }
        for signal in signals {
            let key = normalize_signal(signal);
            if action == "-" {
                self.state.traps.remove(&key);
            } else {
                self.state.traps.insert(key, action.clone());
            }
        }
        Ok(0)
    }

    async fn builtin_declare(&mut self, args: &[String], io: &Io) -> Result<i32, Flow> {
        let mut make_assoc = false;
        let mut make_indexed = false;
        let mut export = false;
        let mut print = false;
        let mut idx = 0;
        while idx < args.len() {
            match args[idx].as_str() {
                "-A" => make_assoc = true,
                "-a" => make_indexed = true,
                "-x" => export = true,
                "-p" => print = true,
                "-i" => {}
                arg if arg.starts_with('-') => {
                    self.write_stderr(io, &format!("sh: declare: {arg}: invalid option\n")).await;
                    return Ok(2);
                }
                _ => break,
            }
            idx += 1;
        }
        if print || args.len() == idx && !make_assoc && !make_indexed {
            let mut out = String::new();
            let mut names: Vec<(&String, &String)> = self.state.env.iter().collect();
            names.sort();
            for (name, value) in names {
                out.push_str(&format!("declare -- {name}=\"{value}\"\n"));
            }
            self.write_stdout(io, &out).await?;
            return Ok(0);
        }
        for arg in &args[idx..] {
            let (name, value) = match arg.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (arg.as_str(), None),
            };
            if make_assoc {
                self.state.assoc.entry(name.to_string()).or_default();
            } else if make_indexed {
                self.state.arrays.entry(name.to_string()).or_default();
            }
            if let Some(value) = value {
                if make_indexed {
                    self.state
                        .arrays
                        .insert(name.to_string(), vec![value.to_string()]);
                } else if !make_assoc {
                    self.state.set_var(name, value);
                }
            }
            if export {
                self.state.export(name);
            }
        }
        Ok(0)
    }

    async fn builtin_local(&mut self, args: &[String], io: &Io) -> Result<i32, Flow> {
        if self.func_depth == 0 {
            self.write_stderr(io, "sh: local: can only be used in a function\n").await;
            return Ok(1);
        }
        for arg in args {
            match arg.split_once('=') {
                Some((name, value)) => self.state.set_local(name, value),
                None => self.state.set_local(arg, ""),
            }
        }
        Ok(0)
    }

    async fn builtin_type(&mut self, args: &[String], io: &Io) -> Result<i32, Flow> {
        let mut status = 0;
        for name in args {
            if self.state.funcs.contains_key(name) {
                self.write_stdout(io, &format!("{name} is a function\n")).await?;
            } else if is_builtin(name) {
                self.write_stdout(io, &format!("{name} is a shell builtin\n")).await?;
            } else if let Some(path) = self.lookup_in_path(name) {
                self.write_stdout(io, &format!("{name} is {path}\n")).await?;
            } else if self.registry.lookup(name).is_some() {
                self.write_stdout(io, &format!("{name} is a registered tool\n")).await?;
            } else {
                self.write_stderr(io, &format!("sh: type: {name}: not found\n")).await;
                status = 1;
            }
        }
        Ok(status)
    }

    async fn builtin_command(&mut self, args: &[String], io: &Io) -> Result<i32, Flow> {
        let mut idx = 0;
        let mut verify = false;
        while idx < args.len() {
            match args[idx].as_str() {
                "-v" | "-V" => verify = true,
                "--" => {
                    idx += 1;
                    break;
                }
                arg if arg.starts_with('-') => {}
                _ => break,
            }
            idx += 1;
        }
        let Some(name) = args.get(idx) else {
            return Ok(if verify { 1 } else { 0 });
        };
        if verify {
            if is_builtin(name) {
                self.write_stdout(io, &format!("{name}\n")).await?;
                return Ok(0);
            }
            if let Some(path) = self.lookup_in_path(name) {
                self.write_stdout(io, &format!("{path}\n")).await?;
                return Ok(0);
            }
            return Ok(1);
        }
        let rest: Vec<String> = args[idx + 1..].to_vec();
        // Functions are skipped; builtins and externals still resolve.
        if is_builtin(name) {
            let name = name.clone();
            // Boxed to break the async recursion through run_builtin.
            let nested: futures::future::LocalBoxFuture<'_, Result<i32, Flow>> =
                Box::pin(self.run_builtin(&name, &rest, io));
            return nested.await;
        }
        let name = name.clone();
        self.run_external(&name, &rest, io, Vec::new()).await
    }

    async fn builtin_let(&mut self, args: &[String], io: &Io) -> Result<i32, Flow> {
        if args.is_empty() {
            self.write_stderr(io, "sh: let: expression expected\n").await;
            return Ok(1);
        }
        let mut last = 0;
        for expr in args {
            last = match self.arith_eval(expr, io).await {
                Ok(value) => value,
                Err(Flow::Fail(status)) => return Ok(status),
                Err(flow) => return Err(flow),
            };
        }
        Ok(if last != 0 { 0 } else { 1 })
    }

    fn lookup_in_path(&self, name: &str) -> Option<String> {
        if name.contains('/') {
            return None;
        }
        let path_var = self.state.get_var("PATH").unwrap_or("/bin:/usr/bin").to_string();
        let vfs = self.vfs.lock().unwrap();
        for dir in path_var.split(':').filter(|d| !d.is_empty()) {
            let candidate = format!("{dir}/{name}");
            if let Ok(stat) = vfs.stat(&candidate) {
                if stat.kind == wasmbox_vfs::NodeKind::File {
                    return Some(candidate);
                }
            }
        }
        None
    }

    async fn builtin_which(&mut self, args: &[String], io: &Io) -> Result<i32, Flow> {
        let mut status = 1;
        for name in args {
            if let Some(path) = self.lookup_in_path(name) {
                self.write_stdout(io, &format!("{path}\n")).await?;
                status = 0;
            }
        }
        Ok(status)
    }

    async fn builtin_chmod(&mut self, args: &[String], io: &Io) -> Result<i32, Flow> {
        let Some((mode_arg, files)) = args.split_first() else {
            self.write_stderr(io, "sh: chmod: usage: chmod MODE FILE...\n").await;
            return Ok(2);
        };
        if files.is_empty() {
            self.write_stderr(io, "sh: chmod: usage: chmod MODE FILE...\n").await;
            return Ok(2);
        }
        let mut status = 0;
        for file in files {
            let path = match vfspath::absolutize(&self.state.pwd(), file) {
                Ok(path) => path,
                Err(_) => {
                    status = 1;
                    continue;
                }
            };
            let current = match self.vfs.lock().unwrap().stat(&path) {
                Ok(stat) => stat.mode,
                Err(err) => {
                    self.write_stderr(io, &format!("sh: chmod: {file}: {err}\n")).await;
                    status = 1;
                    continue;
                }
            };
            let mode = match parse_mode(mode_arg, current) {
                Some(mode) => mode,
                None => {
                    self.write_stderr(io, &format!("sh: chmod: invalid mode: {mode_arg}\n")).await;
                    return Ok(1);
                }
            };
            if let Err(err) = self.vfs.lock().unwrap().set_mode(&path, mode) {
                self.write_stderr(io, &format!("sh: chmod: {file}: {err}\n")).await;
                status = 1;
            }
        }
        Ok(status)
    }

    async fn builtin_date(&mut self, args: &[String], io: &Io) -> Result<i32, Flow> {
        use chrono::{TimeZone, Utc};
        let nanos = wasmbox_vfs::now_nanos();
        let when = Utc
            .timestamp_opt((nanos / 1_000_000_000) as i64, (nanos % 1_000_000_000) as u32)
            .single()
            .unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().expect("epoch"));
        let text = match args.first() {
            Some(fmt) if fmt.starts_with('+') => when.format(&fmt[1..]).to_string(),
            Some(other) => {
                self.write_stderr(io, &format!("sh: date: invalid argument: {other}\n")).await;
                return Ok(1);
            }
            None => when.format("%a %b %e %H:%M:%S UTC %Y").to_string(),
        };
        self.write_stdout(io, &format!("{text}\n")).await?;
        Ok(0)
    }

    async fn builtin_history(&mut self, args: &[String], io: &Io) -> Result<i32, Flow> {
        if args.first().map(String::as_str) == Some("-c") {
            self.state.history.clear();
            return Ok(0);
        }
        let mut out = String::new();
        for (idx, entry) in self.state.history.iter().enumerate() {
            out.push_str(&format!("{:5}  {entry}\n", idx + 1));
        }
        self.write_stdout(io, &out).await?;
        Ok(0)
    }
}

/// `\n`, `\t` and friends for `echo -e`. The bool reports `\c` (stop).
fn process_echo_escapes(arg: &str) -> (String, bool) {
    let mut out = String::new();
    let chars: Vec<char> = arg.chars().collect();
    let mut idx = 0;
    while idx < chars.len() {
        if chars[idx] != '\\' || idx + 1 >= chars.len() {
            out.push(chars[idx]);
            idx += 1;
            continue;
        }
        idx += 1;
        match chars[idx] {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0c'),
            'v' => out.push('\x0b'),
            'e' => out.push('\x1b'),
            '\\' => out.push('\\'),
            'c' => return (out, true),
            '0' => {
                let mut value = 0u32;
                let mut digits = 0;
                while digits < 3 && idx + 1 < chars.len() && chars[idx + 1].is_digit(8) {
                    idx += 1;
                    value = value * 8 + chars[idx].to_digit(8).expect("octal");
                    digits += 1;
                }
                if let Some(c) = char::from_u32(value) {
                    out.push(c);
                }
            }
            'x' => {
                let mut value = 0u32;
                let mut digits = 0;
                while digits < 2 && idx + 1 < chars.len() && chars[idx + 1].is_ascii_hexdigit() {
                    idx += 1;
                    value = value * 16 + chars[idx].to_digit(16).expect("hex");
                    digits += 1;
                }
                if digits == 0 {
                    out.push_str("\\x");
                } else if let Some(c) = char::from_u32(value) {
                    out.push(c);
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
        idx += 1;
    }
    (out, false)
}

fn normalize_signal(signal: &str) -> String {
    let upper = signal.to_ascii_uppercase();
    upper.strip_prefix("SIG").unwrap_or(&upper).to_string()
}

/// Octal (`755`) or symbolic (`u+x`, `a-w`, `+x`) modes.
fn parse_mode(spec: &str, current: u32) -> Option<u32> {
    if let Ok(octal) = u32::from_str_radix(spec, 8) {
        if octal <= 0o7777 {
            return Some(octal);
        }
        return None;
    }
    let mut mode = current;
    for clause in spec.split(',') {
        let chars: Vec<char> = clause.chars().collect();
        let mut idx = 0;
        let mut who_mask = 0u32;
        while idx < chars.len() {
            match chars[idx] {
                'u' => who_mask |= 0o700,
                'g' => who_mask |= 0o070,
                'o' => who_mask |= 0o007,
                'a' => who_mask |= 0o777,
                _ => break,
            }
            idx += 1;
        }
        if who_mask == 0 {
            who_mask = 0o777;
        }
        let op = *chars.get(idx)?;
        idx += 1;
        let mut perm = 0u32;
        for c in &chars[idx..] {
            match c {
                'r' => perm |= 0o444,
                'w' => perm |= 0o222,
                'x' => perm |= 0o111,
                _ => return None,
            }
        }
        let bits = perm & who_mask;
        match op {
            '+' => mode |= bits,
            '-' => mode &= !bits,
            '=' => mode = (mode & !who_mask) | bits,
            _ => return None,
        }
    }
    Some(mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_covers_the_spec_set() {
        for name in [
            "cd", "pwd", "export", "unset", "set", "shift", "echo", "printf", "read", "eval",
            "source", ".", "getopts", "test", "[", "trap", "declare", "typeset", "type",
            "command", "let", "true", "false", "exit", "return", "break", "continue", "which",
            "chmod", "date", "history", "mapfile", "readarray", "curl", "wget",
        ] {
            assert!(is_builtin(name), "{name} must be a builtin");
        }
        assert!(!is_builtin("ls"));
    }

    #[test]
    fn echo_escape_processing() {
        assert_eq!(process_echo_escapes(r"a\tb\n"), ("a\tb\n".to_string(), false));
        assert_eq!(process_echo_escapes(r"x\cy"), ("x".to_string(), true));
        assert_eq!(process_echo_escapes(r"\061"), ("1".to_string(), false));
        assert_eq!(process_echo_escapes(r"\x41"), ("A".to_string(), false));
    }

    #[test]
    fn mode_parsing_octal_and_symbolic() {
        assert_eq!(parse_mode("755", 0), Some(0o755));
        assert_eq!(parse_mode("+x", 0o644), Some(0o755));
        assert_eq!(parse_mode("u+x", 0o644), Some(0o744));
        assert_eq!(parse_mode("a-w", 0o666), Some(0o444));
        assert_eq!(parse_mode("u=rw", 0o777), Some(0o677));
        assert_eq!(parse_mode("bogus", 0o644), None);
    }

    #[test]
    fn signal_names_normalize() {
        assert_eq!(normalize_signal("sigint"), "INT");
        assert_eq!(normalize_signal("EXIT"), "EXIT");
    }
}
