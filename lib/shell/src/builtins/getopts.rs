//! The `getopts` builtin: POSIX option parsing over the positional
//! parameters, driven by `OPTIND`/`OPTARG`.

use crate::exec::{Executor, Flow};
use crate::stream::Io;

/// Internal cursor inside a grouped option token (`-abc`). Lives next to
/// `OPTIND` in the environment so subshell clones stay consistent.
const OPTPOS_VAR: &str = "__SH_OPTPOS";

impl Executor {
    pub(crate) async fn builtin_getopts(&mut self, args: &[String], io: &Io) -> Result<i32, Flow> {
        let (optstring, name) = match (args.first(), args.get(1)) {
            (Some(optstring), Some(name)) => (optstring.clone(), name.clone()),
            _ => {
                self.write_stderr(io, "sh: getopts: usage: getopts optstring name [arg...]\n")
                    .await;
                return Ok(2);
            }
        };
        let silent = optstring.starts_with(':');
        let optstring = optstring.trim_start_matches(':').to_string();
        let operands: Vec<String> = if args.len() > 2 {
            args[2..].to_vec()
        } else {
            self.state.positional.clone()
        };

        let mut optind: usize = self
            .state
            .get_var("OPTIND")
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);
        let mut optpos: usize = self
            .state
            .get_var(OPTPOS_VAR)
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);

        let finish = |exec: &mut Executor, optind: usize| {
            exec.state.set_var("OPTIND", optind.to_string());
            exec.state.unset_var(OPTPOS_VAR);
            exec.state.set_var(&name, "?");
        };

        let Some(token) = operands.get(optind - 1) else {
            finish(self, optind);
            return Ok(1);
        };
        if !token.starts_with('-') || token == "-" {
            finish(self, optind);
            return Ok(1);
        }
        if token == "--" {
            finish(self, optind + 1);
            return Ok(1);
        }

        let flags: Vec<char> = token.chars().skip(1).collect();
        if optpos == 0 || optpos > flags.len() {
            optpos = 1;
        }
        let opt = flags[optpos - 1];
        let wants_arg = optstring
            .char_indices()
            .any(|(idx, c)| c == opt && optstring[idx + 1..].starts_with(':'));
        let known = optstring.contains(opt) && opt != ':';

        // Step past this flag, into the next token when exhausted.
        if optpos < flags.len() {
            optpos += 1;
        } else {
            optind += 1;
            optpos = 1;
        }

        if !known {
            if silent {
                self.state.set_var(&name, "?");
                self.state.set_var("OPTARG", opt.to_string());
            } else {
                self.write_stderr(io, &format!("sh: getopts: illegal option -- {opt}\n")).await;
                self.state.set_var(&name, "?");
                self.state.unset_var("OPTARG");
            }
            self.state.set_var("OPTIND", optind.to_string());
            self.state.set_var(OPTPOS_VAR, optpos.to_string());
            return Ok(0);
        }

        if wants_arg {
            // Argument: rest of this token, else the next operand.
            let arg = if optpos > 1 {
                let rest: String = flags[optpos - 1..].iter().collect();
                optind += 1;
                optpos = 1;
                Some(rest)
            } else {
                let next = operands.get(optind - 1).cloned();
                if next.is_some() {
                    optind += 1;
                }
                next
            };
            match arg {
                Some(arg) => {
                    self.state.set_var(&name, opt.to_string());
                    self.state.set_var("OPTARG", arg);
                }
                None => {
                    if silent {
                        self.state.set_var(&name, ":");
                        self.state.set_var("OPTARG", opt.to_string());
                    } else {
                        self.write_stderr(
                            io,
                            &format!("sh: getopts: option requires an argument -- {opt}\n"),
                        )
                        .await;
                        self.state.set_var(&name, "?");
                        self.state.unset_var("OPTARG");
                    }
                }
            }
        } else {
            self.state.set_var(&name, opt.to_string());
            self.state.unset_var("OPTARG");
        }
        self.state.set_var("OPTIND", optind.to_string());
        self.state.set_var(OPTPOS_VAR, optpos.to_string());
        Ok(0)
    }
}
