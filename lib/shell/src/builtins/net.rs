//! `curl` and `wget`: gateway-backed builtins. They never spawn guest
//! processes; the network gateway enforces the host allowlist and its
//! policy errors are printed verbatim.

use wasmbox_vfs::path as vfspath;

use crate::exec::{Executor, Flow};
use crate::gateway::{FetchRequest, GatewayError};
use crate::stream::Io;

impl Executor {
    pub(crate) async fn builtin_curl(&mut self, args: &[String], io: &Io) -> Result<i32, Flow> {
        let mut request: Option<FetchRequest> = None;
        let mut output: Option<String> = None;
        let mut method: Option<String> = None;
        let mut headers: Vec<(String, String)> = Vec::new();
        let mut body: Option<Vec<u8>> = None;
        let mut idx = 0;
        while idx < args.len() {
            match args[idx].as_str() {
                "-s" | "-S" | "-L" | "-f" => {}
                "-o" => {
                    idx += 1;
                    output = args.get(idx).cloned();
                }
                "-X" => {
                    idx += 1;
                    method = args.get(idx).cloned();
                }
                "-H" => {
                    idx += 1;
                    if let Some(header) = args.get(idx) {
                        if let Some((key, value)) = header.split_once(':') {
                            headers.push((key.trim().to_string(), value.trim().to_string()));
                        }
                    }
                }
                "-d" | "--data" => {
                    idx += 1;
                    body = args.get(idx).map(|d| d.clone().into_bytes());
                }
                arg if arg.starts_with('-') => {
                    self.write_stderr(io, &format!("sh: curl: unsupported option: {arg}\n")).await;
                    return Ok(2);
                }
                url => request = Some(FetchRequest::get(url)),
            }
            idx += 1;
        }
        let Some(mut request) = request else {
            self.write_stderr(io, "sh: curl: no URL specified\n").await;
            return Ok(2);
        };
        request.headers = headers;
        if let Some(method) = method {
            request.method = method;
        } else if body.is_some() {
            request.method = "POST".to_string();
        }
        request.body = body;

        match self.gateway.fetch(request) {
            Ok(response) => {
                match output {
                    Some(file) => {
                        if let Err(err) = self.save_response(&file, &response.body) {
                            self.write_stderr(io, &format!("sh: curl: {file}: {err}\n")).await;
                            return Ok(1);
                        }
                    }
                    None => {
                        if io.stdout.write_all(&self.vfs, &response.body).await.is_err() {
                            return Ok(1);
                        }
                    }
                }
                Ok(if response.status < 400 { 0 } else { 22 })
            }
            Err(err) => {
                self.write_stderr(io, &format!("curl: {err}\n")).await;
                Ok(1)
            }
        }
    }

    pub(crate) async fn builtin_wget(&mut self, args: &[String], io: &Io) -> Result<i32, Flow> {
        let mut url: Option<String> = None;
        let mut output: Option<String> = None;
        let mut quiet = false;
        let mut idx = 0;
        while idx < args.len() {
            match args[idx].as_str() {
                "-q" => quiet = true,
                "-O" => {
                    idx += 1;
                    output = args.get(idx).cloned();
                }
                arg if arg.starts_with('-') => {
                    self.write_stderr(io, &format!("sh: wget: unsupported option: {arg}\n")).await;
                    return Ok(2);
                }
                candidate => url = Some(candidate.to_string()),
            }
            idx += 1;
        }
        let Some(url) = url else {
            self.write_stderr(io, "sh: wget: missing URL\n").await;
            return Ok(2);
        };

        match self.gateway.fetch(FetchRequest::get(&url)) {
            Ok(response) => {
                let destination = match output.as_deref() {
                    Some("-") => None,
                    Some(file) => Some(file.to_string()),
                    None => Some(basename_of(&url)),
                };
                match destination {
                    None => {
                        if io.stdout.write_all(&self.vfs, &response.body).await.is_err() {
                            return Ok(1);
                        }
                    }
                    Some(file) => {
                        if let Err(err) = self.save_response(&file, &response.body) {
                            self.write_stderr(io, &format!("sh: wget: {file}: {err}\n")).await;
                            return Ok(1);
                        }
                        if !quiet {
                            self.write_stderr(io, &format!("'{file}' saved\n")).await;
                        }
                    }
                }
                Ok(if response.status < 400 { 0 } else { 8 })
            }
            Err(err @ GatewayError::Denied(_)) => {
                self.write_stderr(io, &format!("wget: {err}\n")).await;
                Ok(1)
            }
            Err(err) => {
                self.write_stderr(io, &format!("wget: {err}\n")).await;
                Ok(4)
            }
        }
    }

    fn save_response(&mut self, file: &str, body: &[u8]) -> Result<(), wasmbox_vfs::FsError> {
        let path = vfspath::absolutize(&self.state.pwd(), file)?;
        self.vfs.lock().unwrap().write_file(&path, body.to_vec())
    }
}

fn basename_of(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    let candidate = trimmed
        .rsplit('/')
        .next()
        .unwrap_or("index.html")
        .split('?')
        .next()
        .unwrap_or("index.html");
    if candidate.is_empty() || candidate.contains(':') {
        "index.html".to_string()
    } else {
        candidate.to_string()
    }
}
