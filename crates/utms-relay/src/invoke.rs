use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::InvokeError;
use crate::InvokerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubCommand {
    ScanPorts,
    AutoConnect,
}

impl SubCommand {
    pub fn as_arg(self) -> &'static str {
        match self {
            SubCommand::ScanPorts => "scan_ports",
            SubCommand::AutoConnect => "auto_connect",
        }
    }
}

/// Runs the controller program for operations that need direct serial
/// access (port scan, auto-connect) and hands back its JSON result.
#[derive(Debug, Clone)]
pub struct ProcessInvoker {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    sentinel: Option<String>,
}

impl ProcessInvoker {
    pub fn new(cfg: &InvokerConfig) -> Self {
        Self {
            program: cfg.program.clone(),
            args: cfg.args.clone(),
            timeout: cfg.timeout(),
            sentinel: cfg.sentinel().map(str::to_string),
        }
    }

    pub async fn invoke(&self, sub: SubCommand) -> Result<Value, InvokeError> {
        let res = self.run(sub).await;
        if let Err(e) = &res {
            warn!("invoke {}: {}", sub.as_arg(), e);
        }
        res
    }

    async fn run(&self, sub: SubCommand) -> Result<Value, InvokeError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(sub.as_arg())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        debug!("invoke: {} {:?} {}", self.program, self.args, sub.as_arg());
        // Dropping the output future on timeout kills the child.
        let out = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(res) => res.map_err(|source| InvokeError::Spawn { program: self.program.clone(), source })?,
            Err(_) => return Err(InvokeError::Timeout(self.timeout)),
        };

        let stderr = String::from_utf8_lossy(&out.stderr);
        if !out.status.success() {
            return Err(InvokeError::Exit { code: out.status.code(), stderr: stderr.trim().to_string() });
        }
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            debug!("{}: {}", sub.as_arg(), line);
        }

        extract_result(&String::from_utf8_lossy(&out.stdout), self.sentinel.as_deref())
    }
}

/// Pick the result line out of the process's stdout and parse it.
///
/// With a sentinel, the result is the last line that starts with it; any
/// other output, before or after, is diagnostics. Without one, it is the last
/// non-empty line.
pub fn extract_result(stdout: &str, sentinel: Option<&str>) -> Result<Value, InvokeError> {
    let line = match sentinel {
        Some(tag) => stdout.lines().rev().find_map(|l| l.trim_start().strip_prefix(tag)),
        None => stdout.lines().rev().find(|l| !l.trim().is_empty()),
    }
    .map(str::trim)
    .ok_or(InvokeError::NoOutput)?;

    let value: Value =
        serde_json::from_str(line).map_err(|source| InvokeError::Parse { line: line.to_string(), source })?;
    if !value.is_object() {
        return Err(InvokeError::NotAnObject(line.to_string()));
    }
    Ok(value)
}
