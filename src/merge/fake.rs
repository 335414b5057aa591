//! Scripted stand-in for external programs.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::merge::tools::{Invocation, Toolchain};

type Script = dyn Fn(&Invocation) -> io::Result<Option<i32>> + Send + Sync;

/// Answers every call through a script and records it. When a call exits with 0 the
/// fake writes `muxed` to the call's output path, like a real muxer would.
pub struct FakeToolchain {
    script: Box<Script>,
    calls: Mutex<Vec<Invocation>>,
}

impl FakeToolchain {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&Invocation) -> io::Result<Option<i32>> + Send + Sync + 'static,
    {
        Self { script: Box::new(script), calls: Mutex::new(Vec::new()) }
    }

    /// Fixed exit code per tool name; tools not listed cannot be started.
    pub fn with_exit_codes(codes: &[(&str, Option<i32>)]) -> Self {
        let codes: HashMap<String, Option<i32>> =
            codes.iter().map(|(tool, code)| (tool.to_string(), *code)).collect();
        Self::new(move |invocation| match codes.get(&invocation.tool()) {
            Some(code) => Ok(*code),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "not installed")),
        })
    }

    pub fn missing() -> Self {
        Self::with_exit_codes(&[])
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, tool: &str) -> Vec<Invocation> {
        self.calls().into_iter().filter(|call| call.tool() == tool).collect()
    }
}

/// Path a call writes to: the argument after `-o`, otherwise the last argument.
pub fn output_of(invocation: &Invocation) -> Option<PathBuf> {
    let args = &invocation.args;
    match args.iter().position(|arg| arg == "-o") {
        Some(at) => args.get(at + 1).map(PathBuf::from),
        None => args.last().map(PathBuf::from),
    }
}

#[async_trait]
impl Toolchain for FakeToolchain {
    async fn run(&self, invocation: &Invocation) -> io::Result<Option<i32>> {
        self.calls.lock().unwrap().push(invocation.clone());

        let code = (self.script)(invocation)?;
        if code == Some(0) && !invocation.args.iter().any(|arg| arg == "-version") {
            if let Some(output) = output_of(invocation) {
                std::fs::write(output, b"muxed")?;
            }
        }
        Ok(code)
    }
}
