//! Test doubles shared across module tests.

use crate::error::{Error, Result};
use crate::exec::{Executor, Invocation};
use crate::sysfs::Sysfs;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

/// A call seen by [`RecordingExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Run(Invocation),
    Spawn(Invocation),
}

type SideEffect = Box<dyn Fn(&Invocation)>;

/// Executor that records calls instead of spawning anything.
#[derive(Default)]
pub struct RecordingExecutor {
    calls: RefCell<Vec<Call>>,
    failing: HashSet<String>,
    side_effect: Option<SideEffect>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any call whose program or first argument matches `name`.
    pub fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    /// Run `f` for every successful synchronous call.
    pub fn with_side_effect(mut self, f: impl Fn(&Invocation) + 'static) -> Self {
        self.side_effect = Some(Box::new(f));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn runs(&self) -> Vec<Invocation> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Call::Run(inv) => Some(inv.clone()),
                Call::Spawn(_) => None,
            })
            .collect()
    }

    pub fn spawns(&self) -> Vec<Invocation> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Call::Spawn(inv) => Some(inv.clone()),
                Call::Run(_) => None,
            })
            .collect()
    }

    fn should_fail(&self, invocation: &Invocation) -> bool {
        let program = invocation.program.to_string_lossy();
        self.failing.contains(program.as_ref())
            || invocation
                .args
                .first()
                .is_some_and(|a| self.failing.contains(a))
    }
}

impl Executor for RecordingExecutor {
    fn run(&self, invocation: &Invocation) -> Result<()> {
        self.calls.borrow_mut().push(Call::Run(invocation.clone()));
        if self.should_fail(invocation) {
            return Err(Error::command_failed(invocation.to_string(), "exit status: 1"));
        }
        if let Some(f) = &self.side_effect {
            f(invocation);
        }
        Ok(())
    }

    fn spawn(&self, invocation: &Invocation) -> Result<u32> {
        self.calls.borrow_mut().push(Call::Spawn(invocation.clone()));
        if self.should_fail(invocation) {
            return Err(Error::command_failed(invocation.to_string(), "spawn failed"));
        }
        Ok(4242)
    }
}

/// In-memory sysfs that counts every access.
#[derive(Default)]
pub struct MemSysfs {
    files: RefCell<HashMap<PathBuf, String>>,
    dirs: RefCell<HashSet<PathBuf>>,
    writes: RefCell<Vec<(PathBuf, Vec<u8>)>>,
    accesses: Cell<usize>,
    short_write: Option<usize>,
    failing_writes: HashSet<PathBuf>,
}

impl MemSysfs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, rel: &str, contents: &str) -> Self {
        self.files
            .borrow_mut()
            .insert(PathBuf::from(rel), contents.to_string());
        self
    }

    pub fn with_dir(self, rel: &str) -> Self {
        self.dirs.borrow_mut().insert(PathBuf::from(rel));
        self
    }

    /// Accept at most `n` bytes per write.
    pub fn with_short_write(mut self, n: usize) -> Self {
        self.short_write = Some(n);
        self
    }

    /// Make writes to `rel` fail with permission denied.
    pub fn with_failing_write(mut self, rel: &str) -> Self {
        self.failing_writes.insert(PathBuf::from(rel));
        self
    }

    pub fn accesses(&self) -> usize {
        self.accesses.get()
    }

    pub fn writes(&self) -> Vec<(PathBuf, Vec<u8>)> {
        self.writes.borrow().clone()
    }

    pub fn writes_to(&self, rel: &str) -> Vec<String> {
        self.writes
            .borrow()
            .iter()
            .filter(|(p, _)| p == Path::new(rel))
            .map(|(_, d)| String::from_utf8_lossy(d).into_owned())
            .collect()
    }

    fn touch(&self) {
        self.accesses.set(self.accesses.get() + 1);
    }
}

impl Sysfs for MemSysfs {
    fn path(&self, rel: &Path) -> PathBuf {
        Path::new("/sys").join(rel)
    }

    fn exists(&self, rel: &Path) -> bool {
        self.touch();
        self.files.borrow().contains_key(rel) || self.dirs.borrow().contains(rel)
    }

    fn read(&self, rel: &Path) -> io::Result<String> {
        self.touch();
        self.files
            .borrow()
            .get(rel)
            .cloned()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn write(&self, rel: &Path, data: &[u8]) -> io::Result<usize> {
        self.touch();
        if !self.files.borrow().contains_key(rel) {
            return Err(io::Error::from(io::ErrorKind::NotFound));
        }
        if self.failing_writes.contains(rel) {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        let n = self.short_write.map_or(data.len(), |cap| cap.min(data.len()));
        self.writes
            .borrow_mut()
            .push((rel.to_path_buf(), data[..n].to_vec()));
        Ok(n)
    }
}

/// Guest used throughout the tests: 4 GiB, 4 vCPUs, unified firmware,
/// virtio graphics.
pub const PIXEL_TOML: &str = r#"[emulator]
path = "/usr/bin/qemu-system-x86_64"

[global]
name = "pixel"
adb_port = 5555
fastboot_port = 5554

[memory]
size = 4096

[vcpu]
num = 4

[firmware]
type = "unified"
path = "/fw/ovmf.fd"

[disk]
path = "/img/pixel.img"

[graphics]
type = "virtio"
"#;
