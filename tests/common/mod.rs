use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

/// A scratch directory of synthetic logs for one test.
pub struct Workspace {
    pub dir: PathBuf,
}

impl Workspace {
    pub fn new(label: &str) -> io::Result<Self> {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join("compstat-tests").join(format!(
            "{}-{}-{}",
            std::process::id(),
            id,
            label
        ));
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn write(&self, name: &str, content: &str) -> io::Result<PathBuf> {
        let path = self.path(name);
        fs::write(&path, content)?;
        Ok(path)
    }

    /// An artifact of exactly `len` bytes.
    pub fn artifact(&self, name: &str, len: usize) -> io::Result<PathBuf> {
        let path = self.path(name);
        fs::write(&path, vec![0u8; len])?;
        Ok(path)
    }

    /// Path prefix for per-sample logs, e.g. `<dir>/S1.`.
    pub fn prefix(&self, stem: &str) -> String {
        format!("{}/{stem}.", self.dir.display())
    }
}

pub fn elapsed_log(time: &str) -> String {
    format!(
        "\tCommand being timed: \"tool input.sam\"\n\
         \tUser time (seconds): 1.00\n\
         \tElapsed (wall clock) time (h:mm:ss or m:ss): {time}\n\
         \tMaximum resident set size (kbytes): 2048\n"
    )
}

pub fn deez_log(lines: &str, seq: u64) -> String {
    format!(
        "Written {lines} lines\n\
         FIX: 60 REP: 40]seq: {seq}\n\
         NUC: 1 UNK: 2 OP: 3 LEN: 4 LOC: 5 STI: 5]edits: 20\n\
         IDX: 7 S: 3]readIDs: 10\n\
         mapQual: 12\n"
    )
}

pub fn run_compstat<S: AsRef<std::ffi::OsStr>>(args: &[S]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_compstat"))
        .args(args)
        .env("RUST_LOG", "info")
        .output()
        .expect("failed to run compstat")
}

pub fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "compstat failed: stdout={} stderr={}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

pub fn display(path: &Path) -> String {
    path.display().to_string()
}
