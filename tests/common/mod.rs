use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::json;

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    /// JSON record of the invocation, kept for failed assertions.
    pub log_path: PathBuf,
}

impl CmdResult {
    /// Parse stdout as a single JSON document.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(self.stdout.trim()).unwrap_or_else(|e| {
            panic!(
                "stdout is not JSON ({e}); see {}\n{}",
                self.log_path.display(),
                self.stdout
            )
        })
    }
}

fn cfeed_binary() -> PathBuf {
    std::env::var_os("CARGO_BIN_EXE_cfeed").map_or_else(
        || {
            // target/<profile>/deps/<test> -> target/<profile>/cfeed
            let exe = std::env::current_exe().expect("test executable path");
            let profile_dir = exe
                .parent()
                .and_then(Path::parent)
                .expect("test executable under target/<profile>/deps");
            profile_dir.join(format!("cfeed{}", std::env::consts::EXE_SUFFIX))
        },
        PathBuf::from,
    )
}

fn case_log_path(case_name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("cfeed-cli-cases");
    fs::create_dir_all(&dir).expect("create cli case dir");
    let slug: String = case_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos());
    dir.join(format!("{slug}-{}-{stamp}.json", std::process::id()))
}

/// Run `cfeed` with an isolated HOME and activity logging disabled.
pub fn run_cli_case(case_name: &str, home: &Path, args: &[&str]) -> CmdResult {
    let bin = cfeed_binary();
    let output = Command::new(&bin)
        .args(args)
        .env("HOME", home)
        .env("CFEED_LOGGING_ENABLED", "false")
        .env_remove("CFEED_OUTPUT_FORMAT")
        .env("RUST_BACKTRACE", "1")
        .output()
        .unwrap_or_else(|e| panic!("spawn {}: {e}", bin.display()));

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    let log_path = case_log_path(case_name);
    let record = json!({
        "case": case_name,
        "argv": std::iter::once(bin.display().to_string())
            .chain(args.iter().map(ToString::to_string))
            .collect::<Vec<_>>(),
        "home": home.display().to_string(),
        "exit_code": output.status.code(),
        "stdout": stdout,
        "stderr": stderr,
    });
    fs::write(
        &log_path,
        serde_json::to_vec_pretty(&record).expect("encode case record"),
    )
    .expect("write case record");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}
