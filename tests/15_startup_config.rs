use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

/// Start the server binary with `envs` and return its exit status, or `None`
/// if it was still running after `timeout` (it is killed in that case).
fn exit_status(envs: &[(&str, &str)], timeout: Duration) -> Option<ExitStatus> {
    let port = portpicker::pick_unused_port().expect("free port");
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_admin-api-rust"));
    cmd.env_remove("JWT_SECRET")
        .env_remove("APP_ENV")
        .env("ADMIN_API_PORT", port.to_string())
        .env("DATABASE_URL", "")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    for (key, value) in envs {
        cmd.env(key, value);
    }

    let mut child = cmd.spawn().expect("spawn server binary");
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Some(status) = child.try_wait().expect("poll server") {
            return Some(status);
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    let _ = child.kill();
    let _ = child.wait();
    None
}

#[test]
fn refuses_to_start_without_a_secret() {
    let status = exit_status(&[("APP_ENV", "development")], Duration::from_secs(10))
        .expect("server should exit without JWT_SECRET");
    assert!(!status.success());
}

#[test]
fn refuses_to_start_with_unknown_environment() {
    for name in ["prd", "live"] {
        let status = exit_status(&[("APP_ENV", name), ("JWT_SECRET", "startup-test-secret")], Duration::from_secs(10))
            .unwrap_or_else(|| panic!("server should exit for APP_ENV={name}"));
        assert!(!status.success(), "APP_ENV={name}");
    }
}
