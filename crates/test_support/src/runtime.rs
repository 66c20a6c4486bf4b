use anyhow::{Result, bail};
use std::{
    env,
    os::unix::net::UnixStream,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    sync::OnceLock,
    thread,
    time::Duration,
};

const SOCKET_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Ensure a container runtime socket is available for testcontainers.
///
/// testcontainers talks to the Docker API; when the Docker socket is absent
/// we fall back to Podman and point `DOCKER_HOST` at its socket.
///
/// # Errors
/// Returns an error if no Docker/Podman socket can be found or configured.
pub fn ensure_container_runtime() -> Result<()> {
    static INIT: OnceLock<Result<(), String>> = OnceLock::new();
    match INIT.get_or_init(init_container_runtime) {
        Ok(()) => Ok(()),
        Err(message) => bail!("{message}"),
    }
}

fn init_container_runtime() -> Result<(), String> {
    if let Ok(docker_host) = env::var("DOCKER_HOST") {
        return validate_docker_host(&docker_host);
    }

    let docker_socket = Path::new("/var/run/docker.sock");
    if wait_for_socket(docker_socket, SOCKET_WAIT_TIMEOUT) {
        return Ok(());
    }

    if let Some(path) = find_podman_socket() {
        if wait_for_socket(&path, SOCKET_WAIT_TIMEOUT) {
            set_docker_host(&path);
            return Ok(());
        }
        return Err(format!(
            "Podman socket found at `{}`, but it is not accepting connections. \
             Start `podman.socket` or run `podman system service`.",
            path.display()
        ));
    }

    if let Some(path) = start_podman_service() {
        if wait_for_socket(&path, SOCKET_WAIT_TIMEOUT) {
            set_docker_host(&path);
            return Ok(());
        }
    }

    Err(
        "No container runtime found. Start the Docker daemon, enable `podman.socket`, \
         or set `DOCKER_HOST` to a reachable Docker API socket."
            .to_string(),
    )
}

fn validate_docker_host(docker_host: &str) -> Result<(), String> {
    if let Some(path) = docker_host.strip_prefix("unix://") {
        if wait_for_socket(Path::new(path), SOCKET_WAIT_TIMEOUT) {
            return Ok(());
        }
        return Err(format!(
            "DOCKER_HOST is set to `{docker_host}`, but the socket is not accepting connections."
        ));
    }
    // Non-unix DOCKER_HOST (tcp://...) is taken at face value.
    Ok(())
}

fn wait_for_socket(path: &Path, timeout: Duration) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        if UnixStream::connect(path).is_ok() {
            return true;
        }
        if std::time::Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(100));
    }
}

fn find_podman_socket() -> Option<PathBuf> {
    if let Ok(runtime_dir) = env::var("XDG_RUNTIME_DIR") {
        let candidate = PathBuf::from(runtime_dir).join("podman/podman.sock");
        if candidate.exists() {
            return Some(candidate);
        }
    }

    let rootful = PathBuf::from("/run/podman/podman.sock");
    if rootful.exists() {
        return Some(rootful);
    }

    None
}

fn start_podman_service() -> Option<PathBuf> {
    let runtime_dir = env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| "/tmp".to_string());
    let socket_path = PathBuf::from(&runtime_dir).join("podman/podman.sock");

    let status = Command::new("podman")
        .args([
            "system",
            "service",
            "--time=0",
            &format!("unix://{}", socket_path.display()),
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();

    match status {
        Ok(_) => Some(socket_path),
        Err(_) => None,
    }
}

fn set_docker_host(path: &Path) {
    // Guarded by the OnceLock in ensure_container_runtime, so this env
    // mutation happens once before any container is started.
    env::set_var("DOCKER_HOST", format!("unix://{}", path.display()));
}
