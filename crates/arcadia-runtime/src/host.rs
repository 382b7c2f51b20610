//! Host capability detection.
//!
//! The builder is pure; everything it needs to know about the host (device nodes,
//! display sockets, audio sockets) is probed once here and passed in.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Devices and sockets available on the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCapabilities {
    /// GPU render nodes (`/dev/dri/renderD*`).
    pub render_nodes: Vec<PathBuf>,
    /// Input event devices (`/dev/input/event*`).
    pub input_devices: Vec<PathBuf>,
    /// `/dev/uinput`, for virtual gamepads.
    pub uinput: Option<PathBuf>,
    /// `/dev/snd`.
    pub sound: Option<PathBuf>,
    /// X11 socket directory (`/tmp/.X11-unix`).
    pub x11_socket_dir: Option<PathBuf>,
    /// Value of `DISPLAY`.
    pub x11_display: Option<String>,
    /// X authority file, if it exists.
    pub xauthority: Option<PathBuf>,
    /// Wayland compositor socket, if it exists.
    pub wayland_socket: Option<PathBuf>,
    /// PulseAudio native socket, if it exists.
    pub pulse_socket: Option<PathBuf>,
}

impl HostCapabilities {
    /// Probe the running host.
    #[must_use]
    pub fn detect() -> Self {
        Self::detect_in(Path::new("/"), |key| std::env::var(key).ok())
    }

    /// Probe a host rooted at `root`, reading variables through `env`.
    ///
    /// Paths taken from variables (`XAUTHORITY`, `XDG_RUNTIME_DIR`) are used as-is.
    pub fn detect_in(root: &Path, env: impl Fn(&str) -> Option<String>) -> Self {
        let dev = root.join("dev");

        let render_nodes = list_prefixed(&dev.join("dri"), "renderD");
        let input_devices = list_prefixed(&dev.join("input"), "event");
        let uinput = existing(dev.join("uinput"));
        let sound = existing(dev.join("snd"));

        let x11_socket_dir = existing(root.join("tmp").join(".X11-unix"));
        let x11_display = x11_socket_dir
            .as_ref()
            .map(|_| env("DISPLAY").unwrap_or_else(|| ":0".to_string()));
        let xauthority = env("XAUTHORITY").map(PathBuf::from).and_then(existing);

        let runtime_dir = env("XDG_RUNTIME_DIR").map(PathBuf::from);
        let wayland_socket = match (&runtime_dir, env("WAYLAND_DISPLAY")) {
            (Some(dir), Some(name)) if !name.is_empty() => existing(dir.join(name)),
            _ => None,
        };
        let pulse_socket = runtime_dir.and_then(|dir| existing(dir.join("pulse").join("native")));

        let caps = Self {
            render_nodes,
            input_devices,
            uinput,
            sound,
            x11_socket_dir,
            x11_display,
            xauthority,
            wayland_socket,
            pulse_socket,
        };

        tracing::debug!(
            gpu = caps.has_gpu(),
            input_devices = caps.input_devices.len(),
            x11 = caps.x11_socket_dir.is_some(),
            wayland = caps.wayland_socket.is_some(),
            pulse = caps.pulse_socket.is_some(),
            "Detected host capabilities"
        );

        caps
    }

    /// Check if at least one GPU render node is present.
    #[must_use]
    pub fn has_gpu(&self) -> bool {
        !self.render_nodes.is_empty()
    }
}

fn existing(path: PathBuf) -> Option<PathBuf> {
    path.exists().then_some(path)
}

/// Sorted entries of `dir` whose file name starts with `prefix`.
fn list_prefixed(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(prefix))
        .map(|entry| entry.path())
        .collect();
    paths.sort();
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn empty_host_has_nothing() {
        let root = TempDir::new().unwrap();
        let caps = HostCapabilities::detect_in(root.path(), |_| None);
        assert_eq!(caps, HostCapabilities::default());
        assert!(!caps.has_gpu());
    }

    #[test]
    fn detects_devices_and_sockets() {
        let root = TempDir::new().unwrap();
        let r = root.path();
        touch(&r.join("dev/dri/renderD129"));
        touch(&r.join("dev/dri/renderD128"));
        touch(&r.join("dev/dri/card0"));
        touch(&r.join("dev/input/event0"));
        touch(&r.join("dev/input/mice"));
        touch(&r.join("dev/uinput"));
        fs::create_dir_all(r.join("dev/snd")).unwrap();
        fs::create_dir_all(r.join("tmp/.X11-unix")).unwrap();
        touch(&r.join("run/user/1000/wayland-0"));
        touch(&r.join("run/user/1000/pulse/native"));
        touch(&r.join("home/.Xauthority"));

        let vars = HashMap::from([
            ("DISPLAY", ":1".to_string()),
            ("WAYLAND_DISPLAY", "wayland-0".to_string()),
            (
                "XDG_RUNTIME_DIR",
                r.join("run/user/1000").display().to_string(),
            ),
            ("XAUTHORITY", r.join("home/.Xauthority").display().to_string()),
        ]);
        let caps = HostCapabilities::detect_in(r, |k| vars.get(k).cloned());

        assert_eq!(
            caps.render_nodes,
            vec![r.join("dev/dri/renderD128"), r.join("dev/dri/renderD129")]
        );
        assert_eq!(caps.input_devices, vec![r.join("dev/input/event0")]);
        assert!(caps.uinput.is_some());
        assert!(caps.sound.is_some());
        assert_eq!(caps.x11_display.as_deref(), Some(":1"));
        assert!(caps.xauthority.is_some());
        assert_eq!(caps.wayland_socket, Some(r.join("run/user/1000/wayland-0")));
        assert_eq!(
            caps.pulse_socket,
            Some(r.join("run/user/1000/pulse/native"))
        );
    }

    #[test]
    fn missing_wayland_socket_is_absent() {
        let root = TempDir::new().unwrap();
        let runtime_dir = root.path().join("run");
        fs::create_dir_all(&runtime_dir).unwrap();
        let vars = HashMap::from([
            ("WAYLAND_DISPLAY", "wayland-1".to_string()),
            ("XDG_RUNTIME_DIR", runtime_dir.display().to_string()),
        ]);
        let caps = HostCapabilities::detect_in(root.path(), |k| vars.get(k).cloned());
        assert!(caps.wayland_socket.is_none());
        assert!(caps.x11_display.is_none());
    }
}
