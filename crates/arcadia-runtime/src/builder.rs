//! Launch spec builder.
//!
//! [`build_spec`] turns a game, a platform profile, a launch mode, and the probed
//! host capabilities into a [`ContainerSpec`]. It performs no I/O: the same inputs
//! always produce the same spec.
//!
//! Container layout:
//!
//! ```text
//! /game            game files (play, debug)
//! /installer       installer directory, read-only (install)
//! /install         install target (install)
//! /wineprefix      Wine prefix (wine, proton)
//! /tmp/.X11-unix   X11 socket directory
//! /run/user/1000   Wayland and PulseAudio sockets
//! ```

use std::path::{Component, Path};

use arcadia_core::{GameId, SessionId};

use crate::error::SpecError;
use crate::host::HostCapabilities;
use crate::types::{
    labels, BindMount, ContainerSpec, DeviceMapping, DisplayConfig, DisplayMethod,
    GameDescriptor, LaunchMode, Platform, PlatformKind, ResourceConfig, ResourceLimits,
    WineConfig,
};

/// Default CPU allocation.
pub const DEFAULT_CPUS: f64 = 2.0;

/// Largest CPU limit accepted for a container.
pub const MAX_CPUS: f64 = 1024.0;

/// Default memory limit.
pub const DEFAULT_MEMORY: &str = "4g";

/// Size of `/dev/shm` inside game containers.
pub const DEFAULT_SHM_SIZE: i64 = 1 << 30;

const GAME_DIR: &str = "/game";
const INSTALLER_DIR: &str = "/installer";
const INSTALL_DIR: &str = "/install";
const WINEPREFIX_DIR: &str = "/wineprefix";
const X11_SOCKET_DIR: &str = "/tmp/.X11-unix";
const XAUTHORITY_PATH: &str = "/tmp/.Xauthority";
const CONTAINER_RUNTIME_DIR: &str = "/run/user/1000";
const PULSE_SOCKET: &str = "/run/user/1000/pulse/native";

/// Build a container spec for a launch request.
///
/// Variables set by the builder (display, audio, Wine) take precedence over the
/// caller's `environment`.
///
/// # Errors
///
/// Returns a [`SpecError`] if the resources, display dimensions, executable, or
/// installer path are invalid, or if the platform cannot run in the requested mode.
pub fn build_spec(
    session_id: &SessionId,
    game: &GameDescriptor,
    platform: &Platform,
    mode: &LaunchMode,
    host: &HostCapabilities,
) -> Result<ContainerSpec, SpecError> {
    let config = &game.config;
    let limits = resource_limits(&config.resources)?;
    validate_display(&config.display)?;
    let image = select_image(platform, mode)?;

    let mut spec = ContainerSpec {
        name: container_name(mode, &game.game_id, session_id),
        image,
        entrypoint: None,
        cmd: Vec::new(),
        env: config.environment.clone(),
        binds: Vec::new(),
        devices: Vec::new(),
        labels: [
            (labels::MANAGED, "true".to_string()),
            (labels::SESSION_ID, session_id.to_string()),
            (labels::GAME_ID, game.game_id.to_string()),
            (labels::MODE, mode.as_str().to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect(),
        working_dir: None,
        tty: false,
        open_stdin: false,
        limits,
        shm_size_bytes: Some(DEFAULT_SHM_SIZE),
    };

    apply_mode(&mut spec, game, platform, mode)?;
    apply_gpu(&mut spec, config.devices.gpu, host);
    if config.devices.input {
        apply_input(&mut spec, host);
    }
    if config.devices.audio {
        apply_audio(&mut spec, host);
    }
    apply_display(&mut spec, &config.display, host);

    match &platform.kind {
        PlatformKind::Wine | PlatformKind::Proton => {
            apply_wine(&mut spec, &platform.kind, config.wine.as_ref());
        }
        PlatformKind::Emulator { core } => {
            spec.env.insert("EMULATOR_CORE".into(), core.clone());
        }
        PlatformKind::Native => {}
    }

    Ok(spec)
}

/// Container name: `arcadia-<mode>-<game>-<session prefix>`.
#[must_use]
pub fn container_name(mode: &LaunchMode, game_id: &GameId, session_id: &SessionId) -> String {
    format!("arcadia-{}-{game_id}-{}", mode.as_str(), session_id.short())
}

/// Parse a memory string such as `"4g"`, `"512m"`, `"256k"`, or a byte count.
///
/// A trailing `b` (`"4gb"`) is accepted. Suffixes are binary (`1k = 1024`).
///
/// # Errors
///
/// Returns `SpecError::InvalidMemory` for malformed, zero, or overflowing values.
pub fn parse_memory(value: &str) -> Result<i64, SpecError> {
    let invalid = || SpecError::InvalidMemory(value.to_string());

    let lowered = value.trim().to_ascii_lowercase();
    let body = lowered.strip_suffix('b').unwrap_or(&lowered);
    let (digits, multiplier) = match body.chars().last() {
        Some('k') => (&body[..body.len() - 1], 1i64 << 10),
        Some('m') => (&body[..body.len() - 1], 1i64 << 20),
        Some('g') => (&body[..body.len() - 1], 1i64 << 30),
        Some(c) if c.is_ascii_digit() => (body, 1),
        _ => return Err(invalid()),
    };

    let amount: i64 = digits.parse().map_err(|_| invalid())?;
    if amount <= 0 {
        return Err(invalid());
    }
    amount.checked_mul(multiplier).ok_or_else(invalid)
}

fn resource_limits(resources: &ResourceConfig) -> Result<ResourceLimits, SpecError> {
    let cpu = resources.cpu.unwrap_or(DEFAULT_CPUS);
    if !cpu.is_finite() || cpu <= 0.0 || cpu > MAX_CPUS {
        return Err(SpecError::InvalidCpu(cpu));
    }
    let memory_bytes = parse_memory(resources.memory.as_deref().unwrap_or(DEFAULT_MEMORY))?;

    #[allow(clippy::cast_possible_truncation)]
    let nano_cpus = (cpu * 1e9).round() as i64;

    Ok(ResourceLimits {
        nano_cpus,
        memory_bytes,
    })
}

fn validate_display(display: &DisplayConfig) -> Result<(), SpecError> {
    if display.width == 0 || display.height == 0 {
        return Err(SpecError::InvalidDisplay {
            width: display.width,
            height: display.height,
        });
    }
    Ok(())
}

fn select_image(platform: &Platform, mode: &LaunchMode) -> Result<String, SpecError> {
    let image = match mode {
        LaunchMode::Install { .. } => platform
            .install_image
            .as_deref()
            .filter(|image| !image.trim().is_empty())
            .unwrap_or(&platform.image),
        LaunchMode::Play | LaunchMode::Debug => &platform.image,
    };
    if image.trim().is_empty() {
        return Err(SpecError::MissingImage(platform.id.clone()));
    }
    Ok(image.to_string())
}

/// Command that runs `target` under the platform's compatibility layer.
fn launcher(kind: &PlatformKind, target: String) -> Vec<String> {
    match kind {
        PlatformKind::Native => vec![target],
        PlatformKind::Wine => vec!["wine".into(), target],
        PlatformKind::Proton => vec!["proton".into(), "run".into(), target],
        PlatformKind::Emulator { core } => {
            vec!["retroarch".into(), "-L".into(), core.clone(), target]
        }
    }
}

fn validate_executable(executable: &str) -> Result<(), SpecError> {
    let path = Path::new(executable);
    let relative = !executable.is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    if relative {
        Ok(())
    } else {
        Err(SpecError::InvalidExecutable(executable.to_string()))
    }
}

fn apply_mode(
    spec: &mut ContainerSpec,
    game: &GameDescriptor,
    platform: &Platform,
    mode: &LaunchMode,
) -> Result<(), SpecError> {
    match mode {
        LaunchMode::Play => {
            let executable = game
                .executable
                .as_deref()
                .ok_or(SpecError::MissingExecutable)?;
            validate_executable(executable)?;

            spec.binds.push(BindMount::rw(&game.install_path, GAME_DIR));
            spec.cmd = launcher(&platform.kind, format!("{GAME_DIR}/{executable}"));
            spec.cmd.extend(game.launch_args.iter().cloned());
            spec.working_dir = Some(match Path::new(executable).parent() {
                Some(parent) if !parent.as_os_str().is_empty() => {
                    format!("{GAME_DIR}/{}", parent.display())
                }
                _ => GAME_DIR.to_string(),
            });
        }
        LaunchMode::Install {
            installer_path,
            install_path,
            installer_args,
        } => {
            if matches!(platform.kind, PlatformKind::Emulator { .. }) {
                return Err(SpecError::UnsupportedMode {
                    platform: platform.id.clone(),
                    mode: mode.as_str(),
                });
            }
            let invalid = || SpecError::InvalidInstallerPath(installer_path.clone());
            let file_name = installer_path.file_name().ok_or_else(invalid)?;
            let installer_dir = installer_path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .ok_or_else(invalid)?;

            spec.binds.push(BindMount::ro(installer_dir, INSTALLER_DIR));
            spec.binds.push(BindMount::rw(install_path, INSTALL_DIR));
            spec.cmd = launcher(
                &platform.kind,
                format!("{INSTALLER_DIR}/{}", file_name.to_string_lossy()),
            );
            spec.cmd.extend(installer_args.iter().cloned());
            spec.working_dir = Some(INSTALL_DIR.to_string());
            spec.env.insert("INSTALL_DIR".into(), INSTALL_DIR.into());
        }
        LaunchMode::Debug => {
            spec.binds.push(BindMount::rw(&game.install_path, GAME_DIR));
            spec.entrypoint = Some(vec!["sleep".into(), "infinity".into()]);
            spec.working_dir = Some(GAME_DIR.to_string());
            spec.tty = true;
            spec.open_stdin = true;
        }
    }
    Ok(())
}

fn apply_gpu(spec: &mut ContainerSpec, requested: bool, host: &HostCapabilities) {
    if requested && host.has_gpu() {
        spec.devices.extend(
            host.render_nodes
                .iter()
                .map(|node| DeviceMapping::same_path(node.clone())),
        );
    } else {
        spec.env
            .insert("LIBGL_ALWAYS_SOFTWARE".into(), "1".into());
    }
}

fn apply_input(spec: &mut ContainerSpec, host: &HostCapabilities) {
    spec.devices.extend(
        host.input_devices
            .iter()
            .chain(host.uinput.iter())
            .map(|device| DeviceMapping::same_path(device.clone())),
    );
}

fn apply_audio(spec: &mut ContainerSpec, host: &HostCapabilities) {
    if let Some(socket) = &host.pulse_socket {
        spec.binds.push(BindMount::rw(socket, PULSE_SOCKET));
        spec.env
            .insert("PULSE_SERVER".into(), format!("unix:{PULSE_SOCKET}"));
    }
    if let Some(snd) = &host.sound {
        spec.devices.push(DeviceMapping::same_path(snd.clone()));
    }
}

/// The display method actually used: a requested socket that is absent on the
/// host degrades to headless.
#[must_use]
pub fn effective_display(requested: DisplayMethod, host: &HostCapabilities) -> DisplayMethod {
    match requested {
        DisplayMethod::X11 if host.x11_socket_dir.is_some() => DisplayMethod::X11,
        DisplayMethod::Wayland if host.wayland_socket.is_some() => DisplayMethod::Wayland,
        _ => DisplayMethod::Headless,
    }
}

fn apply_display(spec: &mut ContainerSpec, display: &DisplayConfig, host: &HostCapabilities) {
    let method = effective_display(display.method, host);
    if method != display.method {
        let requested = display.method.as_str();
        tracing::debug!(
            requested = requested,
            "Display socket missing on host, falling back to headless"
        );
    }

    match method {
        DisplayMethod::X11 => {
            if let Some(dir) = &host.x11_socket_dir {
                spec.binds.push(BindMount::rw(dir, X11_SOCKET_DIR));
            }
            spec.env.insert(
                "DISPLAY".into(),
                host.x11_display.clone().unwrap_or_else(|| ":0".into()),
            );
            if let Some(xauthority) = &host.xauthority {
                spec.binds.push(BindMount::ro(xauthority, XAUTHORITY_PATH));
                spec.env
                    .insert("XAUTHORITY".into(), XAUTHORITY_PATH.into());
            }
        }
        DisplayMethod::Wayland => {
            if let Some(socket) = &host.wayland_socket {
                let name = socket
                    .file_name()
                    .map_or_else(|| "wayland-0".to_string(), |n| n.to_string_lossy().into_owned());
                spec.binds.push(BindMount::rw(
                    socket,
                    format!("{CONTAINER_RUNTIME_DIR}/{name}"),
                ));
                spec.env.insert("WAYLAND_DISPLAY".into(), name);
                spec.env
                    .insert("XDG_RUNTIME_DIR".into(), CONTAINER_RUNTIME_DIR.into());
            }
        }
        DisplayMethod::Headless => {}
    }

    spec.env
        .insert("ARCADIA_DISPLAY_METHOD".into(), method.as_str().into());
    spec.env
        .insert("ARCADIA_DISPLAY_WIDTH".into(), display.width.to_string());
    spec.env
        .insert("ARCADIA_DISPLAY_HEIGHT".into(), display.height.to_string());
}

fn apply_wine(spec: &mut ContainerSpec, kind: &PlatformKind, wine: Option<&WineConfig>) {
    spec.env.insert("WINEPREFIX".into(), WINEPREFIX_DIR.into());
    spec.env.insert("WINEARCH".into(), "win64".into());
    if matches!(kind, PlatformKind::Proton) {
        spec.env
            .insert("STEAM_COMPAT_DATA_PATH".into(), WINEPREFIX_DIR.into());
    }

    let Some(wine) = wine else {
        return;
    };
    if let Some(prefix) = &wine.prefix_path {
        spec.binds.push(BindMount::rw(prefix, WINEPREFIX_DIR));
    }
    if let Some(version) = &wine.version {
        spec.env.insert("WINE_VERSION".into(), version.clone());
    }
    if !wine.dll_overrides.is_empty() {
        let overrides = wine
            .dll_overrides
            .iter()
            .map(|(dll, mode)| format!("{dll}={mode}"))
            .collect::<Vec<_>>()
            .join(";");
        spec.env.insert("WINEDLLOVERRIDES".into(), overrides);
    }
}
