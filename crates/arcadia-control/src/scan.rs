//! Executable discovery in install directories.
//!
//! After an installer finishes, the install directory is walked to a bounded depth
//! and every file that looks like a launch target is ranked. Shallow native
//! launchers rank first; installer and uninstaller binaries are never returned.
//! The scan is best-effort: unreadable directories are skipped and a missing root
//! yields an empty list.

use std::fs;
use std::path::{Path, PathBuf};

/// Name fragments of helper binaries that are never launch targets.
const EXCLUDED_FRAGMENTS: &[&str] = &[
    "unins",
    "setup",
    "install",
    "redist",
    "vcredist",
    "dxsetup",
    "crashhandler",
    "crashreport",
];

/// Stems that usually name the main launcher.
const PREFERRED_STEMS: &[&str] = &["start", "launch", "launcher", "run", "play", "game"];

/// Return launch candidates under `root`, best first, as `/`-separated paths
/// relative to `root`.
///
/// `max_depth` counts directory levels below `root`; `0` only looks at files
/// directly inside it.
#[must_use]
pub fn scan_executables(root: &Path, max_depth: usize) -> Vec<String> {
    let root_name = root
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let mut found: Vec<(u32, String)> = Vec::new();
    let mut pending: Vec<(PathBuf, usize)> = vec![(root.to_path_buf(), 0)];

    while let Some((dir, depth)) = pending.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };

        for entry in entries.filter_map(std::result::Result::ok) {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            // Symlinks are not followed.
            let Ok(file_type) = entry.file_type() else {
                continue;
            };

            let path = entry.path();
            if file_type.is_dir() {
                if depth < max_depth {
                    pending.push((path, depth + 1));
                }
            } else if file_type.is_file() {
                if let Some(kind) = classify(&path, &name) {
                    let Some(relative) = relative_path(root, &path) else {
                        continue;
                    };
                    found.push((rank(kind, depth, &name, &root_name), relative));
                }
            }
        }
    }

    found.sort();
    found.into_iter().map(|(_, path)| path).collect()
}

/// What kind of launch target a file is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Script,
    NativeBinary,
    AppImage,
    Executable,
    WindowsBinary,
    Native32,
}

impl Kind {
    const fn base_score(self) -> u32 {
        match self {
            Self::Script => 0,
            Self::NativeBinary | Self::AppImage => 1,
            Self::Executable => 2,
            Self::WindowsBinary => 3,
            Self::Native32 => 4,
        }
    }
}

fn classify(path: &Path, name: &str) -> Option<Kind> {
    let lower = name.to_lowercase();
    if EXCLUDED_FRAGMENTS.iter().any(|f| lower.contains(f)) {
        return None;
    }

    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase());
    match extension.as_deref() {
        Some("sh") => Some(Kind::Script),
        Some("x86_64") => Some(Kind::NativeBinary),
        Some("appimage") => Some(Kind::AppImage),
        Some("exe") => Some(Kind::WindowsBinary),
        Some("x86") => Some(Kind::Native32),
        None | Some("bin") if is_executable(path) => Some(Kind::Executable),
        _ => None,
    }
}

fn rank(kind: Kind, depth: usize, name: &str, root_name: &str) -> u32 {
    let stem = name
        .rsplit_once('.')
        .map_or(name, |(stem, _)| stem)
        .to_lowercase();
    let preferred = PREFERRED_STEMS.contains(&stem.as_str())
        || (!root_name.is_empty() && stem == root_name);

    let depth = u32::try_from(depth).unwrap_or(u32::MAX / 16);
    let mut score = depth.saturating_mul(10) + kind.base_score() * 2;
    if !preferred {
        score += 1;
    }
    score
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    fs::metadata(path).is_ok_and(|m| m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn finds_nested_launcher() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "bin/start.sh");
        touch(dir.path(), "data/level1.pak");

        assert_eq!(scan_executables(dir.path(), 4), vec!["bin/start.sh"]);
    }

    #[test]
    fn skips_installers_and_uninstallers() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "setup.exe");
        touch(dir.path(), "unins000.exe");
        touch(dir.path(), "redist/vcredist_x64.exe");
        touch(dir.path(), "Game.exe");

        assert_eq!(scan_executables(dir.path(), 4), vec!["Game.exe"]);
    }

    #[test]
    fn ranks_shallow_native_first() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "windows/game.exe");
        touch(dir.path(), "game.x86_64");
        touch(dir.path(), "game.x86");
        touch(dir.path(), "tools/editor.sh");

        let found = scan_executables(dir.path(), 4);
        assert_eq!(found[0], "game.x86_64");
        assert_eq!(found[1], "game.x86");
        assert!(found.contains(&"windows/game.exe".to_string()));
        assert!(found.contains(&"tools/editor.sh".to_string()));
    }

    #[test]
    fn preferred_names_win_ties() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "zzz.sh");
        touch(dir.path(), "start.sh");

        assert_eq!(scan_executables(dir.path(), 1), vec!["start.sh", "zzz.sh"]);
    }

    #[test]
    fn respects_depth_limit() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a/b/c/deep.sh");

        assert!(scan_executables(dir.path(), 2).is_empty());
        assert_eq!(scan_executables(dir.path(), 3), vec!["a/b/c/deep.sh"]);
    }

    #[test]
    fn hidden_entries_are_ignored() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), ".wine/drive_c/game.exe");
        touch(dir.path(), ".hidden.sh");

        assert!(scan_executables(dir.path(), 4).is_empty());
    }

    #[test]
    fn missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(scan_executables(&dir.path().join("nope"), 4).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn detects_executable_bit() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        touch(dir.path(), "mygame");
        touch(dir.path(), "README");
        fs::set_permissions(dir.path().join("mygame"), fs::Permissions::from_mode(0o755))
            .unwrap();

        assert_eq!(scan_executables(dir.path(), 1), vec!["mygame"]);
    }
}
