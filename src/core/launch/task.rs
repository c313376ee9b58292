// ─── Launch Task ───
// Builds the platform-specific client command line and spawns the process.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::state::LauncherSettings;

pub const CLIENT_EXECUTABLE: &str = "Wow.exe";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetPlatform {
    Windows,
    Linux,
    MacOs,
}

impl TargetPlatform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            TargetPlatform::MacOs
        } else if cfg!(target_os = "linux") {
            TargetPlatform::Linux
        } else {
            TargetPlatform::Windows
        }
    }
}

/// Compatibility layers the Windows client can be started through on Linux.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Runner {
    Wine,
    PortProton,
    Lutris,
    Proton,
    CrossOver,
}

impl Runner {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "wine" => Some(Runner::Wine),
            "portproton" => Some(Runner::PortProton),
            "lutris" => Some(Runner::Lutris),
            "proton" => Some(Runner::Proton),
            "crossover" => Some(Runner::CrossOver),
            _ => None,
        }
    }

    /// Program plus any arguments that precede the executable path.
    fn prefix(self) -> (&'static str, &'static [&'static str]) {
        match self {
            Runner::Wine => ("wine", &[]),
            Runner::PortProton => ("portproton", &[]),
            Runner::Lutris => ("lutris", &["rungame"]),
            Runner::Proton => ("proton", &["run"]),
            Runner::CrossOver => ("crossover", &[]),
        }
    }
}

/// Fully resolved process invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub current_dir: PathBuf,
}

impl LaunchCommand {
    pub fn to_command(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&self.current_dir);
        cmd
    }

    /// Copy/paste friendly rendering for logs.
    pub fn display(&self) -> String {
        std::iter::once(shell_escape(&self.program.to_string_lossy()))
            .chain(self.args.iter().map(|a| shell_escape(a)))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Client arguments from launch options and graphics settings.
///
/// Launch options are split on whitespace; `-windowed` and explicit
/// `-width`/`-height` are appended after them.
pub fn client_arguments(settings: &LauncherSettings) -> Vec<String> {
    let mut args: Vec<String> = settings
        .game
        .launch_options
        .split_whitespace()
        .map(str::to_string)
        .collect();

    let graphics = &settings.graphics;
    if graphics.windowed {
        args.push("-windowed".into());
    }

    if !graphics.resolution.trim().is_empty() {
        match graphics.dimensions() {
            Some((width, height)) => {
                args.extend([
                    "-width".to_string(),
                    width.to_string(),
                    "-height".to_string(),
                    height.to_string(),
                ]);
            }
            None => warn!(
                "Ignoring malformed resolution {:?}; expected WIDTHxHEIGHT",
                graphics.resolution
            ),
        }
    }

    args
}

/// Assemble the command that starts the client on `platform`.
pub fn build_launch_command(
    settings: &LauncherSettings,
    platform: TargetPlatform,
) -> LauncherResult<LaunchCommand> {
    let game_path = &settings.game.path;
    let exe = game_path.join(CLIENT_EXECUTABLE);
    let exe_str = exe.to_string_lossy().to_string();
    let client_args = client_arguments(settings);

    let (program, args, env) = match platform {
        TargetPlatform::Windows => (exe.clone(), client_args, Vec::new()),
        TargetPlatform::MacOs => {
            let mut args = vec![exe_str, "--args".to_string()];
            args.extend(client_args);
            (PathBuf::from("open"), args, Vec::new())
        }
        TargetPlatform::Linux => {
            let runner = Runner::parse(&settings.game.runner).ok_or_else(|| {
                LauncherError::ProcessSpawn {
                    program: PathBuf::from(&settings.game.runner),
                    detail: format!("unknown runner {:?}", settings.game.runner),
                }
            })?;
            let (program, prefix) = runner.prefix();
            let mut args: Vec<String> = prefix.iter().map(|s| s.to_string()).collect();
            args.push(exe_str);
            args.extend(client_args);

            let mut env = vec![("WINEARCH".to_string(), "win32".to_string())];
            if let Some(prefix) = &settings.game.wineprefix {
                env.push(("WINEPREFIX".to_string(), prefix.to_string_lossy().to_string()));
            }
            (PathBuf::from(program), args, env)
        }
    };

    Ok(LaunchCommand {
        program,
        args,
        env,
        current_dir: game_path.clone(),
    })
}

/// Starts the client process. Returns its PID.
pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, command: &LaunchCommand) -> LauncherResult<u32>;
}

/// Spawns a detached child and reaps it on a background thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSpawner;

impl ProcessSpawner for SystemSpawner {
    fn spawn(&self, command: &LaunchCommand) -> LauncherResult<u32> {
        let mut cmd = command.to_command();
        cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

        debug!("Command (copy/paste): {}", command.display());
        let mut child = cmd.spawn().map_err(|e| LauncherError::ProcessSpawn {
            program: command.program.clone(),
            detail: e.to_string(),
        })?;
        let pid = child.id();
        info!("Client started (PID {})", pid);

        std::thread::spawn(move || match child.wait() {
            Ok(status) if status.success() => info!("Client {} exited normally", pid),
            Ok(status) => warn!("Client {} exited with {:?}", pid, status.code()),
            Err(err) => warn!("Failed waiting for client {}: {}", pid, err),
        });

        Ok(pid)
    }
}

fn shell_escape(raw: &str) -> String {
    if raw.is_empty() {
        return "\"\"".to_string();
    }

    if raw.chars().all(|ch| {
        ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':' | '\\' | '=')
    }) {
        return raw.to_string();
    }

    format!("\"{}\"", raw.replace('"', "\\\""))
}

pub(crate) fn executable_path(game_path: &Path) -> PathBuf {
    game_path.join(CLIENT_EXECUTABLE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::SettingUpdate;

    fn settings() -> LauncherSettings {
        LauncherSettings::default()
            .with_update(SettingUpdate::GamePath(PathBuf::from("/games/wow")))
            .unwrap()
            .with_update(SettingUpdate::LaunchOptions("  -console   -nosound ".into()))
            .unwrap()
            .with_update(SettingUpdate::Windowed(true))
            .unwrap()
            .with_update(SettingUpdate::Resolution("1366x768".into()))
            .unwrap()
    }

    #[test]
    fn arguments_include_options_window_flag_and_dimensions() {
        assert_eq!(
            client_arguments(&settings()),
            vec!["-console", "-nosound", "-windowed", "-width", "1366", "-height", "768"]
        );
    }

    #[test]
    fn malformed_resolution_is_skipped() {
        let mut s = settings();
        s.graphics.resolution = "fullscreen".into();
        s.graphics.windowed = false;
        assert_eq!(client_arguments(&s), vec!["-console", "-nosound"]);
    }

    #[test]
    fn windows_runs_executable_directly() {
        let cmd = build_launch_command(&settings(), TargetPlatform::Windows).unwrap();
        assert_eq!(cmd.program, PathBuf::from("/games/wow").join("Wow.exe"));
        assert_eq!(cmd.args[0], "-console");
        assert!(cmd.env.is_empty());
        assert_eq!(cmd.current_dir, PathBuf::from("/games/wow"));
    }

    #[test]
    fn linux_goes_through_runner_with_wine_env() {
        let s = settings()
            .with_update(SettingUpdate::Runner("Lutris".into()))
            .unwrap()
            .with_update(SettingUpdate::WinePrefix(Some(PathBuf::from("/home/p/.wine32"))))
            .unwrap();
        let cmd = build_launch_command(&s, TargetPlatform::Linux).unwrap();
        assert_eq!(cmd.program, PathBuf::from("lutris"));
        assert_eq!(cmd.args[0], "rungame");
        assert!(cmd.args[1].ends_with("Wow.exe"));
        assert!(cmd.env.contains(&("WINEARCH".into(), "win32".into())));
        assert!(cmd.env.contains(&("WINEPREFIX".into(), "/home/p/.wine32".into())));
    }

    #[test]
    fn unknown_runner_is_a_spawn_error() {
        let s = settings()
            .with_update(SettingUpdate::Runner("dosbox".into()))
            .unwrap();
        let err = build_launch_command(&s, TargetPlatform::Linux).unwrap_err();
        assert_eq!(err.reason(), "could not start process");
    }

    #[test]
    fn macos_uses_open_with_args_separator() {
        let cmd = build_launch_command(&settings(), TargetPlatform::MacOs).unwrap();
        assert_eq!(cmd.program, PathBuf::from("open"));
        assert!(cmd.args[0].ends_with("Wow.exe"));
        assert_eq!(cmd.args[1], "--args");
    }

    #[test]
    fn spawning_a_missing_program_fails_cleanly() {
        let cmd = LaunchCommand {
            program: PathBuf::from("/definitely/not/here/Wow.exe"),
            args: Vec::new(),
            env: Vec::new(),
            current_dir: std::env::temp_dir(),
        };
        let err = SystemSpawner.spawn(&cmd).unwrap_err();
        assert!(matches!(err, LauncherError::ProcessSpawn { .. }));
    }

    #[test]
    fn display_quotes_arguments_with_spaces() {
        let cmd = LaunchCommand {
            program: PathBuf::from("wine"),
            args: vec!["C:/Program Files/WoW/Wow.exe".into(), "-windowed".into()],
            env: Vec::new(),
            current_dir: PathBuf::new(),
        };
        assert_eq!(cmd.display(), "wine \"C:/Program Files/WoW/Wow.exe\" -windowed");
    }
}
