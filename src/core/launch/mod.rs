pub mod orchestrator;
pub mod task;
pub mod validate;

pub use orchestrator::{
    LaunchEvent, LaunchFailure, LaunchOrchestrator, LaunchOutcome, LaunchRequest, LaunchState,
    LaunchedClient, OrchestratorConfig,
};
pub use task::{
    build_launch_command, client_arguments, LaunchCommand, ProcessSpawner, Runner, SystemSpawner,
    TargetPlatform, CLIENT_EXECUTABLE,
};
pub use validate::{validate_game_path, CORE_ARCHIVES};
