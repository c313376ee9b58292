// ─── RealmLauncher Core ───
// Client integrity verification and launch engine.
//
// Architecture:
//   core/
//     integrity/      Content hashing, manifest store, verifier
//     client_config/  realmlist.wtf + Config.wtf rewriting
//     auth/           Login result, backend access authorization
//     launch/         Path validation, command builder, orchestrator
//     server/         Auth/world reachability probe
//     download/       Client download seam + disk space gate
//     state/          Persisted launcher settings

pub mod auth;
pub mod cancel;
pub mod client_config;
pub mod download;
pub mod error;
pub mod fsutil;
pub mod http;
pub mod integrity;
pub mod launch;
pub mod server;
pub mod state;
pub mod system;
