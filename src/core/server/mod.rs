pub mod status;

pub use status::{
    PlayerCounter, ServerProbe, ServerStatus, DEFAULT_AUTH_ADDR, DEFAULT_COUNT_TIMEOUT,
    DEFAULT_PROBE_TIMEOUT, DEFAULT_WORLD_ADDR,
};
