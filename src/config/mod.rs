pub mod loader;
pub mod types;

pub use loader::{get_config_path, load_config, save_config};
pub use types::{PyletConfig, SandboxConfig};
