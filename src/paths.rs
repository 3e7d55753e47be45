use std::path::PathBuf;

/// Default config file: `~/.config/vmdeck/vmdeck.toml`
pub fn config_file() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("vmdeck")
        .join("vmdeck.toml")
}

/// Action log: `~/.local/share/vmdeck/vmdeck.log`
pub fn log_file() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("vmdeck")
        .join("vmdeck.log")
}
