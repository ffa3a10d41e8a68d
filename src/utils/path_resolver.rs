use anyhow::Result;
use std::path::PathBuf;

pub const LOG_DIR_ENV: &str = "DIAGNOSTICO_LOG_DIR";
const LOG_DIR_NAME: &str = "Diagnostico_Log";

/// Resolve log folder (absolute path), creating it if needed
pub fn resolve_log_folder() -> Result<PathBuf> {
    let log_dir = log_folder_candidate(std::env::var_os(LOG_DIR_ENV).map(PathBuf::from));
    std::fs::create_dir_all(&log_dir)
        .map_err(|e| anyhow::anyhow!("Failed to create log folder {:?}: {}", log_dir, e))?;
    Ok(log_dir)
}

/// Override, else the platform local data dir, else the working directory.
fn log_folder_candidate(override_dir: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = override_dir.filter(|d| !d.as_os_str().is_empty()) {
        return dir;
    }

    if let Some(data) = dirs::data_local_dir() {
        return data.join("sst-diagnosis").join(LOG_DIR_NAME);
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    cwd.join(LOG_DIR_NAME)
}

/// Default config file looked up in the working directory
pub fn default_config_file() -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    cwd.join("diagnostico.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_override_wins() {
        let dir = PathBuf::from("/tmp/diag-logs");
        assert_eq!(log_folder_candidate(Some(dir.clone())), dir);
    }

    #[test]
    fn empty_override_is_ignored() {
        let resolved = log_folder_candidate(Some(PathBuf::new()));
        assert!(
            resolved.ends_with(LOG_DIR_NAME),
            "Unexpected fallback: {:?}",
            resolved
        );
    }

    #[test]
    fn default_config_file_is_named_diagnostico_toml() {
        assert!(default_config_file().ends_with("diagnostico.toml"));
    }
}
