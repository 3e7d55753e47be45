//! Host helper detection.
//!
//! Cloning and CPU-type editing shell out to virt-install's tools. Their
//! presence is probed once; a probe that fails for any reason counts as
//! "not installed".

use std::process::Stdio;

use crate::config::HelpersConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostHelpers {
    /// `virt-clone` (or the configured replacement) is on PATH.
    pub clone: bool,
    /// `virt-xml` (or the configured replacement) is on PATH.
    pub cpu_edit: bool,
}

/// Probe both helpers concurrently.
pub async fn probe(config: &HelpersConfig) -> HostHelpers {
    let (clone, cpu_edit) = tokio::join!(is_installed(&config.clone), is_installed(&config.cpu_edit));
    tracing::debug!(clone, cpu_edit, "host helper probe finished");
    HostHelpers { clone, cpu_edit }
}

/// `which <binary>`; errors and non-zero exits both mean absent.
pub async fn is_installed(binary: &str) -> bool {
    if binary.is_empty() {
        return false;
    }
    match tokio::process::Command::new("which")
        .arg(binary)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
    {
        Ok(status) => status.success(),
        Err(e) => {
            tracing::debug!(binary, "helper probe failed: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_binary_name_is_absent() {
        assert!(!is_installed("").await);
    }

    #[tokio::test]
    async fn missing_binary_is_absent() {
        assert!(!is_installed("vmdeck-definitely-not-a-real-helper").await);
    }

    #[tokio::test]
    async fn probe_reports_missing_helpers_as_unavailable() {
        let config = HelpersConfig {
            clone: "vmdeck-missing-clone".into(),
            cpu_edit: String::new(),
            install: "virt-install".into(),
        };
        assert_eq!(probe(&config).await, HostHelpers::default());
    }
}
