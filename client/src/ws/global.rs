//! Process-wide manager locator.
//!
//! Features in the same process share one [`ConnectionManager`], and
//! through it one physical channel. The host installs it once at startup;
//! anything that needs live events asks [`global`] for it.

use once_cell::sync::OnceCell;
use tracing::info;

use super::config::ManagerConfig;
use super::error::WsError;
use super::manager::ConnectionManager;

static GLOBAL: OnceCell<ConnectionManager> = OnceCell::new();

/// Installs the process-wide manager.
///
/// # Errors
///
/// Returns [`WsError::AlreadyInstalled`] if a manager is already installed.
pub fn install_global(manager: ConnectionManager) -> Result<(), WsError> {
    GLOBAL
        .set(manager)
        .map_err(|_| WsError::AlreadyInstalled)?;
    info!("installed process-wide connection manager");
    Ok(())
}

/// Returns the process-wide manager, if one is installed.
#[must_use]
pub fn global() -> Option<ConnectionManager> {
    GLOBAL.get().cloned()
}

/// Returns the process-wide manager, installing one built from `config` on
/// first use.
///
/// # Errors
///
/// Returns an error if no manager is installed and either `config` is
/// invalid or no Tokio runtime is running.
pub fn global_or_init(config: ManagerConfig) -> Result<ConnectionManager, WsError> {
    GLOBAL
        .get_or_try_init(|| ConnectionManager::new(config))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    // The locator is process-wide, so its whole lifecycle lives in one test.
    #[test]
    fn test_global_lifecycle() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let _guard = runtime.enter();

        assert!(global().is_none());

        let first = global_or_init(ManagerConfig::default()).expect("install");
        assert_eq!(first.config().relay_port, 3002);

        let again = global_or_init(ManagerConfig::default().with_relay_port(4000))
            .expect("already installed");
        assert_eq!(again.config().relay_port, 3002);

        let other = ConnectionManager::with_defaults().expect("manager");
        assert_eq!(install_global(other), Err(WsError::AlreadyInstalled));

        assert!(global().is_some());
    }
}
