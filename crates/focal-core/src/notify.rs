//! User-facing notices raised by the sync core.

use crate::storage::StorageHealth;

/// Something the user should be told about, once
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// Local storage crossed the warning threshold
    StorageWarning(StorageHealth),
    /// Local storage crossed the critical threshold
    StorageCritical(StorageHealth),
    /// Pending changes could not be saved locally
    PersistenceFailed { message: String },
}

impl Notice {
    /// Human-readable toast text
    pub fn message(&self) -> String {
        match self {
            Self::StorageWarning(health) => format!(
                "Storage is {:.0}% full. Consider syncing or clearing old data.",
                health.percent_used
            ),
            Self::StorageCritical(health) => format!(
                "Storage is almost full ({:.0}%). Offline changes may not be saved.",
                health.percent_used
            ),
            Self::PersistenceFailed { message } => {
                format!("Could not save offline changes: {message}")
            }
        }
    }
}

/// Sink for user-facing notices (toasts, status bars, logs)
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice);
}

/// Notifier that writes notices to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: &Notice) {
        match notice {
            Notice::StorageWarning(_) => tracing::warn!("{}", notice.message()),
            Notice::StorageCritical(_) | Notice::PersistenceFailed { .. } => {
                tracing::error!("{}", notice.message());
            }
        }
    }
}

impl<N: Notifier + ?Sized> Notifier for std::sync::Arc<N> {
    fn notify(&self, notice: &Notice) {
        (**self).notify(notice);
    }
}
