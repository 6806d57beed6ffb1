//! Local storage usage checks

use std::collections::HashSet;

use super::{KeyValueStore, StorageEstimate};
use crate::error::Result;
use crate::notify::{Notice, Notifier};

/// Usage percentage at which the user is warned
pub const WARNING_PERCENT: f64 = 75.0;
/// Usage percentage at which writes are considered at risk
pub const CRITICAL_PERCENT: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageStatus {
    Healthy,
    Warning,
    Critical,
}

impl StorageStatus {
    pub fn from_percent(percent_used: f64) -> Self {
        if percent_used >= CRITICAL_PERCENT {
            Self::Critical
        } else if percent_used >= WARNING_PERCENT {
            Self::Warning
        } else {
            Self::Healthy
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// Snapshot of local storage usage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StorageHealth {
    pub used_bytes: u64,
    pub quota_bytes: u64,
    pub percent_used: f64,
    pub status: StorageStatus,
}

impl StorageHealth {
    #[allow(clippy::cast_precision_loss)]
    pub fn from_usage(used_bytes: u64, quota_bytes: u64) -> Self {
        let percent_used = if quota_bytes == 0 {
            0.0
        } else {
            used_bytes as f64 / quota_bytes as f64 * 100.0
        };
        Self {
            used_bytes,
            quota_bytes,
            percent_used,
            status: StorageStatus::from_percent(percent_used),
        }
    }
}

/// Estimate local storage usage.
///
/// Prefers the backend's own estimate; otherwise sums the size of every
/// stored pair against `fallback_quota_bytes`.
pub async fn check_storage_health<S: KeyValueStore>(
    store: &S,
    fallback_quota_bytes: u64,
) -> Result<StorageHealth> {
    match store.estimate().await {
        Ok(Some(StorageEstimate {
            used_bytes,
            quota_bytes,
        })) if quota_bytes > 0 => {
            return Ok(StorageHealth::from_usage(used_bytes, quota_bytes));
        }
        Ok(_) => {}
        Err(error) => {
            tracing::debug!(
                "Storage estimate unavailable, summing entries instead: {error}"
            );
        }
    }

    let used_bytes = store
        .entries()
        .await?
        .iter()
        .map(|(key, value)| (key.len() + value.len()) as u64)
        .sum();
    Ok(StorageHealth::from_usage(used_bytes, fallback_quota_bytes))
}

/// Storage checker that alerts at most once per tier until reset
#[derive(Debug)]
pub struct StorageMonitor {
    fallback_quota_bytes: u64,
    warned: HashSet<StorageStatus>,
}

impl StorageMonitor {
    pub fn new(fallback_quota_bytes: u64) -> Self {
        Self {
            fallback_quota_bytes,
            warned: HashSet::new(),
        }
    }

    /// Check usage and raise a notice the first time a tier is reached.
    pub async fn check_storage_health<S, N>(
        &mut self,
        store: &S,
        notifier: &N,
    ) -> Result<StorageHealth>
    where
        S: KeyValueStore,
        N: Notifier + ?Sized,
    {
        let health = check_storage_health(store, self.fallback_quota_bytes).await?;
        let notice = match health.status {
            StorageStatus::Healthy => None,
            StorageStatus::Warning => Some(Notice::StorageWarning(health)),
            StorageStatus::Critical => Some(Notice::StorageCritical(health)),
        };
        if let Some(notice) = notice {
            if self.warned.insert(health.status) {
                notifier.notify(&notice);
            }
        }
        Ok(health)
    }

    /// Allow warnings to be shown again
    pub fn reset_storage_warning(&mut self) {
        self.warned.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::storage::MemoryStore;

    #[derive(Default)]
    struct RecordingNotifier {
        notices: Mutex<Vec<Notice>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notice: &Notice) {
            self.notices.lock().unwrap().push(notice.clone());
        }
    }

    #[test]
    fn classifies_thresholds() {
        assert_eq!(
            StorageHealth::from_usage(10, 100).status,
            StorageStatus::Healthy
        );
        assert_eq!(
            StorageHealth::from_usage(75, 100).status,
            StorageStatus::Warning
        );
        assert_eq!(
            StorageHealth::from_usage(90, 100).status,
            StorageStatus::Critical
        );
        assert_eq!(
            StorageHealth::from_usage(5, 0).status,
            StorageStatus::Healthy
        );
    }

    #[tokio::test]
    async fn falls_back_to_summing_entries() {
        let store = MemoryStore::new();
        store.set("ab", "cdef").await.unwrap();
        let health = check_storage_health(&store, 8).await.unwrap();
        assert_eq!(health.used_bytes, 6);
        assert_eq!(health.quota_bytes, 8);
        assert_eq!(health.status, StorageStatus::Warning);
    }

    #[tokio::test]
    async fn prefers_backend_estimate() {
        let store = MemoryStore::with_quota(100);
        store.set("k", "v").await.unwrap();
        let health = check_storage_health(&store, 4).await.unwrap();
        assert_eq!(health.quota_bytes, 100);
        assert_eq!(health.status, StorageStatus::Healthy);
    }

    #[tokio::test]
    async fn warns_once_per_tier_until_reset() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::default();
        let mut monitor = StorageMonitor::new(10);

        store.set("k", "1234567").await.unwrap();
        monitor
            .check_storage_health(&store, &notifier)
            .await
            .unwrap();
        monitor
            .check_storage_health(&store, &notifier)
            .await
            .unwrap();
        assert_eq!(notifier.notices.lock().unwrap().len(), 1);

        store.set("k", "12345678").await.unwrap();
        monitor
            .check_storage_health(&store, &notifier)
            .await
            .unwrap();
        assert!(matches!(
            notifier.notices.lock().unwrap().last(),
            Some(Notice::StorageCritical(_))
        ));

        monitor.reset_storage_warning();
        monitor
            .check_storage_health(&store, &notifier)
            .await
            .unwrap();
        assert_eq!(notifier.notices.lock().unwrap().len(), 3);
    }
}
