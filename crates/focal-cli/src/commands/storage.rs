use std::path::Path;

use serde::Serialize;

use crate::commands::common::{format_storage_health, open_local_service};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct StorageReport {
    status: &'static str,
    used_bytes: u64,
    quota_bytes: u64,
    percent_used: f64,
    pending_mutations: usize,
}

pub async fn run_storage(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let mut service = open_local_service(db_path).await?;
    let health = service.check_storage().await?;

    if as_json {
        let report = StorageReport {
            status: health.status.label(),
            used_bytes: health.used_bytes,
            quota_bytes: health.quota_bytes,
            percent_used: health.percent_used,
            pending_mutations: service.outbox_count(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", format_storage_health(&health));
    println!("Pending mutations: {}", service.outbox_count());
    Ok(())
}
