use std::path::Path;

use focal_core::config::SyncConfig;
use focal_core::storage::load_or_create_device_id;

use crate::commands::common::open_store;
use crate::error::CliError;

pub async fn run_device(db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path, &SyncConfig::default()).await?;
    let device_id = load_or_create_device_id(&store).await?;
    println!("{device_id}");
    Ok(())
}
