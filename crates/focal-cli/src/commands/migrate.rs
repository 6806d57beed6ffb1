use std::path::Path;

use focal_core::storage::LocalSnapshot;
use focal_core::sync::{generate_id_mapping, needs_migration};

use crate::commands::common::{
    format_mapping_lines, format_progress, open_local_service, open_remote_service,
};
use crate::error::CliError;

pub async fn run_migrate(dry_run: bool, db_path: &Path) -> Result<(), CliError> {
    if dry_run {
        return run_dry_run(db_path).await;
    }

    let mut remote = open_remote_service(db_path).await?;
    let progress = remote
        .service
        .run_migration(Some(&remote.session), |progress| {
            println!("{}", format_progress(progress));
        })
        .await?;

    if progress.total_items == 0 {
        println!("Local data already uses server ids.");
    }
    Ok(())
}

async fn run_dry_run(db_path: &Path) -> Result<(), CliError> {
    let service = open_local_service(db_path).await?;
    let snapshot = LocalSnapshot::load(service.store()).await?;

    if !needs_migration(&snapshot) {
        println!("Nothing to migrate.");
        return Ok(());
    }

    let mapping = generate_id_mapping(&snapshot);
    println!(
        "{} of {} record(s) would get new ids:",
        mapping.remapped_count(),
        snapshot.item_count()
    );
    for line in format_mapping_lines(&mapping) {
        println!("  {line}");
    }
    Ok(())
}
