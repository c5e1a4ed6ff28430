//! Saved-export commands.

use uuid::Uuid;

use montage_common::{AppConfig, MontageError};
use montage_saved_exports::{SaveRequest, SavedExportManager};

use crate::ExportsCommand;

pub async fn run(config: &AppConfig, command: ExportsCommand) -> anyhow::Result<()> {
    config.validate()?;
    let manager = SavedExportManager::from_config(config);

    match command {
        ExportsCommand::Save {
            owner_id,
            content_id,
            source,
            title,
            quality,
            days,
        } => {
            let saved = manager
                .save(SaveRequest {
                    owner_id,
                    content_id,
                    source,
                    title,
                    quality,
                    expires_in_days: days,
                })
                .await?;
            super::print_json(&saved)?;
        }
        ExportsCommand::List {
            owner_id,
            content_id,
        } => {
            let list = manager.list(&owner_id, content_id.as_deref()).await?;
            super::print_json(&list)?;
        }
        ExportsCommand::Extend { id, owner_id, days } => {
            let updated = manager.extend(parse_id(&id)?, &owner_id, days).await?;
            super::print_json(&updated)?;
        }
        ExportsCommand::Delete { id, owner_id } => {
            match manager.delete(parse_id(&id)?, &owner_id).await? {
                Some(record) => println!("Deleted {}", record.id),
                None => println!("Nothing to delete"),
            }
        }
        ExportsCommand::Sweep => {
            let report = manager.sweep_expired().await?;
            super::print_json(&report)?;
        }
    }
    Ok(())
}

fn parse_id(raw: &str) -> Result<Uuid, MontageError> {
    Uuid::parse_str(raw.trim())
        .map_err(|e| MontageError::validation("id", format!("'{raw}' is not a valid id: {e}")))
}
