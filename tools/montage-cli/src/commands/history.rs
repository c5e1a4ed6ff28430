//! Edit history commands.

use montage_common::AppConfig;
use montage_edit_history::{EditHistoryManager, HistoryMove};

use crate::HistoryCommand;

pub fn run(config: &AppConfig, command: HistoryCommand) -> anyhow::Result<()> {
    config.validate()?;
    let manager = EditHistoryManager::from_config(&config.history);

    match command {
        HistoryCommand::Push { content_id, state } => {
            let state: serde_json::Value = super::read_json(&state)?;
            let snapshot = manager.append(&content_id, state)?;
            println!("Recorded snapshot {} for {content_id}", snapshot.id);
        }
        HistoryCommand::Undo { content_id } => report(manager.undo(&content_id)?, "undo")?,
        HistoryCommand::Redo { content_id } => report(manager.redo(&content_id)?, "redo")?,
        HistoryCommand::Show { content_id } => super::print_json(&manager.history(&content_id)?)?,
        HistoryCommand::Clear { content_id } => {
            manager.clear(&content_id)?;
            println!("History cleared for {content_id}");
        }
    }
    Ok(())
}

fn report(moved: HistoryMove, action: &str) -> anyhow::Result<()> {
    match moved {
        HistoryMove::Moved(snapshot) => super::print_json(&snapshot.state),
        HistoryMove::AtBoundary => {
            println!("Nothing to {action}");
            Ok(())
        }
    }
}
