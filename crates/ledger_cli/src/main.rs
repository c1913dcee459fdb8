use std::sync::Arc;

use clap::Parser;
use ledger_cli::cli::{Cli, Command};
use ledger_core::config::{self, ConfigOverrides};
use ledger_core::error::LedgerError;
use ledger_core::ledger::{ArchiveEntry, TaskLedger, parse_iso_date};
use ledger_core::model::{ArchivedPage, ListSelector, Task, TaskPage};
use ledger_core::storage::JsonStore;
use time::{Date, OffsetDateTime, UtcOffset};
use tracing_subscriber::EnvFilter;

fn resolve_date(raw: Option<&str>) -> Result<Date, LedgerError> {
    match raw {
        Some(value) => parse_iso_date(value),
        None => {
            let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
            Ok(OffsetDateTime::now_utc().to_offset(offset).date())
        }
    }
}

fn print_task_line(task: &Task) {
    let mark = if task.done { "x" } else { " " };
    println!("  [{mark}] {} | {}", task.id, task.text);
}

fn print_page_plain(page: &TaskPage) {
    println!("date: {}", page.date);
    println!("shared:");
    for task in &page.shared_tasks {
        print_task_line(task);
    }
    for (uid, tasks) in &page.user_tasks {
        println!("{uid}:");
        for task in tasks {
            print_task_line(task);
        }
    }
}

fn print_history_plain(entries: &[ArchiveEntry]) {
    if entries.is_empty() {
        println!("No archived pages yet");
        return;
    }
    for entry in entries {
        println!(
            "{} | {} | {}",
            entry.key, entry.page.date, entry.page.completed_at
        );
        if !entry.page.shared_tasks.is_empty() {
            println!("shared:");
            for task in &entry.page.shared_tasks {
                print_task_line(task);
            }
        }
        for (uid, tasks) in &entry.page.user_tasks {
            if tasks.is_empty() {
                continue;
            }
            println!("{uid}:");
            for task in tasks {
                print_task_line(task);
            }
        }
    }
}

fn print_task_json(task: &Task) {
    let json = serde_json::json!({
        "id": task.id,
        "text": task.text,
        "done": task.done,
    });
    println!("{}", json);
}

fn to_json(value: &impl serde::Serialize) -> Result<serde_json::Value, LedgerError> {
    serde_json::to_value(value).map_err(|err| LedgerError::storage_unavailable(err.to_string()))
}

fn locate_archived_task(
    page: &ArchivedPage,
    task_id: i64,
) -> Option<(&Task, ListSelector, Option<&str>)> {
    if let Some(task) = page.shared_tasks.iter().find(|task| task.id == task_id) {
        return Some((task, ListSelector::Shared, None));
    }
    for (uid, tasks) in &page.user_tasks {
        if let Some(task) = tasks.iter().find(|task| task.id == task_id) {
            return Some((task, ListSelector::Personal, Some(uid.as_str())));
        }
    }
    None
}

async fn run_command(cli: Cli) -> Result<(), LedgerError> {
    let loaded = config::load_config_with_fallback();
    if let Some(err) = loaded.error {
        tracing::warn!(error = %err, "ignoring unreadable config");
    }
    let overrides = ConfigOverrides {
        pairing_id: cli.pairing.clone(),
        user_id: cli.user.clone(),
    };
    let merged = config::merge_overrides(&loaded.config, &overrides);
    let pairing_id = merged.pairing_id.ok_or_else(|| {
        LedgerError::validation_rejected("pairing id is required (use --pairing or config.json)")
    })?;
    let user_id = merged.user_id.ok_or_else(|| {
        LedgerError::validation_rejected("user id is required (use --user or config.json)")
    })?;

    let store = match cli.store.clone() {
        Some(path) => JsonStore::new(path),
        None => JsonStore::from_env()?,
    };
    let ledger = TaskLedger::new(Arc::new(store), &pairing_id);
    let date = resolve_date(cli.date.as_deref())?;

    match cli.command {
        Command::Show => {
            let page = ledger.load_or_create_page(date, &user_id).await?;
            if cli.json {
                println!("{}", to_json(&page)?);
            } else {
                print_page_plain(&page);
            }
        }
        Command::Add { text, personal } => {
            let text = match text {
                Some(value) if !value.trim().is_empty() => value,
                _ => return Err(LedgerError::validation_rejected("task text is required")),
            };
            let selector = if personal {
                ListSelector::Personal
            } else {
                ListSelector::Shared
            };

            let page = ledger.load_or_create_page(date, &user_id).await?;
            let task = ledger.add_task(&page, selector, &text, &user_id).await?;
            if cli.json {
                print_task_json(&task);
            } else {
                println!("Added task: {} ({})", task.text, task.id);
            }
        }
        Command::Toggle { id, personal } => {
            let (selector, owner) = if personal {
                (ListSelector::Personal, Some(user_id.as_str()))
            } else {
                (ListSelector::Shared, None)
            };

            let page = ledger.load_or_create_page(date, &user_id).await?;
            ledger.toggle_task(&page, selector, id, owner).await?;
            if cli.json {
                println!("{}", serde_json::json!({ "id": id }));
            } else {
                println!("Toggled task: {id}");
            }
        }
        Command::TearOff { force } => {
            let page = ledger.load_or_create_page(date, &user_id).await?;
            if !force && !page.all_done() {
                return Err(LedgerError::validation_rejected(
                    "page still has unfinished tasks (pass --force to archive anyway)",
                ));
            }

            let archived = ledger.tear_off_page(&page).await?;
            if cli.json {
                println!("{}", to_json(&archived)?);
            } else {
                let personal: usize = archived.user_tasks.values().map(Vec::len).sum();
                println!(
                    "Archived page {} ({} shared, {} personal tasks)",
                    archived.date,
                    archived.shared_tasks.len(),
                    personal
                );
            }
        }
        Command::History => {
            let entries = ledger.list_archive().await?;
            if cli.json {
                let payload: Vec<serde_json::Value> = entries
                    .iter()
                    .map(|entry| {
                        Ok(serde_json::json!({
                            "key": entry.key,
                            "page": to_json(&entry.page)?,
                        }))
                    })
                    .collect::<Result<_, LedgerError>>()?;
                println!("{}", serde_json::Value::Array(payload));
            } else {
                print_history_plain(&entries);
            }
        }
        Command::Restore {
            archive_key,
            task_id,
        } => {
            let entries = ledger.list_archive().await?;
            let entry = entries
                .iter()
                .find(|entry| entry.key == archive_key)
                .ok_or_else(|| LedgerError::not_found("archive entry not found"))?;
            let (task, selector, owner) = locate_archived_task(&entry.page, task_id)
                .ok_or_else(|| LedgerError::not_found("archived task not found"))?;

            ledger.load_or_create_page(date, &user_id).await?;
            let restored = ledger.restore_task(date, task, selector, owner).await?;
            if cli.json {
                print_task_json(&restored);
            } else {
                println!("Restored task: {} ({})", restored.text, restored.id);
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run_command(cli).await {
        eprintln!("ERROR: {}", err);
        std::process::exit(1);
    }
}
