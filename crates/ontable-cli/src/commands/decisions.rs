use std::path::Path;

use ontable_core::db::{DecisionRepository, SqliteDecisionRepository};
use ontable_core::entitlement::StaticEntitlements;
use ontable_core::models::{Factor, FactorKind};
use ontable_core::Decision;

use crate::commands::common::{
    check_option_limit, decision_to_list_item, format_decision_lines, format_decision_row,
    open_database, resolve_decision, resolve_option, DecisionListItem,
};
use crate::error::CliError;

pub fn run_new(
    title: &str,
    options: &[String],
    entitlements: &StaticEntitlements,
    db_path: &Path,
) -> Result<Decision, CliError> {
    let options: Vec<&str> = options
        .iter()
        .map(|option| option.trim())
        .filter(|option| !option.is_empty())
        .collect();
    check_option_limit(entitlements, options.len())?;

    let decision = Decision::new(title.trim(), options)?;
    let db = open_database(db_path)?;
    SqliteDecisionRepository::new(db.connection()).save(&decision)?;

    println!("{}", decision.id);
    Ok(decision)
}

pub fn run_list(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let decisions = SqliteDecisionRepository::new(db.connection()).list()?;

    if as_json {
        let items = decisions
            .iter()
            .map(decision_to_list_item)
            .collect::<Vec<DecisionListItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for decision in &decisions {
            println!("{}", format_decision_row(decision));
        }
    }
    Ok(())
}

pub fn run_show(id: &str, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let decision = resolve_decision(&db, id)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&decision)?);
    } else {
        for line in format_decision_lines(&decision, None) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn run_delete(id: &str, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let decision = resolve_decision(&db, id)?;
    SqliteDecisionRepository::new(db.connection()).delete(&decision.id)?;

    println!("{}", decision.id);
    Ok(())
}

pub fn run_add_factor(
    id: &str,
    option: &str,
    kind: FactorKind,
    text_parts: &[String],
    weight: u8,
    db_path: &Path,
) -> Result<Decision, CliError> {
    let text = text_parts.join(" ").trim().to_string();
    if text.is_empty() {
        return Err(CliError::EmptyFactor);
    }

    let db = open_database(db_path)?;
    let mut decision = resolve_decision(&db, id)?;
    let option_id = resolve_option(&decision, option)?.id;
    if let Some(option) = decision.option_mut(&option_id) {
        option.add_factor(Factor::new(kind, text, weight));
    }
    decision.updated_at = chrono::Utc::now().timestamp_millis();
    SqliteDecisionRepository::new(db.connection()).save(&decision)?;

    for line in format_decision_lines(&decision, None) {
        println!("{line}");
    }
    Ok(decision)
}

pub fn run_resolve(id: &str, option: &str, db_path: &Path) -> Result<Decision, CliError> {
    let db = open_database(db_path)?;
    let mut decision = resolve_decision(&db, id)?;
    let option_id = resolve_option(&decision, option)?.id;
    decision.resolve(&option_id)?;
    SqliteDecisionRepository::new(db.connection()).save(&decision)?;

    if let Some(chosen) = decision.chosen_option() {
        println!("{} -> {}", decision.title, chosen.title);
    }
    Ok(decision)
}
