use std::path::Path;

use chrono::{DateTime, Local};
use ontable_core::config::SessionConfig;
use ontable_core::db::{Database, DecisionRepository, SqliteDecisionRepository};
use ontable_core::entitlement::EntitlementProvider;
use ontable_core::room::{SessionError, SessionEvent, SessionSnapshot};
use ontable_core::{Decision, DecisionId, DecisionOption, OptionId, ParticipantId, Room};
use serde::Serialize;
use tokio::sync::watch;

use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct DecisionListItem {
    pub id: String,
    pub title: String,
    pub options: Vec<String>,
    pub resolved_to: Option<String>,
    pub recommendation: Option<String>,
    pub updated_at: i64,
}

pub fn decision_to_list_item(decision: &Decision) -> DecisionListItem {
    DecisionListItem {
        id: decision.id.to_string(),
        title: decision.title.clone(),
        options: decision.options.iter().map(|o| o.title.clone()).collect(),
        resolved_to: decision.chosen_option().map(|o| o.title.clone()),
        recommendation: decision.recommendation().map(|o| o.title.clone()),
        updated_at: decision.updated_at,
    }
}

pub fn open_database(db_path: &Path) -> Result<Database, CliError> {
    Ok(Database::open(db_path)?)
}

pub fn normalize_decision_identifier(id: &str) -> Result<String, CliError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(CliError::EmptyDecisionId);
    }
    Ok(id.to_ascii_lowercase())
}

/// Find a decision by full id, id prefix, or short id suffix.
pub fn resolve_decision(db: &Database, id: &str) -> Result<Decision, CliError> {
    let needle = normalize_decision_identifier(id)?;
    let repo = SqliteDecisionRepository::new(db.connection());

    if let Ok(exact) = needle.parse::<DecisionId>() {
        if let Some(decision) = repo.load(&exact)? {
            return Ok(decision);
        }
    }

    let mut matches: Vec<Decision> = repo
        .list()?
        .into_iter()
        .filter(|decision| {
            decision.id.as_str().starts_with(&needle) || decision.id.short() == needle
        })
        .collect();

    match matches.len() {
        0 => Err(CliError::DecisionNotFound(id.trim().to_string())),
        1 => Ok(matches.remove(0)),
        _ => {
            let candidates = matches
                .iter()
                .map(|decision| format!("{} ({})", decision.id.short(), decision.title))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousDecisionId(format!(
                "Decision id '{}' is ambiguous: {candidates}",
                id.trim()
            )))
        }
    }
}

pub fn resolve_option<'a>(decision: &'a Decision, needle: &str) -> Result<&'a DecisionOption, CliError> {
    decision
        .find_option(needle)
        .ok_or_else(|| CliError::OptionNotFound(needle.trim().to_string()))
}

/// Wait for a snapshot satisfying `check`, bounded by the connect timeout.
pub async fn wait_until(
    snapshot: &mut watch::Receiver<SessionSnapshot>,
    what: &'static str,
    session: &SessionConfig,
    check: impl FnMut(&SessionSnapshot) -> bool,
) -> Result<(), CliError> {
    tokio::time::timeout(session.connect_timeout(), snapshot.wait_for(check))
        .await
        .map_err(|_| CliError::TimedOut(what))?
        .map_err(|_| SessionError::Shutdown)?;
    Ok(())
}

pub fn check_option_limit(
    entitlements: &impl EntitlementProvider,
    option_count: usize,
) -> Result<(), CliError> {
    match entitlements.option_limit() {
        Some(limit) if option_count > limit => Err(CliError::OptionLimit {
            tier: entitlements.tier(),
            limit,
        }),
        _ => Ok(()),
    }
}

pub fn format_timestamp(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis).map_or_else(
        || "unknown".to_string(),
        |time| time.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
    )
}

pub fn format_decision_row(decision: &Decision) -> String {
    let status = decision
        .chosen_option()
        .map_or_else(|| "open".to_string(), |o| format!("-> {}", o.title));
    format!(
        "{}  {}  [{} options, {}]  {}",
        decision.id.short(),
        decision.title,
        decision.options.len(),
        status,
        format_timestamp(decision.updated_at)
    )
}

/// Options with their factors and score, plus vote counts when a room is given
pub fn format_decision_lines(decision: &Decision, room: Option<&Room>) -> Vec<String> {
    let mut lines = vec![format!("{} ({})", decision.title, decision.id.short())];
    let recommended = decision.recommendation().map(|o| o.id);
    let chosen = decision.chosen_option().map(|o| o.id);
    let tally = room.map(Room::tally).unwrap_or_default();

    for option in &decision.options {
        let mut marks = String::new();
        if chosen == Some(option.id) {
            marks.push_str(" [chosen]");
        }
        if recommended == Some(option.id) {
            marks.push_str(" [recommended]");
        }
        let votes = tally
            .iter()
            .find(|(id, _)| *id == option.id)
            .map(|(_, count)| format!("  votes: {count}"))
            .unwrap_or_default();
        lines.push(format!(
            "  {} {:<24} score {:+}{votes}{marks}",
            option.id.short(),
            option.title,
            option.score()
        ));
        for factor in option.pros() {
            lines.push(format!("      + {} ({})", factor.text, factor.weight));
        }
        for factor in option.cons() {
            lines.push(format!("      - {} ({})", factor.text, factor.weight));
        }
    }
    lines
}

fn participant_name(room: Option<&Room>, id: &ParticipantId) -> String {
    room.and_then(|room| room.participant(id))
        .map_or_else(|| id.short(), |p| p.display_name.clone())
}

fn option_title(room: Option<&Room>, id: &OptionId) -> String {
    room.and_then(|room| room.decision.option(id))
        .map_or_else(|| id.short(), |o| o.title.clone())
}

/// One line of terminal output per session event
pub fn describe_event(event: &SessionEvent, room: Option<&Room>) -> String {
    match event {
        SessionEvent::HostingStarted { code } => format!("Hosting with code {code}"),
        SessionEvent::HostingFailed { reason } => format!("Could not host: {reason}"),
        SessionEvent::ParticipantJoined(participant) => {
            format!("{} joined", participant.display_name)
        }
        SessionEvent::ParticipantLeft(id) => format!("{} left", participant_name(room, id)),
        SessionEvent::DecisionUpdated(decision) => format!(
            "Decision updated: {} ({} options)",
            decision.title,
            decision.options.len()
        ),
        SessionEvent::VoteRecorded {
            participant_id,
            option_id,
        } => format!(
            "{} voted for {}",
            participant_name(room, participant_id),
            option_title(room, option_id)
        ),
        SessionEvent::JoinSucceeded { host } => format!("Joined {}'s room", host.display_name),
        SessionEvent::JoinFailed(failure) => format!("Join failed: {failure}"),
        SessionEvent::RoomClosed { reason, .. } => format!("Room ended: {reason}"),
    }
}
