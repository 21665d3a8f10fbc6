//! Hosting and joining rooms over the local network.

use std::path::Path;
use std::time::Duration;

use ontable_core::entitlement::{EntitlementProvider, StaticEntitlements};
use ontable_core::room::{Invitation, LanTransport, RoomSession, SessionEvent};
use ontable_core::Room;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::commands::common::{
    check_option_limit, describe_event, format_decision_lines, open_database, resolve_decision,
    wait_until,
};
use crate::config::CliConfig;
use crate::error::CliError;

const GUEST_HELP: &str = "Commands: vote <option>, show, leave, help";

/// Prints events with participant and option names.
///
/// Names are looked up in the room as it was before the event, so a guest
/// who just left can still be named.
#[derive(Default)]
pub struct EventPrinter {
    known: Option<Room>,
}

impl EventPrinter {
    pub fn describe(&mut self, event: &SessionEvent, current: Option<Room>) -> String {
        let context = match event {
            SessionEvent::ParticipantLeft(_) => self.known.as_ref(),
            _ => current.as_ref().or(self.known.as_ref()),
        };
        let line = describe_event(event, context);
        if current.is_some() {
            self.known = current;
        }
        line
    }
}

pub async fn run_host(
    id: &str,
    display_name: &str,
    config: &CliConfig,
    db_path: &Path,
) -> Result<(), CliError> {
    let entitlements = StaticEntitlements::new(config.tier);
    if !entitlements.can_host_room() {
        return Err(CliError::HostingNotIncluded(config.tier));
    }

    let db = open_database(db_path)?;
    let decision = resolve_decision(&db, id)?;
    check_option_limit(&entitlements, decision.options.len())?;

    let (transport, transport_events) = LanTransport::new(display_name, config.lan.clone())?;
    let session = RoomSession::spawn(transport, transport_events, config.session.clone());
    let mut events = session.subscribe();
    let code = session.host(decision).await?;

    println!("Join code: {code}");
    println!("Invite:    {}", Invitation::new(code, display_name).encode());
    println!("Press Ctrl-C to close the room.");

    let mut printer = EventPrinter::default();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => {
                    println!("{}", printer.describe(&event, session.room()));
                    if matches!(
                        event,
                        SessionEvent::RoomClosed { .. } | SessionEvent::HostingFailed { .. }
                    ) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "dropped room events"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    if let Some(room) = session.room() {
        for line in format_decision_lines(&room.decision, Some(&room)) {
            println!("{line}");
        }
    }
    session.stop_hosting().await?;
    session.shutdown().await;
    info!("room closed");
    Ok(())
}

/// A line typed by a guest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuestInput {
    Vote(String),
    Show,
    Leave,
    Help,
    Empty,
}

pub fn parse_guest_input(line: &str) -> Result<GuestInput, String> {
    let line = line.trim();
    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(word, rest)| (word, rest.trim()));

    match word.to_ascii_lowercase().as_str() {
        "" => Ok(GuestInput::Empty),
        "vote" | "v" if rest.is_empty() => Err("Usage: vote <option>".to_string()),
        "vote" | "v" => Ok(GuestInput::Vote(rest.to_string())),
        "show" | "s" => Ok(GuestInput::Show),
        "leave" | "quit" | "q" => Ok(GuestInput::Leave),
        "help" | "?" => Ok(GuestInput::Help),
        other => Err(format!("Unknown command '{other}'. {GUEST_HELP}")),
    }
}

fn print_room(room: Option<&Room>) {
    match room {
        Some(room) => {
            for line in format_decision_lines(&room.decision, Some(room)) {
                println!("{line}");
            }
        }
        None => println!("No room yet"),
    }
}

pub async fn run_join(
    input: &str,
    wait_secs: u64,
    display_name: &str,
    config: &CliConfig,
) -> Result<(), CliError> {
    let code = Invitation::code_from_input(input)?;
    let (transport, transport_events) = LanTransport::new(display_name, config.lan.clone())?;
    let session = RoomSession::spawn(transport, transport_events, config.session.clone());
    let mut events = session.subscribe();

    println!("Looking for room {code}...");
    session
        .join_and_wait(code, Duration::from_secs(wait_secs))
        .await?;
    wait_until(&mut session.watch(), "the room snapshot", &config.session, |snapshot| {
        snapshot.room.is_some()
    })
    .await?;
    print_room(session.room().as_ref());
    println!("{GUEST_HELP}");

    let mut printer = EventPrinter::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut closed = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_guest_input(&line) {
                    Ok(GuestInput::Vote(needle)) => {
                        let option_id = session
                            .room()
                            .and_then(|room| room.decision.find_option(&needle).map(|o| o.id));
                        match option_id {
                            Some(option_id) => {
                                if let Err(error) = session.vote(option_id).await {
                                    println!("{error}");
                                }
                            }
                            None => println!("{}", CliError::OptionNotFound(needle)),
                        }
                    }
                    Ok(GuestInput::Show) => print_room(session.room().as_ref()),
                    Ok(GuestInput::Leave) => break,
                    Ok(GuestInput::Help) => println!("{GUEST_HELP}"),
                    Ok(GuestInput::Empty) => {}
                    Err(message) => println!("{message}"),
                }
            }
            event = events.recv() => match event {
                Ok(event) => {
                    println!("{}", printer.describe(&event, session.room()));
                    if matches!(event, SessionEvent::RoomClosed { .. }) {
                        closed = true;
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "dropped room events"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    if !closed {
        session.leave().await?;
    }
    if let Some(decision) = session.snapshot().last_decision {
        println!("Last known state of '{}':", decision.title);
        for line in format_decision_lines(&decision, None) {
            println!("{line}");
        }
    }
    session.shutdown().await;
    Ok(())
}
