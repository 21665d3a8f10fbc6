//! A complete room played out on an in-memory network.

use ontable_core::config::SessionConfig;
use ontable_core::room::{LocalNetwork, RoomSession};
use ontable_core::{Decision, DecisionOption};
use serde::Serialize;
use tokio::sync::broadcast::error::TryRecvError;

use crate::commands::common::wait_until;
use crate::commands::room::EventPrinter;
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct DemoReport {
    pub code: String,
    pub trace: Vec<String>,
    pub tally: Vec<(String, usize)>,
    pub recommendation: Option<String>,
}

pub fn sample_decision() -> Result<Decision, CliError> {
    let options = vec![
        DecisionOption::new("Pizza")
            .with_pro("Everyone likes it", 4)
            .with_con("Had it last week", 2),
        DecisionOption::new("Sushi")
            .with_pro("Light", 3)
            .with_con("Pricey", 3),
        DecisionOption::new("Tacos")
            .with_pro("Quick", 3)
            .with_pro("Cheap", 2),
    ];
    Ok(Decision::with_options("Where should we eat?", options)?)
}

/// Host `decision` with `guests` simulated devices, each voting for one option.
pub async fn run_demo_with(
    decision: Decision,
    guests: usize,
    config: &SessionConfig,
) -> Result<DemoReport, CliError> {
    let network = LocalNetwork::new();
    let option_ids: Vec<_> = decision.options.iter().map(|o| o.id).collect();

    let (transport, transport_events) = network.endpoint("Host");
    let host = RoomSession::spawn(transport, transport_events, config.clone());
    let mut host_events = host.subscribe();
    let mut host_watch = host.watch();
    let code = host.host(decision).await?;

    let mut sessions = Vec::with_capacity(guests);
    for index in 0..guests {
        let (transport, transport_events) = network.endpoint(format!("Guest {}", index + 1));
        let guest = RoomSession::spawn(transport, transport_events, config.clone());
        guest
            .join_and_wait(code.clone(), config.connect_timeout())
            .await?;
        sessions.push(guest);
    }

    wait_until(&mut host_watch, "guests to arrive", config, |snapshot| {
        snapshot
            .room
            .as_ref()
            .is_some_and(|room| room.participants.len() == guests)
    })
    .await?;

    for (index, guest) in sessions.iter().enumerate() {
        wait_until(&mut guest.watch(), "the room snapshot", config, |snapshot| {
            snapshot.room.is_some()
        })
        .await?;
        if let Some(option_id) = option_ids.get(index % option_ids.len().max(1)) {
            guest.vote(*option_id).await?;
        }
    }
    wait_until(&mut host_watch, "votes", config, |snapshot| {
        snapshot.room.as_ref().is_some_and(|room| {
            room.participants
                .iter()
                .filter(|participant| participant.vote.is_some())
                .count()
                == guests
        })
    })
    .await?;

    let room = host.room();
    host.stop_hosting().await?;

    let mut printer = EventPrinter::default();
    let mut known = room.clone();
    let mut trace = Vec::new();
    loop {
        match host_events.try_recv() {
            Ok(event) => trace.push(printer.describe(&event, known.take())),
            Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }

    for guest in sessions {
        guest.leave().await?;
        guest.shutdown().await;
    }
    host.shutdown().await;

    let (tally, recommendation) = room.map_or_else(
        || (Vec::new(), None),
        |room| {
            let tally = room
                .tally()
                .into_iter()
                .filter_map(|(id, count)| {
                    room.decision.option(&id).map(|o| (o.title.clone(), count))
                })
                .collect();
            let recommendation = room.decision.recommendation().map(|o| o.title.clone());
            (tally, recommendation)
        },
    );

    Ok(DemoReport {
        code: code.to_string(),
        trace,
        tally,
        recommendation,
    })
}

pub async fn run_demo(guests: usize, config: &SessionConfig) -> Result<DemoReport, CliError> {
    let report = run_demo_with(sample_decision()?, guests, config).await?;

    println!("Room {}", report.code);
    for line in &report.trace {
        println!("  {line}");
    }
    println!("Votes:");
    for (title, count) in &report.tally {
        println!("  {title:<12} {count}");
    }
    if let Some(recommendation) = &report.recommendation {
        println!("Recommended by score: {recommendation}");
    }
    Ok(report)
}
