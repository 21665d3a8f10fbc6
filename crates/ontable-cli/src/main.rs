//! OnTable CLI - weigh decisions alone or decide together in a room
//!
//! Decisions live in a local `SQLite` file; rooms run over the local network.

mod cli;
mod commands;
mod config;
mod error;


use std::env;

use clap::{CommandFactory, Parser};
use ontable_core::entitlement::StaticEntitlements;
use ontable_core::models::FactorKind;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::completions::run_completions;
use crate::commands::decisions::{
    run_add_factor, run_delete, run_list, run_new, run_resolve, run_show,
};
use crate::commands::demo::run_demo;
use crate::commands::invite::run_invite;
use crate::commands::room::{run_host, run_join};
use crate::config::{default_config_path, CliConfig, DB_PATH_ENV, DISPLAY_NAME_ENV};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "ontable=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = CliConfig::load_from_path(&config_path).map_err(CliError::Config)?;
    let display_name = config.resolve_display_name(cli.name, env::var(DISPLAY_NAME_ENV).ok());
    let db_path = config.resolve_db_path(cli.db_path, env::var(DB_PATH_ENV).ok());
    let entitlements = StaticEntitlements::new(config.tier);

    match cli.command {
        Some(Commands::New { title, options }) => {
            run_new(&title, &options, &entitlements, &db_path)?;
        }
        Some(Commands::List { json }) => run_list(json, &db_path)?,
        Some(Commands::Show { id, json }) => run_show(&id, json, &db_path)?,
        Some(Commands::Delete { id }) => run_delete(&id, &db_path)?,
        Some(Commands::Pro {
            id,
            option,
            text,
            weight,
        }) => {
            run_add_factor(&id, &option, FactorKind::Pro, &text, weight, &db_path)?;
        }
        Some(Commands::Con {
            id,
            option,
            text,
            weight,
        }) => {
            run_add_factor(&id, &option, FactorKind::Con, &text, weight, &db_path)?;
        }
        Some(Commands::Resolve { id, option }) => {
            run_resolve(&id, &option, &db_path)?;
        }
        Some(Commands::Invite { code, host, decode }) => {
            run_invite(code.as_deref(), host.as_deref(), decode.as_deref())?;
        }
        Some(Commands::Host { id }) => run_host(&id, &display_name, &config, &db_path).await?,
        Some(Commands::Join { code, wait }) => {
            run_join(&code, wait, &display_name, &config).await?;
        }
        Some(Commands::Demo { guests }) => {
            run_demo(guests, &config.session).await?;
        }
        Some(Commands::Completions { shell, output }) => {
            run_completions(shell, output.as_deref())?;
        }
        None => {
            Cli::command().print_help().map_err(CliError::Io)?;
            println!();
        }
    }

    Ok(())
}
