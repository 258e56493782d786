// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// CareVault: encrypted local vault for per-patient clinical data.
//
// Entry point. Initialises logging, opens the backend services in the data
// directory, and runs one subcommand.

mod cli;
mod services;

use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;

use carevault_core::error::{CarevaultError, Result};
use carevault_core::human_errors::humanize_error;
use carevault_core::types::RecordId;
use carevault_security::audit::AuditAction;
use carevault_store::MigrationOptions;

use cli::{Cli, Command};
use services::app_services::AppServices;
use services::data_dir;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("CareVault starting");

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            let human = humanize_error(&e);
            eprintln!("{}\n{}", human.message, human.suggestion);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let dir = data_dir::data_dir(cli.data_dir.as_deref())?;

    let options = match &cli.command {
        Command::Migrate { patient } => MigrationOptions {
            target_patient: patient.as_deref().map(RecordId::from),
        },
        _ => MigrationOptions::default(),
    };
    let mut services = AppServices::init(&dir, &options)?;

    match cli.command {
        Command::Stats => print_json(&services.stats()?),
        Command::Export {
            patient,
            out,
            masked,
        } => {
            let bytes = match patient {
                Some(id) => services.export_patient(&RecordId::from(id), masked)?,
                None => services.export_all(masked)?,
            };
            match out {
                Some(path) => {
                    std::fs::write(&path, &bytes)?;
                    println!("wrote {} bytes to {}", bytes.len(), path.display());
                    Ok(())
                }
                None => write_stdout(&bytes),
            }
        }
        Command::Import { file, sha256 } => {
            let summary = services.import_file(&file, sha256.as_deref())?;
            print_json(&summary)
        }
        Command::Migrate { patient } => {
            let target = patient.map(RecordId::from);
            print_json(services.migration_outcome(target.as_ref())?)
        }
        Command::Audit { limit, action } => {
            let action = action.as_deref().map(str::parse::<AuditAction>).transpose()?;
            print_json(&services.audit_entries(limit, action)?)
        }
        Command::DeletePatient { id, yes } => {
            require_confirmation(yes)?;
            let deleted = services.delete_patient(&RecordId::from(id))?;
            println!("{}", if deleted { "patient deleted" } else { "no such patient" });
            Ok(())
        }
        Command::Clear { yes } => {
            require_confirmation(yes)?;
            services.clear_all_data()?;
            println!("all clinical data cleared from {}", services.data_dir().display());
            Ok(())
        }
    }
}

fn require_confirmation(yes: bool) -> Result<()> {
    if yes {
        Ok(())
    } else {
        Err(CarevaultError::InvalidRecord(
            "this permanently removes data; re-run with --yes to confirm".into(),
        ))
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    write_stdout(&bytes)
}

fn write_stdout(bytes: &[u8]) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(bytes)?;
    stdout.flush()?;
    Ok(())
}
