// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command-line definitions. Dispatch lives in `main.rs`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[clap(
    name = "carevault",
    version = env!("CARGO_PKG_VERSION"),
    about = "Encrypted local vault for per-patient clinical data"
)]
pub(crate) struct Cli {
    /// Data directory (default: $CAREVAULT_DATA_DIR, then $XDG_DATA_HOME/carevault).
    #[clap(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set.
    #[clap(long, short = 'v', global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Show record counts, revision, config and audit size
    Stats,
    /// Export one patient or the whole store as JSON
    Export {
        /// Patient id; exports everything when omitted
        #[clap(long)]
        patient: Option<String>,
        /// Write to this file instead of stdout
        #[clap(long)]
        out: Option<PathBuf>,
        /// Export the de-identified view only
        #[clap(long)]
        masked: bool,
    },
    /// Replace the store with a backup produced by `export`
    Import {
        file: PathBuf,
        /// Expected SHA-256 of the file; the import is refused on mismatch
        #[clap(long)]
        sha256: Option<String>,
    },
    /// Import readings left by the unencrypted format
    Migrate {
        /// Patient that receives readings with no known owner
        #[clap(long)]
        patient: Option<String>,
    },
    /// Show recent audit entries
    Audit {
        #[clap(long, default_value_t = 20)]
        limit: u32,
        /// Only entries for this action, e.g. EXPORT_PATIENT_DATA
        #[clap(long)]
        action: Option<String>,
    },
    /// Delete a patient and every record that references them
    DeletePatient {
        id: String,
        /// Confirm the deletion
        #[clap(long)]
        yes: bool,
    },
    /// Remove every record, the config and the onboarding flags
    Clear {
        /// Confirm the reset
        #[clap(long)]
        yes: bool,
    },
}
