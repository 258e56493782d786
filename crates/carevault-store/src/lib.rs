// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! carevault-store: the clinical data store.
//!
//! `ClinicalStore` owns every patient-scoped collection, enforces the
//! patient reference and cascade rules, and commits a full encrypted snapshot
//! after each mutation. The legacy importer and the export/backup payloads
//! live here as well.

pub mod export;
pub mod migration;
pub mod records;
pub mod state;
pub mod store;

pub use export::{ImportSummary, to_json_within};
pub use migration::{MigrationOptions, MigrationReport};
pub use store::ClinicalStore;
