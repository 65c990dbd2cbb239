// SPDX-License-Identifier: MIT OR Apache-2.0

//! Indexer module - record ingestion commands

pub mod ingest;
