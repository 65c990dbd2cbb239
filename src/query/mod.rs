// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query module - question answering and index status commands

pub mod ask;
pub mod status;
