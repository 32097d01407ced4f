//! Drive `tidal-dl-ng` on a remote host over SSH: classify Tidal URLs, run
//! downloads with streamed output, and inspect or change the tool's settings.

pub mod config;
pub mod error;
pub mod media;
pub mod orchestrator;
pub mod remote;
pub mod tool;
pub mod utils;
