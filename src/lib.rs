//! vidtools - batch video transcoding on top of ffmpeg
//!
//! Runs the encoder over a list of files one at a time, recovers progress
//! from its plain-text log and reports it to an observer, with cooperative
//! cancellation and per-file failure isolation.

pub mod batch;
pub mod capabilities;
pub mod cli;
pub mod config;
pub mod error;
pub mod media;
pub mod observer;
pub mod operations;
pub mod progress;
pub mod size;
pub mod template;
pub mod timecode;
