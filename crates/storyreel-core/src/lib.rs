//! # storyreel-core
//!
//! Core types and primitives for the Storyreel render pipeline.
//! This crate contains the data model shared by every stage: render
//! requests, the frame clock, frames, artifacts, job states, the error
//! taxonomy, configuration, and content hashing.

pub mod artifact;
pub mod config;
pub mod error;
pub mod frame;
pub mod hash;
pub mod job;
pub mod request;
pub mod time;

pub use config::*;

pub use artifact::{Artifact, ArtifactStats};
pub use error::{RenderError, RenderResult};
pub use frame::{CollectingSink, Frame, FrameSink, ImageFormat};
pub use hash::{ContentHash, FrameSequenceHasher};
pub use job::JobState;
pub use request::{RenderRequest, RenderSource, RenderStrategy};
pub use time::FrameTiming;
