//! Sign, send and confirm
//!
//! Signing and sending happen exactly once per [`Envelope`](crate::tx_builder::Envelope);
//! only the confirmation poll is repeated. See [`pipeline::SubmissionPipeline`].

pub mod commitment;
pub mod pipeline;

pub use commitment::{satisfies, CommitmentState, Observation};
pub use pipeline::{Confirmation, SubmissionPipeline, SubmissionSettings, SubmitOptions};
