//! # Copyflow
//!
//! A staged manuscript-writing pipeline. Seven prompt-driven stages take a
//! client brief to a polished press manuscript:
//!
//! - **Requirements**: distill the client's raw material
//! - **Outline**: plan the manuscript for a type, brand and length
//! - **Style learning** (optional): describe the style of a sample
//! - **Draft**: write the first full draft
//! - **Signature analysis** (optional): find traces of machine writing
//! - **Refinement** (optional): rewrite those traces away
//! - **Final polish**: apply the last editorial instructions
//!
//! Each stage renders a prompt template from the workflow state, sends it to
//! a text-generation service and stores the answer for later stages.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use copyflow::prelude::*;
//!
//! let config = CopyflowConfig::from_file("copyflow.json")?.apply_env()?;
//! let session = Session::from_config(&config)?;
//!
//! session.set_api_key("...")?;
//! session.set_input(StateKey::RequirementsSource, "甲方原始需求……")?;
//! session.run_stage(StageId::Requirements, None).await?;
//! session.advance(StageId::Requirements, StageId::Outline)?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod observability;
pub mod pipeline;
pub mod session;
pub mod state;
pub mod templates;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{CopyflowConfig, GenerationConfig};
    pub use crate::core::{StageId, StageRunStatus, StateKey};
    pub use crate::errors::{
        CopyflowError, ErrorCategory, GatewayError, ProviderErrorKind, StateStoreError,
        TemplateSyntaxError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::gateway::{Credentials, GenerationCapability, GenerationGateway};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{StageExecutor, StageSequencer, Transition};
    pub use crate::session::{Session, SessionSnapshot};
    pub use crate::state::{FileStateStore, MemoryStateStore, StateStore, WorkflowState};
    pub use crate::templates::{Template, TemplateStore, TemplateVars};
    pub use crate::utils::{generate_uuid, iso_timestamp, Timestamp};
}
