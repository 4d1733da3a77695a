//! Prompt templates: built-in defaults, session overrides and rendering.

mod defaults;
mod render;
mod store;

pub use defaults::{default_template, GENERIC_REFINEMENT};
pub use render::{render, Template, TemplateVars};
pub use store::TemplateStore;
