//! Command handlers grouped by concern.

mod objects;
mod plan;
mod samples;

pub(crate) use objects::handle_objects;
pub(crate) use plan::handle_plan;
pub(crate) use samples::handle_samples;
