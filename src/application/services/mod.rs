//! Services implementing the control loop and the redirect path.

pub mod reconciler;
pub mod redirect_service;
pub mod status_writer;

pub use reconciler::{Reconciler, ReconcilerConfig, Requeue};
pub use redirect_service::{RedirectOutcome, RedirectService};
pub use status_writer::StatusWriter;
