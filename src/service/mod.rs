pub mod classifier;
pub mod reconciler;

pub use classifier::ErrorClass;
pub use reconciler::{Provisioned, ReconcileState, Reconciler, Step};
