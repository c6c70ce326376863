pub mod created;
pub mod status;

pub use created::OrderCreatedHandler;
pub use status::StatusReconciler;
