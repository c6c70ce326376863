pub mod order;

pub use order::{validate_fields, Money, Order, OrderStatus};
