pub mod events;
pub mod kafka_source;
pub mod publisher;

pub use events::{OrderCreated, OrderStatusChanged};
pub use kafka_source::KafkaQueueSource;
pub use publisher::{CreatedEventPublisher, KafkaCreatedPublisher};
