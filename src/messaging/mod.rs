// Messaging - User notifications over a lock-free ring buffer

pub mod channels;
pub mod notification;

pub use channels::{NotificationConsumer, NotificationProducer, create_notification_channel};
pub use notification::{Notification, NotificationCategory, NotificationLevel};
