// Notification channel: the engine pushes, the UI drains

use crate::messaging::notification::Notification;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapRb;

pub type NotificationProducer = ringbuf::HeapProd<Notification>;
pub type NotificationConsumer = ringbuf::HeapCons<Notification>;

pub fn create_notification_channel(
    capacity: usize,
) -> (NotificationProducer, NotificationConsumer) {
    let rb = HeapRb::<Notification>::new(capacity);
    rb.split()
}

/// Push a notification, dropping it when the UI has fallen behind
///
/// Returns false when the channel was full.
pub fn notify(tx: &mut NotificationProducer, notification: Notification) -> bool {
    match tx.try_push(notification) {
        Ok(()) => true,
        Err(dropped) => {
            tracing::warn!(message = %dropped.message, "Notification channel full");
            false
        }
    }
}

/// Take every pending notification
pub fn drain(rx: &mut NotificationConsumer) -> Vec<Notification> {
    rx.pop_iter().collect()
}
