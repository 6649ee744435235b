use std::future::Future;

use tokio::sync::mpsc;

use crate::broker::message::Delivery;
use crate::utils::error::TransportError;

/// Destination a subscriber loop pushes deliveries to.
///
/// A failed push ends the subscriber loop; the delivery it carried is gone.
pub trait DeliverySink: Send {
    fn deliver(
        &mut self,
        delivery: &Delivery,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// In-process consumer fed through a channel.
impl DeliverySink for mpsc::Sender<Delivery> {
    async fn deliver(&mut self, delivery: &Delivery) -> Result<(), TransportError> {
        self.send(delivery.clone())
            .await
            .map_err(|_| TransportError::Closed)
    }
}

impl DeliverySink for mpsc::UnboundedSender<Delivery> {
    async fn deliver(&mut self, delivery: &Delivery) -> Result<(), TransportError> {
        self.send(delivery.clone())
            .map_err(|_| TransportError::Closed)
    }
}
