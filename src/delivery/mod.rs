pub mod http;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::DeliveryError;
use crate::models::Envelope;

pub use http::HttpDelivery;

/// Anything a queue can carry.
pub trait Payload: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Payload for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Transmits one payload to its destination.
///
/// Implementations only report success or failure; the queue treats every
/// failure as retryable.
#[async_trait]
pub trait Delivery<P: Payload>: Send + Sync {
    async fn deliver(&self, envelope: &Envelope<P>) -> Result<(), DeliveryError>;
}

#[async_trait]
impl<P: Payload, D: Delivery<P> + ?Sized> Delivery<P> for std::sync::Arc<D> {
    async fn deliver(&self, envelope: &Envelope<P>) -> Result<(), DeliveryError> {
        (**self).deliver(envelope).await
    }
}
