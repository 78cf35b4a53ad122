//! TO alert dispatch: subscriptions, device tokens, fan-out of detected events, and
//! reconciliation of transport receipts.

pub mod dispatcher;
pub mod domain;
pub mod repository;
pub mod router;
pub mod subscriptions;
pub mod transport;

#[cfg(test)]
mod tests;

pub use dispatcher::AlertDispatcher;
pub use domain::{
    validate_push_token, AlertPayload, DeliveryStatus, DispatchParams, DispatchReport, NotifyMode,
    PushToken, ReceiptReport, RegisterTokenRequest, SubscribeRequest, ToAlertDelivery,
    ToAlertSubscription,
};
pub use repository::{
    AlertStore, DeliveryRepository, InMemoryAlertStore, PushTokenRepository, SubscribeOutcome,
    SubscriptionRepository,
};
pub use router::alerts_router;
pub use subscriptions::{AlertServiceError, SubscriptionService};
pub use transport::{is_dead_token_reason, NotificationTransport, ReceiptStatus, TransportError};
