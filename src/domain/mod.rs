mod new_notification;
mod subscription_data;

pub use new_notification::{
    MAX_PAYLOAD_BYTES, NewNotification, NotificationPayload, NotificationRequest, NotificationRequestError,
    Recipients,
};
pub use subscription_data::{SubscriptionData, SubscriptionDataError, WebPushKeys, WebPushSubscription};
