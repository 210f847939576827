use snapsync_serde::Serde;

use crate::{messages::message_type::MessageType, transport::DeliveryClass};

/// A typed message with a fixed wire id and delivery class
pub trait NetworkMessage: Serde {
    const MESSAGE_TYPE: MessageType;
    const DELIVERY: DeliveryClass;
}
