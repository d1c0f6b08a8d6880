use evbus_core::Message;
use evbus_core::message::MessageKind;

#[derive(Message)]
#[message(topic = "orders.created")]
struct OrderCreated {
    #[allow(dead_code)]
    id: u64,
}

#[derive(Message)]
struct Heartbeat;

fn main() {
    let kind = MessageKind::of::<OrderCreated>();
    assert_eq!(kind.declared_topic(), Some("orders.created"));
    assert_eq!(kind.declared_channel(), None);

    let kind = MessageKind::of::<Heartbeat>();
    assert_eq!(kind.declared_topic(), None);
}
