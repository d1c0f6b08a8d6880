use evbus_core::Message;

#[derive(Message)]
#[message(topic = "billing.invoice", channel = "billing")]
enum InvoiceEvent {
    #[allow(dead_code)]
    Issued(u64),
    #[allow(dead_code)]
    Voided,
}

fn main() {
    assert_eq!(InvoiceEvent::TOPIC, Some("billing.invoice"));
    assert_eq!(InvoiceEvent::CHANNEL, Some("billing"));
}
