use evbus_core::Message;
use evbus_core::topic::TopicResolver;

#[derive(Message)]
#[message(channel = "audit")]
struct Audited<T> {
    #[allow(dead_code)]
    inner: T,
}

fn main() {
    assert_eq!(<Audited<String>>::CHANNEL, Some("audit"));

    // 未声明主题时回退为类型名
    let resolver = TopicResolver::new();
    let topic = resolver.topic_name::<Audited<u32>>();
    assert!(topic.contains("Audited"));
}
