use persiqueue::{initialize, HighWaterMark, Strategy};
use tempfile::tempdir;

fn init_with(path: &std::path::Path, subscriber_ids: &[&str]) -> persiqueue::Environment {
    let env = initialize(path).expect("environment open");
    let mut control = env.new_control().expect("control");
    control
        .init(
            Some(subscriber_ids.iter().map(|s| s.to_string()).collect()),
            HighWaterMark::default(),
            Strategy::default(),
        )
        .expect("control init");
    env
}

#[test]
fn receive_acks_on_drop() {
    let dir = tempdir().expect("tempdir");
    let env = init_with(dir.path(), &["sub"]);

    let publisher = env.new_publisher(true).expect("publisher");
    let subscriber = env.new_subscriber().expect("subscriber");
    let id = publisher.send(b"payload").expect("send");

    {
        let received = subscriber.receive("sub", 1, 1).expect("receive");
        assert_eq!(received.message_id(), Some(id.as_str()));
        assert_eq!(received.message(), Some(&b"payload"[..]));
        // guard drops here, acking the message
    }

    let (front_id, front_msg) = subscriber.queue().front("sub").expect("front after ack");
    assert!(front_id.is_none());
    assert!(front_msg.is_none());
}

#[test]
fn receive_times_out_with_no_message_and_ack_is_a_no_op() {
    let dir = tempdir().expect("tempdir");
    let env = init_with(dir.path(), &["sub"]);
    let subscriber = env.new_subscriber().expect("subscriber");

    let received = subscriber.receive("sub", 1, 4).expect("receive times out, not errors");
    assert_eq!(received.message(), None);
    assert_eq!(received.message_id(), None);
    drop(received);

    // Nothing was ever sent, so the inbox is still empty and unharmed.
    let (front_id, front_msg) = subscriber.queue().front("sub").expect("front");
    assert!(front_id.is_none());
    assert!(front_msg.is_none());
}

#[test]
fn receive_acks_even_on_unwind() {
    let dir = tempdir().expect("tempdir");
    let env = init_with(dir.path(), &["sub"]);

    let publisher = env.new_publisher(true).expect("publisher");
    let subscriber = env.new_subscriber().expect("subscriber");
    let id = publisher.send(b"payload").expect("send");

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let received = subscriber.receive("sub", 1, 1).expect("receive");
        assert_eq!(received.message_id(), Some(id.as_str()));
        panic!("simulated failure inside the scope");
    }));
    assert!(result.is_err());

    let (front_id, front_msg) = subscriber.queue().front("sub").expect("front after unwind");
    assert!(front_id.is_none());
    assert!(front_msg.is_none());
}

#[test]
fn receive_to_top_skips_all_but_newest_then_acks_it() {
    let dir = tempdir().expect("tempdir");
    let env = init_with(dir.path(), &["sub"]);

    let publisher = env.new_publisher(true).expect("publisher");
    let subscriber = env.new_subscriber().expect("subscriber");
    publisher.send(b"old").expect("send old");
    publisher.send(b"older").expect("send older");
    let newest = publisher.send(b"newest").expect("send newest");

    {
        let received = subscriber.receive_to_top("sub", 1, 1).expect("receive_to_top");
        assert_eq!(received.message_id(), Some(newest.as_str()));
        assert_eq!(received.message(), Some(&b"newest"[..]));
    }

    let (front_id, front_msg) = subscriber.queue().front("sub").expect("front after ack");
    assert!(front_id.is_none());
    assert!(front_msg.is_none());
}
