use super::*;

#[test]
fn backoff_doubles_up_to_cap() {
    let mut backoff = Backoff::new(Duration::from_millis(250), Duration::from_secs(1));
    let delays: Vec<u128> = (0..5).map(|_| backoff.next_delay().as_millis()).collect();
    assert_eq!(delays, vec![250, 500, 1000, 1000, 1000]);
}

#[test]
fn reset_returns_to_floor() {
    let mut backoff = Backoff::new(Duration::from_millis(250), Duration::from_secs(10));
    backoff.next_delay();
    backoff.next_delay();
    backoff.reset();
    assert_eq!(backoff.next_delay(), Duration::from_millis(250));
}

#[tokio::test]
async fn connect_to_closed_port_fails() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let result = Connection::connect(&format!("ws://{addr}/room")).await;
    assert!(matches!(result, Err(TransportError::Connect { .. })));
}
