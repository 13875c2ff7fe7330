//! Signaling channel behavior over the in-memory transport

use rendezvous_client::transport::memory::{MemoryConnector, MemoryListener, MemoryPeer};
use rendezvous_client::{
    Answer, ChannelError, ChannelOptions, ChannelState, ErrorReceiver, Frame, IceCandidate,
    IceCandidateDescriptor, Offer, ParseError, PeerId, Roster, SessionDescriptor, SignalingChannel,
    SignalingMessage, Teardown, TransportError,
};
use rendezvous_protocol::serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

fn base() -> Url {
    Url::parse("http://localhost:4321").unwrap()
}

/// Let the driver task work through everything queued
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

fn open(
    connector: MemoryConnector,
    session: &str,
    peer: &str,
    options: ChannelOptions,
) -> (SignalingChannel, ErrorReceiver) {
    SignalingChannel::open_with(Arc::new(connector), &base(), session, PeerId::new(peer).unwrap(), options)
        .unwrap()
}

async fn open_active(
    session: &str,
    peer: &str,
) -> (SignalingChannel, ErrorReceiver, MemoryPeer, MemoryListener) {
    let (connector, mut listener) = MemoryConnector::new();
    let (channel, errors) = open(connector, session, peer, ChannelOptions::default());
    let relay = listener.accept().await.unwrap();
    channel.ready().await.unwrap();
    (channel, errors, relay, listener)
}

fn offer(offerer: &str, answerer: &str) -> Offer {
    Offer {
        offerer_id: PeerId::new(offerer).unwrap(),
        answerer_id: PeerId::new(answerer).unwrap(),
        description: SessionDescriptor::new("offer", "v=0"),
    }
}

#[tokio::test(start_paused = true)]
async fn roster_reaches_subscriber() {
    let (connector, mut listener) = MemoryConnector::new();
    let (channel, mut errors) = open(connector, "lobby", "p1", ChannelOptions::default());
    assert_eq!(channel.state(), ChannelState::Connecting);
    assert_eq!(channel.session_name(), "lobby");
    assert_eq!(channel.local_peer_id().as_str(), "p1");

    let rosters = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&rosters);
    channel.subscribe(move |roster: &Roster| seen.lock().unwrap().push(roster.clone()));

    let relay = listener.accept().await.unwrap();
    assert_eq!(
        relay.url().as_str(),
        "ws://localhost:4321/sessions/lobby?peerId=p1"
    );
    channel.ready().await.unwrap();
    assert_eq!(channel.state(), ChannelState::Active);

    relay.push_text(r#"{"type":"roster","peerIds":["p1","p2"]}"#);
    settle().await;

    let rosters = rosters.lock().unwrap();
    assert_eq!(rosters.len(), 1);
    assert_eq!(rosters[0].peer_ids, vec![PeerId::new("p1").unwrap(), PeerId::new("p2").unwrap()]);
    assert!(errors.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn send_requires_active_channel() {
    let (connector, mut listener) = MemoryConnector::new();
    let (channel, _errors) = open(connector, "lobby", "p1", ChannelOptions::default());

    let message = offer("p1", "p2");
    assert!(matches!(
        channel.send(message.clone()),
        Err(ChannelError::ChannelNotActive)
    ));

    let mut relay = listener.accept().await.unwrap();
    channel.ready().await.unwrap();
    channel.send(message.clone()).unwrap();

    let frame = relay.next_frame().await.unwrap();
    assert_eq!(frame, Frame::Text(serialize(&message.into())));
}

#[tokio::test(start_paused = true)]
async fn sends_leave_in_call_order() {
    let (channel, _errors, mut relay, _listener) = open_active("lobby", "p1").await;

    let sent = offer("p1", "p2");
    let answer = sent.answer(SessionDescriptor::new("answer", "v=0"));
    let candidate = IceCandidate {
        from_peer_id: PeerId::new("p1").unwrap(),
        to_peer_id: PeerId::new("p2").unwrap(),
        candidate: IceCandidateDescriptor::new("candidate:1", Some("0".into()), Some(0)),
    };
    channel.send(sent.clone()).unwrap();
    channel.send(answer.clone()).unwrap();
    channel.send(candidate.clone()).unwrap();
    settle().await;

    let expected: Vec<Frame> = [
        SignalingMessage::from(sent),
        SignalingMessage::from(answer),
        SignalingMessage::from(candidate),
    ]
    .iter()
    .map(|message| Frame::Text(serialize(message)))
    .collect();
    assert_eq!(relay.drain(), expected);
}

#[tokio::test(start_paused = true)]
async fn heartbeat_runs_while_active() {
    let (_channel, _errors, mut relay, _listener) = open_active("lobby", "p1").await;
    let keep_alive = Frame::Text(serialize(&SignalingMessage::KeepAlive));

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert!(relay.drain().is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(relay.drain(), vec![keep_alive.clone()]);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(relay.drain(), vec![keep_alive]);
}

#[tokio::test(start_paused = true)]
async fn heartbeat_period_is_configurable() {
    let (connector, mut listener) = MemoryConnector::new();
    let options = ChannelOptions {
        heartbeat_interval: Duration::from_secs(5),
        ..ChannelOptions::default()
    };
    let (channel, _errors) = open(connector, "lobby", "p1", options);
    let mut relay = listener.accept().await.unwrap();
    channel.ready().await.unwrap();

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(relay.drain().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn keep_alive_is_never_dispatched() {
    let (channel, mut errors, relay, _listener) = open_active("lobby", "p1").await;

    let calls = Arc::new(AtomicUsize::new(0));
    let count = |calls: &Arc<AtomicUsize>| {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
        }
    };
    let on_roster = count(&calls);
    let on_offer = count(&calls);
    let on_answer = count(&calls);
    let on_candidate = count(&calls);
    channel.subscribe(move |_: &Roster| on_roster());
    channel.subscribe(move |_: &Offer| on_offer());
    channel.subscribe(move |_: &Answer| on_answer());
    channel.subscribe(move |_: &IceCandidate| on_candidate());

    relay.push_text(r#"{"type":"keepAlive"}"#);
    settle().await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(errors.try_recv().is_err());
    assert_eq!(channel.state(), ChannelState::Active);
}

#[tokio::test(start_paused = true)]
async fn handlers_run_in_subscription_order() {
    let (channel, _errors, relay, _listener) = open_active("lobby", "p1").await;

    let log = Arc::new(Mutex::new(Vec::new()));
    for name in ["a", "b"] {
        let log = Arc::clone(&log);
        channel.subscribe(move |offer: &Offer| {
            log.lock()
                .unwrap()
                .push(format!("{name}:{}", offer.offerer_id));
        });
    }

    relay.push_text(serialize(&offer("m1", "p1").into()));
    relay.push_text(serialize(&offer("m2", "p1").into()));
    settle().await;

    assert_eq!(*log.lock().unwrap(), vec!["a:m1", "b:m1", "a:m2", "b:m2"]);
}

#[tokio::test(start_paused = true)]
async fn only_matching_kind_is_dispatched() {
    let (channel, _errors, relay, _listener) = open_active("lobby", "p1").await;

    let answers = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&answers);
    channel.subscribe(move |_: &Answer| {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    relay.push_text(serialize(&offer("p2", "p1").into()));
    settle().await;
    assert_eq!(answers.load(Ordering::SeqCst), 0);

    let answer = offer("p1", "p2").answer(SessionDescriptor::new("answer", "v=0"));
    relay.push_text(serialize(&answer.into()));
    settle().await;
    assert_eq!(answers.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn invalid_frames_are_reported_and_skipped() {
    let (channel, mut errors, relay, _listener) = open_active("lobby", "p1").await;

    let rosters = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&rosters);
    channel.subscribe(move |_: &Roster| {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    relay.push_text("not json");
    relay.push_text(r#"{"type":"teleport"}"#);
    relay.push_text(r#"{"type":"roster","peerIds":"p2"}"#);
    relay.push_text(r#"{"type":"roster","peerIds":["p1"]}"#);
    settle().await;

    assert!(matches!(
        errors.try_recv(),
        Ok(ChannelError::Parse(ParseError::MalformedPayload(_)))
    ));
    assert!(matches!(
        errors.try_recv(),
        Ok(ChannelError::Parse(ParseError::UnknownMessageType(tag))) if tag == "teleport"
    ));
    assert!(matches!(
        errors.try_recv(),
        Ok(ChannelError::Parse(ParseError::InvalidField("peerIds")))
    ));
    assert!(errors.try_recv().is_err());
    assert_eq!(rosters.load(Ordering::SeqCst), 1);
    assert_eq!(channel.state(), ChannelState::Active);
}

#[tokio::test(start_paused = true)]
async fn binary_frames_are_decoded() {
    let (channel, _errors, relay, _listener) = open_active("lobby", "p1").await;

    let rosters = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&rosters);
    channel.subscribe(move |roster: &Roster| seen.lock().unwrap().push(roster.clone()));

    relay.push(Frame::Binary(
        br#"{"type":"roster","peerIds":["p1"]}"#.to_vec(),
    ));
    settle().await;

    assert_eq!(rosters.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unsubscribed_handler_is_not_called() {
    let (channel, _errors, relay, _listener) = open_active("lobby", "p1").await;

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let subscription = channel.subscribe(move |_: &Roster| {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(channel.subscriptions(), 1);

    assert!(channel.unsubscribe(subscription));
    assert!(!channel.unsubscribe(subscription));
    assert_eq!(channel.subscriptions(), 0);

    relay.push_text(r#"{"type":"roster","peerIds":[]}"#);
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn close_is_idempotent_and_stops_everything() {
    let (channel, _errors, mut relay, _listener) = open_active("lobby", "p1").await;
    channel.subscribe(|_: &Roster| {});

    channel.close();
    channel.close();
    assert_eq!(channel.state(), ChannelState::Closed);
    assert_eq!(channel.subscriptions(), 0);
    assert!(matches!(
        channel.send(offer("p1", "p2")),
        Err(ChannelError::ChannelNotActive)
    ));
    assert!(matches!(
        channel.ready().await,
        Err(ChannelError::ChannelNotActive)
    ));

    // The relay sees the connection end without a single keep-alive
    tokio::time::sleep(Duration::from_secs(90)).await;
    assert_eq!(relay.next_frame().await, None);
}

#[tokio::test(start_paused = true)]
async fn send_then_close_still_transmits() {
    let (channel, _errors, mut relay, _listener) = open_active("lobby", "p1").await;

    let first = offer("p1", "p2");
    let second = offer("p1", "p3");
    channel.send(first.clone()).unwrap();
    channel.send(second.clone()).unwrap();
    channel.close();

    assert_eq!(
        relay.next_frame().await,
        Some(Frame::Text(serialize(&first.into())))
    );
    assert_eq!(
        relay.next_frame().await,
        Some(Frame::Text(serialize(&second.into())))
    );
    assert_eq!(relay.next_frame().await, None);
}

#[tokio::test(start_paused = true)]
async fn send_then_drop_still_transmits() {
    let (channel, _errors, mut relay, _listener) = open_active("lobby", "p1").await;

    let sent = offer("p1", "p2");
    channel.send(sent.clone()).unwrap();
    drop(channel);

    assert_eq!(
        relay.next_frame().await,
        Some(Frame::Text(serialize(&sent.into())))
    );
    assert_eq!(relay.next_frame().await, None);
}

#[tokio::test(start_paused = true)]
async fn busy_inbound_does_not_hold_back_sends() {
    const ROSTER: &str = r#"{"type":"roster","peerIds":["p1","p2"]}"#;
    const FLOOD: usize = 200;

    let (channel, _errors, relay, _listener) = open_active("lobby", "p1").await;
    let relay = Arc::new(Mutex::new(relay));
    let received = Arc::new(AtomicUsize::new(0));
    let written_at = Arc::new(Mutex::new(None));

    {
        let relay = Arc::clone(&relay);
        let received = Arc::clone(&received);
        let written_at = Arc::clone(&written_at);
        // Every roster is answered with another until the flood is over
        channel.subscribe(move |_: &Roster| {
            let count = received.fetch_add(1, Ordering::SeqCst) + 1;
            let mut relay = relay.lock().unwrap();
            let written = !relay.drain().is_empty();
            let mut written_at = written_at.lock().unwrap();
            if written && written_at.is_none() {
                *written_at = Some(count);
            }
            if count < FLOOD {
                relay.push_text(ROSTER);
            }
        });
    }

    relay.lock().unwrap().push_text(ROSTER);
    channel.send(offer("p1", "p2")).unwrap();
    settle().await;

    assert_eq!(received.load(Ordering::SeqCst), FLOOD);
    let written_at = written_at.lock().unwrap().unwrap_or(FLOOD);
    assert!(written_at < FLOOD, "offer held back until roster {written_at}");
}

#[tokio::test(start_paused = true)]
async fn subscription_from_another_channel_is_ignored() {
    let (first, _first_errors, _first_relay, _first_listener) = open_active("lobby", "p1").await;
    let (second, _second_errors, _second_relay, _second_listener) =
        open_active("lobby", "p2").await;

    let from_first = first.subscribe(|_: &Roster| {});
    second.subscribe(|_: &Roster| {});

    assert!(!second.unsubscribe(from_first));
    assert_eq!(second.subscriptions(), 1);
    assert!(first.unsubscribe(from_first));
}

#[tokio::test(start_paused = true)]
async fn handler_can_close_the_channel() {
    let (channel, _errors, relay, _listener) = open_active("lobby", "p1").await;
    let channel = Arc::new(channel);

    let later = Arc::new(AtomicUsize::new(0));
    let weak = Arc::downgrade(&channel);
    channel.subscribe(move |_: &Roster| {
        if let Some(channel) = weak.upgrade() {
            channel.close();
        }
    });
    let seen = Arc::clone(&later);
    channel.subscribe(move |_: &Roster| {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    relay.push_text(r#"{"type":"roster","peerIds":["p1"]}"#);
    channel.closed().await;

    assert_eq!(channel.state(), ChannelState::Closed);
    assert_eq!(later.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn refused_connection_closes_the_channel() {
    let (channel, mut errors) = open(
        MemoryConnector::refusing(),
        "lobby",
        "p1",
        ChannelOptions::default(),
    );

    assert!(matches!(
        errors.recv().await,
        Some(ChannelError::Connection(TransportError::Refused(_)))
    ));
    channel.closed().await;
    assert_eq!(channel.state(), ChannelState::Closed);
    assert!(channel.ready().await.is_err());
    assert!(matches!(
        channel.send(offer("p1", "p2")),
        Err(ChannelError::ChannelNotActive)
    ));
}

#[tokio::test(start_paused = true)]
async fn relay_hang_up_closes_without_error() {
    let (channel, mut errors, relay, _listener) = open_active("lobby", "p1").await;

    relay.hang_up();
    channel.closed().await;

    assert_eq!(channel.state(), ChannelState::Closed);
    assert!(errors.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn transport_failure_is_reported() {
    let (channel, mut errors, relay, _listener) = open_active("lobby", "p1").await;

    relay.fail(TransportError::Closed);

    assert!(matches!(
        errors.recv().await,
        Some(ChannelError::Connection(TransportError::Closed))
    ));
    channel.closed().await;
    assert_eq!(channel.state(), ChannelState::Closed);
}

#[tokio::test(start_paused = true)]
async fn teardown_closes_open_channels() {
    let teardown = Teardown::new();
    let (connector, mut listener) = MemoryConnector::new();
    let options = ChannelOptions {
        teardown: Some(teardown.clone()),
        ..ChannelOptions::default()
    };
    let (channel, _errors) = open(connector, "lobby", "p1", options);
    let mut relay = listener.accept().await.unwrap();
    channel.ready().await.unwrap();
    assert_eq!(teardown.registered(), 1);

    teardown.fire();
    channel.closed().await;

    assert_eq!(teardown.registered(), 0);
    assert_eq!(relay.next_frame().await, None);
}

#[tokio::test(start_paused = true)]
async fn teardown_registrations_do_not_accumulate() {
    let teardown = Teardown::new();
    let (connector, mut listener) = MemoryConnector::new();

    for round in 0..3 {
        let options = ChannelOptions {
            teardown: Some(teardown.clone()),
            ..ChannelOptions::default()
        };
        let peer = format!("p{round}");
        let (channel, _errors) = open(connector.clone(), "lobby", &peer, options);
        let _relay = listener.accept().await.unwrap();
        channel.ready().await.unwrap();
        assert_eq!(teardown.registered(), 1);

        channel.close();
        assert_eq!(teardown.registered(), 0);
    }
    assert!(!teardown.is_fired());
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_closes_the_connection() {
    let (channel, _errors, mut relay, _listener) = open_active("lobby", "p1").await;

    drop(channel);
    assert_eq!(relay.next_frame().await, None);
}

#[tokio::test(start_paused = true)]
async fn close_while_connecting() {
    let (connector, _listener) = MemoryConnector::new();
    let (channel, mut errors) = open(connector, "lobby", "p1", ChannelOptions::default());

    channel.close();
    assert_eq!(channel.state(), ChannelState::Closed);
    assert!(channel.ready().await.is_err());

    settle().await;
    assert_eq!(channel.state(), ChannelState::Closed);
    assert!(errors.try_recv().is_err());
}
