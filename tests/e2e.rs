//! End-to-end association tests over the loopback transport.

use bytes::Bytes;
use m3ua::messages::{params, Message};
use m3ua::sctp::{SctpAssociation, SctpListener, SendInfo, StreamConfig, PPID_M3UA};
use m3ua::{
    connect, AspState, Config, Conn, Error, Listener, ProtocolData, SackInfo, TrafficModeType,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const CLIENT_PC: u32 = 0x1111_1111;
const SERVER_PC: u32 = 0x2222_2222;

fn trace_init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn client_config() -> Config {
    Config::new(CLIENT_PC, SERVER_PC, 3, 0, 0, 1)
        .with_traffic_mode(TrafficModeType::Loadshare)
        .with_routing_contexts(vec![1, 2])
        .with_streams(4)
}

fn server_config() -> Config {
    Config::new(SERVER_PC, CLIENT_PC, 3, 0, 0, 1)
        .with_traffic_mode(TrafficModeType::Loadshare)
        .with_routing_contexts(vec![1, 2])
        .with_streams(4)
}

async fn setup_pair(client_cfg: Config, server_cfg: Config) -> (Conn, Conn) {
    trace_init();
    let listener = Listener::bind("m3ua", "127.0.0.1:0".parse().unwrap(), server_cfg)
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();

    let cancel = CancellationToken::new();
    let accept_cancel = cancel.clone();
    let srv = tokio::spawn(async move { listener.accept(&accept_cancel).await.unwrap() });

    let cli = connect("m3ua", None, addr, client_cfg, cancel)
        .await
        .unwrap();
    (cli, srv.await.unwrap())
}

/// Raw peer helpers for driving the protocol by hand.
async fn raw_connect(addr: SocketAddr) -> SctpAssociation {
    SctpAssociation::connect(
        "sctp",
        None,
        addr,
        StreamConfig {
            inbound_streams: 4,
            outbound_streams: 4,
        },
        &SackInfo::default(),
    )
    .await
    .unwrap()
}

async fn send_signal(assoc: &SctpAssociation, msg: &Message) {
    let info = SendInfo {
        ppid: PPID_M3UA,
        stream_id: 0,
    };
    assoc.send(&msg.encode(), info).await.unwrap();
}

async fn expect_signal<F>(assoc: &SctpAssociation, pred: F) -> Message
where
    F: Fn(&Message) -> bool,
{
    loop {
        let (raw, _info) = assoc.recv().await.unwrap();
        let msg = Message::decode(&raw).unwrap();
        if pred(&msg) {
            return msg;
        }
    }
}

/// Drive a raw peer through ASP Up / ASP Active against a real server.
async fn raw_activate(assoc: &SctpAssociation) {
    send_signal(
        assoc,
        &Message::AspUp {
            asp_identifier: None,
            info_string: None,
        },
    )
    .await;
    expect_signal(assoc, |m| matches!(m, Message::AspUpAck { .. })).await;
    send_signal(
        assoc,
        &Message::AspActive {
            traffic_mode_type: None,
            routing_contexts: None,
            info_string: None,
        },
    )
    .await;
    expect_signal(assoc, |m| matches!(m, Message::AspActiveAck { .. })).await;
}

// S1: connect, exchange one payload each way, close.
#[tokio::test]
async fn test_read_write() {
    let (cli, srv) = setup_pair(client_config(), server_config()).await;
    assert_eq!(cli.state().await, AspState::Active);
    assert_eq!(srv.state().await, AspState::Active);
    // Four negotiated outbound streams, stream 0 excluded.
    assert_eq!(cli.max_outbound_streams(), 3);

    let msg = [0xde, 0xad, 0xbe, 0xef];

    let n = cli.write_payload(&msg, None).await.unwrap();
    assert_eq!(n, 4);
    let pd = srv.read_payload().await.unwrap();
    assert_eq!(&pd.data[..], &msg);
    assert_eq!(pd.opc, CLIENT_PC);
    assert_eq!(pd.dpc, SERVER_PC);
    assert_eq!(pd.si, 3);
    assert_eq!(pd.sls, 1);

    srv.write_payload(&msg, None).await.unwrap();
    let mut buf = [0u8; 1024];
    let n = cli.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], &msg);

    cli.close().await.unwrap();
    srv.close().await.unwrap();
    assert_eq!(cli.state().await, AspState::Down);
    assert!(matches!(cli.read_payload().await, Err(Error::NotEstablished)));
    assert!(matches!(
        cli.write_payload(&msg, None).await,
        Err(Error::NotEstablished)
    ));
}

// S2: heartbeats are exchanged while Active without disturbing the state.
#[tokio::test]
async fn test_heartbeat_success() {
    let ccfg = client_config()
        .enable_heartbeat(Duration::from_millis(200), Duration::from_secs(1));
    let (cli, srv) = setup_pair(ccfg, server_config()).await;

    // Several beat rounds fit into this window.
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(cli.state().await, AspState::Active);
    assert_eq!(srv.state().await, AspState::Active);

    // The association is still usable.
    cli.write_payload(&[1, 2, 3], None).await.unwrap();
    assert_eq!(&srv.read_payload().await.unwrap().data[..], &[1, 2, 3]);

    cli.close().await.unwrap();
    srv.close().await.unwrap();
}

// S3: a peer that stops acking kills the association within the timer.
#[tokio::test]
async fn test_heartbeat_expiry() {
    trace_init();
    let listener = SctpListener::bind(
        "sctp",
        "127.0.0.1:0".parse().unwrap(),
        StreamConfig {
            inbound_streams: 4,
            outbound_streams: 4,
        },
        SackInfo::default(),
    )
    .await
    .unwrap();
    let addr = listener.local_addr().unwrap();

    // An SGP that answers the activation handshake, then goes silent.
    let peer = tokio::spawn(async move {
        let assoc = listener.accept().await.unwrap();
        loop {
            let (raw, _) = assoc.recv().await.unwrap();
            match Message::decode(&raw).unwrap() {
                Message::AspUp { .. } => {
                    send_signal(
                        &assoc,
                        &Message::AspUpAck {
                            asp_identifier: None,
                            info_string: None,
                        },
                    )
                    .await;
                }
                Message::AspActive { .. } => {
                    send_signal(
                        &assoc,
                        &Message::AspActiveAck {
                            traffic_mode_type: None,
                            routing_contexts: None,
                            info_string: None,
                        },
                    )
                    .await;
                }
                Message::Heartbeat { .. } => return assoc,
                _ => {}
            }
        }
    });

    let ccfg = client_config()
        .enable_heartbeat(Duration::from_millis(100), Duration::from_millis(300));
    let cli = connect("m3ua", None, addr, ccfg, CancellationToken::new())
        .await
        .unwrap();
    let _assoc = peer.await.unwrap();

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(cli.state().await, AspState::Down);
    assert!(matches!(cli.read_payload().await, Err(Error::NotEstablished)));
}

// S4: ASP Up on a non-zero stream draws Error code 9 and no state change.
#[tokio::test]
async fn test_asp_up_on_wrong_stream() {
    trace_init();
    let listener = Listener::bind("m3ua", "127.0.0.1:0".parse().unwrap(), server_config())
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let accept_cancel = cancel.clone();
    let accept = tokio::spawn(async move { listener.accept(&accept_cancel).await });

    let assoc = raw_connect(addr).await;
    let up = Message::AspUp {
        asp_identifier: None,
        info_string: None,
    };
    assoc
        .send(
            &up.encode(),
            SendInfo {
                ppid: PPID_M3UA,
                stream_id: 1,
            },
        )
        .await
        .unwrap();

    let (raw, info) = assoc.recv().await.unwrap();
    assert_eq!(info.stream_id, 0);
    match Message::decode(&raw).unwrap() {
        Message::Error { code, .. } => {
            assert_eq!(code, params::ERR_INVALID_STREAM_IDENTIFIER)
        }
        other => panic!("expected Error, got {:?}", other),
    }

    // The server is still in Down: the regular handshake goes through.
    raw_activate(&assoc).await;
    let srv = accept.await.unwrap().unwrap();
    assert_eq!(srv.state().await, AspState::Active);
    srv.close().await.unwrap();
}

// S5: a version-2 packet draws Error code 1 and leaves the state alone.
#[tokio::test]
async fn test_invalid_version() {
    trace_init();
    let listener = Listener::bind("m3ua", "127.0.0.1:0".parse().unwrap(), server_config())
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let accept_cancel = cancel.clone();
    let accept = tokio::spawn(async move { listener.accept(&accept_cancel).await });

    let assoc = raw_connect(addr).await;
    raw_activate(&assoc).await;
    let srv = accept.await.unwrap().unwrap();
    assert_eq!(srv.state().await, AspState::Active);

    let bogus = [0x02, 0x00, 0x03, 0x03, 0x00, 0x00, 0x00, 0x08];
    assoc
        .send(
            &bogus,
            SendInfo {
                ppid: PPID_M3UA,
                stream_id: 0,
            },
        )
        .await
        .unwrap();

    match expect_signal(&assoc, |m| matches!(m, Message::Error { .. })).await {
        Message::Error { code, .. } => assert_eq!(code, params::ERR_INVALID_VERSION),
        _ => unreachable!(),
    }
    assert_eq!(srv.state().await, AspState::Active);
    srv.close().await.unwrap();
}

// S6: Data for a foreign DPC is answered with an Error, not delivered.
#[tokio::test]
async fn test_dpc_mismatch() {
    trace_init();
    let listener = Listener::bind("m3ua", "127.0.0.1:0".parse().unwrap(), server_config())
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let accept_cancel = cancel.clone();
    let accept = tokio::spawn(async move { listener.accept(&accept_cancel).await });

    let assoc = raw_connect(addr).await;
    raw_activate(&assoc).await;
    let srv = accept.await.unwrap().unwrap();

    let wrong = Message::Data {
        network_appearance: None,
        routing_contexts: None,
        protocol_data: ProtocolData::new(
            CLIENT_PC,
            0x0bad_0bad,
            3,
            0,
            0,
            1,
            Bytes::from_static(&[9, 9, 9]),
        ),
        correlation_id: None,
    };
    assoc
        .send(
            &wrong.encode(),
            SendInfo {
                ppid: PPID_M3UA,
                stream_id: 1,
            },
        )
        .await
        .unwrap();
    match expect_signal(&assoc, |m| matches!(m, Message::Error { .. })).await {
        Message::Error {
            code,
            affected_point_codes,
            ..
        } => {
            assert_eq!(code, params::ERR_UNEXPECTED_MESSAGE);
            assert_eq!(affected_point_codes, Some(vec![SERVER_PC]));
        }
        _ => unreachable!(),
    }

    // A correctly addressed payload still flows afterwards.
    let good = Message::Data {
        network_appearance: None,
        routing_contexts: None,
        protocol_data: ProtocolData::new(
            CLIENT_PC,
            SERVER_PC,
            3,
            0,
            0,
            1,
            Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]),
        ),
        correlation_id: None,
    };
    assoc
        .send(
            &good.encode(),
            SendInfo {
                ppid: PPID_M3UA,
                stream_id: 1,
            },
        )
        .await
        .unwrap();
    let pd = srv.read_payload().await.unwrap();
    assert_eq!(&pd.data[..], &[0xde, 0xad, 0xbe, 0xef]);
    srv.close().await.unwrap();
}

#[tokio::test]
async fn test_close_is_idempotent_under_concurrency() {
    let (cli, srv) = setup_pair(client_config(), server_config()).await;
    let cli = Arc::new(cli);
    let a = cli.clone();
    let b = cli.clone();
    let (ra, rb) = tokio::join!(a.close(), b.close());
    ra.unwrap();
    rb.unwrap();
    cli.close().await.unwrap();
    srv.close().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_writers() {
    let (cli, srv) = setup_pair(client_config(), server_config()).await;
    let cli = Arc::new(cli);

    let mut handles = Vec::new();
    for i in 0u8..4 {
        let c = cli.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..25 {
                c.write_payload(&[i], None).await.unwrap();
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let mut counts = [0usize; 4];
    for _ in 0..100 {
        let pd = srv.read_payload().await.unwrap();
        counts[pd.data[0] as usize] += 1;
    }
    assert_eq!(counts, [25; 4]);

    cli.close().await.unwrap();
    srv.close().await.unwrap();
}

#[tokio::test]
async fn test_invalid_scheme() {
    let res = connect(
        "tcp",
        None,
        "127.0.0.1:2905".parse().unwrap(),
        client_config(),
        CancellationToken::new(),
    )
    .await;
    assert!(matches!(
        res,
        Err(Error::Sctp(m3ua::SctpError::InvalidScheme(_)))
    ));
}

#[tokio::test]
async fn test_accept_honors_cancellation() {
    let listener = Listener::bind("m3ua", "127.0.0.1:0".parse().unwrap(), server_config())
        .await
        .unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();
    assert!(matches!(
        listener.accept(&cancel).await,
        Err(Error::FailedToEstablish)
    ));
}
