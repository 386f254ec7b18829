use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use lan_share::discovery::{AdvertisementBroadcaster, SessionAdvertisement, SessionListener};
use tokio::net::UdpSocket;
use tokio::sync::watch;

async fn listener() -> (SessionListener, std::net::SocketAddr) {
    let listener = SessionListener::bind("127.0.0.1:0".parse().unwrap())
        .await
        .expect("bind listener");
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn distinct_hosts_are_collected_once_each() {
    let (listener, addr) = listener().await;
    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let window = tokio::spawn(listener.collect(Duration::from_millis(400)));

    let ads = [
        SessionAdvertisement::new(Ipv4Addr::new(10, 0, 0, 1), "algebra"),
        SessionAdvertisement::new(Ipv4Addr::new(10, 0, 0, 2), "algebra"),
        // same host, different name: still the same candidate
        SessionAdvertisement::new(Ipv4Addr::new(10, 0, 0, 1), "renamed"),
        SessionAdvertisement::new(Ipv4Addr::new(10, 0, 0, 3), "physics"),
    ];
    for ad in &ads {
        sender.send_to(ad.encode().as_bytes(), addr).await.unwrap();
        sender.send_to(ad.encode().as_bytes(), addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    sender.send_to(b"garbage", addr).await.unwrap();
    sender
        .send_to(b"Code Sharing Server 10.0.0.9", addr)
        .await
        .unwrap();

    let found = window.await.unwrap();
    let hosts: Vec<_> = found.iter().map(|c| c.host_address).collect();
    assert_eq!(
        hosts,
        vec![
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
            Ipv4Addr::new(10, 0, 0, 3),
        ]
    );
    assert_eq!(found[0].session_name, "algebra");
    assert_eq!(found[2].session_name, "physics");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn new_hosts_extend_the_window() {
    let (listener, addr) = listener().await;
    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let silence = Duration::from_millis(300);

    let started = Instant::now();
    let window = tokio::spawn(listener.collect(silence));

    for i in 1..=3u8 {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let ad = SessionAdvertisement::new(Ipv4Addr::new(10, 0, 1, i), "lab");
        sender.send_to(ad.encode().as_bytes(), addr).await.unwrap();
    }

    let found = window.await.unwrap();
    assert_eq!(found.len(), 3);
    // last arrival at ~600ms plus a full silence period
    assert!(started.elapsed() >= Duration::from_millis(850));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn repeats_from_known_host_do_not_extend_the_window() {
    let (listener, addr) = listener().await;
    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let silence = Duration::from_millis(300);

    let started = Instant::now();
    let window = tokio::spawn(listener.collect(silence));

    let ad = SessionAdvertisement::new(Ipv4Addr::new(10, 0, 2, 1), "lab");
    let stop_at = Instant::now() + Duration::from_millis(900);
    let spam = tokio::spawn(async move {
        while Instant::now() < stop_at {
            let _ = sender.send_to(ad.encode().as_bytes(), addr).await;
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    });

    let found = window.await.unwrap();
    let elapsed = started.elapsed();
    spam.abort();

    assert_eq!(found.len(), 1);
    assert!(elapsed < Duration::from_millis(800), "window ran {elapsed:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn broadcaster_is_heard_by_listener() {
    let (listener, addr) = listener().await;
    let ad = SessionAdvertisement::new(Ipv4Addr::new(192, 168, 7, 7), "chem");
    let broadcaster = AdvertisementBroadcaster::bind(&ad, addr, Duration::from_millis(100))
        .await
        .unwrap();

    let (stop, rx) = watch::channel(false);
    let task = tokio::spawn(broadcaster.run(rx));

    let found = listener.collect(Duration::from_millis(500)).await;
    stop.send(true).unwrap();
    task.await.unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].host_address, Ipv4Addr::new(192, 168, 7, 7));
    assert_eq!(found[0].session_name, "chem");
}
