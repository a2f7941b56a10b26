//! Wire-level queries against a running DNS listener.

use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::{A, TXT};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio_util::sync::CancellationToken;
use west_srv::authority::{NameResolver, ZoneHandler};
use west_srv::challenge::{dns01_value, ChallengeRegistry};
use west_srv::registry::{DeviceRegistry, MemoryRegistry};

struct Harness {
    addr: std::net::SocketAddr,
    client: UdpSocket,
    shutdown: CancellationToken,
    server: tokio::task::JoinHandle<west_srv::Result<()>>,
}

impl Harness {
    async fn start(challenges: ChallengeRegistry) -> Self {
        let registry = Arc::new(MemoryRegistry::new());
        registry
            .create("alpha", Ipv4Addr::new(10, 10, 10, 5), "fp-alpha")
            .await
            .unwrap();
        let resolver = NameResolver::new(
            "west.example.com",
            Some(Ipv4Addr::new(203, 0, 113, 7)),
            registry,
            challenges,
        );

        let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = udp.local_addr().unwrap();
        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(west_srv::server::serve(
            udp,
            tcp,
            ZoneHandler::new(resolver),
            shutdown.clone(),
        ));

        Self {
            addr,
            client: UdpSocket::bind("127.0.0.1:0").await.unwrap(),
            shutdown,
            server,
        }
    }

    async fn query(&self, name: &str, record_type: RecordType) -> Message {
        let mut request = Message::new();
        request
            .set_id(4242)
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .add_query(Query::query(Name::from_ascii(name).unwrap(), record_type));

        self.client
            .send_to(&request.to_vec().unwrap(), self.addr)
            .await
            .unwrap();

        let mut buf = [0u8; 4096];
        let (len, _) = tokio::time::timeout(Duration::from_secs(5), self.client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let response = Message::from_vec(&buf[..len]).unwrap();
        assert_eq!(response.id(), 4242);
        response
    }

    async fn stop(self) {
        self.shutdown.cancel();
        self.server.await.unwrap().unwrap();
    }
}

fn a_record(name: &str, ttl: u32, ip: Ipv4Addr) -> Record {
    Record::from_rdata(Name::from_ascii(name).unwrap(), ttl, RData::A(A::from(ip)))
}

#[tokio::test]
async fn test_device_and_apex_answers() {
    let harness = Harness::start(ChallengeRegistry::fqdns()).await;

    let device = harness.query("alpha.west.example.com.", RecordType::A).await;
    assert_eq!(device.response_code(), ResponseCode::NoError);
    assert!(device.authoritative());
    assert_eq!(
        device.answers(),
        &[a_record("alpha.west.example.com.", 300, Ipv4Addr::new(10, 10, 10, 5))]
    );

    let apex = harness.query("west.example.com.", RecordType::A).await;
    assert_eq!(
        apex.answers(),
        &[a_record("west.example.com.", 300, Ipv4Addr::new(203, 0, 113, 7))]
    );

    let missing = harness.query("bravo.west.example.com.", RecordType::A).await;
    assert_eq!(missing.response_code(), ResponseCode::NXDomain);
    assert!(missing.answers().is_empty());

    harness.stop().await;
}

#[tokio::test]
async fn test_out_of_zone_and_unsupported_types_are_empty() {
    let harness = Harness::start(ChallengeRegistry::fqdns()).await;

    let foreign = harness.query("example.org.", RecordType::A).await;
    assert_eq!(foreign.response_code(), ResponseCode::NoError);
    assert!(foreign.answers().is_empty());

    let aaaa = harness.query("alpha.west.example.com.", RecordType::AAAA).await;
    assert_eq!(aaaa.response_code(), ResponseCode::NoError);
    assert!(aaaa.answers().is_empty());

    harness.stop().await;
}

#[tokio::test]
async fn test_challenge_txt_lifecycle() {
    let challenges = ChallengeRegistry::fqdns();
    let harness = Harness::start(challenges.clone()).await;
    let fqdn = "_acme-challenge.west.example.com.";

    challenges.present("west.example.com", "tok", "tok.thumbprint");
    let expected = Record::from_rdata(
        Name::from_ascii(fqdn).unwrap(),
        60,
        RData::TXT(TXT::new(vec![dns01_value("tok.thumbprint")])),
    );

    for _ in 0..2 {
        let present = harness.query(fqdn, RecordType::TXT).await;
        assert_eq!(present.answers(), &[expected.clone()]);
    }

    challenges.clean_up("west.example.com", "tok", "tok.thumbprint");
    let cleaned = harness.query(fqdn, RecordType::TXT).await;
    assert_eq!(cleaned.response_code(), ResponseCode::NoError);
    assert!(cleaned.answers().is_empty());

    harness.stop().await;
}
