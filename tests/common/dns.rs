// tests/common/dns.rs

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::proto::op::{Message, MessageType, ResponseCode};
use hickory_resolver::proto::rr::{rdata::A, RData, Record, RecordType};
use hickory_resolver::TokioAsyncResolver;
use tokio::net::UdpSocket;

/// UDP name server answering A queries from a fixed table. Unknown names
/// get NXDOMAIN.
pub struct DnsServer {
    addr: SocketAddr,
}

impl DnsServer {
    pub async fn start(records: &[(&str, &str)]) -> Self {
        let table: HashMap<String, Ipv4Addr> =
            records.iter().map(|(name, ip)| (name.to_string(), ip.parse().unwrap())).collect();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            loop {
                let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
                    return;
                };
                let Ok(request) = Message::from_vec(&buf[..len]) else {
                    continue;
                };
                if let Ok(bytes) = answer(&request, &table).to_vec() {
                    let _ = socket.send_to(&bytes, peer).await;
                }
            }
        });
        Self { addr }
    }

    /// A resolver that only talks to this server.
    pub fn resolver(&self) -> TokioAsyncResolver {
        let servers = NameServerConfigGroup::from_ips_clear(&[self.addr.ip()], self.addr.port(), true);
        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(1);
        opts.attempts = 1;
        opts.use_hosts_file = false;
        TokioAsyncResolver::tokio(ResolverConfig::from_parts(None, vec![], servers), opts)
    }
}

fn answer(request: &Message, table: &HashMap<String, Ipv4Addr>) -> Message {
    let mut response = Message::new();
    response
        .set_id(request.id())
        .set_message_type(MessageType::Response)
        .set_op_code(request.op_code())
        .set_recursion_desired(request.recursion_desired())
        .set_recursion_available(true)
        .set_authoritative(true);
    response.add_queries(request.queries().to_vec());

    if let Some(query) = request.queries().first() {
        let name = query.name().to_ascii().trim_end_matches('.').to_ascii_lowercase();
        match table.get(&name) {
            Some(ip) if query.query_type() == RecordType::A => {
                response.add_answer(Record::from_rdata(query.name().clone(), 60, RData::A(A(*ip))));
            }
            Some(_) => {}
            None => {
                response.set_response_code(ResponseCode::NXDomain);
            }
        }
    }
    response
}
