// tests/common/tls.rs

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::thread;
use std::time::Duration;

use native_tls::{Identity, TlsAcceptor};

const CERT_PEM: &[u8] = include_bytes!("../fixtures/selfsigned.pem");
const KEY_PEM: &[u8] = include_bytes!("../fixtures/selfsigned.key.pem");

/// HTTPS server behind a self-signed certificate for `example.com`,
/// `www.example.com`, `*.example.com`, `cdn.partner.net` and 127.0.0.1.
/// A GET for `path` answers 200 with `body`; anything else gets a 404.
pub fn start_https_server(path: &'static str, body: &'static str) -> SocketAddr {
    let identity = Identity::from_pkcs8(CERT_PEM, KEY_PEM).unwrap();
    let acceptor = TlsAcceptor::new(identity).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let acceptor = acceptor.clone();
            thread::spawn(move || {
                let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
                let Ok(mut tls) = acceptor.accept(stream) else {
                    return;
                };

                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match tls.read(&mut buf) {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let wanted = format!("GET {path} ");
                let (status, body) = if request.starts_with(wanted.as_bytes()) {
                    ("200 OK", body)
                } else {
                    ("404 Not Found", "")
                };
                let response = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = tls.write_all(response.as_bytes());
                let _ = tls.shutdown();
            });
        }
    });
    addr
}
