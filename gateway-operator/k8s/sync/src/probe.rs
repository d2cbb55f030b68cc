//! Checks that a state store accepts connections and credentials.

use crate::{Error, Result};
use gateway_operator_k8s_api::state_store::{Endpoint, RedisMode, RedisSpec};
use std::time::Duration;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader},
    net::TcpStream,
    time,
};

/// Credentials presented to the store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[async_trait::async_trait]
pub trait StoreProbe: Send + Sync {
    async fn probe(&self, redis: &RedisSpec, credentials: &Credentials) -> Result<()>;
}

/// Probes Redis over its wire protocol.
///
/// Standalone stores are authenticated and pinged directly. In sentinel mode
/// each sentinel is asked for the master's address in turn, and the first
/// master that answers is authenticated and pinged.
#[derive(Clone, Debug)]
pub struct RedisProbe {
    timeout: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Reply {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<String>),
    Array(Vec<Reply>),
}

// === impl RedisProbe ===

impl RedisProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn ping(&self, host: &str, port: u16, credentials: &Credentials) -> Result<()> {
        time::timeout(self.timeout, async {
            let mut conn = Conn::connect(host, port).await?;
            if let Some(password) = credentials.password.as_deref() {
                let reply = match credentials.username.as_deref() {
                    Some(user) => conn.call(&["AUTH", user, password]).await?,
                    None => conn.call(&["AUTH", password]).await?,
                };
                expect_ok(reply)?;
            }
            match conn.call(&["PING"]).await? {
                Reply::Simple(s) if s == "PONG" => Ok(()),
                reply => Err(unexpected(reply)),
            }
        })
        .await?
    }

    async fn master(&self, sentinel: &Endpoint, master: &str) -> Result<(String, u16)> {
        time::timeout(self.timeout, async {
            let mut conn = Conn::connect(&sentinel.host, sentinel.port).await?;
            match conn
                .call(&["SENTINEL", "get-master-addr-by-name", master])
                .await?
            {
                Reply::Array(parts) => match parts.as_slice() {
                    [Reply::Bulk(Some(host)), Reply::Bulk(Some(port))] => {
                        let port = port
                            .parse()
                            .map_err(|_| Error::Probe(format!("invalid master port {port}")))?;
                        Ok((host.clone(), port))
                    }
                    _ => Err(Error::Probe(format!("unexpected master address {parts:?}"))),
                },
                Reply::Bulk(None) => Err(Error::Probe(format!("sentinel does not know {master}"))),
                reply => Err(unexpected(reply)),
            }
        })
        .await?
    }
}

#[async_trait::async_trait]
impl StoreProbe for RedisProbe {
    async fn probe(&self, redis: &RedisSpec, credentials: &Credentials) -> Result<()> {
        let mut last = Error::Probe("no endpoints configured".to_string());
        match redis.mode {
            RedisMode::Standalone => {
                for ep in redis.endpoints() {
                    match self.ping(&ep.host, ep.port, credentials).await {
                        Ok(()) => return Ok(()),
                        Err(error) => last = error,
                    }
                }
            }
            RedisMode::Sentinel => {
                let master = redis
                    .sentinel
                    .as_ref()
                    .map(|s| s.master.as_str())
                    .unwrap_or_default();
                for sentinel in redis.endpoints() {
                    let attempt = async {
                        let (host, port) = self.master(sentinel, master).await?;
                        self.ping(&host, port, credentials).await
                    };
                    match attempt.await {
                        Ok(()) => return Ok(()),
                        Err(error) => {
                            tracing::debug!(host = %sentinel.host, %error, "Sentinel probe failed");
                            last = error;
                        }
                    }
                }
            }
        }
        Err(last)
    }
}

fn expect_ok(reply: Reply) -> Result<()> {
    match reply {
        Reply::Simple(s) if s == "OK" => Ok(()),
        reply => Err(unexpected(reply)),
    }
}

fn unexpected(reply: Reply) -> Error {
    match reply {
        Reply::Error(e) => Error::Probe(e),
        reply => Error::Probe(format!("unexpected reply {reply:?}")),
    }
}

struct Conn {
    stream: BufReader<TcpStream>,
}

// === impl Conn ===

impl Conn {
    async fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        Ok(Self {
            stream: BufReader::new(stream),
        })
    }

    async fn call(&mut self, args: &[&str]) -> Result<Reply> {
        self.stream.get_mut().write_all(&command(args)).await?;
        read_reply(&mut self.stream).await
    }
}

fn command(args: &[&str]) -> Vec<u8> {
    let mut buf = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        buf.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        buf.extend_from_slice(arg.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    buf
}

async fn read_reply<R: AsyncRead + Unpin>(reader: &mut BufReader<R>) -> Result<Reply> {
    let line = read_line(reader).await?;
    if !line.starts_with('*') {
        return scalar(reader, line).await;
    }
    // Arrays are only expected to hold scalars.
    let mut items = Vec::new();
    for _ in 0..parse_len(&line[1..])?.max(0) {
        let line = read_line(reader).await?;
        items.push(scalar(reader, line).await?);
    }
    Ok(Reply::Array(items))
}

async fn scalar<R: AsyncRead + Unpin>(reader: &mut BufReader<R>, line: String) -> Result<Reply> {
    let mut chars = line.chars();
    let kind = chars.next();
    let rest = chars.as_str();
    match kind {
        Some('+') => Ok(Reply::Simple(rest.to_string())),
        Some('-') => Ok(Reply::Error(rest.to_string())),
        Some(':') => Ok(Reply::Integer(parse_len(rest)?)),
        Some('$') => {
            if parse_len(rest)? < 0 {
                return Ok(Reply::Bulk(None));
            }
            Ok(Reply::Bulk(Some(read_line(reader).await?)))
        }
        _ => Err(Error::Probe(format!("malformed reply {line:?}"))),
    }
}

async fn read_line<R: AsyncRead + Unpin>(reader: &mut BufReader<R>) -> Result<String> {
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(Error::Probe("connection closed".to_string()));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn parse_len(s: &str) -> Result<i64> {
    s.parse()
        .map_err(|_| Error::Probe(format!("malformed length {s:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_operator_k8s_api::state_store::Sentinel;
    use tokio::{io::AsyncReadExt, net::TcpListener};

    /// Serves one connection, answering each command with the next reply.
    async fn serve(replies: Vec<String>) -> (u16, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let task = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            for reply in replies {
                let mut buf = [0u8; 512];
                let n = stream.read(&mut buf).await.unwrap();
                received.extend_from_slice(&buf[..n]);
                stream.write_all(reply.as_bytes()).await.unwrap();
            }
            received
        });
        (port, task)
    }

    fn standalone(port: u16) -> RedisSpec {
        RedisSpec {
            mode: RedisMode::Standalone,
            standalone: Some(Endpoint {
                host: "127.0.0.1".to_string(),
                port,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn encodes_commands() {
        assert_eq!(command(&["AUTH", "pw"]), b"*2\r\n$4\r\nAUTH\r\n$2\r\npw\r\n");
    }

    #[tokio::test]
    async fn reads_nested_replies() {
        let mut reader = BufReader::new(&b"*2\r\n$9\r\n127.0.0.1\r\n$4\r\n6379\r\n"[..]);
        assert_eq!(
            read_reply(&mut reader).await.unwrap(),
            Reply::Array(vec![
                Reply::Bulk(Some("127.0.0.1".to_string())),
                Reply::Bulk(Some("6379".to_string())),
            ])
        );
        let mut reader = BufReader::new(&b"$-1\r\n"[..]);
        assert_eq!(read_reply(&mut reader).await.unwrap(), Reply::Bulk(None));
    }

    #[tokio::test]
    async fn authenticates_then_pings() {
        let (port, server) = serve(vec!["+OK\r\n".to_string(), "+PONG\r\n".to_string()]).await;
        let credentials = Credentials {
            username: None,
            password: Some("hunter2".to_string()),
        };
        RedisProbe::new(Duration::from_secs(1))
            .probe(&standalone(port), &credentials)
            .await
            .unwrap();
        let received = String::from_utf8(server.await.unwrap()).unwrap();
        assert!(received.starts_with("*2\r\n$4\r\nAUTH\r\n$7\r\nhunter2\r\n"));
        assert!(received.ends_with("*1\r\n$4\r\nPING\r\n"));
    }

    #[tokio::test]
    async fn rejected_credentials_fail() {
        let (port, _server) =
            serve(vec!["-WRONGPASS invalid username-password pair\r\n".to_string()]).await;
        let credentials = Credentials {
            username: Some("default".to_string()),
            password: Some("nope".to_string()),
        };
        let error = RedisProbe::new(Duration::from_secs(1))
            .probe(&standalone(port), &credentials)
            .await
            .unwrap_err();
        assert!(error.to_string().contains("WRONGPASS"), "{error}");
    }

    #[tokio::test]
    async fn sentinel_resolves_master() {
        let (master, _m) = serve(vec!["+PONG\r\n".to_string()]).await;
        let port = master.to_string();
        let reply = format!("*2\r\n$9\r\n127.0.0.1\r\n${}\r\n{port}\r\n", port.len());
        let (sentinel, _s) = serve(vec![reply]).await;

        let redis = RedisSpec {
            mode: RedisMode::Sentinel,
            sentinel: Some(Sentinel {
                master: "mymaster".to_string(),
                nodes: vec![
                    // Nothing listens on port 1.
                    Endpoint {
                        host: "127.0.0.1".to_string(),
                        port: 1,
                    },
                    Endpoint {
                        host: "127.0.0.1".to_string(),
                        port: sentinel,
                    },
                ],
            }),
            ..Default::default()
        };
        RedisProbe::new(Duration::from_secs(1))
            .probe(&redis, &Credentials::default())
            .await
            .unwrap();
    }
}
