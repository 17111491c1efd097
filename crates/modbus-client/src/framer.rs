use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_modbus::client::{rtu, tcp, Context};

use crate::error::GatewayError;
use types::Framer;

/// The two framings `tokio-modbus` speaks natively share the same opaque
/// `Context` type; only the handshake used to build it differs.
pub async fn connect(
    framer: Framer,
    host: &str,
    port: u16,
    connect_timeout: Duration,
) -> Result<Transport, GatewayError> {
    match framer {
        Framer::Socket => connect_socket(host, port, connect_timeout).await,
        Framer::Rtu => connect_rtu_over_tcp(host, port, connect_timeout).await,
        Framer::Ascii => connect_ascii(host, port, connect_timeout).await,
    }
}

async fn socket_addr(host: &str, port: u16) -> Result<SocketAddr, GatewayError> {
    format!("{host}:{port}")
        .parse::<SocketAddr>()
        .map_err(|_| GatewayError::InvalidAddress {
            host: host.to_string(),
            port,
        })
}

async fn connect_socket(
    host: &str,
    port: u16,
    connect_timeout: Duration,
) -> Result<Transport, GatewayError> {
    let addr = socket_addr(host, port).await?;
    let ctx = timeout(connect_timeout, tcp::connect(addr))
        .await
        .map_err(|_| GatewayError::Timeout {
            timeout_ms: connect_timeout.as_millis() as u64,
        })?
        .map_err(|err| GatewayError::Connect(err.to_string()))?;
    Ok(Transport::Modbus(ctx))
}

async fn connect_rtu_over_tcp(
    host: &str,
    port: u16,
    connect_timeout: Duration,
) -> Result<Transport, GatewayError> {
    let addr = socket_addr(host, port).await?;
    let stream = timeout(connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| GatewayError::Timeout {
            timeout_ms: connect_timeout.as_millis() as u64,
        })?
        .map_err(|err| GatewayError::Connect(err.to_string()))?;
    let ctx = rtu::attach(stream);
    Ok(Transport::Modbus(ctx))
}

async fn connect_ascii(
    host: &str,
    port: u16,
    connect_timeout: Duration,
) -> Result<Transport, GatewayError> {
    let addr = socket_addr(host, port).await?;
    let stream = timeout(connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| GatewayError::Timeout {
            timeout_ms: connect_timeout.as_millis() as u64,
        })?
        .map_err(|err| GatewayError::Connect(err.to_string()))?;
    Ok(Transport::Ascii(AsciiTransport::new(stream)))
}

/// Either `tokio-modbus`'s own RTU/TCP client, or our hand-rolled ASCII
/// transport — ASCII framing has no `tokio-modbus` support.
pub enum Transport {
    Modbus(Context),
    Ascii(AsciiTransport),
}

/// A minimal Modbus ASCII client covering the function codes this gateway
/// needs: reads 0x01-0x04, single writes 0x05/0x06. Frames are
/// `:` + hex(address, function, data, LRC) + CRLF.
pub struct AsciiTransport {
    stream: BufReader<TcpStream>,
}

impl AsciiTransport {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    pub async fn read_registers(
        &mut self,
        slave_id: u8,
        function: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u8>, GatewayError> {
        let mut pdu = Vec::with_capacity(5);
        pdu.push(function);
        pdu.extend_from_slice(&address.to_be_bytes());
        pdu.extend_from_slice(&count.to_be_bytes());
        self.request(slave_id, &pdu).await
    }

    pub async fn write_single(
        &mut self,
        slave_id: u8,
        function: u8,
        address: u16,
        value: u16,
    ) -> Result<Vec<u8>, GatewayError> {
        let mut pdu = Vec::with_capacity(5);
        pdu.push(function);
        pdu.extend_from_slice(&address.to_be_bytes());
        pdu.extend_from_slice(&value.to_be_bytes());
        self.request(slave_id, &pdu).await
    }

    async fn request(&mut self, slave_id: u8, pdu: &[u8]) -> Result<Vec<u8>, GatewayError> {
        let mut frame_bytes = Vec::with_capacity(pdu.len() + 2);
        frame_bytes.push(slave_id);
        frame_bytes.extend_from_slice(pdu);
        frame_bytes.push(lrc(&frame_bytes));

        let mut ascii = String::with_capacity(frame_bytes.len() * 2 + 3);
        ascii.push(':');
        for byte in &frame_bytes {
            ascii.push_str(&format!("{byte:02X}"));
        }
        ascii.push_str("\r\n");

        self.stream
            .get_mut()
            .write_all(ascii.as_bytes())
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))?;

        let line = self.read_line().await?;
        parse_ascii_frame(&line, slave_id)
    }

    async fn read_line(&mut self) -> Result<String, GatewayError> {
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let n = self
                .stream
                .read_exact(&mut byte)
                .await
                .map_err(|err| GatewayError::Transport(err.to_string()))?;
            if n == 0 {
                return Err(GatewayError::Transport("connection closed".to_string()));
            }
            if byte[0] == b'\n' {
                break;
            }
            if byte[0] != b'\r' {
                buf.push(byte[0]);
            }
        }
        String::from_utf8(buf).map_err(|err| GatewayError::Transport(err.to_string()))
    }
}

fn lrc(data: &[u8]) -> u8 {
    let sum: u8 = data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    (!sum).wrapping_add(1)
}

fn parse_ascii_frame(line: &str, expected_slave: u8) -> Result<Vec<u8>, GatewayError> {
    let line = line
        .strip_prefix(':')
        .ok_or_else(|| GatewayError::Transport("malformed ASCII frame".to_string()))?;
    if line.len() % 2 != 0 || line.len() < 4 {
        return Err(GatewayError::Transport("malformed ASCII frame".to_string()));
    }
    let mut bytes = Vec::with_capacity(line.len() / 2);
    for chunk in line.as_bytes().chunks(2) {
        let hex = std::str::from_utf8(chunk)
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        let byte = u8::from_str_radix(hex, 16)
            .map_err(|_| GatewayError::Transport("invalid hex in ASCII frame".to_string()))?;
        bytes.push(byte);
    }
    let (payload, checksum) = bytes.split_at(bytes.len() - 1);
    if lrc(payload) != checksum[0] {
        return Err(GatewayError::Transport("ASCII LRC mismatch".to_string()));
    }
    if payload.is_empty() || payload[0] != expected_slave {
        return Err(GatewayError::Transport(
            "ASCII response from unexpected slave".to_string(),
        ));
    }
    let function = payload[1];
    if function & 0x80 != 0 {
        let code = payload.get(2).copied().unwrap_or(0) as i32;
        return Err(GatewayError::ModbusException {
            detail: format!("exception code {code}"),
            code: Some(code),
        });
    }
    Ok(payload[1..].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lrc_matches_known_vector() {
        // ":0103006B00037E" is a well known Modbus ASCII read-holding-registers request.
        let bytes = hex_decode("0103006B0003");
        assert_eq!(lrc(&bytes), 0x7E);
    }

    #[test]
    fn parse_ascii_frame_roundtrips() {
        let payload = hex_decode("0103060102030405060708"); // slave, fn, bytecount, 3 regs
        let checksum = lrc(&payload);
        let mut framed = payload.clone();
        framed.push(checksum);
        let ascii: String = framed.iter().map(|b| format!("{b:02X}")).collect();
        let line = format!(":{ascii}");
        let parsed = parse_ascii_frame(&line, 1).unwrap();
        assert_eq!(parsed[0], 0x03);
    }

    #[test]
    fn parse_ascii_frame_rejects_bad_checksum() {
        let line = ":01030601020304050607FF";
        assert!(parse_ascii_frame(line, 1).is_err());
    }

    fn hex_decode(s: &str) -> Vec<u8> {
        s.as_bytes()
            .chunks(2)
            .map(|c| u8::from_str_radix(std::str::from_utf8(c).unwrap(), 16).unwrap())
            .collect()
    }
}
