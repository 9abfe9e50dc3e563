//! The multi-stage login handshake. Runs on the connection's own task,
//! never inside the tick; an accepted player is pushed onto the bounded
//! login queue the tick drains at its next boundary.
//!
//! Handshake frames are bare: an opcode byte followed by a self-delimiting
//! payload, with no length prefix. Replies are raw payload bytes.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{ensure, Context};
use bytes::BytesMut;
use mithril_protocol::{xtea_decipher, FrameDecoder, FrameReader};
use rand::rngs::OsRng;
use rand::Rng;
use rsa::Pkcs1v15Encrypt;
use tracing::{debug, info, trace};

use crate::connection::spawn_actor;
use crate::transport::Transport;
use crate::{IncomingPlayer, LoginVerdict, ResponseCode, SharedNetwork};

const SESSION_REQUEST: u8 = 32;
const LOGIN_REQUEST: u8 = 0;

/// Logins the tick will accept per boundary; the queue bounds per-tick
/// login cost.
pub const LOGIN_QUEUE_CAPACITY: usize = 25;

/// The RSA block's first byte; any other value means the block did not
/// decrypt to what the client built.
const RSA_CHECKSUM: u8 = 10;

const PASSWORD_LEN: usize = 20;
const LOGIN_NONCE_LEN: usize = 24;

pub(crate) async fn handle(
    shared: Arc<SharedNetwork>,
    transport: Transport,
    remote: SocketAddr,
) -> anyhow::Result<()> {
    let mut io = HandshakeIo::new(transport);

    // Phase 1: session request. One byte of user id nibble in, an 8-byte
    // session seed out. The seed is the server half of the cipher seed
    // pair.
    let opcode = io.read_u8().await?;
    ensure!(
        opcode == SESSION_REQUEST,
        "expected session request, got opcode {opcode}"
    );
    let uid = io.read_u8().await?;
    trace!(%remote, uid, "session request");

    let server_seed: u64 = OsRng.gen();
    io.write(&server_seed.to_be_bytes()).await?;

    // Phase 2: login request.
    let opcode = io.read_u8().await?;
    ensure!(
        opcode == LOGIN_REQUEST,
        "expected login request, got opcode {opcode}"
    );
    let reconnecting = io.read_u8().await? == 1;
    let version = io.read_u32().await?;

    if let Some(code) = shared.callbacks.preflight().await {
        return reject(&mut io, remote, code, "preflight refused").await;
    }

    if shared.throttle.limited(remote.ip()) {
        // The credential store is never consulted for a throttled IP.
        return reject(
            &mut io,
            remote,
            ResponseCode::SpamThrottle,
            "too many recent failed attempts",
        )
        .await;
    }

    if version != shared.settings.version {
        debug!(%remote, version, expected = shared.settings.version, "client version mismatch");
        return reject(&mut io, remote, ResponseCode::VersionMismatch, "bad version").await;
    }

    let rsa_len = usize::from(io.read_u16().await?);
    ensure!(rsa_len <= 512, "oversized RSA block ({rsa_len} bytes)");
    let rsa_block = io.read_exact(rsa_len).await?;

    let Ok(rsa_plain) = shared.rsa_key.decrypt(Pkcs1v15Encrypt, &rsa_block) else {
        shared.throttle.record(remote.ip());
        return reject(
            &mut io,
            remote,
            ResponseCode::BadCredentials,
            "RSA block did not decrypt",
        )
        .await;
    };

    let (seed, password) = match parse_rsa_block(&rsa_plain) {
        Ok(parsed) => parsed,
        Err(e) => {
            shared.throttle.record(remote.ip());
            return reject(&mut io, remote, ResponseCode::BadCredentials, &format!("{e}")).await;
        }
    };

    let xtea_len = usize::from(io.read_u16().await?);
    ensure!(xtea_len <= 256, "oversized username block ({xtea_len} bytes)");
    let xtea_block = io.read_exact(xtea_len).await?;
    let username = parse_username_block(&seed, &xtea_block)?;

    // Phase 3: the response code.
    match shared
        .callbacks
        .authenticate(&username, &password, remote.ip(), reconnecting)
        .await
    {
        LoginVerdict::Reject(code) => {
            if code == ResponseCode::BadCredentials {
                shared.throttle.record(remote.ip());
            }
            reject(&mut io, remote, code, "authentication refused").await
        }
        LoginVerdict::Accept { profile, code } => {
            io.write(&[code as u8]).await?;
            info!(%remote, username, ?code, "login accepted");

            let cipher_seed = shared.settings.cipher_enabled.then_some(seed);
            let mut decoder = FrameDecoder::new();
            if let Some(seed) = &cipher_seed {
                decoder.enable_cipher(seed);
            }

            let (transport, leftover) = io.into_parts();
            decoder.queue_bytes(leftover);
            let conn = spawn_actor(transport, decoder, remote.to_string());

            let incoming = IncomingPlayer {
                profile,
                ip: remote.ip(),
                reconnecting,
                code,
                conn,
                cipher_seed,
            };
            shared
                .login_tx
                .send_async(incoming)
                .await
                .map_err(|_| anyhow::anyhow!("login queue closed"))?;
            Ok(())
        }
    }
}

/// Decodes the decrypted RSA block: checksum, four cipher seed words, the
/// space-padded password, and the trailing IV.
fn parse_rsa_block(plain: &[u8]) -> anyhow::Result<([u32; 4], String)> {
    let mut r = FrameReader::new(plain);

    let checksum = r.read_u8().context("login block truncated")?;
    ensure!(checksum == RSA_CHECKSUM, "bad login block checksum {checksum}");

    let mut seed = [0_u32; 4];
    for word in &mut seed {
        *word = r.read_u32().context("login block truncated")?;
    }

    let password_raw = r.read_bytes(PASSWORD_LEN).context("login block truncated")?;
    let password = String::from_utf8_lossy(password_raw)
        .trim_matches([' ', '\0'])
        .to_owned();

    r.read_bytes(8).context("login block missing IV")?;

    Ok((seed, password))
}

/// Decodes the XTEA-wrapped username block: a limit flag, 24 bytes of
/// nonce, then the NUL-terminated username.
fn parse_username_block(seed: &[u32; 4], block: &[u8]) -> anyhow::Result<String> {
    let plain = xtea_decipher(seed, block);
    let mut r = FrameReader::new(&plain);

    let _limit_flag = r.read_u8().context("username block truncated")?;
    r.read_bytes(LOGIN_NONCE_LEN)
        .context("username block truncated")?;

    let username = r.read_str().context("username unterminated")?;
    let username = username.trim().to_owned();
    ensure!(!username.is_empty(), "empty username");
    Ok(username)
}

async fn reject(
    io: &mut HandshakeIo,
    remote: SocketAddr,
    code: ResponseCode,
    reason: &str,
) -> anyhow::Result<()> {
    debug!(%remote, ?code, reason, "login rejected");
    io.write(&[code as u8]).await
}

/// Buffered reads over a transport for the bare handshake frames. Bytes
/// that arrive past the handshake transfer into the frame decoder.
struct HandshakeIo {
    transport: Transport,
    buf: BytesMut,
}

impl HandshakeIo {
    fn new(transport: Transport) -> Self {
        Self {
            transport,
            buf: BytesMut::new(),
        }
    }

    async fn read_exact(&mut self, n: usize) -> anyhow::Result<BytesMut> {
        while self.buf.len() < n {
            let read = self.transport.read_buf(&mut self.buf).await?;
            ensure!(read > 0, "connection closed during handshake");
        }
        Ok(self.buf.split_to(n))
    }

    async fn read_u8(&mut self) -> anyhow::Result<u8> {
        Ok(self.read_exact(1).await?[0])
    }

    async fn read_u16(&mut self) -> anyhow::Result<u16> {
        let b = self.read_exact(2).await?;
        Ok(u16::from(b[0]) << 8 | u16::from(b[1]))
    }

    async fn read_u32(&mut self) -> anyhow::Result<u32> {
        let b = self.read_exact(4).await?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    async fn write(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        self.transport.write_all(bytes).await
    }

    fn into_parts(self) -> (Transport, BytesMut) {
        (self.transport, self.buf)
    }
}
