//! Challenge/response authentication run on every freshly opened socket.
//!
//! The device opens with `{"type":"auth_challenge","nonce":"…"}`. We answer
//! with an HMAC-SHA256 over `nonce:token_name` keyed by the secret, and the
//! device replies `auth_ok` or `auth_rejected`. No other frame is accepted
//! until the exchange completes.

use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::error::Error;
use crate::transport::Credentials;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AuthMessage {
    AuthChallenge {
        nonce: String,
    },
    AuthOk,
    AuthRejected {
        #[serde(default)]
        reason: Option<String>,
    },
}

/// Hex-encoded `HMAC-SHA256(secret, nonce ":" token_name)`.
pub fn digest(secret: &str, nonce: &str, token_name: &str) -> Result<String, Error> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes()).map_err(|e| Error::AuthenticationFailed {
        reason: format!("unusable secret key: {e}"),
    })?;
    mac.update(nonce.as_bytes());
    mac.update(b":");
    mac.update(token_name.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// The reply frame for a challenge.
pub fn auth_reply(credentials: &Credentials, nonce: &str) -> Result<String, Error> {
    let digest = digest(credentials.secret_key.expose_secret(), nonce, &credentials.token_name)?;
    Ok(json!({
        "type": "auth",
        "token_name": credentials.token_name,
        "digest": digest,
    })
    .to_string())
}

/// Run the handshake on `ws`, failing with `AuthenticationFailed` if it is
/// rejected, the socket closes, or `timeout` elapses first.
pub async fn authenticate<S>(ws: &mut S, credentials: &Credentials, timeout: Duration) -> Result<(), Error>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Sink<Message, Error = tungstenite::Error> + Unpin,
{
    match tokio::time::timeout(timeout, exchange(ws, credentials)).await {
        Ok(result) => result,
        Err(_) => Err(Error::AuthenticationFailed {
            reason: format!("handshake did not complete within {}ms", timeout.as_millis()),
        }),
    }
}

async fn exchange<S>(ws: &mut S, credentials: &Credentials) -> Result<(), Error>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let AuthMessage::AuthChallenge { nonce } = next_auth_message(ws).await? else {
        return Err(rejected("device did not open with an auth challenge"));
    };
    tracing::debug!("auth challenge received");

    ws.send(Message::text(auth_reply(credentials, &nonce)?))
        .await
        .map_err(|e| Error::ConnectionFailed(e.to_string()))?;

    match next_auth_message(ws).await? {
        AuthMessage::AuthOk => Ok(()),
        AuthMessage::AuthRejected { reason } => Err(Error::AuthenticationFailed {
            reason: reason.unwrap_or_else(|| "secret key rejected".into()),
        }),
        AuthMessage::AuthChallenge { .. } => Err(rejected("device repeated the challenge")),
    }
}

/// Read until the next text frame and parse it as an auth message.
async fn next_auth_message<S>(ws: &mut S) -> Result<AuthMessage, Error>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                return serde_json::from_str(text.as_str())
                    .map_err(|e| rejected(&format!("unexpected frame during handshake: {e}")));
            }
            Some(Ok(Message::Close(frame))) => {
                let reason = frame.map_or_else(|| "no reason".to_owned(), |cf| format!("{} {}", cf.code, cf.reason.as_str()));
                return Err(rejected(&format!("device closed the socket during handshake ({reason})")));
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(Error::ConnectionFailed(e.to_string())),
            None => return Err(rejected("socket ended during handshake")),
        }
    }
}

fn rejected(reason: &str) -> Error {
    Error::AuthenticationFailed {
        reason: reason.to_owned(),
    }
}
