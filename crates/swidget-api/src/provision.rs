// Wi-Fi provisioning for a device in access-point mode.
//
// A fresh device hosts its own hotspot and answers at 10.123.45.1. The flow
// is: post network credentials, poll until the device reports it joined the
// network, then call `setup_complete` so it leaves AP mode right away.

use std::time::Duration;

use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::error::Error;
use crate::transport::{DEFAULT_TOKEN_NAME, TlsMode, TransportConfig};

/// Address the device serves while in AP mode.
pub const AP_MODE_BASE_URL: &str = "https://10.123.45.1";

/// Retry policy for the provisioning calls.
#[derive(Debug, Clone)]
pub struct ProvisionPolicy {
    /// Attempts for both the credential post and the status poll.
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for ProvisionPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            interval: Duration::from_secs(5),
        }
    }
}

/// What to send to the device.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub device_name: String,
    pub ssid: String,
    pub network_password: SecretString,
    /// Empty asks the device to generate its own key.
    pub secret_key: SecretString,
}

/// Outcome of a successful provisioning run.
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub ip: String,
    pub mac: String,
    /// The key the device settled on; use it for all later requests.
    pub secret_key: SecretString,
}

/// Connection status reported by `GET /network`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum ConnectStatus {
    #[serde(rename = "NotInitiated")]
    NotStarted,
    #[serde(alias = "AttemptingConnect")]
    InProgress,
    Success,
    #[serde(rename = "AuthFail")]
    AuthenticationFailure,
    #[serde(rename = "SSIDNotFound")]
    SsidNotFound,
    #[serde(rename = "NoIpReceived")]
    NoIp,
    #[serde(rename = "FailedToConnect")]
    ConnectionFailure,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct CredentialsAccepted {
    #[serde(rename = "secretKey", default)]
    secret_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NetworkStatus {
    status: ConnectStatus,
    #[serde(default)]
    ip: Option<String>,
    #[serde(default)]
    mac: Option<String>,
}

/// Client for the AP-mode provisioning endpoints.
pub struct Provisioner {
    http: reqwest::Client,
    base_url: Url,
    policy: ProvisionPolicy,
}

impl Provisioner {
    /// Provisioner for the standard AP-mode address. The device uses a
    /// self-signed certificate, so verification is off.
    pub fn new(policy: ProvisionPolicy) -> Result<Self, Error> {
        let transport = TransportConfig {
            use_https: true,
            tls: TlsMode::DangerAcceptInvalid,
            timeout: Duration::from_secs(10),
        };
        Ok(Self {
            http: transport.build_client()?,
            base_url: Url::parse(AP_MODE_BASE_URL)?,
            policy,
        })
    }

    /// Provisioner against an arbitrary base URL.
    pub fn with_client(http: reqwest::Client, base_url: Url, policy: ProvisionPolicy) -> Self {
        Self {
            http,
            base_url,
            policy,
        }
    }

    /// Run the whole flow: credentials, status poll, setup complete.
    pub async fn provision_wifi(&self, request: &ProvisionRequest) -> Result<Provisioned, Error> {
        tracing::info!(device_name = %request.device_name, ssid = %request.ssid, "provisioning device");

        let secret_key = self.send_credentials(request).await?;
        let (ip, mac) = self.verify_connection(&secret_key).await?;
        tracing::info!(%ip, %mac, "device joined the network");

        self.complete_setup(&secret_key).await?;
        Ok(Provisioned { ip, mac, secret_key })
    }

    /// `POST /network`. Transport failures are retried; an HTTP error status
    /// fails immediately. Returns the key the device accepted.
    pub async fn send_credentials(&self, request: &ProvisionRequest) -> Result<SecretString, Error> {
        let url = self.base_url.join("/network")?;
        let body = json!({
            "name": request.device_name,
            "ssid": request.ssid,
            "password": request.network_password.expose_secret(),
            "secretKey": request.secret_key.expose_secret(),
        });

        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::debug!(attempt, "sending network credentials");
            match self.http.request(Method::POST, url.clone()).json(&body).send().await {
                Ok(resp) if resp.status().is_success() => {
                    let accepted: CredentialsAccepted = resp.json().await.map_err(Error::Transport)?;
                    let key = accepted
                        .secret_key
                        .filter(|k| !k.is_empty())
                        .map_or_else(|| request.secret_key.clone(), SecretString::from);
                    return Ok(key);
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    return Err(Error::Provisioning {
                        reason: format!("device refused credentials (HTTP {status}): {body}"),
                    });
                }
                Err(e) if attempt >= self.policy.attempts => {
                    return Err(Error::Provisioning {
                        reason: format!(
                            "could not reach the device after {attempt} attempts ({e}); \
                             make sure you are connected to its hotspot"
                        ),
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "credential post failed, retrying");
                    tokio::time::sleep(self.policy.interval).await;
                }
            }
        }
    }

    /// Poll `GET /network` until the device reports `Success`. Returns the
    /// address and MAC it got on the new network.
    pub async fn verify_connection(&self, secret_key: &SecretString) -> Result<(String, String), Error> {
        let url = self.base_url.join("/network")?;

        for attempt in 1..=self.policy.attempts {
            match self.get_with_key(url.clone(), secret_key).await {
                Ok(resp) if resp.status().is_success() => {
                    let status: NetworkStatus = resp.json().await.map_err(Error::Transport)?;
                    tracing::debug!(attempt, status = ?status.status, "network status");
                    match status.status {
                        ConnectStatus::Success => {
                            return Ok((status.ip.unwrap_or_default(), status.mac.unwrap_or_default()));
                        }
                        ConnectStatus::InProgress | ConnectStatus::NotStarted => {}
                        other => {
                            return Err(Error::Provisioning {
                                reason: format!("device could not join the network: {other:?}"),
                            });
                        }
                    }
                }
                Ok(resp) => tracing::warn!(attempt, status = %resp.status(), "status poll rejected"),
                Err(e) => tracing::warn!(attempt, error = %e, "status poll failed"),
            }
            if attempt < self.policy.attempts {
                tokio::time::sleep(self.policy.interval).await;
            }
        }

        Err(Error::Provisioning {
            reason: format!("device did not confirm the connection after {} attempts", self.policy.attempts),
        })
    }

    /// `GET /setup_complete`: switch the device out of AP mode.
    pub async fn complete_setup(&self, secret_key: &SecretString) -> Result<(), Error> {
        let url = self.base_url.join("/setup_complete")?;
        let resp = self.get_with_key(url, secret_key).await.map_err(Error::Transport)?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(Error::Provisioning {
                reason: format!("setup_complete returned HTTP {}", resp.status()),
            })
        }
    }

    async fn get_with_key(&self, url: Url, secret_key: &SecretString) -> Result<reqwest::Response, reqwest::Error> {
        self.http
            .get(url)
            .header(DEFAULT_TOKEN_NAME, secret_key.expose_secret())
            .send()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_status_wire_names() {
        let parse = |s: &str| serde_json::from_value::<ConnectStatus>(json!(s)).expect("status");
        assert_eq!(parse("Success"), ConnectStatus::Success);
        assert_eq!(parse("InProgress"), ConnectStatus::InProgress);
        assert_eq!(parse("AttemptingConnect"), ConnectStatus::InProgress);
        assert_eq!(parse("AuthFail"), ConnectStatus::AuthenticationFailure);
        assert_eq!(parse("SSIDNotFound"), ConnectStatus::SsidNotFound);
        assert_eq!(parse("SomethingNew"), ConnectStatus::Unknown);
    }

    #[test]
    fn default_policy() {
        let policy = ProvisionPolicy::default();
        assert_eq!(policy.attempts, 5);
        assert_eq!(policy.interval, Duration::from_secs(5));
    }
}
