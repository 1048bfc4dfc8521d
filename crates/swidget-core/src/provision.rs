// ── Wi-Fi provisioning ──

pub use swidget_api::provision::{AP_MODE_BASE_URL, ProvisionPolicy, ProvisionRequest, Provisioned};

use swidget_api::Provisioner;

use crate::error::CoreError;

/// Join a device in AP mode to a Wi-Fi network and return its new address.
pub async fn provision_wifi(request: &ProvisionRequest, policy: ProvisionPolicy) -> Result<Provisioned, CoreError> {
    let provisioner = Provisioner::new(policy)?;
    Ok(provisioner.provision_wifi(request).await?)
}
