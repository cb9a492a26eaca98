//! Broker credentials and topic names derived from the device identity.
//!
//! The IoT platform authenticates a device with a signed CONNECT:
//!
//! ```text
//! client id : {deviceName}|securemode=3,signmethod=hmacsha1,timestamp={ms}|
//! username  : {deviceName}&{productKey}
//! password  : hex(HMAC-SHA1(deviceSecret,
//!               "clientId{dn}deviceName{dn}productKey{pk}timestamp{ms}"))
//! ```
//!
//! Credentials are computed once, when the client is constructed.

use core::fmt::Write as _;

use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::config::DeviceConfig;
use crate::error::{Error, Result};

type HmacSha1 = Hmac<Sha1>;

/// Product / device triple issued by the IoT platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub product_key: String,
    pub device_name: String,
    pub device_secret: String,
}

impl From<&DeviceConfig> for DeviceIdentity {
    fn from(cfg: &DeviceConfig) -> Self {
        Self {
            product_key: cfg.product_key.clone(),
            device_name: cfg.device_name.clone(),
            device_secret: cfg.device_secret.clone(),
        }
    }
}

/// CONNECT credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub username: String,
    pub password: String,
}

// Keeps the password out of logs.
impl core::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Sign credentials for `identity` at wall-clock `timestamp_ms`.
    pub fn derive(identity: &DeviceIdentity, timestamp_ms: u64) -> Result<Self> {
        let dn = &identity.device_name;
        let pk = &identity.product_key;

        let client_id = format!("{dn}|securemode=3,signmethod=hmacsha1,timestamp={timestamp_ms}|");
        let username = format!("{dn}&{pk}");
        let content = format!("clientId{dn}deviceName{dn}productKey{pk}timestamp{timestamp_ms}");
        let password = hmac_sha1_hex(identity.device_secret.as_bytes(), content.as_bytes())?;

        Ok(Self {
            client_id,
            username,
            password,
        })
    }
}

/// Lowercase hex HMAC-SHA1 of `data` keyed by `key`.
pub fn hmac_sha1_hex(key: &[u8], data: &[u8]) -> Result<String> {
    let mut mac =
        HmacSha1::new_from_slice(key).map_err(|_| Error::Config("invalid HMAC key length"))?;
    mac.update(data);
    let digest = mac.finalize().into_bytes();

    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    Ok(hex)
}

/// Topic names for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    /// Telemetry upload (thing property post).
    pub post: String,
    /// Cloud → device property set; the single command subscription.
    pub set: String,
    /// Sub-device session login (declared, unused by this controller).
    pub login: String,
    /// Sub-device session logout (declared, unused by this controller).
    pub logout: String,
}

impl Topics {
    pub fn for_device(identity: &DeviceIdentity) -> Self {
        let pk = &identity.product_key;
        let dn = &identity.device_name;
        Self {
            post: format!("/sys/{pk}/{dn}/thing/event/property/post"),
            set: format!("/sys/{pk}/{dn}/thing/service/property/set"),
            login: format!("/ext/session/{pk}/{dn}/combine/login"),
            logout: format!("/ext/session/{pk}/{dn}/combine/logout"),
        }
    }
}
