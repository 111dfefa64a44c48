//! LED driver type definitions
//!
//! Defines the device record reported by drivers, the provisioning and settings
//! patches sent back to them, and the command envelope wrapping those patches.

use serde::{Deserialize, Deserializer, Serialize};

/// Protocol tag stamped on every device reached through the broker
pub const MQTT_PROTOCOL: &str = "MQTT";

/// A `null` field decodes to the zero value, like an absent one
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Integer field that also accepts `null` and whole floats (`21.0`)
fn number_as_i32<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(value.map(|v| v as i32).unwrap_or_default())
}

/// Full state of one LED driver, as reported on hello/status topics and as
/// persisted in the status table.
///
/// Missing and `null` fields decode to their zero value. The persisted identity is
/// written under `id`; records created by older deployments used `ID`, which
/// is still accepted on read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeviceRecord {
    /// Store-assigned identity, `None` until resolved
    #[serde(rename = "id", alias = "ID", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Hardware address of the driver
    #[serde(deserialize_with = "null_as_default")]
    pub mac: String,
    #[serde(deserialize_with = "null_as_default")]
    pub ip: String,
    #[serde(deserialize_with = "number_as_i32")]
    pub group: i32,
    #[serde(deserialize_with = "null_as_default")]
    pub protocol: String,
    /// Transport topic the driver listens on (e.g. `led/AA11`)
    #[serde(alias = "Topic", deserialize_with = "null_as_default")]
    pub topic: String,
    /// Address of the controller that owns the driver
    #[serde(deserialize_with = "null_as_default")]
    pub switch_mac: String,
    #[serde(deserialize_with = "null_as_default")]
    pub is_configured: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub software_version: f32,
    #[serde(deserialize_with = "null_as_default")]
    pub hardware_version: String,
    #[serde(deserialize_with = "null_as_default")]
    pub is_ble_enabled: bool,
    #[serde(deserialize_with = "number_as_i32")]
    pub temperature: i32,
    #[serde(deserialize_with = "number_as_i32")]
    pub error: i32,
    #[serde(deserialize_with = "number_as_i32")]
    pub reset_numbers: i32,
    #[serde(deserialize_with = "null_as_default")]
    pub initial_setup_date: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub last_reset_date: f64,
    #[serde(deserialize_with = "number_as_i32")]
    pub i_max: i32,
    #[serde(deserialize_with = "number_as_i32")]
    pub slope_start: i32,
    #[serde(deserialize_with = "number_as_i32")]
    pub slope_stop: i32,
    #[serde(deserialize_with = "null_as_default")]
    pub duration: f64,
    #[serde(deserialize_with = "number_as_i32")]
    pub setpoint: i32,
    #[serde(deserialize_with = "number_as_i32")]
    pub thresold_low: i32,
    #[serde(deserialize_with = "number_as_i32")]
    pub thresold_high: i32,
    #[serde(deserialize_with = "null_as_default")]
    pub daisy_chain_enabled: bool,
    #[serde(deserialize_with = "number_as_i32")]
    pub daisy_chain_pos: i32,
    #[serde(deserialize_with = "number_as_i32")]
    pub device_power: i32,
    #[serde(deserialize_with = "null_as_default")]
    pub energy: f64,
    #[serde(deserialize_with = "number_as_i32")]
    pub voltage_led: i32,
    #[serde(deserialize_with = "number_as_i32")]
    pub voltage_input: i32,
    #[serde(deserialize_with = "number_as_i32")]
    pub line_power: i32,
    #[serde(deserialize_with = "number_as_i32")]
    pub time_to_auto: i32,
    #[serde(deserialize_with = "null_as_default")]
    pub auto: bool,
    #[serde(deserialize_with = "number_as_i32")]
    pub watchdog: i32,
    #[serde(deserialize_with = "null_as_default")]
    pub friendly_name: String,
}

impl DeviceRecord {
    /// Persisted identity, ignoring an empty placeholder
    pub fn persisted_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }
}

/// One-time provisioning values sent when a driver is authorized
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSetup {
    #[serde(deserialize_with = "null_as_default")]
    pub mac: String,
    #[serde(default, deserialize_with = "number_as_i32")]
    pub i_max: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watchdog: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_ble_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thresold_high: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thresold_low: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
}

/// Mutable settings pushed to a running driver. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfigUpdate {
    #[serde(deserialize_with = "null_as_default")]
    pub mac: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setpoint: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watchdog: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_configured: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_ble_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thresold_high: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thresold_low: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
}

/// Discriminator carried in every outbound command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Setup,
    Update,
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandKind::Setup => write!(f, "setup"),
            CommandKind::Update => write!(f, "update"),
        }
    }
}

/// Request fields flattened next to the `cmdType` discriminator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope<T> {
    #[serde(flatten)]
    pub request: T,
    #[serde(rename = "cmdType")]
    pub cmd_type: CommandKind,
}

impl<T: Serialize> CommandEnvelope<T> {
    pub fn new(request: T, cmd_type: CommandKind) -> Self {
        Self { request, cmd_type }
    }

    /// Encode the envelope as the JSON text sent on the wire
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
