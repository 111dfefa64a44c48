//! Topic layout of the driver broker
//!
//! Drivers publish under the read prefix, commands to drivers and requests
//! addressed to this controller live under the write prefix:
//!
//! ```text
//! <read>/led/<driver>/setup/hello           driver announcement
//! <read>/led/<driver>/status/dump           periodic status
//! <write>/switch/<mac>/led/setup/config     provisioning request
//! <write>/switch/<mac>/led/update/settings  settings request
//! <write>/<driver topic>/setup/config       outbound setup command
//! <write>/<driver topic>/update/settings    outbound settings command
//! ```

pub const URL_HELLO: &str = "setup/hello";
pub const URL_STATUS: &str = "status/dump";
pub const URL_SETUP: &str = "setup/config";
pub const URL_SETTING: &str = "update/settings";

/// Kind of an inbound message, from its topic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundKind {
    Hello,
    Status,
    Setup,
    Update,
}

/// Topic names for one controller
#[derive(Debug, Clone)]
pub struct TopicLayout {
    read_prefix: String,
    write_prefix: String,
    switch_mac: String,
}

impl TopicLayout {
    pub fn new(
        read_prefix: impl Into<String>,
        write_prefix: impl Into<String>,
        switch_mac: impl Into<String>,
    ) -> Self {
        Self {
            read_prefix: read_prefix.into().trim_end_matches('/').to_string(),
            write_prefix: write_prefix.into().trim_end_matches('/').to_string(),
            switch_mac: switch_mac.into(),
        }
    }

    pub fn hello_pattern(&self) -> String {
        format!("{}/led/+/{}", self.read_prefix, URL_HELLO)
    }

    pub fn status_pattern(&self) -> String {
        format!("{}/led/+/{}", self.read_prefix, URL_STATUS)
    }

    pub fn setup_request_topic(&self) -> String {
        format!("{}/switch/{}/led/{}", self.write_prefix, self.switch_mac, URL_SETUP)
    }

    pub fn update_request_topic(&self) -> String {
        format!("{}/switch/{}/led/{}", self.write_prefix, self.switch_mac, URL_SETTING)
    }

    /// Every pattern the service subscribes to
    pub fn subscriptions(&self) -> Vec<String> {
        vec![
            self.hello_pattern(),
            self.status_pattern(),
            self.setup_request_topic(),
            self.update_request_topic(),
        ]
    }

    /// Classify an inbound topic
    pub fn classify(&self, topic: &str) -> Option<InboundKind> {
        if topic_matches(&self.hello_pattern(), topic) {
            Some(InboundKind::Hello)
        } else if topic_matches(&self.status_pattern(), topic) {
            Some(InboundKind::Status)
        } else if topic == self.setup_request_topic() {
            Some(InboundKind::Setup)
        } else if topic == self.update_request_topic() {
            Some(InboundKind::Update)
        } else {
            None
        }
    }

    /// Driver topic (`led/<driver>`) a status message was published from
    pub fn device_topic(&self, topic: &str) -> Option<String> {
        let rest = topic.strip_prefix(self.read_prefix.as_str())?;
        let mut segments = rest.trim_start_matches('/').split('/');
        match (segments.next(), segments.next()) {
            (Some(kind), Some(device)) if !kind.is_empty() && !device.is_empty() => {
                Some(format!("{}/{}", kind, device))
            }
            _ => None,
        }
    }

    /// Outbound topic for a setup command
    pub fn setup_command_topic(&self, device_topic: &str) -> String {
        format!("{}/{}/{}", self.write_prefix, device_topic.trim_matches('/'), URL_SETUP)
    }

    /// Outbound topic for a settings command
    pub fn settings_command_topic(&self, device_topic: &str) -> String {
        format!("{}/{}/{}", self.write_prefix, device_topic.trim_matches('/'), URL_SETTING)
    }
}

/// MQTT topic filter matching: `+` matches one level, a trailing `#` matches
/// any remainder (including none).
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let mut pattern_levels = pattern.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (pattern_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return pattern_levels.next().is_none(),
            (Some("+"), Some(_)) => continue,
            (Some(p), Some(t)) if p == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}
