//! Device channels: independently addressable outputs of a device.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::NotFoundError;

/// Metadata about one channel of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub index: usize,
    pub name: Option<String>,
    pub channel_type: Option<String>,
    pub is_master: bool,
}

impl ChannelInfo {
    /// Whether the channel drives a USB output.
    #[must_use]
    pub fn is_usb(&self) -> bool {
        self.channel_type.as_deref() == Some("USB")
    }
}

/// Key used to resolve a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKey<'a> {
    Index(usize),
    Name(&'a str),
}

impl From<usize> for ChannelKey<'_> {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl<'a> From<&'a str> for ChannelKey<'a> {
    fn from(name: &'a str) -> Self {
        Self::Name(name)
    }
}

impl fmt::Display for ChannelKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{index}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// Build the channel list from the `channels` array of a discovery record.
///
/// Indices follow array order; the first channel is the master channel.
#[must_use]
pub fn parse_channels(raw: &[serde_json::Value]) -> Vec<ChannelInfo> {
    raw.iter()
        .enumerate()
        .map(|(index, value)| ChannelInfo {
            index,
            name: value
                .get("devName")
                .or_else(|| value.get("name"))
                .and_then(serde_json::Value::as_str)
                .filter(|name| !name.is_empty())
                .map(str::to_string),
            channel_type: value
                .get("type")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string),
            is_master: index == 0,
        })
        .collect()
}

/// Resolve exactly one channel matching `key`.
///
/// # Errors
///
/// Returns [`NotFoundError`] when zero or more than one channel matches.
pub fn lookup<'c>(
    channels: &'c [ChannelInfo],
    key: ChannelKey<'_>,
) -> Result<&'c ChannelInfo, NotFoundError> {
    let mut matches = channels.iter().filter(|channel| match key {
        ChannelKey::Index(index) => channel.index == index,
        ChannelKey::Name(name) => channel.name.as_deref() == Some(name),
    });

    match (matches.next(), matches.next()) {
        (Some(channel), None) => Ok(channel),
        _ => Err(NotFoundError {
            entity: "Channel",
            id: key.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Vec<ChannelInfo> {
        parse_channels(&[
            json!({}),
            json!({"type": "Switch", "devName": "Lamp"}),
            json!({"type": "USB", "devName": "Charger"}),
        ])
    }

    #[test]
    fn should_assign_dense_indices_and_master() {
        let channels = sample();
        assert_eq!(channels.len(), 3);
        assert!(channels[0].is_master);
        assert!(!channels[1].is_master);
        assert_eq!(channels[2].index, 2);
        assert!(channels[2].is_usb());
    }

    #[test]
    fn should_return_empty_list_without_channel_data() {
        assert!(parse_channels(&[]).is_empty());
    }

    #[test]
    fn should_find_channel_by_unique_name() {
        let channels = sample();
        let channel = lookup(&channels, ChannelKey::Name("Lamp")).unwrap();
        assert_eq!(channel.index, 1);
    }

    #[test]
    fn should_fail_when_index_is_missing() {
        let channels = sample();
        let err = lookup(&channels, ChannelKey::Index(7)).unwrap_err();
        assert_eq!(err.entity, "Channel");
        assert_eq!(err.id, "7");
    }

    #[test]
    fn should_fail_when_name_matches_multiple_channels() {
        let mut channels = sample();
        channels[2].name = Some("Lamp".to_string());
        assert!(lookup(&channels, ChannelKey::Name("Lamp")).is_err());
    }

    #[test]
    fn should_fail_when_index_matches_multiple_channels() {
        let mut channels = sample();
        channels[2].index = 1;
        assert!(lookup(&channels, ChannelKey::Index(1)).is_err());
    }
}
