//! Subscription filter matching and device key extraction.

use thiserror::Error;

/// Rejected subscription filter.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("topic filter {filter:?} must have exactly one '+' level and no '#'")]
pub struct InvalidTopicFilter {
    /// The offending filter.
    pub filter: String,
}

/// An MQTT filter whose single `+` level carries the device key,
/// e.g. `telemetry/+/readings`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicFilter {
    raw: String,
    levels: Vec<String>,
    device_level: usize,
}

impl TopicFilter {
    /// Parse a filter.
    pub fn parse(filter: &str) -> Result<Self, InvalidTopicFilter> {
        let levels: Vec<String> = filter.split('/').map(str::to_owned).collect();
        let wildcards: Vec<usize> = levels
            .iter()
            .enumerate()
            .filter(|(_, l)| l.as_str() == "+")
            .map(|(i, _)| i)
            .collect();

        match wildcards.as_slice() {
            [device_level] if !filter.contains('#') => Ok(Self {
                raw: filter.to_owned(),
                device_level: *device_level,
                levels,
            }),
            _ => Err(InvalidTopicFilter {
                filter: filter.to_owned(),
            }),
        }
    }

    /// The filter string as subscribed.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The device segment of `topic`, or `None` if `topic` does not match.
    pub fn device_segment<'t>(&self, topic: &'t str) -> Option<&'t str> {
        let mut segment = None;
        let mut parts = topic.split('/');
        for (i, level) in self.levels.iter().enumerate() {
            let part = parts.next()?;
            if i == self.device_level {
                if part.is_empty() {
                    return None;
                }
                segment = Some(part);
            } else if part != level {
                return None;
            }
        }
        if parts.next().is_some() {
            return None;
        }
        segment
    }
}
