//! Broker topic decoding.
//!
//! Topics follow `<namespace>/<deviceId>/<metricSuffix>`. The namespace is not
//! interpreted here; the subscription patterns decide which namespaces arrive.

use crate::errors::{Error, Result};
use crate::model::{KIND_HUMIDITY, KIND_TEMPERATURE};

/// Identity and metric carried by a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTopic {
    pub device_id: String,
    pub metric_kind: String,
}

/// Splits a topic into device id and metric kind.
///
/// Segments past the third are ignored, so `sensor/potA/soil/moisture`
/// yields kind `soil`.
pub fn decode_topic(topic: &str) -> Result<DecodedTopic> {
    let mut parts = topic.split('/');
    let (Some(_namespace), Some(device_id), Some(suffix)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return Err(Error::MalformedTopic(format!(
            "expected <namespace>/<device>/<metric>, got '{}'",
            topic
        )));
    };

    if device_id.is_empty() {
        return Err(Error::MalformedTopic(format!(
            "empty device segment in '{}'",
            topic
        )));
    }
    if suffix.is_empty() {
        return Err(Error::MalformedTopic(format!(
            "empty metric segment in '{}'",
            topic
        )));
    }

    Ok(DecodedTopic {
        device_id: device_id.to_string(),
        metric_kind: metric_kind(suffix),
    })
}

/// Maps a short metric suffix to its canonical kind. Unknown suffixes pass
/// through unchanged.
pub fn metric_kind(suffix: &str) -> String {
    match suffix {
        "temp" => KIND_TEMPERATURE.to_string(),
        "hum" => KIND_HUMIDITY.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_temperature_topic() {
        let decoded = decode_topic("sensor/potA/temp").unwrap();
        assert_eq!(decoded.device_id, "potA");
        assert_eq!(decoded.metric_kind, "temperature");
    }

    #[test]
    fn test_decode_humidity_topic() {
        let decoded = decode_topic("sensor/plant-42/hum").unwrap();
        assert_eq!(decoded.device_id, "plant-42");
        assert_eq!(decoded.metric_kind, "humidity");
    }

    #[test]
    fn test_unknown_suffix_passes_through() {
        let decoded = decode_topic("sensor/potB/light").unwrap();
        assert_eq!(decoded.metric_kind, "light");

        let nested = decode_topic("sensor/potB/soil/moisture").unwrap();
        assert_eq!(nested.device_id, "potB");
        assert_eq!(nested.metric_kind, "soil");

        let deep = decode_topic("sensor/potC/temp/raw/extra").unwrap();
        assert_eq!(deep.device_id, "potC");
        assert_eq!(deep.metric_kind, "temperature");
    }

    #[test]
    fn test_short_topics_are_malformed() {
        for topic in ["", "sensor", "sensor/potA", "sensor/potA/", "sensor//temp"] {
            assert!(
                matches!(decode_topic(topic), Err(Error::MalformedTopic(_))),
                "topic {:?} should be rejected",
                topic
            );
        }
    }
}
