use crate::parsers::parse_duration;
use serde::{Deserialize, Deserializer};
use std::time::Duration;

pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(serde::de::Error::custom)
}

pub fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    if duration.subsec_nanos() == 0 {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    } else {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Timeouts {
        #[serde(serialize_with = "serialize_duration", deserialize_with = "deserialize_duration")]
        keepalive: Duration,
        #[serde(serialize_with = "serialize_duration", deserialize_with = "deserialize_duration")]
        connect: Duration,
    }

    #[test]
    fn test_duration_json() {
        let timeouts = Timeouts { keepalive: Duration::from_millis(1500), connect: Duration::from_secs(5) };
        let json = serde_json::to_string(&timeouts).unwrap();
        assert_eq!(json, r#"{"keepalive":"1500ms","connect":"5s"}"#);
        assert_eq!(serde_json::from_str::<Timeouts>(&json).unwrap(), timeouts);
    }
}
