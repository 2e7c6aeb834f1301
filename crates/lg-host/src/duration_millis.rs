// SPDX-License-Identifier: MIT OR Apache-2.0
//! Serde helper: `Duration` as integer milliseconds.
//!
//! Use with `#[serde(with = "crate::duration_millis")]`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;

pub(crate) fn serialize<S: Serializer>(val: &Duration, ser: S) -> Result<S::Ok, S::Error> {
    (val.as_millis() as u64).serialize(ser)
}

pub(crate) fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
    let ms: u64 = u64::deserialize(de)?;
    Ok(Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Wrapper {
        #[serde(with = "crate::duration_millis")]
        wait: Duration,
    }

    #[test]
    fn writes_whole_millis() {
        let w = Wrapper {
            wait: Duration::from_micros(2_500_900),
        };
        assert_eq!(serde_json::to_string(&w).unwrap(), r#"{"wait":2500}"#);
    }

    #[test]
    fn reads_millis() {
        let w: Wrapper = serde_json::from_str(r#"{"wait":1500}"#).unwrap();
        assert_eq!(w.wait, Duration::from_millis(1500));
    }
}
