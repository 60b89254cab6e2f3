// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-collection accumulation of serialized objects.
//!
//! Payloads are kept as raw bytes and joined into a JSON array only when the buffer is
//! drained, so each object is encoded exactly once.

/// Serialized objects waiting to be flushed, in insertion order.
///
/// Owned by a single worker; no internal synchronization.
#[derive(Debug, Default)]
pub struct Buffer {
    payloads: Vec<Vec<u8>>,
    size: usize,
}

impl Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, payload: Vec<u8>) {
        self.size += payload.len();
        self.payloads.push(payload);
    }

    /// Sum of the lengths of all buffered payloads
    pub fn size_bytes(&self) -> usize {
        self.size
    }

    pub fn count(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    pub fn reset(&mut self) {
        self.payloads.clear();
        self.size = 0;
    }

    /// Joins the buffered payloads into `[p0,p1,...]` and leaves the buffer empty.
    ///
    /// Payload bytes are copied verbatim; an empty buffer yields `[]`.
    pub fn drain_as_array(&mut self) -> Vec<u8> {
        // brackets plus one separator between each pair
        let capacity = self.size + self.payloads.len().saturating_sub(1) + 2;
        let mut array = Vec::with_capacity(capacity);
        array.push(b'[');
        for (i, payload) in self.payloads.iter().enumerate() {
            if i > 0 {
                array.push(b',');
            }
            array.extend_from_slice(payload);
        }
        array.push(b']');
        self.reset();
        array
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{json, Value};

    #[test]
    fn test_new_buffer() {
        let buf = Buffer::new();
        assert_eq!(buf.count(), 0);
        assert_eq!(buf.size_bytes(), 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_append() {
        let mut buf = Buffer::new();
        let json1 = br#"{"string": "test", "int": 1}"#.to_vec();
        let json2 = br#"{"string": "test", "int": 46}"#.to_vec();
        let (len1, len2) = (json1.len(), json2.len());

        buf.append(json1);
        assert_eq!(buf.count(), 1);
        assert_eq!(buf.size_bytes(), len1);

        buf.append(json2);
        assert_eq!(buf.count(), 2);
        assert_eq!(buf.size_bytes(), len1 + len2);
    }

    #[test]
    fn test_reset() {
        let mut buf = Buffer::new();
        buf.append(br#"{"string": "test_3", "int": 1000}"#.to_vec());
        buf.append(br#"{"string": "test_4", "float": -1.0}"#.to_vec());

        buf.reset();
        assert_eq!(buf.count(), 0);
        assert_eq!(buf.size_bytes(), 0);
    }

    #[test]
    fn test_drain_empty_array() {
        let mut buf = Buffer::new();
        let res = buf.drain_as_array();
        assert_eq!(res, b"[]");

        let v: Vec<Value> = serde_json::from_slice(&res).expect("valid json");
        assert!(v.is_empty());
    }

    #[test]
    fn test_drain_single() {
        let mut buf = Buffer::new();
        let json1 = r#"{"string": "test", "int": 1}"#;
        buf.append(json1.as_bytes().to_vec());

        let res = buf.drain_as_array();
        assert_eq!(String::from_utf8(res.clone()).unwrap(), format!("[{json1}]"));

        let v: Vec<Value> = serde_json::from_slice(&res).expect("valid json");
        assert_eq!(v.len(), 1);
        assert_eq!(v[0]["string"], json!("test"));
        assert_eq!(v[0]["int"], json!(1));
    }

    #[test]
    fn test_drain_multiple_preserves_order_and_resets() {
        let mut buf = Buffer::new();
        let json1 = r#"{"string": "test", "int": 1}"#;
        let json2 = r#"{"string": "test", "int": 46}"#;
        let json3 = r#"{"string": "test_3", "int": -1.0}"#;
        for payload in [json1, json2, json3] {
            buf.append(payload.as_bytes().to_vec());
        }

        let res = buf.drain_as_array();
        assert_eq!(
            String::from_utf8(res.clone()).unwrap(),
            format!("[{json1},{json2},{json3}]")
        );

        let v: Vec<Value> = serde_json::from_slice(&res).expect("valid json");
        assert_eq!(v.len(), 3);
        assert_eq!(v[1]["int"], json!(46));
        assert_eq!(v[2]["string"], json!("test_3"));

        assert_eq!(buf.count(), 0);
        assert_eq!(buf.size_bytes(), 0);
    }

    proptest! {
        #[test]
        fn prop_size_and_count_track_appends(payloads in prop::collection::vec(".{0,64}", 0..32)) {
            let mut buf = Buffer::new();
            let mut expected = 0;
            for (i, payload) in payloads.iter().enumerate() {
                buf.append(payload.as_bytes().to_vec());
                expected += payload.len();
                prop_assert_eq!(buf.size_bytes(), expected);
                prop_assert_eq!(buf.count(), i + 1);
            }
            buf.reset();
            prop_assert_eq!(buf.size_bytes(), 0);
            prop_assert_eq!(buf.count(), 0);
        }
    }
}
