// JSON is the only encoding on the wire; these keep the error mapping in one place
use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};

/// Serialize to compact JSON
pub fn serialize<T: Serialize>(data: &T) -> Result<String> {
    serde_json::to_string(data)
        .map_err(|e| LedgerError::Serialization(format!("Serialization failed: {e}")))
}

/// Deserialize a payload received from a peer or client
pub fn deserialize<T>(text: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_str(text)
        .map_err(|e| LedgerError::ProtocolDecode(format!("Deserialization failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestData {
        id: u64,
        name: String,
        values: Vec<i32>,
    }

    #[test]
    fn test_serialize_deserialize() {
        let original = TestData {
            id: 42,
            name: "test".to_string(),
            values: vec![1, 2, 3, 4, 5],
        };

        let serialized = serialize(&original).expect("Serialization should work");
        let deserialized: TestData = deserialize(&serialized).expect("Deserialization should work");

        assert_eq!(original, deserialized);
    }

    #[test]
    fn test_serialize_is_compact() {
        let data = TestData {
            id: 1,
            name: "a".to_string(),
            values: vec![],
        };
        assert_eq!(serialize(&data).unwrap(), r#"{"id":1,"name":"a","values":[]}"#);
    }

    #[test]
    fn test_deserialize_invalid_data() {
        let result: Result<TestData> = deserialize("{\"id\": \"nope\"");
        assert!(matches!(result, Err(LedgerError::ProtocolDecode(_))));
    }
}
