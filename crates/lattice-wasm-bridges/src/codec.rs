//! Encoding helpers shared by the bridges.
//!
//! Argument payloads cross the byte channel as JSON; results come back as
//! UTF-8 text whose interpretation is contract-specific (an index list, a
//! sentinel, an address, a JSON-encoded instance).

use serde::Serialize;

use lattice_wasm_runtime::{WasmError, WasmResult};

/// Encode a bridge argument struct to its JSON byte payload.
pub(crate) fn to_json_bytes<T: Serialize>(value: &T) -> WasmResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|err| WasmError::EncodeArgs(err.to_string()))
}

/// Decode guest result bytes as UTF-8, naming the module on failure.
pub(crate) fn utf8_result(module: &str, bytes: Vec<u8>) -> WasmResult<String> {
    String::from_utf8(bytes).map_err(|err| WasmError::InvalidGuestResult {
        module: module.to_string(),
        detail: format!("result is not valid UTF-8: {err}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_result_rejects_invalid_bytes() {
        match utf8_result("M.wasm", vec![0xff, 0xfe]) {
            Err(WasmError::InvalidGuestResult { module, .. }) => assert_eq!(module, "M.wasm"),
            other => panic!("expected InvalidGuestResult, got {other:?}"),
        }
    }

    #[test]
    fn test_to_json_bytes() -> WasmResult<()> {
        #[derive(Serialize)]
        struct Probe {
            key: &'static str,
        }
        let bytes = to_json_bytes(&Probe { key: "value" })?;
        assert_eq!(bytes, br#"{"key":"value"}"#);
        Ok(())
    }
}
