//! Response envelopes

use serde::{Deserialize, Serialize};

/// Uniform JSON error envelope. `error` is a stable machine-readable slug;
/// nothing about the rejected request is echoed back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let body = ErrorBody::new("idempotency_conflict");
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, r#"{"success":false,"error":"idempotency_conflict"}"#);
    }
}
