//! Wire message types and codec.
//!
//! Every message exchanged between Interpay peers is a JSON envelope:
//!
//! ```json
//! {"type": "payment_request", "payload": {"id": "...", "amount": 100.0, "currency": "MXN"}}
//! ```
//!
//! The transport already delimits messages, so no length prefix is added.
//! Decoding is defensive: any input that is not a well-formed envelope
//! becomes [`InterpayError::MalformedPayload`], never a panic.

use interpay_types::error::{InterpayError, InterpayResult};
use interpay_types::payment::PaymentRequest;
use serde::{Deserialize, Serialize};

/// Type tag of payment-request messages.
pub const PAYMENT_REQUEST_TYPE: &str = "payment_request";

/// Maximum accepted envelope size (64 KiB). Payment messages are tiny.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// A tagged message unit: type discriminator plus opaque payload body.
///
/// Envelopes are transient; they live only for the duration of one send or
/// receive call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Type tag used by the router to pick a handler.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Payload body, interpreted only by the handler for `message_type`.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl MessageEnvelope {
    pub fn new(message_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            message_type: message_type.into(),
            payload,
        }
    }
}

/// All payloads this version knows how to produce and consume.
///
/// Serializes to exactly the envelope shape, so converting between the two
/// is a JSON value round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum WirePayload {
    /// A merchant asking nearby customers to pay.
    #[serde(rename = "payment_request")]
    PaymentRequest(PaymentRequest),
}

impl WirePayload {
    /// The type tag this payload travels under.
    pub fn message_type(&self) -> &'static str {
        match self {
            WirePayload::PaymentRequest(_) => PAYMENT_REQUEST_TYPE,
        }
    }

    /// Wrap this payload in an envelope.
    pub fn into_envelope(self) -> InterpayResult<MessageEnvelope> {
        let value =
            serde_json::to_value(&self).map_err(|e| InterpayError::Serialization(e.to_string()))?;
        serde_json::from_value(value).map_err(|e| InterpayError::Serialization(e.to_string()))
    }

    /// Interpret an envelope as a known payload.
    ///
    /// Fails with `MalformedPayload` for unknown tags or payloads that do
    /// not match the schema of their tag (including invalid amounts).
    pub fn from_envelope(envelope: &MessageEnvelope) -> InterpayResult<Self> {
        let value = serde_json::to_value(envelope)
            .map_err(|e| InterpayError::MalformedPayload(e.to_string()))?;
        serde_json::from_value(value).map_err(|e| {
            InterpayError::MalformedPayload(format!(
                "invalid '{}' payload: {e}",
                envelope.message_type
            ))
        })
    }
}

/// Encode an envelope to bytes.
pub fn encode_envelope(envelope: &MessageEnvelope) -> InterpayResult<Vec<u8>> {
    if envelope.message_type.is_empty() {
        return Err(InterpayError::Serialization(
            "envelope type tag is empty".to_string(),
        ));
    }
    let bytes =
        serde_json::to_vec(envelope).map_err(|e| InterpayError::Serialization(e.to_string()))?;
    if bytes.len() > MAX_MESSAGE_SIZE {
        return Err(InterpayError::Serialization(format!(
            "envelope too large: {} bytes (max {MAX_MESSAGE_SIZE})",
            bytes.len()
        )));
    }
    Ok(bytes)
}

/// Decode bytes into an envelope.
pub fn decode_envelope(bytes: &[u8]) -> InterpayResult<MessageEnvelope> {
    if bytes.len() > MAX_MESSAGE_SIZE {
        return Err(InterpayError::MalformedPayload(format!(
            "message too large: {} bytes (max {MAX_MESSAGE_SIZE})",
            bytes.len()
        )));
    }
    let envelope: MessageEnvelope = serde_json::from_slice(bytes)
        .map_err(|e| InterpayError::MalformedPayload(e.to_string()))?;
    if envelope.message_type.is_empty() {
        return Err(InterpayError::MalformedPayload(
            "envelope type tag is empty".to_string(),
        ));
    }
    Ok(envelope)
}

/// Encode a known payload straight to bytes.
pub fn encode_payload(payload: WirePayload) -> InterpayResult<Vec<u8>> {
    encode_envelope(&payload.into_envelope()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use interpay_types::payment::CurrencyCode;

    fn request(amount: f64, currency: &str) -> PaymentRequest {
        PaymentRequest::new(amount, CurrencyCode::parse(currency).unwrap()).unwrap()
    }

    #[test]
    fn test_payment_request_roundtrip() {
        let req = request(100.0, "MXN");
        let bytes = encode_payload(WirePayload::PaymentRequest(req.clone())).unwrap();
        let envelope = decode_envelope(&bytes).unwrap();
        assert_eq!(envelope.message_type, PAYMENT_REQUEST_TYPE);
        match WirePayload::from_envelope(&envelope).unwrap() {
            WirePayload::PaymentRequest(decoded) => assert_eq!(decoded, req),
        }
    }

    #[test]
    fn test_roundtrip_preserves_every_amount_bit() {
        let currencies = ["USD", "EUR", "MXN", "PKR"];
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };

        let mut amounts = vec![0.01, 1.5, 123456.78, 994141.4334139935, 112907.75160688077];
        for _ in 0..20_000 {
            // Uniform in [0.01, 1e6].
            let unit = (next() >> 11) as f64 / (1u64 << 53) as f64;
            amounts.push(0.01 + unit * (1e6 - 0.01));
            // Arbitrary positive finite bit patterns.
            let bits = next() & !(1u64 << 63);
            let raw = f64::from_bits(bits);
            if raw.is_finite() && raw > 0.0 {
                amounts.push(raw);
            }
        }

        for (i, amount) in amounts.into_iter().enumerate() {
            let req = request(amount, currencies[i % currencies.len()]);
            let bytes = encode_payload(WirePayload::PaymentRequest(req.clone())).unwrap();
            let decoded = WirePayload::from_envelope(&decode_envelope(&bytes).unwrap()).unwrap();
            let WirePayload::PaymentRequest(decoded) = decoded;
            assert_eq!(
                decoded.amount().to_bits(),
                amount.to_bits(),
                "amount {amount:?} changed on the wire"
            );
            assert_eq!(decoded, req);
        }
    }

    #[test]
    fn test_wire_format() {
        let req = request(100.0, "MXN");
        let bytes = encode_payload(WirePayload::PaymentRequest(req.clone())).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["type"], "payment_request");
        assert_eq!(json["payload"]["currency"], "MXN");
        assert_eq!(json["payload"]["amount"], 100.0);
        assert_eq!(json["payload"]["id"], req.id().to_string());
    }

    #[test]
    fn test_unknown_type_still_decodes_as_envelope() {
        let envelope = decode_envelope(br#"{"type":"ping"}"#).unwrap();
        assert_eq!(envelope.message_type, "ping");
        assert!(envelope.payload.is_null());
        assert!(matches!(
            WirePayload::from_envelope(&envelope),
            Err(InterpayError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let inputs: [&[u8]; 8] = [
            b"",
            b"not json",
            b"{",
            b"[]",
            b"{\"payload\":{}}",
            b"{\"type\":42}",
            b"{\"type\":\"\"}",
            &[0xff, 0xfe, 0x00, 0x7b],
        ];
        for input in inputs {
            assert!(
                matches!(
                    decode_envelope(input),
                    Err(InterpayError::MalformedPayload(_))
                ),
                "expected MalformedPayload for {input:?}"
            );
        }
    }

    #[test]
    fn test_decode_never_panics_on_arbitrary_bytes() {
        // Deterministic xorshift byte soup, including truncations of a
        // valid message.
        let valid = encode_payload(WirePayload::PaymentRequest(request(5.0, "USD"))).unwrap();
        for cut in 0..valid.len() {
            let _ = decode_envelope(&valid[..cut]);
        }

        let mut state: u64 = 0x9e37_79b9_7f4a_7c15;
        for len in 0..256 {
            let bytes: Vec<u8> = (0..len)
                .map(|_| {
                    state ^= state << 13;
                    state ^= state >> 7;
                    state ^= state << 17;
                    (state & 0xff) as u8
                })
                .collect();
            match decode_envelope(&bytes) {
                Ok(env) => assert!(!env.message_type.is_empty()),
                Err(e) => assert!(matches!(e, InterpayError::MalformedPayload(_))),
            }
        }
    }

    #[test]
    fn test_decode_rejects_oversize() {
        let big = vec![b' '; MAX_MESSAGE_SIZE + 1];
        assert!(matches!(
            decode_envelope(&big),
            Err(InterpayError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_payload_with_bad_amount_is_malformed() {
        let envelope = decode_envelope(
            br#"{"type":"payment_request","payload":{"id":"6f1c2a4e-3b7d-4c55-9a61-0d2f6b8e9c10","amount":0,"currency":"MXN"}}"#,
        )
        .unwrap();
        assert!(matches!(
            WirePayload::from_envelope(&envelope),
            Err(InterpayError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_encode_rejects_empty_tag() {
        let envelope = MessageEnvelope::new("", serde_json::Value::Null);
        assert!(matches!(
            encode_envelope(&envelope),
            Err(InterpayError::Serialization(_))
        ));
    }
}
