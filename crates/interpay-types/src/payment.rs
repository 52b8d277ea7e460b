//! Payment request value types.

use crate::error::{InterpayError, InterpayResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier returned to the sender so it can correlate a request later.
pub type RequestId = Uuid;

/// ISO-4217-shaped currency code: exactly three uppercase ASCII letters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Validate and wrap a currency code. Lowercase input is rejected rather
    /// than normalized so the wire value is exactly what the sender typed.
    pub fn parse(code: &str) -> InterpayResult<Self> {
        if code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase()) {
            Ok(Self(code.to_string()))
        } else {
            Err(InterpayError::InvalidCurrency(code.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The catalog entry for this code, if it is one the charge screen offers.
    pub fn known(&self) -> Option<Currency> {
        Currency::ALL.iter().copied().find(|c| c.code() == self.0)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = InterpayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl From<Currency> for CurrencyCode {
    fn from(currency: Currency) -> Self {
        Self(currency.code().to_string())
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = InterpayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Currencies offered when creating a charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Currency {
    Pkr,
    Peb,
    Egg,
    Cad,
    Sgd,
    #[default]
    Mxn,
    Gbp,
    Zar,
    Eur,
    Usd,
}

impl Currency {
    /// Every supported currency, in picker order.
    pub const ALL: [Currency; 10] = [
        Currency::Pkr,
        Currency::Peb,
        Currency::Egg,
        Currency::Cad,
        Currency::Sgd,
        Currency::Mxn,
        Currency::Gbp,
        Currency::Zar,
        Currency::Eur,
        Currency::Usd,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Currency::Pkr => "PKR",
            Currency::Peb => "PEB",
            Currency::Egg => "EGG",
            Currency::Cad => "CAD",
            Currency::Sgd => "SGD",
            Currency::Mxn => "MXN",
            Currency::Gbp => "GBP",
            Currency::Zar => "ZAR",
            Currency::Eur => "EUR",
            Currency::Usd => "USD",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Currency::Pkr => "\u{20a8}",
            Currency::Peb => "\u{a3}",
            Currency::Egg => "E\u{a3}",
            Currency::Cad | Currency::Sgd | Currency::Mxn | Currency::Usd => "$",
            Currency::Gbp => "\u{a3}",
            Currency::Zar => "R",
            Currency::Eur => "\u{20ac}",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Currency::Pkr => "Pakistani Rupee",
            Currency::Peb => "Russian Ruble",
            Currency::Egg => "Egyptian Pound",
            Currency::Cad => "Canadian Dollar",
            Currency::Sgd => "Singapore Dollar",
            Currency::Mxn => "Mexican Peso",
            Currency::Gbp => "British Pound",
            Currency::Zar => "South African Rand",
            Currency::Eur => "Euro",
            Currency::Usd => "US Dollar",
        }
    }
}

/// A request for payment sent from a merchant to nearby customers.
///
/// Immutable once built. `amount` is always finite and strictly positive;
/// both [`PaymentRequest::new`] and deserialization enforce it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPaymentRequest")]
pub struct PaymentRequest {
    id: Uuid,
    amount: f64,
    currency: CurrencyCode,
}

/// Unvalidated wire shape of a payment request.
#[derive(Deserialize)]
struct RawPaymentRequest {
    id: Uuid,
    amount: f64,
    currency: CurrencyCode,
}

impl TryFrom<RawPaymentRequest> for PaymentRequest {
    type Error = InterpayError;

    fn try_from(raw: RawPaymentRequest) -> Result<Self, Self::Error> {
        Self::with_id(raw.id, raw.amount, raw.currency)
    }
}

impl PaymentRequest {
    /// Build a request with a fresh random id.
    pub fn new(amount: f64, currency: CurrencyCode) -> InterpayResult<Self> {
        Self::with_id(Uuid::new_v4(), amount, currency)
    }

    /// Build a request with a caller-chosen id.
    pub fn with_id(id: Uuid, amount: f64, currency: CurrencyCode) -> InterpayResult<Self> {
        if !amount.is_finite() {
            return Err(InterpayError::InvalidAmount(format!(
                "amount must be finite, got {amount}"
            )));
        }
        if amount <= 0.0 {
            return Err(InterpayError::InvalidAmount(format!(
                "amount must be positive, got {amount}"
            )));
        }
        Ok(Self {
            id,
            amount,
            currency,
        })
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }
}

impl std::fmt::Display for PaymentRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.currency.known() {
            Some(c) => write!(f, "{}{:.2} {}", c.symbol(), self.amount, self.currency),
            None => write!(f, "{:.2} {}", self.amount, self.currency),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mxn() -> CurrencyCode {
        CurrencyCode::parse("MXN").unwrap()
    }

    #[test]
    fn test_currency_code_validation() {
        assert!(CurrencyCode::parse("USD").is_ok());
        assert!(CurrencyCode::parse("usd").is_err());
        assert!(CurrencyCode::parse("US").is_err());
        assert!(CurrencyCode::parse("USDT").is_err());
        assert!(CurrencyCode::parse("U$D").is_err());
    }

    #[test]
    fn test_known_currency_lookup() {
        assert_eq!(mxn().known(), Some(Currency::Mxn));
        assert_eq!(CurrencyCode::parse("JPY").unwrap().known(), None);
        for c in Currency::ALL {
            assert_eq!(CurrencyCode::from(c).known(), Some(c));
        }
    }

    #[test]
    fn test_amount_must_be_positive() {
        assert!(PaymentRequest::new(100.0, mxn()).is_ok());
        assert!(matches!(
            PaymentRequest::new(0.0, mxn()),
            Err(InterpayError::InvalidAmount(_))
        ));
        assert!(matches!(
            PaymentRequest::new(-5.0, mxn()),
            Err(InterpayError::InvalidAmount(_))
        ));
        assert!(PaymentRequest::new(f64::NAN, mxn()).is_err());
        assert!(PaymentRequest::new(f64::INFINITY, mxn()).is_err());
    }

    #[test]
    fn test_fresh_ids_are_unique() {
        let a = PaymentRequest::new(1.0, mxn()).unwrap();
        let b = PaymentRequest::new(1.0, mxn()).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_wire_shape() {
        let req = PaymentRequest::new(100.0, mxn()).unwrap();
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["amount"], 100.0);
        assert_eq!(value["currency"], "MXN");
        assert_eq!(value["id"], req.id().to_string());
    }

    #[test]
    fn test_deserialize_rejects_invalid_values() {
        let id = Uuid::new_v4();
        let negative = format!(r#"{{"id":"{id}","amount":-1.0,"currency":"MXN"}}"#);
        assert!(serde_json::from_str::<PaymentRequest>(&negative).is_err());

        let bad_currency = format!(r#"{{"id":"{id}","amount":10.0,"currency":"pesos"}}"#);
        assert!(serde_json::from_str::<PaymentRequest>(&bad_currency).is_err());

        let bad_id = r#"{"id":"not-a-uuid","amount":10.0,"currency":"MXN"}"#;
        assert!(serde_json::from_str::<PaymentRequest>(bad_id).is_err());

        let ok = format!(r#"{{"id":"{id}","amount":12.5,"currency":"USD"}}"#);
        let req: PaymentRequest = serde_json::from_str(&ok).unwrap();
        assert_eq!(req.id(), id);
        assert_eq!(req.amount(), 12.5);
        assert_eq!(req.currency().as_str(), "USD");
    }

    #[test]
    fn test_display_uses_symbol() {
        let req = PaymentRequest::new(100.0, mxn()).unwrap();
        assert_eq!(req.to_string(), "$100.00 MXN");
    }
}
