use chrono::{DateTime, Local};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CycleError;

/// Attribute key attached to every outbound message.
///
/// Consumers filter on it without decoding the body.
pub const CURRENCY_ATTRIBUTE: &str = "moeda";

/// Synthetic quote, the body of every published message.
///
/// The serialized field names are the wire contract consumed
/// downstream and must not change:
///
/// ```json
/// {"Sigla":"USD","Origem":"WorkerSimulacoesCotacaoMoedas",
///  "Horario":"2026-10-19T14:03:11.123456789-03:00","Valor":5.061}
/// ```
///
/// DESIGN NOTES:
/// - `Valor` is written as a JSON number carrying exactly three
///   fractional digits (no float round trip).
/// - A quote is built once, serialized and dropped. It has no setters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Currency symbol (e.g. "USD")
    #[serde(rename = "Sigla")]
    pub symbol: String,

    /// Generator name
    #[serde(rename = "Origem")]
    pub source: String,

    /// Local wall-clock time at generation
    #[serde(rename = "Horario")]
    pub timestamp: DateTime<Local>,

    /// Base value plus jitter, 3 fractional digits
    #[serde(rename = "Valor", with = "rust_decimal::serde::arbitrary_precision")]
    pub value: Decimal,
}

impl Quote {
    /// Encode the quote as UTF-8 JSON bytes.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, CycleError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Message envelope handed to a publisher.
///
/// Holds the opaque body plus the single `moeda` attribute. Brokers map
/// the attribute onto whatever side channel they offer (stream field,
/// header, application property).
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub body: Vec<u8>,
    pub attribute: (&'static str, String),
}

impl OutboundMessage {
    /// Serialize a quote and attach its symbol as the `moeda` attribute.
    pub fn from_quote(quote: &Quote) -> Result<Self, CycleError> {
        Ok(Self {
            body: quote.to_json_bytes()?,
            attribute: (CURRENCY_ATTRIBUTE, quote.symbol.clone()),
        })
    }

    /// Body as text, for logging.
    pub fn body_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}
