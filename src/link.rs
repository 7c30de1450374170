//! Shareable tip links and block explorer URLs.
//!
//! A tip link points at `{origin}/tip/{address}` with optional `amount` and
//! `message` query parameters that prefill the send form.

use alloy_primitives::{Address, B256};
use serde::Serialize;

use crate::error::TipError;
use crate::units::{parse_address, parse_amount};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TipLink {
    pub recipient: Address,
    pub amount: Option<String>,
    pub message: Option<String>,
}

impl TipLink {
    pub fn new(recipient: Address) -> Self {
        Self { recipient, amount: None, message: None }
    }

    /// Attach a suggested amount. Validated like a tip amount.
    pub fn with_amount(mut self, amount: &str) -> Result<Self, TipError> {
        let amount = amount.trim();
        if !amount.is_empty() {
            parse_amount(amount)?;
            self.amount = Some(amount.to_string());
        }
        Ok(self)
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string()).filter(|m| !m.is_empty());
        self
    }

    /// Render under `origin` (scheme and host, trailing slash optional).
    pub fn url(&self, origin: &str) -> String {
        let mut url = format!("{}/tip/{}", origin.trim_end_matches('/'), self.recipient);
        let mut params = Vec::new();
        if let Some(amount) = &self.amount {
            params.push(format!("amount={}", percent_encode(amount)));
        }
        if let Some(message) = &self.message {
            params.push(format!("message={}", percent_encode(message)));
        }
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }
        url
    }

    /// Parse a link produced by [`TipLink::url`]. Any origin is accepted.
    pub fn parse(url: &str) -> Result<Self, TipError> {
        let (_, rest) = url
            .split_once("/tip/")
            .ok_or_else(|| TipError::InvalidRecipient(format!("not a tip link: {}", url)))?;
        let (address, query) = rest.split_once('?').unwrap_or((rest, ""));
        let mut link = Self::new(parse_address(address.trim_end_matches('/'))?);
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let value = percent_decode(value);
            match key {
                "amount" => link = link.with_amount(&value)?,
                "message" => link = link.with_message(&value),
                _ => {}
            }
        }
        Ok(link)
    }
}

/// `{explorer}/tx/{hash}`
pub fn explorer_tx_url(explorer: &str, hash: B256) -> String {
    format!("{}/tx/{}", explorer.trim_end_matches('/'), hash)
}

/// `{explorer}/address/{address}`
pub fn explorer_address_url(explorer: &str, address: Address) -> String {
    format!("{}/address/{}", explorer.trim_end_matches('/'), address)
}

/// `0x1234...abcd`
pub fn short_address(address: Address) -> String {
    let full = address.to_string();
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for &b in value.as_bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let escaped = bytes
            .get(i + 1..i + 3)
            .filter(|_| bytes[i] == b'%')
            .and_then(|hex| std::str::from_utf8(hex).ok())
            .and_then(|hex| u8::from_str_radix(hex, 16).ok());
        match (escaped, bytes[i]) {
            (Some(b), _) => {
                out.push(b);
                i += 3;
            }
            (None, b'+') => {
                out.push(b' ');
                i += 1;
            }
            (None, b) => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const ME: Address = address!("e43727723d53085a249c74a9b15bec50920bbfff");

    #[test]
    fn bare_link() {
        let url = TipLink::new(ME).url("https://tips.example/");
        assert_eq!(url, "https://tips.example/tip/0xE43727723D53085a249c74a9B15bEc50920bBFfF");
    }

    #[test]
    fn link_with_params_parses_back() {
        let link = TipLink::new(ME).with_amount("0.5").unwrap().with_message("gm & thanks!");
        let url = link.url("https://tips.example");
        assert!(url.ends_with("?amount=0.5&message=gm%20%26%20thanks%21"));
        assert_eq!(TipLink::parse(&url).unwrap(), link);
    }

    #[test]
    fn rejects_bad_amount_and_address() {
        assert!(TipLink::new(ME).with_amount("-1").is_err());
        assert!(TipLink::parse("https://tips.example/tip/0x123").is_err());
        assert!(TipLink::parse("https://tips.example/profile").is_err());
    }

    #[test]
    fn explorer_and_short_forms() {
        assert_eq!(short_address(ME), "0xE437...BFfF");
        assert_eq!(
            explorer_address_url("https://shannon-explorer.somnia.network/", ME),
            "https://shannon-explorer.somnia.network/address/0xE43727723D53085a249c74a9B15bEc50920bBFfF"
        );
        let hash = B256::repeat_byte(0xab);
        assert!(explorer_tx_url("https://x.io", hash).starts_with("https://x.io/tx/0xabab"));
    }

    #[test]
    fn decode_tolerates_stray_percent() {
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("a+b%2Fc"), "a b/c");
    }
}
