use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sha2::Sha512;
use url::form_urlencoded;

use crate::config::GatewayConfig;
use crate::errors::ServiceError;

type HmacSha512 = Hmac<Sha512>;

/// Gateway parameter names shared by the redirect payload and the IPN callback.
pub const PARAM_VERSION: &str = "vnp_Version";
pub const PARAM_COMMAND: &str = "vnp_Command";
pub const PARAM_MERCHANT_CODE: &str = "vnp_TmnCode";
pub const PARAM_AMOUNT: &str = "vnp_Amount";
pub const PARAM_CREATE_DATE: &str = "vnp_CreateDate";
pub const PARAM_CURRENCY: &str = "vnp_CurrCode";
pub const PARAM_LOCALE: &str = "vnp_Locale";
pub const PARAM_ORDER_INFO: &str = "vnp_OrderInfo";
pub const PARAM_TXN_REF: &str = "vnp_TxnRef";
pub const PARAM_RETURN_URL: &str = "vnp_ReturnUrl";
pub const PARAM_EXPIRE_DATE: &str = "vnp_ExpireDate";
pub const PARAM_SECURE_HASH: &str = "vnp_SecureHash";
pub const PARAM_SECURE_HASH_TYPE: &str = "vnp_SecureHashType";
pub const PARAM_RESPONSE_CODE: &str = "vnp_ResponseCode";
pub const PARAM_TRANSACTION_STATUS: &str = "vnp_TransactionStatus";
pub const PARAM_TRANSACTION_NO: &str = "vnp_TransactionNo";

/// Result code the gateway reports for a successful charge.
pub const GATEWAY_SUCCESS_CODE: &str = "00";

/// Response codes this system returns to the gateway's IPN call.
pub mod rsp {
    pub const SUCCESS: &str = "00";
    pub const ORDER_NOT_FOUND: &str = "01";
    pub const ALREADY_CONFIRMED: &str = "02";
    pub const AMOUNT_MISMATCH: &str = "04";
    pub const INVALID_SIGNATURE: &str = "97";
    pub const MISSING_SIGNATURE: &str = "99";
    pub const UNKNOWN_ERROR: &str = "99";
}

const CREATE_DATE_FORMAT: &str = "%Y%m%d%H%M%S";

/// Outcome of checking the signature on an inbound parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
    Valid,
    Invalid,
    Missing,
}

/// Signs outbound redirect payloads and verifies inbound callbacks for the
/// external payment gateway.
#[derive(Clone)]
pub struct GatewayClient {
    config: GatewayConfig,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Builds the signed hosted-payment redirect URL for one payment attempt.
    /// The transaction reference is the waybill (well under the gateway's
    /// 30-character limit).
    pub fn build_redirect_url(
        &self,
        txn_ref: &str,
        amount: Decimal,
        order_info: &str,
        now: DateTime<Utc>,
    ) -> Result<String, ServiceError> {
        let amount_x100 = to_gateway_amount(amount).ok_or_else(|| {
            ServiceError::InternalError(format!("unrepresentable gateway amount: {amount}"))
        })?;
        let expire = now + Duration::minutes(self.config.expire_minutes);

        let mut params = BTreeMap::new();
        params.insert(PARAM_VERSION.to_string(), self.config.version.clone());
        params.insert(PARAM_COMMAND.to_string(), "pay".to_string());
        params.insert(
            PARAM_MERCHANT_CODE.to_string(),
            self.config.merchant_code.clone(),
        );
        params.insert(PARAM_AMOUNT.to_string(), amount_x100.to_string());
        params.insert(
            PARAM_CREATE_DATE.to_string(),
            now.format(CREATE_DATE_FORMAT).to_string(),
        );
        params.insert(PARAM_CURRENCY.to_string(), self.config.currency.clone());
        params.insert(PARAM_LOCALE.to_string(), self.config.locale.clone());
        params.insert(PARAM_ORDER_INFO.to_string(), order_info.to_string());
        params.insert(PARAM_TXN_REF.to_string(), txn_ref.to_string());
        params.insert(PARAM_RETURN_URL.to_string(), self.config.return_url.clone());
        params.insert(
            PARAM_EXPIRE_DATE.to_string(),
            expire.format(CREATE_DATE_FORMAT).to_string(),
        );

        let canonical = canonical_query(&params);
        let signature = self.sign(&canonical);

        Ok(format!(
            "{}?{}&{}={}",
            self.config.payment_url, canonical, PARAM_SECURE_HASH, signature
        ))
    }

    /// HMAC-SHA512 over the canonical query string, hex-encoded lowercase.
    pub fn sign(&self, canonical: &str) -> String {
        let mut mac = HmacSha512::new_from_slice(self.config.secret_key.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(canonical.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Verifies the signature carried in an inbound callback parameter set.
    /// The signature fields themselves are excluded from the signed payload.
    pub fn check_signature(&self, params: &BTreeMap<String, String>) -> SignatureCheck {
        let supplied = match params.get(PARAM_SECURE_HASH) {
            Some(hash) if !hash.trim().is_empty() => hash.trim().to_ascii_lowercase(),
            _ => return SignatureCheck::Missing,
        };

        let mut signed: BTreeMap<String, String> = params.clone();
        signed.remove(PARAM_SECURE_HASH);
        signed.remove(PARAM_SECURE_HASH_TYPE);

        let expected = self.sign(&canonical_query(&signed));
        if constant_time_eq(&expected, &supplied) {
            SignatureCheck::Valid
        } else {
            SignatureCheck::Invalid
        }
    }
}

/// Canonical form: parameters sorted by key (BTreeMap ordering), keys and
/// values form-urlencoded, joined with `&`. Empty values are omitted from the
/// signed payload, matching the gateway's hashing rules.
pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
    let mut parts = Vec::with_capacity(params.len());
    for (key, value) in params {
        if value.is_empty() {
            continue;
        }
        let encoded_key: String = form_urlencoded::byte_serialize(key.as_bytes()).collect();
        let encoded_value: String = form_urlencoded::byte_serialize(value.as_bytes()).collect();
        parts.push(format!("{encoded_key}={encoded_value}"));
    }
    parts.join("&")
}

/// Converts a decimal amount to the gateway's integer representation (x100).
pub fn to_gateway_amount(amount: Decimal) -> Option<i64> {
    (amount * Decimal::from(100)).round().to_i64()
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_client() -> GatewayClient {
        GatewayClient::new(GatewayConfig {
            secret_key: "test_gateway_secret".to_string(),
            ..GatewayConfig::default()
        })
    }

    fn signed_params(client: &GatewayClient) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert(PARAM_TXN_REF.to_string(), "VC123456789VN".to_string());
        params.insert(PARAM_AMOUNT.to_string(), "2500000".to_string());
        params.insert(PARAM_RESPONSE_CODE.to_string(), "00".to_string());
        let sig = client.sign(&canonical_query(&params));
        params.insert(PARAM_SECURE_HASH.to_string(), sig);
        params
    }

    #[test]
    fn sign_verify_round_trip() {
        let client = test_client();
        let params = signed_params(&client);
        assert_eq!(client.check_signature(&params), SignatureCheck::Valid);
    }

    #[test]
    fn tampered_hash_is_rejected() {
        let client = test_client();
        let mut params = signed_params(&client);
        let mut sig = params.get(PARAM_SECURE_HASH).unwrap().clone();
        // Flip one character of the hex digest
        let flipped = if sig.ends_with('0') { '1' } else { '0' };
        sig.pop();
        sig.push(flipped);
        params.insert(PARAM_SECURE_HASH.to_string(), sig);
        assert_eq!(client.check_signature(&params), SignatureCheck::Invalid);
    }

    #[test]
    fn tampered_value_is_rejected() {
        let client = test_client();
        let mut params = signed_params(&client);
        params.insert(PARAM_AMOUNT.to_string(), "9900000".to_string());
        assert_eq!(client.check_signature(&params), SignatureCheck::Invalid);
    }

    #[test]
    fn missing_hash_is_detected() {
        let client = test_client();
        let mut params = signed_params(&client);
        params.remove(PARAM_SECURE_HASH);
        assert_eq!(client.check_signature(&params), SignatureCheck::Missing);
    }

    #[test]
    fn hash_type_field_is_excluded_from_signing() {
        let client = test_client();
        let mut params = signed_params(&client);
        params.insert(PARAM_SECURE_HASH_TYPE.to_string(), "HMACSHA512".to_string());
        assert_eq!(client.check_signature(&params), SignatureCheck::Valid);
    }

    #[test]
    fn canonical_query_sorts_and_encodes() {
        let mut params = BTreeMap::new();
        params.insert("b".to_string(), "two words".to_string());
        params.insert("a".to_string(), "1".to_string());
        params.insert("c".to_string(), String::new());
        assert_eq!(canonical_query(&params), "a=1&b=two+words");
    }

    #[test]
    fn gateway_amount_is_hundredths() {
        assert_eq!(to_gateway_amount(dec!(25000)), Some(2_500_000));
        assert_eq!(to_gateway_amount(dec!(0)), Some(0));
    }

    #[test]
    fn redirect_url_carries_signature_and_reference() {
        let client = test_client();
        let url = client
            .build_redirect_url("VC123456789VN", dec!(25000), "Shipping fee", Utc::now())
            .unwrap();
        assert!(url.contains("vnp_SecureHash="));
        assert!(url.contains("vnp_TxnRef=VC123456789VN"));
        assert!(url.contains("vnp_Amount=2500000"));
    }
}
