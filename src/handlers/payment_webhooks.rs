use std::collections::BTreeMap;

use axum::{
    extract::{RawQuery, State},
    http::Method,
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use tracing::{error, info, instrument};
use url::form_urlencoded;
use utoipa::ToSchema;

use crate::services::gateway::{rsp, PARAM_TXN_REF};
use crate::AppState;

/// Acknowledgement body the gateway expects from its IPN call. The HTTP status
/// is always 200; the verdict travels in `RspCode`.
#[derive(Debug, Serialize, ToSchema)]
pub struct IpnResponse {
    #[serde(rename = "RspCode")]
    pub rsp_code: String,
    #[serde(rename = "Message")]
    pub message: String,
}

fn parse_params(raw: &str) -> BTreeMap<String, String> {
    form_urlencoded::parse(raw.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

#[utoipa::path(
    get,
    path = "/api/v1/payments/gateway/ipn",
    responses(
        (status = 200, description = "Callback acknowledged; RspCode carries the verdict", body = IpnResponse)
    ),
    tag = "Payments"
)]
#[instrument(skip(state, query, body))]
pub async fn gateway_ipn(
    State(state): State<AppState>,
    method: Method,
    RawQuery(query): RawQuery,
    body: String,
) -> Json<IpnResponse> {
    // The gateway sends IPN parameters in the query string for GET and as a
    // form body for POST.
    let raw = match method {
        Method::POST if !body.trim().is_empty() => body,
        _ => query.unwrap_or_default(),
    };
    let params = parse_params(&raw);

    match state.services.payments.verify_callback(&params).await {
        Ok(outcome) => {
            info!(rsp_code = outcome.rsp_code(), "Gateway callback handled");
            Json(IpnResponse {
                rsp_code: outcome.rsp_code().to_string(),
                message: outcome.message().to_string(),
            })
        }
        Err(err) => {
            // The gateway only accepts the contract body; an internal failure
            // still answers 200 so it can retry against the reject code.
            let txn_ref = params.get(PARAM_TXN_REF).map(String::as_str).unwrap_or("");
            error!(txn_ref = %txn_ref, error = %err, "Gateway callback processing failed");
            Json(IpnResponse {
                rsp_code: rsp::UNKNOWN_ERROR.to_string(),
                message: "Unknown error".to_string(),
            })
        }
    }
}

pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/gateway/ipn", get(gateway_ipn).post(gateway_ipn))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_params_parse_into_sorted_map() {
        let params = parse_params("vnp_TxnRef=VC123456789VN&vnp_Amount=2500000");
        assert_eq!(params.get("vnp_TxnRef").unwrap(), "VC123456789VN");
        assert_eq!(params.get("vnp_Amount").unwrap(), "2500000");
        assert_eq!(params.keys().next().unwrap(), "vnp_Amount");
    }

    #[test]
    fn encoded_values_are_decoded() {
        let params = parse_params("vnp_OrderInfo=Payment+for+shipment+VC1");
        assert_eq!(
            params.get("vnp_OrderInfo").unwrap(),
            "Payment for shipment VC1"
        );
    }
}
