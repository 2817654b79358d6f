//! The API endpoints URIs.
//!
//! Every endpoint is scoped to an owner. For endpoints that take parameters,
//! e.g., '/api/owners/{owner_id}/transactions/{transaction_id}', use [format_endpoint].

/// The route to create and list transactions.
pub const TRANSACTIONS: &str = "/api/owners/{owner_id}/transactions";
/// The route to replace or delete a single transaction.
pub const TRANSACTION: &str = "/api/owners/{owner_id}/transactions/{transaction_id}";
/// The route to read the fiscal profile.
pub const FISCAL: &str = "/api/owners/{owner_id}/fiscal";
/// The route to set VAT subjection by hand.
pub const FISCAL_VAT: &str = "/api/owners/{owner_id}/fiscal/vat";
/// The route to summarize a fiscal year.
pub const FISCAL_SUMMARY: &str = "/api/owners/{owner_id}/fiscal/summary";
/// The route to resolve or discard a pending VAT activation.
pub const FISCAL_ACTIVATION: &str = "/api/owners/{owner_id}/fiscal/activation";
/// The route to list and regularize the incomes of the crossing month.
pub const FISCAL_REGULARIZATION: &str = "/api/owners/{owner_id}/fiscal/regularization";
/// The route to resolve a pending VAT reversion.
pub const FISCAL_REVERSION: &str = "/api/owners/{owner_id}/fiscal/reversion";
/// The route to reconcile the running revenue total of a year.
pub const FISCAL_RECONCILE: &str = "/api/owners/{owner_id}/fiscal/reconcile";
/// The route to read and change rate settings.
pub const SETTINGS: &str = "/api/owners/{owner_id}/settings";
/// The route to create and list platforms.
pub const PLATFORMS: &str = "/api/owners/{owner_id}/platforms";
/// The route to read a single platform.
pub const PLATFORM: &str = "/api/owners/{owner_id}/platforms/{platform_id}";

/// Replace the parameters in `endpoint_path` with `ids`, in order.
///
/// A parameter is a string that starts with a left brace, followed by
/// lowercase letters or underscores, and ends with a right brace.
/// For example, in the endpoint path '/owners/{owner_id}', '{owner_id}' is the parameter.
///
/// Parameters without a matching ID are left as is, and extra IDs are ignored.
pub fn format_endpoint(endpoint_path: &str, ids: &[i64]) -> String {
    let mut formatted = String::with_capacity(endpoint_path.len());
    let mut ids = ids.iter();
    let mut rest = endpoint_path;

    while let Some(param_start) = rest.find('{') {
        let Some(param_length) = rest[param_start..].find('}') else {
            break;
        };
        let param_end = param_start + param_length + 1;

        formatted.push_str(&rest[..param_start]);
        match ids.next() {
            Some(id) => formatted.push_str(&id.to_string()),
            None => formatted.push_str(&rest[param_start..param_end]),
        }
        rest = &rest[param_end..];
    }

    formatted.push_str(rest);
    formatted
}

// These tests are here so that we know when we call `Uri::from_shared` it will not panic.
#[cfg(test)]
mod endpoints_tests {
    use axum::http::Uri;

    use crate::endpoints;

    use super::format_endpoint;

    fn assert_endpoint_is_valid_uri(uri: &str) {
        assert!(uri.parse::<Uri>().is_ok());
    }

    #[test]
    fn endpoints_are_valid_uris() {
        for endpoint in [
            endpoints::TRANSACTIONS,
            endpoints::TRANSACTION,
            endpoints::FISCAL,
            endpoints::FISCAL_VAT,
            endpoints::FISCAL_SUMMARY,
            endpoints::FISCAL_ACTIVATION,
            endpoints::FISCAL_REGULARIZATION,
            endpoints::FISCAL_REVERSION,
            endpoints::FISCAL_RECONCILE,
            endpoints::SETTINGS,
            endpoints::PLATFORMS,
            endpoints::PLATFORM,
        ] {
            assert_endpoint_is_valid_uri(&format_endpoint(endpoint, &[1, 2]));
        }
    }

    #[test]
    fn replaces_parameters_in_order() {
        let formatted_path = format_endpoint(endpoints::TRANSACTION, &[7, 42]);

        assert_eq!(formatted_path, "/api/owners/7/transactions/42");
        assert!(formatted_path.parse::<Uri>().is_ok());
    }

    #[test]
    fn returns_original_path_with_no_parameter() {
        let formatted_path = format_endpoint("/hello/world", &[1]);

        assert_eq!(formatted_path, "/hello/world");
    }

    #[test]
    fn leaves_parameters_without_id() {
        let formatted_path = format_endpoint("/hello/{world}/bye/{moon}", &[1]);

        assert_eq!(formatted_path, "/hello/1/bye/{moon}");
    }
}
