//! JSON-RPC 1.1 envelope handling shared by the workspace, handle, and sample clients.

use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;
use wscopy_core::{ServiceError, ServiceResult};

use crate::transport::{Transport, request_error, status_error};

const RPC_VERSION: &str = "1.1";

/// Client for one JSON-RPC service endpoint.
#[derive(Clone)]
pub struct JsonRpcClient {
    service: &'static str,
    endpoint: String,
    token: Option<String>,
    transport: Transport,
}

#[derive(Serialize)]
struct RpcRequest<'a, P> {
    method: String,
    params: [&'a P; 1],
    version: &'static str,
    id: String,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcFault>,
}

#[derive(Deserialize)]
struct RpcFault {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

impl JsonRpcClient {
    /// Build a client posting `<service>.<method>` calls to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns the parse failure when `endpoint` is not an absolute URL.
    pub fn new(
        service: &'static str,
        endpoint: &str,
        token: Option<String>,
        transport: Transport,
    ) -> Result<Self, url::ParseError> {
        Url::parse(endpoint)?;
        Ok(Self {
            service,
            endpoint: endpoint.to_string(),
            token,
            transport,
        })
    }

    /// Service URL exactly as configured.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Logical service name used as the method prefix.
    #[must_use]
    pub const fn service(&self) -> &'static str {
        self.service
    }

    /// Invoke `method` with a single positional parameter and decode `result[0]`.
    ///
    /// # Errors
    ///
    /// `Rejected` when the service answers with an `error` member, `Decode`
    /// when the result has an unexpected shape, `Transport` otherwise.
    pub async fn call<P, R>(&self, method: &str, params: &P) -> ServiceResult<R>
    where
        P: Serialize + Sync,
        R: DeserializeOwned,
    {
        self.transport
            .with_retry(self.service, method, move || self.call_once(method, params))
            .await
    }

    async fn call_once<P, R>(&self, method: &str, params: &P) -> ServiceResult<R>
    where
        P: Serialize + Sync,
        R: DeserializeOwned,
    {
        let body = RpcRequest {
            method: format!("{}.{method}", self.service),
            params: [params],
            version: RPC_VERSION,
            id: rand::random::<u64>().to_string(),
        };
        let mut request = self.transport.http().post(&self.endpoint).json(&body);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, token);
        }
        let response = request
            .send()
            .await
            .map_err(|error| request_error(self.service, method, &error))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|error| request_error(self.service, method, &error))?;
        decode_response(self.service, method, status, &bytes)
    }
}

/// Interpret a JSON-RPC response body.
///
/// Services report application errors with a 500 status and an `error`
/// member, so the body is inspected before the status.
pub(crate) fn decode_response<R: DeserializeOwned>(
    service: &'static str,
    method: &str,
    status: StatusCode,
    body: &[u8],
) -> ServiceResult<R> {
    match serde_json::from_slice::<RpcResponse>(body) {
        Ok(RpcResponse {
            error: Some(fault), ..
        }) => Err(ServiceError::Rejected {
            service,
            method: method.to_string(),
            code: fault.code,
            message: fault
                .message
                .or(fault.name)
                .unwrap_or_else(|| "unspecified service error".to_string()),
        }),
        Ok(RpcResponse {
            result: Some(result),
            ..
        }) if status.is_success() => {
            let first = match result {
                Value::Array(items) => items.into_iter().next().unwrap_or(Value::Null),
                other => other,
            };
            serde_json::from_value(first)
                .map_err(|error| ServiceError::decode(service, method, error.to_string()))
        }
        _ if !status.is_success() => Err(status_error(service, method, status, body)),
        Ok(_) => Err(ServiceError::decode(
            service,
            method,
            "response carries neither result nor error",
        )),
        Err(error) => Err(ServiceError::decode(service, method, error.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;

    #[test]
    fn first_result_element_is_decoded() -> anyhow::Result<()> {
        let body = serde_json::to_vec(&json!({"version": "1.1", "result": [{"a": "b"}]}))?;
        let decoded: BTreeMap<String, String> =
            decode_response("Workspace", "translate_to_MD5_types", StatusCode::OK, &body)?;
        assert_eq!(decoded.get("a").map(String::as_str), Some("b"));
        Ok(())
    }

    #[test]
    fn error_member_wins_over_status() -> anyhow::Result<()> {
        let body = serde_json::to_vec(&json!({
            "version": "1.1",
            "error": {"name": "JSONRPCError", "code": -32500, "message": "No workspace with id 4"}
        }))?;
        let result: ServiceResult<Value> = decode_response(
            "Workspace",
            "list_objects",
            StatusCode::INTERNAL_SERVER_ERROR,
            &body,
        );
        assert!(matches!(
            result,
            Err(ServiceError::Rejected { code: Some(-32500), ref message, .. }) if message == "No workspace with id 4"
        ));
        Ok(())
    }

    #[test]
    fn gateway_errors_are_retryable_transport_failures() {
        let result: ServiceResult<Value> = decode_response(
            "Workspace",
            "list_objects",
            StatusCode::BAD_GATEWAY,
            b"<html>bad gateway</html>",
        );
        assert!(matches!(result, Err(ref error) if error.is_retryable()));
    }

    #[test]
    fn unexpected_shape_is_a_decode_error() -> anyhow::Result<()> {
        let body = serde_json::to_vec(&json!({"result": ["text"]}))?;
        let result: ServiceResult<Vec<u64>> =
            decode_response("Workspace", "list_objects", StatusCode::OK, &body);
        assert!(matches!(result, Err(ServiceError::Decode { .. })));
        let empty: ServiceResult<Value> =
            decode_response("Workspace", "list_objects", StatusCode::OK, b"{}");
        assert!(matches!(empty, Err(ServiceError::Decode { .. })));
        Ok(())
    }
}
