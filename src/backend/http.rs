use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{AuthVerdict, BackendClient, BackendError, PaymentConfirmation};
use crate::host::{PaymentPayload, WalletAuthPayload};

/// Client for the app's HTTP API.
#[derive(Clone)]
pub struct HttpBackend {
    http_client: reqwest::Client,
    base_url: Url,
}

#[derive(Deserialize)]
struct NonceResponse {
    nonce: String,
}

#[derive(Deserialize)]
struct PaymentInitResponse {
    id: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Host payloads travel with the host's `status` marker.
#[derive(Serialize)]
struct SuccessPayload<'a, T> {
    status: &'static str,
    #[serde(flatten)]
    inner: &'a T,
}

impl<'a, T> SuccessPayload<'a, T> {
    fn new(inner: &'a T) -> Self {
        Self {
            status: "success",
            inner,
        }
    }
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    payload: SuccessPayload<'a, WalletAuthPayload>,
    nonce: &'a str,
}

#[derive(Serialize)]
struct PaymentInitRequest<'a> {
    amount: &'a str,
    token: &'a str,
}

#[derive(Serialize)]
struct PaymentConfirmRequest<'a> {
    payload: SuccessPayload<'a, PaymentPayload>,
    reference: &'a str,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        // Url::join drops the last path segment unless the base ends in '/'
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized)?;

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(BackendError::Http)?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        Ok(self.base_url.join(path)?)
    }

    /// Read a JSON body, turning a non-2xx status into [`BackendError::Status`]
    /// carrying the body's `error` field when there is one.
    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, BackendError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl BackendClient for HttpBackend {
    async fn issue_nonce(&self) -> Result<String, BackendError> {
        let url = self.endpoint("api/nonce")?;
        let response = self.http_client.get(url).send().await?;
        let body: NonceResponse = Self::read_json(response).await?;
        Ok(body.nonce)
    }

    async fn verify_auth(
        &self,
        payload: &WalletAuthPayload,
        nonce: &str,
    ) -> Result<AuthVerdict, BackendError> {
        let url = self.endpoint("api/complete-siwe")?;
        let request = VerifyRequest {
            payload: SuccessPayload::new(payload),
            nonce,
        };
        let response = self.http_client.post(url).json(&request).send().await?;

        let status = response.status();
        let body = response.text().await?;
        // Rejections come back as 4xx with an `{isValid: false, error}` body
        match serde_json::from_str::<AuthVerdict>(&body) {
            Ok(verdict) if status.is_success() => Ok(verdict),
            Ok(verdict) => Ok(AuthVerdict {
                is_valid: false,
                ..verdict
            }),
            Err(_) if !status.is_success() => Err(BackendError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn initiate_payment(&self, amount: &str, token: &str) -> Result<String, BackendError> {
        let url = self.endpoint("api/initiate-payment")?;
        let response = self
            .http_client
            .post(url)
            .json(&PaymentInitRequest { amount, token })
            .send()
            .await?;
        let body: PaymentInitResponse = Self::read_json(response).await?;
        Ok(body.id)
    }

    async fn confirm_payment(
        &self,
        payload: &PaymentPayload,
        reference: &str,
    ) -> Result<PaymentConfirmation, BackendError> {
        let url = self.endpoint("api/confirm-payment")?;
        let request = PaymentConfirmRequest {
            payload: SuccessPayload::new(payload),
            reference,
        };
        let response = self.http_client.post(url).json(&request).send().await?;

        let status = response.status();
        let body = response.text().await?;
        match serde_json::from_str::<PaymentConfirmation>(&body) {
            Ok(confirmation) => Ok(confirmation),
            Err(_) if !status.is_success() => Ok(PaymentConfirmation {
                success: false,
                error: Some(error_message(&body)),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}
