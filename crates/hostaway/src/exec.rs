use std::time::Duration;

use async_trait::async_trait;
use http::{Request, Response};

use crate::error::HostawayError;

/// Seam between the Hostaway client and the network.
#[async_trait]
pub trait HttpExec: Send + Sync {
    async fn execute(&self, req: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, HostawayError>;
}

pub struct ReqwestExecutor {
    client: reqwest::Client,
}

impl ReqwestExecutor {
    pub fn new(timeout: Duration) -> Result<Self, HostawayError> {
        let client = reqwest::Client::builder()
            .user_agent("flex-living-reviews")
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpExec for ReqwestExecutor {
    async fn execute(&self, req: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, HostawayError> {
        let (parts, body) = req.into_parts();
        let resp = self
            .client
            .request(parts.method, parts.uri.to_string())
            .headers(parts.headers)
            .body(body)
            .send()
            .await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = resp.bytes().await?;

        let mut response = Response::builder().status(status).body(bytes.to_vec())?;
        *response.headers_mut() = headers;
        Ok(response)
    }
}
