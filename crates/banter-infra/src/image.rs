//! Stable Diffusion WebUI image client.
//!
//! Posts to the WebUI's `/sdapi/v1/txt2img` endpoint and decodes the
//! base64 image payload. When the requesting conversation does not allow
//! adult content, "nsfw" goes into the negative prompt.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use banter_core::ports::ImageBackend;
use banter_types::config::ImageConfig;
use banter_types::error::BackendError;
use banter_types::message::GeneratedImage;

#[derive(Debug, Serialize)]
struct Txt2ImgRequest<'a> {
    prompt: &'a str,
    negative_prompt: &'a str,
    steps: u32,
    width: u32,
    height: u32,
}

#[derive(Debug, Deserialize)]
struct Txt2ImgResponse {
    images: Vec<String>,
}

/// HTTP client for a Stable Diffusion WebUI instance.
#[derive(Debug, Clone)]
pub struct SdWebUiClient {
    client: reqwest::Client,
    base_url: String,
    steps: u32,
    width: u32,
    height: u32,
}

impl SdWebUiClient {
    pub fn new(config: &ImageConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            steps: config.sampling_steps,
            width: config.width,
            height: config.height,
        }
    }
}

impl ImageBackend for SdWebUiClient {
    async fn generate(&self, prompt: &str, nsfw: bool) -> Result<GeneratedImage, BackendError> {
        let negative_prompt = if nsfw { "" } else { "nsfw" };
        let url = format!("{}/sdapi/v1/txt2img", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&Txt2ImgRequest {
                prompt,
                negative_prompt,
                steps: self.steps,
                width: self.width,
                height: self.height,
            })
            .send()
            .await
            .map_err(|err| BackendError::Provider {
                message: err.to_string(),
            })?
            .error_for_status()
            .map_err(|err| BackendError::Provider {
                message: err.to_string(),
            })?;

        let body: Txt2ImgResponse =
            response.json().await.map_err(|err| BackendError::Provider {
                message: err.to_string(),
            })?;

        let first = body
            .images
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::Provider {
                message: "image backend returned no images".to_string(),
            })?;

        let bytes = BASE64
            .decode(first.as_bytes())
            .map_err(|err| BackendError::Provider {
                message: format!("invalid image payload: {err}"),
            })?;

        Ok(GeneratedImage {
            bytes,
            prompt: prompt.to_string(),
        })
    }
}
