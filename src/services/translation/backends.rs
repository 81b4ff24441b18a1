// HTTP translation backends, one per TranslationMethod

use async_trait::async_trait;
use md5::{Digest, Md5};
use rand::Rng;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::{debug, trace};

use crate::core::config::TranslationConfig;
use crate::core::errors::{TranslationError, TranslationResult};

const GOOGLE_ENDPOINT: &str = "https://translate.googleapis.com/translate_a/single";
const HF_ENDPOINT: &str = "https://api-inference.huggingface.co/models";
const BAIDU_ENDPOINT: &str = "https://fanyi-api.baidu.com/api/trans/vip/translate";
const BING_ENDPOINT: &str = "https://api.cognitive.microsofttranslator.com/translate";

/// Longest upstream error body kept in an error message
const MAX_ERROR_BODY: usize = 512;

/// One external translation service
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn translate(&self, text: &str) -> TranslationResult<String>;
}

/// Send a request and parse the JSON body, mapping failures to `TranslationError`
async fn send_json(backend: &'static str, request: RequestBuilder) -> TranslationResult<Value> {
    let response = request
        .send()
        .await
        .map_err(|source| TranslationError::RequestFailed { backend, source })?;

    let status = response.status();
    if !status.is_success() {
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let cut = (0..=MAX_ERROR_BODY)
                .rev()
                .find(|&i| body.is_char_boundary(i))
                .unwrap_or(0);
            body.truncate(cut);
        }
        return Err(TranslationError::HttpStatus {
            backend,
            status: status.as_u16(),
            body,
        });
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| TranslationError::InvalidResponse {
            backend,
            reason: e.to_string(),
        })
}

fn invalid(backend: &'static str, reason: impl Into<String>) -> TranslationError {
    TranslationError::InvalidResponse {
        backend,
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Google (public gtx endpoint, no key)
// ---------------------------------------------------------------------------

pub struct GoogleBackend {
    client: Client,
    source: String,
    target: String,
}

impl GoogleBackend {
    pub fn new(client: Client, config: &TranslationConfig) -> Self {
        Self {
            client,
            source: config.source_language.clone(),
            target: config.target_language.clone(),
        }
    }

    /// Response is `[[["translated", "source", ...], ...], ...]`; segments are concatenated
    fn parse(body: &Value) -> TranslationResult<String> {
        let segments = body
            .get(0)
            .and_then(Value::as_array)
            .ok_or_else(|| invalid("google", "missing sentence array"))?;

        Ok(segments
            .iter()
            .filter_map(|segment| segment.get(0).and_then(Value::as_str))
            .collect())
    }
}

#[async_trait]
impl TranslationBackend for GoogleBackend {
    fn name(&self) -> &'static str {
        "google"
    }

    async fn translate(&self, text: &str) -> TranslationResult<String> {
        let request = self.client.get(GOOGLE_ENDPOINT).query(&[
            ("client", "gtx"),
            ("sl", self.source.as_str()),
            ("tl", self.target.as_str()),
            ("dt", "t"),
            ("q", text),
        ]);
        let body = send_json(self.name(), request).await?;
        Self::parse(&body)
    }
}

// ---------------------------------------------------------------------------
// Hugging Face inference API
// ---------------------------------------------------------------------------

pub struct HfBackend {
    client: Client,
    model: String,
    token: Option<String>,
}

impl HfBackend {
    pub fn new(client: Client, config: &TranslationConfig) -> Self {
        Self {
            client,
            model: config.hf_model.clone(),
            token: config.hf_api_token.clone(),
        }
    }

    /// Response is `[{"translation_text": "..."}]`
    fn parse(body: &Value) -> TranslationResult<String> {
        if let Some(error) = body.get("error").and_then(Value::as_str) {
            return Err(invalid("hf", error));
        }
        body.get(0)
            .and_then(|item| item.get("translation_text"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| invalid("hf", "missing translation_text"))
    }
}

#[async_trait]
impl TranslationBackend for HfBackend {
    fn name(&self) -> &'static str {
        "hf"
    }

    async fn translate(&self, text: &str) -> TranslationResult<String> {
        let token = self
            .token
            .as_deref()
            .ok_or(TranslationError::MissingCredentials {
                backend: "hf",
                variable: "HF_API_TOKEN",
            })?;

        let request = self
            .client
            .post(format!("{}/{}", HF_ENDPOINT, self.model))
            .bearer_auth(token)
            .json(&serde_json::json!({ "inputs": text }));
        let body = send_json(self.name(), request).await?;
        Self::parse(&body)
    }
}

// ---------------------------------------------------------------------------
// Baidu Fanyi general translation API
// ---------------------------------------------------------------------------

pub struct BaiduBackend {
    client: Client,
    app_id: Option<String>,
    secret_key: Option<String>,
    source: String,
    target: String,
}

impl BaiduBackend {
    pub fn new(client: Client, config: &TranslationConfig) -> Self {
        Self {
            client,
            app_id: config.baidu_app_id.clone(),
            secret_key: config.baidu_secret_key.clone(),
            source: Self::language_code(&config.source_language).to_string(),
            target: Self::language_code(&config.target_language).to_string(),
        }
    }

    /// Baidu uses its own codes for a few languages
    fn language_code(iso: &str) -> &str {
        match iso {
            "ja" => "jp",
            "ko" => "kor",
            "fr" => "fra",
            "es" => "spa",
            "zh-CN" | "zh-Hans" => "zh",
            other => other,
        }
    }

    /// `md5(appid + q + salt + secret)`, lowercase hex
    fn sign(app_id: &str, text: &str, salt: &str, secret_key: &str) -> String {
        let mut hasher = Md5::new();
        hasher.update(app_id.as_bytes());
        hasher.update(text.as_bytes());
        hasher.update(salt.as_bytes());
        hasher.update(secret_key.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Response is `{"trans_result": [{"src": ..., "dst": ...}]}` or `{"error_code": ..., "error_msg": ...}`
    fn parse(body: &Value) -> TranslationResult<String> {
        if let Some(code) = body.get("error_code") {
            let msg = body
                .get("error_msg")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(invalid("baidu", format!("error {}: {}", code, msg)));
        }

        let results = body
            .get("trans_result")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid("baidu", "missing trans_result"))?;

        Ok(results
            .iter()
            .filter_map(|r| r.get("dst").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[async_trait]
impl TranslationBackend for BaiduBackend {
    fn name(&self) -> &'static str {
        "baidu"
    }

    async fn translate(&self, text: &str) -> TranslationResult<String> {
        let app_id = self
            .app_id
            .as_deref()
            .ok_or(TranslationError::MissingCredentials {
                backend: "baidu",
                variable: "BAIDU_APP_ID",
            })?;
        let secret_key = self
            .secret_key
            .as_deref()
            .ok_or(TranslationError::MissingCredentials {
                backend: "baidu",
                variable: "BAIDU_SECRET_KEY",
            })?;

        let salt = rand::thread_rng().gen_range(32768..65536).to_string();
        let sign = Self::sign(app_id, text, &salt, secret_key);
        trace!("Baidu request salt={}", salt);

        let request = self.client.post(BAIDU_ENDPOINT).form(&[
            ("q", text),
            ("from", self.source.as_str()),
            ("to", self.target.as_str()),
            ("appid", app_id),
            ("salt", salt.as_str()),
            ("sign", sign.as_str()),
        ]);
        let body = send_json(self.name(), request).await?;
        Self::parse(&body)
    }
}

// ---------------------------------------------------------------------------
// Microsoft Translator v3
// ---------------------------------------------------------------------------

pub struct BingBackend {
    client: Client,
    key: Option<String>,
    region: Option<String>,
    source: String,
    target: String,
}

impl BingBackend {
    pub fn new(client: Client, config: &TranslationConfig) -> Self {
        Self {
            client,
            key: config.bing_key.clone(),
            region: config.bing_region.clone(),
            source: config.source_language.clone(),
            target: config.target_language.clone(),
        }
    }

    /// Response is `[{"translations": [{"text": ..., "to": ...}]}]`
    fn parse(body: &Value) -> TranslationResult<String> {
        body.get(0)
            .and_then(|item| item.get("translations"))
            .and_then(|t| t.get(0))
            .and_then(|t| t.get("text"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| invalid("bing", "missing translations[0].text"))
    }
}

#[async_trait]
impl TranslationBackend for BingBackend {
    fn name(&self) -> &'static str {
        "bing"
    }

    async fn translate(&self, text: &str) -> TranslationResult<String> {
        let key = self
            .key
            .as_deref()
            .ok_or(TranslationError::MissingCredentials {
                backend: "bing",
                variable: "BING_TRANSLATOR_KEY",
            })?;

        let mut request = self
            .client
            .post(BING_ENDPOINT)
            .query(&[
                ("api-version", "3.0"),
                ("from", self.source.as_str()),
                ("to", self.target.as_str()),
            ])
            .header("Ocp-Apim-Subscription-Key", key)
            .json(&serde_json::json!([{ "Text": text }]));

        if let Some(region) = &self.region {
            request = request.header("Ocp-Apim-Subscription-Region", region);
        }

        debug!("Bing translate: {} chars", text.chars().count());
        let body = send_json(self.name(), request).await?;
        Self::parse(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_google_parse_concatenates_segments() {
        let body = json!([[["Hello. ", "こんにちは。", null], ["How are you?", "元気？", null]], null, "ja"]);
        assert_eq!(GoogleBackend::parse(&body).unwrap(), "Hello. How are you?");
        assert!(GoogleBackend::parse(&json!({})).is_err());
    }

    #[test]
    fn test_hf_parse() {
        let body = json!([{ "translation_text": "Good morning" }]);
        assert_eq!(HfBackend::parse(&body).unwrap(), "Good morning");

        let loading = json!({ "error": "Model is currently loading" });
        let err = HfBackend::parse(&loading).unwrap_err();
        assert!(err.to_string().contains("Model is currently loading"));
    }

    #[test]
    fn test_baidu_sign_and_parse() {
        // md5("2015063000000001apple143566028812345678")
        assert_eq!(
            BaiduBackend::sign("2015063000000001", "apple", "1435660288", "12345678"),
            "f89f9594663708c1605f3d736d01d2d4"
        );

        let body = json!({ "from": "jp", "to": "en", "trans_result": [{ "src": "猫", "dst": "cat" }] });
        assert_eq!(BaiduBackend::parse(&body).unwrap(), "cat");

        let err = BaiduBackend::parse(&json!({ "error_code": "54001", "error_msg": "Invalid Sign" }))
            .unwrap_err();
        assert!(err.to_string().contains("Invalid Sign"));
    }

    #[test]
    fn test_baidu_language_codes() {
        assert_eq!(BaiduBackend::language_code("ja"), "jp");
        assert_eq!(BaiduBackend::language_code("en"), "en");
    }

    #[test]
    fn test_bing_parse() {
        let body = json!([{ "translations": [{ "text": "Thank you", "to": "en" }] }]);
        assert_eq!(BingBackend::parse(&body).unwrap(), "Thank you");
        assert!(BingBackend::parse(&json!([])).is_err());
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_without_network() {
        let config = crate::core::config::Config::default().translation;
        let client = Client::new();

        let hf = HfBackend::new(client.clone(), &config);
        assert!(matches!(
            hf.translate("テスト").await,
            Err(TranslationError::MissingCredentials { variable: "HF_API_TOKEN", .. })
        ));

        let baidu = BaiduBackend::new(client.clone(), &config);
        assert!(matches!(
            baidu.translate("テスト").await,
            Err(TranslationError::MissingCredentials { variable: "BAIDU_APP_ID", .. })
        ));

        let bing = BingBackend::new(client, &config);
        assert!(matches!(
            bing.translate("テスト").await,
            Err(TranslationError::MissingCredentials { variable: "BING_TRANSLATOR_KEY", .. })
        ));
    }
}
