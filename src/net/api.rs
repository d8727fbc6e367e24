//! Join/validate HTTP gateway.
//!
//! Three request/response calls precede any realtime connection: resolve a
//! class code to its region, validate the join attempt, and (best-effort)
//! fetch the presenter's profile. Upstream bodies are loosely shaped, so
//! parsing uses the same alias tolerance as the event normalizer and the
//! pure parse helpers are tested against recorded fixtures.

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;

use serde_json::Value;

use crate::events::{pick, pick_bool, pick_string};

/// Gateway failure taxonomy. Upstream rejection messages are carried
/// verbatim so the join form can surface them unchanged.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    Upstream(String),
    #[error("invalid region `{0}`")]
    InvalidRegion(String),
    #[error("malformed upstream response")]
    Malformed,
}

/// Region routing info resolved from a class code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassCodeInfo {
    pub cpcs_region: String,
    pub presenter_email: String,
    pub class_code: String,
}

/// Outcome of join validation. The connection must not open on `Rejected`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JoinDecision {
    Accepted { session_id: Option<String> },
    Rejected {
        message: String,
        error_code: Option<String>,
    },
}

/// Presenter profile, normalized from the upstream DTO. Cosmetic only.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PresenterProfile {
    pub first_name: String,
    pub last_name: String,
    pub avatar_url: String,
    pub organization: String,
    pub is_cct: bool,
    pub is_cce: bool,
    pub is_csc: bool,
    pub is_on_pro: bool,
    pub is_on_premium: bool,
}

/// HTTP client for the upstream join endpoints.
pub struct ApiClient {
    http: reqwest::Client,
    /// Class-code discovery host.
    discovery_base: String,
    /// Profile DTO host.
    profile_base: String,
    /// Domain under which per-region hosts live (`{region}.<domain>`).
    region_domain: String,
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            discovery_base: "https://apitwo.classpoint.app".to_owned(),
            profile_base: "https://api.classpoint.app".to_owned(),
            region_domain: "classpoint.app".to_owned(),
        }
    }

    /// Override the upstream hosts (tests, staging).
    #[must_use]
    pub fn with_bases(
        mut self,
        discovery_base: impl Into<String>,
        profile_base: impl Into<String>,
        region_domain: impl Into<String>,
    ) -> Self {
        self.discovery_base = discovery_base.into();
        self.profile_base = profile_base.into();
        self.region_domain = region_domain.into();
        self
    }

    /// Resolve a class code into region routing info.
    ///
    /// # Errors
    ///
    /// [`ApiError::Upstream`] with the upstream message verbatim for an
    /// unknown code, [`ApiError::Http`]/[`ApiError::Malformed`] for
    /// transport and shape failures.
    pub async fn resolve_class_code(&self, class_code: &str) -> Result<ClassCodeInfo, ApiError> {
        let body = self
            .class_code_request(class_code)
            .send()
            .await?
            .json::<Value>()
            .await?;

        parse_class_code_body(&body)
    }

    /// Validate a join attempt against the region host.
    ///
    /// # Errors
    ///
    /// [`ApiError::InvalidRegion`] before any request for an unusable
    /// region string, [`ApiError::Http`] for transport failures. Upstream
    /// rejections are a [`JoinDecision::Rejected`], not an error.
    pub async fn validate_join(
        &self,
        info: &ClassCodeInfo,
        participant_id: &str,
        participant_username: &str,
    ) -> Result<JoinDecision, ApiError> {
        let region = &info.cpcs_region;
        if region.is_empty()
            || !region
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(ApiError::InvalidRegion(region.clone()));
        }

        let response = self
            .validate_request(info, participant_id, participant_username)
            .send()
            .await?;
        let ok = response.status().is_success();
        let status_text = response.status().to_string();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);

        Ok(parse_validate_body(ok, &status_text, &body))
    }

    /// Best-effort presenter profile lookup; failures are swallowed.
    pub async fn fetch_presenter_profile(&self, email: &str) -> Option<PresenterProfile> {
        let response = self.profile_request(email).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        let body = response.json::<Value>().await.ok()?;
        Some(normalize_profile(&body))
    }

    fn class_code_request(&self, class_code: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!(
                "{}/classcode/region/byclasscode",
                self.discovery_base
            ))
            .query(&[("classcode", class_code)])
            .header(reqwest::header::ACCEPT, "application/json")
    }

    /// Upstream expects POST with query parameters and no body.
    fn validate_request(
        &self,
        info: &ClassCodeInfo,
        participant_id: &str,
        participant_username: &str,
    ) -> reqwest::RequestBuilder {
        self.http
            .post(format!(
                "https://{}.{}/liveclasses/validate-join",
                info.cpcs_region, self.region_domain
            ))
            .query(&[
                ("presenterEmail", info.presenter_email.as_str()),
                ("classCode", info.class_code.as_str()),
                ("participantId", participant_id),
                ("participantUsername", participant_username),
            ])
            .header(reqwest::header::ACCEPT, "application/json, text/plain, */*")
    }

    fn profile_request(&self, email: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}/users/dto/participant-app", self.profile_base))
            .query(&[("email", email)])
            .header(reqwest::header::ACCEPT, "application/json, text/plain, */*")
    }
}

/// Parse the class-code discovery body. An `error` marker fails with the
/// upstream status and message verbatim.
pub(crate) fn parse_class_code_body(body: &Value) -> Result<ClassCodeInfo, ApiError> {
    if pick_bool(body, &["error"]) {
        let status = pick(body, &["statusCode"])
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let message =
            pick_string(body, &["message"]).unwrap_or_else(|| "Class code lookup failed".to_owned());
        return Err(ApiError::Upstream(format!("{status} {message}")));
    }

    let cpcs_region = pick_string(body, &["cpcsRegion", "CpcsRegion", "region"])
        .ok_or(ApiError::Malformed)?;
    let presenter_email =
        pick_string(body, &["presenterEmail", "PresenterEmail"]).ok_or(ApiError::Malformed)?;
    let class_code =
        pick_string(body, &["classCode", "ClassCode"]).ok_or(ApiError::Malformed)?;

    Ok(ClassCodeInfo {
        cpcs_region,
        presenter_email,
        class_code,
    })
}

/// Fold a validate-join response into a decision.
pub(crate) fn parse_validate_body(ok: bool, status_text: &str, body: &Value) -> JoinDecision {
    if ok {
        JoinDecision::Accepted {
            session_id: pick_string(body, &["classSessionId", "ClassSessionId", "sessionId"]),
        }
    } else {
        JoinDecision::Rejected {
            message: pick_string(body, &["message", "Message"])
                .unwrap_or_else(|| status_text.to_owned()),
            error_code: pick_string(body, &["errorCode", "code", "error"]),
        }
    }
}

/// Normalize the presenter DTO, tolerating both the wrapped
/// (`{data: {...}}`) and bare shapes.
pub(crate) fn normalize_profile(body: &Value) -> PresenterProfile {
    let data = pick(body, &["data"]).unwrap_or(body);

    PresenterProfile {
        first_name: pick_string(data, &["firstName", "givenName"]).unwrap_or_default(),
        last_name: pick_string(data, &["lastName", "surname"]).unwrap_or_default(),
        avatar_url: pick_string(data, &["avatarUrl", "photoUrl"]).unwrap_or_default(),
        organization: pick_string(data, &["organization", "org"]).unwrap_or_default(),
        is_cct: pick_bool(data, &["isCCT"]),
        is_cce: pick_bool(data, &["isCCE"]),
        is_csc: pick_bool(data, &["isCSC"]),
        is_on_pro: pick_bool(data, &["isOnPro"]),
        is_on_premium: pick_bool(data, &["isOnPremium"]),
    }
}
