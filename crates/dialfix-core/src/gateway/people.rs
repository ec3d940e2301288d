//! Google People API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ContactGateway, ContactPage, GatewayError, GatewayResult};
use crate::models::{ContactUpdate, RemoteContact};
use crate::util::{compact_text, is_http_url, normalize_text_option};

const PERSON_FIELDS: &str = "names,phoneNumbers,metadata";
const LIST_PAGE_SIZE: &str = "1000";
const HTTP_TIMEOUT_SECS: u64 = 30;

/// `ContactGateway` backed by the Google People API
#[derive(Clone)]
pub struct PeopleApiClient {
    base_url: String,
    access_token: String,
    client: Client,
}

impl std::fmt::Debug for PeopleApiClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("PeopleApiClient")
            .field("base_url", &self.base_url)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl PeopleApiClient {
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> GatewayResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let access_token = normalize_text_option(Some(access_token.into())).ok_or_else(|| {
            GatewayError::Transport("People API access token must not be empty".to_string())
        })?;
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|error| GatewayError::Transport(sanitize(&error)))?;

        Ok(Self {
            base_url,
            access_token,
            client,
        })
    }

    fn person_url(&self, resource_id: &str) -> GatewayResult<String> {
        validate_resource_id(resource_id)?;
        Ok(format!("{}/v1/{resource_id}", self.base_url))
    }

    async fn send(&self, request: RequestBuilder) -> GatewayResult<Value> {
        let response = request
            .bearer_auth(&self.access_token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|error| GatewayError::Transport(sanitize(&error)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status, &body));
        }

        response
            .json::<Value>()
            .await
            .map_err(|error| GatewayError::Transport(format!("Invalid response: {}", sanitize(&error))))
    }
}

#[async_trait]
impl ContactGateway for PeopleApiClient {
    async fn fetch(&self, resource_id: &str) -> GatewayResult<RemoteContact> {
        let url = self.person_url(resource_id)?;
        let payload = self
            .send(self.client.get(url).query(&[("personFields", PERSON_FIELDS)]))
            .await?;
        person_from_value(payload)
    }

    async fn conditional_update(
        &self,
        resource_id: &str,
        version_token: &str,
        update: &ContactUpdate,
    ) -> GatewayResult<RemoteContact> {
        let url = format!("{}:updateContact", self.person_url(resource_id)?);
        let field_mask = update.field_mask().join(",");
        let payload = self
            .send(
                self.client
                    .patch(url)
                    .query(&[
                        ("updatePersonFields", field_mask.as_str()),
                        ("personFields", PERSON_FIELDS),
                    ])
                    .json(&update_body(version_token, update)),
            )
            .await?;
        person_from_value(payload)
    }

    async fn list_contacts(&self, page_token: Option<&str>) -> GatewayResult<ContactPage> {
        let url = format!("{}/v1/people/me/connections", self.base_url);
        let mut query = vec![("personFields", PERSON_FIELDS), ("pageSize", LIST_PAGE_SIZE)];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let payload = self.send(self.client.get(url).query(&query)).await?;
        let listing: ConnectionsResponse = serde_json::from_value(payload)
            .map_err(|error| GatewayError::Transport(format!("Invalid listing: {error}")))?;

        let contacts = listing
            .connections
            .into_iter()
            .map(person_from_value)
            .collect::<GatewayResult<Vec<_>>>()?;

        Ok(ContactPage {
            contacts,
            next_page_token: normalize_text_option(listing.next_page_token),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionsResponse {
    #[serde(default)]
    connections: Vec<Value>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Person {
    resource_name: Option<String>,
    etag: Option<String>,
    #[serde(default)]
    names: Vec<PersonName>,
    #[serde(default)]
    phone_numbers: Vec<PersonPhone>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersonName {
    display_name: Option<String>,
    given_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PersonPhone {
    value: Option<String>,
}

fn person_from_value(raw: Value) -> GatewayResult<RemoteContact> {
    let person: Person = serde_json::from_value(raw.clone())
        .map_err(|error| GatewayError::Transport(format!("Invalid person payload: {error}")))?;

    let resource_id = normalize_text_option(person.resource_name).ok_or_else(|| {
        GatewayError::Transport("Person payload did not include resourceName".to_string())
    })?;
    let version_token = normalize_text_option(person.etag).ok_or_else(|| {
        GatewayError::Transport(format!("Person {resource_id} did not include an etag"))
    })?;

    let display_name = person
        .names
        .into_iter()
        .next()
        .and_then(|name| normalize_text_option(name.display_name.or(name.given_name)));
    let phone_number = person
        .phone_numbers
        .into_iter()
        .next()
        .and_then(|phone| normalize_text_option(phone.value));

    Ok(RemoteContact {
        resource_id,
        version_token,
        display_name,
        phone_number,
        raw,
    })
}

fn update_body(version_token: &str, update: &ContactUpdate) -> Value {
    let mut body = json!({ "etag": version_token });
    if let Some(phone) = &update.phone {
        body["phoneNumbers"] = json!([{ "value": phone }]);
    }
    if let Some(name) = &update.name {
        body["names"] = json!([{ "givenName": name }]);
    }
    body
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
    status: Option<String>,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    reason: Option<String>,
}

/// Map a failed People API response onto the gateway error taxonomy
fn classify_error(status: StatusCode, body: &str) -> GatewayError {
    let parsed = serde_json::from_str::<ApiErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error);

    let api_status = parsed
        .as_ref()
        .and_then(|error| error.status.clone())
        .unwrap_or_default();
    let rate_limit_reason = parsed.as_ref().is_some_and(|error| {
        error.errors.iter().any(|detail| {
            detail
                .reason
                .as_deref()
                .is_some_and(|reason| reason.eq_ignore_ascii_case("rateLimitExceeded"))
        })
    });

    let message = parsed.and_then(|error| error.message).map_or_else(
        || {
            let trimmed = compact_text(body);
            if trimmed.is_empty() {
                format!("HTTP {}", status.as_u16())
            } else {
                format!("{trimmed} ({})", status.as_u16())
            }
        },
        |message| format!("{} ({})", message.trim(), status.as_u16()),
    );

    if status == StatusCode::TOO_MANY_REQUESTS
        || api_status == "RESOURCE_EXHAUSTED"
        || rate_limit_reason
    {
        return GatewayError::RateLimited(message);
    }

    match status {
        StatusCode::NOT_FOUND => GatewayError::NotFound(message),
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => {
            GatewayError::VersionConflict(message)
        }
        _ if api_status == "FAILED_PRECONDITION" => GatewayError::VersionConflict(message),
        _ => GatewayError::Transport(message),
    }
}

fn validate_resource_id(resource_id: &str) -> GatewayResult<()> {
    let valid = resource_id
        .strip_prefix("people/")
        .is_some_and(|rest| {
            !rest.is_empty()
                && rest
                    .chars()
                    .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
        });
    if valid {
        Ok(())
    } else {
        Err(GatewayError::NotFound(format!(
            "Invalid resource id: {}",
            compact_text(resource_id)
        )))
    }
}

fn normalize_base_url(raw: String) -> GatewayResult<String> {
    let base_url = normalize_text_option(Some(raw)).ok_or_else(|| {
        GatewayError::Transport("People API base URL must not be empty".to_string())
    })?;
    if is_http_url(&base_url) {
        Ok(base_url.trim_end_matches('/').to_string())
    } else {
        Err(GatewayError::Transport(
            "People API base URL must include http:// or https://".to_string(),
        ))
    }
}

fn sanitize(error: &impl std::fmt::Display) -> String {
    error.to_string().replace('\n', " ").trim().to_string()
}
