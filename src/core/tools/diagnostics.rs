//! Diagnostics-lab tools: package and test catalogue lookups, appointment booking.
//!
//! Catalogue lookups call the lab's public HTTP API and strip the bulky
//! per-entry `locations` list before handing the data to the model.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::{ToolError, ToolHandler, ToolName, ToolResult};
use crate::core::live::FunctionDeclaration;

/// Default base URL of the diagnostics API.
pub const DEFAULT_DIAGNOSTICS_API_URL: &str = "https://api.yodadiagnostics.com";

const HEALTH_PACKAGES_PATH: &str = "/tests/popular/health-packages";
const TEST_DETAILS_PATH: &str = "/tests/paginate/individual/724/1";

const DEFAULT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
const USER_AGENT: &str = concat!("vaani-gateway/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client for the diagnostics API.
#[derive(Debug, Clone)]
pub struct DiagnosticsClient {
    http: Client,
    base_url: String,
}

impl Default for DiagnosticsClient {
    fn default() -> Self {
        Self {
            http: Client::new(),
            base_url: DEFAULT_DIAGNOSTICS_API_URL.to_string(),
        }
    }
}

impl DiagnosticsClient {
    pub fn new(base_url: impl Into<String>) -> ToolResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .pool_max_idle_per_host(4)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json(&self, path: &str) -> ToolResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%url, "Fetching diagnostics data");
        let response = self.http.get(&url).send().await?.error_for_status()?;
        Ok(response.json::<Value>().await?)
    }
}

/// Take the array at `pointer` and drop `locations` from each object in it.
fn strip_locations(mut body: Value, pointer: &str) -> ToolResult<Value> {
    let entries = body
        .pointer_mut(pointer)
        .and_then(Value::as_array_mut)
        .ok_or_else(|| ToolError::UnexpectedResponse(format!("missing array at {pointer}")))?;

    for entry in entries.iter_mut() {
        if let Some(obj) = entry.as_object_mut() {
            obj.remove("locations");
        }
    }
    Ok(Value::Array(std::mem::take(entries)))
}

fn no_args_declaration(tool: ToolName, description: &str) -> FunctionDeclaration {
    FunctionDeclaration {
        name: tool.as_str().to_string(),
        description: Some(description.to_string()),
        parameters: None,
    }
}

// =============================================================================
// get_health_packages
// =============================================================================

/// Lists the lab's popular health packages.
#[derive(Debug, Clone)]
pub struct HealthPackagesTool {
    client: DiagnosticsClient,
}

impl HealthPackagesTool {
    pub fn new(client: DiagnosticsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for HealthPackagesTool {
    fn name(&self) -> ToolName {
        ToolName::GetHealthPackages
    }

    fn declaration(&self) -> FunctionDeclaration {
        no_args_declaration(
            self.name(),
            "This function/tool returns the popular health packages",
        )
    }

    async fn call(&self, _args: &Map<String, Value>) -> ToolResult<Value> {
        let body = self.client.get_json(HEALTH_PACKAGES_PATH).await?;
        strip_locations(body, "/data")
    }
}

// =============================================================================
// get_test_details
// =============================================================================

/// Lists the individual tests the lab offers.
#[derive(Debug, Clone)]
pub struct TestDetailsTool {
    client: DiagnosticsClient,
}

impl TestDetailsTool {
    pub fn new(client: DiagnosticsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for TestDetailsTool {
    fn name(&self) -> ToolName {
        ToolName::GetTestDetails
    }

    fn declaration(&self) -> FunctionDeclaration {
        no_args_declaration(
            self.name(),
            "This function/tool returns the details of all the tests available",
        )
    }

    async fn call(&self, _args: &Map<String, Value>) -> ToolResult<Value> {
        let body = self.client.get_json(TEST_DETAILS_PATH).await?;
        strip_locations(body, "/data/docs")
    }
}

// =============================================================================
// book_appointment
// =============================================================================

/// Phone numbers arrive as a JSON number or, from some models, a string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PhoneNumber {
    Number(serde_json::Number),
    Text(String),
}

impl std::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhoneNumber::Number(n) => write!(f, "{n}"),
            PhoneNumber::Text(s) => f.write_str(s),
        }
    }
}

/// Arguments for `book_appointment`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookAppointmentArgs {
    #[serde(default)]
    pub is_sample_collection_at_home: Option<bool>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<PhoneNumber>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub test_name: Option<String>,
    /// DD-MM-YYYY
    #[serde(default)]
    pub date: Option<String>,
    /// Slot between 8am and 6pm, e.g. "10am"
    #[serde(default)]
    pub time: Option<String>,
}

/// Records an appointment request.
#[derive(Debug, Clone, Copy, Default)]
pub struct BookAppointmentTool;

#[async_trait]
impl ToolHandler for BookAppointmentTool {
    fn name(&self) -> ToolName {
        ToolName::BookAppointment
    }

    fn declaration(&self) -> FunctionDeclaration {
        FunctionDeclaration {
            name: self.name().as_str().to_string(),
            description: Some("This function will book the appointments for clients".to_string()),
            parameters: Some(json!({
                "type": "OBJECT",
                "properties": {
                    "isSampleCollectionAtHome": {
                        "type": "BOOLEAN",
                        "description": "True if the patient opts for home sample collection, false for in-lab collection"
                    },
                    "name": {
                        "type": "STRING",
                        "description": "Patient's name"
                    },
                    "phone": {
                        "type": "NUMBER",
                        "description": "Patient's phone number, used to coordinate the sample collection visit"
                    },
                    "address": {
                        "type": "STRING",
                        "description": "Patient's address, required when isSampleCollectionAtHome is true"
                    },
                    "testName": {
                        "type": "STRING",
                        "description": "Test name for which the sample is to be collected"
                    },
                    "date": {
                        "type": "STRING",
                        "description": "Date (DD-MM-YYYY) of the sample collection, e.g. 1-06-2025"
                    },
                    "time": {
                        "type": "STRING",
                        "description": "Time slot for the sample collection, e.g. 2pm or 10am. Collection only happens between 8am and 6pm; tell the patient so"
                    }
                }
            })),
        }
    }

    async fn call(&self, args: &Map<String, Value>) -> ToolResult<Value> {
        let booking: BookAppointmentArgs = serde_json::from_value(Value::Object(args.clone()))
            .map_err(|e| ToolError::InvalidArguments {
                tool: self.name(),
                message: e.to_string(),
            })?;

        tracing::info!(
            name = booking.name.as_deref().unwrap_or("-"),
            phone = %booking.phone.as_ref().map(ToString::to_string).unwrap_or_default(),
            test = booking.test_name.as_deref().unwrap_or("-"),
            date = booking.date.as_deref().unwrap_or("-"),
            time = booking.time.as_deref().unwrap_or("-"),
            at_home = ?booking.is_sample_collection_at_home,
            address = booking.address.as_deref().unwrap_or("-"),
            "Appointment booked"
        );

        Ok(Value::String("Booking successful".to_string()))
    }
}
