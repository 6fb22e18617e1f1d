use netpath_core::cx::{parse_cx, CxError};
use netpath_core::error::{ErrorCode, NetpathError};
use netpath_core::model::{Network, NetworkId};
use netpath_core::schedule::PreferenceSchedule;
use std::collections::HashMap;
use thiserror::Error;

pub const DEFAULT_PATH_COUNT: usize = 20;

pub const PARAM_UUID: &str = "uuid";
pub const PARAM_SERVER: &str = "server";
pub const PARAM_SOURCE: &str = "source";
pub const PARAM_TARGET: &str = "target";
pub const PARAM_PATHNUM: &str = "pathnum";
pub const PARAM_RELATION_TYPES: &str = "relationtypes";

/// Query-string parameters as received.
pub type RawQueryParameters = HashMap<String, String>;

/// Where the network for one query comes from. Chosen once, during validation.
#[derive(Debug, Clone)]
pub enum NetworkSource {
    ByIdentifier { id: NetworkId, host: String },
    ByUpload { network: Network },
}

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub network: NetworkSource,
    pub sources: Vec<String>,
    pub targets: Vec<String>,
    pub path_count: usize,
    pub relation_types: Option<Vec<String>>,
    pub preference_schedule: Option<PreferenceSchedule>,
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Server must be supplied if UUID is used")]
    MissingServer,
    #[error("Network file is not valid CX/JSON. Error --> {0}")]
    InvalidNetworkDocument(#[source] CxError),
    #[error("Valid CX/JSON file not found and uuid not supplied.")]
    MissingNetworkInput,
    #[error("Preference schedule is not valid JSON. Error --> {0}")]
    InvalidPreferenceSchedule(#[source] serde_json::Error),
    #[error("Missing source list in query string. Example: /directedpath/query?source=EGFR&target=MAP2K1,MAP2K2&pathnum=5")]
    MissingSourceNodes,
    #[error("Missing target list in query string. Example: /directedpath/query?source=EGFR&target=MAP2K1,MAP2K2&pathnum=5")]
    MissingTargetNodes,
}

impl NetpathError for ValidationError {
    fn error_code(&self) -> ErrorCode {
        ErrorCode::InvalidArgument
    }
}

/// Turns raw request data into a [`QueryRequest`]. Pure: no I/O.
#[derive(Debug, Clone)]
pub struct RequestValidator {
    default_path_count: usize,
}

impl Default for RequestValidator {
    fn default() -> Self {
        Self {
            default_path_count: DEFAULT_PATH_COUNT,
        }
    }
}

impl RequestValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rules are checked in a fixed order and the first failure wins:
    /// network source, preference schedule, sources, targets. Path count
    /// and relation types never fail.
    pub fn validate(
        &self,
        params: &RawQueryParameters,
        uploaded_network: Option<&[u8]>,
        uploaded_schedule: Option<&[u8]>,
    ) -> Result<QueryRequest, ValidationError> {
        let network = network_source(params, uploaded_network)?;

        let preference_schedule = match non_empty_bytes(uploaded_schedule) {
            Some(bytes) => Some(
                PreferenceSchedule::parse(bytes)
                    .map_err(ValidationError::InvalidPreferenceSchedule)?,
            ),
            None => None,
        };

        let sources =
            node_list(params.get(PARAM_SOURCE)).ok_or(ValidationError::MissingSourceNodes)?;
        let targets =
            node_list(params.get(PARAM_TARGET)).ok_or(ValidationError::MissingTargetNodes)?;

        let path_count = params
            .get(PARAM_PATHNUM)
            .and_then(|raw| parse_path_count(raw.trim()))
            .unwrap_or(self.default_path_count);

        let relation_types = params
            .get(PARAM_RELATION_TYPES)
            .map(|raw| {
                raw.split_whitespace()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|types| !types.is_empty());

        Ok(QueryRequest {
            network,
            sources,
            targets,
            path_count,
            relation_types,
            preference_schedule,
        })
    }
}

fn network_source(
    params: &RawQueryParameters,
    uploaded_network: Option<&[u8]>,
) -> Result<NetworkSource, ValidationError> {
    if let Some(uuid) = non_empty_param(params, PARAM_UUID) {
        let server = non_empty_param(params, PARAM_SERVER).ok_or(ValidationError::MissingServer)?;
        return Ok(NetworkSource::ByIdentifier {
            id: NetworkId::new(uuid),
            host: normalize_host(server),
        });
    }

    let bytes = non_empty_bytes(uploaded_network).ok_or(ValidationError::MissingNetworkInput)?;
    let network = parse_cx(bytes).map_err(ValidationError::InvalidNetworkDocument)?;
    Ok(NetworkSource::ByUpload { network })
}

fn non_empty_param<'a>(params: &'a RawQueryParameters, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn non_empty_bytes(bytes: Option<&[u8]>) -> Option<&[u8]> {
    bytes.filter(|bytes| !bytes.is_empty())
}

/// Hosts without a scheme are reached over plain http.
fn normalize_host(server: &str) -> String {
    if server.contains("://") {
        server.to_string()
    } else {
        format!("http://{}", server)
    }
}

fn node_list(raw: Option<&String>) -> Option<Vec<String>> {
    let names: Vec<String> = raw?
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();
    (!names.is_empty()).then_some(names)
}

/// Only plain digit strings count; signs, blanks and overflow fall back to
/// the default. Zero is accepted as given.
fn parse_path_count(raw: &str) -> Option<usize> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}
