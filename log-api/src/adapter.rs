use http::HeaderMap;
use http::request::Parts;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE};

use crate::config::ServiceConfig;
use crate::envelope::{JSON_CONTENT_TYPE, TEXT_CONTENT_TYPE};
use crate::validation::{
    ValidationError, is_delegate, validate_content_type, validate_cross_tenant,
    validate_payload_size,
};

pub const X_TENANT_ID: &str = "x-tenant-id";
pub const X_ROLES: &str = "x-roles";
pub const X_APPLICATION_TYPE: &str = "x-application-type";
pub const X_DIMENSIONS: &str = "x-dimensions";
/// Query parameter naming the tenant a delegate submits logs for
pub const CROSS_TENANT_PARAM: &str = "tenant_id";

/// How a request family carries its log metadata
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestAdapter {
    /// Single log, application type and dimensions in `X-` headers
    HeaderDimensions,
    /// Many logs, dimensions in the JSON body
    BodyDimensions,
}

/// Request metadata validated before the body is read
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestContext {
    pub tenant_id: Option<String>,
    pub cross_tenant_id: Option<String>,
    pub is_delegate: bool,
    /// Media type without parameters
    pub content_type: String,
    pub content_length: u64,
    pub application_type: Option<String>,
    /// Raw `X-Dimensions` value
    pub dimensions: Option<String>,
}

impl RequestContext {
    /// The tenant the logs are recorded under: the cross tenant when a
    /// delegate supplied one, the caller otherwise.
    pub fn effective_tenant(&self) -> Option<&str> {
        self.cross_tenant_id
            .as_deref()
            .filter(|_| self.is_delegate)
            .or(self.tenant_id.as_deref())
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
}

fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

impl RequestAdapter {
    pub fn allowed_content_types(&self) -> &'static [&'static str] {
        match self {
            RequestAdapter::HeaderDimensions => &[JSON_CONTENT_TYPE, TEXT_CONTENT_TYPE],
            RequestAdapter::BodyDimensions => &[JSON_CONTENT_TYPE],
        }
    }

    /// Runs the header level checks in order: payload size, content type,
    /// cross tenant permission.
    pub fn context(
        &self,
        parts: &Parts,
        service: &ServiceConfig,
    ) -> Result<RequestContext, ValidationError> {
        let headers = &parts.headers;

        let declared_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        let content_length = validate_payload_size(declared_length, service.max_log_size)?;

        let declared_type = headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok());
        let content_type = validate_content_type(declared_type, self.allowed_content_types())?;

        let tenant_id = header(headers, X_TENANT_ID).filter(|tenant| !tenant.is_empty());
        let cross_tenant_id = query_param(parts.uri.query(), CROSS_TENANT_PARAM);
        let is_delegate = is_delegate(header(headers, X_ROLES).as_deref(), &service.delegate_roles);
        validate_cross_tenant(
            tenant_id.as_deref(),
            cross_tenant_id.as_deref(),
            is_delegate,
        )?;

        let (application_type, dimensions) = match self {
            RequestAdapter::HeaderDimensions => (
                header(headers, X_APPLICATION_TYPE),
                header(headers, X_DIMENSIONS),
            ),
            RequestAdapter::BodyDimensions => (None, None),
        };

        Ok(RequestContext {
            tenant_id,
            cross_tenant_id,
            is_delegate,
            content_type,
            content_length,
            application_type,
            dimensions,
        })
    }
}
