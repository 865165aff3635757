use async_trait::async_trait;
use hyper::body::Bytes;
use hyper::header::HOST;
use hyper::{Request, Response, StatusCode};
use serde::Serialize;

use crate::api::utils::json_response;
use crate::errors::LogApiError;
use crate::handler::{Handler, HandlerBody};
use crate::validation::ValidationError;

const VERSION_PATH: &str = "/version";
const FORWARDED_PROTO: &str = "x-forwarded-proto";

struct ApiVersion {
    id: &'static str,
    status: &'static str,
    updated: &'static str,
    logs_path: &'static str,
}

const VERSIONS: &[ApiVersion] = &[
    ApiVersion {
        id: "v2.0",
        status: "DEPRECATED",
        updated: "2015-09-01T00:00:00Z",
        logs_path: "/v2.0/log/single",
    },
    ApiVersion {
        id: "v3.0",
        status: "CURRENT",
        updated: "2016-03-01T00:00:00Z",
        logs_path: "/v3.0/logs",
    },
];

#[derive(Serialize)]
struct Link {
    rel: &'static str,
    href: String,
}

#[derive(Serialize)]
struct VersionElement {
    id: &'static str,
    links: Vec<Link>,
    status: &'static str,
    updated: &'static str,
}

#[derive(Serialize)]
struct VersionList {
    links: Vec<Link>,
    elements: Vec<VersionElement>,
}

/// Lists supported API versions, or describes one via `/version/{id}`.
#[derive(Default)]
pub struct VersionsHandler;

impl VersionsHandler {
    fn element(base: &str, version: &ApiVersion) -> VersionElement {
        VersionElement {
            id: version.id,
            links: vec![
                Link {
                    rel: "self",
                    href: format!("{base}{VERSION_PATH}/{}", version.id),
                },
                Link {
                    rel: "logs",
                    href: format!("{base}{}", version.logs_path),
                },
            ],
            status: version.status,
            updated: version.updated,
        }
    }
}

/// Scheme and authority the client used to reach us
fn base_url<B>(request: &Request<B>) -> String {
    let scheme = request
        .headers()
        .get(FORWARDED_PROTO)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("http");
    let host = request
        .uri()
        .authority()
        .map(|authority| authority.as_str())
        .or_else(|| request.headers().get(HOST).and_then(|h| h.to_str().ok()))
        .unwrap_or("localhost");
    format!("{scheme}://{host}")
}

#[async_trait]
impl Handler for VersionsHandler {
    fn name(&self) -> &'static str {
        "versions"
    }

    async fn handle(&self, request: Request<HandlerBody>) -> Result<Response<Bytes>, LogApiError> {
        let base = base_url(&request);
        let path = request.uri().path();

        let requested = path
            .strip_prefix(VERSION_PATH)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|id| !id.is_empty());

        let body = match requested {
            None => VersionList {
                links: vec![
                    Link {
                        rel: "self",
                        href: format!("{base}{path}"),
                    },
                    Link {
                        rel: "version",
                        href: format!("{base}{VERSION_PATH}"),
                    },
                    Link {
                        rel: "healthcheck",
                        href: format!("{base}/healthcheck"),
                    },
                ],
                elements: VERSIONS.iter().map(|v| Self::element(&base, v)).collect(),
            },
            Some(id) => {
                let version = VERSIONS.iter().find(|v| v.id == id).ok_or_else(|| {
                    ValidationError::MalformedBody(format!("Invalid Version ID {id}"))
                })?;
                VersionList {
                    links: vec![Link {
                        rel: "self",
                        href: format!("{base}{path}"),
                    }],
                    elements: vec![Self::element(&base, version)],
                }
            }
        };

        json_response(StatusCode::OK, &body)
    }
}
