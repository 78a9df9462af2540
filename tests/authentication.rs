// Copyright 2017 Dmitry Tantsur <divius.inside@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod common;

use bytes::Bytes;
use http::{Method, Request, Response};
use serde_json::json;

use osprovider::auth::{AccessSecret, AgencyDelegation, ExistingToken, UserPassword};
use osprovider::{EndpointQuery, ErrorKind, IdOrName, ProviderSession};

use common::{body_json, header, json_response, not_found, route, token_response, FakeCloud};

fn versions(_req: &Request<Bytes>) -> Response<Bytes> {
    json_response(
        300,
        json!({"versions": {"values": [
            {"id": "v3.14", "status": "stable"},
            {"id": "v2.0", "status": "deprecated"}
        ]}}),
    )
}

fn project_token(req: &Request<Bytes>) -> Response<Bytes> {
    let body = body_json(req);
    if body["auth"]["identity"]["password"]["user"]["password"] != "p" {
        return json_response(401, json!({"error": {"message": "bad password"}}));
    }
    token_response(
        "T1",
        json!({"token": {
            "expires_at": "2030-01-01T00:00:00.000000Z",
            "project": {"id": "P1", "name": "proj", "domain": {"id": "D1"}},
            "catalog": [{
                "type": "compute",
                "name": "nova",
                "endpoints": [{
                    "id": "E1",
                    "url": "https://compute.r1.example/",
                    "region": "r1",
                    "interface": "public"
                }]
            }]
        }}),
    )
}

fn compute(region: &str) -> EndpointQuery {
    EndpointQuery::new("compute")
        .with_region(region)
        .with_interface("public")
}

#[tokio::test]
async fn test_password_v3_project_scoped() {
    common::set_up();
    let cloud = FakeCloud::new(|req| match route(req).as_str() {
        "GET /" => versions(req),
        "POST /v3/auth/tokens" => {
            assert_eq!(
                body_json(req)["auth"]["scope"],
                json!({"project": {"name": "proj"}})
            );
            project_token(req)
        }
        _ => not_found(),
    });
    let session =
        ProviderSession::new_with_transport("https://id.example/", cloud.clone()).unwrap();

    let credential = UserPassword::new("u", "p").with_tenant_name("proj");
    session.authenticate(credential.into()).await.unwrap();

    assert_eq!(session.token().await.as_deref(), Some("T1"));
    assert_eq!(session.project_id().await.as_deref(), Some("P1"));
    assert_eq!(session.domain_id().await.as_deref(), Some("D1"));
    assert!(session.expires_at().await.is_some());
    assert_eq!(
        session.locate_endpoint(&compute("r1")).await.unwrap().as_str(),
        "https://compute.r1.example/"
    );
    assert_eq!(
        session
            .locate_endpoint(&compute("r2"))
            .await
            .err()
            .unwrap()
            .kind(),
        ErrorKind::EndpointNotFound
    );
    assert_eq!(
        cloud.calls(),
        vec![
            "GET https://id.example/".to_string(),
            "POST https://id.example/v3/auth/tokens".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_password_v2_fallback() {
    common::set_up();
    let cloud = FakeCloud::new(|req| match route(req).as_str() {
        "GET /identity/" => json_response(
            300,
            json!({"versions": {"values": [{"id": "v2.0", "status": "stable"}]}}),
        ),
        "POST /identity/v2.0/tokens" => {
            assert_eq!(
                body_json(req),
                json!({"auth": {
                    "passwordCredentials": {"username": "u", "password": "p"},
                    "tenantName": "proj"
                }})
            );
            json_response(
                200,
                json!({"access": {
                    "token": {"id": "T2", "tenant": {"id": "P2", "name": "proj"}},
                    "serviceCatalog": [{
                        "type": "compute",
                        "name": "nova",
                        "endpoints": [{
                            "region": "r1",
                            "publicURL": "https://compute.public/",
                            "internalURL": "https://compute.internal",
                            "adminURL": "https://compute.admin/"
                        }]
                    }]
                }}),
            )
        }
        _ => not_found(),
    });
    let session =
        ProviderSession::new_with_transport("https://id.example/identity", cloud.clone()).unwrap();

    let (version, endpoint) = session.negotiate_version().await.unwrap();
    assert_eq!(version.id, "v2.0");
    assert_eq!(endpoint.as_str(), "https://id.example/identity/v2.0/");

    let credential = UserPassword::new("u", "p").with_tenant_name("proj");
    session.authenticate(credential.into()).await.unwrap();

    assert_eq!(session.token().await.as_deref(), Some("T2"));
    assert_eq!(session.project_id().await.as_deref(), Some("P2"));
    assert!(session.domain_id().await.is_none());
    let internal = EndpointQuery::new("compute").with_interface("internal");
    assert_eq!(
        session.locate_endpoint(&internal).await.unwrap().as_str(),
        "https://compute.internal/"
    );
    let admin = EndpointQuery::new("compute").with_interface("admin");
    assert_eq!(
        session.locate_endpoint(&admin).await.unwrap().as_str(),
        "https://compute.admin/"
    );
}

#[tokio::test]
async fn test_ambiguous_endpoint() {
    common::set_up();
    let cloud = FakeCloud::new(|req| match route(req).as_str() {
        "POST /v3/auth/tokens" => token_response(
            "T1",
            json!({"token": {
                "project": {"id": "P1"},
                "catalog": [{
                    "type": "compute",
                    "endpoints": [
                        {"url": "https://a.r1.example", "region": "r1", "interface": "public"},
                        {"url": "https://b.r1.example/", "region": "r1", "interface": "public"},
                        {"url": "https://c.r1.example/", "region": "r1", "interface": "internal"}
                    ]
                }]
            }}),
        ),
        _ => not_found(),
    });
    let session = ProviderSession::new_with_transport("https://id.example/v3", cloud).unwrap();
    session
        .authenticate(UserPassword::new("u", "p").into())
        .await
        .unwrap();

    let err = session
        .locate_endpoint(&compute("r1"))
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::AmbiguousEndpoints);
    assert_eq!(
        err.candidates(),
        &[
            "https://a.r1.example/".to_string(),
            "https://b.r1.example/".to_string()
        ]
    );

    let bad = EndpointQuery::new("compute").with_interface("private");
    assert_eq!(
        session.locate_endpoint(&bad).await.err().unwrap().kind(),
        ErrorKind::InvalidInterface
    );
}

fn signed(req: &Request<Bytes>) -> bool {
    header(req, "authorization").map_or(false, |v| v.starts_with("SDK-HMAC-SHA256 "))
        && header(req, "x-sdk-date").is_some()
}

fn discovery(req: &Request<Bytes>) -> Option<Response<Bytes>> {
    let resp = match route(req).as_str() {
        "GET /v3/projects?name=proj" => json_response(
            200,
            json!({"projects": [{"id": "P1", "name": "proj"}]}),
        ),
        "GET /v3/auth/domains?name=dom" => json_response(
            200,
            json!({"domains": [{"id": "D1", "name": "dom"}]}),
        ),
        "GET /v3/services" => json_response(
            200,
            json!({
                "services": [{"id": "S1", "type": "compute"}],
                "links": {"next": "https://iam.example/v3/services?marker=S1"}
            }),
        ),
        "GET /v3/services?marker=S1" => json_response(
            200,
            json!({"services": [{"id": "S2", "type": "network"}], "links": {"next": null}}),
        ),
        "GET /v3/endpoints" => json_response(
            200,
            json!({"endpoints": [
                {
                    "id": "E1",
                    "service_id": "S1",
                    "url": "https://compute/$(tenant_id)s/",
                    "region": "r1",
                    "interface": "public"
                },
                {
                    "id": "E2",
                    "service_id": "S2",
                    "url": "https://vpc.r1.example",
                    "region": "r1",
                    "interface": "public"
                },
                {
                    "id": "E3",
                    "service_id": "S2",
                    "url": "https://vpc.r1.example/odd",
                    "region": "r1",
                    "interface": "private"
                }
            ]}),
        ),
        _ => return None,
    };
    Some(resp)
}

#[tokio::test]
async fn test_access_secret_discovery() {
    common::set_up();
    let cloud = FakeCloud::new(|req| {
        if !signed(req) {
            return json_response(401, json!({"error": {"message": "unsigned"}}));
        }
        if let Some(resp) = discovery(req) {
            return resp;
        }
        match route(req).as_str() {
            "GET /P1/servers" if header(req, "x-project-id") == Some("P1") => {
                json_response(200, json!({"servers": []}))
            }
            _ => not_found(),
        }
    });
    let session =
        ProviderSession::new_with_transport("https://iam.example/v3", cloud.clone()).unwrap();

    let credential = AccessSecret::new("AK", "SK")
        .with_project_name("proj")
        .with_region("r1");
    session.authenticate(credential.into()).await.unwrap();

    assert!(session.token().await.is_none());
    assert_eq!(session.project_id().await.as_deref(), Some("P1"));
    assert!(session.domain_id().await.is_none());
    assert_eq!(
        session.locate_endpoint(&compute("r1")).await.unwrap().as_str(),
        "https://compute/P1/"
    );
    assert_eq!(
        session
            .locate_endpoint(&EndpointQuery::new("network"))
            .await
            .unwrap()
            .as_str(),
        "https://vpc.r1.example/"
    );
    assert_eq!(cloud.count("GET https://iam.example/v3/services"), 2);
    assert_eq!(cloud.count("POST"), 0);

    let request = Request::builder()
        .method(Method::GET)
        .uri("https://compute/P1/servers")
        .body(Bytes::new())
        .unwrap();
    let resp = session.send(request).await.unwrap();
    assert_eq!(resp.body().as_ref(), b"{\"servers\":[]}");
}

#[tokio::test]
async fn test_access_secret_discovery_without_project() {
    common::set_up();
    let cloud = FakeCloud::new(|req| {
        if !signed(req) {
            return json_response(401, json!({"error": {"message": "unsigned"}}));
        }
        discovery(req).unwrap_or_else(not_found)
    });
    let session =
        ProviderSession::new_with_transport("https://iam.example/v3", cloud.clone()).unwrap();

    let credential = AccessSecret::new("AK", "SK").with_region("r1");
    session.authenticate(credential.into()).await.unwrap();

    assert!(session.project_id().await.is_none());
    let url = session.locate_endpoint(&compute("r1")).await.unwrap();
    assert_eq!(url.as_str(), "https://compute//");
    assert!(!url.as_str().contains("tenant_id"));
    assert_eq!(cloud.count("GET https://iam.example/v3/projects"), 0);
}

#[tokio::test]
async fn test_access_secret_ambiguous_project() {
    common::set_up();
    let cloud = FakeCloud::new(|req| match route(req).as_str() {
        "GET /v3/projects?name=proj" => json_response(
            200,
            json!({"projects": [{"id": "P1"}, {"id": "P2"}]}),
        ),
        _ => not_found(),
    });
    let session = ProviderSession::new_with_transport("https://iam.example/v3", cloud).unwrap();

    let credential = AccessSecret::new("AK", "SK").with_project_name("proj");
    let err = session.authenticate(credential.into()).await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::AmbiguousResource);
    assert!(!session.is_authenticated().await);
}

fn agency_cloud() -> FakeCloud {
    FakeCloud::new(|req| match route(req).as_str() {
        "POST /v3/auth/tokens" => {
            let body = body_json(req);
            match body["auth"]["identity"]["methods"][0].as_str() {
                Some("password") => project_token(req),
                Some("assume_role") => {
                    assert_eq!(
                        body["auth"]["identity"]["assume_role"],
                        json!({"domain_name": "d1", "xrole_name": "a1"})
                    );
                    assert_eq!(body["auth"]["scope"], json!({"project": {"name": "p2"}}));
                    if header(req, "x-auth-token") != Some("T1") && !signed(req) {
                        return json_response(401, json!({"error": {"message": "no"}}));
                    }
                    token_response(
                        "T2",
                        json!({"token": {
                            "project": {"id": "p2", "name": "p2"},
                            "catalog": [{
                                "type": "compute",
                                "endpoints": [{
                                    "url": "https://compute.agency/",
                                    "region": "r1",
                                    "interface": "public"
                                }]
                            }]
                        }}),
                    )
                }
                _ => json_response(400, json!({"error": {"message": "bad method"}})),
            }
        }
        _ => discovery(req).unwrap_or_else(not_found),
    })
}

#[tokio::test]
async fn test_agency_with_password() {
    common::set_up();
    let cloud = agency_cloud();
    let session =
        ProviderSession::new_with_transport("https://iam.example/v3/", cloud.clone()).unwrap();

    let base = UserPassword::new("u", "p").with_domain_name("Default");
    let credential = AgencyDelegation::new(base, "a1", "d1").with_delegated_project("p2");
    session.authenticate(credential.into()).await.unwrap();

    assert_eq!(
        cloud.calls(),
        vec![
            "POST https://iam.example/v3/auth/tokens".to_string(),
            "POST https://iam.example/v3/auth/tokens".to_string(),
        ]
    );
    assert_eq!(session.token().await.as_deref(), Some("T2"));
    assert_eq!(session.project_id().await.as_deref(), Some("p2"));
    // Kept from the password token.
    assert_eq!(session.domain_id().await.as_deref(), Some("D1"));
    assert_eq!(
        session.locate_endpoint(&compute("r1")).await.unwrap().as_str(),
        "https://compute.agency/"
    );
}

#[tokio::test]
async fn test_agency_with_access_secret() {
    common::set_up();
    let cloud = agency_cloud();
    let session =
        ProviderSession::new_with_transport("https://iam.example/v3", cloud.clone()).unwrap();

    let base = AccessSecret::new("AK", "SK")
        .with_project_name("proj")
        .with_domain(IdOrName::from_name("dom"));
    let credential = AgencyDelegation::new(base, "a1", "d1").with_delegated_project("p2");
    session.authenticate(credential.into()).await.unwrap();

    assert_eq!(cloud.count("POST https://iam.example/v3/auth/tokens"), 1);
    assert_eq!(session.token().await.as_deref(), Some("T2"));
    assert_eq!(session.project_id().await.as_deref(), Some("p2"));
    assert_eq!(session.domain_id().await.as_deref(), Some("D1"));
}

#[tokio::test]
async fn test_agency_with_access_secret_requires_domain() {
    common::set_up();
    let cloud = agency_cloud();
    let session =
        ProviderSession::new_with_transport("https://iam.example/v3", cloud.clone()).unwrap();

    let base = AccessSecret::new("AK", "SK").with_project_name("proj");
    let credential = AgencyDelegation::new(base, "a1", "d1").with_delegated_project("p2");
    let err = session.authenticate(credential.into()).await.err().unwrap();

    assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    assert_eq!(cloud.count("POST"), 0);
    assert!(!session.is_authenticated().await);
}

#[tokio::test]
async fn test_existing_token() {
    common::set_up();
    let cloud = FakeCloud::new(|_| not_found());
    let session =
        ProviderSession::new_with_transport("https://id.example/", cloud.clone()).unwrap();

    session
        .authenticate(ExistingToken::new("T0").into())
        .await
        .unwrap();
    assert!(cloud.calls().is_empty());
    assert_eq!(session.token().await.as_deref(), Some("T0"));
    assert_eq!(
        session
            .locate_endpoint(&compute("r1"))
            .await
            .err()
            .unwrap()
            .kind(),
        ErrorKind::EndpointNotFound
    );
    assert_eq!(
        session.reauthenticate().await.err().unwrap().kind(),
        ErrorKind::AuthenticationFailed
    );
}

#[tokio::test]
async fn test_failure_keeps_session() {
    common::set_up();
    let cloud = FakeCloud::new(|req| match route(req).as_str() {
        "POST /v3/auth/tokens" => project_token(req),
        _ => not_found(),
    });
    let session = ProviderSession::new_with_transport("https://id.example/v3", cloud).unwrap();

    session
        .authenticate(UserPassword::new("u", "p").into())
        .await
        .unwrap();
    let before = session.snapshot().await;

    let err = session
        .authenticate(UserPassword::new("u", "wrong").into())
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
    assert_eq!(session.snapshot().await, before);
    assert_eq!(session.token().await.as_deref(), Some("T1"));
}

#[tokio::test]
async fn test_no_supported_version() {
    common::set_up();
    let cloud = FakeCloud::new(|req| match route(req).as_str() {
        "GET /" => json_response(
            200,
            json!({"versions": {"values": [{"id": "v4.0", "status": "stable"}]}}),
        ),
        _ => not_found(),
    });
    let session = ProviderSession::new_with_transport("https://id.example", cloud).unwrap();

    let err = session
        .authenticate(UserPassword::new("u", "p").into())
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::NoSupportedVersion);
    assert!(!session.is_authenticated().await);
}
