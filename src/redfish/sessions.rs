//! Session service resources.
//!
//! Token sessions live in the `SessionStore`; a certificate session is only
//! visible to requests on its own connection.

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::{json, Value};

use super::Services;
use crate::auth::{Session, SessionType};
use crate::http::request::{HttpRequest, Request};
use crate::http::AsyncResp;

const SESSIONS_URL: &str = "/redfish/v1/SessionService/Sessions";

fn session_json(session: &Session) -> Value {
    json!({
        "@odata.id": format!("{SESSIONS_URL}/{}", session.id),
        "@odata.type": "#Session.v1_3_0.Session",
        "Id": session.id,
        "Name": "User Session",
        "Description": match session.session_type {
            SessionType::Session => "Token session",
            SessionType::MutualTls => "Client certificate session",
        },
        "UserName": session.username,
        "ClientOriginIPAddress": session.client_ip.map(|ip| ip.to_string()),
    })
}

/// The session named by the `{id}` path parameter, if the caller may see it.
fn find(services: &Services, req: &Request) -> Option<Arc<Session>> {
    let id = req.param("id")?;
    if let Some(own) = req.session().filter(|s| s.id == id) {
        return Some(Arc::clone(own));
    }
    services.sessions.get_by_id(id)
}

/// `GET /redfish/v1/SessionService`
pub fn session_service(services: &Services, _req: &Request, res: AsyncResp) {
    res.res().merge_json(json!({
        "@odata.id": "/redfish/v1/SessionService",
        "@odata.type": "#SessionService.v1_0_2.SessionService",
        "Id": "SessionService",
        "Name": "Session Service",
        "ServiceEnabled": true,
        "SessionTimeout": services.sessions.timeout().as_secs(),
        "Sessions": { "@odata.id": SESSIONS_URL }
    }));
}

/// `GET /redfish/v1/SessionService/Sessions`
pub fn collection(services: &Services, _req: &Request, res: AsyncResp) {
    let members: Vec<Value> = services
        .sessions
        .ids()
        .into_iter()
        .map(|id| json!({ "@odata.id": format!("{SESSIONS_URL}/{id}") }))
        .collect();
    res.res().merge_json(json!({
        "@odata.id": SESSIONS_URL,
        "@odata.type": "#SessionCollection.SessionCollection",
        "Name": "Session Collection",
        "Members@odata.count": members.len(),
        "Members": members
    }));
}

/// `GET /redfish/v1/SessionService/Sessions/{id}`
pub fn get(services: &Services, req: &Request, res: AsyncResp) {
    match find(services, req) {
        Some(session) => res.res().merge_json(session_json(&session)),
        None => res.res().set_status(StatusCode::NOT_FOUND),
    }
}

/// `DELETE /redfish/v1/SessionService/Sessions/{id}`
pub fn delete(services: &Services, req: &Request, res: AsyncResp) {
    let Some(session) = find(services, req) else {
        res.res().set_status(StatusCode::NOT_FOUND);
        return;
    };
    if session.session_type == SessionType::MutualTls {
        res.res()
            .set_error(StatusCode::BAD_REQUEST, "Certificate sessions end with their connection");
        return;
    }
    services.sessions.remove(&session);
    res.res().set_status(StatusCode::NO_CONTENT);
}

#[cfg(test)]
mod tests {
    use super::super::testing::{call, request, services};
    use super::super::routes;
    use crate::auth::{Session, SessionType};
    use crate::config::ServerConfig;
    use axum::http::{Method, StatusCode};
    use std::sync::Arc;

    #[tokio::test]
    async fn lists_gets_and_deletes_token_sessions() {
        let services = services(&ServerConfig::default());
        let session = services.sessions.create_session("admin", "10.0.0.9".parse().ok());
        let router = routes(Arc::clone(&services));
        let url = format!("/redfish/v1/SessionService/Sessions/{}", session.id);

        let (_, body) = call(&router, request(Method::GET, "/redfish/v1/SessionService/Sessions")).await;
        assert_eq!(body["Members@odata.count"], 1);
        assert_eq!(body["Members"][0]["@odata.id"], url.as_str());

        let (status, body) = call(&router, request(Method::GET, &url)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["UserName"], "admin");
        assert_eq!(body["ClientOriginIPAddress"], "10.0.0.9");

        let (status, _) = call(&router, request(Method::DELETE, &url)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(services.sessions.is_empty());

        let (status, body) = call(&router, request(Method::GET, &url)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "Base.1.0.GeneralError");
    }

    #[tokio::test]
    async fn certificate_session_visible_on_own_request_only() {
        let services = services(&ServerConfig::default());
        let router = routes(Arc::clone(&services));
        let session = Arc::new(Session::new("operator", None, SessionType::MutualTls));
        let url = format!("/redfish/v1/SessionService/Sessions/{}", session.id);

        let (status, body) = call(
            &router,
            request(Method::GET, &url).with_session(Some(Arc::clone(&session))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["Description"], "Client certificate session");

        let (status, _) = call(&router, request(Method::GET, &url)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(
            &router,
            request(Method::DELETE, &url).with_session(Some(session)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn session_service_reports_timeout() {
        let router = routes(services(&ServerConfig::default()));
        let (_, body) = call(&router, request(Method::GET, "/redfish/v1/SessionService")).await;
        assert_eq!(body["SessionTimeout"], 3600);
    }
}
