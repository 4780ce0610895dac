//! Service discovery documents.

use std::rc::Rc;

use serde_json::json;

use super::Services;
use crate::http::request::Request;
use crate::http::AsyncResp;

pub const REDFISH_VERSION: &str = "1.17.0";

/// `GET /redfish`
pub fn versions(_req: Rc<Request>, res: AsyncResp) {
    res.res().merge_json(json!({ "v1": "/redfish/v1/" }));
}

/// `GET /redfish/v1`
pub fn service_root(services: &Services, _req: &Request, res: AsyncResp) {
    res.res().merge_json(json!({
        "@odata.id": "/redfish/v1",
        "@odata.type": "#ServiceRoot.v1_11_0.ServiceRoot",
        "Id": "RootService",
        "Name": "Root Service",
        "RedfishVersion": REDFISH_VERSION,
        "UUID": services.service_uuid.to_string(),
        "Chassis": { "@odata.id": "/redfish/v1/Chassis" },
        "SessionService": { "@odata.id": "/redfish/v1/SessionService" },
        "Links": {
            "Sessions": { "@odata.id": "/redfish/v1/SessionService/Sessions" }
        }
    }));
}

/// `GET /redfish/v1/odata`
pub fn odata(_req: Rc<Request>, res: AsyncResp) {
    let services = [
        ("Service", "/redfish/v1/"),
        ("Chassis", "/redfish/v1/Chassis"),
        ("SessionService", "/redfish/v1/SessionService"),
    ];
    let value: Vec<_> = services
        .iter()
        .map(|(name, url)| json!({ "name": name, "kind": "Singleton", "url": url }))
        .collect();
    res.res().merge_json(json!({
        "@odata.context": "/redfish/v1/$metadata",
        "value": value
    }));
}

#[cfg(test)]
mod tests {
    use super::super::testing::{call, request, services};
    use super::super::routes;
    use crate::config::ServerConfig;
    use axum::http::{Method, StatusCode};

    #[tokio::test]
    async fn discovery_documents() {
        let services = services(&ServerConfig::default());
        let uuid = services.service_uuid.to_string();
        let router = routes(services);

        let (status, body) = call(&router, request(Method::GET, "/redfish")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["v1"], "/redfish/v1/");

        let (_, body) = call(&router, request(Method::GET, "/redfish/v1/")).await;
        assert_eq!(body["@odata.type"], "#ServiceRoot.v1_11_0.ServiceRoot");
        assert_eq!(body["UUID"], uuid.as_str());

        let (_, body) = call(&router, request(Method::GET, "/redfish/v1/odata")).await;
        assert_eq!(body["value"][0]["url"], "/redfish/v1/");
    }
}
