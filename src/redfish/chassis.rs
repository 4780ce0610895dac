//! Chassis resources, aggregated across satellite controllers.
//!
//! Satellite members are exposed under `<prefix>_<remote id>`. The collection
//! fans out one outbound request per satellite, each holding a share of the
//! response; an unreachable satellite only drops its own members.

use std::rc::Rc;
use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::{json, Value};

use super::Services;
use crate::client::OutboundRequest;
use crate::config::SatelliteConfig;
use crate::http::request::Request;
use crate::http::AsyncResp;

const CHASSIS_URL: &str = "/redfish/v1/Chassis";
pub const LOCAL_CHASSIS: &str = "chassis0";

fn local_chassis() -> Value {
    json!({
        "@odata.id": format!("{CHASSIS_URL}/{LOCAL_CHASSIS}"),
        "@odata.type": "#Chassis.v1_14_0.Chassis",
        "Id": LOCAL_CHASSIS,
        "Name": LOCAL_CHASSIS,
        "ChassisType": "RackMount"
    })
}

/// Last path segment of an `@odata.id`.
fn member_id(odata_id: &str) -> Option<&str> {
    odata_id.trim_end_matches('/').rsplit('/').next().filter(|id| !id.is_empty())
}

/// A remote id must stay a single path segment on the satellite.
fn is_plain_segment(id: &str) -> bool {
    !id.is_empty() && id != "." && id != ".." && !id.contains(['/', '\\', '%', '?', '#'])
}

fn satellite_url(satellite: &SatelliteConfig, path: &str) -> String {
    format!("{}{path}", satellite.url.trim_end_matches('/'))
}

async fn fetch(services: &Services, url: &str) -> Result<(StatusCode, Value), String> {
    let request = OutboundRequest::get(url).map_err(|e| e.to_string())?;
    let response = services.client.send(request).await.map_err(|e| e.to_string())?;
    if !response.is_success() {
        return Ok((response.status, Value::Null));
    }
    let body = response.json::<Value>().map_err(|e| e.to_string())?;
    Ok((response.status, body))
}

/// `GET /redfish/v1/Chassis`
pub fn collection(services: &Arc<Services>, req: &Request, res: AsyncResp) {
    res.res().merge_json(json!({
        "@odata.id": CHASSIS_URL,
        "@odata.type": "#ChassisCollection.ChassisCollection",
        "Name": "Chassis Collection",
        "Members": [{ "@odata.id": format!("{CHASSIS_URL}/{LOCAL_CHASSIS}") }]
    }));
    res.on_success(|response| {
        let count = response.json()["Members"].as_array().map_or(0, Vec::len);
        response.json_mut()["Members@odata.count"] = json!(count);
    });

    for satellite in services.satellites.iter().cloned() {
        let services = Arc::clone(services);
        let request_id = req.request_id().to_string();
        res.spawn(move |res| async move {
            let url = satellite_url(&satellite, CHASSIS_URL);
            let result = fetch(&services, &url).await;
            if !res.is_alive() {
                return;
            }
            let members = match result {
                Ok((status, body)) if status.is_success() => body,
                Ok((status, _)) => {
                    tracing::warn!(request_id = %request_id, satellite = %satellite.prefix, status = %status, "Satellite collection unavailable");
                    return;
                }
                Err(e) => {
                    tracing::warn!(request_id = %request_id, satellite = %satellite.prefix, error = %e, "Satellite unreachable");
                    return;
                }
            };

            let mut response = res.res();
            let Some(target) = response.json_mut()["Members"].as_array_mut() else {
                return;
            };
            for member in members["Members"].as_array().into_iter().flatten() {
                if let Some(id) = member["@odata.id"].as_str().and_then(member_id) {
                    target.push(json!({
                        "@odata.id": format!("{CHASSIS_URL}/{}_{id}", satellite.prefix)
                    }));
                }
            }
        });
    }
}

/// `GET /redfish/v1/Chassis/{id}`
pub async fn get(services: Arc<Services>, req: Rc<Request>, res: AsyncResp) {
    let Some(id) = req.param("id") else {
        res.res().set_status(StatusCode::NOT_FOUND);
        return;
    };
    if id == LOCAL_CHASSIS {
        res.res().merge_json(local_chassis());
        return;
    }

    let Some((satellite, remote_id)) = id
        .split_once('_')
        .filter(|(_, remote)| is_plain_segment(remote))
        .and_then(|(prefix, remote)| Some((services.satellite(prefix)?, remote)))
    else {
        res.res().set_status(StatusCode::NOT_FOUND);
        return;
    };

    let url = satellite_url(satellite, &format!("{CHASSIS_URL}/{remote_id}"));
    match fetch(&services, &url).await {
        Ok((status, mut body)) if status.is_success() => {
            body["@odata.id"] = json!(format!("{CHASSIS_URL}/{id}"));
            body["Id"] = json!(id);
            res.res().merge_json(body);
        }
        Ok((status, _)) if status == StatusCode::NOT_FOUND => res.res().set_status(StatusCode::NOT_FOUND),
        Ok((status, _)) => {
            tracing::warn!(request_id = %req.request_id(), satellite = %satellite.prefix, status = %status, "Satellite returned an error");
            res.res()
                .set_error(StatusCode::BAD_GATEWAY, format!("Satellite {} returned {status}", satellite.prefix));
        }
        Err(e) => {
            tracing::warn!(request_id = %req.request_id(), satellite = %satellite.prefix, error = %e, "Satellite unreachable");
            res.res()
                .set_error(StatusCode::BAD_GATEWAY, format!("Satellite {} unreachable", satellite.prefix));
        }
    }
}
