//! BIOS resource.

use std::rc::Rc;

use serde_json::json;

use crate::http::request::Request;
use crate::http::AsyncResp;

/// `GET /redfish/v1/Bios`
pub fn bios(_req: Rc<Request>, res: AsyncResp) {
    let mut response = res.res();
    let body = response.json_mut();
    body["@odata.id"] = json!("/redfish/v1/Bios");
    body["@odata.type"] = json!("#Bios.v1_0_0.Bios");
    body["Name"] = json!("BIOS");
}
