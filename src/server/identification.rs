//! Server device identification (FC 17 Report Server ID, FC 43/MEI-14 Read
//! Device Identification): the vendor/product strings a server advertises
//! about itself, mirroring pymodbus's `ModbusDeviceIdentification`.

use serde::{Deserialize, Serialize};

/// Object id for each of the seven standard (Basic + Regular) identification
/// objects, per the FC43/MEI-14 object table.
const OBJECT_VENDOR_NAME: u8 = 0x00;
const OBJECT_PRODUCT_CODE: u8 = 0x01;
const OBJECT_MAJOR_MINOR_REVISION: u8 = 0x02;
const OBJECT_VENDOR_URL: u8 = 0x03;
const OBJECT_PRODUCT_NAME: u8 = 0x04;
const OBJECT_MODEL_NAME: u8 = 0x05;
const OBJECT_USER_APPLICATION_NAME: u8 = 0x06;

/// Device identification strings a server reports about itself.
///
/// Fields mirror pymodbus's `ModbusDeviceIdentification(info_name={...})`
/// keys (`VendorName`, `ProductCode`, ...). This implementer carries only
/// the Basic + Regular object set; it has no vendor-specific Extended
/// objects to offer, so conformity levels 0x02 and 0x03 both resolve to the
/// same seven objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusDeviceIdentification {
    pub vendor_name: String,
    pub product_code: String,
    pub major_minor_revision: String,
    pub vendor_url: String,
    pub product_name: String,
    pub model_name: String,
    pub user_application_name: String,
}

impl Default for ModbusDeviceIdentification {
    fn default() -> Self {
        Self {
            vendor_name: "Pymodbus".to_string(),
            product_code: "PM".to_string(),
            major_minor_revision: env!("CARGO_PKG_VERSION").to_string(),
            vendor_url: "https://github.com/pymodbus-dev/pymodbus".to_string(),
            product_name: "Pymodbus Server".to_string(),
            model_name: "Pymodbus Server".to_string(),
            user_application_name: "Pymodbus Server".to_string(),
        }
    }
}

impl ModbusDeviceIdentification {
    /// The seven standard identification objects in object-id order, as
    /// FC43 reports them.
    pub fn objects(&self) -> Vec<(u8, Vec<u8>)> {
        vec![
            (OBJECT_VENDOR_NAME, self.vendor_name.clone().into_bytes()),
            (OBJECT_PRODUCT_CODE, self.product_code.clone().into_bytes()),
            (
                OBJECT_MAJOR_MINOR_REVISION,
                self.major_minor_revision.clone().into_bytes(),
            ),
            (OBJECT_VENDOR_URL, self.vendor_url.clone().into_bytes()),
            (OBJECT_PRODUCT_NAME, self.product_name.clone().into_bytes()),
            (OBJECT_MODEL_NAME, self.model_name.clone().into_bytes()),
            (
                OBJECT_USER_APPLICATION_NAME,
                self.user_application_name.clone().into_bytes(),
            ),
        ]
    }

    /// FC17 Report Server ID payload: vendor name and product code joined
    /// the way pymodbus's default `ReportSlaveIdResponse` does.
    pub fn server_id_bytes(&self) -> Vec<u8> {
        format!("{}-{}", self.vendor_name, self.product_code).into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn objects_are_in_ascending_id_order() {
        let identity = ModbusDeviceIdentification::default();
        let objects = identity.objects();
        let ids: Vec<u8> = objects.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn server_id_bytes_combine_vendor_and_product() {
        let identity = ModbusDeviceIdentification {
            vendor_name: "Acme".to_string(),
            product_code: "X1".to_string(),
            ..ModbusDeviceIdentification::default()
        };
        assert_eq!(identity.server_id_bytes(), b"Acme-X1".to_vec());
    }
}
