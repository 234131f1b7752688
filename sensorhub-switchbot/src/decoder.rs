//! Advertisement decoding.

use std::collections::HashMap;

use sensorhub_framework::{EntityId, Event, EventDecoder, Fields, MacAddress, Tags};

use crate::config::{DeviceEntry, DeviceKind};

/// Bluetooth SIG company identifier of SwitchBot (Wonder Labs).
pub const COMPANY_ID: u16 = 0x0969;

pub const TEMPERATURE: &str = "temperature";
pub const HUMIDITY: &str = "humidity";
pub const CO2: &str = "co2";
pub const POWER: &str = "power";

/// Build an [`Event`] from one received advertisement.
///
/// Returns `None` when the advertisement carries no SwitchBot manufacturer
/// data.
pub fn advertisement_event(
    address: MacAddress,
    rssi: Option<i16>,
    manufacturer_data: &HashMap<u16, Vec<u8>>,
) -> Option<Event> {
    let payload = manufacturer_data.get(&COMPANY_ID)?;
    Some(Event {
        source: EntityId::Mac(address),
        signal: rssi.map(f64::from),
        payload: payload.clone(),
    })
}

/// Meter: temperature, humidity and, on CO2 models, CO2.
fn decode_meter(data: &[u8]) -> Option<Fields> {
    if data.len() < 11 {
        return None;
    }
    let sign = if data[9] & 0x80 != 0 { 1.0 } else { -1.0 };
    let temperature = ((data[8] & 0x0f) as f64 / 10.0 + (data[9] & 0x7f) as f64) * sign;
    let mut fields = Fields::new()
        .with(TEMPERATURE, temperature)
        .with(HUMIDITY, (data[10] & 0x7f) as f64);
    if data.len() >= 16 {
        fields.set(CO2, (((data[13] as u16) << 8) + data[14] as u16) as f64);
    }
    Some(fields)
}

/// Plug Mini: load in watts.
fn decode_plug(data: &[u8]) -> Option<Fields> {
    if data.len() < 12 {
        return None;
    }
    let raw = (((data[10] & 0x3f) as u16) << 8) + (data[11] & 0x7f) as u16;
    Some(Fields::new().with(POWER, raw as f64 / 10.0))
}

#[derive(Debug, Clone)]
struct Known {
    kind: DeviceKind,
    address: String,
    name: String,
}

/// Decoder keyed by the configured device list.
///
/// Devices that are not configured get identity tags and signal strength
/// only, since their kind is unknown.
#[derive(Debug, Clone)]
pub struct SwitchBotDecoder {
    host: Option<String>,
    devices: HashMap<EntityId, Known>,
}

impl SwitchBotDecoder {
    pub fn new(host: Option<String>, entries: &[DeviceEntry]) -> sensorhub_framework::Result<Self> {
        let mut devices = HashMap::new();
        for entry in entries {
            let mac: MacAddress = entry.address.parse()?;
            devices.insert(
                EntityId::Mac(mac),
                Known {
                    kind: entry.kind,
                    address: entry.address.clone(),
                    name: entry.display_name().to_string(),
                },
            );
        }
        Ok(Self { host, devices })
    }

    pub fn kind(&self, id: &EntityId) -> Option<DeviceKind> {
        self.devices.get(id).map(|d| d.kind)
    }

    /// Ids of configured devices.
    pub fn known(&self) -> impl Iterator<Item = &EntityId> {
        self.devices.keys()
    }
}

impl EventDecoder for SwitchBotDecoder {
    fn tags(&self, id: &EntityId) -> Tags {
        let mut tags = Tags::new().with("model", "switchbot");
        if let Some(host) = &self.host {
            tags.insert("host", host.clone());
        }
        match self.devices.get(id) {
            Some(known) => {
                tags.insert("address", known.address.clone());
                tags.insert("name", known.name.clone());
            }
            None => {
                tags.insert("address", id.to_string());
                tags.insert("name", id.to_string());
            }
        }
        tags
    }

    fn decode(&self, id: &EntityId, payload: &[u8]) -> Option<Fields> {
        match self.kind(id) {
            Some(DeviceKind::Meter) => decode_meter(payload),
            Some(DeviceKind::Plug) => decode_plug(payload),
            None => Some(Fields::new()),
        }
    }

    /// A decoded frame from a configured device carries every field that
    /// device currently reports, so a Meter frame without CO2 clears it.
    fn replaces(&self, id: &EntityId) -> bool {
        self.devices.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meter_payload(temp_int: u8, temp_frac: u8, above_zero: bool, humidity: u8) -> Vec<u8> {
        let mut data = vec![0u8; 11];
        data[8] = temp_frac;
        data[9] = temp_int | if above_zero { 0x80 } else { 0 };
        data[10] = humidity;
        data
    }

    #[test]
    fn test_decode_meter() {
        let fields = decode_meter(&meter_payload(23, 4, true, 48)).unwrap();
        assert_eq!(fields.get(TEMPERATURE), Some(23.4));
        assert_eq!(fields.get(HUMIDITY), Some(48.0));
        assert_eq!(fields.get(CO2), None);
    }

    #[test]
    fn test_decode_meter_below_zero() {
        let fields = decode_meter(&meter_payload(5, 2, false, 80)).unwrap();
        assert_eq!(fields.get(TEMPERATURE), Some(-5.2));
    }

    #[test]
    fn test_decode_meter_co2() {
        let mut data = meter_payload(21, 0, true, 40);
        data.resize(16, 0);
        data[13] = 0x03;
        data[14] = 0x20;
        let fields = decode_meter(&data).unwrap();
        assert_eq!(fields.get(CO2), Some(800.0));
    }

    #[test]
    fn test_decode_meter_short() {
        assert!(decode_meter(&[0u8; 10]).is_none());
    }

    #[test]
    fn test_decode_plug() {
        let mut data = vec![0u8; 12];
        data[10] = 0x40 | 0x01; // high bits outside the mask are ignored
        data[11] = 0x2c;
        let fields = decode_plug(&data).unwrap();
        assert_eq!(fields.get(POWER), Some(30.0));
        assert!(decode_plug(&data[..11]).is_none());
    }

    #[test]
    fn test_advertisement_event() {
        let mac: MacAddress = "C0:12:34:56:78:9A".parse().unwrap();
        let mut data = HashMap::from([(0x004c, vec![1, 2, 3])]);
        assert!(advertisement_event(mac, Some(-60), &data).is_none());

        data.insert(COMPANY_ID, vec![9; 11]);
        let event = advertisement_event(mac, Some(-60), &data).unwrap();
        assert_eq!(event.source, EntityId::Mac(mac));
        assert_eq!(event.signal, Some(-60.0));
        assert_eq!(event.payload.len(), 11);
    }

    #[test]
    fn test_unknown_device_tags() {
        let decoder = SwitchBotDecoder::new(Some("pi".into()), &[]).unwrap();
        let id = EntityId::Mac("01:02:03:04:05:06".parse().unwrap());
        let tags = decoder.tags(&id);
        assert_eq!(tags.get("address").map(|v| v.to_string()).as_deref(), Some("01:02:03:04:05:06"));
        assert_eq!(decoder.decode(&id, &[0u8; 3]), Some(Fields::new()));
        assert!(!decoder.replaces(&id));
    }

    #[test]
    fn test_known_device_frames_replace() {
        let entry = DeviceEntry {
            address: "C0:12:34:56:78:9A".to_string(),
            name: None,
            kind: DeviceKind::Meter,
        };
        let decoder = SwitchBotDecoder::new(None, &[entry]).unwrap();
        let id = EntityId::Mac("C0:12:34:56:78:9A".parse().unwrap());
        assert!(decoder.replaces(&id));
    }
}
