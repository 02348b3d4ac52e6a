//! GATT protocol definitions: well-known identifiers, characteristic
//! property flags and the discovery tree handed over by the transport.

use std::fmt;

use uuid::Uuid;

/// Client Characteristic Configuration Descriptor (0x2902 on the Bluetooth
/// base UUID), written to enable notifications or indications.
pub const CLIENT_CHARACTERISTIC_CONFIG: Uuid =
    Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

/// LED service advertised by the BL600 demo peripheral.
pub const LED_SERVICE_UUID: Uuid = Uuid::from_u128(0xcdea40a1_dcdb_42bb_8557_5c3d7d5135cb);

/// LED state characteristic (notify + write + read) within the LED service.
pub const LED_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0xf7552729_9d2c_45cc_ba33_a3327a3bb6d0);

/// CCCD payload enabling notifications (little-endian 0x0001).
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];

/// CCCD payload enabling indications (little-endian 0x0002).
pub const ENABLE_INDICATION_VALUE: [u8; 2] = [0x02, 0x00];

/// Characteristic property bit flags, laid out as in the GATT
/// characteristic declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Properties(u8);

impl Properties {
    pub const READ: Properties = Properties(0x02);
    pub const WRITE_WITHOUT_RESPONSE: Properties = Properties(0x04);
    pub const WRITE: Properties = Properties(0x08);
    pub const NOTIFY: Properties = Properties(0x10);
    pub const INDICATE: Properties = Properties(0x20);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Properties) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn readable(self) -> bool {
        self.contains(Self::READ)
    }

    pub const fn writable(self) -> bool {
        self.contains(Self::WRITE)
    }

    pub const fn writable_without_response(self) -> bool {
        self.contains(Self::WRITE_WITHOUT_RESPONSE)
    }

    pub const fn notifiable(self) -> bool {
        self.contains(Self::NOTIFY)
    }

    pub const fn indicatable(self) -> bool {
        self.contains(Self::INDICATE)
    }
}

impl std::ops::BitOr for Properties {
    type Output = Properties;

    fn bitor(self, rhs: Properties) -> Properties {
        Properties(self.0 | rhs.0)
    }
}

impl fmt::Display for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(Properties, &str); 5] = [
            (Properties::READ, "read"),
            (Properties::WRITE_WITHOUT_RESPONSE, "write-without-response"),
            (Properties::WRITE, "write"),
            (Properties::NOTIFY, "notify"),
            (Properties::INDICATE, "indicate"),
        ];

        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("none")?;
        }
        Ok(())
    }
}

/// One characteristic as surfaced by service discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicInfo {
    pub uuid: Uuid,
    pub properties: Properties,
    /// Descriptors attached to the characteristic, by UUID.
    pub descriptors: Vec<Uuid>,
}

impl CharacteristicInfo {
    pub fn new(uuid: Uuid, properties: Properties) -> Self {
        Self {
            uuid,
            properties,
            descriptors: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_descriptor(mut self, descriptor: Uuid) -> Self {
        self.descriptors.push(descriptor);
        self
    }
}

/// One service with its characteristics, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub uuid: Uuid,
    pub characteristics: Vec<CharacteristicInfo>,
}

impl ServiceInfo {
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            characteristics: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_characteristic(mut self, characteristic: CharacteristicInfo) -> Self {
        self.characteristics.push(characteristic);
        self
    }
}
