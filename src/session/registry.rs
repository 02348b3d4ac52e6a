//! Characteristic registry: turns one service-discovery pass into the
//! references the session needs: the target characteristic, everything that
//! can push value changes, and each characteristic's configuration
//! descriptor.
//!
//! Built fresh on every discovery completion and replaced wholesale on
//! re-discovery; never mutated in between.

use uuid::Uuid;

use crate::domain::models::{ErrorKind, Result, WriteMode};
use crate::session::gatt::{
    CharacteristicInfo, Properties, ServiceInfo, ENABLE_INDICATION_VALUE,
    ENABLE_NOTIFICATION_VALUE,
};

/// A discovered characteristic with its configuration descriptor resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicRecord {
    pub uuid: Uuid,
    pub properties: Properties,
    /// The characteristic's CCCD, when discovery surfaced one.
    pub config_descriptor: Option<Uuid>,
}

impl CharacteristicRecord {
    fn from_info(info: &CharacteristicInfo, config_descriptor_uuid: Uuid) -> Self {
        Self {
            uuid: info.uuid,
            properties: info.properties,
            config_descriptor: info
                .descriptors
                .iter()
                .copied()
                .find(|descriptor| *descriptor == config_descriptor_uuid),
        }
    }

    /// True when the peripheral can push value changes for this
    /// characteristic.
    pub fn supports_subscription(&self) -> bool {
        self.properties.notifiable() || self.properties.indicatable()
    }

    /// CCCD payload to write when subscribing. Indicate takes precedence
    /// over notify when both are advertised, for acknowledged delivery.
    pub fn subscription_value(&self) -> Option<[u8; 2]> {
        if self.properties.indicatable() {
            Some(ENABLE_INDICATION_VALUE)
        } else if self.properties.notifiable() {
            Some(ENABLE_NOTIFICATION_VALUE)
        } else {
            None
        }
    }

    /// Write delivery mode for this characteristic. With-response takes
    /// precedence when both are offered, for delivery confirmation.
    pub fn preferred_write_mode(&self) -> Option<WriteMode> {
        if self.properties.writable() {
            Some(WriteMode::WithResponse)
        } else if self.properties.writable_without_response() {
            Some(WriteMode::WithoutResponse)
        } else {
            None
        }
    }
}

/// Per-discovery lookup over the target service's characteristics, in
/// discovery order.
#[derive(Debug, Clone)]
pub struct CharacteristicRegistry {
    target: Uuid,
    records: Vec<CharacteristicRecord>,
}

impl CharacteristicRegistry {
    /// Locate `service_uuid` in the discovered tree and index its
    /// characteristics. Fails with `ServiceNotFound` when the peripheral
    /// does not expose the service at all.
    pub fn from_discovery(
        services: &[ServiceInfo],
        service_uuid: Uuid,
        target_uuid: Uuid,
        config_descriptor_uuid: Uuid,
    ) -> Result<Self> {
        let service = services
            .iter()
            .find(|service| service.uuid == service_uuid)
            .ok_or(ErrorKind::ServiceNotFound(service_uuid))?;

        let records = service
            .characteristics
            .iter()
            .map(|info| CharacteristicRecord::from_info(info, config_descriptor_uuid))
            .collect();

        Ok(Self {
            target: target_uuid,
            records,
        })
    }

    /// The characteristic the session reads, writes and toggles.
    pub fn find_target(&self) -> Option<&CharacteristicRecord> {
        self.get(self.target)
    }

    pub fn get(&self, uuid: Uuid) -> Option<&CharacteristicRecord> {
        self.records.iter().find(|record| record.uuid == uuid)
    }

    /// Everything that advertises notify or indicate, in discovery order.
    pub fn notifiable_characteristics(&self) -> impl Iterator<Item = &CharacteristicRecord> {
        self.records
            .iter()
            .filter(|record| record.supports_subscription())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::gatt::{
        CLIENT_CHARACTERISTIC_CONFIG, LED_CHARACTERISTIC_UUID, LED_SERVICE_UUID,
    };

    const OTHER_CHAR: Uuid = Uuid::from_u128(0x11111111_2222_3333_4444_555555555555);

    fn led_tree() -> Vec<ServiceInfo> {
        vec![ServiceInfo::new(LED_SERVICE_UUID)
            .with_characteristic(
                CharacteristicInfo::new(
                    LED_CHARACTERISTIC_UUID,
                    Properties::READ | Properties::WRITE | Properties::NOTIFY,
                )
                .with_descriptor(CLIENT_CHARACTERISTIC_CONFIG),
            )
            .with_characteristic(CharacteristicInfo::new(
                OTHER_CHAR,
                Properties::READ | Properties::INDICATE,
            ))]
    }

    fn build(services: &[ServiceInfo]) -> CharacteristicRegistry {
        CharacteristicRegistry::from_discovery(
            services,
            LED_SERVICE_UUID,
            LED_CHARACTERISTIC_UUID,
            CLIENT_CHARACTERISTIC_CONFIG,
        )
        .unwrap()
    }

    #[test]
    fn missing_service_is_an_error() {
        let result = CharacteristicRegistry::from_discovery(
            &[ServiceInfo::new(OTHER_CHAR)],
            LED_SERVICE_UUID,
            LED_CHARACTERISTIC_UUID,
            CLIENT_CHARACTERISTIC_CONFIG,
        );
        assert_eq!(result.unwrap_err(), ErrorKind::ServiceNotFound(LED_SERVICE_UUID));
    }

    #[test]
    fn target_resolves_with_its_config_descriptor() {
        let registry = build(&led_tree());
        let target = registry.find_target().unwrap();
        assert_eq!(target.uuid, LED_CHARACTERISTIC_UUID);
        assert_eq!(target.config_descriptor, Some(CLIENT_CHARACTERISTIC_CONFIG));
    }

    #[test]
    fn target_absent_yields_none() {
        let tree = vec![ServiceInfo::new(LED_SERVICE_UUID)
            .with_characteristic(CharacteristicInfo::new(OTHER_CHAR, Properties::READ))];
        let registry = build(&tree);
        assert!(registry.find_target().is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn notifiable_set_keeps_discovery_order() {
        let registry = build(&led_tree());
        let uuids: Vec<Uuid> = registry
            .notifiable_characteristics()
            .map(|record| record.uuid)
            .collect();
        assert_eq!(uuids, vec![LED_CHARACTERISTIC_UUID, OTHER_CHAR]);
    }

    #[test]
    fn indicate_wins_over_notify() {
        let record = CharacteristicRecord {
            uuid: OTHER_CHAR,
            properties: Properties::NOTIFY | Properties::INDICATE,
            config_descriptor: Some(CLIENT_CHARACTERISTIC_CONFIG),
        };
        assert_eq!(record.subscription_value(), Some(ENABLE_INDICATION_VALUE));

        let notify_only = CharacteristicRecord {
            properties: Properties::NOTIFY,
            ..record.clone()
        };
        assert_eq!(notify_only.subscription_value(), Some(ENABLE_NOTIFICATION_VALUE));
    }

    #[test]
    fn with_response_wins_over_without() {
        let record = CharacteristicRecord {
            uuid: OTHER_CHAR,
            properties: Properties::WRITE | Properties::WRITE_WITHOUT_RESPONSE,
            config_descriptor: None,
        };
        assert_eq!(record.preferred_write_mode(), Some(WriteMode::WithResponse));

        let fire_and_forget = CharacteristicRecord {
            properties: Properties::WRITE_WITHOUT_RESPONSE,
            ..record.clone()
        };
        assert_eq!(
            fire_and_forget.preferred_write_mode(),
            Some(WriteMode::WithoutResponse)
        );

        let read_only = CharacteristicRecord {
            properties: Properties::READ,
            ..record
        };
        assert_eq!(read_only.preferred_write_mode(), None);
    }
}
