use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiErrorKind;
use crate::register::RegisterType;

/// One scheduled read: which device, which register space, which window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingTarget {
    pub id: i64,
    pub device_id: String,
    pub register_type: RegisterType,
    pub address: u16,
    pub count: u16,
    pub is_active: bool,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PollingTarget {
    /// Composite string key this target's reads are cached and published
    /// under: `device_id:register_type:address:count`.
    pub fn cache_key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.device_id, self.register_type, self.address, self.count
        )
    }

    pub fn validate(&self) -> Result<(), ApiErrorKind> {
        if self.device_id.trim().is_empty() {
            return Err(ApiErrorKind::validation("device_id must not be empty"));
        }
        if self.count == 0 || self.count > self.register_type.max_count() {
            return Err(ApiErrorKind::validation(format!(
                "count must be 1-{} for {} registers",
                self.register_type.max_count(),
                self.register_type
            )));
        }
        let last_address = self.address as u32 + self.count as u32 - 1;
        if last_address > u16::MAX as u32 {
            return Err(ApiErrorKind::validation(
                "address + count overflows the 16-bit register space",
            ));
        }
        if let Some(description) = &self.description {
            if description.chars().count() > 200 {
                return Err(ApiErrorKind::validation(
                    "description must be at most 200 characters",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(register_type: RegisterType, address: u16, count: u16) -> PollingTarget {
        PollingTarget {
            id: 1,
            device_id: "d1".to_string(),
            register_type,
            address,
            count,
            is_active: true,
            description: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn cache_key_is_composite() {
        let t = target(RegisterType::Holding, 100, 10);
        assert_eq!(t.cache_key(), "d1:holding:100:10");
    }

    #[test]
    fn rejects_count_over_register_limit() {
        let t = target(RegisterType::Holding, 0, 126);
        assert!(t.validate().is_err());
    }

    #[test]
    fn accepts_max_coil_count() {
        let t = target(RegisterType::Coil, 0, 2000);
        assert!(t.validate().is_ok());
    }

    #[test]
    fn rejects_address_overflow() {
        let t = target(RegisterType::Holding, 65530, 10);
        assert!(t.validate().is_err());
    }
}
