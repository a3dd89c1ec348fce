use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Merchant,
    TruckOwner,
    Driver,
    Admin,
}

impl Role {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Merchant => "MERCHANT",
            Self::TruckOwner => "TRUCK_OWNER",
            Self::Driver => "DRIVER",
            Self::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "MERCHANT" => Ok(Self::Merchant),
            "TRUCK_OWNER" | "TRUCKOWNER" => Ok(Self::TruckOwner),
            "DRIVER" => Ok(Self::Driver),
            "ADMIN" => Ok(Self::Admin),
            other => Err(AppError::Validation(format!("unknown role: {other}"))),
        }
    }
}

/// Authenticated caller, as resolved by the upstream auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require(&self, role: Role, action: &str) -> Result<(), AppError> {
        if self.role == role {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "only {role} actors may {action} (caller is {})",
                self.role
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Role;

    #[test]
    fn role_parsing_accepts_common_spellings() {
        assert_eq!("truck_owner".parse::<Role>().unwrap(), Role::TruckOwner);
        assert_eq!("TRUCK-OWNER".parse::<Role>().unwrap(), Role::TruckOwner);
        assert_eq!(" driver ".parse::<Role>().unwrap(), Role::Driver);
        assert!("dispatcher".parse::<Role>().is_err());
    }
}
