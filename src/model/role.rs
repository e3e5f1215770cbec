use serde::Serialize;
use strum_macros::{AsRefStr, Display};
use utoipa::ToSchema;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, ToSchema, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Admin = 1,
    OfficeAdmin = 2,
    Accountant = 3,
    Viewer = 4,
}

impl Role {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Role::Admin),
            2 => Some(Role::OfficeAdmin),
            3 => Some(Role::Accountant),
            4 => Some(Role::Viewer),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    /// Roles allowed to create and edit payroll data
    pub fn can_edit(self) -> bool {
        matches!(self, Role::Admin | Role::OfficeAdmin | Role::Accountant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip() {
        for role in [Role::Admin, Role::OfficeAdmin, Role::Accountant, Role::Viewer] {
            assert_eq!(Role::from_id(role.id()), Some(role));
        }
        assert_eq!(Role::from_id(0), None);
        assert_eq!(Role::from_id(9), None);
    }

    #[test]
    fn viewers_cannot_edit() {
        assert!(Role::Accountant.can_edit());
        assert!(!Role::Viewer.can_edit());
        assert_eq!(Role::OfficeAdmin.to_string(), "office_admin");
    }
}
