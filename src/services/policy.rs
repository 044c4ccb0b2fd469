//! Role-based authorization
//!
//! One table maps each role to the capabilities it holds. Every tenant
//! handler asks [`authorize`] for the capability it needs instead of
//! comparing roles inline.

use serde::Serialize;

use super::{ServiceError, ServiceResult};
use crate::models::{Claims, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ManageUsers,
    ManageAcademics,
    ViewAcademics,
    ManageStudents,
    ManageExams,
    RecordMarks,
    ViewResults,
    ManageFinance,
    ViewFinanceReports,
    ManageLibrary,
    ManagePharmacy,
    ManageDormitory,
    ManageTimetable,
    ViewTimetable,
    PostNotices,
    ReadNotices,
    ManageWebsite,
    ViewDashboard,
}

impl Capability {
    pub const ALL: &'static [Capability] = &[
        Capability::ManageUsers,
        Capability::ManageAcademics,
        Capability::ViewAcademics,
        Capability::ManageStudents,
        Capability::ManageExams,
        Capability::RecordMarks,
        Capability::ViewResults,
        Capability::ManageFinance,
        Capability::ViewFinanceReports,
        Capability::ManageLibrary,
        Capability::ManagePharmacy,
        Capability::ManageDormitory,
        Capability::ManageTimetable,
        Capability::ViewTimetable,
        Capability::PostNotices,
        Capability::ReadNotices,
        Capability::ManageWebsite,
        Capability::ViewDashboard,
    ];
}

impl Role {
    /// Whether this role holds `capability` within its own school
    pub fn can(&self, capability: Capability) -> bool {
        use Capability::*;

        if *self == Role::SuperAdmin || *self == Role::Admin {
            return true;
        }

        match capability {
            ManageUsers | ManageAcademics | ManageStudents | ManageExams | ManageTimetable
            | ManageWebsite => false,
            ViewAcademics | ViewDashboard => self.is_staff(),
            RecordMarks | ViewResults | PostNotices => *self == Role::Teacher,
            ManageFinance | ViewFinanceReports => *self == Role::Accountant,
            ManageLibrary => *self == Role::Librarian,
            ManagePharmacy => *self == Role::Nurse,
            ManageDormitory => *self == Role::Matron,
            ViewTimetable | ReadNotices => true,
        }
    }
}

/// Allow the caller to exercise `capability` on `school_code`.
///
/// Super-admins pass for every school. Everyone else must belong to the
/// target school and hold the capability.
pub fn authorize(claims: &Claims, school_code: &str, capability: Capability) -> ServiceResult<()> {
    if claims.is_super_admin() {
        return Ok(());
    }

    let same_school = claims
        .school_code
        .as_deref()
        .map(|own| own.eq_ignore_ascii_case(school_code.trim()))
        .unwrap_or(false);
    if !same_school {
        return Err(ServiceError::Forbidden(
            "You do not have access to this school".to_string(),
        ));
    }

    if !claims.role.can(capability) {
        return Err(ServiceError::Forbidden(format!(
            "Role {} may not perform this action",
            claims.role
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn claims(role: Role, school: Option<&str>) -> Claims {
        Claims {
            user_id: 1,
            name: "Test".to_string(),
            email: "test@school.test".to_string(),
            role,
            school_code: school.map(str::to_string),
        }
    }

    #[test]
    fn test_grant_table() {
        assert!(Role::Teacher.can(Capability::RecordMarks));
        assert!(!Role::Teacher.can(Capability::ManageFinance));
        assert!(Role::Accountant.can(Capability::ViewFinanceReports));
        assert!(!Role::Accountant.can(Capability::RecordMarks));
        assert!(Role::Librarian.can(Capability::ManageLibrary));
        assert!(Role::Nurse.can(Capability::ManagePharmacy));
        assert!(Role::Matron.can(Capability::ManageDormitory));
        assert!(!Role::Matron.can(Capability::ManagePharmacy));
        assert!(Role::Student.can(Capability::ReadNotices));
        assert!(Role::Student.can(Capability::ViewTimetable));
        assert!(!Role::Student.can(Capability::ViewDashboard));
        assert!(!Role::Student.can(Capability::ViewAcademics));
        assert!(Role::Admin.can(Capability::ManageStudents));
        for role in [Role::Teacher, Role::Accountant, Role::Librarian, Role::Nurse, Role::Matron, Role::Student] {
            assert!(!role.can(Capability::ManageStudents), "{:?}", role);
        }
    }

    #[test]
    fn test_other_school_is_forbidden() {
        let teacher = claims(Role::Teacher, Some("greenfield"));
        assert!(authorize(&teacher, "greenfield", Capability::RecordMarks).is_ok());
        assert!(authorize(&teacher, "GreenField", Capability::RecordMarks).is_ok());
        assert!(matches!(
            authorize(&teacher, "hillside", Capability::RecordMarks),
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[test]
    fn test_super_admin_passes_everywhere() {
        let root = claims(Role::SuperAdmin, None);
        for cap in Capability::ALL {
            assert!(authorize(&root, "anywhere", *cap).is_ok());
        }
    }

    fn any_tenant_role() -> impl Strategy<Value = Role> {
        prop::sample::select(
            Role::ALL
                .iter()
                .copied()
                .filter(Role::is_tenant_role)
                .collect::<Vec<_>>(),
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn authorize_matches_grant_table(
            role in any_tenant_role(),
            cap in prop::sample::select(Capability::ALL.to_vec()),
            own in "[a-z]{3,8}",
            target in "[a-z]{3,8}",
        ) {
            let result = authorize(&claims(role, Some(&own)), &target, cap);
            prop_assert_eq!(result.is_ok(), own == target && role.can(cap));
        }

        #[test]
        fn admin_holds_every_capability(cap in prop::sample::select(Capability::ALL.to_vec())) {
            prop_assert!(Role::Admin.can(cap));
        }

        #[test]
        fn missing_school_claim_never_passes(
            role in any_tenant_role(),
            cap in prop::sample::select(Capability::ALL.to_vec()),
        ) {
            prop_assert!(authorize(&claims(role, None), "greenfield", cap).is_err());
        }
    }
}
