//! Data models
//!
//! Entities of the platform registry (schools, super-admins, sessions) and
//! of each school database (users, academics, finance, library, ...), plus
//! the input types accepted by the services.

/// Declare a string-backed enum stored as text in the database.
///
/// The text forms must be the snake_case spelling of the variants so that the
/// serde representation and the stored column agree.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(anyhow::anyhow!("Invalid {}: {}", stringify!($name), s)),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = anyhow::Error;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }
    };
}

mod academics;
mod dormitory;
mod exam;
mod finance;
mod library;
mod notice;
mod pharmacy;
mod school;
mod session;
mod student;
mod timetable;
mod user;
mod website;

pub mod hhmm;

pub use academics::{AcademicYear, SchoolClass, Subject, Term};
pub use dormitory::{BedAllocation, DormRoom};
pub use exam::{Exam, Mark, StudentResult, SubjectScore};
pub use finance::{
    format_minor_units, AmountByLabel, ClassCollection, Expense, ExpenseSummary,
    FeeCollectionSummary, FeePayment, IncomeStatement, Invoice, InvoiceStatus, PaymentMethod,
};
pub use library::{Book, BookLoan};
pub use notice::{Audience, Notice};
pub use pharmacy::{ClinicVisit, Dispensation, Medication};
pub use school::School;
pub use session::{Claims, Session};
pub use student::{Student, StudentStatus};
pub use timetable::{ranges_overlap, TimetableSlot};
pub use user::{Role, SuperAdmin, User};
pub use website::{keys as site_keys, ArticleStatus, GalleryItem, NewsArticle, SiteSettings};

/// One page of a listing
#[derive(Debug, Clone, serde::Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> i64 {
        if self.per_page <= 0 {
            return 0;
        }
        (self.total + self.per_page - 1) / self.per_page
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn text_enum_serde_matches_storage_form() {
        for role in Role::ALL {
            let json = serde_json::to_string(role).unwrap();
            assert_eq!(json, format!("\"{}\"", role.as_str()));
            assert_eq!(role.as_str().parse::<Role>().unwrap(), *role);
        }
        for method in PaymentMethod::ALL {
            let json = serde_json::to_string(method).unwrap();
            assert_eq!(json, format!("\"{}\"", method.as_str()));
        }
        for status in StudentStatus::ALL {
            assert_eq!(status.as_str().parse::<StudentStatus>().unwrap(), *status);
        }
        for audience in Audience::ALL {
            let json = serde_json::to_string(audience).unwrap();
            assert_eq!(json, format!("\"{}\"", audience.as_str()));
        }
    }

    #[test]
    fn text_enum_parse_is_case_insensitive() {
        assert_eq!(" Teacher ".parse::<Role>().unwrap(), Role::Teacher);
        assert!("headmaster".parse::<Role>().is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn page_count_covers_every_item(total in 0i64..10_000, per_page in 1i64..200) {
            let page: Page<()> = Page { items: vec![], total, page: 1, per_page };
            let pages = page.total_pages();
            prop_assert!(pages * per_page >= total);
            prop_assert!((pages - 1).max(0) * per_page < total.max(1));
        }
    }
}
