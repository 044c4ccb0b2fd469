//! School overview counters

use serde::Serialize;

use super::ServiceResult;
use crate::db::repositories::{
    AcademicsRepository, DormitoryRepository, FinanceRepository, LibraryRepository,
    PharmacyRepository, SqlxUserRepository, StudentRepository, UserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{format_minor_units, StudentStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardSummary {
    pub active_students: i64,
    pub staff: i64,
    pub classes: i64,
    pub books_on_loan: i64,
    pub low_stock_medications: i64,
    pub occupied_beds: i64,
    /// Minor units
    pub outstanding_fees: i64,
    pub outstanding_fees_display: String,
}

pub struct DashboardService {
    db: DynDatabasePool,
}

impl DashboardService {
    pub fn new(db: DynDatabasePool) -> Self {
        Self { db }
    }

    pub async fn summary(&self) -> ServiceResult<DashboardSummary> {
        let db = &self.db;
        let students = StudentRepository::new(db.clone());
        let users = SqlxUserRepository::new(db.clone());
        let academics = AcademicsRepository::new(db.clone());
        let library = LibraryRepository::new(db.clone());
        let pharmacy = PharmacyRepository::new(db.clone());
        let dormitory = DormitoryRepository::new(db.clone());
        let finance = FinanceRepository::new(db.clone());
        let (active_students, staff, classes, books_on_loan, low_stock_medications, occupied_beds, outstanding_fees) =
            tokio::try_join!(
                students.count_by_status(StudentStatus::Active),
                users.count_active_staff(),
                academics.count_classes(),
                library.count_on_loan(),
                pharmacy.count_low_stock(),
                dormitory.count_occupied(),
                finance.outstanding_total(),
            )?;

        Ok(DashboardSummary {
            active_students,
            staff,
            classes,
            books_on_loan,
            low_stock_medications,
            occupied_beds,
            outstanding_fees,
            outstanding_fees_display: format_minor_units(outstanding_fees),
        })
    }
}
