//! Database repositories
//!
//! Registry repositories (`school`, `super_admin`, `session`) sit behind
//! traits and are shared through `AppState`. Every other repository works on
//! one school database and is built per request from the resolved tenant's
//! pool.

pub mod academics;
pub mod dormitory;
pub mod exam;
pub mod finance;
pub mod library;
pub mod notice;
pub mod pharmacy;
pub mod school;
pub mod session;
pub mod student;
pub mod super_admin;
pub mod timetable;
pub mod user;
pub mod website;

pub use academics::{AcademicsRepository, NewAcademicYear, NewClass, NewSubject, NewTerm};
pub use dormitory::{AllocateOutcome, DormitoryRepository, NewRoom, RoomChange, VacateOutcome};
pub use exam::{ExamRepository, MarkEntry, NewExam};
pub use finance::{
    FinanceRepository, InvoiceFilter, InvoiceTotals, NewExpense, NewInvoice, NewPayment,
    PaymentOutcome,
};
pub use library::{
    BookChange, BookUpdate, IssueOutcome, LibraryRepository, LoanFilter, NewBook, ReturnOutcome,
};
pub use notice::{NewNotice, NoticeRepository};
pub use pharmacy::{DispenseOutcome, NewMedication, NewVisit, PharmacyRepository};
pub use school::{SchoolRecord, SchoolRepository, SqlxSchoolRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use student::{ClassHeadcount, NewStudent, StudentFilter, StudentRepository, StudentUpdate};
pub use super_admin::{SqlxSuperAdminRepository, SuperAdminRepository};
pub use timetable::{NewSlot, SlotOutcome, TimetableRepository};
pub use user::{NewUser, SqlxUserRepository, UserRepository, UserUpdate};
pub use website::{ArticleRecord, NewGalleryItem, WebsiteRepository};
