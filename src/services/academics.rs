//! Academic structure: years, terms, classes and subjects
//!
//! At most one academic year and one term are active per school. The first
//! year created becomes active; activation swaps inside a transaction.

use super::{required, ServiceError, ServiceResult};
use crate::db::repositories::{AcademicsRepository, NewAcademicYear, NewClass, NewSubject, NewTerm};
use crate::db::DynDatabasePool;
use crate::models::{AcademicYear, SchoolClass, Subject, Term};

pub struct AcademicsService {
    repo: AcademicsRepository,
}

impl AcademicsService {
    pub fn new(db: DynDatabasePool) -> Self {
        Self {
            repo: AcademicsRepository::new(db),
        }
    }

    // Academic years

    pub async fn create_year(&self, input: NewAcademicYear) -> ServiceResult<AcademicYear> {
        let input = NewAcademicYear {
            name: required("Year name", &input.name)?,
            ..input
        };
        if input.start_date >= input.end_date {
            return Err(ServiceError::Validation(
                "start_date must be before end_date".to_string(),
            ));
        }

        self.repo
            .create_year(&input)
            .await
            .map_err(|e| ServiceError::from_db(e, "An academic year with this name exists"))
    }

    pub async fn list_years(&self) -> ServiceResult<Vec<AcademicYear>> {
        Ok(self.repo.list_years().await?)
    }

    pub async fn activate_year(&self, id: i64) -> ServiceResult<AcademicYear> {
        if !self.repo.activate_year(id).await? {
            return Err(ServiceError::not_found("Academic year", id));
        }
        tracing::info!("Activated academic year {}", id);
        self.year(id).await
    }

    pub async fn delete_year(&self, id: i64) -> ServiceResult<()> {
        let year = self.year(id).await?;
        if year.is_active {
            return Err(ServiceError::Conflict(
                "The active academic year cannot be deleted".to_string(),
            ));
        }
        self.repo
            .delete_year(id)
            .await
            .map_err(|e| ServiceError::from_delete(e, "Academic year"))?;
        Ok(())
    }

    async fn year(&self, id: i64) -> ServiceResult<AcademicYear> {
        self.repo
            .get_year(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Academic year", id))
    }

    // Terms

    pub async fn create_term(&self, input: NewTerm) -> ServiceResult<Term> {
        let input = NewTerm {
            name: required("Term name", &input.name)?,
            ..input
        };
        if input.start_date >= input.end_date {
            return Err(ServiceError::Validation(
                "start_date must be before end_date".to_string(),
            ));
        }

        let year = self
            .repo
            .get_year(input.academic_year_id)
            .await?
            .ok_or_else(|| ServiceError::Validation("Academic year does not exist".to_string()))?;
        if input.start_date < year.start_date || input.end_date > year.end_date {
            return Err(ServiceError::Validation(format!(
                "Term dates must fall within {} ({} to {})",
                year.name, year.start_date, year.end_date
            )));
        }

        self.repo
            .create_term(&input)
            .await
            .map_err(|e| ServiceError::from_db(e, "This year already has a term with that name"))
    }

    pub async fn list_terms(&self, academic_year_id: Option<i64>) -> ServiceResult<Vec<Term>> {
        Ok(self.repo.list_terms(academic_year_id).await?)
    }

    pub async fn active_term(&self) -> ServiceResult<Term> {
        self.repo
            .active_term()
            .await?
            .ok_or_else(|| ServiceError::NotFound("No term is active".to_string()))
    }

    /// Activate a term of the active year
    pub async fn activate_term(&self, id: i64) -> ServiceResult<Term> {
        let term = self.term(id).await?;
        let year = self.year(term.academic_year_id).await?;
        if !year.is_active {
            return Err(ServiceError::Validation(format!(
                "Activate academic year {} before its terms",
                year.name
            )));
        }

        self.repo.activate_term(id).await?;
        tracing::info!("Activated term {} of {}", term.name, year.name);
        self.term(id).await
    }

    pub async fn delete_term(&self, id: i64) -> ServiceResult<()> {
        let term = self.term(id).await?;
        if term.is_active {
            return Err(ServiceError::Conflict("The active term cannot be deleted".to_string()));
        }
        self.repo
            .delete_term(id)
            .await
            .map_err(|e| ServiceError::from_delete(e, "Term"))?;
        Ok(())
    }

    async fn term(&self, id: i64) -> ServiceResult<Term> {
        self.repo
            .get_term(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Term", id))
    }

    // Classes

    pub async fn create_class(&self, input: NewClass) -> ServiceResult<SchoolClass> {
        let input = NewClass {
            name: required("Class name", &input.name)?,
            ..input
        };
        self.repo
            .create_class(&input)
            .await
            .map_err(|e| ServiceError::from_db(e, "A class with this name exists"))
    }

    pub async fn list_classes(&self) -> ServiceResult<Vec<SchoolClass>> {
        Ok(self.repo.list_classes().await?)
    }

    pub async fn delete_class(&self, id: i64) -> ServiceResult<()> {
        let enrolled = self.repo.enrolled_in_class(id).await?;
        if enrolled > 0 {
            return Err(ServiceError::Conflict(format!(
                "Class still has {} students",
                enrolled
            )));
        }
        let deleted = self
            .repo
            .delete_class(id)
            .await
            .map_err(|e| ServiceError::from_delete(e, "Class"))?;
        if !deleted {
            return Err(ServiceError::not_found("Class", id));
        }
        Ok(())
    }

    // Subjects

    pub async fn create_subject(&self, input: NewSubject) -> ServiceResult<Subject> {
        let input = NewSubject {
            name: required("Subject name", &input.name)?,
            code: required("Subject code", &input.code)?.to_uppercase(),
        };
        self.repo
            .create_subject(&input)
            .await
            .map_err(|e| ServiceError::from_db(e, "A subject with this code exists"))
    }

    pub async fn list_subjects(&self) -> ServiceResult<Vec<Subject>> {
        Ok(self.repo.list_subjects().await?)
    }

    pub async fn delete_subject(&self, id: i64) -> ServiceResult<()> {
        let deleted = self
            .repo
            .delete_subject(id)
            .await
            .map_err(|e| ServiceError::from_delete(e, "Subject"))?;
        if !deleted {
            return Err(ServiceError::not_found("Subject", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{NewStudent, StudentRepository};
    use crate::db::{create_test_pool, migrations};
    use chrono::NaiveDate;

    async fn service() -> (AcademicsService, DynDatabasePool) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool, migrations::TENANT_MIGRATIONS)
            .await
            .unwrap();
        (AcademicsService::new(pool.clone()), pool)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn year(name: &str, y: i32) -> NewAcademicYear {
        NewAcademicYear {
            name: name.to_string(),
            start_date: date(y, 1, 10),
            end_date: date(y, 11, 30),
        }
    }

    #[tokio::test]
    async fn test_year_rules() {
        let (service, _) = service().await;
        let mut backwards = year("2024", 2024);
        backwards.end_date = date(2023, 1, 1);
        assert!(matches!(service.create_year(backwards).await, Err(ServiceError::Validation(_))));

        let first = service.create_year(year("2024", 2024)).await.unwrap();
        assert!(first.is_active);
        assert!(matches!(service.create_year(year("2024", 2024)).await, Err(ServiceError::Conflict(_))));

        let second = service.create_year(year("2025", 2025)).await.unwrap();
        assert!(!second.is_active);
        assert!(matches!(service.delete_year(first.id).await, Err(ServiceError::Conflict(_))));

        service.activate_year(second.id).await.unwrap();
        let active: Vec<_> = service.list_years().await.unwrap().into_iter().filter(|y| y.is_active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.id);

        service.delete_year(first.id).await.unwrap();
        assert!(matches!(service.activate_year(first.id).await, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_term_rules() {
        let (service, _) = service().await;
        let current = service.create_year(year("2024", 2024)).await.unwrap();
        let next = service.create_year(year("2025", 2025)).await.unwrap();

        let outside = NewTerm {
            academic_year_id: current.id,
            name: "Term 1".to_string(),
            start_date: date(2023, 12, 1),
            end_date: date(2024, 3, 1),
        };
        assert!(matches!(service.create_term(outside).await, Err(ServiceError::Validation(_))));

        let term = service
            .create_term(NewTerm {
                academic_year_id: current.id,
                name: "Term 1".to_string(),
                start_date: date(2024, 1, 10),
                end_date: date(2024, 4, 5),
            })
            .await
            .unwrap();
        let later = service
            .create_term(NewTerm {
                academic_year_id: next.id,
                name: "Term 1".to_string(),
                start_date: date(2025, 1, 10),
                end_date: date(2025, 4, 5),
            })
            .await
            .unwrap();

        assert!(matches!(service.active_term().await, Err(ServiceError::NotFound(_))));
        assert!(matches!(service.activate_term(later.id).await, Err(ServiceError::Validation(_))));

        service.activate_term(term.id).await.unwrap();
        assert_eq!(service.active_term().await.unwrap().id, term.id);
        assert!(matches!(service.delete_term(term.id).await, Err(ServiceError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_class_with_students_cannot_be_deleted() {
        let (service, pool) = service().await;
        let class = service
            .create_class(NewClass { name: "Form 1 East".to_string(), class_teacher_id: None })
            .await
            .unwrap();

        StudentRepository::new(pool)
            .create(&NewStudent {
                admission_number: "ADM-001".to_string(),
                first_name: "Baraka".to_string(),
                last_name: "Otieno".to_string(),
                gender: "male".to_string(),
                date_of_birth: None,
                class_id: class.id,
                guardian_name: None,
                guardian_phone: None,
                status: Default::default(),
            })
            .await
            .unwrap();

        assert!(matches!(service.delete_class(class.id).await, Err(ServiceError::Conflict(_))));
        assert!(matches!(service.delete_class(9999).await, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_subject_code_uppercased_and_unique() {
        let (service, _) = service().await;
        let subject = service
            .create_subject(NewSubject { name: "Mathematics".to_string(), code: "mat".to_string() })
            .await
            .unwrap();
        assert_eq!(subject.code, "MAT");
        let dup = service
            .create_subject(NewSubject { name: "Maths".to_string(), code: "MAT".to_string() })
            .await;
        assert!(matches!(dup, Err(ServiceError::Conflict(_))));
    }
}
