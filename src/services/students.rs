//! Student records

use super::{optional, required, ServiceError, ServiceResult};
use crate::db::repositories::{
    AcademicsRepository, ClassHeadcount, NewStudent, StudentFilter, StudentRepository, StudentUpdate,
};
use crate::db::DynDatabasePool;
use crate::models::{Page, Student};

pub const DEFAULT_PER_PAGE: i64 = 20;
pub const MAX_PER_PAGE: i64 = 100;

pub struct StudentService {
    students: StudentRepository,
    academics: AcademicsRepository,
}

impl StudentService {
    pub fn new(db: DynDatabasePool) -> Self {
        Self {
            students: StudentRepository::new(db.clone()),
            academics: AcademicsRepository::new(db),
        }
    }

    async fn ensure_class(&self, class_id: i64) -> ServiceResult<()> {
        if self.academics.get_class(class_id).await?.is_none() {
            return Err(ServiceError::Validation(format!("Class {} does not exist", class_id)));
        }
        Ok(())
    }

    pub async fn create(&self, input: NewStudent) -> ServiceResult<Student> {
        let input = NewStudent {
            admission_number: required("Admission number", &input.admission_number)?,
            first_name: required("First name", &input.first_name)?,
            last_name: required("Last name", &input.last_name)?,
            gender: required("Gender", &input.gender)?.to_lowercase(),
            guardian_name: optional(&input.guardian_name),
            guardian_phone: optional(&input.guardian_phone),
            ..input
        };
        self.ensure_class(input.class_id).await?;

        self.students
            .create(&input)
            .await
            .map_err(|e| ServiceError::from_db(e, "Admission number is already in use"))
    }

    pub async fn get(&self, id: i64) -> ServiceResult<Student> {
        self.students
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Student", id))
    }

    pub async fn list(
        &self,
        filter: StudentFilter,
        page: Option<i64>,
        per_page: Option<i64>,
    ) -> ServiceResult<Page<Student>> {
        let page = page.unwrap_or(1).max(1);
        let per_page = per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
        let filter = StudentFilter {
            q: optional(&filter.q),
            ..filter
        };

        let (items, total) = self.students.list(&filter, page, per_page).await?;
        Ok(Page {
            items,
            total,
            page,
            per_page,
        })
    }

    pub async fn update(&self, id: i64, update: StudentUpdate) -> ServiceResult<Student> {
        let text = |field: &str, value: &Option<String>| -> ServiceResult<Option<String>> {
            value.as_deref().map(|v| required(field, v)).transpose()
        };
        let update = StudentUpdate {
            admission_number: text("Admission number", &update.admission_number)?,
            first_name: text("First name", &update.first_name)?,
            last_name: text("Last name", &update.last_name)?,
            gender: text("Gender", &update.gender)?.map(|g| g.to_lowercase()),
            ..update
        };
        if let Some(class_id) = update.class_id {
            self.ensure_class(class_id).await?;
        }

        self.students
            .update(id, &update)
            .await
            .map_err(|e| ServiceError::from_db(e, "Admission number is already in use"))?
            .ok_or_else(|| ServiceError::not_found("Student", id))
    }

    pub async fn count_per_class(&self) -> ServiceResult<Vec<ClassHeadcount>> {
        Ok(self.students.count_per_class().await?)
    }
}
