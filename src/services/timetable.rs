//! Weekly timetable

use super::{optional, ServiceError, ServiceResult};
use crate::db::repositories::{
    AcademicsRepository, NewSlot, SlotOutcome, SqlxUserRepository, TimetableRepository, UserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{Role, TimetableSlot};

pub struct TimetableService {
    slots: TimetableRepository,
    academics: AcademicsRepository,
    users: SqlxUserRepository,
}

impl TimetableService {
    pub fn new(db: DynDatabasePool) -> Self {
        Self {
            slots: TimetableRepository::new(db.clone()),
            academics: AcademicsRepository::new(db.clone()),
            users: SqlxUserRepository::new(db),
        }
    }

    async fn check_references(&self, input: &NewSlot) -> ServiceResult<()> {
        if self.academics.get_class(input.class_id).await?.is_none() {
            return Err(ServiceError::Validation(format!("Class {} does not exist", input.class_id)));
        }
        if self.academics.get_subject(input.subject_id).await?.is_none() {
            return Err(ServiceError::Validation(format!(
                "Subject {} does not exist",
                input.subject_id
            )));
        }
        match self.users.get_by_id(input.teacher_id).await? {
            Some(user) if matches!(user.role, Role::Teacher | Role::Admin) && user.is_active => Ok(()),
            Some(_) => Err(ServiceError::Validation(format!(
                "User {} is not an active teacher",
                input.teacher_id
            ))),
            None => Err(ServiceError::Validation(format!(
                "Teacher {} does not exist",
                input.teacher_id
            ))),
        }
    }

    pub async fn create(&self, input: NewSlot) -> ServiceResult<TimetableSlot> {
        if !(1..=7).contains(&input.day_of_week) {
            return Err(ServiceError::Validation("day_of_week must be between 1 and 7".to_string()));
        }
        if input.start_time >= input.end_time {
            return Err(ServiceError::Validation("start_time must be before end_time".to_string()));
        }
        let input = NewSlot {
            room: optional(&input.room),
            ..input
        };
        self.check_references(&input).await?;

        match self.slots.create(&input).await? {
            SlotOutcome::Created(id) => self.get(id).await,
            SlotOutcome::Clash(other) => Err(ServiceError::Conflict(format!(
                "Slot overlaps timetable slot {}",
                other
            ))),
        }
    }

    pub async fn get(&self, id: i64) -> ServiceResult<TimetableSlot> {
        self.slots
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Timetable slot", id))
    }

    pub async fn list(&self, class_id: Option<i64>, teacher_id: Option<i64>) -> ServiceResult<Vec<TimetableSlot>> {
        Ok(self.slots.list(class_id, teacher_id).await?)
    }

    pub async fn delete(&self, id: i64) -> ServiceResult<()> {
        if !self.slots.delete(id).await? {
            return Err(ServiceError::not_found("Timetable slot", id));
        }
        Ok(())
    }
}
